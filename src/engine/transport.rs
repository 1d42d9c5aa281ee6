//! Audio Transport State Machine
//!
//! Owns the single live audio resource and the playback state derived from
//! it. Transitions:
//!
//! ```text
//! Idle -> Loading -> Ready -> Playing <-> Paused
//!                               |
//!                               v
//!                             Ended
//! ```
//!
//! The transport never decides what plays next. A natural end is reported to
//! the caller as [`TransportSignal::Ended`].

use std::fmt;

use log::{debug, info, warn};
use serde::Serialize;

use super::backend::{AudioBackend, BackendEvent, PlayErrorKind, ResourceId};
use crate::error::PlayerError;
use crate::playlist::Track;
use crate::scheduler::{Scheduler, TimerId};
use crate::task::Task;

/// Default position polling interval in milliseconds
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;

/// Transport states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportState {
    /// Nothing loaded (entry state, and after a load failure)
    #[default]
    Idle,
    /// Waiting for the backend to finish loading
    Loading,
    /// Loaded, not playing
    Ready,
    /// Audio is actively playing
    Playing,
    /// Paused mid-track
    Paused,
    /// Reached the natural end of the track
    Ended,
}

impl fmt::Display for TransportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportState::Idle => write!(f, "Idle"),
            TransportState::Loading => write!(f, "Loading"),
            TransportState::Ready => write!(f, "Ready"),
            TransportState::Playing => write!(f, "Playing"),
            TransportState::Paused => write!(f, "Paused"),
            TransportState::Ended => write!(f, "Ended"),
        }
    }
}

/// Observable playback state
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlaybackState {
    pub current_track_index: usize,
    pub is_playing: bool,
    pub is_loading: bool,
    /// Output volume, 0.0 - 1.0
    pub volume: f32,
    pub position_seconds: f64,
    pub duration_seconds: f64,
}

impl PlaybackState {
    fn new(volume: f32) -> Self {
        Self {
            current_track_index: 0,
            is_playing: false,
            is_loading: false,
            volume,
            position_seconds: 0.0,
            duration_seconds: 0.0,
        }
    }
}

/// Outcomes the owner of the transport has to react to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportSignal {
    Loaded,
    LoadFailed,
    Ended,
    PlayBlocked,
    PlayFailed,
}

/// One-shot retry after an autoplay rejection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UnlockRetry {
    /// No rejection pending
    Idle,
    /// Waiting for the next user interaction to retry
    Armed,
    /// The retry was used up
    Spent,
}

/// Transport over a single audio resource
#[derive(Debug)]
pub struct AudioTransport<B: AudioBackend> {
    backend: B,
    state: TransportState,
    playback: PlaybackState,

    /// Resource currently owned, if any
    resource: Option<ResourceId>,
    next_resource: u64,
    /// URI of the current track, for error reports
    source_uri: String,

    /// Play as soon as the pending load completes
    autoplay: bool,
    /// A play command was sent and not yet confirmed
    play_requested: bool,

    poll_interval_ms: u64,
    poll_timer: Option<TimerId>,
    /// Incremented whenever polling stops; stale ticks carry an old token
    poll_token: u64,

    unlock_retry: UnlockRetry,
    tap_to_play: bool,
    last_error: Option<PlayerError>,
}

impl<B: AudioBackend> AudioTransport<B> {
    /// Create a transport in `Idle`
    ///
    /// # Arguments
    /// * `backend` - The audio backend this transport exclusively owns
    /// * `poll_interval_ms` - Spacing of position polls while playing
    /// * `volume` - Initial output volume, clamped to 0.0 - 1.0
    pub fn new(mut backend: B, poll_interval_ms: u64, volume: f32) -> Self {
        let volume = sanitize_volume(volume).unwrap_or(1.0);
        backend.set_volume(volume);
        Self {
            backend,
            state: TransportState::Idle,
            playback: PlaybackState::new(volume),
            resource: None,
            next_resource: 1,
            source_uri: String::new(),
            autoplay: false,
            play_requested: false,
            poll_interval_ms: poll_interval_ms.max(1),
            poll_timer: None,
            poll_token: 0,
            unlock_retry: UnlockRetry::Idle,
            tap_to_play: false,
            last_error: None,
        }
    }

    // ========================================================================
    // Resource Lifecycle
    // ========================================================================

    /// Load `track` as the current track
    ///
    /// Polling stops and the previous resource is released before the new
    /// resource is requested. Returns `LoadFailed` right away when the track
    /// has no audio source.
    pub fn load(
        &mut self,
        index: usize,
        track: &Track,
        sched: &mut Scheduler<Task>,
    ) -> Option<TransportSignal> {
        self.stop_polling(sched);
        if let Some(old) = self.resource.take() {
            debug!("[TRANSPORT] Releasing {}", old);
            self.backend.release(old);
        }

        self.playback.current_track_index = index;
        self.playback.position_seconds = 0.0;
        self.playback.duration_seconds = 0.0;
        self.playback.is_playing = false;
        self.autoplay = false;
        self.play_requested = false;
        self.unlock_retry = UnlockRetry::Idle;
        self.tap_to_play = false;
        self.source_uri = track.audio_source.clone();

        if track.audio_source.trim().is_empty() {
            warn!("[TRANSPORT] Track '{}' has no audio source", track.title);
            self.state = TransportState::Idle;
            self.playback.is_loading = false;
            self.last_error = Some(PlayerError::LoadError {
                uri: track.audio_source.clone(),
                reason: "no audio source".to_string(),
            });
            return Some(TransportSignal::LoadFailed);
        }

        let resource = ResourceId(self.next_resource);
        self.next_resource += 1;
        self.resource = Some(resource);
        self.state = TransportState::Loading;
        self.playback.is_loading = true;
        self.last_error = None;

        info!(
            "[TRANSPORT] Loading '{}' by {} as {}",
            track.title, track.artist, resource
        );
        self.backend
            .load(resource, &track.audio_source, self.playback.volume);
        None
    }

    /// Load `track` and start it as soon as it is ready
    pub fn load_and_play(
        &mut self,
        index: usize,
        track: &Track,
        sched: &mut Scheduler<Task>,
    ) -> Option<TransportSignal> {
        let signal = self.load(index, track, sched);
        if self.state == TransportState::Loading {
            self.autoplay = true;
        }
        signal
    }

    // ========================================================================
    // Standard Transport Controls
    // ========================================================================

    /// Start or resume playback
    ///
    /// Valid from Ready, Paused and Ended. While Loading the request is kept
    /// and honoured once the track is ready. An explicit play also clears a
    /// "tap to play" state and re-arms the single autoplay retry.
    pub fn play(&mut self) {
        self.tap_to_play = false;
        self.unlock_retry = UnlockRetry::Idle;

        match self.state {
            TransportState::Loading => {
                self.autoplay = true;
                debug!("[TRANSPORT] Play requested while loading");
            }
            TransportState::Playing => {
                debug!("[TRANSPORT] Already playing");
            }
            TransportState::Idle => {
                debug!("[TRANSPORT] Nothing loaded");
            }
            TransportState::Ready | TransportState::Paused | TransportState::Ended => {
                self.issue_play();
            }
        }
    }

    /// Pause playback, keeping the position
    pub fn pause(&mut self, sched: &mut Scheduler<Task>) {
        self.autoplay = false;
        self.play_requested = false;

        match (self.state, self.resource) {
            (TransportState::Playing, Some(resource)) => {
                self.stop_polling(sched);
                if let Some(position) = self.backend.position(resource) {
                    self.playback.position_seconds = position;
                }
                self.backend.pause(resource);
                self.state = TransportState::Paused;
                self.playback.is_playing = false;
                debug!("[TRANSPORT] Paused at {:.3}s", self.playback.position_seconds);
            }
            _ => {
                debug!("[TRANSPORT] Pause ignored in {}", self.state);
            }
        }
    }

    /// Stop playback and reset the position to zero
    pub fn stop(&mut self, sched: &mut Scheduler<Task>) {
        self.stop_polling(sched);
        self.autoplay = false;
        self.play_requested = false;
        self.playback.position_seconds = 0.0;
        self.playback.is_playing = false;

        if let Some(resource) = self.resource {
            self.backend.stop(resource);
            if matches!(
                self.state,
                TransportState::Playing | TransportState::Paused | TransportState::Ended
            ) {
                self.state = TransportState::Ready;
            }
        }
        debug!("[TRANSPORT] Stopped, position reset to 0");
    }

    /// Seek to an absolute position in seconds
    ///
    /// Clamped to the track duration. Returns false when the duration is not
    /// known yet.
    pub fn seek(&mut self, seconds: f64) -> bool {
        let duration = self.playback.duration_seconds;
        let Some(resource) = self.resource else {
            return false;
        };
        if duration <= 0.0 || seconds.is_nan() {
            return false;
        }
        let target = seconds.clamp(0.0, duration);
        self.backend.seek(resource, target);
        self.playback.position_seconds = target;
        debug!("[TRANSPORT] Seek to {:.3}s", target);
        true
    }

    /// Seek to `percent` (0 - 100) of the track duration
    ///
    /// No-op while the duration is unknown.
    pub fn seek_to_percent(&mut self, percent: f64) -> bool {
        if self.playback.duration_seconds <= 0.0 || percent.is_nan() {
            return false;
        }
        let p = percent.clamp(0.0, 100.0);
        self.seek(p / 100.0 * self.playback.duration_seconds)
    }

    /// Go back to the start of the current track, replaying it if it ended
    pub fn restart(&mut self) {
        if self.seek(0.0) && self.state == TransportState::Ended {
            self.issue_play();
        }
    }

    /// Set output volume, clamped to 0.0 - 1.0. Returns the applied value.
    pub fn set_volume(&mut self, volume: f32) -> f32 {
        match sanitize_volume(volume) {
            Some(v) => {
                self.playback.volume = v;
                self.backend.set_volume(v);
                v
            }
            None => self.playback.volume,
        }
    }

    // ========================================================================
    // Events
    // ========================================================================

    /// Any user interaction on the page
    ///
    /// Consumes an armed autoplay retry. Returns true if a retry was issued.
    pub fn on_user_interaction(&mut self) -> bool {
        if self.unlock_retry != UnlockRetry::Armed {
            return false;
        }
        self.unlock_retry = UnlockRetry::Spent;
        info!("[TRANSPORT] Retrying blocked playback after user interaction");
        self.issue_play();
        true
    }

    /// Apply a backend event
    ///
    /// Events for a resource other than the current one are ignored.
    pub fn handle_event(
        &mut self,
        event: BackendEvent,
        sched: &mut Scheduler<Task>,
    ) -> Option<TransportSignal> {
        if Some(event.resource()) != self.resource {
            debug!("[TRANSPORT] Ignoring stale event for {}", event.resource());
            return None;
        }

        match event {
            BackendEvent::Loaded { duration_secs, .. } => {
                if self.state != TransportState::Loading {
                    return None;
                }
                self.state = TransportState::Ready;
                self.playback.is_loading = false;
                self.playback.duration_seconds = duration_secs.max(0.0);
                debug!("[TRANSPORT] Ready, duration {:.1}s", duration_secs);
                if self.autoplay {
                    self.autoplay = false;
                    self.issue_play();
                }
                Some(TransportSignal::Loaded)
            }
            BackendEvent::Playing { resource } => {
                if !self.play_requested {
                    // Confirmation of a request that was withdrawn by pause()
                    if self.state != TransportState::Playing {
                        self.backend.pause(resource);
                    }
                    return None;
                }
                self.play_requested = false;
                self.state = TransportState::Playing;
                self.playback.is_playing = true;
                self.tap_to_play = false;
                self.unlock_retry = UnlockRetry::Idle;
                self.start_polling(sched);
                debug!("[TRANSPORT] Playing from {:.3}s", self.playback.position_seconds);
                None
            }
            BackendEvent::Paused { resource } => {
                if self.state == TransportState::Playing {
                    self.stop_polling(sched);
                    if let Some(position) = self.backend.position(resource) {
                        self.playback.position_seconds = position;
                    }
                    self.state = TransportState::Paused;
                    self.playback.is_playing = false;
                }
                None
            }
            BackendEvent::Stopped { .. } => {
                self.playback.position_seconds = 0.0;
                None
            }
            BackendEvent::Ended { .. } => {
                self.stop_polling(sched);
                self.state = TransportState::Ended;
                self.playback.is_playing = false;
                self.playback.position_seconds = self.playback.duration_seconds;
                info!(
                    "[TRANSPORT] Track {} ended",
                    self.playback.current_track_index
                );
                Some(TransportSignal::Ended)
            }
            BackendEvent::LoadError { resource, reason } => {
                warn!("[TRANSPORT] Load failed for {}: {}", resource, reason);
                self.backend.release(resource);
                self.resource = None;
                self.state = TransportState::Idle;
                self.autoplay = false;
                self.play_requested = false;
                self.playback.is_loading = false;
                self.playback.duration_seconds = 0.0;
                self.last_error = Some(PlayerError::LoadError {
                    uri: self.source_uri.clone(),
                    reason,
                });
                Some(TransportSignal::LoadFailed)
            }
            BackendEvent::PlayError { kind, .. } => {
                self.play_requested = false;
                self.playback.is_loading = false;
                match kind {
                    PlayErrorKind::Blocked => {
                        self.last_error = Some(PlayerError::PlayBlocked);
                        if self.unlock_retry == UnlockRetry::Spent {
                            warn!("[TRANSPORT] Playback still blocked after retry");
                            self.tap_to_play = true;
                        } else {
                            warn!("[TRANSPORT] Playback blocked, waiting for user interaction");
                            self.unlock_retry = UnlockRetry::Armed;
                        }
                        Some(TransportSignal::PlayBlocked)
                    }
                    PlayErrorKind::Failed(reason) => {
                        warn!("[TRANSPORT] Playback failed: {}", reason);
                        self.last_error = Some(PlayerError::PlayFailed { reason });
                        Some(TransportSignal::PlayFailed)
                    }
                }
            }
        }
    }

    /// Position poll tick. Returns true if the position was updated.
    pub fn on_poll(&mut self, token: u64) -> bool {
        if token != self.poll_token || self.state != TransportState::Playing {
            return false;
        }
        let Some(resource) = self.resource else {
            return false;
        };
        match self.backend.position(resource) {
            Some(position) => {
                self.playback.position_seconds = position;
                true
            }
            None => false,
        }
    }

    // ========================================================================
    // State Queries
    // ========================================================================

    pub fn state(&self) -> TransportState {
        self.state
    }

    pub fn playback(&self) -> &PlaybackState {
        &self.playback
    }

    pub fn is_playing(&self) -> bool {
        self.state == TransportState::Playing
    }

    /// Playing, or a play is on its way
    pub fn wants_playback(&self) -> bool {
        self.state == TransportState::Playing || self.autoplay || self.play_requested
    }

    /// Resource currently owned by the transport
    pub fn current_resource(&self) -> Option<ResourceId> {
        self.resource
    }

    /// Check if a polling loop is running
    pub fn is_polling(&self) -> bool {
        self.poll_timer.is_some()
    }

    /// True once a retried play was blocked again
    pub fn needs_tap_to_play(&self) -> bool {
        self.tap_to_play
    }

    /// True while a blocked play waits for the next user interaction
    pub fn is_retry_armed(&self) -> bool {
        self.unlock_retry == UnlockRetry::Armed
    }

    pub fn last_error(&self) -> Option<&PlayerError> {
        self.last_error.as_ref()
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn issue_play(&mut self) {
        if self.play_requested {
            return;
        }
        let Some(resource) = self.resource else {
            return;
        };
        if self.state == TransportState::Ended {
            self.playback.position_seconds = 0.0;
        }
        self.play_requested = true;
        self.backend.play(resource);
    }

    fn start_polling(&mut self, sched: &mut Scheduler<Task>) {
        self.stop_polling(sched);
        let token = self.poll_token;
        self.poll_timer = Some(sched.set_interval(self.poll_interval_ms, Task::PollPosition { token }));
    }

    fn stop_polling(&mut self, sched: &mut Scheduler<Task>) {
        if let Some(timer) = self.poll_timer.take() {
            sched.cancel(timer);
        }
        self.poll_token += 1;
    }
}

fn sanitize_volume(volume: f32) -> Option<f32> {
    if volume.is_nan() {
        None
    } else {
        Some(volume.clamp(0.0, 1.0))
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::simulated::{BackendCall, SimulatedBackend};
    use approx::assert_relative_eq;

    fn track_a() -> Track {
        Track::new(1, "Track A", "Artist", "/audio/a.mp3")
    }

    fn track_b() -> Track {
        Track::new(2, "Track B", "Artist", "/audio/b.mp3")
    }

    fn setup() -> (AudioTransport<SimulatedBackend>, Scheduler<Task>) {
        let backend = SimulatedBackend::new()
            .with_load_latency(0)
            .with_duration("/audio/a.mp3", 180.0)
            .with_duration("/audio/b.mp3", 200.0);
        (AudioTransport::new(backend, 1000, 0.7), Scheduler::new(16))
    }

    /// Advance the clock, delivering backend events and poll ticks in order
    fn run(
        transport: &mut AudioTransport<SimulatedBackend>,
        sched: &mut Scheduler<Task>,
        until: u64,
    ) -> Vec<TransportSignal> {
        let mut signals = Vec::new();
        loop {
            let due = [sched.next_due(), transport.backend().next_event_at()]
                .into_iter()
                .flatten()
                .min();
            let Some(due) = due.filter(|d| *d <= until) else {
                break;
            };
            sched.advance_to(due);
            for event in transport.backend_mut().poll(due) {
                signals.extend(transport.handle_event(event, sched));
            }
            while let Some((_, task)) = sched.pop_due(due) {
                if let Task::PollPosition { token } = task {
                    transport.on_poll(token);
                }
            }
        }
        sched.advance_to(until);
        transport.backend_mut().poll(until);
        signals
    }

    // ------------------------------------------------------------------------
    // Basic State Tests
    // ------------------------------------------------------------------------

    #[test]
    fn test_default_state_is_idle() {
        let (transport, _) = setup();
        assert_eq!(transport.state(), TransportState::Idle);
        assert_relative_eq!(transport.playback().volume, 0.7);
        assert!(!transport.is_polling());
    }

    #[test]
    fn test_load_then_ready() {
        let (mut transport, mut sched) = setup();
        transport.load(0, &track_a(), &mut sched);
        assert_eq!(transport.state(), TransportState::Loading);
        assert!(transport.playback().is_loading);

        let signals = run(&mut transport, &mut sched, 0);
        assert_eq!(signals, vec![TransportSignal::Loaded]);
        assert_eq!(transport.state(), TransportState::Ready);
        assert_relative_eq!(transport.playback().duration_seconds, 180.0);
        assert!(!transport.playback().is_loading);
    }

    #[test]
    fn test_load_and_play_starts_polling() {
        let (mut transport, mut sched) = setup();
        transport.load_and_play(0, &track_a(), &mut sched);
        run(&mut transport, &mut sched, 0);

        assert!(transport.is_playing());
        assert!(transport.is_polling());

        run(&mut transport, &mut sched, 3000);
        assert_relative_eq!(transport.playback().position_seconds, 3.0);
    }

    #[test]
    fn test_play_while_loading_is_deferred() {
        let (mut transport, mut sched) = setup();
        transport.load(0, &track_a(), &mut sched);
        transport.play();
        run(&mut transport, &mut sched, 0);
        assert!(transport.is_playing());
    }

    #[test]
    fn test_empty_source_fails_immediately() {
        let (mut transport, mut sched) = setup();
        let signal = transport.load(0, &Track::new(9, "Silent", "Nobody", ""), &mut sched);
        assert_eq!(signal, Some(TransportSignal::LoadFailed));
        assert_eq!(transport.state(), TransportState::Idle);
        assert_eq!(transport.last_error().unwrap().error_code(), "LOAD_ERROR");
    }

    // ------------------------------------------------------------------------
    // State Transition Tests
    // ------------------------------------------------------------------------

    #[test]
    fn test_pause_preserves_position_and_stops_polling() {
        let (mut transport, mut sched) = setup();
        transport.load_and_play(0, &track_a(), &mut sched);
        run(&mut transport, &mut sched, 2500);

        transport.pause(&mut sched);
        assert_eq!(transport.state(), TransportState::Paused);
        assert!(!transport.is_polling());
        assert_relative_eq!(transport.playback().position_seconds, 2.5);

        run(&mut transport, &mut sched, 10_000);
        assert_relative_eq!(transport.playback().position_seconds, 2.5);
    }

    #[test]
    fn test_resume_after_pause() {
        let (mut transport, mut sched) = setup();
        transport.load_and_play(0, &track_a(), &mut sched);
        run(&mut transport, &mut sched, 2000);
        transport.pause(&mut sched);
        transport.play();
        run(&mut transport, &mut sched, 4000);
        assert!(transport.is_playing());
        assert_relative_eq!(transport.playback().position_seconds, 4.0);
    }

    #[test]
    fn test_stop_resets_position() {
        let (mut transport, mut sched) = setup();
        transport.load_and_play(0, &track_a(), &mut sched);
        run(&mut transport, &mut sched, 5000);

        transport.stop(&mut sched);
        assert_eq!(transport.state(), TransportState::Ready);
        assert_eq!(transport.playback().position_seconds, 0.0);
        assert!(!transport.is_polling());
    }

    #[test]
    fn test_double_play_no_op() {
        let (mut transport, mut sched) = setup();
        transport.load_and_play(0, &track_a(), &mut sched);
        run(&mut transport, &mut sched, 0);
        transport.play();
        let plays = transport
            .backend()
            .calls()
            .iter()
            .filter(|c| matches!(c, BackendCall::Play(_)))
            .count();
        assert_eq!(plays, 1);
    }

    #[test]
    fn test_natural_end_signals_ended() {
        let backend = SimulatedBackend::new()
            .with_load_latency(0)
            .with_duration("/audio/a.mp3", 2.0);
        let mut transport = AudioTransport::new(backend, 1000, 1.0);
        let mut sched = Scheduler::new(16);
        transport.load_and_play(0, &track_a(), &mut sched);

        let signals = run(&mut transport, &mut sched, 5000);
        assert_eq!(signals, vec![TransportSignal::Loaded, TransportSignal::Ended]);
        assert_eq!(transport.state(), TransportState::Ended);
        assert!(!transport.is_polling());
        assert_eq!(transport.playback().current_track_index, 0);
    }

    // ------------------------------------------------------------------------
    // Seek and Volume Tests
    // ------------------------------------------------------------------------

    #[test]
    fn test_seek_to_percent() {
        let (mut transport, mut sched) = setup();
        transport.load_and_play(0, &track_a(), &mut sched);
        run(&mut transport, &mut sched, 0);

        assert!(transport.seek_to_percent(50.0));
        assert_relative_eq!(transport.playback().position_seconds, 90.0);

        assert!(transport.seek_to_percent(250.0));
        assert_relative_eq!(transport.playback().position_seconds, 180.0);
    }

    #[test]
    fn test_seek_without_duration_is_noop() {
        let (mut transport, mut sched) = setup();
        assert!(!transport.seek_to_percent(50.0));

        transport.load(0, &track_a(), &mut sched);
        assert!(!transport.seek_to_percent(50.0));
        assert_eq!(transport.playback().position_seconds, 0.0);
    }

    #[test]
    fn test_volume_clamped() {
        let (mut transport, _) = setup();
        assert_eq!(transport.set_volume(1.5), 1.0);
        assert_eq!(transport.set_volume(-0.2), 0.0);
        assert_eq!(transport.set_volume(f32::NAN), 0.0);
        assert_eq!(transport.backend().volume(), 0.0);
    }

    // ------------------------------------------------------------------------
    // Resource Lifecycle Tests
    // ------------------------------------------------------------------------

    #[test]
    fn test_load_releases_previous_resource_first() {
        let (mut transport, mut sched) = setup();
        transport.load_and_play(0, &track_a(), &mut sched);
        run(&mut transport, &mut sched, 3000);
        let first = transport.current_resource().unwrap();
        let position_before = transport.playback().position_seconds;

        transport.load(1, &track_b(), &mut sched);
        assert!(!transport.is_polling());
        assert!(!transport.backend().is_live(first));
        assert_eq!(transport.backend().live_resources(), 1);

        let calls = transport.backend().calls();
        let release_at = calls
            .iter()
            .position(|c| *c == BackendCall::Release(first))
            .unwrap();
        let load_b_at = calls
            .iter()
            .position(|c| matches!(c, BackendCall::Load { uri, .. } if uri == "/audio/b.mp3"))
            .unwrap();
        assert!(release_at < load_b_at);

        // Nothing from track A reaches the playback state afterwards
        assert_relative_eq!(position_before, 3.0);
        run(&mut transport, &mut sched, 8000);
        assert_eq!(transport.state(), TransportState::Ready);
        assert_eq!(transport.playback().position_seconds, 0.0);
    }

    #[test]
    fn test_stale_events_ignored() {
        let (mut transport, mut sched) = setup();
        transport.load(0, &track_a(), &mut sched);
        let stale = transport.current_resource().unwrap();
        transport.load(1, &track_b(), &mut sched);

        let signal = transport.handle_event(
            BackendEvent::Ended { resource: stale },
            &mut sched,
        );
        assert_eq!(signal, None);
        assert_eq!(transport.state(), TransportState::Loading);
    }

    #[test]
    fn test_load_error_returns_to_idle() {
        let backend = SimulatedBackend::new()
            .with_load_latency(0)
            .with_failing_uri("/audio/a.mp3");
        let mut transport = AudioTransport::new(backend, 1000, 1.0);
        let mut sched = Scheduler::new(16);
        transport.load_and_play(0, &track_a(), &mut sched);

        let signals = run(&mut transport, &mut sched, 100);
        assert_eq!(signals, vec![TransportSignal::LoadFailed]);
        assert_eq!(transport.state(), TransportState::Idle);
        assert!(transport.current_resource().is_none());
        assert_eq!(transport.backend().live_resources(), 0);
    }

    // ------------------------------------------------------------------------
    // Autoplay Retry Tests
    // ------------------------------------------------------------------------

    #[test]
    fn test_blocked_play_retries_once_on_interaction() {
        let (mut transport, mut sched) = setup();
        transport.backend_mut().block_next_plays(1);
        transport.load_and_play(0, &track_a(), &mut sched);

        let signals = run(&mut transport, &mut sched, 0);
        assert_eq!(signals, vec![TransportSignal::Loaded, TransportSignal::PlayBlocked]);
        assert!(transport.is_retry_armed());
        assert!(!transport.needs_tap_to_play());

        assert!(transport.on_user_interaction());
        run(&mut transport, &mut sched, 0);
        assert!(transport.is_playing());
        assert!(!transport.on_user_interaction());
    }

    #[test]
    fn test_second_block_surfaces_tap_to_play() {
        let (mut transport, mut sched) = setup();
        transport.backend_mut().block_next_plays(5);
        transport.load_and_play(0, &track_a(), &mut sched);
        run(&mut transport, &mut sched, 0);

        assert!(transport.on_user_interaction());
        run(&mut transport, &mut sched, 0);
        assert!(transport.needs_tap_to_play());
        assert!(!transport.is_retry_armed());

        // No automatic retry after the one-shot was spent
        assert!(!transport.on_user_interaction());
        assert_eq!(transport.last_error().unwrap().error_code(), "PLAY_BLOCKED");
    }

    #[test]
    fn test_transport_state_display() {
        assert_eq!(format!("{}", TransportState::Idle), "Idle");
        assert_eq!(format!("{}", TransportState::Playing), "Playing");
        assert_eq!(format!("{}", TransportState::Ended), "Ended");
    }
}
