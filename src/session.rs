//! Session runtime
//!
//! Owns every component of the player for one page visit and wires them
//! together: user actions go through the gate first, backend events and
//! scheduled tasks are pumped from one virtual clock, and the whole state can
//! be rendered as a [`SessionView`].

use serde::{Deserialize, Serialize};

use crate::config::PlayerConfig;
use crate::engine::{AudioBackend, AudioTransport, PlaybackState, TransportSignal, TransportState};
use crate::error::Result;
use crate::gate::{GateAction, GateState, UnlockCoordinator};
use crate::playlist::{Playlist, Sequencer, Step, Track};
use crate::scheduler::{Scheduler, TimerId};
use crate::state::PreferenceStore;
use crate::task::Task;
use crate::visual::{EffectHandle, IntensityDriver};

/// Things a visitor can do on the page
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserAction {
    /// Press the entrance button
    Enter,
    /// Play/pause button
    TogglePlay,
    Play,
    Pause,
    Stop,
    Next,
    Previous,
    /// Click on the progress bar, 0 - 100
    SeekPercent(f64),
    /// Volume slider, 0.0 - 1.0
    SetVolume(f32),
    /// Any other click, tap or key press
    Interact,
    /// Window resized
    Resize { width: u32, height: u32 },
}

impl UserAction {
    /// Pause, stop and window resizes never count as a gesture that starts audio
    fn starts_audio(&self) -> bool {
        !matches!(
            self,
            UserAction::Pause | UserAction::Stop | UserAction::Resize { .. }
        )
    }
}

/// Serialisable snapshot of everything the page renders
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionView {
    pub now_ms: u64,
    pub gate: GateState,
    pub gate_visible: bool,
    pub scroll_locked: bool,
    pub unlocked: bool,
    pub intensity: f64,
    pub track: Option<Track>,
    pub playback: PlaybackState,
    pub transport: TransportState,
    pub tap_to_play: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// One page visit
pub struct Session<B: AudioBackend> {
    config: PlayerConfig,
    playlist: Playlist,
    sequencer: Sequencer,
    sched: Scheduler<Task>,
    transport: AudioTransport<B>,
    intensity: IntensityDriver,
    gate: UnlockCoordinator,
    prefs: Box<dyn PreferenceStore>,

    /// Loads that failed in a row; bounded by `len - 1` skips
    consecutive_load_failures: usize,
    /// Whether the last load was meant to start playing
    resume_after_load: bool,
    dismiss_timer: Option<TimerId>,
}

impl<B: AudioBackend> Session<B> {
    /// Start a session
    ///
    /// The first track is preloaded but never played here. A returning
    /// session skips the gate and shows the background at full intensity.
    pub fn new(
        config: PlayerConfig,
        playlist: Playlist,
        backend: B,
        prefs: Box<dyn PreferenceStore>,
    ) -> Result<Self> {
        config.validate()?;

        let volume = prefs.volume().unwrap_or(config.default_volume);
        let transport = AudioTransport::new(backend, config.poll_interval_ms, volume);
        let sched = Scheduler::new(config.frame_interval_ms);
        let sequencer = Sequencer::new(config.restart_threshold_secs, config.single_track);
        let (gate, startup) = UnlockCoordinator::start(config.gate_settings(), prefs.unlocked());

        tracing::info!(
            tracks = playlist.len(),
            returning = gate.is_unlocked(),
            "Session started"
        );

        let mut session = Self {
            config,
            playlist,
            sequencer,
            sched,
            transport,
            intensity: IntensityDriver::new(),
            gate,
            prefs,
            consecutive_load_failures: 0,
            resume_after_load: false,
            dismiss_timer: None,
        };

        session.load_track(0, false);
        session.apply_gate_actions(startup);
        Ok(session)
    }

    // ========================================================================
    // User Actions
    // ========================================================================

    /// Apply a user action at the current time
    ///
    /// Every action except pause, stop and resize first counts as a user
    /// gesture: it retries blocked playback and starts the deferred audio of a
    /// returning session. While the entrance overlay is visible it captures everything
    /// but the entrance button.
    pub fn dispatch(&mut self, action: UserAction) {
        tracing::debug!(?action, now_ms = self.sched.now(), "User action");

        // Resizes leave the retry and the deferred start untouched
        if let UserAction::Resize { width, height } = action {
            self.intensity.resize(width, height);
            return;
        }

        let mut consumed = false;
        if action.starts_audio() {
            let retried = self.transport.on_user_interaction();
            let deferred = self.gate.on_user_interaction();
            consumed = retried || !deferred.is_empty();
            self.apply_gate_actions(deferred);
        } else {
            self.gate.cancel_deferred_audio();
        }

        if self.gate.gate_visible() {
            if action == UserAction::Enter {
                let actions = self.gate.request_unlock();
                self.apply_gate_actions(actions);
            } else {
                tracing::debug!(?action, "Ignored behind entrance gate");
            }
            return;
        }

        match action {
            UserAction::Enter | UserAction::Interact | UserAction::Resize { .. } => {}
            UserAction::TogglePlay => {
                if consumed {
                    return;
                }
                if self.transport.wants_playback() {
                    self.resume_after_load = false;
                    self.transport.pause(&mut self.sched);
                } else {
                    self.start_playback();
                }
            }
            UserAction::Play => {
                if !consumed {
                    self.start_playback();
                }
            }
            UserAction::Pause => {
                self.resume_after_load = false;
                self.transport.pause(&mut self.sched);
            }
            UserAction::Stop => {
                self.resume_after_load = false;
                self.transport.stop(&mut self.sched);
            }
            UserAction::Next => {
                let playback = self.transport.playback();
                let step = self
                    .sequencer
                    .skip_forward(playback.current_track_index, self.playlist.len());
                let resume = self.transport.wants_playback();
                self.consecutive_load_failures = 0;
                self.apply_step(step, resume);
            }
            UserAction::Previous => {
                let playback = self.transport.playback();
                let step = self.sequencer.skip_back(
                    playback.current_track_index,
                    self.playlist.len(),
                    playback.position_seconds,
                );
                let resume = self.transport.wants_playback();
                self.consecutive_load_failures = 0;
                self.apply_step(step, resume);
            }
            UserAction::SeekPercent(percent) => {
                self.transport.seek_to_percent(percent);
            }
            UserAction::SetVolume(volume) => {
                let applied = self.transport.set_volume(volume);
                if let Err(e) = self.prefs.set_volume(applied) {
                    tracing::warn!(error = %e, "Could not persist volume");
                }
            }
        }
    }

    /// Attach the background effect once it finished initialising
    pub fn attach_effect(&mut self, handle: Box<dyn EffectHandle>) {
        self.intensity.attach(handle, &mut self.sched);
    }

    /// Tear the background effect down
    pub fn detach_effect(&mut self) {
        self.intensity.detach(&mut self.sched);
    }

    // ========================================================================
    // Clock
    // ========================================================================

    /// Run every backend event and scheduled task due up to `until_ms`
    pub fn run_until(&mut self, until_ms: u64) {
        loop {
            let due = [self.sched.next_due(), self.transport.backend().next_event_at()]
                .into_iter()
                .flatten()
                .min();
            let Some(due) = due.filter(|d| *d <= until_ms) else {
                break;
            };
            self.sched.advance_to(due);
            self.pump_backend(due);
            while let Some((_, task)) = self.sched.pop_due(due) {
                self.run_task(task);
            }
        }
        self.sched.advance_to(until_ms);
        self.pump_backend(until_ms);
    }

    /// Move the clock forward by `delta_ms`
    pub fn advance(&mut self, delta_ms: u64) {
        let until = self.sched.now().saturating_add(delta_ms);
        self.run_until(until);
    }

    fn pump_backend(&mut self, now_ms: u64) {
        for event in self.transport.backend_mut().poll(now_ms) {
            if let Some(signal) = self.transport.handle_event(event, &mut self.sched) {
                self.handle_signal(signal);
            }
        }
    }

    fn run_task(&mut self, task: Task) {
        match task {
            Task::PollPosition { token } => {
                self.transport.on_poll(token);
            }
            Task::RampFrame { generation } => {
                self.intensity.on_frame(generation, &mut self.sched);
            }
            Task::DismissGate => {
                self.dismiss_timer = None;
                self.gate.on_dismiss();
            }
        }
    }

    // ========================================================================
    // Wiring
    // ========================================================================

    fn apply_gate_actions(&mut self, actions: Vec<GateAction>) {
        for action in actions {
            match action {
                GateAction::StartRamp {
                    target,
                    duration_ms,
                    easing,
                } => {
                    self.intensity
                        .ramp_to(target, duration_ms, easing, &mut self.sched);
                }
                GateAction::SetIntensity(value) => {
                    self.intensity.set_immediate(value, &mut self.sched);
                }
                GateAction::PersistUnlocked => {
                    if let Err(e) = self.prefs.set_unlocked(true) {
                        tracing::warn!(error = %e, "Could not persist unlock state");
                    }
                }
                GateAction::StartPlayback => self.start_playback(),
                GateAction::ScheduleDismiss { delay_ms } => {
                    if let Some(timer) = self.dismiss_timer.take() {
                        self.sched.cancel(timer);
                    }
                    self.dismiss_timer = Some(self.sched.set_timeout(delay_ms, Task::DismissGate));
                }
            }
        }
    }

    /// Play the current track, loading it first if nothing is loaded
    fn start_playback(&mut self) {
        if !self.gate.is_unlocked() {
            tracing::debug!("Playback refused while locked");
            return;
        }
        if self.transport.current_resource().is_some() {
            self.resume_after_load = true;
            self.transport.play();
        } else {
            let index = self.transport.playback().current_track_index;
            self.consecutive_load_failures = 0;
            self.load_track(index, true);
        }
    }

    fn load_track(&mut self, index: usize, play: bool) {
        let Some(track) = self.playlist.get(index) else {
            return;
        };
        let play = play && self.gate.is_unlocked();
        self.resume_after_load = play;
        tracing::info!(index, title = %track.title, play, "Loading track");

        let signal = if play {
            self.transport.load_and_play(index, track, &mut self.sched)
        } else {
            self.transport.load(index, track, &mut self.sched)
        };
        if let Some(signal) = signal {
            self.handle_signal(signal);
        }
    }

    fn apply_step(&mut self, step: Step, play: bool) {
        match step {
            Step::Load(index) => self.load_track(index, play),
            Step::Restart => {
                self.transport.restart();
                if play && !self.transport.wants_playback() {
                    self.transport.play();
                }
            }
            Step::Stop => self.transport.stop(&mut self.sched),
        }
    }

    fn handle_signal(&mut self, signal: TransportSignal) {
        let index = self.transport.playback().current_track_index;
        match signal {
            TransportSignal::Loaded => {
                self.consecutive_load_failures = 0;
            }
            TransportSignal::LoadFailed => {
                let len = self.playlist.len();
                if !self.config.skip_failed_tracks
                    || self.consecutive_load_failures + 1 >= len
                {
                    tracing::warn!(index, "Track failed to load, giving up");
                    return;
                }
                self.consecutive_load_failures += 1;
                tracing::warn!(index, "Track failed to load, skipping");
                let step = self.sequencer.skip_forward(index, len);
                self.apply_step(step, self.resume_after_load);
            }
            TransportSignal::Ended => {
                let step = self.sequencer.after_end(index, self.playlist.len());
                tracing::info!(index, ?step, "Track ended");
                self.apply_step(step, true);
            }
            TransportSignal::PlayBlocked => {
                tracing::warn!(
                    index,
                    tap_to_play = self.transport.needs_tap_to_play(),
                    "Playback blocked"
                );
            }
            TransportSignal::PlayFailed => {
                tracing::warn!(index, "Playback failed");
            }
        }
    }

    // ========================================================================
    // State Queries
    // ========================================================================

    pub fn view(&self) -> SessionView {
        let playback = self.transport.playback().clone();
        let error = self.transport.last_error();
        SessionView {
            now_ms: self.sched.now(),
            gate: self.gate.state(),
            gate_visible: self.gate.gate_visible(),
            scroll_locked: self.gate.scroll_locked(),
            unlocked: self.gate.is_unlocked(),
            intensity: self.intensity.value(),
            track: self.playlist.get(playback.current_track_index).cloned(),
            transport: self.transport.state(),
            tap_to_play: self.transport.needs_tap_to_play(),
            error: error.map(|e| e.error_code().to_string()),
            message: error
                .and_then(|e| e.recovery_suggestion())
                .map(str::to_string),
            playback,
        }
    }

    pub fn now(&self) -> u64 {
        self.sched.now()
    }

    pub fn config(&self) -> &PlayerConfig {
        &self.config
    }

    pub fn playlist(&self) -> &Playlist {
        &self.playlist
    }

    pub fn transport(&self) -> &AudioTransport<B> {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut AudioTransport<B> {
        &mut self.transport
    }

    pub fn intensity(&self) -> &IntensityDriver {
        &self.intensity
    }

    pub fn gate(&self) -> &UnlockCoordinator {
        &self.gate
    }

    pub fn preferences(&self) -> &dyn PreferenceStore {
        self.prefs.as_ref()
    }
}
