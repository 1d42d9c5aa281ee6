//! Simulated audio backend
//!
//! A deterministic stand-in for a browser audio element. It does not make any
//! sound: it keeps virtual playback clocks per resource, emits the same events
//! a real backend would at the right virtual times, and journals every command
//! so tests and the CLI can see exactly what the transport asked for.

use std::collections::{BTreeMap, HashMap, HashSet};

use super::backend::{AudioBackend, BackendEvent, PlayErrorKind, ResourceId};

/// Default duration for URIs without an explicit duration
const DEFAULT_DURATION_SECS: f64 = 180.0;

/// Default load latency in milliseconds
const DEFAULT_LOAD_LATENCY_MS: u64 = 50;

/// A command the transport issued
#[derive(Debug, Clone, PartialEq)]
pub enum BackendCall {
    Load { resource: ResourceId, uri: String },
    Release(ResourceId),
    Play(ResourceId),
    Pause(ResourceId),
    Stop(ResourceId),
    Seek(ResourceId, f64),
    SetVolume(f32),
}

#[derive(Debug, Clone)]
struct SimResource {
    duration_secs: f64,
    loaded: bool,
    /// Position when playback last started or was paused
    base_position: f64,
    playing_since_ms: Option<u64>,
    end_key: Option<(u64, u64)>,
}

impl SimResource {
    fn position_at(&self, now_ms: u64) -> f64 {
        let elapsed = self
            .playing_since_ms
            .map(|since| now_ms.saturating_sub(since) as f64 / 1000.0)
            .unwrap_or(0.0);
        (self.base_position + elapsed).min(self.duration_secs)
    }
}

/// Deterministic in-memory audio backend
#[derive(Debug, Clone)]
pub struct SimulatedBackend {
    now_ms: u64,
    load_latency_ms: u64,
    default_duration_secs: f64,
    durations: HashMap<String, f64>,
    failing_uris: HashSet<String>,
    /// Number of upcoming play calls refused by the autoplay policy
    blocked_plays: u32,
    resources: HashMap<ResourceId, SimResource>,
    outbox: BTreeMap<(u64, u64), BackendEvent>,
    next_seq: u64,
    volume: f32,
    calls: Vec<BackendCall>,
}

impl Default for SimulatedBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedBackend {
    pub fn new() -> Self {
        Self {
            now_ms: 0,
            load_latency_ms: DEFAULT_LOAD_LATENCY_MS,
            default_duration_secs: DEFAULT_DURATION_SECS,
            durations: HashMap::new(),
            failing_uris: HashSet::new(),
            blocked_plays: 0,
            resources: HashMap::new(),
            outbox: BTreeMap::new(),
            next_seq: 0,
            volume: 1.0,
            calls: Vec::new(),
        }
    }

    /// Set how long a load takes before `Loaded` fires
    pub fn with_load_latency(mut self, latency_ms: u64) -> Self {
        self.load_latency_ms = latency_ms;
        self
    }

    /// Register the duration reported for `uri`
    pub fn with_duration(mut self, uri: &str, duration_secs: f64) -> Self {
        self.durations.insert(uri.to_string(), duration_secs.max(0.0));
        self
    }

    /// Make every load of `uri` fail
    pub fn with_failing_uri(mut self, uri: &str) -> Self {
        self.failing_uris.insert(uri.to_string());
        self
    }

    /// Refuse the next `count` play calls as if no gesture had happened
    pub fn block_next_plays(&mut self, count: u32) {
        self.blocked_plays = count;
    }

    /// Every command received so far, oldest first
    pub fn calls(&self) -> &[BackendCall] {
        &self.calls
    }

    pub fn clear_calls(&mut self) {
        self.calls.clear();
    }

    /// Number of resources currently held
    pub fn live_resources(&self) -> usize {
        self.resources.len()
    }

    pub fn is_live(&self, resource: ResourceId) -> bool {
        self.resources.contains_key(&resource)
    }

    pub fn is_playing(&self, resource: ResourceId) -> bool {
        self.resources
            .get(&resource)
            .map(|r| r.playing_since_ms.is_some())
            .unwrap_or(false)
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    fn push_event(&mut self, at_ms: u64, event: BackendEvent) -> (u64, u64) {
        let key = (at_ms, self.next_seq);
        self.next_seq += 1;
        self.outbox.insert(key, event);
        key
    }

    fn schedule_end(&mut self, resource: ResourceId) {
        let now = self.now_ms;
        let Some(res) = self.resources.get(&resource) else {
            return;
        };
        let remaining = (res.duration_secs - res.position_at(now)).max(0.0);
        let at = now.saturating_add((remaining * 1000.0).ceil() as u64);
        let key = self.push_event(at, BackendEvent::Ended { resource });
        if let Some(res) = self.resources.get_mut(&resource) {
            res.end_key = Some(key);
        }
    }

    fn cancel_end(&mut self, resource: ResourceId) {
        if let Some(key) = self.resources.get_mut(&resource).and_then(|r| r.end_key.take()) {
            self.outbox.remove(&key);
        }
    }
}

impl AudioBackend for SimulatedBackend {
    fn load(&mut self, resource: ResourceId, uri: &str, volume: f32) {
        self.calls.push(BackendCall::Load {
            resource,
            uri: uri.to_string(),
        });
        self.volume = volume;

        let duration_secs = self
            .durations
            .get(uri)
            .copied()
            .unwrap_or(self.default_duration_secs);
        self.resources.insert(
            resource,
            SimResource {
                duration_secs,
                loaded: false,
                base_position: 0.0,
                playing_since_ms: None,
                end_key: None,
            },
        );

        let at = self.now_ms.saturating_add(self.load_latency_ms);
        if self.failing_uris.contains(uri) {
            self.push_event(
                at,
                BackendEvent::LoadError {
                    resource,
                    reason: format!("failed to decode '{}'", uri),
                },
            );
        } else {
            self.push_event(
                at,
                BackendEvent::Loaded {
                    resource,
                    duration_secs,
                },
            );
        }
    }

    fn release(&mut self, resource: ResourceId) {
        self.calls.push(BackendCall::Release(resource));
        self.resources.remove(&resource);
        self.outbox.retain(|_, event| event.resource() != resource);
    }

    fn play(&mut self, resource: ResourceId) {
        self.calls.push(BackendCall::Play(resource));
        let now = self.now_ms;
        let playable = self
            .resources
            .get(&resource)
            .map(|r| r.loaded && r.playing_since_ms.is_none())
            .unwrap_or(false);
        if !playable {
            return;
        }

        if self.blocked_plays > 0 {
            self.blocked_plays -= 1;
            self.push_event(
                now,
                BackendEvent::PlayError {
                    resource,
                    kind: PlayErrorKind::Blocked,
                },
            );
            return;
        }

        if let Some(res) = self.resources.get_mut(&resource) {
            if res.base_position >= res.duration_secs {
                res.base_position = 0.0;
            }
            res.playing_since_ms = Some(now);
        }
        self.push_event(now, BackendEvent::Playing { resource });
        self.schedule_end(resource);
    }

    fn pause(&mut self, resource: ResourceId) {
        self.calls.push(BackendCall::Pause(resource));
        let now = self.now_ms;
        let was_playing = match self.resources.get_mut(&resource) {
            Some(res) if res.playing_since_ms.is_some() => {
                res.base_position = res.position_at(now);
                res.playing_since_ms = None;
                true
            }
            _ => false,
        };
        if was_playing {
            self.cancel_end(resource);
            self.push_event(now, BackendEvent::Paused { resource });
        }
    }

    fn stop(&mut self, resource: ResourceId) {
        self.calls.push(BackendCall::Stop(resource));
        let now = self.now_ms;
        if let Some(res) = self.resources.get_mut(&resource) {
            res.base_position = 0.0;
            res.playing_since_ms = None;
        } else {
            return;
        }
        self.cancel_end(resource);
        self.push_event(now, BackendEvent::Stopped { resource });
    }

    fn seek(&mut self, resource: ResourceId, seconds: f64) {
        self.calls.push(BackendCall::Seek(resource, seconds));
        let now = self.now_ms;
        let playing = match self.resources.get_mut(&resource) {
            Some(res) => {
                res.base_position = seconds.clamp(0.0, res.duration_secs);
                if res.playing_since_ms.is_some() {
                    res.playing_since_ms = Some(now);
                    true
                } else {
                    false
                }
            }
            None => return,
        };
        if playing {
            self.cancel_end(resource);
            self.schedule_end(resource);
        }
    }

    fn set_volume(&mut self, volume: f32) {
        self.calls.push(BackendCall::SetVolume(volume));
        self.volume = volume;
    }

    fn position(&self, resource: ResourceId) -> Option<f64> {
        self.resources
            .get(&resource)
            .map(|r| r.position_at(self.now_ms))
    }

    fn poll(&mut self, now_ms: u64) -> Vec<BackendEvent> {
        self.now_ms = self.now_ms.max(now_ms);
        let mut events = Vec::new();

        while let Some((&key, _)) = self.outbox.iter().next() {
            if key.0 > self.now_ms {
                break;
            }
            let Some(event) = self.outbox.remove(&key) else {
                break;
            };
            match &event {
                BackendEvent::Loaded { resource, .. } => {
                    if let Some(res) = self.resources.get_mut(resource) {
                        res.loaded = true;
                    }
                }
                BackendEvent::Ended { resource } => {
                    if let Some(res) = self.resources.get_mut(resource) {
                        res.base_position = res.duration_secs;
                        res.playing_since_ms = None;
                        res.end_key = None;
                    }
                }
                _ => {}
            }
            events.push(event);
        }

        events
    }

    fn next_event_at(&self) -> Option<u64> {
        self.outbox.keys().next().map(|(at, _)| *at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const A: ResourceId = ResourceId(1);

    fn loaded_backend(duration: f64) -> SimulatedBackend {
        let mut backend = SimulatedBackend::new()
            .with_load_latency(10)
            .with_duration("/audio/a.mp3", duration);
        backend.load(A, "/audio/a.mp3", 0.7);
        let events = backend.poll(10);
        assert_eq!(
            events,
            vec![BackendEvent::Loaded {
                resource: A,
                duration_secs: duration
            }]
        );
        backend
    }

    #[test]
    fn test_load_emits_after_latency() {
        let mut backend = SimulatedBackend::new().with_load_latency(50);
        backend.load(A, "/audio/a.mp3", 0.7);
        assert!(backend.poll(49).is_empty());
        assert_eq!(backend.next_event_at(), Some(50));
        assert_eq!(backend.poll(50).len(), 1);
    }

    #[test]
    fn test_endless_track_ends_at_clock_limit() {
        let mut backend = loaded_backend(f64::MAX);
        backend.play(A);
        assert_eq!(backend.poll(10), vec![BackendEvent::Playing { resource: A }]);
        assert_eq!(backend.next_event_at(), Some(u64::MAX));
        assert!(backend.poll(1_000_000).is_empty());
    }

    #[test]
    fn test_failing_uri_reports_load_error() {
        let mut backend = SimulatedBackend::new()
            .with_load_latency(0)
            .with_failing_uri("/audio/broken.mp3");
        backend.load(A, "/audio/broken.mp3", 1.0);
        let events = backend.poll(0);
        assert!(matches!(events[0], BackendEvent::LoadError { resource: A, .. }));
    }

    #[test]
    fn test_play_advances_position_and_ends() {
        let mut backend = loaded_backend(2.0);
        backend.play(A);
        assert_eq!(backend.poll(10), vec![BackendEvent::Playing { resource: A }]);

        backend.poll(1010);
        assert_relative_eq!(backend.position(A).unwrap(), 1.0);

        assert_eq!(backend.poll(2010), vec![BackendEvent::Ended { resource: A }]);
        assert!(!backend.is_playing(A));
    }

    #[test]
    fn test_pause_freezes_position() {
        let mut backend = loaded_backend(10.0);
        backend.play(A);
        assert_eq!(backend.poll(1510), vec![BackendEvent::Playing { resource: A }]);
        backend.pause(A);
        assert_eq!(backend.poll(5000), vec![BackendEvent::Paused { resource: A }]);
        assert_relative_eq!(backend.position(A).unwrap(), 1.5);
    }

    #[test]
    fn test_blocked_play() {
        let mut backend = loaded_backend(10.0);
        backend.block_next_plays(1);
        backend.play(A);
        assert_eq!(
            backend.poll(10),
            vec![BackendEvent::PlayError {
                resource: A,
                kind: PlayErrorKind::Blocked
            }]
        );

        backend.play(A);
        assert_eq!(backend.poll(10), vec![BackendEvent::Playing { resource: A }]);
    }

    #[test]
    fn test_release_drops_pending_events() {
        let mut backend = SimulatedBackend::new().with_load_latency(100);
        backend.load(A, "/audio/a.mp3", 1.0);
        backend.release(A);
        assert!(backend.poll(1000).is_empty());
        assert_eq!(backend.live_resources(), 0);
        assert!(backend.position(A).is_none());
    }

    #[test]
    fn test_seek_reschedules_end() {
        let mut backend = loaded_backend(10.0);
        backend.play(A);
        backend.poll(10);
        backend.seek(A, 9.0);
        assert_eq!(backend.next_event_at(), Some(1010));
    }
}
