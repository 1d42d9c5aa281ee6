//! Streaming audio backend seam
//!
//! The transport talks to the outside audio world only through
//! [`AudioBackend`]. Every resource the transport acquires gets a fresh
//! [`ResourceId`]; events carry the id of the resource they belong to, which
//! lets the transport drop late events from a resource it already released.

use std::fmt;

/// Identifier of one loaded audio resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct ResourceId(pub u64);

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "res#{}", self.0)
    }
}

/// Why a play request was refused
#[derive(Debug, Clone, PartialEq)]
pub enum PlayErrorKind {
    /// Autoplay policy: no user gesture on the call stack
    Blocked,
    /// Any other failure (decode, device, network)
    Failed(String),
}

/// Events emitted by the backend
#[derive(Debug, Clone, PartialEq)]
pub enum BackendEvent {
    Loaded { resource: ResourceId, duration_secs: f64 },
    Playing { resource: ResourceId },
    Paused { resource: ResourceId },
    Stopped { resource: ResourceId },
    Ended { resource: ResourceId },
    LoadError { resource: ResourceId, reason: String },
    PlayError { resource: ResourceId, kind: PlayErrorKind },
}

impl BackendEvent {
    /// Resource the event belongs to
    pub fn resource(&self) -> ResourceId {
        match self {
            BackendEvent::Loaded { resource, .. }
            | BackendEvent::Playing { resource }
            | BackendEvent::Paused { resource }
            | BackendEvent::Stopped { resource }
            | BackendEvent::Ended { resource }
            | BackendEvent::LoadError { resource, .. }
            | BackendEvent::PlayError { resource, .. } => *resource,
        }
    }
}

/// Contract of a streaming audio backend
///
/// Commands return immediately; their outcome arrives later as a
/// [`BackendEvent`] when the owner pumps [`AudioBackend::poll`].
pub trait AudioBackend {
    /// Start fetching and decoding `uri` as `resource`
    fn load(&mut self, resource: ResourceId, uri: &str, volume: f32);

    /// Stop and free `resource`. No event for it is emitted afterwards.
    fn release(&mut self, resource: ResourceId);

    fn play(&mut self, resource: ResourceId);

    fn pause(&mut self, resource: ResourceId);

    fn stop(&mut self, resource: ResourceId);

    fn seek(&mut self, resource: ResourceId, seconds: f64);

    /// Master output volume (0.0 - 1.0)
    fn set_volume(&mut self, volume: f32);

    /// Current playback position of `resource`, if it is loaded
    fn position(&self, resource: ResourceId) -> Option<f64>;

    /// Collect every event that has happened up to `now_ms`
    fn poll(&mut self, now_ms: u64) -> Vec<BackendEvent>;

    /// Time of the next event the backend already knows about
    fn next_event_at(&self) -> Option<u64>;
}
