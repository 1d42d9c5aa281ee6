//! Audio Engine Module
//!
//! Playback side of the site:
//! - Backend seam for the streaming audio element
//! - Deterministic simulated backend
//! - Transport state machine

pub mod backend;
pub mod simulated;
pub mod transport;

pub use backend::{AudioBackend, BackendEvent, PlayErrorKind, ResourceId};
pub use simulated::{BackendCall, SimulatedBackend};
pub use transport::{AudioTransport, PlaybackState, TransportSignal, TransportState};
