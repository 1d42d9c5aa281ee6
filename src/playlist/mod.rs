//! Playlist Module
//!
//! Static track list and the pure sequencing rules over it.

pub mod sequencer;
pub mod track;

pub use sequencer::{next, previous, Sequencer, SingleTrackPolicy, Step};
pub use track::{Playlist, Track};
