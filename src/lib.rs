//! MVR Audio - Unlock-and-Playback Coordinator
//!
//! Audio and visual layer of the MVR label site. Nothing plays and nothing
//! moves until the visitor passes the entrance gate; one gesture then starts
//! the playlist and ramps up the generative background.
//!
//! # Architecture
//!
//! - Unlock Coordinator (`gate`): Locked -> Unlocking -> Unlocked
//! - Audio Transport (`engine`): one live audio resource and its controls
//! - Visual Intensity Driver (`visual`): eased ramps of the background effect
//! - Playlist Sequencer (`playlist`): next/previous over a fixed track list
//!
//! Everything runs on one thread against a virtual clock (`scheduler`); the
//! `session` module owns the components and wires them together.

pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod gate;
pub mod playlist;
pub mod scheduler;
pub mod session;
pub mod state;
pub mod task;
pub mod visual;

pub use config::PlayerConfig;
pub use error::{PlayerError, Result};
pub use session::{Session, SessionView, UserAction};
