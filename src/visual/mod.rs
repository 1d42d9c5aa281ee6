//! Visual Module
//!
//! Intensity of the generative background effect and the easing curves used
//! to animate it.

pub mod easing;
pub mod intensity;

pub use easing::{ease_out_cubic, Easing};
pub use intensity::{EffectHandle, EffectLog, IntensityDriver, IntensityRequest, RecordingEffect};
