//! Player configuration
//!
//! Every tuning constant of the player in one serde struct. Missing fields
//! take their defaults, so an empty JSON object is a valid configuration.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::engine::transport::DEFAULT_POLL_INTERVAL_MS;
use crate::error::{PlayerError, Result};
use crate::gate::{GateSettings, ReturningSessionPolicy};
use crate::playlist::sequencer::DEFAULT_RESTART_THRESHOLD_SECS;
use crate::playlist::SingleTrackPolicy;
use crate::scheduler::DEFAULT_FRAME_INTERVAL_MS;
use crate::visual::Easing;

/// Intensity reached at the end of the unlock ramp
pub const DEFAULT_RAMP_TARGET: f64 = 2.0;

/// Length of the unlock ramp
pub const DEFAULT_RAMP_DURATION_MS: u64 = 1500;

/// Delay between the unlock gesture and removal of the entrance overlay
pub const DEFAULT_GATE_DISMISS_DELAY_MS: u64 = 600;

/// Volume used when the visitor never chose one
pub const DEFAULT_VOLUME: f32 = 0.7;

/// Upper bound for the ramp target
const MAX_RAMP_TARGET: f64 = 10.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    pub ramp_target: f64,
    pub ramp_duration_ms: u64,
    pub easing: Easing,
    pub gate_dismiss_delay_ms: u64,
    pub poll_interval_ms: u64,
    pub frame_interval_ms: u64,
    pub restart_threshold_secs: f64,
    pub default_volume: f32,
    pub single_track: SingleTrackPolicy,
    pub returning_session: ReturningSessionPolicy,
    /// Advance past tracks that fail to load
    pub skip_failed_tracks: bool,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            ramp_target: DEFAULT_RAMP_TARGET,
            ramp_duration_ms: DEFAULT_RAMP_DURATION_MS,
            easing: Easing::EaseOutCubic,
            gate_dismiss_delay_ms: DEFAULT_GATE_DISMISS_DELAY_MS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            frame_interval_ms: DEFAULT_FRAME_INTERVAL_MS,
            restart_threshold_secs: DEFAULT_RESTART_THRESHOLD_SECS,
            default_volume: DEFAULT_VOLUME,
            single_track: SingleTrackPolicy::Loop,
            returning_session: ReturningSessionPolicy::DeferUntilGesture,
            skip_failed_tracks: true,
        }
    }
}

impl PlayerConfig {
    /// Parse and validate a JSON configuration
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a configuration file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| PlayerError::FileReadError {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_json(&content)
    }

    pub fn validate(&self) -> Result<()> {
        fn invalid(reason: String) -> Result<()> {
            Err(PlayerError::InvalidConfig { reason })
        }

        if self.poll_interval_ms == 0 {
            return invalid("poll_interval_ms must be positive".to_string());
        }
        if self.frame_interval_ms == 0 {
            return invalid("frame_interval_ms must be positive".to_string());
        }
        if !self.ramp_target.is_finite() || self.ramp_target < 0.0 || self.ramp_target > MAX_RAMP_TARGET
        {
            return invalid(format!(
                "ramp_target must be within 0..={}, got {}",
                MAX_RAMP_TARGET, self.ramp_target
            ));
        }
        if !(0.0..=1.0).contains(&self.default_volume) {
            return invalid(format!(
                "default_volume must be within 0..=1, got {}",
                self.default_volume
            ));
        }
        if !self.restart_threshold_secs.is_finite() || self.restart_threshold_secs < 0.0 {
            return invalid(format!(
                "restart_threshold_secs must be non-negative, got {}",
                self.restart_threshold_secs
            ));
        }
        Ok(())
    }

    /// Settings for the unlock coordinator
    pub fn gate_settings(&self) -> GateSettings {
        GateSettings {
            ramp_target: self.ramp_target,
            ramp_duration_ms: self.ramp_duration_ms,
            easing: self.easing,
            dismiss_delay_ms: self.gate_dismiss_delay_ms,
            returning_session: self.returning_session,
        }
    }
}
