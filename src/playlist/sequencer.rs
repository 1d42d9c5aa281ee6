//! Playlist Sequencer
//!
//! Pure index arithmetic over a fixed-length playlist. The sequencer never
//! touches the transport: callers turn its answers into `load`/`play` calls.

use serde::{Deserialize, Serialize};

/// Default position (seconds) past which "previous" restarts the current track
pub const DEFAULT_RESTART_THRESHOLD_SECS: f64 = 3.0;

/// What happens when the only track of a one-track playlist ends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SingleTrackPolicy {
    /// Start the track again
    #[default]
    Loop,
    /// Stop the transport: back to `Ready` at position 0
    Stop,
}

/// Outcome of a sequencing decision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Load and play the track at this index
    Load(usize),
    /// Seek the current track back to zero
    Restart,
    /// Do nothing further
    Stop,
}

/// Index following `current`, wrapping at the end
///
/// Returns 0 for an empty playlist.
///
/// # Example
/// ```
/// use mvr_audio::playlist::next;
/// assert_eq!(next(0, 3), 1);
/// assert_eq!(next(2, 3), 0);
/// ```
pub fn next(current: usize, len: usize) -> usize {
    if len == 0 {
        return 0;
    }
    (current + 1) % len
}

/// Index preceding `current`, or `current` itself when the track has played
/// past `threshold_secs` (the caller restarts it instead of moving back)
///
/// # Example
/// ```
/// use mvr_audio::playlist::previous;
/// assert_eq!(previous(1, 3, 5.0, 3.0), 1);
/// assert_eq!(previous(0, 3, 1.0, 3.0), 2);
/// ```
pub fn previous(current: usize, len: usize, position_secs: f64, threshold_secs: f64) -> usize {
    if len == 0 {
        return 0;
    }
    if position_secs > threshold_secs {
        return current;
    }
    (current % len + len - 1) % len
}

/// Sequencing policy: threshold and single-track behaviour
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sequencer {
    restart_threshold_secs: f64,
    single_track: SingleTrackPolicy,
}

impl Default for Sequencer {
    fn default() -> Self {
        Self::new(DEFAULT_RESTART_THRESHOLD_SECS, SingleTrackPolicy::Loop)
    }
}

impl Sequencer {
    pub fn new(restart_threshold_secs: f64, single_track: SingleTrackPolicy) -> Self {
        Self {
            restart_threshold_secs: restart_threshold_secs.max(0.0),
            single_track,
        }
    }

    pub fn restart_threshold_secs(&self) -> f64 {
        self.restart_threshold_secs
    }

    pub fn single_track(&self) -> SingleTrackPolicy {
        self.single_track
    }

    /// Decide what plays after the current track ends naturally
    pub fn after_end(&self, current: usize, len: usize) -> Step {
        match (len, self.single_track) {
            (0, _) => Step::Stop,
            (1, SingleTrackPolicy::Loop) => Step::Restart,
            (1, SingleTrackPolicy::Stop) => Step::Stop,
            _ => Step::Load(next(current, len)),
        }
    }

    /// Skip forward button
    pub fn skip_forward(&self, current: usize, len: usize) -> Step {
        if len == 0 {
            return Step::Stop;
        }
        Step::Load(next(current, len))
    }

    /// Skip back button: restart when past the threshold, otherwise move back
    pub fn skip_back(&self, current: usize, len: usize, position_secs: f64) -> Step {
        if len == 0 {
            return Step::Stop;
        }
        let target = previous(current, len, position_secs, self.restart_threshold_secs);
        if target == current && position_secs > self.restart_threshold_secs {
            Step::Restart
        } else {
            Step::Load(target)
        }
    }
}
