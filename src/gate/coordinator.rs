//! Unlock Coordinator
//!
//! Gates all audio and visual activity behind one explicit user gesture.
//! The coordinator does not touch the transport, the intensity driver or the
//! preference store itself: it answers each input with the list of
//! [`GateAction`]s the session must issue in the same synchronous turn, which
//! keeps the audio start inside the gesture's call stack.
//!
//! ```text
//! Locked --request_unlock--> Unlocking --dismiss timer--> Unlocked
//! ```

use std::fmt;

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::visual::Easing;

/// Entrance gate states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GateState {
    /// Overlay shown, scroll locked, nothing playing
    Locked,
    /// Gesture received, overlay animating out
    Unlocking,
    /// Overlay gone
    Unlocked,
}

impl fmt::Display for GateState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GateState::Locked => write!(f, "Locked"),
            GateState::Unlocking => write!(f, "Unlocking"),
            GateState::Unlocked => write!(f, "Unlocked"),
        }
    }
}

/// How a visitor returning within the same session is greeted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReturningSessionPolicy {
    /// Skip the gate; the first interaction anywhere starts the audio
    #[default]
    DeferUntilGesture,
    /// Skip the gate; audio waits for the play button
    StayPaused,
}

/// Session-scoped unlock flag. Goes from false to true once and stays there.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct UnlockState {
    is_unlocked: bool,
}

impl UnlockState {
    pub fn is_unlocked(&self) -> bool {
        self.is_unlocked
    }

    fn unlock(&mut self) {
        self.is_unlocked = true;
    }
}

/// Side effects the session performs on the coordinator's behalf
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GateAction {
    /// Ramp the background intensity
    StartRamp {
        target: f64,
        duration_ms: u64,
        easing: Easing,
    },
    /// Set the background intensity without animation
    SetIntensity(f64),
    /// Persist `unlocked = true` for the session
    PersistUnlocked,
    /// Load and play the current track
    StartPlayback,
    /// Fire the gate-dismissed callback after a delay
    ScheduleDismiss { delay_ms: u64 },
}

/// Tuning of the unlock transition
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GateSettings {
    pub ramp_target: f64,
    pub ramp_duration_ms: u64,
    pub easing: Easing,
    pub dismiss_delay_ms: u64,
    pub returning_session: ReturningSessionPolicy,
}

impl Default for GateSettings {
    fn default() -> Self {
        Self {
            ramp_target: 2.0,
            ramp_duration_ms: 1500,
            easing: Easing::EaseOutCubic,
            dismiss_delay_ms: 600,
            returning_session: ReturningSessionPolicy::DeferUntilGesture,
        }
    }
}

/// Orchestrates the locked -> unlocked transition
#[derive(Debug, Clone)]
pub struct UnlockCoordinator {
    settings: GateSettings,
    state: GateState,
    unlock: UnlockState,
    gate_visible: bool,
    /// Returning session waiting for an interaction to start audio
    audio_deferred: bool,
}

impl UnlockCoordinator {
    /// Create a coordinator from the persisted session flag
    ///
    /// Returns the coordinator and the actions to run at start-up. A returning
    /// session skips the gate and gets the final intensity at once; audio is
    /// never started here because no gesture is on the stack.
    pub fn start(settings: GateSettings, persisted_unlocked: bool) -> (Self, Vec<GateAction>) {
        let mut coordinator = Self {
            settings,
            state: GateState::Locked,
            unlock: UnlockState::default(),
            gate_visible: true,
            audio_deferred: false,
        };

        if !persisted_unlocked {
            debug!("[GATE] Fresh session, gate locked");
            return (coordinator, Vec::new());
        }

        coordinator.unlock.unlock();
        coordinator.state = GateState::Unlocked;
        coordinator.gate_visible = false;
        coordinator.audio_deferred =
            settings.returning_session == ReturningSessionPolicy::DeferUntilGesture;
        info!(
            "[GATE] Returning session, gate skipped ({:?})",
            settings.returning_session
        );
        (
            coordinator,
            vec![GateAction::SetIntensity(settings.ramp_target)],
        )
    }

    /// The visitor pressed the entrance button
    ///
    /// Only the first call does anything.
    pub fn request_unlock(&mut self) -> Vec<GateAction> {
        if self.state != GateState::Locked {
            debug!("[GATE] Unlock already {}", self.state);
            return Vec::new();
        }

        self.state = GateState::Unlocking;
        self.unlock.unlock();
        info!("[GATE] Unlocking");

        vec![
            GateAction::StartRamp {
                target: self.settings.ramp_target,
                duration_ms: self.settings.ramp_duration_ms,
                easing: self.settings.easing,
            },
            GateAction::PersistUnlocked,
            GateAction::StartPlayback,
            GateAction::ScheduleDismiss {
                delay_ms: self.settings.dismiss_delay_ms,
            },
        ]
    }

    /// Dismiss timer fired. Returns true if the overlay was removed.
    pub fn on_dismiss(&mut self) -> bool {
        if self.state != GateState::Unlocking {
            return false;
        }
        self.state = GateState::Unlocked;
        self.gate_visible = false;
        debug!("[GATE] Overlay dismissed");
        true
    }

    /// Any user interaction after start-up
    ///
    /// Starts deferred audio of a returning session, once.
    pub fn on_user_interaction(&mut self) -> Vec<GateAction> {
        if !self.audio_deferred {
            return Vec::new();
        }
        self.audio_deferred = false;
        info!("[GATE] First interaction of returning session, starting audio");
        vec![GateAction::StartPlayback]
    }

    /// Drop a pending deferred start (the visitor chose playback explicitly)
    pub fn cancel_deferred_audio(&mut self) {
        self.audio_deferred = false;
    }

    // ========================================================================
    // State Queries
    // ========================================================================

    pub fn state(&self) -> GateState {
        self.state
    }

    pub fn unlock_state(&self) -> UnlockState {
        self.unlock
    }

    pub fn is_unlocked(&self) -> bool {
        self.unlock.is_unlocked()
    }

    /// Whether the entrance overlay still captures interaction
    pub fn gate_visible(&self) -> bool {
        self.gate_visible
    }

    /// Page scroll is locked exactly while the site is locked
    pub fn scroll_locked(&self) -> bool {
        !self.unlock.is_unlocked()
    }

    pub fn audio_deferred(&self) -> bool {
        self.audio_deferred
    }

    pub fn settings(&self) -> &GateSettings {
        &self.settings
    }
}
