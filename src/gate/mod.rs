//! Entrance Gate Module
//!
//! First-visit gate that captures the unlock gesture.

pub mod coordinator;

pub use coordinator::{
    GateAction, GateSettings, GateState, ReturningSessionPolicy, UnlockCoordinator, UnlockState,
};
