//! Continuations held by the session scheduler

/// A scheduled callback. Tokens and generations let a component recognise
/// callbacks it has since superseded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Task {
    /// Transport position poll for the polling loop tagged `token`
    PollPosition { token: u64 },
    /// Animation frame for the intensity ramp tagged `generation`
    RampFrame { generation: u64 },
    /// Remove the entrance overlay from the interaction layer
    DismissGate,
}
