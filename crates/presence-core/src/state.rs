//! Session state machine: states, events, and the transition table.

use thiserror::Error;

/// Lifecycle state of one check-in session. Exactly one state is active at
/// a time; every change goes through [`transition`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Scanning,
    Detected,
    Submitting,
    Success,
    Failed,
}

impl SessionState {
    /// Terminal states accept no further flow events (close is always legal).
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Success | SessionState::Failed)
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            SessionState::Idle => "idle",
            SessionState::Scanning => "scanning",
            SessionState::Detected => "detected",
            SessionState::Submitting => "submitting",
            SessionState::Success => "success",
            SessionState::Failed => "failed",
        })
    }
}

/// Events that drive the session state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    Open,
    PositiveMatch,
    Retake,
    Submit,
    SubmitSucceeded,
    SubmitFailed,
    FatalError,
    Close,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("illegal transition: {event:?} in state {state}")]
pub struct IllegalTransition {
    pub state: SessionState,
    pub event: SessionEvent,
}

/// Transition function over (state, event).
///
/// `Close` and `FatalError` are legal from every state; everything else is
/// rejected unless it appears in the table.
pub fn transition(
    state: SessionState,
    event: SessionEvent,
) -> Result<SessionState, IllegalTransition> {
    use SessionEvent::*;
    use SessionState::*;

    let next = match (state, event) {
        (_, Close) => Idle,
        (_, FatalError) => Failed,
        (Idle, Open) => Scanning,
        (Scanning, PositiveMatch) => Detected,
        (Detected, Retake) => Scanning,
        (Detected, Submit) => Submitting,
        (Submitting, SubmitSucceeded) => Success,
        (Submitting, SubmitFailed) => Detected,
        _ => return Err(IllegalTransition { state, event }),
    };
    Ok(next)
}
