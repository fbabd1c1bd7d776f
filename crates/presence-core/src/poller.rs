//! Bookkeeping for the recognition poll loop.

/// Flags shared between the timer loop and request completions.
///
/// Owned by the session and mutated only through its `tick`/`stop` entry
/// points, never from nested callbacks.
#[derive(Debug, Default)]
pub(crate) struct PollerState {
    /// The loop is running; cleared by `stop` so no new tick can start.
    pub active: bool,
    /// A tick is outstanding; blocks overlapping recognition calls.
    pub busy: bool,
}

impl PollerState {
    pub fn start(&mut self) {
        self.active = true;
        self.busy = false;
    }

    /// Idempotent.
    pub fn stop(&mut self) {
        self.active = false;
        self.busy = false;
    }

    pub fn may_tick(&self) -> bool {
        self.active && !self.busy
    }
}

/// What a single poll tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// The re-entrancy guard rejected the tick (stopped, busy, or closed).
    Skipped,
    /// Recognition saw no known face; keep scanning.
    NoMatch,
    /// Positive match recorded; the poller has stopped and the camera is
    /// released.
    Matched,
    /// A positive match arrived while one was already held; discarded.
    DuplicateMatch,
    /// The in-flight request was cancelled; nothing was mutated.
    Cancelled,
    /// Capture or network failure; the next tick retries.
    TransientError,
}
