//! One open/close cycle of the check-in flow.
//!
//! The session owns the camera, the poll-loop flags, and the single slot
//! for an in-flight cancellable request. Everything runs on one async task;
//! a clonable [`SessionHandle`] is the only way to interrupt it from the
//! outside, and every suspension point observes that signal.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use thiserror::Error;
use tokio::time::MissedTickBehavior;
use uuid::Uuid;

use crate::cancel::{cancel_pair, CancelHandle, CancelSignal, Outcome};
use crate::poller::{PollerState, TickOutcome};
use crate::state::{transition, IllegalTransition, SessionEvent, SessionState};
use crate::traits::{BackendError, CaptureError, FrameSource, Notifier, RecognitionBackend};
use crate::types::{CheckinAction, CheckinOutcome, DetectionResult};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Transition(#[from] IllegalTransition),
    /// Fatal camera failure; the session has been torn down.
    #[error(transparent)]
    Camera(#[from] CaptureError),
    /// Recoverable submission failure; the session is back in `Detected`.
    #[error(transparent)]
    Backend(#[from] BackendError),
    /// The operation was cancelled by a close. Not a real error; discard.
    #[error("cancelled")]
    Cancelled,
    #[error("session is not scanning (state: {0})")]
    NotScanning(SessionState),
}

/// Tuning knobs for one session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Cadence of recognition ticks.
    pub poll_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(2000),
        }
    }
}

/// How a scan loop ended.
#[derive(Debug, Clone)]
pub enum ScanOutcome {
    /// The service recognized somebody; the camera is released and the
    /// session is in `Detected`.
    Detected(DetectionResult),
    /// The session was closed before any match.
    Closed,
}

/// Clonable handle for requesting close from outside the owning task
/// (ctrl-c handler, UI button, test harness).
#[derive(Debug, Clone)]
pub struct SessionHandle {
    close: CancelHandle,
}

impl SessionHandle {
    /// Ask the session to tear down. Idempotent. Any in-flight request is
    /// cancelled at its next suspension point.
    pub fn close(&self) {
        self.close.cancel();
    }
}

/// The check-in flow controller.
pub struct CheckinSession {
    id: Uuid,
    cfg: SessionConfig,
    frames: Box<dyn FrameSource>,
    backend: Arc<dyn RecognitionBackend>,
    notifier: Arc<dyn Notifier>,
    state: SessionState,
    open: bool,
    poller: PollerState,
    detection: Option<DetectionResult>,
    last_error: Option<String>,
    /// At most one in-flight cancellable request at any time: either a
    /// recognition tick or the final submission, never both.
    pending: Option<CancelHandle>,
    close_signal: CancelSignal,
}

impl CheckinSession {
    pub fn new(
        cfg: SessionConfig,
        frames: Box<dyn FrameSource>,
        backend: Arc<dyn RecognitionBackend>,
        notifier: Arc<dyn Notifier>,
    ) -> (Self, SessionHandle) {
        let (close_handle, close_signal) = cancel_pair();
        let session = Self {
            id: Uuid::new_v4(),
            cfg,
            frames,
            backend,
            notifier,
            state: SessionState::Idle,
            open: false,
            poller: PollerState::default(),
            detection: None,
            last_error: None,
            pending: None,
            close_signal,
        };
        let handle = SessionHandle {
            close: close_handle,
        };
        (session, handle)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    /// The identity held since the last positive match, if any.
    pub fn detection(&self) -> Option<&DetectionResult> {
        self.detection.as_ref()
    }

    /// Message from the last recoverable submission failure.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// `Idle -> Scanning`: acquire the camera and arm the poller.
    ///
    /// A session closed earlier can be re-opened; the camera is acquired
    /// freshly each time.
    pub fn open(&mut self) -> Result<(), SessionError> {
        self.state = transition(self.state, SessionEvent::Open)?;
        if let Err(e) = self.frames.acquire() {
            tracing::error!(session = %self.id, error = %e, "camera acquisition failed");
            self.fail();
            return Err(SessionError::Camera(e));
        }
        self.open = true;
        self.detection = None;
        self.last_error = None;
        self.poller.start();
        tracing::info!(session = %self.id, "session opened, scanning");
        Ok(())
    }

    /// Drive recognition ticks at the configured cadence until a positive
    /// match or a close request.
    pub async fn scan(&mut self) -> Result<ScanOutcome, SessionError> {
        if self.state != SessionState::Scanning {
            return Err(SessionError::NotScanning(self.state));
        }

        let mut ticker = tokio::time::interval(self.cfg.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut close = self.close_signal.clone();

        loop {
            tokio::select! {
                _ = close.fired() => {
                    self.close();
                    return Ok(ScanOutcome::Closed);
                }
                _ = ticker.tick() => {
                    match self.tick().await? {
                        TickOutcome::Matched => {
                            let Some(detection) = self.detection.clone() else {
                                debug_assert!(false, "matched tick must record a detection");
                                continue;
                            };
                            return Ok(ScanOutcome::Detected(detection));
                        }
                        TickOutcome::Cancelled => {
                            self.close();
                            return Ok(ScanOutcome::Closed);
                        }
                        _ => {}
                    }
                }
            }
        }
    }

    /// One iteration of the recognition loop: capture, submit, interpret.
    ///
    /// Public so drivers and tests can pace ticks themselves; [`scan`] is
    /// the timer-driven wrapper.
    ///
    /// [`scan`]: CheckinSession::scan
    pub async fn tick(&mut self) -> Result<TickOutcome, SessionError> {
        if !self.open || !self.poller.may_tick() {
            return Ok(TickOutcome::Skipped);
        }
        self.poller.busy = true;

        let frame = match self.frames.capture() {
            Ok(frame) => frame,
            Err(e) if e.is_transient() => {
                tracing::warn!(session = %self.id, error = %e, "frame capture failed, retrying next tick");
                self.poller.busy = false;
                return Ok(TickOutcome::TransientError);
            }
            Err(e) => {
                self.fail();
                return Err(SessionError::Camera(e));
            }
        };
        let sequence = frame.sequence;

        let (handle, signal) = cancel_pair();
        self.pending = Some(handle);

        let backend = Arc::clone(&self.backend);
        let mut close = self.close_signal.clone();
        let result = {
            let fut = signal.bind(backend.recognize(&frame));
            tokio::pin!(fut);
            tokio::select! {
                out = &mut fut => out,
                _ = close.fired() => Outcome::Cancelled,
            }
        };
        self.pending = None;
        self.poller.busy = false;

        match result {
            Outcome::Cancelled => Ok(TickOutcome::Cancelled),
            Outcome::Done(Ok(Some(detection))) => {
                if !self.poller.active || self.detection.is_some() {
                    // A match is already recorded; a late duplicate from an
                    // earlier frame is dropped without reaching the user.
                    tracing::debug!(session = %self.id, sequence, "duplicate match discarded");
                    return Ok(TickOutcome::DuplicateMatch);
                }
                self.state = transition(self.state, SessionEvent::PositiveMatch)?;
                self.stop_polling();
                self.detection = Some(detection.clone());
                tracing::info!(
                    session = %self.id,
                    identity = %detection.identity_id,
                    name = %detection.display_name,
                    sequence,
                    "positive match, camera released"
                );
                self.notifier.positive_match(&detection);
                Ok(TickOutcome::Matched)
            }
            Outcome::Done(Ok(None)) => {
                tracing::debug!(session = %self.id, sequence, "no match");
                Ok(TickOutcome::NoMatch)
            }
            Outcome::Done(Err(e)) => {
                tracing::warn!(
                    session = %self.id,
                    sequence,
                    error = %e,
                    "recognition request failed, retrying next tick"
                );
                Ok(TickOutcome::TransientError)
            }
        }
    }

    /// `Detected -> Scanning`: drop the held identity and resume polling
    /// with a freshly acquired camera.
    pub fn retake(&mut self) -> Result<(), SessionError> {
        self.state = transition(self.state, SessionEvent::Retake)?;
        self.detection = None;
        self.last_error = None;
        if let Err(e) = self.frames.acquire() {
            tracing::error!(session = %self.id, error = %e, "camera re-acquisition failed");
            self.fail();
            return Err(SessionError::Camera(e));
        }
        self.poller.start();
        tracing::info!(session = %self.id, "retake requested, scanning resumed");
        Ok(())
    }

    /// Submit the detected identity for `action`.
    ///
    /// On success the session is terminal (`Success`). Schedule, duplicate
    /// and network failures are recoverable: the session returns to
    /// `Detected` with the message kept for display, and the caller may
    /// retry or retake. A close during the request resolves to
    /// [`SessionError::Cancelled`] and mutates nothing.
    pub async fn submit(&mut self, action: CheckinAction) -> Result<CheckinOutcome, SessionError> {
        let Some(detection) = self.detection.clone() else {
            return Err(IllegalTransition {
                state: self.state,
                event: SessionEvent::Submit,
            }
            .into());
        };
        self.state = transition(self.state, SessionEvent::Submit)?;
        self.last_error = None;

        let timestamp = Utc::now();
        let (handle, signal) = cancel_pair();
        self.pending = Some(handle);

        let backend = Arc::clone(&self.backend);
        let mut close = self.close_signal.clone();
        let result = {
            let fut = signal.bind(backend.submit(&detection.identity_id, action, timestamp));
            tokio::pin!(fut);
            tokio::select! {
                out = &mut fut => out,
                _ = close.fired() => Outcome::Cancelled,
            }
        };
        self.pending = None;

        match result {
            Outcome::Cancelled => Err(SessionError::Cancelled),
            Outcome::Done(Ok(outcome)) => {
                self.state = transition(self.state, SessionEvent::SubmitSucceeded)?;
                tracing::info!(
                    session = %self.id,
                    identity = %outcome.identity_id,
                    action = %action,
                    record = %outcome.record_id,
                    "submission recorded"
                );
                self.notifier.submission_recorded(&outcome);
                Ok(outcome)
            }
            Outcome::Done(Err(e)) => {
                self.state = transition(self.state, SessionEvent::SubmitFailed)?;
                self.last_error = Some(e.to_string());
                tracing::warn!(
                    session = %self.id,
                    error = %e,
                    "submission failed, returning to detected"
                );
                Err(SessionError::Backend(e))
            }
        }
    }

    /// Tear the session down: stop the poller, cancel any in-flight
    /// request, release the camera, drop all session data. Legal from any
    /// state and safe to call repeatedly.
    pub fn close(&mut self) {
        let was_open = self.open;
        self.stop_polling();
        self.open = false;
        self.detection = None;
        self.last_error = None;
        // Close is legal from every state.
        self.state = SessionState::Idle;
        if was_open {
            tracing::info!(session = %self.id, "session closed");
        }
    }

    /// Stop the recognition loop: no new ticks, cancel any in-flight
    /// request, release the camera. Idempotent; the three actions always
    /// happen together.
    fn stop_polling(&mut self) {
        self.poller.stop();
        if let Some(pending) = self.pending.take() {
            pending.cancel();
        }
        self.frames.release();
    }

    /// Fatal-path teardown: everything stopped, state `Failed`.
    fn fail(&mut self) {
        self.stop_polling();
        self.open = false;
        // FatalError is legal from every state.
        self.state = SessionState::Failed;
    }
}
