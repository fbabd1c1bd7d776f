//! Seams between the session logic and its collaborators: camera hardware,
//! the remote recognition service, and user-visible notifications.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::types::{CapturedFrame, CheckinAction, CheckinOutcome, DetectionResult};

/// Camera-side failures.
#[derive(Debug, Error)]
pub enum CaptureError {
    /// Device missing, busy, or permission denied. Fatal to the session;
    /// there is no retry without the operator fixing the device.
    #[error("camera unavailable: {0}")]
    DeviceUnavailable(String),
    /// One grab failed; the next tick may succeed.
    #[error("capture failed: {0}")]
    CaptureFailed(String),
    #[error("camera not acquired")]
    NotAcquired,
}

impl CaptureError {
    /// Transient failures degrade to "keep scanning"; everything else tears
    /// the session down.
    pub fn is_transient(&self) -> bool {
        matches!(self, CaptureError::CaptureFailed(_))
    }
}

/// Exclusive handle on a camera device.
///
/// `release` must be idempotent and safe to call before a successful
/// `acquire`; implementations also release on drop so no exit path can
/// leak the hardware.
pub trait FrameSource: Send {
    fn acquire(&mut self) -> Result<(), CaptureError>;
    /// Snapshot one encoded still from the live stream. Must not be called
    /// after `release`.
    fn capture(&mut self) -> Result<CapturedFrame, CaptureError>;
    fn release(&mut self);
}

/// Remote-side failures.
#[derive(Debug, Error)]
pub enum BackendError {
    /// Business rule: the identity has no work schedule covering the
    /// attempt. Surfaced verbatim to the user; recoverable.
    #[error("{0}")]
    Schedule(String),
    /// The identity already has a record for this slot. Recoverable.
    #[error("{0}")]
    Duplicate(String),
    /// Transport-level failure, retried by the next tick or by the user.
    #[error("network error: {0}")]
    Network(String),
    #[error("unexpected status {status}: {message}")]
    Status { status: u16, message: String },
}

/// The opaque recognition service plus the check-in endpoint.
#[async_trait]
pub trait RecognitionBackend: Send + Sync {
    /// Submit one frame. `Ok(None)` means the service saw no known face.
    async fn recognize(
        &self,
        frame: &CapturedFrame,
    ) -> Result<Option<DetectionResult>, BackendError>;

    /// Record a check-in or check-out for a recognized identity.
    async fn submit(
        &self,
        identity_id: &str,
        action: CheckinAction,
        timestamp: DateTime<Utc>,
    ) -> Result<CheckinOutcome, BackendError>;
}

/// Fire-and-forget user-visible events. Injected so the session logic has
/// no ambient dependency on any particular UI.
pub trait Notifier: Send + Sync {
    fn positive_match(&self, detection: &DetectionResult);
    fn submission_recorded(&self, outcome: &CheckinOutcome);
}

/// Notifier that drops every event. For headless drivers and tests.
pub struct NullNotifier;

impl Notifier for NullNotifier {
    fn positive_match(&self, _detection: &DetectionResult) {}
    fn submission_recorded(&self, _outcome: &CheckinOutcome) {}
}
