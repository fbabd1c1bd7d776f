use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One encoded still grabbed from the live camera stream.
///
/// Ephemeral: created per poll tick, dropped once the recognition response
/// for it has been interpreted.
#[derive(Clone)]
pub struct CapturedFrame {
    /// JPEG-encoded still image.
    pub image: Vec<u8>,
    /// Monotonic per-camera sequence number. Not reset by re-acquisition,
    /// so any late response can be ordered against the current tick.
    pub sequence: u64,
}

impl std::fmt::Debug for CapturedFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapturedFrame")
            .field("bytes", &self.image.len())
            .field("sequence", &self.sequence)
            .finish()
    }
}

/// Identity returned by the recognition service on a positive match.
///
/// Immutable once received; held by the session from `Detected` onward
/// until success, failure, or close.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionResult {
    pub identity_id: String,
    pub display_name: String,
    /// Extra identity fields the service returned, passed through untouched.
    pub metadata: serde_json::Value,
}

/// Direction of a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckinAction {
    CheckIn,
    CheckOut,
}

impl std::fmt::Display for CheckinAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            CheckinAction::CheckIn => "check-in",
            CheckinAction::CheckOut => "check-out",
        })
    }
}

/// Result of a successful check-in or check-out submission. Terminal,
/// never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckinOutcome {
    pub identity_id: String,
    pub action: CheckinAction,
    pub timestamp: DateTime<Utc>,
    pub record_id: String,
}
