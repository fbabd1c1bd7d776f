//! Wire types for the recognition and check-in endpoints.

use chrono::{DateTime, Utc};
use presence_core::{CheckinAction, CheckinOutcome, DetectionResult};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
pub(crate) struct RecognizeRequest<'a> {
    pub image: &'a str,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RecognizeReply {
    pub success: bool,
    #[serde(default)]
    pub identity: Option<IdentityPayload>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct IdentityPayload {
    pub id: String,
    pub display_name: String,
    /// Anything else the service sends about the identity.
    #[serde(flatten)]
    pub metadata: serde_json::Value,
}

impl From<IdentityPayload> for DetectionResult {
    fn from(p: IdentityPayload) -> Self {
        DetectionResult {
            identity_id: p.id,
            display_name: p.display_name,
            metadata: p.metadata,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CheckinRequest<'a> {
    pub identity_id: &'a str,
    pub action: CheckinAction,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CheckinReply {
    pub success: bool,
    #[serde(default)]
    pub data: Option<CheckinRecord>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CheckinRecord {
    pub identity_id: String,
    pub action: CheckinAction,
    pub timestamp: DateTime<Utc>,
    pub record_id: String,
}

impl From<CheckinRecord> for CheckinOutcome {
    fn from(r: CheckinRecord) -> Self {
        CheckinOutcome {
            identity_id: r.identity_id,
            action: r.action,
            timestamp: r.timestamp,
            record_id: r.record_id,
        }
    }
}
