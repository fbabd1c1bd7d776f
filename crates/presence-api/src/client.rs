//! HTTP client for the remote recognition service.

use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use presence_core::{
    BackendError, CapturedFrame, CheckinAction, CheckinOutcome, DetectionResult,
    RecognitionBackend,
};
use reqwest::StatusCode;

use crate::wire::{CheckinReply, CheckinRequest, RecognizeReply, RecognizeRequest};

/// Endpoint and transport settings.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Base URL, e.g. "http://localhost:3000/api".
    pub base_url: String,
    /// Bearer token sent with every request, if the deployment needs one.
    pub auth_token: Option<String>,
    pub connect_timeout: Duration,
    /// Per-request ceiling. `None` leaves a stuck call running until the
    /// session closes it.
    pub request_timeout: Option<Duration>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000/api".into(),
            auth_token: None,
            connect_timeout: Duration::from_secs(10),
            request_timeout: Some(Duration::from_secs(15)),
        }
    }
}

/// Client for the `/recognize` and `/checkin` endpoints.
pub struct RecognitionClient {
    http: reqwest::Client,
    cfg: ApiConfig,
}

impl RecognitionClient {
    pub fn new(cfg: ApiConfig) -> Result<Self, BackendError> {
        let mut builder = reqwest::Client::builder().connect_timeout(cfg.connect_timeout);
        if let Some(timeout) = cfg.request_timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder
            .build()
            .map_err(|e| BackendError::Network(e.to_string()))?;
        Ok(Self { http, cfg })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.cfg.base_url.trim_end_matches('/'), path)
    }

    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.cfg.auth_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// Submit one frame for recognition. `Ok(None)` means no known face.
    pub async fn recognize_frame(
        &self,
        frame: &CapturedFrame,
    ) -> Result<Option<DetectionResult>, BackendError> {
        let image = BASE64.encode(&frame.image);
        let response = self
            .authorize(self.http.post(self.endpoint("recognize")))
            .json(&RecognizeRequest { image: &image })
            .send()
            .await
            .map_err(|e| BackendError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(BackendError::Status {
                status: status.as_u16(),
                message,
            });
        }

        let reply: RecognizeReply = response
            .json()
            .await
            .map_err(|e| BackendError::Network(e.to_string()))?;
        tracing::debug!(
            sequence = frame.sequence,
            matched = reply.success && reply.identity.is_some(),
            "recognize reply"
        );

        if !reply.success {
            return Ok(None);
        }
        Ok(reply.identity.map(DetectionResult::from))
    }

    /// Record a check-in or check-out for a previously recognized identity.
    pub async fn submit_checkin(
        &self,
        identity_id: &str,
        action: CheckinAction,
        timestamp: DateTime<Utc>,
    ) -> Result<CheckinOutcome, BackendError> {
        let response = self
            .authorize(self.http.post(self.endpoint("checkin")))
            .json(&CheckinRequest {
                identity_id,
                action,
                timestamp,
            })
            .send()
            .await
            .map_err(|e| BackendError::Network(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| BackendError::Network(e.to_string()))?;
        let reply: Option<CheckinReply> = serde_json::from_str(&body).ok();

        match reply {
            Some(reply) if status.is_success() && reply.success => {
                let record = reply.data.ok_or_else(|| BackendError::Status {
                    status: status.as_u16(),
                    message: "success reply without data".into(),
                })?;
                Ok(record.into())
            }
            Some(reply) => {
                let message = reply
                    .error
                    .filter(|m| !m.trim().is_empty())
                    .unwrap_or_else(|| {
                        format!("submission rejected with status {}", status.as_u16())
                    });
                Err(classify_rejection(status, message))
            }
            None => Err(BackendError::Status {
                status: status.as_u16(),
                message: body,
            }),
        }
    }
}

/// Sort a rejected submission into the error taxonomy.
///
/// Schedule-related messages must reach the user verbatim as a recoverable
/// failure, not a fatal one.
fn classify_rejection(status: StatusCode, message: String) -> BackendError {
    let lowered = message.to_lowercase();
    // Duplicate wording first: "already checked in for this shift" is a
    // duplicate even though it mentions the shift.
    if lowered.contains("already") || lowered.contains("duplicate") {
        BackendError::Duplicate(message)
    } else if lowered.contains("schedule") || lowered.contains("shift") {
        BackendError::Schedule(message)
    } else {
        BackendError::Status {
            status: status.as_u16(),
            message,
        }
    }
}

#[async_trait]
impl RecognitionBackend for RecognitionClient {
    async fn recognize(
        &self,
        frame: &CapturedFrame,
    ) -> Result<Option<DetectionResult>, BackendError> {
        self.recognize_frame(frame).await
    }

    async fn submit(
        &self,
        identity_id: &str,
        action: CheckinAction,
        timestamp: DateTime<Utc>,
    ) -> Result<CheckinOutcome, BackendError> {
        self.submit_checkin(identity_id, action, timestamp).await
    }
}
