use std::time::Duration;

/// Kiosk configuration, loaded from environment variables.
pub struct Config {
    /// Base URL of the recognition/check-in API.
    pub api_url: String,
    /// Bearer token for the API, if the deployment requires one.
    pub api_token: Option<String>,
    /// V4L2 device path (default: /dev/video0).
    pub camera_device: String,
    /// Cadence of recognition ticks.
    pub poll_interval: Duration,
    /// Frames discarded after acquisition (camera AGC/AE stabilization).
    pub warmup_frames: usize,
    /// JPEG quality for uploaded stills.
    pub jpeg_quality: u8,
    /// Per-request timeout; 0 disables the ceiling.
    pub request_timeout: Option<Duration>,
}

impl Config {
    /// Load configuration from `PRESENCE_*` environment variables with
    /// defaults.
    pub fn from_env() -> Self {
        Self {
            api_url: std::env::var("PRESENCE_API_URL")
                .unwrap_or_else(|_| "http://localhost:3000/api".to_string()),
            api_token: std::env::var("PRESENCE_API_TOKEN")
                .ok()
                .filter(|t| !t.is_empty()),
            camera_device: std::env::var("PRESENCE_CAMERA_DEVICE")
                .unwrap_or_else(|_| "/dev/video0".to_string()),
            poll_interval: Duration::from_millis(env_u64("PRESENCE_POLL_INTERVAL_MS", 2000)),
            warmup_frames: env_usize("PRESENCE_WARMUP_FRAMES", 4),
            jpeg_quality: env_u8("PRESENCE_JPEG_QUALITY", 80),
            request_timeout: match env_u64("PRESENCE_REQUEST_TIMEOUT_SECS", 15) {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            },
        }
    }
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u8(key: &str, default: u8) -> u8 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
