//! presence-api — HTTP client for the recognition and check-in endpoints.
//!
//! The remote face-recognition model is opaque to this crate; it only
//! speaks the two-endpoint JSON protocol and sorts rejections into the
//! core error taxonomy.

pub mod client;
mod wire;

pub use client::{ApiConfig, RecognitionClient};
