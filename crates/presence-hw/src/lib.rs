//! presence-hw — Camera hardware access for the check-in kiosk.
//!
//! V4L2-based acquisition with scoped release, grayscale conversion, and
//! JPEG still encoding for upload to the recognition service.

pub mod camera;
pub mod frame;

pub use camera::{list_devices, CameraConfig, DeviceInfo, PixelFormat, V4lCamera};
