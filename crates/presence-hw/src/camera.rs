//! V4L2 camera acquisition and frame capture via the `v4l` crate.

use std::path::Path;

use presence_core::{CaptureError, CapturedFrame, FrameSource};
use v4l::buffer::Type as BufType;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;
use v4l::FourCC;

use crate::frame;

/// Camera tuning for the check-in kiosk.
#[derive(Debug, Clone)]
pub struct CameraConfig {
    /// V4L2 device path (e.g., "/dev/video0").
    pub device: String,
    /// Frames discarded right after acquisition for AGC/AE stabilization.
    pub warmup_frames: usize,
    /// JPEG quality for encoded stills (1-100).
    pub jpeg_quality: u8,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            device: "/dev/video0".into(),
            warmup_frames: 4,
            jpeg_quality: 80,
        }
    }
}

/// Negotiated pixel format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// YUYV 4:2:2 packed (2 bytes/pixel, extract Y channel).
    Yuyv,
    /// 8-bit grayscale (native IR camera output).
    Grey,
    /// 16-bit little-endian grayscale.
    Y16,
}

/// Open device handle plus the negotiated geometry. Dropping it stops the
/// capture and frees the hardware for other consumers.
struct LiveStream {
    device: Device,
    width: u32,
    height: u32,
    pixel_format: PixelFormat,
}

/// Exclusive V4L2 camera resource with scoped acquisition.
///
/// `acquire` opens and configures the device; `release` drops the handle.
/// Release also runs on drop, so no exit path can leak the device.
pub struct V4lCamera {
    cfg: CameraConfig,
    live: Option<LiveStream>,
    sequence: u64,
}

impl V4lCamera {
    pub fn new(cfg: CameraConfig) -> Self {
        Self {
            cfg,
            live: None,
            sequence: 0,
        }
    }

    fn open_stream(cfg: &CameraConfig) -> Result<LiveStream, CaptureError> {
        let path = &cfg.device;
        if !Path::new(path).exists() {
            return Err(CaptureError::DeviceUnavailable(format!(
                "{path}: no such device"
            )));
        }

        let device = Device::with_path(path).map_err(|e| {
            if e.to_string().contains("busy") || e.to_string().contains("EBUSY") {
                CaptureError::DeviceUnavailable(format!("{path}: device busy"))
            } else {
                CaptureError::DeviceUnavailable(format!("{path}: {e}"))
            }
        })?;

        let caps = device.query_caps().map_err(|e| {
            CaptureError::DeviceUnavailable(format!("failed to query capabilities: {e}"))
        })?;
        if !caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE) {
            return Err(CaptureError::DeviceUnavailable(format!(
                "{path}: video capture not supported"
            )));
        }

        // 640x360 keeps recognition uploads small; accept whatever the
        // driver actually negotiates.
        let mut fmt = device.format().map_err(|e| {
            CaptureError::DeviceUnavailable(format!("failed to get format: {e}"))
        })?;
        fmt.fourcc = FourCC::new(b"YUYV");
        fmt.width = 640;
        fmt.height = 360;
        let negotiated = device.set_format(&fmt).map_err(|e| {
            CaptureError::DeviceUnavailable(format!("failed to set format: {e}"))
        })?;

        let fourcc = negotiated.fourcc;
        let pixel_format = if fourcc == FourCC::new(b"GREY") {
            PixelFormat::Grey
        } else if fourcc == FourCC::new(b"YUYV") {
            PixelFormat::Yuyv
        } else if fourcc == FourCC::new(b"Y16 ") || fourcc == FourCC::new(b"Y16\0") {
            PixelFormat::Y16
        } else {
            return Err(CaptureError::DeviceUnavailable(format!(
                "unsupported pixel format: {fourcc:?} (need YUYV, GREY, or Y16)"
            )));
        };

        tracing::info!(
            device = %path,
            width = negotiated.width,
            height = negotiated.height,
            fourcc = ?fourcc,
            "camera acquired"
        );

        Ok(LiveStream {
            device,
            width: negotiated.width,
            height: negotiated.height,
            pixel_format,
        })
    }

    /// Dequeue one buffer and convert it to grayscale.
    fn grab_grayscale(live: &LiveStream) -> Result<(Vec<u8>, u32), CaptureError> {
        let mut stream = MmapStream::with_buffers(&live.device, BufType::VideoCapture, 4)
            .map_err(|e| {
                CaptureError::CaptureFailed(format!("failed to create mmap stream: {e}"))
            })?;

        let (buf, meta) = stream
            .next()
            .map_err(|e| CaptureError::CaptureFailed(format!("failed to dequeue buffer: {e}")))?;

        let gray = frame::to_grayscale(buf, live.width, live.height, live.pixel_format)
            .map_err(|e| CaptureError::CaptureFailed(e.to_string()))?;
        Ok((gray, meta.sequence))
    }
}

impl FrameSource for V4lCamera {
    fn acquire(&mut self) -> Result<(), CaptureError> {
        if self.live.is_some() {
            return Ok(());
        }
        let live = Self::open_stream(&self.cfg)?;

        // Let AGC/AE settle before the first real tick.
        for _ in 0..self.cfg.warmup_frames {
            let _ = Self::grab_grayscale(&live);
        }

        self.live = Some(live);
        Ok(())
    }

    fn capture(&mut self) -> Result<CapturedFrame, CaptureError> {
        let live = self.live.as_ref().ok_or(CaptureError::NotAcquired)?;

        // A tick wants a usable still: retry past dark frames a few times,
        // then leave the rest to the next tick.
        const MAX_ATTEMPTS: usize = 3;
        for _ in 0..MAX_ATTEMPTS {
            let (gray, device_seq) = Self::grab_grayscale(live)?;
            if frame::is_dark_frame(&gray, 0.95) {
                tracing::debug!(device_seq, "skipping dark frame");
                continue;
            }
            let image = frame::encode_jpeg(&gray, live.width, live.height, self.cfg.jpeg_quality)
                .map_err(|e| CaptureError::CaptureFailed(e.to_string()))?;
            self.sequence += 1;
            return Ok(CapturedFrame {
                image,
                sequence: self.sequence,
            });
        }

        Err(CaptureError::CaptureFailed(
            "only dark frames captured".into(),
        ))
    }

    fn release(&mut self) {
        if let Some(live) = self.live.take() {
            drop(live);
            tracing::info!(device = %self.cfg.device, "camera released");
        }
    }
}

impl Drop for V4lCamera {
    fn drop(&mut self) {
        self.release();
    }
}

/// Info about a discovered V4L2 capture device.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub path: String,
    pub name: String,
    pub driver: String,
}

/// List available V4L2 video capture devices (/dev/video0..15).
pub fn list_devices() -> Vec<DeviceInfo> {
    let mut devices = Vec::new();

    for i in 0..16 {
        let path = format!("/dev/video{i}");
        if !Path::new(&path).exists() {
            continue;
        }
        let Ok(dev) = Device::with_path(&path) else {
            continue;
        };
        let Ok(caps) = dev.query_caps() else {
            continue;
        };
        if !caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE) {
            continue;
        }
        devices.push(DeviceInfo {
            path,
            name: caps.card.clone(),
            driver: caps.driver.clone(),
        });
    }

    devices
}
