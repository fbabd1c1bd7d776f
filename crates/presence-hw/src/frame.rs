//! Grayscale conversion, dark-frame detection, and JPEG encoding.

use thiserror::Error;

use crate::camera::PixelFormat;

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("invalid buffer length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
    #[error("jpeg encoding failed: {0}")]
    Encode(String),
}

/// Convert a raw capture buffer to 8-bit grayscale.
pub fn to_grayscale(
    buf: &[u8],
    width: u32,
    height: u32,
    format: PixelFormat,
) -> Result<Vec<u8>, FrameError> {
    let pixels = (width * height) as usize;

    match format {
        PixelFormat::Grey => {
            if buf.len() < pixels {
                return Err(FrameError::InvalidLength {
                    expected: pixels,
                    actual: buf.len(),
                });
            }
            Ok(buf[..pixels].to_vec())
        }
        PixelFormat::Y16 => {
            let expected = pixels * 2;
            if buf.len() < expected {
                return Err(FrameError::InvalidLength {
                    expected,
                    actual: buf.len(),
                });
            }
            // 16-bit little-endian per pixel; keep the high byte.
            let mut gray = Vec::with_capacity(pixels);
            for idx in 0..pixels {
                let low = buf[idx * 2] as u16;
                let high = buf[idx * 2 + 1] as u16;
                gray.push((((high << 8) | low) >> 8) as u8);
            }
            Ok(gray)
        }
        PixelFormat::Yuyv => yuyv_to_grayscale(buf, width, height),
    }
}

/// Extract the Y channel from packed YUYV (4:2:2).
///
/// YUYV packs two pixels per 4 bytes: [Y0, U, Y1, V]; grayscale is every
/// even-indexed byte.
pub fn yuyv_to_grayscale(yuyv: &[u8], width: u32, height: u32) -> Result<Vec<u8>, FrameError> {
    let expected = (width * height * 2) as usize;
    if yuyv.len() < expected {
        return Err(FrameError::InvalidLength {
            expected,
            actual: yuyv.len(),
        });
    }
    Ok(yuyv[..expected].iter().step_by(2).copied().collect())
}

/// Check whether a frame is dark.
///
/// Returns true if more than `threshold_pct` of pixels fall in the darkest
/// bucket (0-31). Such frames are useless to the recognition service.
pub fn is_dark_frame(gray: &[u8], threshold_pct: f32) -> bool {
    if gray.is_empty() {
        return true;
    }
    let dark_count = gray.iter().filter(|&&p| p < 32).count();
    (dark_count as f32 / gray.len() as f32) > threshold_pct
}

/// Encode an 8-bit grayscale image as JPEG.
pub fn encode_jpeg(
    gray: &[u8],
    width: u32,
    height: u32,
    quality: u8,
) -> Result<Vec<u8>, FrameError> {
    let mut out = Vec::new();
    let mut encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut out, quality);
    encoder
        .encode(gray, width, height, image::ExtendedColorType::L8)
        .map_err(|e| FrameError::Encode(e.to_string()))?;
    Ok(out)
}
