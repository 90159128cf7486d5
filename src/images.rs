//! Source-image normalization for image-conditioned requests
//!
//! Callers upload arbitrary image bytes; the downstream service wants a
//! base64 PNG of bounded size. Decoding and re-encoding here also rejects
//! non-image uploads before they reach the queue.

use base64::{engine::general_purpose::STANDARD, Engine};
use image::imageops::FilterType;
use std::io::Cursor;

use crate::error::{AppError, Result};

/// Largest source area accepted for image-conditioned jobs, in pixels
pub const MAX_SOURCE_PIXELS: u32 = 1216 * 1216;

/// Encode binary data to base64
pub fn encode(data: &[u8]) -> String {
    STANDARD.encode(data)
}

/// Decode base64 data, tolerating a `data:image/...;base64,` prefix
pub fn decode(encoded: &str) -> Result<Vec<u8>> {
    let data = match encoded.rsplit_once(',') {
        Some((_, tail)) => tail,
        None => encoded,
    };

    STANDARD
        .decode(data.trim())
        .map_err(|e| AppError::ValidationFailed(format!("Invalid base64 data: {}", e)))
}

/// Normalize raw image bytes into the base64 PNG the payload carries:
/// decoded, forced to RGB, downscaled to at most [`MAX_SOURCE_PIXELS`].
pub fn normalize(raw: &[u8]) -> Result<String> {
    let decoded = image::load_from_memory(raw)
        .map_err(|e| AppError::ValidationFailed(format!("Not a valid image: {}", e)))?;

    let mut rgb = decoded.to_rgb8();
    let (width, height) = rgb.dimensions();
    if width as u64 * height as u64 > MAX_SOURCE_PIXELS as u64 {
        let (new_width, new_height) = scale_to_area(width, height, MAX_SOURCE_PIXELS);
        rgb = image::imageops::resize(&rgb, new_width, new_height, FilterType::Lanczos3);
    }

    let mut buffer = Cursor::new(Vec::new());
    image::DynamicImage::ImageRgb8(rgb)
        .write_to(&mut buffer, image::ImageOutputFormat::Png)
        .map_err(|e| AppError::Internal(format!("Failed to encode image: {}", e)))?;

    Ok(encode(buffer.get_ref()))
}

/// Scale dimensions down so the area fits `max_area`, preserving aspect ratio
fn scale_to_area(width: u32, height: u32, max_area: u32) -> (u32, u32) {
    let scale = (max_area as f64 / (width as f64 * height as f64)).sqrt();
    (
        ((width as f64 * scale) as u32).max(1),
        ((height as f64 * scale) as u32).max(1),
    )
}
