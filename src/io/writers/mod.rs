//! Encoders for restored images. All writers take interleaved RGB samples in
//! row-major order; [`save_rgb_image`] quantizes a float image and dispatches
//! on the requested format.
pub mod jpeg;
pub mod metadata;
pub mod png;
pub mod tiff;

use std::path::Path;

use ndarray::Array3;
use tracing::{info, warn};

use crate::types::{BitDepth, OutputFormat};

/// Quantize values in [0, 1] to 8-bit samples. Out-of-range values saturate.
pub fn quantize_u8(image: &Array3<f64>) -> Vec<u8> {
    image
        .iter()
        .map(|&v| (v.clamp(0.0, 1.0) * 255.0).round() as u8)
        .collect()
}

/// Quantize values in [0, 1] to 16-bit samples. Out-of-range values saturate.
pub fn quantize_u16(image: &Array3<f64>) -> Vec<u16> {
    image
        .iter()
        .map(|&v| (v.clamp(0.0, 1.0) * 65535.0).round() as u16)
        .collect()
}

/// Encode an `(rows, cols, 3)` image in [0, 1] to `output`.
pub fn save_rgb_image(
    image: &Array3<f64>,
    output: &Path,
    format: OutputFormat,
    bit_depth: BitDepth,
) -> Result<(), Box<dyn std::error::Error>> {
    let (rows, cols, channels) = image.dim();
    if channels != 3 {
        return Err(format!("expected 3 channels, got {}", channels).into());
    }

    match (format, bit_depth) {
        (OutputFormat::PNG, BitDepth::U8) => png::write_rgb_png_u8(output, cols, rows, &quantize_u8(image))?,
        (OutputFormat::PNG, BitDepth::U16) => png::write_rgb_png_u16(output, cols, rows, &quantize_u16(image))?,
        (OutputFormat::TIFF, BitDepth::U8) => tiff::write_rgb_tiff_u8(output, cols, rows, &quantize_u8(image))?,
        (OutputFormat::TIFF, BitDepth::U16) => tiff::write_rgb_tiff_u16(output, cols, rows, &quantize_u16(image))?,
        (OutputFormat::JPEG, depth) => {
            if depth == BitDepth::U16 {
                warn!("JPEG output is 8-bit only; writing 8-bit samples");
            }
            jpeg::write_rgb_jpeg(output, cols, rows, &quantize_u8(image))?
        }
    }
    info!("Saved {:?} image to {}", format, output.display());
    Ok(())
}
