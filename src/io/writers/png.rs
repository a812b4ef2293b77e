use std::io::Cursor;
use std::path::Path;

use image::{ImageBuffer, ImageFormat, Rgb, RgbImage};

fn rgb8(cols: usize, rows: usize, data: &[u8]) -> Result<RgbImage, Box<dyn std::error::Error>> {
    RgbImage::from_raw(cols as u32, rows as u32, data.to_vec())
        .ok_or_else(|| format!("buffer of {} samples does not fit {}x{} RGB", data.len(), cols, rows).into())
}

fn rgb16(
    cols: usize,
    rows: usize,
    data: &[u16],
) -> Result<ImageBuffer<Rgb<u16>, Vec<u16>>, Box<dyn std::error::Error>> {
    ImageBuffer::from_raw(cols as u32, rows as u32, data.to_vec())
        .ok_or_else(|| format!("buffer of {} samples does not fit {}x{} RGB", data.len(), cols, rows).into())
}

pub fn write_rgb_png_u8(
    output: &Path,
    cols: usize,
    rows: usize,
    data: &[u8],
) -> Result<(), Box<dyn std::error::Error>> {
    rgb8(cols, rows, data)?.save_with_format(output, ImageFormat::Png)?;
    Ok(())
}

pub fn write_rgb_png_u16(
    output: &Path,
    cols: usize,
    rows: usize,
    data: &[u16],
) -> Result<(), Box<dyn std::error::Error>> {
    rgb16(cols, rows, data)?.save_with_format(output, ImageFormat::Png)?;
    Ok(())
}

/// Encode 8-bit RGB samples to an in-memory PNG stream.
pub fn encode_rgb_png_u8(cols: usize, rows: usize, data: &[u8]) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
    let mut cursor = Cursor::new(Vec::new());
    rgb8(cols, rows, data)?.write_to(&mut cursor, ImageFormat::Png)?;
    Ok(cursor.into_inner())
}

/// Encode 16-bit RGB samples to an in-memory PNG stream.
pub fn encode_rgb_png_u16(cols: usize, rows: usize, data: &[u16]) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
    let mut cursor = Cursor::new(Vec::new());
    rgb16(cols, rows, data)?.write_to(&mut cursor, ImageFormat::Png)?;
    Ok(cursor.into_inner())
}
