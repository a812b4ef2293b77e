use jpeg_encoder::{ColorType, Encoder};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

pub const JPEG_QUALITY: u8 = 95;

fn check_dimensions(cols: usize, rows: usize) -> Result<(u16, u16), Box<dyn std::error::Error>> {
    let w = u16::try_from(cols).map_err(|_| format!("JPEG width {} exceeds 65535", cols))?;
    let h = u16::try_from(rows).map_err(|_| format!("JPEG height {} exceeds 65535", rows))?;
    Ok((w, h))
}

pub fn write_rgb_jpeg(
    output: &Path,
    cols: usize,
    rows: usize,
    rgb_data: &[u8],
) -> Result<(), Box<dyn std::error::Error>> {
    let (w, h) = check_dimensions(cols, rows)?;
    let file = File::create(output)?;
    let mut writer = BufWriter::new(file);
    let encoder = Encoder::new(&mut writer, JPEG_QUALITY);
    encoder.encode(rgb_data, w, h, ColorType::Rgb)?;
    Ok(())
}

/// Encode to an in-memory JPEG stream.
pub fn encode_rgb_jpeg(cols: usize, rows: usize, rgb_data: &[u8]) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
    let (w, h) = check_dimensions(cols, rows)?;
    let mut buf = Vec::new();
    let encoder = Encoder::new(&mut buf, JPEG_QUALITY);
    encoder.encode(rgb_data, w, h, ColorType::Rgb)?;
    Ok(buf)
}
