use std::fs::File;
use std::io::{BufWriter, Cursor, Seek, Write};
use std::path::Path;

use ::tiff::encoder::{TiffEncoder, colortype};

fn encode_u8<W: Write + Seek>(
    writer: W,
    cols: usize,
    rows: usize,
    data: &[u8],
) -> Result<(), Box<dyn std::error::Error>> {
    let mut encoder = TiffEncoder::new(writer)?;
    encoder.write_image::<colortype::RGB8>(cols as u32, rows as u32, data)?;
    Ok(())
}

fn encode_u16<W: Write + Seek>(
    writer: W,
    cols: usize,
    rows: usize,
    data: &[u16],
) -> Result<(), Box<dyn std::error::Error>> {
    let mut encoder = TiffEncoder::new(writer)?;
    encoder.write_image::<colortype::RGB16>(cols as u32, rows as u32, data)?;
    Ok(())
}

pub fn write_rgb_tiff_u8(
    output: &Path,
    cols: usize,
    rows: usize,
    data: &[u8],
) -> Result<(), Box<dyn std::error::Error>> {
    let mut writer = BufWriter::new(File::create(output)?);
    encode_u8(&mut writer, cols, rows, data)?;
    writer.flush()?;
    Ok(())
}

pub fn write_rgb_tiff_u16(
    output: &Path,
    cols: usize,
    rows: usize,
    data: &[u16],
) -> Result<(), Box<dyn std::error::Error>> {
    let mut writer = BufWriter::new(File::create(output)?);
    encode_u16(&mut writer, cols, rows, data)?;
    writer.flush()?;
    Ok(())
}

pub fn encode_rgb_tiff_u8(cols: usize, rows: usize, data: &[u8]) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
    let mut cursor = Cursor::new(Vec::new());
    encode_u8(&mut cursor, cols, rows, data)?;
    Ok(cursor.into_inner())
}

pub fn encode_rgb_tiff_u16(cols: usize, rows: usize, data: &[u16]) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
    let mut cursor = Cursor::new(Vec::new());
    encode_u16(&mut cursor, cols, rows, data)?;
    Ok(cursor.into_inner())
}
