//! Readers for the two pipeline inputs: an RGB photograph and a single-band
//! depth map.
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use image::DynamicImage;
use ndarray::{Array2, Array3};
use tiff::decoder::{Decoder, DecodingResult};
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Read any format the `image` crate understands into an `(rows, cols, 3)`
/// array with values in [0, 1]. Alpha is dropped, grayscale is replicated.
pub fn read_rgb_image(path: &Path) -> Result<Array3<f64>> {
    let img = image::open(path)?;
    let rgb = img.to_rgb32f();
    let (cols, rows) = (rgb.width() as usize, rgb.height() as usize);
    info!("Read image {} ({}x{})", path.display(), cols, rows);
    let data: Vec<f64> = rgb.into_raw().into_iter().map(|v| v as f64).collect();
    Array3::from_shape_vec((rows, cols, 3), data).map_err(|e| Error::Processing(e.to_string()))
}

fn is_tiff(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("tif") || e.eq_ignore_ascii_case("tiff"))
        .unwrap_or(false)
}

fn first_samples<T: Copy + Into<f64>>(values: &[T], pixels: usize) -> Vec<f64> {
    let stride = (values.len() / pixels.max(1)).max(1);
    values.iter().step_by(stride).take(pixels).map(|&v| v.into()).collect()
}

fn read_tiff_depth(path: &Path) -> Result<Array2<f64>> {
    let file = File::open(path)?;
    let mut decoder = Decoder::new(BufReader::new(file))?;
    let (width, height) = decoder.dimensions()?;
    let (cols, rows) = (width as usize, height as usize);
    let pixels = rows * cols;

    let values = match decoder.read_image()? {
        DecodingResult::U8(v) => first_samples(&v, pixels),
        DecodingResult::U16(v) => first_samples(&v, pixels),
        DecodingResult::U32(v) => first_samples(&v, pixels),
        DecodingResult::F32(v) => first_samples(&v, pixels),
        DecodingResult::F64(v) => first_samples(&v, pixels),
        DecodingResult::I8(v) => first_samples(&v, pixels),
        DecodingResult::I16(v) => first_samples(&v, pixels),
        DecodingResult::I32(v) => first_samples(&v, pixels),
        _ => {
            return Err(Error::Processing(format!(
                "unsupported TIFF sample type in {}",
                path.display()
            )));
        }
    };
    debug!("Decoded TIFF depth map {}x{}", cols, rows);
    Array2::from_shape_vec((rows, cols), values).map_err(|e| Error::Processing(e.to_string()))
}

/// Read a single-band depth map as raw values.
///
/// TIFF files are decoded with the `tiff` crate so floating-point samples
/// survive unchanged. Other formats go through the `image` crate: 8 and 16-bit
/// grayscale keep their integer values, anything else is converted to
/// luminance in [0, 1]. Multi-sample rasters contribute their first sample.
pub fn read_depth_map(path: &Path) -> Result<Array2<f64>> {
    let depths = if is_tiff(path) {
        read_tiff_depth(path)?
    } else {
        let img = image::open(path)?;
        let (cols, rows) = (img.width() as usize, img.height() as usize);
        let values: Vec<f64> = match img {
            DynamicImage::ImageLuma8(buf) => buf.into_raw().into_iter().map(f64::from).collect(),
            DynamicImage::ImageLuma16(buf) => buf.into_raw().into_iter().map(f64::from).collect(),
            other => other.to_luma32f().into_raw().into_iter().map(f64::from).collect(),
        };
        Array2::from_shape_vec((rows, cols), values).map_err(|e| Error::Processing(e.to_string()))?
    };
    let (rows, cols) = depths.dim();
    info!("Read depth map {} ({}x{})", path.display(), cols, rows);
    Ok(depths)
}
