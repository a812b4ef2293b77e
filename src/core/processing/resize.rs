use fast_image_resize::{FilterType, PixelType, ResizeAlg, ResizeOptions, Resizer, images::Image};
use ndarray::{Array2, Array3};
use tracing::{info, warn};

pub fn calculate_resize_dimensions(
    original_cols: usize,
    original_rows: usize,
    target_size: usize,
) -> (usize, usize) {
    let short_side = original_rows.min(original_cols);
    let long_side = original_rows.max(original_cols);

    if target_size > long_side {
        warn!(
            "Target size {} is larger than original long side {}. Keeping original dimensions {}x{}",
            target_size, long_side, original_cols, original_rows
        );
        return (original_cols, original_rows);
    }

    let scale_factor = target_size as f64 / long_side as f64;
    let new_short_side = ((short_side as f64 * scale_factor).round() as usize).max(1);

    if original_cols > original_rows {
        (target_size, new_short_side)
    } else {
        (new_short_side, target_size)
    }
}

fn f32_bytes(values: impl Iterator<Item = f32>, capacity: usize) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(capacity * 4);
    for v in values {
        bytes.extend_from_slice(&v.to_ne_bytes());
    }
    bytes
}

fn f32_values(bytes: &[u8]) -> impl Iterator<Item = f64> + '_ {
    bytes
        .chunks_exact(4)
        .map(|c| f32::from_ne_bytes([c[0], c[1], c[2], c[3]]) as f64)
}

fn resize_f32(
    bytes: Vec<u8>,
    src: (usize, usize),
    dst: (usize, usize),
    pixel_type: PixelType,
    filter: FilterType,
) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
    let resize_options = ResizeOptions::new().resize_alg(ResizeAlg::Convolution(filter));
    let mut resizer = Resizer::new();

    let src_image = Image::from_vec_u8(src.0 as u32, src.1 as u32, bytes, pixel_type)?;
    let mut dst_image = Image::new(dst.0 as u32, dst.1 as u32, pixel_type);
    resizer.resize(&src_image, &mut dst_image, &resize_options)?;

    Ok(dst_image.into_vec())
}

/// Resize an RGB image in [0, 1] to `target_cols x target_rows` with Lanczos3.
/// Ringing is clamped back into [0, 1].
pub fn resize_rgb_image(
    image: &Array3<f64>,
    target_cols: usize,
    target_rows: usize,
) -> Result<Array3<f64>, Box<dyn std::error::Error>> {
    let (rows, cols, channels) = image.dim();
    if channels != 3 {
        return Err(format!("expected 3 channels, got {}", channels).into());
    }
    if (cols, rows) == (target_cols, target_rows) {
        return Ok(image.clone());
    }

    let src = f32_bytes(image.iter().map(|&v| v as f32), image.len());
    let dst = resize_f32(
        src,
        (cols, rows),
        (target_cols, target_rows),
        PixelType::F32x3,
        FilterType::Lanczos3,
    )?;
    let values: Vec<f64> = f32_values(&dst).map(|v| v.clamp(0.0, 1.0)).collect();
    Ok(Array3::from_shape_vec((target_rows, target_cols, 3), values)?)
}

/// Resize a depth map with bilinear interpolation, which never overshoots the
/// input range.
pub fn resize_depth_map(
    depths: &Array2<f64>,
    target_cols: usize,
    target_rows: usize,
) -> Result<Array2<f64>, Box<dyn std::error::Error>> {
    let (rows, cols) = depths.dim();
    if (cols, rows) == (target_cols, target_rows) {
        return Ok(depths.clone());
    }

    info!(
        "Resizing depth map from {}x{} to {}x{}",
        cols, rows, target_cols, target_rows
    );
    let src = f32_bytes(depths.iter().map(|&v| v as f32), depths.len());
    let dst = resize_f32(
        src,
        (cols, rows),
        (target_cols, target_rows),
        PixelType::F32,
        FilterType::Bilinear,
    )?;
    let values: Vec<f64> = f32_values(&dst).collect();
    Ok(Array2::from_shape_vec((target_rows, target_cols), values)?)
}

/// Downscale `image` so its long side equals `target_size`. Requests larger
/// than the image keep it as is.
pub fn resize_to_long_side(
    image: &Array3<f64>,
    target_size: usize,
) -> Result<Array3<f64>, Box<dyn std::error::Error>> {
    let (rows, cols, _) = image.dim();
    info!("Resizing image to {} (long side)", target_size);
    let (new_cols, new_rows) = calculate_resize_dimensions(cols, rows, target_size);
    info!(
        "Original size: {}x{}, New size: {}x{}",
        cols, rows, new_cols, new_rows
    );
    resize_rgb_image(image, new_cols, new_rows)
}
