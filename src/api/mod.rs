//! High-level, ergonomic library API: restore an image/depth pair to a file or
//! to in-memory buffers, batch helpers for directories, and typed load/save
//! helpers. Prefer these entrypoints over the low-level processing modules
//! when integrating seathru.
use std::path::{Path, PathBuf};

use ndarray::{Array2, Array3};
use tracing::{info, warn};

use crate::core::params::RestoreParams;
use crate::core::processing::denoise::{denoise_tv_chambolle_rgb, estimate_noise_sigma};
use crate::core::processing::depth::{normalize_depth_signal, preprocess_depth_map};
use crate::core::processing::pipeline::{Restoration, run_pipeline};
use crate::core::processing::resize::{resize_depth_map, resize_to_long_side};
use crate::error::{Error, Result};
use crate::io::readers::{read_depth_map, read_rgb_image};
use crate::io::writers::metadata::{RestorationMetadata, create_metadata_sidecar};
use crate::io::writers::{jpeg, png, quantize_u8, quantize_u16, save_rgb_image, tiff};
use crate::types::{BitDepth, DepthEncoding, OutputFormat};

const IMAGE_EXTENSIONS: [&str; 6] = ["png", "jpg", "jpeg", "tif", "tiff", "bmp"];

/// Result of in-memory restoration
#[derive(Debug, Clone)]
pub struct RestoredImage {
    pub width: usize,
    pub height: usize,
    pub bit_depth: BitDepth,
    pub format: OutputFormat,
    pub rgb: Option<Vec<u8>>,     // interleaved RGB U8
    pub rgb16: Option<Vec<u16>>,  // interleaved RGB U16
    pub restoration: Restoration,
}

impl RestoredImage {
    /// Encode the samples into a complete file in `self.format`.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let (w, h) = (self.width, self.height);
        let encoded = match (self.format, &self.rgb, &self.rgb16) {
            (OutputFormat::PNG, Some(rgb), _) => png::encode_rgb_png_u8(w, h, rgb),
            (OutputFormat::PNG, None, Some(rgb16)) => png::encode_rgb_png_u16(w, h, rgb16),
            (OutputFormat::TIFF, Some(rgb), _) => tiff::encode_rgb_tiff_u8(w, h, rgb),
            (OutputFormat::TIFF, None, Some(rgb16)) => tiff::encode_rgb_tiff_u16(w, h, rgb16),
            (OutputFormat::JPEG, Some(rgb), _) => jpeg::encode_rgb_jpeg(w, h, rgb),
            _ => {
                return Err(Error::Processing(format!(
                    "no {:?} samples available for {:?} output",
                    self.bit_depth, self.format
                )));
            }
        };
        encoded.map_err(Error::external)
    }
}

/// Load an image and its raw depth map.
pub fn load_inputs(image: &Path, depth: &Path) -> Result<(Array3<f64>, Array2<f64>)> {
    Ok((read_rgb_image(image)?, read_depth_map(depth)?))
}

/// Convert a raw depth map to scene depth according to `params.depth_encoding`.
pub fn prepare_depths(raw: &Array2<f64>, params: &RestoreParams) -> Array2<f64> {
    match params.depth_encoding {
        DepthEncoding::Disparity => {
            let normalized = normalize_depth_signal(raw);
            preprocess_depth_map(&normalized, params.depth_offset, params.depth_scale)
        }
        DepthEncoding::Metric => raw.clone(),
    }
}

/// Restore in-memory arrays: optional downscale, depth conversion, the
/// restoration pipeline and optional TV denoising.
pub fn restore_arrays(
    image: &Array3<f64>,
    raw_depth: &Array2<f64>,
    params: &RestoreParams,
) -> Result<Restoration> {
    let image = match params.size {
        Some(0) => return Err(Error::ZeroSize { size: 0 }),
        Some(size) => resize_to_long_side(image, size).map_err(Error::external)?,
        None => image.clone(),
    };
    let (rows, cols, _) = image.dim();
    let raw_depth = if raw_depth.dim() != (rows, cols) && !raw_depth.is_empty() {
        resize_depth_map(raw_depth, cols, rows).map_err(Error::external)?
    } else {
        raw_depth.clone()
    };

    info!("Depth encoding: {}", params.depth_encoding);
    let depths = prepare_depths(&raw_depth, params);
    let mut restoration = run_pipeline(&image, &depths, &params.pipeline)?;

    if params.denoise {
        let sigma = estimate_noise_sigma(&restoration.image);
        let weight = sigma / 10.0;
        if weight > 0.0 {
            info!("Denoising with TV weight {:.5}", weight);
            restoration.image = denoise_tv_chambolle_rgb(&restoration.image, weight)?;
        }
    }
    Ok(restoration)
}

/// Restore an image/depth pair to in-memory buffers (no output file)
pub fn restore_to_buffer(image: &Path, depth: &Path, params: &RestoreParams) -> Result<RestoredImage> {
    let (img, raw_depth) = load_inputs(image, depth)?;
    let restoration = restore_arrays(&img, &raw_depth, params)?;
    let (height, width, _) = restoration.image.dim();

    let (bit_depth, rgb, rgb16) = match (params.format, params.bit_depth) {
        (OutputFormat::JPEG, BitDepth::U16) => {
            warn!("JPEG output is 8-bit only; producing 8-bit samples");
            (BitDepth::U8, Some(quantize_u8(&restoration.image)), None)
        }
        (_, BitDepth::U8) => (BitDepth::U8, Some(quantize_u8(&restoration.image)), None),
        (_, BitDepth::U16) => (BitDepth::U16, None, Some(quantize_u16(&restoration.image))),
    };

    Ok(RestoredImage {
        width,
        height,
        bit_depth,
        format: params.format,
        rgb,
        rgb16,
        restoration,
    })
}

/// Typed save helper: write a restoration (and, when enabled, its sidecar)
pub fn save_restored(
    restoration: &Restoration,
    output: &Path,
    params: &RestoreParams,
    inputs: Option<(&Path, &Path)>,
) -> Result<()> {
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    save_rgb_image(&restoration.image, output, params.format, params.bit_depth)
        .map_err(Error::external)?;

    if params.sidecar {
        let metadata = RestorationMetadata::new(
            restoration,
            params,
            inputs.map(|(i, _)| i),
            inputs.map(|(_, d)| d),
        );
        create_metadata_sidecar(output, &metadata).map_err(Error::external)?;
    }
    Ok(())
}

/// Restore an image/depth pair to an output path using RestoreParams
pub fn restore_to_path(
    image: &Path,
    depth: &Path,
    output: &Path,
    params: &RestoreParams,
) -> Result<Restoration> {
    let (img, raw_depth) = load_inputs(image, depth)?;
    let restoration = restore_arrays(&img, &raw_depth, params)?;
    save_restored(&restoration, output, params, Some((image, depth)))?;
    Ok(restoration)
}

/// Batch processing report
#[derive(Debug, Clone, Copy, Default)]
pub struct BatchReport {
    pub processed: usize,
    pub skipped: usize,
    pub errors: usize,
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.iter().any(|x| e.eq_ignore_ascii_case(x)))
        .unwrap_or(false)
}

/// Return the image files directly inside `input_dir`, sorted by name
pub fn iterate_images(input_dir: &Path) -> Result<std::vec::IntoIter<PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(input_dir).map_err(Error::from)? {
        let entry = entry.map_err(Error::from)?;
        let path = entry.path();
        if path.is_file() && has_image_extension(&path) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files.into_iter())
}

/// Find the depth map in `depth_dir` whose file stem matches `image`'s
pub fn find_depth_for(image: &Path, depth_dir: &Path) -> Result<Option<PathBuf>> {
    let Some(stem) = image.file_stem() else {
        return Ok(None);
    };
    Ok(iterate_images(depth_dir)?
        .find(|candidate| candidate.as_path() != image && candidate.file_stem() == Some(stem)))
}

/// Restore every image in `input_dir` whose depth map (same file stem) exists
/// in `depth_dir`, writing `<stem>.<ext>` files into `output_dir`.
/// Images without a depth map are skipped. If `continue_on_error` is true,
/// errors are counted in the report and processing continues; otherwise, the
/// first error is returned.
pub fn restore_directory_to_path(
    input_dir: &Path,
    depth_dir: &Path,
    output_dir: &Path,
    params: &RestoreParams,
    continue_on_error: bool,
) -> Result<BatchReport> {
    std::fs::create_dir_all(output_dir).map_err(Error::from)?;

    let mut report = BatchReport::default();

    for path in iterate_images(input_dir)? {
        let Some(depth) = find_depth_for(&path, depth_dir)? else {
            warn!("No depth map for {}; skipping", path.display());
            report.skipped += 1;
            continue;
        };
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let output_path = output_dir.join(format!("{}.{}", stem, params.format.extension()));

        match restore_to_path(&path, &depth, &output_path, params) {
            Ok(_) => report.processed += 1,
            Err(e) => {
                report.errors += 1;
                warn!("Failed to restore {}: {}", path.display(), e);
                if !continue_on_error {
                    return Err(e);
                }
            }
        }
    }

    Ok(report)
}
