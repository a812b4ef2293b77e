use clap::Parser;
use std::path::PathBuf;

use seathru::types::{BitDepth, DepthEncoding, OutputFormat};

#[derive(Parser)]
#[command(name = "seathru", version, about = "Sea-thru underwater color restoration CLI")]
pub struct CliArgs {
    /// Input RGB image (single file mode)
    #[arg(short, long)]
    pub input: Option<PathBuf>,

    /// Depth map matching the input image (single file mode)
    #[arg(short, long)]
    pub depth: Option<PathBuf>,

    /// Input directory containing images (batch mode)
    #[arg(long)]
    pub input_dir: Option<PathBuf>,

    /// Directory containing depth maps named like their images (batch mode)
    #[arg(long)]
    pub depth_dir: Option<PathBuf>,

    /// Output filename (single file mode)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Output directory for batch processing (batch mode)
    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    /// Output format (png, tiff or jpeg)
    #[arg(short = 'F', long, value_enum, default_value_t = OutputFormat::PNG)]
    pub format: OutputFormat,

    /// Output bit depth (8 or 16)
    #[arg(long, value_enum, default_value_t = BitDepth::U8)]
    pub bit_depth: BitDepth,

    /// How depth map values relate to distance (disparity or metric)
    #[arg(long, value_enum, default_value_t = DepthEncoding::Disparity)]
    pub depth_encoding: DepthEncoding,

    /// Depth added to the rescaled disparity signal
    #[arg(long, default_value_t = 2.0)]
    pub depth_offset: f64,

    /// Multiplier applied to the inverted, normalized disparity signal
    #[arg(long, default_value_t = 10.0)]
    pub depth_scale: f64,

    /// Image size for scaling. Options:
    /// - Custom: any positive integer (e.g., 1024), applied to the long side
    /// - Original: "original" (no scaling)
    #[arg(long, default_value = "original")]
    pub size: String,

    /// JSON file with pipeline parameters (any subset; missing keys use defaults)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Illumination intensity multiplier
    #[arg(long)]
    pub f: Option<f64>,

    /// Attenuation calibration multiplier
    #[arg(long)]
    pub l: Option<f64>,

    /// Illumination damping factor in (0, 1]
    #[arg(long)]
    pub p: Option<f64>,

    /// Base seed for randomized curve-fit restarts
    #[arg(long)]
    pub seed: Option<u64>,

    /// Skip total-variation denoising of the result
    #[arg(long, default_value_t = false)]
    pub no_denoise: bool,

    /// Write a JSON sidecar with parameters, fitted coefficients and diagnostics
    #[arg(long, default_value_t = false)]
    pub sidecar: bool,

    /// Enable logging
    #[arg(long, default_value_t = false)]
    pub log: bool,

    /// Batch mode: continue processing other files when one fails
    #[arg(long, default_value_t = false)]
    pub batch: bool,
}
