use std::fs;
use std::path::Path;

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use seathru::api::{restore_directory_to_path, restore_to_path};
use seathru::core::params::{PipelineParams, RestoreParams};

use super::args::CliArgs;
use super::errors::AppError;

fn parse_size(size: &str) -> Result<Option<usize>, AppError> {
    if size == "original" {
        return Ok(None);
    }
    let parsed_size = size.parse::<usize>().map_err(|_| AppError::InvalidSize {
        size: size.to_string(),
    })?;
    if parsed_size == 0 {
        return Err(AppError::ZeroSize { size: parsed_size });
    }
    Ok(Some(parsed_size))
}

fn load_pipeline_params(config: Option<&Path>) -> Result<PipelineParams, Box<dyn std::error::Error>> {
    match config {
        Some(path) => {
            info!("Loading pipeline parameters from {:?}", path);
            let text = fs::read_to_string(path)?;
            Ok(serde_json::from_str(&text)?)
        }
        None => Ok(PipelineParams::default()),
    }
}

fn build_params(args: &CliArgs) -> Result<RestoreParams, Box<dyn std::error::Error>> {
    let mut pipeline = load_pipeline_params(args.config.as_deref())?;
    if let Some(f) = args.f {
        pipeline.illumination.f = f;
    }
    if let Some(l) = args.l {
        pipeline.attenuation.l = l;
    }
    if let Some(p) = args.p {
        pipeline.illumination.p = p;
    }
    if let Some(seed) = args.seed {
        pipeline.seed = seed;
    }

    pipeline.validate().map_err(AppError::from)?;

    Ok(RestoreParams {
        format: args.format,
        bit_depth: args.bit_depth,
        depth_encoding: args.depth_encoding,
        depth_offset: args.depth_offset,
        depth_scale: args.depth_scale,
        size: parse_size(&args.size)?,
        denoise: !args.no_denoise,
        sidecar: args.sidecar,
        pipeline,
    })
}

pub fn run(args: CliArgs) -> Result<(), Box<dyn std::error::Error>> {
    if args.log {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
            )
            .init();
    }

    let params = build_params(&args)?;
    let batch_mode = args.batch || args.input_dir.is_some();

    if batch_mode {
        let input_dir = args.input_dir.ok_or(AppError::MissingArgument {
            arg: "--input-dir".to_string(),
        })?;
        let depth_dir = args.depth_dir.ok_or(AppError::MissingArgument {
            arg: "--depth-dir".to_string(),
        })?;
        let output_dir = args.output_dir.ok_or(AppError::MissingArgument {
            arg: "--output-dir".to_string(),
        })?;

        info!("Starting batch processing from directory: {:?}", input_dir);
        info!("Depth directory: {:?}", depth_dir);
        info!("Output directory: {:?}", output_dir);

        let report = restore_directory_to_path(&input_dir, &depth_dir, &output_dir, &params, args.batch)
            .map_err(AppError::from)?;

        info!("Batch processing complete!");
        info!("Processed: {}", report.processed);
        info!("Skipped: {}", report.skipped);
        info!("Errors: {}", report.errors);
        if report.errors > 0 {
            warn!("{} image(s) failed to restore", report.errors);
        }
    } else {
        let input = args.input.ok_or(AppError::MissingArgument {
            arg: "--input".to_string(),
        })?;
        let depth = args.depth.ok_or(AppError::MissingArgument {
            arg: "--depth".to_string(),
        })?;
        let output = args.output.ok_or(AppError::MissingArgument {
            arg: "--output".to_string(),
        })?;

        let restoration = restore_to_path(&input, &depth, &output, &params).map_err(AppError::from)?;
        info!(
            "Successfully restored: {:?} -> {:?} ({} neighborhoods, {} diagnostics)",
            input,
            output,
            restoration.neighborhood_count,
            restoration.diagnostics.len()
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn size_parsing() {
        assert_eq!(parse_size("original").unwrap(), None);
        assert_eq!(parse_size("1024").unwrap(), Some(1024));
        assert!(matches!(parse_size("0"), Err(AppError::ZeroSize { size: 0 })));
        assert!(matches!(parse_size("big"), Err(AppError::InvalidSize { .. })));
    }

    #[test]
    fn flags_override_pipeline_defaults() {
        let args = CliArgs::parse_from([
            "seathru", "-i", "a.png", "-d", "a_depth.png", "-o", "out.png", "--f", "3.0", "--p", "0.2",
            "--seed", "9", "--no-denoise",
        ]);
        let params = build_params(&args).unwrap();
        assert_eq!(params.pipeline.illumination.f, 3.0);
        assert_eq!(params.pipeline.illumination.p, 0.2);
        assert_eq!(params.pipeline.seed, 9);
        assert_eq!(params.pipeline.attenuation.l, 1.0);
        assert!(!params.denoise);
        assert_eq!(params.size, None);
    }

    #[test]
    fn out_of_range_damping_is_rejected() {
        let args = CliArgs::parse_from(["seathru", "--p", "1.5"]);
        let err = build_params(&args).unwrap_err();
        assert!(err.to_string().contains("illumination.p"), "{err}");
    }
}
