use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::{BitDepth, DepthEncoding, OutputFormat};

/// Backscatter point selection and curve fit settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackscatterParams {
    /// Number of equal-width depth bins
    pub num_bins: usize,
    /// Fraction of the darkest pixels kept per bin
    pub fraction: f64,
    /// Upper bound on kept pixels per bin
    pub max_vals: usize,
    /// Pixels shallower than `min + min_depth_percent * range` are ignored
    pub min_depth_percent: f64,
    pub restarts: usize,
    /// Fall back to a line when the best mean loss exceeds this fraction of the depth range
    pub max_mean_loss_fraction: f64,
}

impl Default for BackscatterParams {
    fn default() -> Self {
        Self {
            num_bins: 10,
            fraction: 0.01,
            max_vals: 20,
            min_depth_percent: 0.0,
            restarts: 25,
            max_mean_loss_fraction: 0.1,
        }
    }
}

/// Depth-coherent segmentation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NeighborhoodParams {
    /// Admission threshold as a fraction of the depth range
    pub epsilon: f64,
    /// Regions smaller than this are merged into their nearest neighbor
    pub min_size: usize,
    /// Width of the square structuring element used to close the label grid
    pub closing_radius: usize,
}

impl Default for NeighborhoodParams {
    fn default() -> Self {
        Self {
            epsilon: 0.1,
            min_size: 50,
            closing_radius: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IlluminationParams {
    /// Damping factor pulling each pixel toward its own residual, in (0, 1]
    pub p: f64,
    /// Illumination intensity multiplier
    pub f: f64,
    pub max_iters: usize,
    pub tol: f64,
}

impl Default for IlluminationParams {
    fn default() -> Self {
        Self {
            p: 0.01,
            f: 2.0,
            max_iters: 100,
            tol: 1e-5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AttenuationParams {
    /// Radius of the disk used to close the initial estimate
    pub closing_radius: usize,
    /// Ceiling of the initial per-pixel estimate
    pub max_val: f64,
    pub restarts: usize,
    pub min_depth_fraction: f64,
    /// None means the exponential model is always kept when any restart succeeds
    pub max_mean_loss_fraction: Option<f64>,
    /// Calibration multiplier applied to the refined field
    pub l: f64,
    /// Spacing of retained samples as a fraction of the depth range
    pub spread_data_fraction: f64,
}

impl Default for AttenuationParams {
    fn default() -> Self {
        Self {
            closing_radius: 6,
            max_val: 10.0,
            restarts: 10,
            min_depth_fraction: 0.1,
            max_mean_loss_fraction: None,
            l: 1.0,
            spread_data_fraction: 0.05,
        }
    }
}

/// Full restoration pipeline configuration, suitable for JSON config files.
/// Every field is optional in serialized form and falls back to its default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineParams {
    pub backscatter: BackscatterParams,
    pub neighborhood: NeighborhoodParams,
    pub illumination: IlluminationParams,
    pub attenuation: AttenuationParams,
    /// Base seed for randomized fit restarts
    pub seed: u64,
}

impl Default for PipelineParams {
    fn default() -> Self {
        Self {
            backscatter: BackscatterParams::default(),
            neighborhood: NeighborhoodParams::default(),
            illumination: IlluminationParams::default(),
            attenuation: AttenuationParams::default(),
            seed: 0x5EA7_4B0,
        }
    }
}

fn check(arg: &'static str, value: f64, valid: bool) -> Result<()> {
    if valid && value.is_finite() {
        Ok(())
    } else {
        Err(Error::InvalidArgument {
            arg,
            value: value.to_string(),
        })
    }
}

impl PipelineParams {
    /// Reject settings the stages cannot work with.
    pub fn validate(&self) -> Result<()> {
        let bs = &self.backscatter;
        check("backscatter.num_bins", bs.num_bins as f64, bs.num_bins > 0)?;
        check("backscatter.fraction", bs.fraction, bs.fraction > 0.0 && bs.fraction <= 1.0)?;
        check("neighborhood.epsilon", self.neighborhood.epsilon, self.neighborhood.epsilon >= 0.0)?;
        let il = &self.illumination;
        check("illumination.p", il.p, il.p > 0.0 && il.p <= 1.0)?;
        check("illumination.f", il.f, il.f > 0.0)?;
        check("attenuation.l", self.attenuation.l, self.attenuation.l > 0.0)?;
        Ok(())
    }
}

/// End-to-end parameters for the file-level API and CLI
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RestoreParams {
    pub format: OutputFormat,
    pub bit_depth: BitDepth,
    pub depth_encoding: DepthEncoding,
    /// Additive depth offset applied after inverting a disparity map
    pub depth_offset: f64,
    /// Multiplicative depth scale applied after inverting a disparity map
    pub depth_scale: f64,
    /// Target long side in pixels; None means original size
    pub size: Option<usize>,
    /// Apply total-variation denoising to the restored image
    pub denoise: bool,
    /// Write a JSON sidecar with fitted coefficients next to the output
    pub sidecar: bool,
    pub pipeline: PipelineParams,
}

impl Default for RestoreParams {
    fn default() -> Self {
        Self {
            format: OutputFormat::PNG,
            bit_depth: BitDepth::U8,
            depth_encoding: DepthEncoding::Disparity,
            depth_offset: 2.0,
            depth_scale: 10.0,
            size: None,
            denoise: true,
            sidecar: false,
            pipeline: PipelineParams::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let json = r#"{ "illumination": { "p": 0.5 }, "seed": 7 }"#;
        let params: PipelineParams = serde_json::from_str(json).unwrap();
        assert_eq!(params.seed, 7);
        assert_eq!(params.illumination.p, 0.5);
        assert_eq!(params.illumination.f, 2.0);
        assert_eq!(params.backscatter, BackscatterParams::default());
        assert_eq!(params.attenuation.max_mean_loss_fraction, None);
    }

    #[test]
    fn defaults_are_valid() {
        assert!(PipelineParams::default().validate().is_ok());
    }

    #[test]
    fn out_of_range_values_are_named() {
        let mut params = PipelineParams::default();
        params.illumination.p = 0.0;
        match params.validate() {
            Err(Error::InvalidArgument { arg, value }) => {
                assert_eq!(arg, "illumination.p");
                assert_eq!(value, "0");
            }
            other => panic!("expected invalid p, got {other:?}"),
        }

        let mut params = PipelineParams::default();
        params.attenuation.l = f64::NAN;
        assert!(matches!(
            params.validate(),
            Err(Error::InvalidArgument { arg: "attenuation.l", .. })
        ));
    }

    #[test]
    fn restore_params_round_trip() {
        let params = RestoreParams {
            size: Some(640),
            ..RestoreParams::default()
        };
        let text = serde_json::to_string(&params).unwrap();
        let back: RestoreParams = serde_json::from_str(&text).unwrap();
        assert_eq!(back.size, Some(640));
        assert_eq!(back.pipeline, params.pipeline);
    }
}
