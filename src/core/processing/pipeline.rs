//! End-to-end restoration of one image from its depth map.
//!
//! Stage order: backscatter and the neighborhood map are independent and run
//! concurrently; illumination and attenuation then run per channel in
//! parallel against the single shared neighborhood map; reconstruction
//! combines all three channels.
use std::fmt;

use ndarray::{Array2, Array3, Axis, stack};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::core::params::PipelineParams;
use crate::core::processing::attenuation::{
    AttenuationCoefficients, AttenuationEstimate, estimate_wideband_attenuation,
    refine_wideband_attenuation,
};
use crate::core::processing::backscatter::{
    BackscatterCoefficients, BackscatterEstimate, find_backscatter_estimation_points,
    find_backscatter_values,
};
use crate::core::processing::fit::FitReport;
use crate::core::processing::illumination::estimate_illumination;
use crate::core::processing::neighborhood::{construct_neighborhood_map, refine_neighborhood_map};
use crate::core::processing::reconstruct::recover_image;
use crate::error::{Error, Result};
use crate::types::Channel;

/// Curve-fitting stage a diagnostic refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Backscatter,
    Attenuation,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Backscatter => write!(f, "backscatter"),
            Stage::Attenuation => write!(f, "attenuation"),
        }
    }
}

/// Non-fatal conditions met while restoring. The output is still valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Diagnostic {
    BackscatterFallback {
        channel: Channel,
        loss: f64,
        threshold: f64,
    },
    AttenuationFallback {
        channel: Channel,
        loss: f64,
        threshold: f64,
    },
    RestartFailures {
        stage: Stage,
        channel: Channel,
        failed: usize,
        restarts: usize,
    },
    /// Every pixel ended up as background; the image is returned unchanged.
    EmptyForeground,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::BackscatterFallback {
                channel,
                loss,
                threshold,
            } => write!(
                f,
                "channel {}: backscatter fit loss {:.4} exceeds {:.4}, using linear model",
                channel, loss, threshold
            ),
            Diagnostic::AttenuationFallback {
                channel,
                loss,
                threshold,
            } => write!(
                f,
                "channel {}: attenuation fit loss {:.4} exceeds {:.4}, using linear model",
                channel, loss, threshold
            ),
            Diagnostic::RestartFailures {
                stage,
                channel,
                failed,
                restarts,
            } => write!(
                f,
                "channel {}: {} of {} {} fit restarts failed",
                channel, failed, restarts, stage
            ),
            Diagnostic::EmptyForeground => {
                write!(f, "no foreground neighborhoods; image left unchanged")
            }
        }
    }
}

/// Fitted models and fit quality for one channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelReport {
    pub channel: Channel,
    pub backscatter_points: usize,
    pub backscatter: BackscatterCoefficients,
    pub backscatter_fit: FitReport,
    pub attenuation: AttenuationCoefficients,
    pub attenuation_fit: FitReport,
}

#[derive(Debug, Clone)]
pub struct Restoration {
    /// Restored image, `(rows, cols, 3)` in [0, 1]
    pub image: Array3<f64>,
    pub neighborhood_count: usize,
    pub channels: [ChannelReport; 3],
    pub diagnostics: Vec<Diagnostic>,
}

/// Reject inputs the pipeline cannot work with.
pub fn validate_inputs(image: &Array3<f64>, depths: &Array2<f64>) -> Result<()> {
    let (rows, cols, channels) = image.dim();
    if channels != 3 {
        return Err(Error::ChannelCount { channels });
    }
    if rows == 0 || cols == 0 {
        return Err(Error::EmptyInput);
    }
    if depths.dim() != (rows, cols) {
        return Err(Error::ShapeMismatch {
            image: (rows, cols),
            depth: depths.dim(),
        });
    }
    Ok(())
}

fn stage_seed(base: u64, stage: Stage, channel: Channel) -> u64 {
    let stage = match stage {
        Stage::Backscatter => 1,
        Stage::Attenuation => 2,
    };
    base.wrapping_add(stage * 1_000_003)
        .wrapping_add(channel.index() as u64 * 10_007)
}

fn fit_diagnostics(stage: Stage, channel: Channel, report: &FitReport) -> Vec<Diagnostic> {
    let mut out = Vec::new();
    if report.failed_restarts > 0 {
        out.push(Diagnostic::RestartFailures {
            stage,
            channel,
            failed: report.failed_restarts,
            restarts: report.restarts,
        });
    }
    if report.fallback {
        let (loss, threshold) = (report.best_loss, report.max_mean_loss);
        out.push(match stage {
            Stage::Backscatter => Diagnostic::BackscatterFallback {
                channel,
                loss,
                threshold,
            },
            Stage::Attenuation => Diagnostic::AttenuationFallback {
                channel,
                loss,
                threshold,
            },
        });
    }
    out
}

struct ChannelResult {
    backscatter: BackscatterEstimate,
    attenuation: AttenuationEstimate,
    points: usize,
}

/// Restore `image` (`(rows, cols, 3)`, values in [0, 1]) given per-pixel scene
/// depth in the same units for every pixel.
pub fn run_pipeline(
    image: &Array3<f64>,
    depths: &Array2<f64>,
    params: &PipelineParams,
) -> Result<Restoration> {
    validate_inputs(image, depths)?;
    params.validate()?;
    let (rows, cols, _) = image.dim();
    info!("Restoring {}x{} image", cols, rows);

    let bs = &params.backscatter;
    let nb = &params.neighborhood;
    let ((points, backscatter), (nmap, neighborhood_count)) = rayon::join(
        || {
            info!("Estimating backscatter...");
            let points = find_backscatter_estimation_points(
                image,
                depths,
                bs.num_bins,
                bs.fraction,
                bs.max_vals,
                bs.min_depth_percent,
            );
            let estimates: Vec<BackscatterEstimate> = Channel::ALL
                .par_iter()
                .map(|&ch| {
                    find_backscatter_values(
                        &points[ch.index()],
                        depths,
                        bs.restarts,
                        bs.max_mean_loss_fraction,
                        stage_seed(params.seed, Stage::Backscatter, ch),
                    )
                })
                .collect();
            (points, estimates)
        },
        || {
            info!("Constructing neighborhood map...");
            let (raw, raw_count) = construct_neighborhood_map(depths, nb.epsilon);
            info!("Refining neighborhood map ({} raw neighborhoods)...", raw_count);
            refine_neighborhood_map(&raw, nb.min_size, nb.closing_radius)
        },
    );

    let il = &params.illumination;
    let at = &params.attenuation;
    info!("Estimating illumination and wideband attenuation...");
    let results: Vec<ChannelResult> = Channel::ALL
        .par_iter()
        .zip(backscatter.into_par_iter())
        .map(|(&ch, backscatter)| {
            let illum = estimate_illumination(
                image.index_axis(Axis(2), ch.index()),
                &backscatter.values,
                &nmap,
                neighborhood_count,
                il.p,
                il.f,
                il.max_iters,
                il.tol,
            );
            let initial = estimate_wideband_attenuation(depths, &illum, at.closing_radius, at.max_val);
            let attenuation = refine_wideband_attenuation(
                depths,
                &illum,
                &initial,
                at.restarts,
                at.min_depth_fraction,
                at.max_mean_loss_fraction,
                at.l,
                at.spread_data_fraction,
                stage_seed(params.seed, Stage::Attenuation, ch),
            );
            ChannelResult {
                backscatter,
                attenuation,
                points: points[ch.index()].len(),
            }
        })
        .collect();

    info!("Reconstructing image...");
    let b_views: Vec<_> = results.iter().map(|r| r.backscatter.values.view()).collect();
    let beta_views: Vec<_> = results.iter().map(|r| r.attenuation.field.view()).collect();
    let b = stack(Axis(2), &b_views).map_err(|e| Error::Processing(e.to_string()))?;
    let beta_d = stack(Axis(2), &beta_views).map_err(|e| Error::Processing(e.to_string()))?;
    let restored = recover_image(image, depths, &b, &beta_d, &nmap);

    let mut diagnostics = Vec::new();
    if neighborhood_count == 0 {
        diagnostics.push(Diagnostic::EmptyForeground);
    }
    let mut reports = Vec::with_capacity(3);
    for (ch, result) in Channel::ALL.into_iter().zip(results) {
        diagnostics.extend(fit_diagnostics(Stage::Backscatter, ch, &result.backscatter.report));
        diagnostics.extend(fit_diagnostics(Stage::Attenuation, ch, &result.attenuation.report));
        debug!(
            "Channel {}: backscatter {:?}, attenuation {:?}",
            ch, result.backscatter.coefficients, result.attenuation.coefficients
        );
        reports.push(ChannelReport {
            channel: ch,
            backscatter_points: result.points,
            backscatter: result.backscatter.coefficients,
            backscatter_fit: result.backscatter.report,
            attenuation: result.attenuation.coefficients,
            attenuation_fit: result.attenuation.report,
        });
    }
    for diagnostic in &diagnostics {
        warn!("{}", diagnostic);
    }

    let channels: [ChannelReport; 3] = reports
        .try_into()
        .map_err(|_| Error::Processing("expected one report per channel".to_string()))?;

    Ok(Restoration {
        image: restored,
        neighborhood_count,
        channels,
        diagnostics,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_invalid_parameters_before_work() {
        let image = Array3::<f64>::zeros((4, 4, 3));
        let depths = Array2::<f64>::ones((4, 4));
        let mut params = PipelineParams::default();
        params.illumination.p = 1.5;
        assert!(matches!(
            run_pipeline(&image, &depths, &params),
            Err(Error::InvalidArgument { arg: "illumination.p", .. })
        ));
    }

    #[test]
    fn rejects_wrong_channel_count() {
        let image = Array3::<f64>::zeros((4, 4, 1));
        let depths = Array2::<f64>::zeros((4, 4));
        assert!(matches!(
            validate_inputs(&image, &depths),
            Err(Error::ChannelCount { channels: 1 })
        ));
    }

    #[test]
    fn rejects_shape_mismatch() {
        let image = Array3::<f64>::zeros((4, 5, 3));
        let depths = Array2::<f64>::zeros((5, 4));
        let err = run_pipeline(&image, &depths, &PipelineParams::default()).unwrap_err();
        assert!(matches!(err, Error::ShapeMismatch { image: (4, 5), depth: (5, 4) }));
    }

    #[test]
    fn rejects_empty_image() {
        let image = Array3::<f64>::zeros((0, 4, 3));
        let depths = Array2::<f64>::zeros((0, 4));
        assert!(matches!(validate_inputs(&image, &depths), Err(Error::EmptyInput)));
    }

    #[test]
    fn stage_seeds_are_distinct() {
        let mut seeds = Vec::new();
        for stage in [Stage::Backscatter, Stage::Attenuation] {
            for ch in Channel::ALL {
                seeds.push(stage_seed(7, stage, ch));
            }
        }
        seeds.sort_unstable();
        seeds.dedup();
        assert_eq!(seeds.len(), 6);
    }

    #[test]
    fn fallback_reports_become_diagnostics() {
        let report = FitReport {
            best_loss: 0.5,
            max_mean_loss: 0.1,
            fallback: true,
            restarts: 10,
            failed_restarts: 2,
            samples: 40,
        };
        let diags = fit_diagnostics(Stage::Attenuation, Channel::Blue, &report);
        assert_eq!(diags.len(), 2);
        assert!(matches!(diags[0], Diagnostic::RestartFailures { failed: 2, .. }));
        assert!(matches!(
            diags[1],
            Diagnostic::AttenuationFallback { channel: Channel::Blue, .. }
        ));
        assert!(diags[1].to_string().contains("channel B"));
    }
}
