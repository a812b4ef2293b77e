//! Backscatter estimation.
//!
//! The darkest pixels at a given depth carry almost no object radiance, so
//! their values approximate the light scattered back by the water column.
//! These samples are fitted with
//! `B(z) = B_inf * (1 - exp(-beta_B * z)) + J' * exp(-beta_D' * z)` per channel.
use ndarray::{Array2, Array3, Axis, Zip};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::core::processing::depth::depth_range;
use crate::core::processing::fit::{
    Bounds, CurveModel, FitReport, LinearFit, Params4, fit_with_restarts,
};

/// One `(depth, channel value)` sample taken from a dark pixel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackscatterPoint {
    pub depth: f64,
    pub value: f64,
}

/// Fitted backscatter curve for one channel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "model", rename_all = "snake_case")]
pub enum BackscatterCoefficients {
    Exponential {
        b_inf: f64,
        beta_b: f64,
        j_prime: f64,
        beta_d_prime: f64,
    },
    Linear(LinearFit),
}

impl BackscatterCoefficients {
    fn from_params(p: &Params4) -> Self {
        BackscatterCoefficients::Exponential {
            b_inf: p[0],
            beta_b: p[1],
            j_prime: p[2],
            beta_d_prime: p[3],
        }
    }

    pub fn evaluate(&self, z: f64) -> f64 {
        match *self {
            BackscatterCoefficients::Exponential {
                b_inf,
                beta_b,
                j_prime,
                beta_d_prime,
            } => b_inf * (1.0 - (-beta_b * z).exp()) + j_prime * (-beta_d_prime * z).exp(),
            BackscatterCoefficients::Linear(line) => line.evaluate(z),
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, BackscatterCoefficients::Linear(_))
    }
}

struct BackscatterModel;

impl CurveModel for BackscatterModel {
    fn evaluate(&self, p: &Params4, z: f64) -> f64 {
        BackscatterCoefficients::from_params(p).evaluate(z)
    }

    fn gradient(&self, p: &Params4, z: f64) -> Params4 {
        let eb = (-p[1] * z).exp();
        let ed = (-p[3] * z).exp();
        [1.0 - eb, p[0] * z * eb, ed, -p[2] * z * ed]
    }

    fn bounds(&self) -> Bounds {
        Bounds {
            lower: [0.0, 0.0, 0.0, 0.0],
            upper: [1.0, 5.0, 1.0, 5.0],
        }
    }
}

/// Backscatter evaluated at every pixel plus the curve that produced it.
#[derive(Debug, Clone)]
pub struct BackscatterEstimate {
    pub values: Array2<f64>,
    pub coefficients: BackscatterCoefficients,
    pub report: FitReport,
}

/// Sample dark pixels per depth bin as backscatter estimates.
///
/// The depth range is split into `num_bins` equal bins (bin edges are
/// inclusive on both sides). Within each bin only pixels deeper than
/// `min + min_depth_percent * range` are considered; they are ranked by mean
/// RGB intensity and the darkest `min(ceil(fraction * n), max_vals)` are kept.
/// Returns one point list per channel, in R, G, B order.
pub fn find_backscatter_estimation_points(
    image: &Array3<f64>,
    depths: &Array2<f64>,
    num_bins: usize,
    fraction: f64,
    max_vals: usize,
    min_depth_percent: f64,
) -> [Vec<BackscatterPoint>; 3] {
    let (z_min, z_max) = depth_range(depths);
    let cutoff = z_min + min_depth_percent * (z_max - z_min);
    let norms = image.map_axis(Axis(2), |px| px.sum() / px.len().max(1) as f64);

    let mut points: [Vec<BackscatterPoint>; 3] = Default::default();
    let width = (z_max - z_min) / num_bins.max(1) as f64;

    for bin in 0..num_bins {
        let lo = z_min + bin as f64 * width;
        let hi = if bin + 1 == num_bins {
            z_max
        } else {
            z_min + (bin + 1) as f64 * width
        };

        let mut candidates: Vec<(f64, (usize, usize))> = Vec::new();
        Zip::indexed(depths).and(&norms).for_each(|idx, &z, &norm| {
            if z > cutoff && z >= lo && z <= hi {
                candidates.push((norm, idx));
            }
        });
        candidates.sort_by(|a, b| a.0.total_cmp(&b.0));

        let keep = ((fraction * candidates.len() as f64).ceil() as usize).min(max_vals);
        for &(_, (r, c)) in candidates.iter().take(keep) {
            let z = depths[[r, c]];
            for (ch, list) in points.iter_mut().enumerate() {
                list.push(BackscatterPoint {
                    depth: z,
                    value: image[[r, c, ch]],
                });
            }
        }
    }

    debug!(
        "Backscatter points: {} per channel from {} bins (cutoff depth {:.3})",
        points[0].len(),
        num_bins,
        cutoff
    );
    points
}

/// Fit the backscatter curve to `points` and evaluate it at every depth.
///
/// The nonlinear model is fitted `restarts` times from random starts inside
/// its bounds and the lowest mean absolute error wins. When no restart
/// converges, or the best error exceeds `max_mean_loss_fraction * depth range`,
/// an ordinary least-squares line through the points is used instead.
pub fn find_backscatter_values(
    points: &[BackscatterPoint],
    depths: &Array2<f64>,
    restarts: usize,
    max_mean_loss_fraction: f64,
    seed: u64,
) -> BackscatterEstimate {
    let xs: Vec<f64> = points.iter().map(|p| p.depth).collect();
    let ys: Vec<f64> = points.iter().map(|p| p.value).collect();
    let (z_min, z_max) = depth_range(depths);
    let max_mean_loss = max_mean_loss_fraction * (z_max - z_min);

    let model = BackscatterModel;
    let upper = model.bounds().upper;
    let mean_abs_error = |p: &Params4| {
        xs.iter()
            .zip(&ys)
            .map(|(&x, &y)| (y - model.evaluate(p, x)).abs())
            .sum::<f64>()
            / xs.len().max(1) as f64
    };

    let summary = fit_with_restarts(
        &model,
        &xs,
        &ys,
        restarts,
        seed,
        |rng| {
            let mut p0 = [0.0; 4];
            for (v, hi) in p0.iter_mut().zip(upper) {
                *v = rng.r#gen::<f64>() * hi;
            }
            p0
        },
        mean_abs_error,
    );

    let best_loss = summary.best.map_or(f64::INFINITY, |b| b.loss);
    let coefficients = match summary.best {
        Some(best) if best.loss <= max_mean_loss => {
            BackscatterCoefficients::from_params(&best.params)
        }
        _ => {
            warn!(
                "Could not find an accurate backscatter reconstruction (loss {:.4}, limit {:.4}). Switching to linear model.",
                best_loss, max_mean_loss
            );
            BackscatterCoefficients::Linear(LinearFit::fit(&xs, &ys))
        }
    };

    let values = depths.mapv(|z| coefficients.evaluate(z));
    BackscatterEstimate {
        values,
        coefficients,
        report: FitReport {
            best_loss,
            max_mean_loss,
            fallback: coefficients.is_fallback(),
            restarts,
            failed_restarts: summary.failed,
            samples: xs.len(),
        },
    }
}
