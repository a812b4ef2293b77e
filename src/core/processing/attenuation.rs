//! Wideband attenuation coefficient estimation.
//!
//! A coarse per-pixel estimate is derived from illumination and depth
//! (`beta = -ln(E) / z`), smoothed, and then regularized by fitting
//! `beta(z) = a * exp(b * z) + c * exp(d * z)` against depth.
use ndarray::{Array2, Zip};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::core::processing::depth::depth_range;
use crate::core::processing::filters::{Footprint, denoise_bilateral, grey_closing};
use crate::core::processing::fit::{
    Bounds, CurveModel, FitReport, LinearFit, Params4, fit_with_restarts,
};

const EPS: f64 = 1e-8;
/// Guard used when inverting the fitted model back into depths
const RECON_EPS: f64 = 1e-5;

/// Coarse attenuation map from illumination and depth.
///
/// `min(max_val, -ln(illum + eps) / (max(z, 0) + eps))`, zeroed where depth or
/// illumination is at or below `eps` and clipped at zero, then closed with a
/// disk of `radius` and bilateral filtered.
pub fn estimate_wideband_attenuation(
    depths: &Array2<f64>,
    illum: &Array2<f64>,
    radius: usize,
    max_val: f64,
) -> Array2<f64> {
    let mut raw = Array2::<f64>::zeros(depths.dim());
    Zip::from(&mut raw)
        .and(depths)
        .and(illum)
        .par_for_each(|out, &z, &i| {
            *out = if z > EPS && i > EPS {
                let beta = -(i + EPS).ln() / (z.max(0.0) + EPS);
                beta.min(max_val).max(0.0)
            } else {
                0.0
            };
        });

    let closed = grey_closing(&raw, &Footprint::disk(radius));
    denoise_bilateral(&closed, None, 1.0)
}

/// Thin sorted `(x, y)` samples to roughly one sample per `radius_fraction`
/// of the x range.
///
/// The smallest-x sample is always kept. Following samples collect into a
/// window; once a sample lies at least `radius` past the last emitted x, the
/// window (including that sample) emits its median-by-y member and restarts.
/// A trailing window that never spans `radius` is dropped.
pub fn filter_data(xs: &[f64], ys: &[f64], radius_fraction: f64) -> (Vec<f64>, Vec<f64>) {
    debug_assert_eq!(xs.len(), ys.len());
    if xs.is_empty() {
        return (Vec::new(), Vec::new());
    }

    let mut pairs: Vec<(f64, f64)> = xs.iter().copied().zip(ys.iter().copied()).collect();
    pairs.sort_by(|a, b| a.0.total_cmp(&b.0));
    let x_min = pairs[0].0;
    let x_max = pairs[pairs.len() - 1].0;
    let radius = radius_fraction * (x_max - x_min);

    let mut out_x = vec![pairs[0].0];
    let mut out_y = vec![pairs[0].1];
    let mut anchor = pairs[0].0;
    let mut window: Vec<(f64, f64)> = Vec::new();

    for &(x, y) in &pairs[1..] {
        window.push((x, y));
        if x - anchor >= radius {
            window.sort_by(|a, b| a.1.total_cmp(&b.1));
            let (mx, my) = window[window.len() / 2];
            out_x.push(mx);
            out_y.push(my);
            window.clear();
            anchor = x;
        }
    }

    (out_x, out_y)
}

/// Fitted attenuation-versus-depth curve for one channel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "model", rename_all = "snake_case")]
pub enum AttenuationCoefficients {
    TwoTermExponential { a: f64, b: f64, c: f64, d: f64 },
    Linear(LinearFit),
}

impl AttenuationCoefficients {
    fn from_params(p: &Params4) -> Self {
        AttenuationCoefficients::TwoTermExponential {
            a: p[0],
            b: p[1],
            c: p[2],
            d: p[3],
        }
    }

    pub fn evaluate(&self, z: f64) -> f64 {
        match *self {
            AttenuationCoefficients::TwoTermExponential { a, b, c, d } => {
                a * (b * z).exp() + c * (d * z).exp()
            }
            AttenuationCoefficients::Linear(line) => line.evaluate(z),
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, AttenuationCoefficients::Linear(_))
    }
}

struct AttenuationModel;

impl CurveModel for AttenuationModel {
    fn evaluate(&self, p: &Params4, z: f64) -> f64 {
        AttenuationCoefficients::from_params(p).evaluate(z)
    }

    fn gradient(&self, p: &Params4, z: f64) -> Params4 {
        let e1 = (p[1] * z).exp();
        let e2 = (p[3] * z).exp();
        [e1, p[0] * z * e1, e2, p[2] * z * e2]
    }

    fn bounds(&self) -> Bounds {
        Bounds {
            lower: [0.0, -100.0, 0.0, -100.0],
            upper: [100.0, 0.0, 100.0, 0.0],
        }
    }
}

#[derive(Debug, Clone)]
pub struct AttenuationEstimate {
    /// `l * beta(z)` evaluated over the whole depth map
    pub field: Array2<f64>,
    pub coefficients: AttenuationCoefficients,
    pub report: FitReport,
}

/// Regularize a coarse attenuation map by fitting a two-term exponential
/// against depth.
///
/// Only pixels with positive illumination, depth above
/// `min + min_depth_fraction * range` and an estimate above `eps` take part.
/// Their pairs are thinned with [`filter_data`] and fitted from `restarts`
/// random starts; each candidate is scored by how well it reconstructs the
/// depths of the participating pixels. When no restart succeeds, or the best
/// score exceeds `max_mean_loss_fraction * range` (never, when `None`), a
/// least-squares line through the unfiltered pairs is used instead.
#[allow(clippy::too_many_arguments)]
pub fn refine_wideband_attenuation(
    depths: &Array2<f64>,
    illum: &Array2<f64>,
    estimation: &Array2<f64>,
    restarts: usize,
    min_depth_fraction: f64,
    max_mean_loss_fraction: Option<f64>,
    l: f64,
    radius_fraction: f64,
    seed: u64,
) -> AttenuationEstimate {
    let (z_min, z_max) = depth_range(depths);
    let min_depth = z_min + min_depth_fraction * (z_max - z_min);
    let max_mean_loss = max_mean_loss_fraction.map_or(f64::INFINITY, |f| f * (z_max - z_min));

    let mut zs = Vec::new();
    let mut es = Vec::new();
    let mut ills = Vec::new();
    Zip::from(depths)
        .and(illum)
        .and(estimation)
        .for_each(|&z, &i, &e| {
            if i > 0.0 && z > min_depth && e > EPS {
                zs.push(z);
                es.push(e);
                ills.push(i);
            }
        });

    let (fx, fy) = filter_data(&zs, &es, radius_fraction);
    debug!(
        "Attenuation fit: {} masked pixels thinned to {} samples",
        zs.len(),
        fx.len()
    );

    let model = AttenuationModel;
    let depth_error = |p: &Params4| {
        zs.iter()
            .zip(&ills)
            .map(|(&z, &i)| {
                let reconstructed = -(i + RECON_EPS).ln() / (model.evaluate(p, z) + RECON_EPS);
                (z - reconstructed).abs()
            })
            .sum::<f64>()
            / zs.len().max(1) as f64
    };

    let summary = fit_with_restarts(
        &model,
        &fx,
        &fy,
        restarts,
        seed,
        |rng| {
            [
                rng.r#gen::<f64>(),
                -rng.r#gen::<f64>(),
                rng.r#gen::<f64>(),
                -rng.r#gen::<f64>(),
            ]
        },
        depth_error,
    );

    let best_loss = summary.best.map_or(f64::INFINITY, |b| b.loss);
    let coefficients = match summary.best {
        Some(best) if best.loss <= max_mean_loss => {
            debug!("Found best attenuation loss {:.6}", best.loss);
            AttenuationCoefficients::from_params(&best.params)
        }
        _ => {
            warn!(
                "Could not find an accurate attenuation reconstruction (loss {:.4}, limit {:.4}). Switching to linear model.",
                best_loss, max_mean_loss
            );
            AttenuationCoefficients::Linear(LinearFit::fit(&zs, &es))
        }
    };

    let field = depths.mapv(|z| l * coefficients.evaluate(z));
    AttenuationEstimate {
        field,
        coefficients,
        report: FitReport {
            best_loss,
            max_mean_loss,
            fallback: coefficients.is_fallback(),
            restarts,
            failed_restarts: summary.failed,
            samples: fx.len(),
        },
    }
}
