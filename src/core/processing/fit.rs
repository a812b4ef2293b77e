//! Curve fitting primitives shared by the backscatter and attenuation stages.
//!
//! - [`levenberg_marquardt`]: box-bounded damped Gauss-Newton for four-parameter
//!   curves with analytic gradients.
//! - [`fit_with_restarts`]: runs independent randomized starts in parallel and
//!   keeps the lowest-loss result. Each start draws from its own `StdRng`
//!   seeded with `seed + index`, so the outcome does not depend on scheduling.
//! - [`LinearFit`]: ordinary least-squares line used as the fallback model.
use nalgebra::{Matrix4, Vector4};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

pub type Params4 = [f64; 4];

/// Inclusive per-parameter box constraints.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub lower: Params4,
    pub upper: Params4,
}

impl Bounds {
    pub fn clamp(&self, p: Params4) -> Params4 {
        let mut out = p;
        for i in 0..4 {
            out[i] = p[i].clamp(self.lower[i], self.upper[i]);
        }
        out
    }
}

/// A scalar curve `y = f(x; p)` with four parameters and an analytic gradient.
pub trait CurveModel: Sync {
    fn evaluate(&self, p: &Params4, x: f64) -> f64;
    /// Partial derivatives of `evaluate` with respect to each parameter.
    fn gradient(&self, p: &Params4, x: f64) -> Params4;
    fn bounds(&self) -> Bounds;
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum FitError {
    #[error("need at least {needed} samples, got {got}")]
    InsufficientData { needed: usize, got: usize },

    #[error("no convergence after {iterations} iterations")]
    NotConverged { iterations: usize },

    #[error("non-finite residual or parameter encountered")]
    NonFinite,
}

#[derive(Debug, Clone, Copy)]
pub struct LmOptions {
    pub max_iters: usize,
    /// Relative cost reduction below which the fit is considered converged
    pub ftol: f64,
    /// Relative step size below which the fit is considered converged
    pub xtol: f64,
    /// Largest cosine between the residual and a free Jacobian column at which
    /// the fit is considered stationary
    pub gtol: f64,
    /// Mean squared residual treated as an exact fit
    pub exact_mse: f64,
}

impl Default for LmOptions {
    fn default() -> Self {
        Self {
            max_iters: 400,
            ftol: 1e-8,
            xtol: 1e-8,
            gtol: 1e-8,
            exact_mse: 1e-20,
        }
    }
}

fn sum_squared_residuals<M: CurveModel>(model: &M, p: &Params4, xs: &[f64], ys: &[f64]) -> f64 {
    xs.iter()
        .zip(ys)
        .map(|(&x, &y)| {
            let r = y - model.evaluate(p, x);
            r * r
        })
        .sum()
}

/// Parameters sitting on a bound whose descent direction points outside it.
fn active_bounds(p: &Params4, jtr: &Vector4<f64>, bounds: &Bounds) -> [bool; 4] {
    let mut active = [false; 4];
    for i in 0..4 {
        active[i] = (p[i] <= bounds.lower[i] && jtr[i] < 0.0)
            || (p[i] >= bounds.upper[i] && jtr[i] > 0.0);
    }
    active
}

/// Bounded Levenberg-Marquardt least squares fit of `model` to `(xs, ys)`.
///
/// Parameters pinned on a bound are held fixed while their descent direction
/// points outward; the remaining step is projected back into the bounds.
/// Damping follows Nielsen's gain-ratio update. The fit converges on an exact
/// match, a stationary projected gradient, a negligible relative cost
/// reduction or a negligible step, or when no damping level reduces the cost.
pub fn levenberg_marquardt<M: CurveModel>(
    model: &M,
    xs: &[f64],
    ys: &[f64],
    p0: Params4,
    options: &LmOptions,
) -> Result<Params4, FitError> {
    debug_assert_eq!(xs.len(), ys.len());
    if xs.len() < 4 {
        return Err(FitError::InsufficientData {
            needed: 4,
            got: xs.len(),
        });
    }

    let bounds = model.bounds();
    let exact_cost = options.exact_mse * xs.len() as f64;
    let mut p = bounds.clamp(p0);
    let mut cost = sum_squared_residuals(model, &p, xs, ys);
    if !cost.is_finite() {
        return Err(FitError::NonFinite);
    }
    let mut lambda = 1e-3_f64;
    let mut nu = 2.0_f64;

    for _ in 0..options.max_iters {
        if cost <= exact_cost {
            return Ok(p);
        }

        let mut jtj = Matrix4::<f64>::zeros();
        let mut jtr = Vector4::<f64>::zeros();
        for (&x, &y) in xs.iter().zip(ys) {
            let r = y - model.evaluate(&p, x);
            let g = Vector4::from(model.gradient(&p, x));
            jtj += g * g.transpose();
            jtr += g * r;
        }
        if !jtj.iter().all(|v| v.is_finite()) || !jtr.iter().all(|v| v.is_finite()) {
            return Err(FitError::NonFinite);
        }

        let active = active_bounds(&p, &jtr, &bounds);
        let residual_norm = cost.sqrt();
        let stationary = (0..4).all(|i| {
            let column_norm = jtj[(i, i)].sqrt();
            active[i] || column_norm == 0.0 || jtr[i].abs() <= options.gtol * column_norm * residual_norm
        });
        if stationary {
            return Ok(p);
        }

        loop {
            let mut damped = jtj;
            let mut rhs = jtr;
            for i in 0..4 {
                damped[(i, i)] += lambda * jtj[(i, i)].max(1e-12);
            }
            for i in (0..4).filter(|&i| active[i]) {
                damped.row_mut(i).fill(0.0);
                damped.column_mut(i).fill(0.0);
                damped[(i, i)] = 1.0;
                rhs[i] = 0.0;
            }

            let Some(step) = damped.cholesky().map(|c| c.solve(&rhs)) else {
                lambda *= nu;
                nu *= 2.0;
                if lambda > 1e16 {
                    return Ok(p);
                }
                continue;
            };

            let mut candidate = p;
            for i in 0..4 {
                candidate[i] += step[i];
            }
            let candidate = bounds.clamp(candidate);
            let new_cost = sum_squared_residuals(model, &candidate, xs, ys);

            let taken = Vector4::from(candidate) - Vector4::from(p);
            let predicted = 2.0 * taken.dot(&jtr) - (taken.transpose() * jtj * taken)[(0, 0)];

            if new_cost.is_finite() && new_cost < cost && predicted > 0.0 {
                let gain = (cost - new_cost) / predicted;
                let step_norm = taken.norm();
                let p_norm = Vector4::from(p).norm();
                let reduction = (cost - new_cost) / cost;

                p = candidate;
                cost = new_cost;
                lambda = (lambda * (1.0 / 3.0_f64).max(1.0 - (2.0 * gain - 1.0).powi(3))).max(1e-12);
                nu = 2.0;

                if reduction < options.ftol || step_norm < options.xtol * (p_norm + options.xtol) {
                    return Ok(p);
                }
                break;
            }

            lambda *= nu;
            nu *= 2.0;
            if lambda > 1e16 {
                return Ok(p);
            }
        }
    }

    Err(FitError::NotConverged {
        iterations: options.max_iters,
    })
}

/// Best result of a set of randomized restarts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BestFit {
    pub params: Params4,
    pub loss: f64,
    /// Index of the restart that produced this fit
    pub restart: usize,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RestartSummary {
    pub best: Option<BestFit>,
    pub failed: usize,
}

/// Fit `model` from `restarts` random initial guesses and keep the one with the
/// lowest `loss`. Failed restarts are logged and skipped.
pub fn fit_with_restarts<M, I, L>(
    model: &M,
    xs: &[f64],
    ys: &[f64],
    restarts: usize,
    seed: u64,
    initial_guess: I,
    loss: L,
) -> RestartSummary
where
    M: CurveModel,
    I: Fn(&mut StdRng) -> Params4 + Sync,
    L: Fn(&Params4) -> f64 + Sync,
{
    let options = LmOptions::default();
    let attempts: Vec<Result<BestFit, FitError>> = (0..restarts)
        .into_par_iter()
        .map(|restart| {
            let mut rng = StdRng::seed_from_u64(seed.wrapping_add(restart as u64));
            let p0 = initial_guess(&mut rng);
            levenberg_marquardt(model, xs, ys, p0, &options).map(|params| BestFit {
                params,
                loss: loss(&params),
                restart,
            })
        })
        .collect();

    let mut best: Option<BestFit> = None;
    let mut failed = 0;
    for attempt in attempts {
        match attempt {
            Ok(fit) if fit.loss.is_finite() => {
                let better = match &best {
                    None => true,
                    Some(current) => fit.loss < current.loss,
                };
                if better {
                    best = Some(fit);
                }
            }
            Ok(fit) => {
                failed += 1;
                warn!("Restart {} produced a non-finite loss", fit.restart);
            }
            Err(e) => {
                failed += 1;
                warn!("Curve fit restart failed: {}", e);
            }
        }
    }

    if let Some(fit) = &best {
        debug!(
            "Best of {} restarts: loss={:.6} (restart {}), failed={}",
            restarts, fit.loss, fit.restart, failed
        );
    }

    RestartSummary { best, failed }
}

/// Ordinary least-squares line `y = slope * x + intercept`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LinearFit {
    pub slope: f64,
    pub intercept: f64,
}

impl LinearFit {
    /// Degenerate inputs still produce a line: no samples gives the zero line,
    /// a single distinct x gives a horizontal line through the mean of y.
    pub fn fit(xs: &[f64], ys: &[f64]) -> Self {
        debug_assert_eq!(xs.len(), ys.len());
        let n = xs.len();
        if n == 0 {
            return Self {
                slope: 0.0,
                intercept: 0.0,
            };
        }
        let mean_x = xs.iter().sum::<f64>() / n as f64;
        let mean_y = ys.iter().sum::<f64>() / n as f64;
        let (sxx, sxy) = xs
            .iter()
            .zip(ys)
            .fold((0.0, 0.0), |(sxx, sxy), (&x, &y)| {
                let dx = x - mean_x;
                (sxx + dx * dx, sxy + dx * (y - mean_y))
            });
        if sxx <= f64::EPSILON {
            return Self {
                slope: 0.0,
                intercept: mean_y,
            };
        }
        let slope = sxy / sxx;
        Self {
            slope,
            intercept: mean_y - slope * mean_x,
        }
    }

    #[inline]
    pub fn evaluate(&self, x: f64) -> f64 {
        self.slope * x + self.intercept
    }
}

/// How a per-channel curve fit turned out.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FitReport {
    /// Lowest mean loss of the nonlinear model; infinite when no restart converged
    pub best_loss: f64,
    /// Loss above which the linear fallback is used
    pub max_mean_loss: f64,
    pub fallback: bool,
    pub restarts: usize,
    pub failed_restarts: usize,
    /// Number of samples the model was fitted to
    pub samples: usize,
}
