//! Depth-map preparation at the boundary with the external depth estimator.
use ndarray::Array2;

/// Minimum and maximum finite depth. An empty or all-NaN grid yields `(0.0, 0.0)`.
pub fn depth_range(depths: &Array2<f64>) -> (f64, f64) {
    let (min, max) = depths
        .iter()
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });
    if min > max { (0.0, 0.0) } else { (min, max) }
}

/// Min-max rescale a raw depth-network output to [0, 1].
/// A constant signal maps to all zeros.
pub fn normalize_depth_signal(raw: &Array2<f64>) -> Array2<f64> {
    let (min, max) = depth_range(raw);
    let span = max - min;
    if span <= 0.0 {
        return Array2::zeros(raw.dim());
    }
    raw.mapv(|v| (v - min) / span)
}

/// Convert a normalized inverse-depth signal (1 = near) into scene depth:
/// `depth = scale * (1 - normalized) + offset`.
pub fn preprocess_depth_map(normalized: &Array2<f64>, offset: f64, scale: f64) -> Array2<f64> {
    normalized.mapv(|n| scale * (1.0 - n) + offset)
}
