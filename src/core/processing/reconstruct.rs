//! Inversion of the image formation model and global color correction.
use ndarray::{Array2, Array3, Axis, Zip, s};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Per-channel gains applied by [`wbalance_no_red_10p`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WhiteBalanceGains {
    pub red: f64,
    pub green: f64,
    pub blue: f64,
}

impl Default for WhiteBalanceGains {
    fn default() -> Self {
        Self {
            red: 1.0,
            green: 1.0,
            blue: 1.0,
        }
    }
}

fn top_decile_mean(values: &mut [f64]) -> f64 {
    let n = values.len();
    let mut k = (0.1 * n as f64).round() as usize;
    if k == 0 {
        k = n;
    }
    if k == 0 {
        return f64::NAN;
    }
    let split = n - k;
    if split > 0 {
        values.select_nth_unstable_by(split, |a, b| a.total_cmp(b));
    }
    values[split..].iter().sum::<f64>() / k as f64
}

/// Gray-world white balance driven by the brightest 10% of green and blue.
///
/// Green and blue gains are the reciprocals of their top-decile means,
/// normalized to sum to 2; red gets their average. Returns the applied gains
/// (unit gains when a channel mean is not positive).
pub fn wbalance_no_red_10p(image: &mut Array3<f64>) -> WhiteBalanceGains {
    let mut green: Vec<f64> = image.index_axis(Axis(2), 1).iter().copied().collect();
    let mut blue: Vec<f64> = image.index_axis(Axis(2), 2).iter().copied().collect();
    let dg = 1.0 / top_decile_mean(&mut green);
    let db = 1.0 / top_decile_mean(&mut blue);

    let sum = dg + db;
    if !(dg.is_finite() && db.is_finite() && dg > 0.0 && db > 0.0 && sum.is_finite()) {
        debug!("White balance skipped: top-decile means are not positive");
        return WhiteBalanceGains::default();
    }

    let gains = WhiteBalanceGains {
        red: 1.0,
        green: dg / sum * 2.0,
        blue: db / sum * 2.0,
    };
    let gains = WhiteBalanceGains {
        red: (gains.green + gains.blue) / 2.0,
        ..gains
    };

    for (ch, gain) in [gains.red, gains.green, gains.blue].into_iter().enumerate() {
        image.index_axis_mut(Axis(2), ch).mapv_inplace(|v| v * gain);
    }
    debug!(
        "White balance gains: R={:.4} G={:.4} B={:.4}",
        gains.red, gains.green, gains.blue
    );
    gains
}

/// Global min-max rescale of all channels to [0, 1]. A constant image
/// becomes all zeros.
pub fn scale(image: &mut Array3<f64>) {
    let (min, max) = image
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    let span = max - min;
    if !(span > 0.0 && span.is_finite()) {
        image.fill(0.0);
        return;
    }
    image.mapv_inplace(|v| (v - min) / span);
}

/// Recover the unattenuated scene radiance `J = (I - B) * exp(beta * z)`.
///
/// Values are clamped to [0, 1] (NaN to 0), background pixels are excluded
/// from white balancing and scaling, and finally receive their input values
/// unchanged.
pub fn recover_image(
    image: &Array3<f64>,
    depths: &Array2<f64>,
    backscatter: &Array3<f64>,
    beta_d: &Array3<f64>,
    nmap: &Array2<u32>,
) -> Array3<f64> {
    let mut out = Array3::<f64>::zeros(image.dim());
    Zip::indexed(&mut out)
        .and(image)
        .and(backscatter)
        .and(beta_d)
        .par_for_each(|(r, c, _), o, &i, &b, &beta| {
            let j = (i - b) * (beta * depths[[r, c]]).exp();
            *o = if j.is_nan() { 0.0 } else { j.clamp(0.0, 1.0) };
        });

    for ((r, c), &label) in nmap.indexed_iter() {
        if label == 0 {
            out.slice_mut(s![r, c, ..]).fill(0.0);
        }
    }

    wbalance_no_red_10p(&mut out);
    scale(&mut out);

    for ((r, c), &label) in nmap.indexed_iter() {
        if label == 0 {
            out.slice_mut(s![r, c, ..]).assign(&image.slice(s![r, c, ..]));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn scale_spans_unit_interval() {
        let mut img = Array3::from_shape_fn((2, 2, 3), |(r, c, ch)| (r * 6 + c * 3 + ch) as f64 * 0.1 + 0.2);
        scale(&mut img);
        let min = img.iter().cloned().fold(f64::INFINITY, f64::min);
        let max = img.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        assert_relative_eq!(min, 0.0);
        assert_relative_eq!(max, 1.0);
    }

    #[test]
    fn scale_of_constant_image_is_zero() {
        let mut img = Array3::from_elem((3, 3, 3), 0.4);
        scale(&mut img);
        assert!(img.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn white_balance_gains_sum_to_two() {
        let mut img = Array3::from_shape_fn((10, 10, 3), |(r, c, ch)| {
            let base = (r * 10 + c) as f64 / 100.0;
            base * [1.0, 0.8, 0.4][ch]
        });
        let gains = wbalance_no_red_10p(&mut img);
        assert_relative_eq!(gains.green + gains.blue, 2.0, epsilon = 1e-12);
        assert_relative_eq!(gains.red, 1.0, epsilon = 1e-12);
        assert!(gains.blue > gains.green);
    }

    #[test]
    fn white_balance_is_stable_on_balanced_image() {
        let mut img = Array3::from_shape_fn((10, 10, 3), |(r, c, _)| (r * 10 + c) as f64 / 100.0);
        let first = wbalance_no_red_10p(&mut img);
        let second = wbalance_no_red_10p(&mut img);
        for g in [first, second] {
            assert_relative_eq!(g.green, 1.0, epsilon = 1e-12);
            assert_relative_eq!(g.blue, 1.0, epsilon = 1e-12);
            assert_relative_eq!(g.red, 1.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn white_balance_on_black_image_is_identity() {
        let mut img = Array3::zeros((4, 4, 3));
        assert_eq!(wbalance_no_red_10p(&mut img), WhiteBalanceGains::default());
        assert!(img.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn top_decile_of_tiny_input_uses_everything() {
        let mut v = vec![0.2, 0.4, 0.6];
        assert_relative_eq!(top_decile_mean(&mut v), 0.4);
        let mut v: Vec<f64> = (1..=20).map(|i| i as f64).collect();
        assert_relative_eq!(top_decile_mean(&mut v), 19.5);
    }

    #[test]
    fn background_pixels_pass_through_unchanged() {
        let image = Array3::from_shape_fn((4, 4, 3), |(r, c, ch)| 0.1 + 0.05 * (r + c + ch) as f64);
        let depths = Array2::from_elem((4, 4), 2.0);
        let backscatter = Array3::from_elem((4, 4, 3), 0.05);
        let beta = Array3::from_elem((4, 4, 3), 0.2);
        let nmap = Array2::from_shape_fn((4, 4), |(r, _)| if r == 0 { 0u32 } else { 1 });
        let out = recover_image(&image, &depths, &backscatter, &beta, &nmap);
        for c in 0..4 {
            for ch in 0..3 {
                assert_eq!(out[[0, c, ch]], image[[0, c, ch]]);
            }
        }
        assert!(out.iter().all(|&v| (0.0..=1.0).contains(&v)));
    }

    #[test]
    fn recovery_is_idempotent_on_background() {
        let image = Array3::from_shape_fn((3, 3, 3), |(r, c, ch)| 0.2 + 0.1 * ((r + 2 * c + ch) % 5) as f64);
        let depths = Array2::from_elem((3, 3), 1.0);
        let zeros = Array3::zeros((3, 3, 3));
        let nmap = Array2::zeros((3, 3));
        let once = recover_image(&image, &depths, &zeros, &zeros, &nmap);
        let twice = recover_image(&once, &depths, &zeros, &zeros, &nmap);
        assert_eq!(once, image);
        assert_eq!(twice, image);
    }

    #[test]
    fn non_finite_values_are_clamped() {
        let image = Array3::from_elem((2, 2, 3), 0.5);
        let depths = Array2::from_elem((2, 2), 1.0);
        let mut backscatter = Array3::from_elem((2, 2, 3), 0.1);
        backscatter[[0, 0, 0]] = f64::NAN;
        let beta = Array3::from_elem((2, 2, 3), 1e6);
        let nmap = Array2::from_elem((2, 2), 1u32);
        let out = recover_image(&image, &depths, &backscatter, &beta, &nmap);
        assert!(out.iter().all(|v| v.is_finite() && (0.0..=1.0).contains(v)));
    }
}
