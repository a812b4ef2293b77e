//! Neighborhood filters over 2D grids: grayscale morphology with flat
//! structuring elements and an edge-preserving bilateral filter.
//!
//! Windows are clipped at the image border; out-of-bounds cells never
//! contribute to a result.
use ndarray::{Array2, Zip};

/// Flat structuring element given as offsets `(drow, dcol)` around the origin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Footprint {
    offsets: Vec<(isize, isize)>,
}

impl Footprint {
    /// `width x width` square. Even widths extend one cell further up/left.
    pub fn square(width: usize) -> Self {
        let width = width.max(1) as isize;
        let lo = -(width / 2);
        let hi = lo + width - 1;
        let offsets = (lo..=hi)
            .flat_map(|dr| (lo..=hi).map(move |dc| (dr, dc)))
            .collect();
        Self { offsets }
    }

    /// Disk of the given radius: all offsets with `dr^2 + dc^2 <= radius^2`.
    pub fn disk(radius: usize) -> Self {
        let r = radius as isize;
        let offsets = (-r..=r)
            .flat_map(|dr| (-r..=r).map(move |dc| (dr, dc)))
            .filter(|&(dr, dc)| dr * dr + dc * dc <= r * r)
            .collect();
        Self { offsets }
    }

    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    fn reflected(&self) -> Self {
        Self {
            offsets: self.offsets.iter().map(|&(dr, dc)| (-dr, -dc)).collect(),
        }
    }
}

#[inline]
fn offset_index(r: usize, c: usize, dr: isize, dc: isize, rows: usize, cols: usize) -> Option<(usize, usize)> {
    let rr = r.checked_add_signed(dr)?;
    let cc = c.checked_add_signed(dc)?;
    (rr < rows && cc < cols).then_some((rr, cc))
}

fn rank_filter<T, F>(input: &Array2<T>, footprint: &Footprint, pick: F) -> Array2<T>
where
    T: Copy + Send + Sync,
    F: Fn(T, T) -> T + Sync,
{
    let (rows, cols) = input.dim();
    let mut out = input.clone();
    Zip::indexed(&mut out).par_for_each(|(r, c), value| {
        let mut acc = input[[r, c]];
        for &(dr, dc) in &footprint.offsets {
            if let Some(idx) = offset_index(r, c, dr, dc, rows, cols) {
                acc = pick(acc, input[idx]);
            }
        }
        *value = acc;
    });
    out
}

/// Grayscale dilation: maximum over the footprint.
pub fn grey_dilation<T>(input: &Array2<T>, footprint: &Footprint) -> Array2<T>
where
    T: Copy + PartialOrd + Send + Sync,
{
    rank_filter(input, footprint, |a, b| if b > a { b } else { a })
}

/// Grayscale erosion: minimum over the reflected footprint.
pub fn grey_erosion<T>(input: &Array2<T>, footprint: &Footprint) -> Array2<T>
where
    T: Copy + PartialOrd + Send + Sync,
{
    rank_filter(input, &footprint.reflected(), |a, b| if b < a { b } else { a })
}

/// Morphological closing: dilation followed by erosion. Fills dark gaps
/// narrower than the footprint.
pub fn grey_closing<T>(input: &Array2<T>, footprint: &Footprint) -> Array2<T>
where
    T: Copy + PartialOrd + Send + Sync,
{
    grey_erosion(&grey_dilation(input, footprint), footprint)
}

/// Bilateral filter with Gaussian spatial and range kernels.
///
/// `sigma_color` defaults to the standard deviation of `input`. The window
/// side is `max(5, 2 * ceil(3 * sigma_spatial) + 1)`. A flat input is
/// returned unchanged.
pub fn denoise_bilateral(input: &Array2<f64>, sigma_color: Option<f64>, sigma_spatial: f64) -> Array2<f64> {
    if input.is_empty() {
        return input.clone();
    }
    let sigma_color = sigma_color.unwrap_or_else(|| input.std(0.0));
    if !sigma_color.is_finite() || sigma_color <= 0.0 || sigma_spatial <= 0.0 {
        return input.clone();
    }

    let win = ((2.0 * (3.0 * sigma_spatial).ceil()) as usize + 1).max(5);
    let half = (win / 2) as isize;
    let spatial_denom = 2.0 * sigma_spatial * sigma_spatial;
    let color_denom = 2.0 * sigma_color * sigma_color;

    let mut kernel = Vec::with_capacity(win * win);
    for dr in -half..=half {
        for dc in -half..=half {
            let d2 = (dr * dr + dc * dc) as f64;
            kernel.push((dr, dc, (-d2 / spatial_denom).exp()));
        }
    }

    let (rows, cols) = input.dim();
    let mut out = Array2::<f64>::zeros((rows, cols));
    Zip::indexed(&mut out).par_for_each(|(r, c), value| {
        let center = input[[r, c]];
        let mut weighted = 0.0;
        let mut total = 0.0;
        for &(dr, dc, spatial) in &kernel {
            if let Some(idx) = offset_index(r, c, dr, dc, rows, cols) {
                let v = input[idx];
                let diff = v - center;
                let w = spatial * (-(diff * diff) / color_denom).exp();
                weighted += w * v;
                total += w;
            }
        }
        *value = if total > 0.0 { weighted / total } else { center };
    });
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn footprint_shapes() {
        assert_eq!(Footprint::square(3).len(), 9);
        assert_eq!(Footprint::square(1).len(), 1);
        assert_eq!(Footprint::disk(1).len(), 5);
        assert_eq!(Footprint::disk(6).len(), 113);
    }

    #[test]
    fn closing_fills_single_pixel_hole() {
        let mut grid = Array2::from_elem((5, 5), 4u32);
        grid[[2, 2]] = 0;
        let closed = grey_closing(&grid, &Footprint::square(3));
        assert!(closed.iter().all(|&v| v == 4));
    }

    #[test]
    fn closing_keeps_a_step_edge() {
        let grid = Array2::from_shape_fn((6, 6), |(r, _)| if r < 3 { 1.0 } else { 5.0 });
        let closed = grey_closing(&grid, &Footprint::disk(2));
        assert_eq!(closed, grid);
    }

    #[test]
    fn dilation_and_erosion_bracket_input() {
        let grid = array![[0.0, 1.0, 0.0], [2.0, 0.5, 3.0], [0.0, 0.0, 1.0]];
        let fp = Footprint::square(3);
        let dil = grey_dilation(&grid, &fp);
        let ero = grey_erosion(&grid, &fp);
        Zip::from(&grid).and(&dil).and(&ero).for_each(|&g, &d, &e| {
            assert!(e <= g && g <= d);
        });
        assert_eq!(dil[[1, 1]], 3.0);
        assert_eq!(ero[[1, 1]], 0.0);
    }

    #[test]
    fn bilateral_leaves_flat_input_untouched() {
        let flat = Array2::from_elem((4, 4), 0.3);
        assert_eq!(denoise_bilateral(&flat, None, 1.0), flat);
    }

    #[test]
    fn bilateral_preserves_strong_edges() {
        let grid = Array2::from_shape_fn((8, 8), |(_, c)| if c < 4 { 0.0 } else { 1.0 });
        let out = denoise_bilateral(&grid, Some(0.05), 1.0);
        assert_relative_eq!(out[[4, 0]], 0.0, epsilon = 1e-9);
        assert_relative_eq!(out[[4, 7]], 1.0, epsilon = 1e-9);
    }

    #[test]
    fn bilateral_smooths_small_noise() {
        let grid = Array2::from_shape_fn((9, 9), |(r, c)| if (r + c) % 2 == 0 { 0.51 } else { 0.49 });
        let out = denoise_bilateral(&grid, None, 1.0);
        assert!((out[[4, 4]] - 0.5).abs() < 0.01);
    }
}
