//! Local illumination estimation by damped neighborhood averaging.
use ndarray::{Array2, ArrayView2, Zip};
use tracing::debug;

use crate::core::processing::filters::denoise_bilateral;

/// Estimate the illuminant map of one channel.
///
/// Starting from zero, every pixel's running average is repeatedly replaced
/// by `p * D + (1 - p) * avg'`, where `D = channel - backscatter` and `avg'` is
/// the mean of the other members of the pixel's neighborhood. Iteration ends
/// when no pixel moves by `tol` or more, or after `max_iters` rounds. The
/// result is `f * bilateral(max(0, average))`.
///
/// Background pixels (label 0) and labels above `num_neighborhoods` have no
/// peers, so their average is `p * D`. A neighborhood with a single member
/// has no peers either; that pixel is held at `D`.
#[allow(clippy::too_many_arguments)]
pub fn estimate_illumination(
    channel: ArrayView2<f64>,
    backscatter: &Array2<f64>,
    nmap: &Array2<u32>,
    num_neighborhoods: usize,
    p: f64,
    f: f64,
    max_iters: usize,
    tol: f64,
) -> Array2<f64> {
    let direct = &channel - backscatter;

    let mut sizes = vec![0usize; num_neighborhoods + 1];
    for &label in nmap.iter() {
        let label = label as usize;
        if label >= 1 && label <= num_neighborhoods {
            sizes[label] += 1;
        }
    }
    let peer_count = |label: u32| -> Option<usize> {
        let label = label as usize;
        (label >= 1 && label <= num_neighborhoods).then(|| sizes[label])
    };

    let mut avg = Array2::<f64>::zeros(direct.dim());
    let mut next = Array2::<f64>::zeros(direct.dim());
    let mut sums = vec![0.0f64; num_neighborhoods + 1];
    let mut iterations = 0;

    for _ in 0..max_iters {
        iterations += 1;
        sums.iter_mut().for_each(|s| *s = 0.0);
        for (&label, &a) in nmap.iter().zip(avg.iter()) {
            let label = label as usize;
            if label >= 1 && label <= num_neighborhoods {
                sums[label] += a;
            }
        }

        Zip::from(&mut next)
            .and(&avg)
            .and(&direct)
            .and(nmap)
            .par_for_each(|out, &a, &d, &label| {
                *out = match peer_count(label) {
                    Some(size) if size > 1 => {
                        let others = (sums[label as usize] - a) / (size - 1) as f64;
                        p * d + (1.0 - p) * others
                    }
                    Some(_) => d,
                    None => p * d,
                };
            });

        let max_change = Zip::from(&next)
            .and(&avg)
            .fold(0.0f64, |acc, &n, &a| acc.max((n - a).abs()));
        if max_change < tol {
            break;
        }
        std::mem::swap(&mut avg, &mut next);
    }

    debug!(
        "Illumination converged after {} of {} iterations ({} neighborhoods)",
        iterations, max_iters, num_neighborhoods
    );

    let clipped = avg.mapv(|v| v.max(0.0));
    denoise_bilateral(&clipped, None, 1.0).mapv(|v| f * v)
}
