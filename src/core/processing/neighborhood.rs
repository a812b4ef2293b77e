//! Depth-coherent segmentation of the image into neighborhoods.
//!
//! Label 0 marks background (never restored); labels `1..=n` partition the
//! remaining pixels into 4-connected regions. All traversals use explicit
//! stacks/queues over the label grid, so stack depth stays bounded on large
//! images.
use std::collections::VecDeque;

use ndarray::Array2;
use tracing::{debug, warn};

use crate::core::processing::depth::depth_range;
use crate::core::processing::filters::{Footprint, grey_closing};

#[inline]
fn neighbors4(r: usize, c: usize, rows: usize, cols: usize) -> impl Iterator<Item = (usize, usize)> {
    let down = (r + 1 < rows).then_some((r + 1, c));
    let up = r.checked_sub(1).map(|r| (r, c));
    let right = (c + 1 < cols).then_some((r, c + 1));
    let left = c.checked_sub(1).map(|c| (r, c));
    [down, up, right, left].into_iter().flatten()
}

/// Partition the image into 4-connected regions of similar depth.
///
/// Seeds are taken in raster order. A region admits neighbors whose depth is
/// within `epsilon * depth range` of the seed's depth. Afterwards the label
/// covering the most zero-depth pixels is reset to 0 (background).
/// Returns the map and the number of non-background labels in it; labels are
/// not compacted, use [`refine_neighborhood_map`] for a dense `1..=n` range.
pub fn construct_neighborhood_map(depths: &Array2<f64>, epsilon: f64) -> (Array2<u32>, usize) {
    let (rows, cols) = depths.dim();
    let (z_min, z_max) = depth_range(depths);
    let eps = (z_max - z_min) * epsilon;

    let mut nmap = Array2::<u32>::zeros((rows, cols));
    let mut queued_by = Array2::<u32>::zeros((rows, cols));
    let mut stack: Vec<(usize, usize)> = Vec::new();
    let mut next_label: u32 = 1;

    for seed_r in 0..rows {
        for seed_c in 0..cols {
            if nmap[[seed_r, seed_c]] != 0 {
                continue;
            }
            let label = next_label;
            next_label += 1;
            let seed_depth = depths[[seed_r, seed_c]];

            stack.push((seed_r, seed_c));
            queued_by[[seed_r, seed_c]] = label;
            while let Some((r, c)) = stack.pop() {
                if (depths[[r, c]] - seed_depth).abs() > eps {
                    continue;
                }
                nmap[[r, c]] = label;
                for (nr, nc) in neighbors4(r, c, rows, cols) {
                    if nmap[[nr, nc]] == 0 && queued_by[[nr, nc]] != label {
                        queued_by[[nr, nc]] = label;
                        stack.push((nr, nc));
                    }
                }
            }
        }
    }

    let created = (next_label - 1) as usize;
    let mut zero_counts = vec![0usize; created + 1];
    for (&label, &z) in nmap.iter().zip(depths.iter()) {
        if z == 0.0 {
            zero_counts[label as usize] += 1;
        }
    }
    let mut background: Option<(u32, usize)> = None;
    for (label, &count) in zero_counts.iter().enumerate().skip(1) {
        if count > 0 && background.is_none_or(|(_, best)| count > best) {
            background = Some((label as u32, count));
        }
    }

    let mut count = created;
    if let Some((label, zeros)) = background {
        nmap.mapv_inplace(|l| if l == label { 0 } else { l });
        count -= 1;
        debug!("Neighborhood {} ({} zero-depth pixels) marked as background", label, zeros);
    }
    debug!("Constructed {} neighborhoods (eps={:.4})", count, eps);

    (nmap, count)
}

/// Breadth-first nearest-label search with a reusable visited buffer.
struct LabelSearch {
    stamps: Array2<u32>,
    generation: u32,
    queue: VecDeque<(usize, usize)>,
}

impl LabelSearch {
    fn new(dim: (usize, usize)) -> Self {
        Self {
            stamps: Array2::zeros(dim),
            generation: 0,
            queue: VecDeque::new(),
        }
    }

    fn closest(&mut self, nmap: &Array2<u32>, row: usize, col: usize) -> Option<u32> {
        self.generation = self.generation.wrapping_add(1);
        if self.generation == 0 {
            self.stamps.fill(0);
            self.generation = 1;
        }
        let (rows, cols) = nmap.dim();
        self.queue.clear();
        self.queue.push_back((row, col));
        self.stamps[[row, col]] = self.generation;

        while let Some((r, c)) = self.queue.pop_front() {
            let label = nmap[[r, c]];
            if label != 0 {
                return Some(label);
            }
            for (nr, nc) in neighbors4(r, c, rows, cols) {
                if self.stamps[[nr, nc]] != self.generation {
                    self.stamps[[nr, nc]] = self.generation;
                    self.queue.push_back((nr, nc));
                }
            }
        }
        None
    }
}

/// Nearest nonzero label to `(row, col)` by 4-connected breadth-first search.
/// `None` when the map holds no labels at all.
pub fn find_closest_label(nmap: &Array2<u32>, row: usize, col: usize) -> Option<u32> {
    LabelSearch::new(nmap.dim()).closest(nmap, row, col)
}

/// Relabel by descending size keeping labels with at least `min_size`
/// members, then snap members of the dropped labels to their closest
/// surviving label. Background (0) is left as is.
fn prune_and_snap(nmap: &Array2<u32>, min_size: usize) -> (Array2<u32>, usize) {
    let max_label = nmap.iter().copied().max().unwrap_or(0) as usize;
    let mut sizes = vec![0usize; max_label + 1];
    for &l in nmap.iter() {
        sizes[l as usize] += 1;
    }

    let mut order: Vec<usize> = (1..=max_label).filter(|&l| sizes[l] > 0).collect();
    order.sort_by(|&a, &b| sizes[b].cmp(&sizes[a]).then(a.cmp(&b)));

    let mut remap = vec![0u32; max_label + 1];
    let mut kept = 0u32;
    for &l in &order {
        if sizes[l] >= min_size {
            kept += 1;
            remap[l] = kept;
        }
    }
    let mut refined = nmap.mapv(|l| remap[l as usize]);

    let dropped: Vec<usize> = order.iter().copied().filter(|&l| sizes[l] < min_size).collect();
    if dropped.is_empty() {
        return (refined, kept as usize);
    }
    if kept == 0 {
        warn!(
            "No neighborhood reaches the minimum size of {}; every pixel is treated as background",
            min_size
        );
        return (refined, 0);
    }

    let mut members: Vec<Vec<(usize, usize)>> = vec![Vec::new(); max_label + 1];
    for ((r, c), &l) in nmap.indexed_iter() {
        if l != 0 && remap[l as usize] == 0 {
            members[l as usize].push((r, c));
        }
    }

    let mut search = LabelSearch::new(nmap.dim());
    for l in dropped {
        for &(r, c) in &members[l] {
            if let Some(found) = search.closest(&refined, r, c) {
                refined[[r, c]] = found;
            }
        }
    }

    (refined, kept as usize)
}

/// Coarsen a raw neighborhood map.
///
/// Labels are renumbered `1..=n` by descending size, regions smaller than
/// `min_size` are absorbed by the closest surviving region, and the grid is
/// closed with a `radius x radius` square. Pruning runs again after closing
/// so every returned label has at least `min_size` members.
pub fn refine_neighborhood_map(nmap: &Array2<u32>, min_size: usize, radius: usize) -> (Array2<u32>, usize) {
    let (pruned, _) = prune_and_snap(nmap, min_size);
    let closed = grey_closing(&pruned, &Footprint::square(radius));
    let (refined, count) = prune_and_snap(&closed, min_size);
    debug!("Refined neighborhood map: {} neighborhoods (min size {})", count, min_size);
    (refined, count)
}
