//! Densification: sparse patch displacements to a per-pixel flow.
//!
//! Each pixel takes the weighted mean of the displacements of every patch
//! covering it. A patch's weight is `1 / max(1, |residual|)`, where the
//! residual is the bilinear frame-1 sample at the displaced position minus
//! the frame-0 pixel.

use ndarray::{Array2, ArrayViewMut2, Axis};
use rayon::prelude::*;
use tracing::error;

use crate::consts::EPS;

use super::grid::{GridBuffer, PatchGrid};

/// Grid indices whose patches cover the current pixel along one axis.
///
/// Advanced one pixel at a time; `end` is inclusive and starts below
/// `start` so the window is empty before the first anchor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct CoverageWindow {
    start: isize,
    end: isize,
}

impl CoverageWindow {
    fn new() -> Self {
        Self { start: 0, end: -1 }
    }

    /// Move to pixel `p` on an axis of length `len`.
    fn advance(&mut self, p: usize, len: usize, patch_size: usize, stride: usize) {
        if p % stride == 0 && p + patch_size <= len {
            self.end += 1;
        }
        if p >= patch_size && (p - patch_size) % stride == 0 && self.start < self.end {
            self.start += 1;
        }
    }

    fn indices(&self) -> std::ops::Range<usize> {
        if self.end < self.start {
            0..0
        } else {
            self.start as usize..self.end as usize + 1
        }
    }
}

/// Bilinear sample of an 8-bit image at a position inside `[0, h-1] x [0, w-1]`.
///
/// The lower corner is clamped to `(h-2, w-2)`: far from the origin
/// `len - 1 - EPS` rounds to `len - 1` in f32. Single-pixel axes sample
/// their only pixel.
#[inline]
fn sample(img: &Array2<u8>, i_m: f32, j_m: f32) -> f32 {
    let (h, w) = img.dim();
    let i_l = (i_m as usize).min(h.saturating_sub(2));
    let j_l = (j_m as usize).min(w.saturating_sub(2));
    let (i_u, j_u) = ((i_l + 1).min(h - 1), (j_l + 1).min(w - 1));
    let (fi, ri) = if i_u > i_l { (i_m - i_l as f32, i_u as f32 - i_m) } else { (0.0, 1.0) };
    let (fj, rj) = if j_u > j_l { (j_m - j_l as f32, j_u as f32 - j_m) } else { (0.0, 1.0) };
    fj * fi * img[[i_u, j_u]] as f32
        + rj * fi * img[[i_u, j_l]] as f32
        + fj * ri * img[[i_l, j_u]] as f32
        + rj * ri * img[[i_l, j_l]] as f32
}

#[allow(clippy::too_many_arguments)]
fn densify_stripe(
    grid: &PatchGrid,
    sx: &GridBuffer,
    sy: &GridBuffer,
    i0: &Array2<u8>,
    i1: &Array2<u8>,
    first_row: usize,
    mut ux: ArrayViewMut2<'_, f32>,
    mut uy: ArrayViewMut2<'_, f32>,
) {
    let (h, w) = (grid.height, grid.width);
    let (psz, stride) = (grid.patch_size, grid.patch_stride);
    let i_max = h as f32 - 1.0 - EPS;
    let j_max = w as f32 - 1.0 - EPS;

    let mut rows = CoverageWindow::new();
    for i in 0..first_row {
        rows.advance(i, h, psz, stride);
    }

    for local in 0..ux.nrows() {
        let i = first_row + local;
        rows.advance(i, h, psz, stride);
        let mut cols = CoverageWindow::new();

        for j in 0..w {
            cols.advance(j, w, psz, stride);
            let base = i0[[i, j]] as f32;
            let (mut sum_coef, mut sum_x, mut sum_y) = (0.0f32, 0.0f32, 0.0f32);

            for is in rows.indices() {
                for js in cols.indices() {
                    let (dx, dy) = (sx[[is, js]], sy[[is, js]]);
                    let j_m = (j as f32 + dx).max(0.0).min(j_max);
                    let i_m = (i as f32 + dy).max(0.0).min(i_max);
                    let diff = sample(i1, i_m, j_m) - base;
                    let coef = 1.0 / diff.abs().max(1.0);
                    sum_x += coef * dx;
                    sum_y += coef * dy;
                    sum_coef += coef;
                }
            }

            debug_assert!(sum_coef > 0.0, "pixel ({i}, {j}) is not covered by any patch");
            if sum_coef > 0.0 {
                ux[[local, j]] = sum_x / sum_coef;
                uy[[local, j]] = sum_y / sum_coef;
            } else {
                error!(row = i, col = j, "Pixel not covered by any patch, writing zero flow");
                ux[[local, j]] = 0.0;
                uy[[local, j]] = 0.0;
            }
        }
    }
}

/// Turn the sparse patch flow `sx`/`sy` into the dense flow `ux`/`uy`.
///
/// `ux`/`uy` must already have the level's shape. Rows are processed in
/// parallel stripes; each pixel's value depends only on its own inputs.
pub fn densify(
    grid: &PatchGrid,
    sx: &GridBuffer,
    sy: &GridBuffer,
    i0: &Array2<u8>,
    i1: &Array2<u8>,
    ux: &mut Array2<f32>,
    uy: &mut Array2<f32>,
) {
    debug_assert_eq!(ux.dim(), (grid.height, grid.width));
    debug_assert_eq!(uy.dim(), (grid.height, grid.width));
    if grid.height == 0 || grid.width == 0 {
        return;
    }

    let stripes = rayon::current_num_threads().max(1);
    let stripe_rows = grid.height.div_ceil(stripes).max(1);

    ux.axis_chunks_iter_mut(Axis(0), stripe_rows)
        .into_par_iter()
        .zip(uy.axis_chunks_iter_mut(Axis(0), stripe_rows).into_par_iter())
        .enumerate()
        .for_each(|(k, (ux_stripe, uy_stripe))| {
            densify_stripe(grid, sx, sy, i0, i1, k * stripe_rows, ux_stripe, uy_stripe);
        });
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Reference: indices of patches whose extent `[a*stride, a*stride + psz)`
    /// contains `p`, with the window clamped to the last patch at the edge.
    fn covering(p: usize, len: usize, psz: usize, stride: usize) -> Vec<usize> {
        let count = 1 + (len - psz) / stride;
        let hits: Vec<usize> = (0..count)
            .filter(|&a| a * stride <= p && p < a * stride + psz)
            .collect();
        if hits.is_empty() {
            vec![count - 1]
        } else {
            hits
        }
    }

    #[test]
    fn test_window_matches_patch_extents() {
        for &(len, psz, stride) in &[(32, 8, 4), (30, 8, 3), (17, 8, 4), (12, 12, 4), (40, 12, 5)] {
            let mut win = CoverageWindow::new();
            for p in 0..len {
                win.advance(p, len, psz, stride);
                let got: Vec<usize> = win.indices().collect();
                assert_eq!(
                    got,
                    covering(p, len, psz, stride),
                    "len={len} psz={psz} stride={stride} p={p}"
                );
            }
        }
    }

    #[test]
    fn test_window_starts_empty() {
        let win = CoverageWindow::new();
        assert_eq!(win.indices().len(), 0);
    }
}
