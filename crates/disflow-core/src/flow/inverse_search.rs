//! Patch inverse search: one displacement per grid cell.
//!
//! Each patch starts from the dense flow of the coarser scale (sampled at the
//! patch centre), optionally replaced by a cheaper candidate from the
//! initial flow or an already solved neighbour, and is then refined by
//! inverse-compositional Gauss-Newton steps against the border-extended
//! frame 1.
//!
//! Grid rows are split into horizontal stripes processed in parallel. With
//! spatial propagation the stripe count is fixed and each stripe runs a
//! forward pass followed by a backward pass, so neighbour candidates only
//! ever come from inside the stripe and results do not depend on the
//! number of threads.

use ndarray::{s, Array2};
use rayon::prelude::*;

use crate::consts::{EPS, INF, PROPAGATION_STRIPES};

use super::grid::{GridBuffer, PatchGrid};
use super::patch::{
    compute_ssd, compute_ssd_mean_norm, process_patch, process_patch_mean_norm, BilinearWeights,
    PatchGradients, PatchPair,
};
use super::structure_tensor::StructureTensor;

/// Search knobs derived from the configuration and the scale plan.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SearchParams {
    pub border_size: usize,
    pub grad_descent_iterations: usize,
    pub use_mean_normalization: bool,
    pub use_spatial_propagation: bool,
}

/// Per-level data read by the search.
#[derive(Clone, Copy)]
pub struct SearchInputs<'a> {
    pub grid: PatchGrid,
    pub i0: &'a Array2<u8>,
    pub i1_ext: &'a Array2<u8>,
    pub i0x: &'a Array2<i16>,
    pub i0y: &'a Array2<i16>,
    /// Dense flow carried over from the coarser scale.
    pub ux: &'a Array2<f32>,
    pub uy: &'a Array2<f32>,
    /// Initial flow at this level, when one was supplied.
    pub seed: Option<(&'a Array2<f32>, &'a Array2<f32>)>,
    pub tensor: &'a StructureTensor,
}

struct Searcher<'a> {
    inputs: SearchInputs<'a>,
    params: SearchParams,
    i_lower: f32,
    i_upper: f32,
    j_lower: f32,
    j_upper: f32,
}

impl<'a> Searcher<'a> {
    fn new(inputs: SearchInputs<'a>, params: SearchParams) -> Self {
        let g = &inputs.grid;
        let bsz = params.border_size as f32;
        let psz = g.patch_size as f32;
        Self {
            inputs,
            params,
            i_lower: bsz - psz + 1.0,
            i_upper: bsz + g.height as f32 - 1.0,
            j_lower: bsz - psz + 1.0,
            j_upper: bsz + g.width as f32 - 1.0,
        }
    }

    /// Frame-0 patch at `(i, j)` paired with the frame-1 window displaced
    /// by `(ux, uy)`. The sample position is clamped into the extension.
    fn pair(&self, i: usize, j: usize, ux: f32, uy: f32) -> PatchPair<'a> {
        let psz = self.inputs.grid.patch_size;
        let bsz = self.params.border_size as f32;
        let i_i1 = (i as f32 + uy + bsz).max(self.i_lower).min(self.i_upper);
        let j_i1 = (j as f32 + ux + bsz).max(self.j_lower).min(self.j_upper);
        let (r, c) = (i_i1.floor(), j_i1.floor());
        let weights = BilinearWeights::new(i_i1 - r, j_i1 - c);
        let (r, c) = (r as usize, c as usize);

        PatchPair::new(
            self.inputs.i0.slice(s![i..i + psz, j..j + psz]),
            self.inputs.i1_ext.slice(s![r..r + psz + 1, c..c + psz + 1]),
            weights,
        )
    }

    fn gradients(&self, i: usize, j: usize) -> PatchGradients<'a> {
        let psz = self.inputs.grid.patch_size;
        PatchGradients {
            gx: self.inputs.i0x.slice(s![i..i + psz, j..j + psz]),
            gy: self.inputs.i0y.slice(s![i..i + psz, j..j + psz]),
        }
    }

    fn ssd(&self, i: usize, j: usize, ux: f32, uy: f32) -> f32 {
        let pair = self.pair(i, j, ux, uy);
        if self.params.use_mean_normalization {
            compute_ssd_mean_norm(&pair)
        } else {
            compute_ssd(&pair)
        }
    }

    /// Gauss-Newton refinement of one patch starting at `(ux, uy)`.
    ///
    /// The refined value is returned only if it stayed within one patch
    /// size of the start; otherwise the start is kept.
    fn descend(&self, is: usize, js: usize, inner_iterations: usize, ux: f32, uy: f32) -> (f32, f32) {
        let grid = &self.inputs.grid;
        let tensor = self.inputs.tensor;
        let (i, j) = grid.anchor(is, js);

        let xx = tensor.xx[[is, js]];
        let yy = tensor.yy[[is, js]];
        let xy = tensor.xy[[is, js]];
        let mut det = xx * yy - xy * xy;
        if det.abs() < EPS {
            det = EPS;
        }
        let inv11 = yy / det;
        let inv12 = -xy / det;
        let inv22 = xx / det;
        let (x_sum, y_sum) = (tensor.x[[is, js]], tensor.y[[is, js]]);

        let grads = self.gradients(i, j);
        let (mut cur_x, mut cur_y) = (ux, uy);
        let mut prev_ssd = INF;
        for _ in 0..inner_iterations {
            let pair = self.pair(i, j, cur_x, cur_y);
            let step = if self.params.use_mean_normalization {
                process_patch_mean_norm(&pair, &grads, x_sum, y_sum)
            } else {
                process_patch(&pair, &grads)
            };
            let dx = inv11 * step.dux + inv12 * step.duy;
            let dy = inv12 * step.dux + inv22 * step.duy;
            cur_x -= dx;
            cur_y -= dy;

            if step.ssd >= prev_ssd {
                break;
            }
            prev_ssd = step.ssd;
        }

        let moved = (cur_x - ux).hypot(cur_y - uy);
        if moved <= grid.patch_size as f32 {
            (cur_x, cur_y)
        } else {
            (ux, uy)
        }
    }

    /// Solve grid rows `first_row..first_row + rows`; `sx`/`sy` hold exactly
    /// those rows.
    fn search_stripe(&self, first_row: usize, sx: &mut [f32], sy: &mut [f32]) {
        let grid = &self.inputs.grid;
        let ws = grid.cols;
        let rows = sx.len() / ws;
        let half = grid.patch_size / 2;
        let propagation = self.params.use_spatial_propagation;
        let passes = if propagation { 2 } else { 1 };
        let inner_iterations = self.params.grad_descent_iterations / passes;
        let try_candidates = propagation || self.inputs.seed.is_some();

        for pass in 0..passes {
            let forward = pass % 2 == 0;
            for k in 0..rows {
                let local = if forward { k } else { rows - 1 - k };
                let is = first_row + local;
                for m in 0..ws {
                    let js = if forward { m } else { ws - 1 - m };
                    let (i, j) = grid.anchor(is, js);
                    let idx = local * ws + js;

                    if pass == 0 {
                        sx[idx] = self.inputs.ux[[i + half, j + half]];
                        sy[idx] = self.inputs.uy[[i + half, j + half]];
                    }

                    if try_candidates {
                        let mut min_ssd = self.ssd(i, j, sx[idx], sy[idx]);

                        if let Some((seed_x, seed_y)) = self.inputs.seed {
                            let (cx, cy) = (seed_x[[i + half, j + half]], seed_y[[i + half, j + half]]);
                            let cand = self.ssd(i, j, cx, cy);
                            if cand < min_ssd {
                                min_ssd = cand;
                                sx[idx] = cx;
                                sy[idx] = cy;
                            }
                        }

                        if propagation {
                            let mut neighbours = [None, None];
                            if m > 0 {
                                neighbours[0] = Some(if forward { idx - 1 } else { idx + 1 });
                            }
                            if k > 0 {
                                neighbours[1] = Some(if forward { idx - ws } else { idx + ws });
                            }
                            for n in neighbours.into_iter().flatten() {
                                let (cx, cy) = (sx[n], sy[n]);
                                let cand = self.ssd(i, j, cx, cy);
                                if cand < min_ssd {
                                    min_ssd = cand;
                                    sx[idx] = cx;
                                    sy[idx] = cy;
                                }
                            }
                        }
                    }

                    let (nx, ny) = self.descend(is, js, inner_iterations, sx[idx], sy[idx]);
                    sx[idx] = nx;
                    sy[idx] = ny;
                }
            }
        }
    }
}

/// Estimate one displacement per grid cell into `sx`/`sy`.
///
/// The output buffers are reset to the grid shape; the tensor must already
/// hold this grid's sums.
pub fn patch_inverse_search(
    inputs: SearchInputs<'_>,
    params: SearchParams,
    sx: &mut GridBuffer,
    sy: &mut GridBuffer,
) {
    let grid = inputs.grid;
    sx.reset(grid.rows, grid.cols);
    sy.reset(grid.rows, grid.cols);
    if grid.is_empty() {
        return;
    }

    let stripes = if params.use_spatial_propagation {
        PROPAGATION_STRIPES
    } else {
        rayon::current_num_threads().max(1)
    };
    let stripe_rows = grid.rows.div_ceil(stripes).max(1);
    let chunk = stripe_rows * grid.cols;
    let searcher = Searcher::new(inputs, params);

    sx.as_mut_slice()
        .par_chunks_mut(chunk)
        .zip(sy.as_mut_slice().par_chunks_mut(chunk))
        .enumerate()
        .for_each(|(k, (sx_stripe, sy_stripe))| {
            searcher.search_stripe(k * stripe_rows, sx_stripe, sy_stripe);
        });
}
