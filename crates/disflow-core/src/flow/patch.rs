//! Patch comparison kernels.
//!
//! Every kernel walks the same per-pixel residual
//!
//! ```text
//! diff = w00*I1[r][c] + w01*I1[r][c+1] + w10*I1[r+1][c] + w11*I1[r+1][c+1] - I0[r][c]
//! ```
//!
//! over a square patch and feeds it to an accumulation policy. The four
//! policies cover plain and mean-normalised SSD, with and without the
//! gradient-weighted residual sums used by the inverse search step. A patch
//! of [`FAST_PATCH_SIZE`] is walked with a compile-time constant bound; the
//! arithmetic is the same, so both paths return identical values.

use ndarray::ArrayView2;

use crate::consts::FAST_PATCH_SIZE;

/// Bilinear weights of the four integer neighbours of a sample.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BilinearWeights {
    pub w00: f32,
    pub w01: f32,
    pub w10: f32,
    pub w11: f32,
}

impl BilinearWeights {
    /// Weights for a fractional row offset `di` and column offset `dj`.
    pub fn new(di: f32, dj: f32) -> Self {
        Self {
            w00: (1.0 - di) * (1.0 - dj),
            w01: (1.0 - di) * dj,
            w10: di * (1.0 - dj),
            w11: di * dj,
        }
    }
}

/// A frame-0 patch and the frame-1 window it is compared against.
///
/// `i0` is `size x size`; `i1` is `(size + 1) x (size + 1)` so every
/// bilinear sample has its lower-right neighbour available.
#[derive(Clone, Copy, Debug)]
pub struct PatchPair<'a> {
    pub i0: ArrayView2<'a, u8>,
    pub i1: ArrayView2<'a, u8>,
    pub weights: BilinearWeights,
}

impl<'a> PatchPair<'a> {
    pub fn new(i0: ArrayView2<'a, u8>, i1: ArrayView2<'a, u8>, weights: BilinearWeights) -> Self {
        debug_assert_eq!(i0.nrows(), i0.ncols());
        debug_assert_eq!(i1.dim(), (i0.nrows() + 1, i0.ncols() + 1));
        Self { i0, i1, weights }
    }

    pub fn size(&self) -> usize {
        self.i0.nrows()
    }
}

/// Frame-0 gradients over the patch of a [`PatchPair`].
#[derive(Clone, Copy, Debug)]
pub struct PatchGradients<'a> {
    pub gx: ArrayView2<'a, i16>,
    pub gy: ArrayView2<'a, i16>,
}

/// Result of one evaluation inside the descent loop.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PatchStep {
    /// Plain or mean-normalised SSD at the evaluated displacement.
    pub ssd: f32,
    /// Gradient-weighted residual sum along x.
    pub dux: f32,
    /// Gradient-weighted residual sum along y.
    pub duy: f32,
}

/// Accumulation policy fed one residual per patch pixel.
trait Accumulator {
    /// Policies that set this receive the frame-0 gradient at each pixel.
    const USES_GRADIENT: bool;

    fn add(&mut self, diff: f32, gx: f32, gy: f32);
}

#[derive(Default)]
struct Ssd {
    sum_sq: f32,
}

impl Accumulator for Ssd {
    const USES_GRADIENT: bool = false;

    #[inline(always)]
    fn add(&mut self, diff: f32, _gx: f32, _gy: f32) {
        self.sum_sq += diff * diff;
    }
}

#[derive(Default)]
struct MeanNormSsd {
    sum: f32,
    sum_sq: f32,
}

impl Accumulator for MeanNormSsd {
    const USES_GRADIENT: bool = false;

    #[inline(always)]
    fn add(&mut self, diff: f32, _gx: f32, _gy: f32) {
        self.sum += diff;
        self.sum_sq += diff * diff;
    }
}

#[derive(Default)]
struct SsdGradient {
    sum: f32,
    sum_sq: f32,
    dux: f32,
    duy: f32,
}

impl Accumulator for SsdGradient {
    const USES_GRADIENT: bool = true;

    #[inline(always)]
    fn add(&mut self, diff: f32, gx: f32, gy: f32) {
        self.sum += diff;
        self.sum_sq += diff * diff;
        self.dux += diff * gx;
        self.duy += diff * gy;
    }
}

#[inline(always)]
fn walk<A: Accumulator>(pair: &PatchPair<'_>, grads: Option<&PatchGradients<'_>>, size: usize, acc: &mut A) {
    let w = pair.weights;
    let (i0, i1) = (&pair.i0, &pair.i1);
    for r in 0..size {
        for c in 0..size {
            let diff = w.w00 * i1[[r, c]] as f32
                + w.w01 * i1[[r, c + 1]] as f32
                + w.w10 * i1[[r + 1, c]] as f32
                + w.w11 * i1[[r + 1, c + 1]] as f32
                - i0[[r, c]] as f32;
            let (gx, gy) = match grads {
                Some(g) if A::USES_GRADIENT => (g.gx[[r, c]] as f32, g.gy[[r, c]] as f32),
                _ => (0.0, 0.0),
            };
            acc.add(diff, gx, gy);
        }
    }
}

fn accumulate<A: Accumulator>(pair: &PatchPair<'_>, grads: Option<&PatchGradients<'_>>, acc: &mut A) {
    let size = pair.size();
    if size == FAST_PATCH_SIZE {
        walk(pair, grads, FAST_PATCH_SIZE, acc);
    } else {
        walk(pair, grads, size, acc);
    }
}

/// Sum of squared residuals.
pub fn compute_ssd(pair: &PatchPair<'_>) -> f32 {
    let mut acc = Ssd::default();
    accumulate(pair, None, &mut acc);
    acc.sum_sq
}

/// Sum of squared residuals after removing the mean residual:
/// `sum(diff^2) - sum(diff)^2 / n`.
pub fn compute_ssd_mean_norm(pair: &PatchPair<'_>) -> f32 {
    let mut acc = MeanNormSsd::default();
    accumulate(pair, None, &mut acc);
    let n = (pair.size() * pair.size()) as f32;
    acc.sum_sq - acc.sum * acc.sum / n
}

/// Plain SSD plus `sum(diff * Ix)` and `sum(diff * Iy)`.
pub fn process_patch(pair: &PatchPair<'_>, grads: &PatchGradients<'_>) -> PatchStep {
    let mut acc = SsdGradient::default();
    accumulate(pair, Some(grads), &mut acc);
    PatchStep {
        ssd: acc.sum_sq,
        dux: acc.dux,
        duy: acc.duy,
    }
}

/// Mean-normalised SSD and gradient sums.
///
/// `x_grad_sum` and `y_grad_sum` are the patch's plain gradient sums from
/// the structure tensor. Each gradient-weighted sum is corrected by
/// `sum(diff) * grad_sum / n`, which is the same as weighting the
/// mean-free residual.
pub fn process_patch_mean_norm(
    pair: &PatchPair<'_>,
    grads: &PatchGradients<'_>,
    x_grad_sum: f32,
    y_grad_sum: f32,
) -> PatchStep {
    let mut acc = SsdGradient::default();
    accumulate(pair, Some(grads), &mut acc);
    let n = (pair.size() * pair.size()) as f32;
    PatchStep {
        ssd: acc.sum_sq - acc.sum * acc.sum / n,
        dux: acc.dux - acc.sum * x_grad_sum / n,
        duy: acc.duy - acc.sum * y_grad_sum / n,
    }
}
