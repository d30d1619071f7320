//! Multiscale image pyramid for coarse-to-fine flow estimation.
//!
//! Only levels `finest_scale..=coarsest_scale` are built. The finest one is
//! area-downsampled straight from the input; every coarser level halves the
//! one below it (integer division of both dimensions). Each level also keeps
//! a border-extended copy of frame 1 for out-of-bounds-safe bilinear
//! sampling, frame-0 Sobel gradients, the dense flow estimated on that level
//! and, when the caller supplied one, the initial flow rescaled to the level.

use ndarray::{Array2, ArrayView2};

use crate::filters::border::replicate_border;
use crate::filters::ensure_shape;
use crate::filters::gradient::spatial_gradient;
use crate::filters::resize::{resize_area, resize_flow_component};
use crate::frame::FlowField;

/// Initial flow resampled to one level, in that level's pixel units.
#[derive(Clone, Debug, Default)]
pub struct SeedFlow {
    pub ux: Array2<f32>,
    pub uy: Array2<f32>,
}

/// All per-level buffers.
#[derive(Clone, Debug, Default)]
pub struct PyramidLevel {
    /// Frame 0 at this level.
    pub i0: Array2<u8>,
    /// Frame 1 at this level.
    pub i1: Array2<u8>,
    /// Frame 1 with a replicated border on every side.
    pub i1_ext: Array2<u8>,
    /// Frame-0 horizontal gradient.
    pub i0x: Array2<i16>,
    /// Frame-0 vertical gradient.
    pub i0y: Array2<i16>,
    /// Horizontal flow component estimated at this level.
    pub ux: Array2<f32>,
    /// Vertical flow component estimated at this level.
    pub uy: Array2<f32>,
    pub seed: Option<SeedFlow>,
}

impl PyramidLevel {
    pub fn width(&self) -> usize {
        self.i0.ncols()
    }

    pub fn height(&self) -> usize {
        self.i0.nrows()
    }

    /// Shape the level's buffers for `(height, width)`, keeping allocations
    /// whose shape already matches.
    fn shape_for(&mut self, height: usize, width: usize) {
        ensure_shape(&mut self.i0, height, width);
        ensure_shape(&mut self.i1, height, width);
        ensure_shape(&mut self.ux, height, width);
        ensure_shape(&mut self.uy, height, width);
    }

    /// Border extension, gradients and seed for a level whose frames are set.
    fn finish(&mut self, border: usize, seed: Option<&FlowField>, scale: usize) {
        replicate_border(self.i1.view(), border, &mut self.i1_ext);
        spatial_gradient(self.i0.view(), &mut self.i0x, &mut self.i0y);

        match seed {
            Some(flow) => {
                let (h, w) = self.i0.dim();
                let fraction = (1usize << scale) as f32;
                let level_seed = self.seed.get_or_insert_with(SeedFlow::default);
                ensure_shape(&mut level_seed.ux, h, w);
                ensure_shape(&mut level_seed.uy, h, w);
                resize_flow_component(flow.ux(), &mut level_seed.ux, 1.0 / fraction);
                resize_flow_component(flow.uy(), &mut level_seed.uy, 1.0 / fraction);
            }
            None => self.seed = None,
        }
    }
}

/// Pyramid over scales `finest_scale..=coarsest_scale`.
#[derive(Clone, Debug, Default)]
pub struct Pyramid {
    levels: Vec<PyramidLevel>,
    finest_scale: usize,
}

impl Pyramid {
    pub fn new() -> Self {
        Self::default()
    }

    /// (Re)build every level for a pair of frames.
    ///
    /// Buffers from a previous build are reused when their shapes match.
    pub fn build(
        &mut self,
        i0: ArrayView2<'_, u8>,
        i1: ArrayView2<'_, u8>,
        seed: Option<&FlowField>,
        finest_scale: usize,
        coarsest_scale: usize,
        border: usize,
    ) {
        debug_assert!(finest_scale <= coarsest_scale);
        let count = coarsest_scale - finest_scale + 1;
        self.levels.resize_with(count, PyramidLevel::default);
        self.finest_scale = finest_scale;

        let (h, w) = i0.dim();
        for k in 0..count {
            let scale = finest_scale + k;
            let (done, rest) = self.levels.split_at_mut(k);
            let level = &mut rest[0];

            if k == 0 {
                let (lh, lw) = (h >> finest_scale, w >> finest_scale);
                level.shape_for(lh, lw);
                if (lh, lw) == (h, w) {
                    level.i0.assign(&i0);
                    level.i1.assign(&i1);
                } else {
                    resize_area(i0, &mut level.i0);
                    resize_area(i1, &mut level.i1);
                }
            } else {
                let prev = &done[k - 1];
                level.shape_for(prev.height() / 2, prev.width() / 2);
                resize_area(prev.i0.view(), &mut level.i0);
                resize_area(prev.i1.view(), &mut level.i1);
            }

            level.finish(border, seed, scale);
        }
    }

    pub fn finest_scale(&self) -> usize {
        self.finest_scale
    }

    pub fn coarsest_scale(&self) -> usize {
        self.finest_scale + self.levels.len().saturating_sub(1)
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// Level at absolute `scale`. Panics when the scale was not built.
    pub fn level(&self, scale: usize) -> &PyramidLevel {
        &self.levels[scale - self.finest_scale]
    }

    pub fn level_mut(&mut self, scale: usize) -> &mut PyramidLevel {
        &mut self.levels[scale - self.finest_scale]
    }

    /// Propagate the flow at `scale` to the next finer level: bilinear
    /// upsampling to its resolution, vectors doubled.
    pub fn upsample_flow(&mut self, scale: usize) {
        debug_assert!(scale > self.finest_scale);
        let k = scale - self.finest_scale;
        let (finer, coarser) = self.levels.split_at_mut(k);
        let finer = &mut finer[k - 1];
        let coarser = &coarser[0];
        resize_flow_component(coarser.ux.view(), &mut finer.ux, 2.0);
        resize_flow_component(coarser.uy.view(), &mut finer.uy, 2.0);
    }

    /// Release every level.
    pub fn clear(&mut self) {
        self.levels = Vec::new();
    }
}
