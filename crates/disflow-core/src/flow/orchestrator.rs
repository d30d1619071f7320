use ndarray::{Array2, ArrayView2, Axis};
use tracing::{debug, info, warn};

use crate::config::{DisConfig, Preset};
use crate::consts::{BORDER_SIZE, MAX_PYRAMID_LEVELS};
use crate::error::{FlowError, Result};
use crate::filters::ensure_shape;
use crate::filters::resize::resize_flow_component;
use crate::frame::FlowField;
use crate::refine::{FlowRefiner, VariationalRefinement};

use super::densify::densify;
use super::grid::{GridBuffer, PatchGrid};
use super::inverse_search::{patch_inverse_search, SearchInputs, SearchParams};
use super::pyramid::Pyramid;
use super::scales::{plan_scales, ScalePlan};
use super::structure_tensor::StructureTensor;

/// Dense Inverse Search optical flow.
///
/// Holds every per-scale buffer between calls; repeated calls on frames of
/// the same size reuse them. Not shareable between threads while running
/// (`calc` takes `&mut self`); each call parallelises internally.
pub struct DisOpticalFlow {
    config: DisConfig,
    pyramid: Pyramid,
    tensor: StructureTensor,
    sparse_x: GridBuffer,
    sparse_y: GridBuffer,
    full_ux: Array2<f32>,
    full_uy: Array2<f32>,
    refiners: Vec<Box<dyn FlowRefiner>>,
    last_plan: Option<ScalePlan>,
}

impl Default for DisOpticalFlow {
    fn default() -> Self {
        Self::new(DisConfig::default())
    }
}

impl std::fmt::Debug for DisOpticalFlow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DisOpticalFlow")
            .field("config", &self.config)
            .field("last_plan", &self.last_plan)
            .finish_non_exhaustive()
    }
}

/// Reject inputs the algorithm cannot run on, before touching any buffer.
fn validate_inputs(i0: &ArrayView2<'_, u8>, i1: &ArrayView2<'_, u8>) -> Result<()> {
    if i0.is_empty() || i1.is_empty() {
        return Err(FlowError::EmptyImage);
    }
    if i0.dim() != i1.dim() {
        return Err(FlowError::SizeMismatch {
            first_width: i0.ncols(),
            first_height: i0.nrows(),
            second_width: i1.ncols(),
            second_height: i1.nrows(),
        });
    }
    if !i0.is_standard_layout() || !i1.is_standard_layout() {
        return Err(FlowError::NonContiguous);
    }
    Ok(())
}

impl DisOpticalFlow {
    /// Create an instance with the variational refiner on every level.
    pub fn new(config: DisConfig) -> Self {
        Self::with_refiners(config, || Box::new(VariationalRefinement::new()))
    }

    pub fn from_preset(preset: Preset) -> Self {
        Self::new(DisConfig::from_preset(preset))
    }

    /// Create an instance whose per-level refiners come from `make_refiner`.
    pub fn with_refiners<F>(config: DisConfig, mut make_refiner: F) -> Self
    where
        F: FnMut() -> Box<dyn FlowRefiner>,
    {
        Self {
            config,
            pyramid: Pyramid::new(),
            tensor: StructureTensor::new(),
            sparse_x: GridBuffer::default(),
            sparse_y: GridBuffer::default(),
            full_ux: Array2::zeros((0, 0)),
            full_uy: Array2::zeros((0, 0)),
            refiners: (0..MAX_PYRAMID_LEVELS).map(|_| make_refiner()).collect(),
            last_plan: None,
        }
    }

    pub fn config(&self) -> &DisConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: DisConfig) {
        self.config = config;
    }

    /// Scale plan used by the most recent successful call.
    pub fn last_plan(&self) -> Option<ScalePlan> {
        self.last_plan
    }

    /// Compute flow from `i0` to `i1` into a newly allocated field.
    pub fn compute(&mut self, i0: ArrayView2<'_, u8>, i1: ArrayView2<'_, u8>) -> Result<FlowField> {
        let mut flow = FlowField::default();
        self.calc(i0, i1, &mut flow)?;
        Ok(flow)
    }

    /// Compute flow from `i0` to `i1`.
    ///
    /// If `flow` already has the frames' size it is used as an initial
    /// estimate; otherwise estimation starts from zero. On success `flow`
    /// holds the result. On error nothing has been modified.
    pub fn calc(&mut self, i0: ArrayView2<'_, u8>, i1: ArrayView2<'_, u8>, flow: &mut FlowField) -> Result<()> {
        self.calc_with_progress(i0, i1, flow, |_| {})
    }

    /// Like [`calc`](Self::calc), reporting the fraction of scales done.
    pub fn calc_with_progress<F>(
        &mut self,
        i0: ArrayView2<'_, u8>,
        i1: ArrayView2<'_, u8>,
        flow: &mut FlowField,
        mut on_progress: F,
    ) -> Result<()>
    where
        F: FnMut(f32),
    {
        validate_inputs(&i0, &i1)?;
        self.config.validate()?;

        let (h, w) = i0.dim();
        let plan = plan_scales(&self.config, w, h)?;
        let use_seed = flow.matches(h, w);
        if !use_seed && !flow.data.is_empty() {
            warn!(
                width = flow.width(),
                height = flow.height(),
                channels = flow.channels(),
                "Initial flow does not match the frames, ignoring it"
            );
        }

        info!(
            width = w,
            height = h,
            finest_scale = plan.finest_scale,
            coarsest_scale = plan.coarsest_scale,
            patch_size = plan.patch_size,
            patch_stride = plan.patch_stride,
            seeded = use_seed,
            "Computing DIS optical flow"
        );

        self.prepare(i0, i1, use_seed.then_some(&*flow), &plan);

        let params = SearchParams {
            border_size: BORDER_SIZE,
            grad_descent_iterations: self.config.grad_descent_iterations,
            use_mean_normalization: self.config.use_mean_normalization,
            use_spatial_propagation: self.config.use_spatial_propagation,
        };
        let refine = self.config.variational.is_enabled();
        let total = plan.num_levels();

        self.pyramid.level_mut(plan.coarsest_scale).ux.fill(0.0);
        self.pyramid.level_mut(plan.coarsest_scale).uy.fill(0.0);

        for (done, scale) in (plan.finest_scale..=plan.coarsest_scale).rev().enumerate() {
            let level = self.pyramid.level(scale);
            let grid = PatchGrid::new(level.width(), level.height(), plan.patch_size, plan.patch_stride);
            debug!(
                scale,
                width = grid.width,
                height = grid.height,
                grid_cols = grid.cols,
                grid_rows = grid.rows,
                "Processing scale"
            );

            self.tensor
                .compute(&level.i0x, &level.i0y, &grid, params.use_mean_normalization);

            let inputs = SearchInputs {
                grid,
                i0: &level.i0,
                i1_ext: &level.i1_ext,
                i0x: &level.i0x,
                i0y: &level.i0y,
                ux: &level.ux,
                uy: &level.uy,
                seed: level.seed.as_ref().map(|s| (&s.ux, &s.uy)),
                tensor: &self.tensor,
            };
            patch_inverse_search(inputs, params, &mut self.sparse_x, &mut self.sparse_y);

            let level = self.pyramid.level_mut(scale);
            densify(
                &grid,
                &self.sparse_x,
                &self.sparse_y,
                &level.i0,
                &level.i1,
                &mut level.ux,
                &mut level.uy,
            );

            if refine {
                self.refiners[scale].refine(level.i0.view(), level.i1.view(), &mut level.ux, &mut level.uy);
            }

            if scale > plan.finest_scale {
                self.pyramid.upsample_flow(scale);
            }
            on_progress((done + 1) as f32 / total as f32);
        }

        let finest = self.pyramid.level(plan.finest_scale);
        let factor = (1usize << plan.finest_scale) as f32;
        ensure_shape(&mut self.full_ux, h, w);
        ensure_shape(&mut self.full_uy, h, w);
        resize_flow_component(finest.ux.view(), &mut self.full_ux, factor);
        resize_flow_component(finest.uy.view(), &mut self.full_uy, factor);

        if !flow.matches(h, w) {
            *flow = FlowField::zeros(h, w);
        }
        flow.data.index_axis_mut(Axis(2), 0).assign(&self.full_ux);
        flow.data.index_axis_mut(Axis(2), 1).assign(&self.full_uy);

        self.last_plan = Some(plan);
        Ok(())
    }

    /// Build the pyramid, size the grid buffers for the finest level and
    /// configure the refiners of every used scale.
    fn prepare(&mut self, i0: ArrayView2<'_, u8>, i1: ArrayView2<'_, u8>, seed: Option<&FlowField>, plan: &ScalePlan) {
        self.pyramid.build(
            i0,
            i1,
            seed,
            plan.finest_scale,
            plan.coarsest_scale,
            BORDER_SIZE,
        );

        let finest = self.pyramid.level(plan.finest_scale);
        let grid = PatchGrid::new(finest.width(), finest.height(), plan.patch_size, plan.patch_stride);
        self.sparse_x.reserve(grid.rows, grid.cols);
        self.sparse_y.reserve(grid.rows, grid.cols);
        self.tensor.reserve(&grid);

        for refiner in &mut self.refiners[plan.finest_scale..=plan.coarsest_scale] {
            refiner.configure(&self.config.variational);
        }
    }

    /// Release every internal buffer. The next call reallocates.
    pub fn collect_garbage(&mut self) {
        self.pyramid.clear();
        self.tensor.release();
        self.sparse_x.release();
        self.sparse_y.release();
        self.full_ux = Array2::zeros((0, 0));
        self.full_uy = Array2::zeros((0, 0));
        for refiner in &mut self.refiners {
            refiner.reset();
        }
        debug!("Released DIS buffers");
    }
}
