pub mod variational;

use ndarray::{Array2, ArrayView2};

use crate::config::VariationalConfig;

pub use variational::VariationalRefinement;

/// Per-scale dense flow refinement run after densification.
///
/// The orchestrator keeps one instance per pyramid level, configures it
/// before each call and resets the whole pool on garbage collection.
pub trait FlowRefiner: Send {
    /// Human-readable name for logging.
    fn name(&self) -> &str;

    /// Apply the weights and iteration counts used by subsequent calls.
    fn configure(&mut self, config: &VariationalConfig);

    /// Refine `ux`/`uy` in place for the frame pair at this scale.
    ///
    /// All four arrays share the same shape.
    fn refine(
        &mut self,
        i0: ArrayView2<'_, u8>,
        i1: ArrayView2<'_, u8>,
        ux: &mut Array2<f32>,
        uy: &mut Array2<f32>,
    );

    /// Release internal buffers.
    fn reset(&mut self);
}
