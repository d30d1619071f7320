pub mod densify;
pub mod grid;
pub mod inverse_search;
pub mod orchestrator;
pub mod patch;
pub mod pyramid;
pub mod scales;
pub mod structure_tensor;

pub use grid::{GridBuffer, PatchGrid};
pub use orchestrator::DisOpticalFlow;
pub use scales::{plan_scales, ScalePlan};
