//! Choice of the pyramid range and patch size for one input size.

use tracing::info;

use crate::config::DisConfig;
use crate::consts::MAX_PYRAMID_LEVELS;
use crate::error::{FlowError, Result};

/// Scales and patch geometry actually used for one call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScalePlan {
    pub finest_scale: usize,
    pub coarsest_scale: usize,
    pub patch_size: usize,
    pub patch_stride: usize,
    /// Whether the configured finest scale did not fit and the
    /// size-based fallback table was used.
    pub auto_selected: bool,
}

impl ScalePlan {
    pub fn num_levels(&self) -> usize {
        self.coarsest_scale - self.finest_scale + 1
    }
}

/// Coarsest usable scale for an image and patch size.
///
/// `min(trunc(log2(max(w,h) / (4*patch)) + 0.5), trunc(log2(min(w,h) / patch)))`
/// with integer division in the second term. Negative when the image cannot
/// hold a single patch.
pub fn coarsest_scale_for(width: usize, height: usize, patch_size: usize) -> i32 {
    let largest = width.max(height) as f64;
    let smallest = width.min(height);
    let by_largest = ((largest / (4.0 * patch_size as f64)).ln() / std::f64::consts::LN_2 + 0.5) as i32;
    let by_smallest = (((smallest / patch_size) as f64).ln() / std::f64::consts::LN_2) as i32;
    by_largest.min(by_smallest)
}

/// Fallback `(patch_size, finest_scale, coarsest_scale)` keyed by the
/// requested finest scale, derived from the image width only.
pub fn auto_select(requested_finest: usize, width: usize) -> (usize, usize, usize) {
    let (patch_size, offset) = match requested_finest {
        1 => (8, 2),
        3 => (12, 4),
        4 => (12, 5),
        _ => (8, 2),
    };
    let ratio = (2 * width) as f64 / (5 * patch_size) as f64;
    let coarsest = ratio.log2().floor().max(0.0) as usize;
    (patch_size, coarsest.saturating_sub(offset), coarsest)
}

fn level_fits(width: usize, height: usize, scale: usize, patch_size: usize) -> bool {
    (width >> scale) >= patch_size && (height >> scale) >= patch_size
}

/// Plan the pyramid for a `width x height` input.
///
/// The result always satisfies `finest <= coarsest < MAX_PYRAMID_LEVELS`
/// and every used level is at least one patch wide and tall.
pub fn plan_scales(config: &DisConfig, width: usize, height: usize) -> Result<ScalePlan> {
    let coarsest = coarsest_scale_for(width, height, config.patch_size);
    if coarsest < 0 {
        return Err(FlowError::ImageTooSmall { width, height });
    }

    let mut plan = ScalePlan {
        finest_scale: config.finest_scale,
        coarsest_scale: coarsest as usize,
        patch_size: config.patch_size,
        patch_stride: config.patch_stride,
        auto_selected: false,
    };

    if plan.coarsest_scale < plan.finest_scale {
        let (patch_size, finest, coarsest) = auto_select(config.finest_scale, width);
        info!(
            width,
            height,
            requested_finest = config.finest_scale,
            patch_size,
            finest,
            coarsest,
            "Image too small for the requested finest scale, auto-selecting"
        );
        plan.patch_size = patch_size;
        plan.finest_scale = finest;
        plan.coarsest_scale = coarsest;
        plan.auto_selected = true;
    }

    plan.coarsest_scale = plan.coarsest_scale.min(MAX_PYRAMID_LEVELS - 1);
    plan.finest_scale = plan.finest_scale.min(plan.coarsest_scale);
    while plan.finest_scale > 0 && !level_fits(width, height, plan.finest_scale, plan.patch_size) {
        plan.finest_scale -= 1;
    }
    if !level_fits(width, height, plan.finest_scale, plan.patch_size) {
        // Full resolution always holds the configured patch here.
        plan.patch_size = config.patch_size;
    }
    while plan.coarsest_scale > plan.finest_scale
        && !level_fits(width, height, plan.coarsest_scale, plan.patch_size)
    {
        plan.coarsest_scale -= 1;
    }

    Ok(plan)
}
