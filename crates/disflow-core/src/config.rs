use serde::{Deserialize, Serialize};

use crate::consts::{BORDER_SIZE, VARIATIONAL_SOR_ITERATIONS};
use crate::error::{FlowError, Result};

/// Named parameter sets trading throughput against quality.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Preset {
    /// Finest scale 2, stride 4, 12 descent iterations, no variational refinement.
    Fastest,
    /// Finest scale 2, stride 4, 16 descent iterations, 5 variational iterations.
    #[default]
    Balanced,
    /// Finest scale 1, stride 3, 25 descent iterations, 5 variational iterations.
    HigherQuality,
}

impl std::fmt::Display for Preset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Fastest => write!(f, "fastest"),
            Self::Balanced => write!(f, "balanced"),
            Self::HigherQuality => write!(f, "higher-quality"),
        }
    }
}

/// Parameters of the per-scale variational refinement stage.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VariationalConfig {
    /// Outer fixed-point iterations (0 disables the stage).
    pub iterations: usize,
    /// Smoothness term weight.
    pub alpha: f32,
    /// Gradient constancy term weight.
    pub gamma: f32,
    /// Brightness constancy term weight.
    pub delta: f32,
    /// SOR sweeps inside each fixed-point iteration.
    pub sor_iterations: usize,
}

impl Default for VariationalConfig {
    fn default() -> Self {
        Self {
            iterations: 5,
            alpha: 20.0,
            gamma: 10.0,
            delta: 5.0,
            sor_iterations: VARIATIONAL_SOR_ITERATIONS,
        }
    }
}

impl VariationalConfig {
    pub fn is_enabled(&self) -> bool {
        self.iterations > 0
    }
}

/// Configuration of the dense inverse search flow.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisConfig {
    /// Finest pyramid level processed (0 = full resolution).
    pub finest_scale: usize,
    /// Side of the square matching patch in pixels.
    pub patch_size: usize,
    /// Distance between neighbouring patch anchors in pixels.
    pub patch_stride: usize,
    /// Gradient descent iterations per patch.
    pub grad_descent_iterations: usize,
    /// Normalise patch means before comparing (robust to brightness changes).
    pub use_mean_normalization: bool,
    /// Seed each patch from an already solved neighbour.
    pub use_spatial_propagation: bool,
    pub variational: VariationalConfig,
}

impl Default for DisConfig {
    fn default() -> Self {
        Self {
            finest_scale: 2,
            patch_size: 8,
            patch_stride: 4,
            grad_descent_iterations: 16,
            use_mean_normalization: true,
            use_spatial_propagation: true,
            variational: VariationalConfig::default(),
        }
    }
}

impl DisConfig {
    /// Build a configuration from one of the named presets.
    pub fn from_preset(preset: Preset) -> Self {
        let mut config = Self {
            patch_size: 8,
            ..Self::default()
        };
        match preset {
            Preset::Fastest => {
                config.finest_scale = 2;
                config.patch_stride = 4;
                config.grad_descent_iterations = 12;
                config.variational.iterations = 0;
            }
            Preset::Balanced => {
                config.finest_scale = 2;
                config.patch_stride = 4;
                config.grad_descent_iterations = 16;
                config.variational.iterations = 5;
            }
            Preset::HigherQuality => {
                config.finest_scale = 1;
                config.patch_stride = 3;
                config.grad_descent_iterations = 25;
                config.variational.iterations = 5;
            }
        }
        config
    }

    /// Check parameter ranges the algorithm relies on.
    pub fn validate(&self) -> Result<()> {
        if self.patch_size < 2 || self.patch_size > BORDER_SIZE {
            return Err(FlowError::InvalidConfig(format!(
                "patch_size must be in 2..={BORDER_SIZE}, got {}",
                self.patch_size
            )));
        }
        if self.patch_stride == 0 {
            return Err(FlowError::InvalidConfig(
                "patch_stride must be at least 1".into(),
            ));
        }
        if !(self.variational.alpha.is_finite()
            && self.variational.gamma.is_finite()
            && self.variational.delta.is_finite())
        {
            return Err(FlowError::InvalidConfig(
                "variational weights must be finite".into(),
            ));
        }
        Ok(())
    }
}
