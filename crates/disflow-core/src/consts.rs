/// Minimum pixel count (h*w) to use row-level Rayon parallelism.
pub const PARALLEL_PIXEL_THRESHOLD: usize = 65_536;

/// Width of the replicated border added around frame 1 on every level.
/// Bounds the largest usable patch size.
pub const BORDER_SIZE: usize = 16;

/// Upper bound on the number of pyramid levels (and refiner instances).
pub const MAX_PYRAMID_LEVELS: usize = 10;

/// Stripe count for patch inverse search when spatial propagation is on.
/// Fixed so the result does not depend on the machine's thread count.
pub const PROPAGATION_STRIPES: usize = 8;

/// Patch size that gets a compile-time specialised matching kernel.
pub const FAST_PATCH_SIZE: usize = 8;

/// Small epsilon guarding the structure tensor determinant and the
/// densification sampling bounds.
pub const EPS: f32 = 0.001;

/// Initial "infinite" SSD before any candidate is evaluated.
pub const INF: f32 = 1e10;

/// Default number of SOR sweeps inside each variational fixed-point iteration.
pub const VARIATIONAL_SOR_ITERATIONS: usize = 5;

/// Over-relaxation factor for the variational SOR solver.
pub const VARIATIONAL_SOR_OMEGA: f32 = 1.6;

/// Squared epsilon of the robust penaliser sqrt(s^2 + eps^2).
pub const VARIATIONAL_EPSILON_SQUARED: f32 = 0.001 * 0.001;

/// Squared regulariser of the gradient normalisation in the data terms.
pub const VARIATIONAL_ZETA_SQUARED: f32 = 0.1 * 0.1;
