//! Variational refinement of a dense flow field.
//!
//! Around the current flow `(u, v)` an increment `(du, dv)` is sought that
//! minimises
//!
//! ```text
//! delta * psi(brightness residual^2 / |grad I|^2)
//!   + gamma * psi(gradient residual^2 / |hessian I|^2)
//!   + alpha * psi(|grad (u + du)|^2 + |grad (v + dv)|^2)
//! ```
//!
//! with `psi(s) = sqrt(s + eps^2)`. Frame 1 is warped once by the incoming
//! flow and the data terms are linearised about it. Outer fixed-point
//! iterations freeze the robust weights; each is followed by a few red-black
//! SOR sweeps over the resulting linear system. Image borders are Neumann
//! (no smoothness edge leaves the image).

use ndarray::{Array2, ArrayView2, ArrayViewMut1, Zip};

use crate::config::VariationalConfig;
use crate::consts::{
    PARALLEL_PIXEL_THRESHOLD, VARIATIONAL_EPSILON_SQUARED, VARIATIONAL_SOR_OMEGA, VARIATIONAL_ZETA_SQUARED,
};
use crate::filters::{ensure_shape, rows_for_each};

use super::FlowRefiner;

#[derive(Clone, Debug, Default)]
struct Buffers {
    i0: Array2<f32>,
    i1: Array2<f32>,
    warped: Array2<f32>,
    // Frame-0 and warped frame-1 first derivatives.
    i0x: Array2<f32>,
    i0y: Array2<f32>,
    wx: Array2<f32>,
    wy: Array2<f32>,
    // Linearised image terms.
    ix: Array2<f32>,
    iy: Array2<f32>,
    iz: Array2<f32>,
    ixx: Array2<f32>,
    ixy: Array2<f32>,
    iyy: Array2<f32>,
    ixz: Array2<f32>,
    iyz: Array2<f32>,
    // Per-pixel 2x2 system from the data terms.
    a11: Array2<f32>,
    a12: Array2<f32>,
    a22: Array2<f32>,
    b1: Array2<f32>,
    b2: Array2<f32>,
    // Smoothness edge weights towards the right and lower neighbour.
    weight_right: Array2<f32>,
    weight_down: Array2<f32>,
    du: Array2<f32>,
    dv: Array2<f32>,
}

fn is_parallel(h: usize, w: usize) -> bool {
    h * w >= PARALLEL_PIXEL_THRESHOLD
}

/// Clamped central difference along columns.
fn derivative_x(src: &Array2<f32>, dst: &mut Array2<f32>) {
    let w = src.ncols();
    rows_for_each(dst, |r, mut row| {
        for c in 0..w {
            let left = src[[r, c.saturating_sub(1)]];
            let right = src[[r, (c + 1).min(w - 1)]];
            row[c] = 0.5 * (right - left);
        }
    });
}

/// Clamped central difference along rows.
fn derivative_y(src: &Array2<f32>, dst: &mut Array2<f32>) {
    let (h, w) = src.dim();
    rows_for_each(dst, |r, mut row| {
        let up = r.saturating_sub(1);
        let down = (r + 1).min(h - 1);
        for c in 0..w {
            row[c] = 0.5 * (src[[down, c]] - src[[up, c]]);
        }
    });
}

/// Bilinear sample with coordinates clamped to the image.
fn sample_clamped(img: &Array2<f32>, y: f32, x: f32) -> f32 {
    let (h, w) = img.dim();
    let y = y.max(0.0).min((h - 1) as f32);
    let x = x.max(0.0).min((w - 1) as f32);
    let (y0, x0) = (y.floor() as usize, x.floor() as usize);
    let (y1, x1) = ((y0 + 1).min(h - 1), (x0 + 1).min(w - 1));
    let (fy, fx) = (y - y0 as f32, x - x0 as f32);

    let top = img[[y0, x0]] * (1.0 - fx) + img[[y0, x1]] * fx;
    let bottom = img[[y1, x0]] * (1.0 - fx) + img[[y1, x1]] * fx;
    top * (1.0 - fy) + bottom * fy
}

impl Buffers {
    fn prepare(&mut self, h: usize, w: usize) {
        for buf in [
            &mut self.i0,
            &mut self.i1,
            &mut self.warped,
            &mut self.i0x,
            &mut self.i0y,
            &mut self.wx,
            &mut self.wy,
            &mut self.ix,
            &mut self.iy,
            &mut self.iz,
            &mut self.ixx,
            &mut self.ixy,
            &mut self.iyy,
            &mut self.ixz,
            &mut self.iyz,
            &mut self.a11,
            &mut self.a12,
            &mut self.a22,
            &mut self.b1,
            &mut self.b2,
            &mut self.weight_right,
            &mut self.weight_down,
            &mut self.du,
            &mut self.dv,
        ] {
            ensure_shape(buf, h, w);
        }
    }

    fn load(&mut self, i0: ArrayView2<'_, u8>, i1: ArrayView2<'_, u8>) {
        Zip::from(&mut self.i0).and(&i0).for_each(|d, &s| *d = s as f32);
        Zip::from(&mut self.i1).and(&i1).for_each(|d, &s| *d = s as f32);
    }

    /// Warp frame 1 by the current flow and build the linearised terms.
    fn linearize(&mut self, ux: &Array2<f32>, uy: &Array2<f32>) {
        let (h, w) = self.i0.dim();
        let i1 = &self.i1;
        rows_for_each(&mut self.warped, |r, mut row| {
            for c in 0..w {
                row[c] = sample_clamped(i1, r as f32 + uy[[r, c]], c as f32 + ux[[r, c]]);
            }
        });

        derivative_x(&self.i0, &mut self.i0x);
        derivative_y(&self.i0, &mut self.i0y);
        derivative_x(&self.warped, &mut self.wx);
        derivative_y(&self.warped, &mut self.wy);

        let (i0, warped) = (&self.i0, &self.warped);
        let (i0x, i0y, wx, wy) = (&self.i0x, &self.i0y, &self.wx, &self.wy);
        let terms = |r: usize,
                     mut ix: ArrayViewMut1<f32>,
                     mut iy: ArrayViewMut1<f32>,
                     mut iz: ArrayViewMut1<f32>,
                     mut ixz: ArrayViewMut1<f32>,
                     mut iyz: ArrayViewMut1<f32>| {
            for c in 0..w {
                let (ax, ay) = (i0x[[r, c]], i0y[[r, c]]);
                let (bx, by) = (wx[[r, c]], wy[[r, c]]);
                ix[c] = 0.5 * (ax + bx);
                iy[c] = 0.5 * (ay + by);
                iz[c] = warped[[r, c]] - i0[[r, c]];
                ixz[c] = bx - ax;
                iyz[c] = by - ay;
            }
        };
        let zip = Zip::indexed(self.ix.rows_mut())
            .and(self.iy.rows_mut())
            .and(self.iz.rows_mut())
            .and(self.ixz.rows_mut())
            .and(self.iyz.rows_mut());
        if is_parallel(h, w) {
            zip.par_for_each(terms);
        } else {
            zip.for_each(terms);
        }

        derivative_x(&self.ix, &mut self.ixx);
        derivative_y(&self.ix, &mut self.ixy);
        derivative_y(&self.iy, &mut self.iyy);
    }

    /// Robust data-term weights at the current increment, folded into the
    /// per-pixel system `A * (du, dv) = b`.
    fn data_terms(&mut self, config: &VariationalConfig) {
        let delta = config.delta / 2.0;
        let gamma = config.gamma / 2.0;
        let (h, w) = self.i0.dim();
        let (du, dv) = (&self.du, &self.dv);
        let (ix, iy, iz) = (&self.ix, &self.iy, &self.iz);
        let (ixx, ixy, iyy) = (&self.ixx, &self.ixy, &self.iyy);
        let (ixz, iyz) = (&self.ixz, &self.iyz);

        let system = |r: usize,
                      mut a11_row: ArrayViewMut1<f32>,
                      mut a12_row: ArrayViewMut1<f32>,
                      mut a22_row: ArrayViewMut1<f32>,
                      mut b1_row: ArrayViewMut1<f32>,
                      mut b2_row: ArrayViewMut1<f32>| {
            for c in 0..w {
                let p = [r, c];
                let (du_p, dv_p) = (du[p], dv[p]);

                // Brightness constancy.
                let (gx, gy, gz) = (ix[p], iy[p], iz[p]);
                let norm = gx * gx + gy * gy + VARIATIONAL_ZETA_SQUARED;
                let res = gz + gx * du_p + gy * dv_p;
                let weight = delta / (res * res / norm + VARIATIONAL_EPSILON_SQUARED).sqrt() / norm;
                let mut a11 = weight * gx * gx;
                let mut a12 = weight * gx * gy;
                let mut a22 = weight * gy * gy;
                let mut b1 = -weight * gz * gx;
                let mut b2 = -weight * gz * gy;

                // Gradient constancy.
                let (hxx, hxy, hyy) = (ixx[p], ixy[p], iyy[p]);
                let (hxz, hyz) = (ixz[p], iyz[p]);
                let norm_x = hxx * hxx + hxy * hxy + VARIATIONAL_ZETA_SQUARED;
                let norm_y = hxy * hxy + hyy * hyy + VARIATIONAL_ZETA_SQUARED;
                let res_x = hxz + hxx * du_p + hxy * dv_p;
                let res_y = hyz + hxy * du_p + hyy * dv_p;
                let weight = gamma
                    / (res_x * res_x / norm_x + res_y * res_y / norm_y + VARIATIONAL_EPSILON_SQUARED).sqrt();
                a11 += weight * (hxx * hxx / norm_x + hxy * hxy / norm_y);
                a12 += weight * (hxx * hxy / norm_x + hxy * hyy / norm_y);
                a22 += weight * (hxy * hxy / norm_x + hyy * hyy / norm_y);
                b1 -= weight * (hxx * hxz / norm_x + hxy * hyz / norm_y);
                b2 -= weight * (hxy * hxz / norm_x + hyy * hyz / norm_y);

                a11_row[c] = a11;
                a12_row[c] = a12;
                a22_row[c] = a22;
                b1_row[c] = b1;
                b2_row[c] = b2;
            }
        };
        let zip = Zip::indexed(self.a11.rows_mut())
            .and(self.a12.rows_mut())
            .and(self.a22.rows_mut())
            .and(self.b1.rows_mut())
            .and(self.b2.rows_mut());
        if is_parallel(h, w) {
            zip.par_for_each(system);
        } else {
            zip.for_each(system);
        }
    }

    /// Robust smoothness weights of the total flow `(u + du, v + dv)`.
    fn smoothness_weights(&mut self, ux: &Array2<f32>, uy: &Array2<f32>, alpha: f32) {
        let (h, w) = self.i0.dim();
        let (du, dv) = (&self.du, &self.dv);
        let total = |r: usize, c: usize| (ux[[r, c]] + du[[r, c]], uy[[r, c]] + dv[[r, c]]);

        let weights = |r: usize, mut right: ArrayViewMut1<f32>, mut down: ArrayViewMut1<f32>| {
            for c in 0..w {
                let (u, v) = total(r, c);
                let (u_x, v_x) = if c + 1 < w {
                    let (ur, vr) = total(r, c + 1);
                    (ur - u, vr - v)
                } else {
                    (0.0, 0.0)
                };
                let (u_y, v_y) = if r + 1 < h {
                    let (ud, vd) = total(r + 1, c);
                    (ud - u, vd - v)
                } else {
                    (0.0, 0.0)
                };
                let psi = alpha
                    / (u_x * u_x + u_y * u_y + v_x * v_x + v_y * v_y + VARIATIONAL_EPSILON_SQUARED).sqrt();
                right[c] = if c + 1 < w { psi } else { 0.0 };
                down[c] = if r + 1 < h { psi } else { 0.0 };
            }
        };
        let zip = Zip::indexed(self.weight_right.rows_mut()).and(self.weight_down.rows_mut());
        if is_parallel(h, w) {
            zip.par_for_each(weights);
        } else {
            zip.for_each(weights);
        }
    }

    /// One SOR half-sweep over pixels with `(row + col) % 2 == parity`.
    fn sor_sweep(&mut self, ux: &Array2<f32>, uy: &Array2<f32>, parity: usize) {
        let (h, w) = self.i0.dim();
        let omega = VARIATIONAL_SOR_OMEGA;

        for r in 0..h {
            for c in ((r + parity) % 2..w).step_by(2) {
                let p = [r, c];
                let neighbours = [
                    (c > 0).then(|| ([r, c - 1], self.weight_right[[r, c - 1]])),
                    (c + 1 < w).then(|| ([r, c + 1], self.weight_right[p])),
                    (r > 0).then(|| ([r - 1, c], self.weight_down[[r - 1, c]])),
                    (r + 1 < h).then(|| ([r + 1, c], self.weight_down[p])),
                ];

                let mut sum_w = 0.0f32;
                let mut num_u = self.b1[p];
                let mut num_v = self.b2[p];
                for (n, wgt) in neighbours.into_iter().flatten() {
                    sum_w += wgt;
                    num_u += wgt * (ux[n] + self.du[n] - ux[p]);
                    num_v += wgt * (uy[n] + self.dv[n] - uy[p]);
                }

                let denom_u = self.a11[p] + sum_w;
                if denom_u > 0.0 {
                    let target = (num_u - self.a12[p] * self.dv[p]) / denom_u;
                    self.du[p] += omega * (target - self.du[p]);
                }
                let denom_v = self.a22[p] + sum_w;
                if denom_v > 0.0 {
                    let target = (num_v - self.a12[p] * self.du[p]) / denom_v;
                    self.dv[p] += omega * (target - self.dv[p]);
                }
            }
        }
    }
}

/// Brightness, gradient and smoothness energy minimiser.
#[derive(Clone, Debug, Default)]
pub struct VariationalRefinement {
    config: VariationalConfig,
    buffers: Buffers,
}

impl VariationalRefinement {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: VariationalConfig) -> Self {
        Self {
            config,
            buffers: Buffers::default(),
        }
    }

    pub fn config(&self) -> &VariationalConfig {
        &self.config
    }
}

impl FlowRefiner for VariationalRefinement {
    fn name(&self) -> &str {
        "variational"
    }

    fn configure(&mut self, config: &VariationalConfig) {
        self.config = config.clone();
    }

    fn refine(
        &mut self,
        i0: ArrayView2<'_, u8>,
        i1: ArrayView2<'_, u8>,
        ux: &mut Array2<f32>,
        uy: &mut Array2<f32>,
    ) {
        let (h, w) = i0.dim();
        if h == 0 || w == 0 || !self.config.is_enabled() {
            return;
        }
        debug_assert_eq!(i1.dim(), (h, w));
        debug_assert_eq!(ux.dim(), (h, w));
        debug_assert_eq!(uy.dim(), (h, w));

        let b = &mut self.buffers;
        b.prepare(h, w);
        b.load(i0, i1);
        b.linearize(ux, uy);
        b.du.fill(0.0);
        b.dv.fill(0.0);

        let alpha = self.config.alpha / 2.0;
        for _ in 0..self.config.iterations {
            b.data_terms(&self.config);
            b.smoothness_weights(ux, uy, alpha);
            for _ in 0..self.config.sor_iterations {
                b.sor_sweep(ux, uy, 0);
                b.sor_sweep(ux, uy, 1);
            }
        }

        Zip::from(ux).and(&b.du).for_each(|u, &d| *u += d);
        Zip::from(uy).and(&b.dv).for_each(|v, &d| *v += d);
    }

    fn reset(&mut self) {
        self.buffers = Buffers::default();
    }
}
