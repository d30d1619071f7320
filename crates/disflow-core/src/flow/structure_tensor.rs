//! Per-patch structure tensor sums over frame-0 gradients.
//!
//! For every patch on the grid we need `sum(Ix^2)`, `sum(Iy^2)`, `sum(Ix*Iy)`
//! and, with mean normalisation, `sum(Ix)` and `sum(Iy)`. A horizontal
//! running-sum pass collapses each row to one value per grid column, then a
//! vertical running-sum pass over those columns yields one value per grid
//! cell. Every pixel enters and leaves each running sum exactly once.

use ndarray::Array2;

use super::grid::{GridBuffer, PatchGrid};

/// Gradient moment sums for every patch on a grid.
#[derive(Clone, Debug, Default)]
pub struct StructureTensor {
    pub xx: GridBuffer,
    pub yy: GridBuffer,
    pub xy: GridBuffer,
    /// `sum(Ix)`; zero unless computed with sums.
    pub x: GridBuffer,
    /// `sum(Iy)`; zero unless computed with sums.
    pub y: GridBuffer,
    aux_xx: GridBuffer,
    aux_yy: GridBuffer,
    aux_xy: GridBuffer,
    aux_x: GridBuffer,
    aux_y: GridBuffer,
}

/// Running accumulators for the five moments.
#[derive(Clone, Copy, Default)]
struct Moments {
    xx: f32,
    yy: f32,
    xy: f32,
    x: f32,
    y: f32,
}

impl Moments {
    #[inline]
    fn add(&mut self, gx: f32, gy: f32) {
        self.xx += gx * gx;
        self.yy += gy * gy;
        self.xy += gx * gy;
        self.x += gx;
        self.y += gy;
    }

    #[inline]
    fn slide(&mut self, gx_in: f32, gy_in: f32, gx_out: f32, gy_out: f32) {
        self.xx += gx_in * gx_in - gx_out * gx_out;
        self.yy += gy_in * gy_in - gy_out * gy_out;
        self.xy += gx_in * gy_in - gx_out * gy_out;
        self.x += gx_in - gx_out;
        self.y += gy_in - gy_out;
    }
}

impl StructureTensor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve buffers for the largest grid this instance will see.
    pub fn reserve(&mut self, grid: &PatchGrid) {
        for buf in [&mut self.xx, &mut self.yy, &mut self.xy, &mut self.x, &mut self.y] {
            buf.reserve(grid.rows, grid.cols);
        }
        for buf in [
            &mut self.aux_xx,
            &mut self.aux_yy,
            &mut self.aux_xy,
            &mut self.aux_x,
            &mut self.aux_y,
        ] {
            buf.reserve(grid.height, grid.cols);
        }
    }

    /// Fill the five moment buffers for `grid` from frame-0 gradients.
    ///
    /// `with_sums` controls whether `x` and `y` carry the plain gradient
    /// sums; they are only consumed by mean-normalised matching.
    pub fn compute(&mut self, gx: &Array2<i16>, gy: &Array2<i16>, grid: &PatchGrid, with_sums: bool) {
        let psz = grid.patch_size;
        let stride = grid.patch_stride;
        let (h, w) = (grid.height, grid.width);
        debug_assert_eq!(gx.dim(), (h, w));
        debug_assert_eq!(gy.dim(), (h, w));

        for buf in [
            &mut self.aux_xx,
            &mut self.aux_yy,
            &mut self.aux_xy,
            &mut self.aux_x,
            &mut self.aux_y,
        ] {
            buf.reset(h, grid.cols);
        }

        // Horizontal pass: one running sum per image row.
        for i in 0..h {
            let mut m = Moments::default();
            for j in 0..psz {
                m.add(gx[[i, j]] as f32, gy[[i, j]] as f32);
            }
            self.store_aux(i, 0, &m);

            let mut js = 1;
            for j in psz..w {
                m.slide(
                    gx[[i, j]] as f32,
                    gy[[i, j]] as f32,
                    gx[[i, j - psz]] as f32,
                    gy[[i, j - psz]] as f32,
                );
                if (j - psz + 1) % stride == 0 {
                    self.store_aux(i, js, &m);
                    js += 1;
                }
            }
        }

        for buf in [&mut self.xx, &mut self.yy, &mut self.xy, &mut self.x, &mut self.y] {
            buf.reset(grid.rows, grid.cols);
        }

        // Vertical pass over the per-row sums of each grid column.
        for js in 0..grid.cols {
            let mut m = Moments::default();
            for i in 0..psz {
                self.accumulate_aux(&mut m, i, js, None);
            }
            self.store(0, js, &m, with_sums);

            let mut is = 1;
            for i in psz..h {
                self.accumulate_aux(&mut m, i, js, Some(i - psz));
                if (i - psz + 1) % stride == 0 {
                    self.store(is, js, &m, with_sums);
                    is += 1;
                }
            }
        }
    }

    fn store_aux(&mut self, i: usize, js: usize, m: &Moments) {
        self.aux_xx[[i, js]] = m.xx;
        self.aux_yy[[i, js]] = m.yy;
        self.aux_xy[[i, js]] = m.xy;
        self.aux_x[[i, js]] = m.x;
        self.aux_y[[i, js]] = m.y;
    }

    fn accumulate_aux(&self, m: &mut Moments, i: usize, js: usize, leaving: Option<usize>) {
        let at = |buf: &GridBuffer| {
            let out = leaving.map_or(0.0, |o| buf[[o, js]]);
            buf[[i, js]] - out
        };
        m.xx += at(&self.aux_xx);
        m.yy += at(&self.aux_yy);
        m.xy += at(&self.aux_xy);
        m.x += at(&self.aux_x);
        m.y += at(&self.aux_y);
    }

    fn store(&mut self, is: usize, js: usize, m: &Moments, with_sums: bool) {
        self.xx[[is, js]] = m.xx;
        self.yy[[is, js]] = m.yy;
        self.xy[[is, js]] = m.xy;
        if with_sums {
            self.x[[is, js]] = m.x;
            self.y[[is, js]] = m.y;
        }
    }

    /// Drop every buffer.
    pub fn release(&mut self) {
        *self = Self::default();
    }
}
