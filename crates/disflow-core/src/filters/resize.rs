//! Image resampling used by the pyramid and by flow upsampling.
//!
//! Two methods are provided:
//! - area averaging, for shrinking frames (each destination pixel is the
//!   coverage-weighted mean of the source pixels under its footprint);
//! - bilinear interpolation with half-pixel centres, for resizing flow
//!   components in either direction.

use ndarray::{Array2, ArrayView2};
use num_traits::{AsPrimitive, Zero};

use super::rows_for_each;

/// Pixel types the resamplers operate on.
pub trait Pixel: Copy + Send + Sync + Zero + AsPrimitive<f32> {
    /// Convert an interpolated value back to the pixel type.
    fn from_f32(v: f32) -> Self;
}

impl Pixel for u8 {
    fn from_f32(v: f32) -> Self {
        v.round().clamp(0.0, 255.0) as u8
    }
}

impl Pixel for f32 {
    fn from_f32(v: f32) -> Self {
        v
    }
}

/// Source taps `(index, weight)` contributing to each destination index
/// under area averaging. Weights of one destination index sum to 1.
fn area_taps(src_len: usize, dst_len: usize) -> Vec<Vec<(usize, f32)>> {
    if src_len == 0 || dst_len == 0 {
        return vec![Vec::new(); dst_len];
    }
    let scale = src_len as f64 / dst_len as f64;

    (0..dst_len)
        .map(|d| {
            let start = d as f64 * scale;
            let end = ((d + 1) as f64 * scale).min(src_len as f64);
            let span = end - start;
            let first = start.floor() as usize;
            let last = (end.ceil() as usize).min(src_len);

            (first..last)
                .filter_map(|s| {
                    let lo = (s as f64).max(start);
                    let hi = ((s + 1) as f64).min(end);
                    let cover = hi - lo;
                    (cover > 1e-9).then(|| (s, (cover / span) as f32))
                })
                .collect()
        })
        .collect()
}

/// Shrink `src` into `dst` by area averaging. The destination shape
/// (already allocated) selects the output size.
pub fn resize_area<T: Pixel>(src: ArrayView2<'_, T>, dst: &mut Array2<T>) {
    let (src_h, src_w) = src.dim();
    let (dst_h, dst_w) = dst.dim();
    if dst_h == 0 || dst_w == 0 {
        return;
    }

    let col_taps = area_taps(src_w, dst_w);
    let row_taps = area_taps(src_h, dst_h);

    // Horizontal pass into an f32 buffer, one row per source row.
    let mut horizontal = Array2::<f32>::zeros((src_h, dst_w));
    rows_for_each(&mut horizontal, |r, mut row| {
        for (c, taps) in col_taps.iter().enumerate() {
            let mut sum = 0.0f32;
            for &(s, wgt) in taps {
                sum += src[[r, s]].as_() * wgt;
            }
            row[c] = sum;
        }
    });

    // Vertical pass over the intermediate rows.
    rows_for_each(dst, |r, mut row| {
        let taps = &row_taps[r];
        for c in 0..dst_w {
            let mut sum = 0.0f32;
            for &(s, wgt) in taps {
                sum += horizontal[[s, c]] * wgt;
            }
            row[c] = T::from_f32(sum);
        }
    });
}

/// Interpolation position along one axis: `(lower index, upper index, fraction)`.
fn linear_taps(src_len: usize, dst_len: usize) -> Vec<(usize, usize, f32)> {
    if src_len == 0 {
        return vec![(0, 0, 0.0); dst_len];
    }
    let scale = src_len as f64 / dst_len as f64;
    let last = src_len - 1;

    (0..dst_len)
        .map(|d| {
            let pos = (d as f64 + 0.5) * scale - 0.5;
            let base = pos.floor();
            let mut frac = (pos - base) as f32;
            let mut lo = base as i64;
            if lo < 0 {
                lo = 0;
                frac = 0.0;
            }
            let mut lo = lo as usize;
            if lo >= last {
                lo = last;
                frac = 0.0;
            }
            (lo, (lo + 1).min(last), frac)
        })
        .collect()
}

/// Resize `src` into `dst` with bilinear interpolation.
///
/// Pixel centres are aligned at half-pixel offsets and samples outside the
/// source are clamped to the edge.
pub fn resize_bilinear(src: ArrayView2<'_, f32>, dst: &mut Array2<f32>) {
    let (src_h, src_w) = src.dim();
    let (dst_h, dst_w) = dst.dim();
    if dst_h == 0 || dst_w == 0 || src_h == 0 || src_w == 0 {
        return;
    }

    let col_taps = linear_taps(src_w, dst_w);
    let row_taps = linear_taps(src_h, dst_h);

    rows_for_each(dst, |r, mut row| {
        let (r0, r1, fy) = row_taps[r];
        for (c, &(c0, c1, fx)) in col_taps.iter().enumerate() {
            let top = src[[r0, c0]] * (1.0 - fx) + src[[r0, c1]] * fx;
            let bottom = src[[r1, c0]] * (1.0 - fx) + src[[r1, c1]] * fx;
            row[c] = top * (1.0 - fy) + bottom * fy;
        }
    });
}

/// Bilinear resize followed by multiplying every value by `factor`.
///
/// Flow vectors are measured in pixels of the grid they live on, so
/// changing resolution by `k` scales them by the same `k`.
pub fn resize_flow_component(src: ArrayView2<'_, f32>, dst: &mut Array2<f32>, factor: f32) {
    resize_bilinear(src, dst);
    if factor != 1.0 {
        dst.mapv_inplace(|v| v * factor);
    }
}
