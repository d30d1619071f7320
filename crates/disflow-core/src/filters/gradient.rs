use ndarray::{Array2, ArrayView2, ArrayViewMut1, Zip};

use crate::consts::PARALLEL_PIXEL_THRESHOLD;

use super::ensure_shape;

/// Mirror an out-of-range index without repeating the edge pixel
/// (`-1 -> 1`, `len -> len - 2`). Single-pixel axes clamp to 0.
fn reflect_101(idx: isize, len: usize) -> usize {
    if len == 1 {
        return 0;
    }
    let last = len as isize - 1;
    let mut i = idx;
    if i < 0 {
        i = -i;
    }
    if i > last {
        i = 2 * last - i;
    }
    i.clamp(0, last) as usize
}

/// Compute 3x3 Sobel x/y gradients of an 8-bit image.
///
/// Sobel kernels:
///   Gx = [[-1, 0, 1], [-2, 0, 2], [-1, 0, 1]]
///   Gy = [[-1, -2, -1], [0, 0, 0], [1, 2, 1]]
///
/// Borders are handled by reflect-101 mirroring. The magnitude of either
/// component is at most 4 * 255, so `i16` holds it exactly.
pub fn spatial_gradient(src: ArrayView2<'_, u8>, gx: &mut Array2<i16>, gy: &mut Array2<i16>) {
    let (h, w) = src.dim();
    ensure_shape(gx, h, w);
    ensure_shape(gy, h, w);
    if h == 0 || w == 0 {
        return;
    }

    let compute_row = |row: usize, mut gx_row: ArrayViewMut1<i16>, mut gy_row: ArrayViewMut1<i16>| {
        let up = reflect_101(row as isize - 1, h);
        let down = reflect_101(row as isize + 1, h);
        for col in 0..w {
            let left = reflect_101(col as isize - 1, w);
            let right = reflect_101(col as isize + 1, w);
            let p = |r: usize, c: usize| src[[r, c]] as i32;

            let dx = (p(up, right) + 2 * p(row, right) + p(down, right))
                - (p(up, left) + 2 * p(row, left) + p(down, left));
            let dy = (p(down, left) + 2 * p(down, col) + p(down, right))
                - (p(up, left) + 2 * p(up, col) + p(up, right));

            gx_row[col] = dx as i16;
            gy_row[col] = dy as i16;
        }
    };

    let zip = Zip::indexed(gx.rows_mut()).and(gy.rows_mut());
    if h * w >= PARALLEL_PIXEL_THRESHOLD {
        zip.par_for_each(compute_row);
    } else {
        zip.for_each(compute_row);
    }
}
