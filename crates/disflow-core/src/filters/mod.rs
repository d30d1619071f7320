pub mod border;
pub mod gradient;
pub mod resize;

use ndarray::{Array2, ArrayViewMut1, Zip};
use num_traits::Zero;

use crate::consts::PARALLEL_PIXEL_THRESHOLD;

/// Reshape `buf` to `(height, width)`, reallocating only when the shape differs.
///
/// Returns `true` when a new allocation was made. Contents are unspecified
/// afterwards when the shape is unchanged; callers overwrite them.
pub(crate) fn ensure_shape<T: Clone + Zero>(buf: &mut Array2<T>, height: usize, width: usize) -> bool {
    if buf.dim() == (height, width) {
        return false;
    }
    *buf = Array2::zeros((height, width));
    true
}

/// Run `f(row_index, row)` over every row of `dst`, in parallel for large images.
pub(crate) fn rows_for_each<T, F>(dst: &mut Array2<T>, f: F)
where
    T: Send,
    F: Fn(usize, ArrayViewMut1<'_, T>) + Sync + Send,
{
    let (h, w) = dst.dim();
    if h * w >= PARALLEL_PIXEL_THRESHOLD {
        Zip::indexed(dst.rows_mut()).par_for_each(|r, row| f(r, row));
    } else {
        Zip::indexed(dst.rows_mut()).for_each(|r, row| f(r, row));
    }
}
