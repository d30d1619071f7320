use ndarray::{Array2, ArrayView2};

use super::{ensure_shape, rows_for_each};

/// Copy `src` into `dst` surrounded by a `border`-pixel frame that repeats
/// the nearest edge pixel. `dst` is reshaped to `(h + 2*border, w + 2*border)`.
pub fn replicate_border(src: ArrayView2<'_, u8>, border: usize, dst: &mut Array2<u8>) {
    let (h, w) = src.dim();
    ensure_shape(dst, h + 2 * border, w + 2 * border);
    if h == 0 || w == 0 {
        return;
    }

    rows_for_each(dst, |r, mut row| {
        let sr = r.saturating_sub(border).min(h - 1);
        for (c, px) in row.iter_mut().enumerate() {
            let sc = c.saturating_sub(border).min(w - 1);
            *px = src[[sr, sc]];
        }
    });
}
