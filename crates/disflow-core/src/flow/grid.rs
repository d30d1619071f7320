use std::ops::{Index, IndexMut};

use ndarray::Array2;

/// Geometry of the sparse patch grid on one pyramid level.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PatchGrid {
    /// Level width in pixels.
    pub width: usize,
    /// Level height in pixels.
    pub height: usize,
    pub patch_size: usize,
    pub patch_stride: usize,
    /// Number of patch anchors per row (`ws`).
    pub cols: usize,
    /// Number of patch anchor rows (`hs`).
    pub rows: usize,
}

impl PatchGrid {
    /// Lay out patches of `patch_size` every `patch_stride` pixels, starting
    /// at the top-left corner and keeping every patch inside the image.
    ///
    /// The level must be at least one patch wide and tall.
    pub fn new(width: usize, height: usize, patch_size: usize, patch_stride: usize) -> Self {
        debug_assert!(width >= patch_size && height >= patch_size);
        debug_assert!(patch_stride > 0);
        Self {
            width,
            height,
            patch_size,
            patch_stride,
            cols: 1 + (width - patch_size) / patch_stride,
            rows: 1 + (height - patch_size) / patch_stride,
        }
    }

    /// Top-left pixel `(row, col)` of the patch at grid cell `(is, js)`.
    pub fn anchor(&self, is: usize, js: usize) -> (usize, usize) {
        (is * self.patch_stride, js * self.patch_stride)
    }

    pub fn len(&self) -> usize {
        self.rows * self.cols
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Row-major f32 buffer over grid cells.
///
/// Capacity is reserved once for the finest level; coarser levels reuse the
/// same allocation through [`GridBuffer::reset`].
#[derive(Clone, Debug, Default)]
pub struct GridBuffer {
    data: Vec<f32>,
    rows: usize,
    cols: usize,
}

impl GridBuffer {
    /// Make sure `rows * cols` cells fit without reallocating.
    pub fn reserve(&mut self, rows: usize, cols: usize) {
        let needed = rows * cols;
        if self.data.capacity() < needed {
            self.data.clear();
            self.data.reserve(needed);
        }
    }

    /// Resize to `rows x cols` and zero every cell.
    pub fn reset(&mut self, rows: usize, cols: usize) {
        self.data.clear();
        self.data.resize(rows * cols, 0.0);
        self.rows = rows;
        self.cols = cols;
    }

    /// Drop the allocation.
    pub fn release(&mut self) {
        *self = Self::default();
    }

    pub fn from_array(arr: &Array2<f32>) -> Self {
        let (rows, cols) = arr.dim();
        Self {
            data: arr.iter().copied().collect(),
            rows,
            cols,
        }
    }

    pub fn to_array(&self) -> Array2<f32> {
        Array2::from_shape_fn((self.rows, self.cols), |(r, c)| self[[r, c]])
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn capacity(&self) -> usize {
        self.data.capacity()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [f32] {
        &mut self.data
    }
}

impl Index<[usize; 2]> for GridBuffer {
    type Output = f32;

    fn index(&self, [row, col]: [usize; 2]) -> &f32 {
        &self.data[row * self.cols + col]
    }
}

impl IndexMut<[usize; 2]> for GridBuffer {
    fn index_mut(&mut self, [row, col]: [usize; 2]) -> &mut f32 {
        &mut self.data[row * self.cols + col]
    }
}
