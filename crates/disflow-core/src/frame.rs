use ndarray::{Array2, Array3, ArrayView2, Axis};

use crate::error::{FlowError, Result};

/// A single 8-bit grayscale image frame.
#[derive(Clone, Debug, PartialEq)]
pub struct Frame {
    /// Pixel data, row-major, shape = (height, width)
    pub data: Array2<u8>,
}

impl Frame {
    pub fn new(data: Array2<u8>) -> Self {
        Self { data }
    }

    pub fn width(&self) -> usize {
        self.data.ncols()
    }

    pub fn height(&self) -> usize {
        self.data.nrows()
    }

    pub fn view(&self) -> ArrayView2<'_, u8> {
        self.data.view()
    }
}

/// Dense two-channel flow field.
///
/// Shape is `(height, width, 2)`; channel 0 holds the horizontal and
/// channel 1 the vertical displacement, in pixels.
#[derive(Clone, Debug, PartialEq)]
pub struct FlowField {
    pub data: Array3<f32>,
}

impl Default for FlowField {
    fn default() -> Self {
        Self::zeros(0, 0)
    }
}

impl FlowField {
    pub fn zeros(height: usize, width: usize) -> Self {
        Self {
            data: Array3::zeros((height, width, 2)),
        }
    }

    /// Merge separate x/y component arrays into one field.
    pub fn from_components(ux: &Array2<f32>, uy: &Array2<f32>) -> Result<Self> {
        if ux.dim() != uy.dim() {
            return Err(FlowError::InvalidFlowDimensions {
                width: uy.ncols(),
                height: uy.nrows(),
                channels: 2,
            });
        }
        let (h, w) = ux.dim();
        let mut field = Self::zeros(h, w);
        field.data.index_axis_mut(Axis(2), 0).assign(ux);
        field.data.index_axis_mut(Axis(2), 1).assign(uy);
        Ok(field)
    }

    /// Fill a field with one constant displacement.
    pub fn constant(height: usize, width: usize, dx: f32, dy: f32) -> Self {
        let mut field = Self::zeros(height, width);
        field.data.index_axis_mut(Axis(2), 0).fill(dx);
        field.data.index_axis_mut(Axis(2), 1).fill(dy);
        field
    }

    pub fn width(&self) -> usize {
        self.data.dim().1
    }

    pub fn height(&self) -> usize {
        self.data.dim().0
    }

    pub fn channels(&self) -> usize {
        self.data.dim().2
    }

    /// True when the field has two channels and the given spatial size.
    pub fn matches(&self, height: usize, width: usize) -> bool {
        self.data.dim() == (height, width, 2)
    }

    pub fn ux(&self) -> ArrayView2<'_, f32> {
        self.data.index_axis(Axis(2), 0)
    }

    pub fn uy(&self) -> ArrayView2<'_, f32> {
        self.data.index_axis(Axis(2), 1)
    }

    /// Flow vector at `(row, col)` as `(dx, dy)`.
    pub fn at(&self, row: usize, col: usize) -> (f32, f32) {
        (self.data[[row, col, 0]], self.data[[row, col, 1]])
    }

    /// Summary statistics over every vector in the field.
    pub fn stats(&self) -> FlowStats {
        let count = self.width() * self.height();
        if count == 0 || self.channels() != 2 {
            return FlowStats::default();
        }

        let mut sum_dx = 0.0f64;
        let mut sum_dy = 0.0f64;
        let mut sum_mag = 0.0f64;
        let mut max_mag = 0.0f64;
        for (&dx, &dy) in self.ux().iter().zip(self.uy().iter()) {
            let mag = ((dx as f64).powi(2) + (dy as f64).powi(2)).sqrt();
            sum_dx += dx as f64;
            sum_dy += dy as f64;
            sum_mag += mag;
            max_mag = max_mag.max(mag);
        }

        let n = count as f64;
        FlowStats {
            mean_dx: sum_dx / n,
            mean_dy: sum_dy / n,
            mean_magnitude: sum_mag / n,
            max_magnitude: max_mag,
        }
    }
}

/// Aggregate statistics of a flow field.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FlowStats {
    pub mean_dx: f64,
    pub mean_dy: f64,
    pub mean_magnitude: f64,
    pub max_magnitude: f64,
}
