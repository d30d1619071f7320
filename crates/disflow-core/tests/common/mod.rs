#![allow(dead_code)]

use ndarray::Array2;

use disflow_core::frame::FlowField;

/// Smooth, well-textured intensity at a continuous position.
///
/// Stays within roughly [33, 223], leaving headroom for brightness offsets.
pub fn texture_value(x: f32, y: f32) -> f32 {
    128.0
        + 45.0 * (0.35 * x).sin() * (0.27 * y).cos()
        + 35.0 * (0.19 * (x + y)).sin()
        + 15.0 * (0.11 * x - 0.23 * y).cos()
}

/// Textured 8-bit test image of `h x w`.
pub fn textured(h: usize, w: usize) -> Array2<u8> {
    textured_shifted(h, w, 0.0, 0.0)
}

/// The textured image moved by `(dx, dy)`: `out(x + dx, y + dy) = textured(x, y)`.
pub fn textured_shifted(h: usize, w: usize, dx: f32, dy: f32) -> Array2<u8> {
    Array2::from_shape_fn((h, w), |(r, c)| {
        texture_value(c as f32 - dx, r as f32 - dy).round().clamp(0.0, 255.0) as u8
    })
}

/// Add a constant to every pixel, saturating.
pub fn brighten(img: &Array2<u8>, offset: i16) -> Array2<u8> {
    img.mapv(|v| (v as i16 + offset).clamp(0, 255) as u8)
}

/// Horizontal ramp `value = col * step`.
pub fn ramp(h: usize, w: usize, step: u8) -> Array2<u8> {
    Array2::from_shape_fn((h, w), |(_, c)| (c as u32 * step as u32).min(255) as u8)
}

/// RMS end-point error against a constant `(dx, dy)`, ignoring a band of
/// `border` pixels on every side.
pub fn rms_error(flow: &FlowField, dx: f32, dy: f32, border: usize) -> f32 {
    let (h, w) = (flow.height(), flow.width());
    let mut sum = 0.0f64;
    let mut count = 0usize;
    for row in border..h - border {
        for col in border..w - border {
            let (fx, fy) = flow.at(row, col);
            let ex = (fx - dx) as f64;
            let ey = (fy - dy) as f64;
            sum += ex * ex + ey * ey;
            count += 1;
        }
    }
    (sum / count as f64).sqrt() as f32
}

/// Largest absolute component anywhere in the field.
pub fn max_abs_component(flow: &FlowField) -> f32 {
    flow.data.iter().fold(0.0f32, |m, v| m.max(v.abs()))
}
