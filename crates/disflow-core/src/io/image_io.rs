use std::path::Path;

use image::{GrayImage, ImageFormat, Luma, Rgb, RgbImage};
use ndarray::Array2;

use crate::error::Result;
use crate::frame::{FlowField, Frame};

/// Load an image file as 8-bit grayscale. Colour inputs are converted to luma.
pub fn load_image(path: &Path) -> Result<Frame> {
    let img = image::open(path)?;
    let gray = img.to_luma8();
    let (w, h) = gray.dimensions();
    let mut data = Array2::<u8>::zeros((h as usize, w as usize));

    for row in 0..h as usize {
        for col in 0..w as usize {
            data[[row, col]] = gray.get_pixel(col as u32, row as u32).0[0];
        }
    }

    Ok(Frame::new(data))
}

/// Save a frame as 8-bit grayscale; the format follows the file extension.
pub fn save_image(frame: &Frame, path: &Path) -> Result<()> {
    let mut img = GrayImage::new(frame.width() as u32, frame.height() as u32);
    for ((row, col), &val) in frame.data.indexed_iter() {
        img.put_pixel(col as u32, row as u32, Luma([val]));
    }
    img.save(path)?;
    Ok(())
}

/// HSV with full saturation to RGB. `hue` in degrees, `value` in [0, 1].
fn hsv_to_rgb(hue: f32, value: f32) -> [u8; 3] {
    let h = hue.rem_euclid(360.0) / 60.0;
    let sector = h.floor();
    let f = h - sector;
    let (p, q, t) = (0.0, value * (1.0 - f), value * f);
    let (r, g, b) = match sector as u32 {
        0 => (value, t, p),
        1 => (q, value, p),
        2 => (p, value, t),
        3 => (p, q, value),
        4 => (t, p, value),
        _ => (value, p, q),
    };
    let to_u8 = |c: f32| (c.clamp(0.0, 1.0) * 255.0).round() as u8;
    [to_u8(r), to_u8(g), to_u8(b)]
}

/// Colour-code a flow field: hue encodes direction, brightness encodes
/// magnitude relative to `max_magnitude` (the field's own maximum when
/// `None`). Zero flow maps to black.
pub fn flow_to_rgb(flow: &FlowField, max_magnitude: Option<f32>) -> RgbImage {
    let (h, w) = (flow.height(), flow.width());
    let scale = max_magnitude
        .unwrap_or_else(|| flow.stats().max_magnitude as f32)
        .max(f32::EPSILON);

    let mut img = RgbImage::new(w as u32, h as u32);
    for row in 0..h {
        for col in 0..w {
            let (dx, dy) = flow.at(row, col);
            let magnitude = dx.hypot(dy);
            let hue = dy.atan2(dx).to_degrees();
            let value = (magnitude / scale).min(1.0);
            img.put_pixel(col as u32, row as u32, Rgb(hsv_to_rgb(hue, value)));
        }
    }
    img
}

/// Write the colour-coded flow as a PNG.
pub fn save_flow_visualization(flow: &FlowField, path: &Path, max_magnitude: Option<f32>) -> Result<()> {
    let img = flow_to_rgb(flow, max_magnitude);
    img.save_with_format(path, ImageFormat::Png)?;
    Ok(())
}
