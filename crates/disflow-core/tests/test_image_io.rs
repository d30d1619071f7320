mod common;

use std::io::Cursor;

use tempfile::TempDir;

use disflow_core::error::FlowError;
use disflow_core::frame::{FlowField, Frame};
use disflow_core::io::flo::{read_flo, write_flo, FLO_TAG};
use disflow_core::io::{flow_to_rgb, load_flo, load_image, save_flo, save_flow_visualization, save_image};

use common::textured;

#[test]
fn test_png_gray_roundtrip() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("frame.png");
    let frame = Frame::new(textured(21, 34));

    save_image(&frame, &path).unwrap();
    let loaded = load_image(&path).unwrap();
    assert_eq!(loaded, frame);
}

#[test]
fn test_load_color_image_converts_to_gray() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("color.png");
    let img = image::RgbImage::from_pixel(5, 4, image::Rgb([200, 200, 200]));
    img.save(&path).unwrap();

    let frame = load_image(&path).unwrap();
    assert_eq!((frame.height(), frame.width()), (4, 5));
    assert!(frame.data.iter().all(|&v| v == 200));
}

#[test]
fn test_load_missing_file_fails() {
    let dir = TempDir::new().unwrap();
    assert!(load_image(&dir.path().join("missing.png")).is_err());
}

#[test]
fn test_flow_visualization_colours() {
    let mut flow = FlowField::zeros(2, 2);
    flow.data[[0, 1, 0]] = 2.0; // pointing right: red
    flow.data[[1, 0, 1]] = 1.0; // pointing down, half magnitude
    let rgb = flow_to_rgb(&flow, None);

    assert_eq!(rgb.get_pixel(0, 0).0, [0, 0, 0]);
    assert_eq!(rgb.get_pixel(1, 0).0, [255, 0, 0]);
    // Hue 90 degrees at value 0.5.
    assert_eq!(rgb.get_pixel(0, 1).0, [64, 128, 0]);

    let dir = TempDir::new().unwrap();
    let path = dir.path().join("flow.png");
    save_flow_visualization(&flow, &path, Some(4.0)).unwrap();
    assert!(path.exists());
}

#[test]
fn test_flo_roundtrip() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("flow.flo");
    let mut flow = FlowField::zeros(3, 4);
    for ((r, c, ch), v) in flow.data.indexed_iter_mut() {
        *v = (r * 10 + c) as f32 * if ch == 0 { 0.5 } else { -0.25 };
    }

    save_flo(&flow, &path).unwrap();
    assert_eq!(std::fs::metadata(&path).unwrap().len(), 12 + 3 * 4 * 8);
    let back = load_flo(&path).unwrap();
    assert_eq!(back, flow);
}

#[test]
fn test_flo_header_layout() {
    let flow = FlowField::constant(1, 2, 1.0, -1.0);
    let mut buf = Vec::new();
    write_flo(&flow, &mut buf).unwrap();

    assert_eq!(&buf[0..4], b"PIEH");
    assert_eq!(&buf[0..4], &FLO_TAG.to_le_bytes());
    assert_eq!(&buf[4..8], &2i32.to_le_bytes());
    assert_eq!(&buf[8..12], &1i32.to_le_bytes());
    assert_eq!(&buf[12..16], &1.0f32.to_le_bytes());
    assert_eq!(&buf[16..20], &(-1.0f32).to_le_bytes());
}

#[test]
fn test_flo_rejects_bad_tag() {
    let mut buf = Vec::new();
    buf.extend_from_slice(&1.0f32.to_le_bytes());
    buf.extend_from_slice(&1i32.to_le_bytes());
    buf.extend_from_slice(&1i32.to_le_bytes());
    let err = read_flo(&mut Cursor::new(buf)).unwrap_err();
    assert!(matches!(err, FlowError::InvalidFlowFile(_)));
}

#[test]
fn test_flo_truncated_data_is_io_error() {
    let mut buf = Vec::new();
    buf.extend_from_slice(&FLO_TAG.to_le_bytes());
    buf.extend_from_slice(&4i32.to_le_bytes());
    buf.extend_from_slice(&4i32.to_le_bytes());
    buf.extend_from_slice(&[0u8; 10]);
    let err = read_flo(&mut Cursor::new(buf)).unwrap_err();
    assert!(matches!(err, FlowError::Io(_)));
}
