pub mod flo;
pub mod image_io;

pub use flo::{load_flo, save_flo};
pub use image_io::{flow_to_rgb, load_image, save_flow_visualization, save_image};
