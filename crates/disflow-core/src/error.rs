use thiserror::Error;

#[derive(Error, Debug)]
pub enum FlowError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image format error: {0}")]
    ImageError(#[from] image::ImageError),

    #[error("Empty input image")]
    EmptyImage,

    #[error("Input frames differ in size: {first_width}x{first_height} vs {second_width}x{second_height}")]
    SizeMismatch {
        first_width: usize,
        first_height: usize,
        second_width: usize,
        second_height: usize,
    },

    #[error("Input image storage is not contiguous")]
    NonContiguous,

    #[error("The input image must have either width or height >= 12 (got {width}x{height})")]
    ImageTooSmall { width: usize, height: usize },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid flow file: {0}")]
    InvalidFlowFile(String),

    #[error("Invalid flow dimensions: {width}x{height}x{channels}")]
    InvalidFlowDimensions {
        width: usize,
        height: usize,
        channels: usize,
    },
}

pub type Result<T> = std::result::Result<T, FlowError>;
