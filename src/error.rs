//! Crate-level error type and `Result` alias for stable, structured error handling.
//! Converts underlying I/O, image codec, and JSON errors, and provides semantic
//! variants for input validation and processing failures. Curve-fit trouble is
//! never reported here: it degrades to a linear model and surfaces as a
//! [`Diagnostic`](crate::core::processing::pipeline::Diagnostic).
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image codec error: {0}")]
    Image(#[from] image::ImageError),

    #[error("TIFF error: {0}")]
    Tiff(#[from] tiff::TiffError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(
        "Image is {}x{} (rows x cols) but depth map is {}x{}",
        image.0, image.1, depth.0, depth.1
    )]
    ShapeMismatch {
        image: (usize, usize),
        depth: (usize, usize),
    },

    #[error("Input image must have 3 color channels, got {channels}")]
    ChannelCount { channels: usize },

    #[error("Input image is empty")]
    EmptyInput,

    #[error("Invalid argument: {arg}={value}")]
    InvalidArgument { arg: &'static str, value: String },

    #[error("Size must be greater than 0, got: {size}")]
    ZeroSize { size: usize },

    #[error("Processing error: {0}")]
    Processing(String),

    #[error("External error: {0}")]
    External(String),
}

impl Error {
    pub fn external<E: std::fmt::Display>(e: E) -> Self {
        Error::External(e.to_string())
    }
}
