//! I/O layer: `readers` for the RGB photograph and its depth map, and
//! `writers` for PNG/JPEG/TIFF outputs and the JSON metadata sidecar.
pub mod readers;
pub use readers::{read_depth_map, read_rgb_image};

pub mod writers;
