//! Core processing building blocks: pipeline parameters, the restoration
//! stages, resizing and denoising. These are internal primitives consumed by
//! the high-level `api` module.
pub mod params;
pub mod processing;
