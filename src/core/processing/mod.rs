//! Restoration stages. Each stage is a free function over `ndarray` grids;
//! [`pipeline::run_pipeline`] wires them together.
pub mod attenuation;
pub mod backscatter;
pub mod denoise;
pub mod depth;
pub mod filters;
pub mod fit;
pub mod illumination;
pub mod neighborhood;
pub mod pipeline;
pub mod reconstruct;
pub mod resize;
