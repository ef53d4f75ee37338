//! # Rendering Module
//!
//! This module turns job files into rasters the printhead can print.
//!
//! ## Modules
//!
//! - [`plan`]: Label geometry and processing parameters
//! - [`rasterize`]: Decode, fit, and reduce to a bilevel PNG
//! - [`dither`]: Thresholding, error diffusion, bit packing

pub mod dither;
pub mod plan;
pub mod rasterize;
