//! Dilconv CPU Kernels
//!
//! Data-parallel kernels for dilated 3-tap convolution fused with an
//! activation, using reflective boundary extension, plus the backward passes
//! with respect to input, kernel weights and bias.

pub mod config;
mod error;
mod kernels;

pub use config::LaunchConfig;
pub use error::{CpuKernelError, Result};
pub use kernels::*;
