//! Dilated 3-tap convolution fused with ReLU, for 2D and 3D tensors with
//! reflective boundaries.
//!
//! The kernels live in `dilconv_cpu_kernels`. This crate validates tensor
//! arguments, dispatches to the compiled variant for the spatial rank and
//! dtype, and adapts the stateless entry points to a differentiable operator.

pub mod be_cpu;
pub mod dispatch;
pub mod error;
pub mod gradient;
pub mod layer;
pub mod op;
pub mod prelude;
pub mod tensor;
pub mod types;
pub mod validate;

pub use dilconv_cpu_kernels::LaunchConfig;
