#![allow(clippy::needless_range_loop)]
#![allow(clippy::too_many_arguments)]

pub mod activation;
pub mod conv;
pub mod float;
pub mod geometry;
pub mod macros;
pub mod ops_conv;
pub mod reflect;

// Re-export the Kernel type
pub use macros::Kernel;

pub use activation::*;
pub use float::KernelFloat;
pub use geometry::ConvGeometry;
pub use ops_conv::*;
pub use reflect::*;
