//! Prelude module for convenient imports
//!
//! Usage: `use dilconv_core::prelude::*;`

pub use crate::be_cpu::{device::CpuDevice, storage::CpuStorage};
pub use crate::dispatch::{
    conv_backward_bias, conv_backward_bias_into, conv_backward_input, conv_backward_input_into, conv_backward_kernel,
    conv_backward_kernel_into, conv_forward, conv_relu_forward, relu_backward_mask, relu_backward_mask_into,
};
pub use crate::error::{DilconvError, DilconvResult};
pub use crate::gradient::{ConvGradients, ConvReluInPlace, DifferentiableOp};
pub use crate::layer::ConvReluLayer;
pub use crate::op::{Activation, ConvOp};
pub use crate::tensor::Tensor;
pub use crate::types::{DType, Device, Layout, Shape};
