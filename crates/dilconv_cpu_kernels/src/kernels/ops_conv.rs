//! Kernel entry points keyed by [`Kernel`] name.

use crate::{
    config::LaunchConfig,
    error::{CpuKernelError, Result},
    kernels::{
        activation::Activation,
        conv::{
            activation_mask_map, conv_backward_bias_map, conv_backward_input_map, conv_backward_kernel_map,
            conv_forward_map,
        },
        float::KernelFloat,
        geometry::ConvGeometry,
        macros::{ops, Kernel},
    },
};

ops!(
    conv2d,
    conv3d,
    conv2d_relu,
    conv3d_relu,
    conv2d_backward_input,
    conv3d_backward_input,
    conv2d_backward_kernel,
    conv3d_backward_kernel,
    conv2d_backward_bias,
    conv3d_backward_bias,
    relu_mask
);

fn check_dtype<T: KernelFloat>(kernel: Kernel) -> Result<()> {
    if kernel.dtype_suffix() != T::SUFFIX {
        return Err(CpuKernelError::InvalidKernel(format!(
            "{} cannot run on {} data",
            kernel,
            T::SUFFIX
        )));
    }
    Ok(())
}

fn geometry<const N: usize>(
    kernel: Kernel,
    metadata: &[usize],
    num_els: fn(&ConvGeometry<N>) -> usize,
) -> Result<ConvGeometry<N>> {
    let geom = ConvGeometry::<N>::from_metadata(metadata)?;
    let expected = num_els(&geom);
    if metadata[0] != expected {
        return Err(CpuKernelError::InvalidInput(format!(
            "{}: num_els is {}, geometry implies {}",
            kernel, metadata[0], expected
        )));
    }
    Ok(geom)
}

fn unsupported(kernel: Kernel, family: &str) -> CpuKernelError {
    CpuKernelError::InvalidKernel(format!("{} is not a {} kernel", kernel, family))
}

/// Execute a forward convolution (+ activation)
///
/// Writes every element of `output`; prior content is discarded.
///
/// # Arguments
/// * `kernel` - The kernel to execute (e.g., conv3d_relu::F32)
/// * `input` - Input tensor data `[batch, in_channels, *spatial]`
/// * `weight` - Weights `[out_channels, in_channels, 3, ..]`
/// * `bias` - Bias `[out_channels]`
/// * `output` - Output buffer `[batch, out_channels, *spatial]`
/// * `metadata` - `[num_els, batch, in_channels, out_channels, *spatial, dilation]`,
///   with `num_els` the number of output elements
/// * `config` - Launch configuration
pub fn call_ops_conv<T: KernelFloat>(
    kernel: Kernel,
    input: &[T],
    weight: &[T],
    bias: &[T],
    output: &mut [T],
    metadata: &[usize],
    config: &LaunchConfig,
) -> Result<()> {
    check_dtype::<T>(kernel)?;

    match kernel.op_name() {
        "conv2d" => {
            let geom = geometry::<2>(kernel, metadata, ConvGeometry::output_len)?;
            conv_forward_map(&geom, input, weight, bias, output, Activation::Identity, config)
        },
        "conv3d" => {
            let geom = geometry::<3>(kernel, metadata, ConvGeometry::output_len)?;
            conv_forward_map(&geom, input, weight, bias, output, Activation::Identity, config)
        },
        "conv2d_relu" => {
            let geom = geometry::<2>(kernel, metadata, ConvGeometry::output_len)?;
            conv_forward_map(&geom, input, weight, bias, output, Activation::Relu, config)
        },
        "conv3d_relu" => {
            let geom = geometry::<3>(kernel, metadata, ConvGeometry::output_len)?;
            conv_forward_map(&geom, input, weight, bias, output, Activation::Relu, config)
        },
        _ => Err(unsupported(kernel, "forward conv")),
    }
}

/// Execute a convolution input-gradient operation
///
/// # Arguments
/// * `kernel` - The kernel to execute (e.g., conv2d_backward_input::F64)
/// * `weight` - Weights `[out_channels, in_channels, 3, ..]`
/// * `grad_output` - Masked upstream gradient `[batch, out_channels, *spatial]`
/// * `grad_input` - Destination `[batch, in_channels, *spatial]`, overwritten
/// * `metadata` - Geometry, with `num_els` the number of input elements
/// * `config` - Launch configuration
pub fn call_ops_conv_grad_input<T: KernelFloat>(
    kernel: Kernel,
    weight: &[T],
    grad_output: &[T],
    grad_input: &mut [T],
    metadata: &[usize],
    config: &LaunchConfig,
) -> Result<()> {
    check_dtype::<T>(kernel)?;

    match kernel.op_name() {
        "conv2d_backward_input" => {
            let geom = geometry::<2>(kernel, metadata, ConvGeometry::input_len)?;
            conv_backward_input_map(&geom, weight, grad_output, grad_input, config)
        },
        "conv3d_backward_input" => {
            let geom = geometry::<3>(kernel, metadata, ConvGeometry::input_len)?;
            conv_backward_input_map(&geom, weight, grad_output, grad_input, config)
        },
        _ => Err(unsupported(kernel, "input-gradient")),
    }
}

/// Execute a convolution weight-gradient operation
///
/// # Arguments
/// * `kernel` - The kernel to execute (e.g., conv3d_backward_kernel::F32)
/// * `input` - Forward input `[batch, in_channels, *spatial]`
/// * `grad_output` - Masked upstream gradient `[batch, out_channels, *spatial]`
/// * `grad_weight` - Destination `[out_channels, in_channels, 3, ..]`, overwritten
/// * `metadata` - Geometry, with `num_els` the number of weight elements
/// * `config` - Launch configuration
pub fn call_ops_conv_grad_weight<T: KernelFloat>(
    kernel: Kernel,
    input: &[T],
    grad_output: &[T],
    grad_weight: &mut [T],
    metadata: &[usize],
    config: &LaunchConfig,
) -> Result<()> {
    check_dtype::<T>(kernel)?;

    match kernel.op_name() {
        "conv2d_backward_kernel" => {
            let geom = geometry::<2>(kernel, metadata, ConvGeometry::weight_len)?;
            conv_backward_kernel_map(&geom, input, grad_output, grad_weight, config)
        },
        "conv3d_backward_kernel" => {
            let geom = geometry::<3>(kernel, metadata, ConvGeometry::weight_len)?;
            conv_backward_kernel_map(&geom, input, grad_output, grad_weight, config)
        },
        _ => Err(unsupported(kernel, "weight-gradient")),
    }
}

/// Execute a convolution bias-gradient operation
///
/// `metadata` uses the conv layout with `num_els = out_channels`; the
/// `in_channels` entry is ignored.
pub fn call_ops_conv_grad_bias<T: KernelFloat>(
    kernel: Kernel,
    grad_output: &[T],
    grad_bias: &mut [T],
    metadata: &[usize],
    config: &LaunchConfig,
) -> Result<()> {
    check_dtype::<T>(kernel)?;

    match kernel.op_name() {
        "conv2d_backward_bias" => {
            let geom = geometry::<2>(kernel, metadata, |g| g.out_channels)?;
            conv_backward_bias_map(&geom, grad_output, grad_bias, config)
        },
        "conv3d_backward_bias" => {
            let geom = geometry::<3>(kernel, metadata, |g| g.out_channels)?;
            conv_backward_bias_map(&geom, grad_output, grad_bias, config)
        },
        _ => Err(unsupported(kernel, "bias-gradient")),
    }
}

/// Apply the ReLU derivative mask to an upstream gradient
///
/// `metadata` is `[num_els]`.
pub fn call_ops_relu_mask<T: KernelFloat>(
    kernel: Kernel,
    output: &[T],
    grad_output: &[T],
    masked: &mut [T],
    metadata: &[usize],
    config: &LaunchConfig,
) -> Result<()> {
    check_dtype::<T>(kernel)?;

    if kernel.op_name() != "relu_mask" {
        return Err(unsupported(kernel, "mask"));
    }
    match metadata {
        [num_els] if *num_els == output.len() => {},
        _ => {
            return Err(CpuKernelError::InvalidInput(format!(
                "{}: metadata must be [num_els] with num_els = {}",
                kernel,
                output.len()
            )))
        },
    }

    activation_mask_map(output, grad_output, masked, Activation::Relu, config)
}
