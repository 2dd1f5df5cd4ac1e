//! One entry point per direction.
//!
//! Each entry point validates its arguments, picks the compiled kernel
//! variant for (spatial rank, activation, dtype) and launches it on the CPU
//! device pool. Results land in caller-owned buffers; the `_into` forms take
//! that buffer as an argument, the others allocate it.
//!
//! Every result buffer is overwritten, so gradient buffers never need to be
//! zeroed between calls.

use crate::{
    be_cpu::{device::CpuDevice, storage::TensorElement},
    error::{DilconvError, DilconvResult},
    op::{Activation, ConvOp},
    tensor::Tensor,
    types::DType,
    validate::{
        validate_activation_mask, validate_backward_bias, validate_backward_input, validate_backward_kernel,
        validate_destination, validate_forward, ConvProblem, ProblemGeometry,
    },
};
use dilconv_cpu_kernels::{
    call_ops_conv, call_ops_conv_grad_bias, call_ops_conv_grad_input, call_ops_conv_grad_weight, call_ops_relu_mask,
    Kernel, KernelFloat, LaunchConfig,
};
use half::{bf16, f16};
use log::debug;

/// Per-dtype variants of one kernel, ordered bf16, f16, f32, f64.
macro_rules! variants {
    ($name:ident) => {
        [
            dilconv_cpu_kernels::$name::BF16,
            dilconv_cpu_kernels::$name::F16,
            dilconv_cpu_kernels::$name::F32,
            dilconv_cpu_kernels::$name::F64,
        ]
    };
}

/// Runs a typed launch function for the problem's dtype.
macro_rules! float_dispatch {
    ($problem:expr, $func:ident($($arg:expr),* $(,)?)) => {
        match $problem.dtype {
            DType::BF16 => $func::<bf16>($($arg),*),
            DType::F16 => $func::<f16>($($arg),*),
            DType::F32 => $func::<f32>($($arg),*),
            DType::F64 => $func::<f64>($($arg),*),
            dtype => Err(DilconvError::UnsupportedDTypeForOp { dtype, op: $problem.op }),
        }
    };
}

fn select(problem: &ConvProblem, variants: [Kernel; 4]) -> DilconvResult<Kernel> {
    let index = match problem.dtype {
        DType::BF16 => 0,
        DType::F16 => 1,
        DType::F32 => 2,
        DType::F64 => 3,
        dtype => return Err(DilconvError::UnsupportedDTypeForOp { dtype, op: problem.op }),
    };
    Ok(variants[index])
}

fn log_launch(problem: &ConvProblem, kernel: Kernel) {
    debug!(
        "{}: kernel={} input={} output={} dilation={}",
        problem.op,
        kernel,
        problem.input_shape(),
        problem.output_shape(),
        problem.dilation()
    );
}

// ===== Forward =====

/// Fused convolution + `activation`, written into `output`.
///
/// `output` must already have shape `[batch, out_channels, *spatial]` and the
/// dtype of the other arguments; its prior content is discarded.
pub fn conv_forward(
    input: &Tensor,
    kernel: &Tensor,
    bias: &Tensor,
    output: &mut Tensor,
    dilation: usize,
    activation: Activation,
) -> DilconvResult<()> {
    let problem = validate_forward(input, kernel, bias, output, dilation)?;
    let variants = match (problem.geometry, activation) {
        (ProblemGeometry::D2(_), Activation::Identity) => variants!(conv2d),
        (ProblemGeometry::D2(_), Activation::Relu) => variants!(conv2d_relu),
        (ProblemGeometry::D3(_), Activation::Identity) => variants!(conv3d),
        (ProblemGeometry::D3(_), Activation::Relu) => variants!(conv3d_relu),
    };
    let kernel_name = select(&problem, variants)?;
    log_launch(&problem, kernel_name);

    float_dispatch!(problem, forward_typed(kernel_name, &problem, input, kernel, bias, output))
}

/// Fused convolution + ReLU, written into `output`.
pub fn conv_relu_forward(
    input: &Tensor,
    kernel: &Tensor,
    bias: &Tensor,
    output: &mut Tensor,
    dilation: usize,
) -> DilconvResult<()> {
    conv_forward(input, kernel, bias, output, dilation, Activation::Relu)
}

fn forward_typed<T: KernelFloat + TensorElement>(
    kernel_name: Kernel,
    problem: &ConvProblem,
    input: &Tensor,
    kernel: &Tensor,
    bias: &Tensor,
    output: &mut Tensor,
) -> DilconvResult<()> {
    let metadata = problem.metadata(problem.output_shape().size());
    let config = LaunchConfig::from_env();
    let (x, k, b) = (input.as_slice::<T>()?, kernel.as_slice::<T>()?, bias.as_slice::<T>()?);
    let y = output.as_mut_slice::<T>()?;

    CpuDevice::install(|| call_ops_conv(kernel_name, x, k, b, y, &metadata, &config))?;
    Ok(())
}

// ===== Backward wrt input =====

/// Gradient with respect to `input`, given an already masked upstream
/// gradient.
pub fn conv_backward_input(
    input: &Tensor,
    kernel: &Tensor,
    grad_output: &Tensor,
    dilation: usize,
) -> DilconvResult<Tensor> {
    let problem = validate_backward_input(input, kernel, grad_output, dilation)?;
    let mut grad_input = Tensor::zeros(problem.input_shape(), problem.dtype)?.with_device(problem.device);
    launch_backward_input(&problem, kernel, grad_output, &mut grad_input)?;
    Ok(grad_input)
}

/// As [`conv_backward_input`], overwriting a caller-provided `grad_input`.
pub fn conv_backward_input_into(
    input: &Tensor,
    kernel: &Tensor,
    grad_output: &Tensor,
    grad_input: &mut Tensor,
    dilation: usize,
) -> DilconvResult<()> {
    let problem = validate_backward_input(input, kernel, grad_output, dilation)?;
    validate_destination(&problem, "grad_input", grad_input, &problem.input_shape())?;
    launch_backward_input(&problem, kernel, grad_output, grad_input)
}

fn launch_backward_input(
    problem: &ConvProblem,
    kernel: &Tensor,
    grad_output: &Tensor,
    grad_input: &mut Tensor,
) -> DilconvResult<()> {
    let variants = match problem.geometry {
        ProblemGeometry::D2(_) => variants!(conv2d_backward_input),
        ProblemGeometry::D3(_) => variants!(conv3d_backward_input),
    };
    let kernel_name = select(problem, variants)?;
    log_launch(problem, kernel_name);

    float_dispatch!(problem, backward_input_typed(kernel_name, problem, kernel, grad_output, grad_input))
}

fn backward_input_typed<T: KernelFloat + TensorElement>(
    kernel_name: Kernel,
    problem: &ConvProblem,
    kernel: &Tensor,
    grad_output: &Tensor,
    grad_input: &mut Tensor,
) -> DilconvResult<()> {
    let metadata = problem.metadata(problem.input_shape().size());
    let config = LaunchConfig::from_env();
    let (k, dy) = (kernel.as_slice::<T>()?, grad_output.as_slice::<T>()?);
    let dx = grad_input.as_mut_slice::<T>()?;

    CpuDevice::install(|| call_ops_conv_grad_input(kernel_name, k, dy, dx, &metadata, &config))?;
    Ok(())
}

// ===== Backward wrt kernel =====

/// Gradient with respect to the kernel weights, shape
/// `[out_channels, in_channels, 3, ..]`.
pub fn conv_backward_kernel(input: &Tensor, grad_output: &Tensor, dilation: usize) -> DilconvResult<Tensor> {
    let problem = validate_backward_kernel(input, grad_output, dilation)?;
    let mut grad_kernel = Tensor::zeros(problem.weight_shape(), problem.dtype)?.with_device(problem.device);
    launch_backward_kernel(&problem, input, grad_output, &mut grad_kernel)?;
    Ok(grad_kernel)
}

/// As [`conv_backward_kernel`], overwriting a caller-provided `grad_kernel`.
pub fn conv_backward_kernel_into(
    input: &Tensor,
    grad_output: &Tensor,
    grad_kernel: &mut Tensor,
    dilation: usize,
) -> DilconvResult<()> {
    let problem = validate_backward_kernel(input, grad_output, dilation)?;
    validate_destination(&problem, "grad_kernel", grad_kernel, &problem.weight_shape())?;
    launch_backward_kernel(&problem, input, grad_output, grad_kernel)
}

fn launch_backward_kernel(
    problem: &ConvProblem,
    input: &Tensor,
    grad_output: &Tensor,
    grad_kernel: &mut Tensor,
) -> DilconvResult<()> {
    let variants = match problem.geometry {
        ProblemGeometry::D2(_) => variants!(conv2d_backward_kernel),
        ProblemGeometry::D3(_) => variants!(conv3d_backward_kernel),
    };
    let kernel_name = select(problem, variants)?;
    log_launch(problem, kernel_name);

    float_dispatch!(problem, backward_kernel_typed(kernel_name, problem, input, grad_output, grad_kernel))
}

fn backward_kernel_typed<T: KernelFloat + TensorElement>(
    kernel_name: Kernel,
    problem: &ConvProblem,
    input: &Tensor,
    grad_output: &Tensor,
    grad_kernel: &mut Tensor,
) -> DilconvResult<()> {
    let metadata = problem.metadata(problem.weight_shape().size());
    let config = LaunchConfig::from_env();
    let (x, dy) = (input.as_slice::<T>()?, grad_output.as_slice::<T>()?);
    let dk = grad_kernel.as_mut_slice::<T>()?;

    CpuDevice::install(|| call_ops_conv_grad_weight(kernel_name, x, dy, dk, &metadata, &config))?;
    Ok(())
}

// ===== Backward wrt bias =====

/// Gradient with respect to the bias, shape `[out_channels]`.
pub fn conv_backward_bias(grad_output: &Tensor, dilation: usize) -> DilconvResult<Tensor> {
    let problem = validate_backward_bias(grad_output, dilation)?;
    let mut grad_bias = Tensor::zeros(problem.bias_shape(), problem.dtype)?.with_device(problem.device);
    launch_backward_bias(&problem, grad_output, &mut grad_bias)?;
    Ok(grad_bias)
}

/// As [`conv_backward_bias`], overwriting a caller-provided `grad_bias`.
pub fn conv_backward_bias_into(grad_output: &Tensor, grad_bias: &mut Tensor, dilation: usize) -> DilconvResult<()> {
    let problem = validate_backward_bias(grad_output, dilation)?;
    validate_destination(&problem, "grad_bias", grad_bias, &problem.bias_shape())?;
    launch_backward_bias(&problem, grad_output, grad_bias)
}

fn launch_backward_bias(problem: &ConvProblem, grad_output: &Tensor, grad_bias: &mut Tensor) -> DilconvResult<()> {
    let variants = match problem.geometry {
        ProblemGeometry::D2(_) => variants!(conv2d_backward_bias),
        ProblemGeometry::D3(_) => variants!(conv3d_backward_bias),
    };
    let kernel_name = select(problem, variants)?;
    log_launch(problem, kernel_name);

    float_dispatch!(problem, backward_bias_typed(kernel_name, problem, grad_output, grad_bias))
}

fn backward_bias_typed<T: KernelFloat + TensorElement>(
    kernel_name: Kernel,
    problem: &ConvProblem,
    grad_output: &Tensor,
    grad_bias: &mut Tensor,
) -> DilconvResult<()> {
    let metadata = problem.metadata(problem.out_channels());
    let config = LaunchConfig::from_env();
    let dy = grad_output.as_slice::<T>()?;
    let db = grad_bias.as_mut_slice::<T>()?;

    CpuDevice::install(|| call_ops_conv_grad_bias(kernel_name, dy, db, &metadata, &config))?;
    Ok(())
}

// ===== Activation mask =====

/// Upstream gradient with the ReLU derivative applied: `grad_output` where
/// the forward `output` is positive, zero elsewhere.
pub fn relu_backward_mask(output: &Tensor, grad_output: &Tensor) -> DilconvResult<Tensor> {
    let mut masked = Tensor::zeros(output.shape().clone(), output.dtype())?.with_device(output.device());
    relu_backward_mask_into(output, grad_output, &mut masked)?;
    Ok(masked)
}

/// As [`relu_backward_mask`], overwriting a caller-provided `masked`.
pub fn relu_backward_mask_into(output: &Tensor, grad_output: &Tensor, masked: &mut Tensor) -> DilconvResult<()> {
    let dtype = validate_activation_mask(output, grad_output, masked)?;
    let op = ConvOp::ActivationMask;
    debug!("{}: shape={} dtype={}", op, output.shape(), dtype);

    match dtype {
        DType::BF16 => mask_typed::<bf16>(dilconv_cpu_kernels::relu_mask::BF16, output, grad_output, masked),
        DType::F16 => mask_typed::<f16>(dilconv_cpu_kernels::relu_mask::F16, output, grad_output, masked),
        DType::F32 => mask_typed::<f32>(dilconv_cpu_kernels::relu_mask::F32, output, grad_output, masked),
        DType::F64 => mask_typed::<f64>(dilconv_cpu_kernels::relu_mask::F64, output, grad_output, masked),
        dtype => Err(DilconvError::UnsupportedDTypeForOp { dtype, op }),
    }
}

fn mask_typed<T: KernelFloat + TensorElement>(
    kernel_name: Kernel,
    output: &Tensor,
    grad_output: &Tensor,
    masked: &mut Tensor,
) -> DilconvResult<()> {
    let metadata = [output.size()];
    let config = LaunchConfig::from_env();
    let (y, dy) = (output.as_slice::<T>()?, grad_output.as_slice::<T>()?);
    let out = masked.as_mut_slice::<T>()?;

    CpuDevice::install(|| call_ops_relu_mask(kernel_name, y, dy, out, &metadata, &config))?;
    Ok(())
}
