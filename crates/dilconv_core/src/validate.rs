//! Precondition gate run before every kernel launch.
//!
//! Checks run in a fixed order: device agreement, dtype agreement, rank,
//! kernel extent, pairwise shapes, dilation, contiguity, then compiled-variant
//! support for the device and dtype. The first violation is returned; nothing
//! is launched.

use crate::{
    error::{DilconvError, DilconvResult},
    op::ConvOp,
    tensor::Tensor,
    types::{DType, Device, Shape},
};
use dilconv_cpu_kernels::{ConvGeometry, TAPS_PER_AXIS};

/// Rank-resolved launch geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProblemGeometry {
    D2(ConvGeometry<2>),
    D3(ConvGeometry<3>),
}

/// A validated launch: every tensor of the call agrees with these values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConvProblem {
    pub op: ConvOp,
    pub geometry: ProblemGeometry,
    pub dtype: DType,
    pub device: Device,
}

impl ConvProblem {
    pub fn spatial_rank(&self) -> usize {
        match self.geometry {
            ProblemGeometry::D2(_) => 2,
            ProblemGeometry::D3(_) => 3,
        }
    }

    pub fn batch(&self) -> usize {
        match self.geometry {
            ProblemGeometry::D2(g) => g.batch,
            ProblemGeometry::D3(g) => g.batch,
        }
    }

    pub fn in_channels(&self) -> usize {
        match self.geometry {
            ProblemGeometry::D2(g) => g.in_channels,
            ProblemGeometry::D3(g) => g.in_channels,
        }
    }

    pub fn out_channels(&self) -> usize {
        match self.geometry {
            ProblemGeometry::D2(g) => g.out_channels,
            ProblemGeometry::D3(g) => g.out_channels,
        }
    }

    pub fn spatial(&self) -> &[usize] {
        match &self.geometry {
            ProblemGeometry::D2(g) => &g.spatial,
            ProblemGeometry::D3(g) => &g.spatial,
        }
    }

    pub fn dilation(&self) -> usize {
        match self.geometry {
            ProblemGeometry::D2(g) => g.dilation,
            ProblemGeometry::D3(g) => g.dilation,
        }
    }

    pub fn input_shape(&self) -> Shape {
        nc_shape(self.batch(), self.in_channels(), self.spatial())
    }

    pub fn output_shape(&self) -> Shape {
        nc_shape(self.batch(), self.out_channels(), self.spatial())
    }

    pub fn weight_shape(&self) -> Shape {
        kernel_shape(self.out_channels(), self.in_channels(), self.spatial_rank())
    }

    pub fn bias_shape(&self) -> Shape {
        Shape::new(&[self.out_channels()])
    }

    /// Launch metadata with `num_els` in front.
    pub fn metadata(&self, num_els: usize) -> Vec<usize> {
        match self.geometry {
            ProblemGeometry::D2(g) => g.to_metadata(num_els),
            ProblemGeometry::D3(g) => g.to_metadata(num_els),
        }
    }
}

fn nc_shape(batch: usize, channels: usize, spatial: &[usize]) -> Shape {
    let mut dims = Vec::with_capacity(2 + spatial.len());
    dims.extend_from_slice(&[batch, channels]);
    dims.extend_from_slice(spatial);
    Shape::from(dims)
}

fn kernel_shape(out_channels: usize, in_channels: usize, rank: usize) -> Shape {
    let mut dims = vec![out_channels, in_channels];
    dims.resize(2 + rank, TAPS_PER_AXIS);
    Shape::from(dims)
}

/// Shared device and dtype of all arguments; the first one is the reference.
fn check_placement(op: ConvOp, args: &[(&'static str, &Tensor)]) -> DilconvResult<(Device, DType)> {
    let (_, first) = args[0];
    let (device, dtype) = (first.device(), first.dtype());
    for &(name, tensor) in &args[1..] {
        if tensor.device() != device {
            return Err(DilconvError::DeviceMismatch {
                op,
                tensor: name,
                expected: device,
                got: tensor.device(),
            });
        }
    }
    for &(name, tensor) in &args[1..] {
        if tensor.dtype() != dtype {
            return Err(DilconvError::DTypeMismatch {
                op,
                tensor: name,
                expected: dtype,
                got: tensor.dtype(),
            });
        }
    }
    Ok((device, dtype))
}

/// Spatial rank implied by an NC-prefixed activation tensor.
fn spatial_rank_of(op: ConvOp, tensor: &Tensor) -> DilconvResult<usize> {
    match tensor.ndim() {
        4 => Ok(2),
        5 => Ok(3),
        ndim => Err(DilconvError::UnsupportedRank {
            op,
            spatial_rank: ndim.saturating_sub(2),
        }),
    }
}

fn check_rank(op: ConvOp, name: &'static str, tensor: &Tensor, expected: usize) -> DilconvResult<()> {
    if tensor.ndim() != expected {
        return Err(DilconvError::RankMismatch {
            op,
            tensor: name,
            expected,
            got: tensor.ndim(),
        });
    }
    Ok(())
}

fn check_shape(op: ConvOp, name: &'static str, tensor: &Tensor, expected: &Shape) -> DilconvResult<()> {
    if tensor.shape() != expected {
        return Err(DilconvError::ShapeMismatch {
            op,
            tensor: name,
            expected: expected.clone(),
            got: tensor.shape().clone(),
        });
    }
    Ok(())
}

fn check_kernel_extent(op: ConvOp, kernel: &Tensor) -> DilconvResult<()> {
    if kernel.shape().trailing(2).iter().any(|&extent| extent != TAPS_PER_AXIS) {
        return Err(DilconvError::UnsupportedKernelSize {
            op,
            got: kernel.shape().clone(),
        });
    }
    Ok(())
}

fn check_spatial(op: ConvOp, name: &'static str, tensor: &Tensor) -> DilconvResult<()> {
    if tensor.shape().trailing(2).contains(&0) {
        return Err(DilconvError::InvalidArgument(format!(
            "{op}: `{name}` has a zero-extent spatial axis {:?}",
            tensor.shape()
        )));
    }
    Ok(())
}

fn check_dilation(op: ConvOp, dilation: usize) -> DilconvResult<()> {
    if dilation == 0 {
        return Err(DilconvError::InvalidDilation { op, dilation });
    }
    Ok(())
}

fn check_contiguous(op: ConvOp, args: &[(&'static str, &Tensor)]) -> DilconvResult<()> {
    for &(name, tensor) in args {
        if !tensor.is_contiguous() {
            return Err(DilconvError::NonContiguous { op, tensor: name });
        }
    }
    Ok(())
}

/// Rejects placements and precisions with no compiled kernel variant.
pub(crate) fn check_support(op: ConvOp, device: Device, dtype: DType) -> DilconvResult<()> {
    if !device.is_cpu() {
        return Err(DilconvError::UnsupportedDevice { op, device });
    }
    if !dtype.is_float() {
        return Err(DilconvError::UnsupportedDTypeForOp { dtype, op });
    }
    Ok(())
}

fn geometry(
    op: ConvOp,
    batch: usize,
    in_channels: usize,
    out_channels: usize,
    spatial: &[usize],
    dilation: usize,
) -> DilconvResult<ProblemGeometry> {
    match *spatial {
        [h, w] => Ok(ProblemGeometry::D2(ConvGeometry {
            batch,
            in_channels,
            out_channels,
            spatial: [h, w],
            dilation,
        })),
        [d, h, w] => Ok(ProblemGeometry::D3(ConvGeometry {
            batch,
            in_channels,
            out_channels,
            spatial: [d, h, w],
            dilation,
        })),
        _ => Err(DilconvError::UnsupportedRank {
            op,
            spatial_rank: spatial.len(),
        }),
    }
}

/// Validates `forward(input, kernel, bias, output, dilation)`.
pub fn validate_forward(
    input: &Tensor,
    kernel: &Tensor,
    bias: &Tensor,
    output: &Tensor,
    dilation: usize,
) -> DilconvResult<ConvProblem> {
    let op = ConvOp::Forward;
    let args = [("input", input), ("kernel", kernel), ("bias", bias), ("output", output)];
    let (device, dtype) = check_placement(op, &args)?;

    let rank = spatial_rank_of(op, input)?;
    check_rank(op, "kernel", kernel, 2 + rank)?;
    check_rank(op, "bias", bias, 1)?;
    check_rank(op, "output", output, 2 + rank)?;
    check_kernel_extent(op, kernel)?;
    check_spatial(op, "input", input)?;

    let dims = input.shape().dims();
    let out_channels = kernel.shape()[0];
    let geometry = geometry(op, dims[0], dims[1], out_channels, &dims[2..], dilation)?;
    let problem = ConvProblem {
        op,
        geometry,
        dtype,
        device,
    };

    check_shape(op, "kernel", kernel, &problem.weight_shape())?;
    check_shape(op, "bias", bias, &problem.bias_shape())?;
    check_shape(op, "output", output, &problem.output_shape())?;
    check_dilation(op, dilation)?;
    check_contiguous(op, &args)?;
    check_support(op, device, dtype)?;
    Ok(problem)
}

/// Validates `backward_input(input, kernel, grad_output, dilation)`.
pub fn validate_backward_input(
    input: &Tensor,
    kernel: &Tensor,
    grad_output: &Tensor,
    dilation: usize,
) -> DilconvResult<ConvProblem> {
    let op = ConvOp::BackwardInput;
    let args = [("input", input), ("kernel", kernel), ("grad_output", grad_output)];
    let (device, dtype) = check_placement(op, &args)?;

    let rank = spatial_rank_of(op, input)?;
    check_rank(op, "kernel", kernel, 2 + rank)?;
    check_rank(op, "grad_output", grad_output, 2 + rank)?;
    check_kernel_extent(op, kernel)?;
    check_spatial(op, "input", input)?;

    let dims = input.shape().dims();
    let out_channels = kernel.shape()[0];
    let geometry = geometry(op, dims[0], dims[1], out_channels, &dims[2..], dilation)?;
    let problem = ConvProblem {
        op,
        geometry,
        dtype,
        device,
    };

    check_shape(op, "kernel", kernel, &problem.weight_shape())?;
    check_shape(op, "grad_output", grad_output, &problem.output_shape())?;
    check_dilation(op, dilation)?;
    check_contiguous(op, &args)?;
    check_support(op, device, dtype)?;
    Ok(problem)
}

/// Validates `backward_kernel(input, grad_output, dilation)`.
pub fn validate_backward_kernel(input: &Tensor, grad_output: &Tensor, dilation: usize) -> DilconvResult<ConvProblem> {
    let op = ConvOp::BackwardKernel;
    let args = [("input", input), ("grad_output", grad_output)];
    let (device, dtype) = check_placement(op, &args)?;

    let rank = spatial_rank_of(op, input)?;
    check_rank(op, "grad_output", grad_output, 2 + rank)?;
    check_spatial(op, "input", input)?;

    let dims = input.shape().dims();
    let out_channels = grad_output.shape()[1];
    let geometry = geometry(op, dims[0], dims[1], out_channels, &dims[2..], dilation)?;
    let problem = ConvProblem {
        op,
        geometry,
        dtype,
        device,
    };

    check_shape(op, "grad_output", grad_output, &problem.output_shape())?;
    check_dilation(op, dilation)?;
    check_contiguous(op, &args)?;
    check_support(op, device, dtype)?;
    Ok(problem)
}

/// Validates `backward_bias(grad_output, dilation)`.
///
/// The bias gradient does not depend on the dilation, but it is still
/// checked so every entry point accepts the same arguments.
pub fn validate_backward_bias(grad_output: &Tensor, dilation: usize) -> DilconvResult<ConvProblem> {
    let op = ConvOp::BackwardBias;
    let args = [("grad_output", grad_output)];
    let (device, dtype) = check_placement(op, &args)?;

    spatial_rank_of(op, grad_output)?;
    check_spatial(op, "grad_output", grad_output)?;

    let dims = grad_output.shape().dims();
    // in_channels plays no part in the bias reduction
    let geometry = geometry(op, dims[0], 1, dims[1], &dims[2..], dilation)?;
    let problem = ConvProblem {
        op,
        geometry,
        dtype,
        device,
    };

    check_dilation(op, dilation)?;
    check_contiguous(op, &args)?;
    check_support(op, device, dtype)?;
    Ok(problem)
}

/// Validates a caller-provided result buffer against a validated problem.
pub fn validate_destination(
    problem: &ConvProblem,
    name: &'static str,
    destination: &Tensor,
    expected: &Shape,
) -> DilconvResult<()> {
    let op = problem.op;
    if destination.device() != problem.device {
        return Err(DilconvError::DeviceMismatch {
            op,
            tensor: name,
            expected: problem.device,
            got: destination.device(),
        });
    }
    if destination.dtype() != problem.dtype {
        return Err(DilconvError::DTypeMismatch {
            op,
            tensor: name,
            expected: problem.dtype,
            got: destination.dtype(),
        });
    }
    check_rank(op, name, destination, expected.ndim())?;
    check_shape(op, name, destination, expected)?;
    check_contiguous(op, &[(name, destination)])
}

/// Validates `relu_backward_mask(output, grad_output, masked)`; returns the
/// shared dtype.
pub fn validate_activation_mask(output: &Tensor, grad_output: &Tensor, masked: &Tensor) -> DilconvResult<DType> {
    let op = ConvOp::ActivationMask;
    let args = [("output", output), ("grad_output", grad_output), ("masked", masked)];
    let (device, dtype) = check_placement(op, &args)?;

    for &(name, tensor) in &args[1..] {
        check_rank(op, name, tensor, output.ndim())?;
        check_shape(op, name, tensor, output.shape())?;
    }
    check_contiguous(op, &args)?;
    check_support(op, device, dtype)?;
    Ok(dtype)
}
