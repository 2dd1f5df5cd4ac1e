use crate::{
    error::{DilconvError, DilconvResult},
    gradient::{ConvGradients, ConvReluInPlace},
    op::ConvOp,
    tensor::Tensor,
    types::{DType, Shape},
};
use dilconv_cpu_kernels::TAPS_PER_AXIS;
use log::debug;

/// A single dilated conv+ReLU layer owning its parameters and output buffer.
///
/// Weights start as `U(-1/sqrt(fan_in), 1/sqrt(fan_in))` with
/// `fan_in = in_channels * 3^rank`; the bias starts at zero. The output
/// buffer is allocated on the first forward call and reused until the input
/// shape changes.
pub struct ConvReluLayer {
    weight: Tensor,
    bias: Tensor,
    dilation: usize,
    op: Option<ConvReluInPlace>,
}

impl ConvReluLayer {
    pub fn new(
        in_channels: usize,
        out_channels: usize,
        spatial_rank: usize,
        dilation: usize,
        dtype: DType,
        seed: u64,
    ) -> DilconvResult<Self> {
        if !matches!(spatial_rank, 2 | 3) {
            return Err(DilconvError::UnsupportedRank {
                op: ConvOp::Forward,
                spatial_rank,
            });
        }
        if dilation == 0 {
            return Err(DilconvError::InvalidDilation {
                op: ConvOp::Forward,
                dilation,
            });
        }

        let mut weight_dims = vec![out_channels, in_channels];
        weight_dims.resize(2 + spatial_rank, TAPS_PER_AXIS);
        let fan_in = in_channels * TAPS_PER_AXIS.pow(spatial_rank as u32);
        let bound = 1.0 / (fan_in.max(1) as f64).sqrt();

        Ok(Self {
            weight: Tensor::rand_uniform(weight_dims, dtype, -bound, bound, seed)?,
            bias: Tensor::zeros([out_channels], dtype)?,
            dilation,
            op: None,
        })
    }

    pub fn weight(&self) -> &Tensor {
        &self.weight
    }

    pub fn bias(&self) -> &Tensor {
        &self.bias
    }

    /// Replaces the parameters; shapes, dtype and device must stay the same.
    pub fn set_parameters(&mut self, weight: Tensor, bias: Tensor) -> DilconvResult<()> {
        for (name, old, new) in [("kernel", &self.weight, &weight), ("bias", &self.bias, &bias)] {
            if old.shape() != new.shape() {
                return Err(DilconvError::ShapeMismatch {
                    op: ConvOp::Forward,
                    tensor: name,
                    expected: old.shape().clone(),
                    got: new.shape().clone(),
                });
            }
            if old.dtype() != new.dtype() {
                return Err(DilconvError::DTypeMismatch {
                    op: ConvOp::Forward,
                    tensor: name,
                    expected: old.dtype(),
                    got: new.dtype(),
                });
            }
            if old.device() != new.device() {
                return Err(DilconvError::DeviceMismatch {
                    op: ConvOp::Forward,
                    tensor: name,
                    expected: old.device(),
                    got: new.device(),
                });
            }
        }
        self.weight = weight;
        self.bias = bias;
        Ok(())
    }

    pub fn forward(&mut self, input: &Tensor) -> DilconvResult<&Tensor> {
        let expected_ndim = self.weight.ndim();
        if input.ndim() != expected_ndim {
            return Err(DilconvError::RankMismatch {
                op: ConvOp::Forward,
                tensor: "input",
                expected: expected_ndim,
                got: input.ndim(),
            });
        }

        let mut dims = vec![input.shape()[0], self.weight.shape()[0]];
        dims.extend_from_slice(input.shape().trailing(2));
        let output_shape = Shape::from(dims);

        let op = match self.op.take() {
            Some(op) if op.output().shape() == &output_shape && op.output().dtype() == input.dtype() => op,
            _ => {
                debug!("conv_relu_layer: allocating output {}", output_shape);
                let output = Tensor::zeros(output_shape, input.dtype())?.with_device(input.device());
                ConvReluInPlace::new(output, 1, self.dilation)?
            },
        };
        let op = self.op.insert(op);
        op.forward(input, &self.weight, &self.bias)
    }

    pub fn backward(&self, grad_output: &Tensor) -> DilconvResult<ConvGradients> {
        self.op
            .as_ref()
            .ok_or(DilconvError::ForwardNotRun)?
            .backward(grad_output)
    }
}
