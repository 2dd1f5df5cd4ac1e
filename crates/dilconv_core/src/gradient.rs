//! Differentiable-operator contract and the in-place conv+ReLU adapter.
//!
//! The kernel entry points are stateless. Whatever the backward pass needs
//! from the forward pass (the output for the ReLU mask, the input and kernel
//! for the gradients) is retained here, between the two calls.

use crate::{
    dispatch::{
        conv_backward_bias, conv_backward_bias_into, conv_backward_input, conv_backward_input_into,
        conv_backward_kernel, conv_backward_kernel_into, conv_relu_forward, relu_backward_mask,
        relu_backward_mask_into,
    },
    error::{DilconvError, DilconvResult},
    tensor::Tensor,
};

/// An operator a host autodiff engine can drive.
///
/// `apply_backward` returns one gradient per forward input, in input order.
pub trait DifferentiableOp {
    fn apply_forward(&mut self, inputs: &[&Tensor]) -> DilconvResult<&Tensor>;

    fn apply_backward(&mut self, grad_output: &Tensor) -> DilconvResult<Vec<Tensor>>;
}

/// Gradients of one conv+ReLU application.
#[derive(Debug, Clone)]
pub struct ConvGradients {
    pub input: Tensor,
    pub kernel: Tensor,
    pub bias: Tensor,
}

impl ConvGradients {
    pub fn into_vec(self) -> Vec<Tensor> {
        vec![self.input, self.kernel, self.bias]
    }
}

/// Forward operands kept for backward. Tensor clones share their buffers.
#[derive(Clone)]
struct Saved {
    input: Tensor,
    kernel: Tensor,
}

/// Conv+ReLU writing into an output buffer it owns.
///
/// Forward inputs are `[input, kernel, bias]`. The output buffer is allocated
/// by the caller once and reused by every forward call.
pub struct ConvReluInPlace {
    output: Tensor,
    dilation: usize,
    saved: Option<Saved>,
}

impl ConvReluInPlace {
    /// Only `stride == 1` is supported.
    pub fn new(output: Tensor, stride: usize, dilation: usize) -> DilconvResult<Self> {
        if stride != 1 {
            return Err(DilconvError::InvalidArgument(format!(
                "conv_relu_in_place: stride must be 1, got {}",
                stride
            )));
        }
        Ok(Self {
            output,
            dilation,
            saved: None,
        })
    }

    pub fn dilation(&self) -> usize {
        self.dilation
    }

    pub fn output(&self) -> &Tensor {
        &self.output
    }

    pub fn into_output(self) -> Tensor {
        self.output
    }

    pub fn forward(&mut self, input: &Tensor, kernel: &Tensor, bias: &Tensor) -> DilconvResult<&Tensor> {
        self.saved = None;
        conv_relu_forward(input, kernel, bias, &mut self.output, self.dilation)?;
        self.saved = Some(Saved {
            input: input.clone(),
            kernel: kernel.clone(),
        });
        Ok(&self.output)
    }

    /// Masks `grad_output` with the saved output and runs the three backward
    /// kernels.
    pub fn backward(&self, grad_output: &Tensor) -> DilconvResult<ConvGradients> {
        let saved = self.saved.as_ref().ok_or(DilconvError::ForwardNotRun)?;
        let masked = relu_backward_mask(&self.output, grad_output)?;

        Ok(ConvGradients {
            input: conv_backward_input(&saved.input, &saved.kernel, &masked, self.dilation)?,
            kernel: conv_backward_kernel(&saved.input, &masked, self.dilation)?,
            bias: conv_backward_bias(&masked, self.dilation)?,
        })
    }

    /// As [`ConvReluInPlace::backward`], overwriting caller-provided buffers.
    /// `masked` receives the masked upstream gradient.
    pub fn backward_into(
        &self,
        grad_output: &Tensor,
        masked: &mut Tensor,
        grads: &mut ConvGradients,
    ) -> DilconvResult<()> {
        let saved = self.saved.as_ref().ok_or(DilconvError::ForwardNotRun)?;
        relu_backward_mask_into(&self.output, grad_output, masked)?;

        conv_backward_input_into(&saved.input, &saved.kernel, masked, &mut grads.input, self.dilation)?;
        conv_backward_kernel_into(&saved.input, masked, &mut grads.kernel, self.dilation)?;
        conv_backward_bias_into(masked, &mut grads.bias, self.dilation)
    }
}

impl DifferentiableOp for ConvReluInPlace {
    fn apply_forward(&mut self, inputs: &[&Tensor]) -> DilconvResult<&Tensor> {
        match inputs {
            [input, kernel, bias] => self.forward(input, kernel, bias),
            _ => Err(DilconvError::InvalidArgument(format!(
                "conv_relu_in_place expects [input, kernel, bias], got {} tensors",
                inputs.len()
            ))),
        }
    }

    fn apply_backward(&mut self, grad_output: &Tensor) -> DilconvResult<Vec<Tensor>> {
        self.backward(grad_output).map(ConvGradients::into_vec)
    }
}
