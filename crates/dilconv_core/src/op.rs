use std::fmt;

pub use dilconv_cpu_kernels::Activation;

/// The kernel-layer operations, one per launch direction.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConvOp {
    Forward,
    BackwardInput,
    BackwardKernel,
    BackwardBias,
    ActivationMask,
}

impl fmt::Display for ConvOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Forward => "conv_forward",
            Self::BackwardInput => "conv_backward_input",
            Self::BackwardKernel => "conv_backward_kernel",
            Self::BackwardBias => "conv_backward_bias",
            Self::ActivationMask => "relu_backward_mask",
        };
        write!(f, "{s}")
    }
}

impl fmt::Debug for ConvOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ConvOp[{}]", self)
    }
}
