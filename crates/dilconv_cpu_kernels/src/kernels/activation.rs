use crate::kernels::float::KernelFloat;
use core::fmt;

/// Activation fused into the forward kernel.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Activation {
    /// No activation; the forward kernel is a plain reflective convolution.
    Identity,
    /// Rectified linear unit, `max(0, v)`.
    #[default]
    Relu,
}

impl Activation {
    #[inline]
    pub fn apply<T: KernelFloat>(self, v: T) -> T {
        match self {
            Activation::Identity => v,
            Activation::Relu => {
                if v > T::zero() {
                    v
                } else {
                    T::zero()
                }
            },
        }
    }

    /// Derivative mask evaluated from the activation's *output*.
    ///
    /// Zero wherever the output was clamped.
    #[inline]
    pub fn mask<T: KernelFloat>(self, output: T, grad: T) -> T {
        match self {
            Activation::Identity => grad,
            Activation::Relu => {
                if output > T::zero() {
                    grad
                } else {
                    T::zero()
                }
            },
        }
    }
}

impl fmt::Display for Activation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Activation::Identity => write!(f, "identity"),
            Activation::Relu => write!(f, "relu"),
        }
    }
}

impl fmt::Debug for Activation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}
