use half::{bf16, f16};
use num_traits::Float;

/// Element types with compiled kernel variants.
///
/// Accumulation happens in `Self`; there is no implicit upcast.
pub trait KernelFloat: Float + Default + Send + Sync + core::fmt::Debug + 'static {
    /// Suffix used in kernel names for this type.
    const SUFFIX: &'static str;
}

impl KernelFloat for bf16 {
    const SUFFIX: &'static str = "bf16";
}

impl KernelFloat for f16 {
    const SUFFIX: &'static str = "f16";
}

impl KernelFloat for f32 {
    const SUFFIX: &'static str = "f32";
}

impl KernelFloat for f64 {
    const SUFFIX: &'static str = "f64";
}
