use crate::{
    op::ConvOp,
    types::{DType, Device, Shape},
};
use std::fmt;

/// Main error type for dilconv_core.
///
/// Validation variants are raised before any kernel runs and name the
/// operation and the offending tensor argument. Resource variants come from
/// allocation or launch failures and are reported as-is.
#[derive(Clone, PartialEq, Eq)]
pub enum DilconvError {
    // ===== Device Errors =====
    /// Tensor placed on a different device than the rest of the call.
    DeviceMismatch {
        op: ConvOp,
        tensor: &'static str,
        expected: Device,
        got: Device,
    },
    /// No compiled kernel variant for the device.
    UnsupportedDevice { op: ConvOp, device: Device },

    // ===== DType Errors =====
    /// Tensor dtype differs from the rest of the call.
    DTypeMismatch {
        op: ConvOp,
        tensor: &'static str,
        expected: DType,
        got: DType,
    },
    /// No compiled kernel variant for the dtype.
    UnsupportedDTypeForOp { dtype: DType, op: ConvOp },

    // ===== Shape and Layout Errors =====
    /// Tensor shape disagrees with the shape implied by the other arguments.
    ShapeMismatch {
        op: ConvOp,
        tensor: &'static str,
        expected: Shape,
        got: Shape,
    },
    /// Tensor rank disagrees with the rest of the call.
    RankMismatch {
        op: ConvOp,
        tensor: &'static str,
        expected: usize,
        got: usize,
    },
    /// Spatial rank without a compiled variant (only 2 and 3 exist).
    UnsupportedRank { op: ConvOp, spatial_rank: usize },
    /// Kernel spatial extent other than 3 along some axis.
    UnsupportedKernelSize { op: ConvOp, got: Shape },
    /// Dilation must be a positive integer.
    InvalidDilation { op: ConvOp, dilation: usize },
    /// Kernels read and write dense row-major buffers only.
    NonContiguous { op: ConvOp, tensor: &'static str },
    /// Storage length disagrees with the layout.
    SizeMismatch { expected: usize, got: usize },

    // ===== Resource Errors =====
    /// Memory for a result buffer could not be obtained.
    ResourceExhausted(String),
    /// CPU kernel error
    CpuKernelError(String),

    // ===== Operator Errors =====
    /// Backward requested before a forward pass saved its tensors.
    ForwardNotRun,
    /// Invalid argument provided.
    InvalidArgument(String),
}

impl DilconvError {
    /// Precondition failures: the caller can fix the arguments and retry.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::DeviceMismatch { .. }
                | Self::UnsupportedDevice { .. }
                | Self::DTypeMismatch { .. }
                | Self::UnsupportedDTypeForOp { .. }
                | Self::ShapeMismatch { .. }
                | Self::RankMismatch { .. }
                | Self::UnsupportedRank { .. }
                | Self::UnsupportedKernelSize { .. }
                | Self::InvalidDilation { .. }
                | Self::NonContiguous { .. }
                | Self::SizeMismatch { .. }
                | Self::InvalidArgument(_)
        )
    }

    /// Memory exhaustion or kernel launch failure.
    pub fn is_resource(&self) -> bool {
        matches!(self, Self::ResourceExhausted(_) | Self::CpuKernelError(_))
    }
}

impl fmt::Display for DilconvError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            // Device Errors
            Self::DeviceMismatch {
                op,
                tensor,
                expected,
                got,
            } => {
                write!(f, "{op}: device mismatch for `{tensor}`: expected {expected}, got {got}")
            },
            Self::UnsupportedDevice { op, device } => {
                write!(f, "{op}: no compiled kernel variant for device {device}")
            },

            // DType Errors
            Self::DTypeMismatch {
                op,
                tensor,
                expected,
                got,
            } => {
                write!(f, "{op}: dtype mismatch for `{tensor}`: expected {expected}, got {got}")
            },
            Self::UnsupportedDTypeForOp { dtype, op } => {
                write!(f, "{op}: no compiled kernel variant for dtype {dtype}")
            },

            // Shape and Layout Errors
            Self::ShapeMismatch {
                op,
                tensor,
                expected,
                got,
            } => {
                write!(f, "{op}: shape mismatch for `{tensor}`: expected {expected:?}, got {got:?}")
            },
            Self::RankMismatch {
                op,
                tensor,
                expected,
                got,
            } => {
                write!(f, "{op}: `{tensor}` must have {expected} dimensions, got {got}")
            },
            Self::UnsupportedRank { op, spatial_rank } => {
                write!(f, "{op}: unsupported spatial rank {spatial_rank} (expected 2 or 3)")
            },
            Self::UnsupportedKernelSize { op, got } => {
                write!(f, "{op}: kernel spatial extent must be 3 along every axis, got {got:?}")
            },
            Self::InvalidDilation { op, dilation } => {
                write!(f, "{op}: dilation must be a positive integer, got {dilation}")
            },
            Self::NonContiguous { op, tensor } => {
                write!(f, "{op}: `{tensor}` must be contiguous")
            },
            Self::SizeMismatch { expected, got } => {
                write!(f, "size mismatch: expected {}, got {}", expected, got)
            },

            // Resource Errors
            Self::ResourceExhausted(msg) => write!(f, "resource exhausted: {}", msg),
            Self::CpuKernelError(msg) => write!(f, "cpu kernel error: {}", msg),

            // Operator Errors
            Self::ForwardNotRun => write!(f, "backward called before forward saved its tensors"),
            Self::InvalidArgument(msg) => write!(f, "invalid argument: {}", msg),
        }
    }
}

impl fmt::Debug for DilconvError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl std::error::Error for DilconvError {}

// Conversion from dilconv_cpu_kernels error
impl From<dilconv_cpu_kernels::CpuKernelError> for DilconvError {
    fn from(e: dilconv_cpu_kernels::CpuKernelError) -> Self {
        match e {
            dilconv_cpu_kernels::CpuKernelError::ResourceExhausted(msg) => DilconvError::ResourceExhausted(msg),
            other => DilconvError::CpuKernelError(other.to_string()),
        }
    }
}

pub type DilconvResult<T> = Result<T, DilconvError>;
