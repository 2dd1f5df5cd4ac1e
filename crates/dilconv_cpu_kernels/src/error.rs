//! Error types for CPU kernel operations

use std::fmt;

/// Error type for CPU kernel operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CpuKernelError {
    /// Invalid kernel name or configuration
    InvalidKernel(String),
    /// Invalid input parameters or dimensions
    InvalidInput(String),
    /// Scratch memory for a launch could not be obtained
    ResourceExhausted(String),
    /// Generic error message
    Message(String),
}

impl fmt::Display for CpuKernelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CpuKernelError::InvalidKernel(msg) => write!(f, "invalid kernel: {}", msg),
            CpuKernelError::InvalidInput(msg) => write!(f, "invalid input: {}", msg),
            CpuKernelError::ResourceExhausted(msg) => write!(f, "resource exhausted: {}", msg),
            CpuKernelError::Message(msg) => write!(f, "message: {}", msg),
        }
    }
}

impl std::error::Error for CpuKernelError {}

/// Result type for CPU kernel operations
pub type Result<T> = core::result::Result<T, CpuKernelError>;
