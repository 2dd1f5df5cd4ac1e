use std::fmt;

/// Where a tensor's storage lives.
///
/// `CUDA` is a placement tag only: tensors can carry it, but no kernel
/// variant is compiled for it and dispatch rejects it.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Device {
    #[default]
    CPU,
    CUDA(usize),
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::CPU => write!(f, "cpu"),
            Device::CUDA(id) => write!(f, "cuda::{id}"),
        }
    }
}

impl fmt::Debug for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Device[{}]", self)
    }
}

impl Device {
    pub fn is_cpu(&self) -> bool {
        matches!(self, Device::CPU)
    }

    pub fn is_cuda(&self) -> bool {
        matches!(self, Device::CUDA(_))
    }
}
