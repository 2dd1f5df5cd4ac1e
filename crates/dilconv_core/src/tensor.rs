use crate::{
    be_cpu::storage::{CpuStorage, TensorElement},
    error::{DilconvError, DilconvResult},
    types::{DType, Device, Layout, Shape},
};
use rand::{distr::Uniform, rngs::StdRng, SeedableRng};
use rand_distr::{Distribution, Normal};
use std::{fmt, sync::Arc};

/// A caller-owned buffer plus its view description.
///
/// Kernels never reallocate a tensor: outputs and gradient buffers are
/// written in place. Clones share the buffer until one of them is written.
#[derive(Clone)]
pub struct Tensor {
    storage: Arc<CpuStorage>,
    layout: Layout,
    device: Device,
}

impl Tensor {
    /// Wraps existing storage. The layout may be strided or offset, but it
    /// needs one stride per axis and every element it addresses must lie
    /// inside the storage.
    pub fn from_parts(storage: CpuStorage, layout: Layout, device: Device) -> DilconvResult<Self> {
        if layout.get_strides().len() != layout.get_ndim() {
            return Err(DilconvError::InvalidArgument(format!(
                "layout has {} strides for {} axes",
                layout.get_strides().len(),
                layout.get_ndim()
            )));
        }
        let required = required_len(&layout);
        if storage.len() < required {
            return Err(DilconvError::SizeMismatch {
                expected: required,
                got: storage.len(),
            });
        }
        Ok(Self {
            storage: Arc::new(storage),
            layout,
            device,
        })
    }

    pub fn from_vec<T: TensorElement>(data: Vec<T>, shape: impl Into<Shape>) -> DilconvResult<Self> {
        let shape = shape.into();
        if data.len() != shape.size() {
            return Err(DilconvError::SizeMismatch {
                expected: shape.size(),
                got: data.len(),
            });
        }
        Ok(Self {
            storage: Arc::new(CpuStorage::from_vec(data)),
            layout: Layout::from_shape(shape.dims()),
            device: Device::CPU,
        })
    }

    /// Contiguous tensor with every element equal to `value`.
    pub fn full(shape: impl Into<Shape>, dtype: DType, value: f64) -> DilconvResult<Self> {
        let shape = shape.into();
        Ok(Self {
            storage: Arc::new(CpuStorage::filled(dtype, shape.size(), value)?),
            layout: Layout::from_shape(shape.dims()),
            device: Device::CPU,
        })
    }

    pub fn zeros(shape: impl Into<Shape>, dtype: DType) -> DilconvResult<Self> {
        Self::full(shape, dtype, 0.0)
    }

    pub fn ones(shape: impl Into<Shape>, dtype: DType) -> DilconvResult<Self> {
        Self::full(shape, dtype, 1.0)
    }

    /// Samples `N(mean, std)` from a seeded generator.
    pub fn randn(shape: impl Into<Shape>, dtype: DType, mean: f64, std: f64, seed: u64) -> DilconvResult<Self> {
        let normal = Normal::new(mean, std)
            .map_err(|e| DilconvError::InvalidArgument(format!("normal({mean}, {std}): {e}")))?;
        let mut rng = StdRng::seed_from_u64(seed);
        Self::sampled(shape.into(), dtype, || normal.sample(&mut rng))
    }

    /// Samples `U(low, high)` from a seeded generator.
    pub fn rand_uniform(
        shape: impl Into<Shape>,
        dtype: DType,
        low: f64,
        high: f64,
        seed: u64,
    ) -> DilconvResult<Self> {
        let uniform = Uniform::new(low, high)
            .map_err(|e| DilconvError::InvalidArgument(format!("uniform({low}, {high}): {e}")))?;
        let mut rng = StdRng::seed_from_u64(seed);
        Self::sampled(shape.into(), dtype, || uniform.sample(&mut rng))
    }

    fn sampled(shape: Shape, dtype: DType, mut sample: impl FnMut() -> f64) -> DilconvResult<Self> {
        let mut storage = CpuStorage::zeros(dtype, shape.size())?;
        macro_rules! fill {
            ($ty:ty) => {{
                if let Some(data) = storage.as_mut_slice::<$ty>() {
                    data.iter_mut().for_each(|v| *v = <$ty>::from_f64(sample()));
                }
            }};
        }
        match dtype {
            DType::BF16 => fill!(half::bf16),
            DType::F16 => fill!(half::f16),
            DType::F32 => fill!(f32),
            DType::F64 => fill!(f64),
            DType::I32 => fill!(i32),
            DType::I64 => fill!(i64),
        }
        Ok(Self {
            storage: Arc::new(storage),
            layout: Layout::from_shape(shape.dims()),
            device: Device::CPU,
        })
    }

    /// Same buffer, tagged with another placement.
    pub fn with_device(mut self, device: Device) -> Self {
        self.device = device;
        self
    }

    pub fn shape(&self) -> &Shape {
        self.layout.get_shape()
    }

    pub fn ndim(&self) -> usize {
        self.layout.get_ndim()
    }

    pub fn size(&self) -> usize {
        self.layout.get_size()
    }

    pub fn dtype(&self) -> DType {
        self.storage.dtype()
    }

    pub fn device(&self) -> Device {
        self.device
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn is_contiguous(&self) -> bool {
        self.layout.is_contiguous() && self.storage.len() == self.size()
    }

    pub fn storage(&self) -> &CpuStorage {
        &self.storage
    }

    /// Borrows the underlying buffer as `T`.
    pub fn as_slice<T: TensorElement>(&self) -> DilconvResult<&[T]> {
        self.storage.as_slice::<T>().ok_or_else(|| {
            DilconvError::InvalidArgument(format!("tensor holds {}, not {}", self.dtype(), T::DTYPE))
        })
    }

    pub(crate) fn as_mut_slice<T: TensorElement>(&mut self) -> DilconvResult<&mut [T]> {
        let dtype = self.dtype();
        Arc::make_mut(&mut self.storage).as_mut_slice::<T>().ok_or_else(|| {
            DilconvError::InvalidArgument(format!("tensor holds {}, not {}", dtype, T::DTYPE))
        })
    }

    /// Copies the elements out in logical (row-major) order.
    pub fn to_vec<T: TensorElement>(&self) -> DilconvResult<Vec<T>> {
        let data = self.as_slice::<T>()?;
        if self.is_contiguous() {
            return Ok(data.to_vec());
        }
        Ok(strided_indices(&self.layout).map(|i| data[i]).collect())
    }

    /// Copies the elements out in logical order, widened to f64.
    pub fn to_f64_vec(&self) -> Vec<f64> {
        let data = self.storage.to_f64_vec();
        if self.is_contiguous() {
            return data;
        }
        strided_indices(&self.layout).map(|i| data[i]).collect()
    }
}

impl fmt::Debug for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tensor[{:?}, {}, {}]", self.shape(), self.dtype(), self.device)
    }
}

fn required_len(layout: &Layout) -> usize {
    if layout.get_size() == 0 {
        return 0;
    }
    let dims = layout.get_shape().dims();
    let reach: usize = dims.iter().zip(layout.get_strides()).map(|(&d, &s)| (d - 1) * s).sum();
    layout.get_offset() + reach + 1
}

/// Storage offsets of every logical element, row-major.
fn strided_indices(layout: &Layout) -> impl Iterator<Item = usize> + '_ {
    let dims = layout.get_shape().dims();
    let strides = layout.get_strides();
    (0..layout.get_size()).map(move |mut linear| {
        let mut offset = layout.get_offset();
        for axis in (0..dims.len()).rev() {
            offset += (linear % dims[axis]) * strides[axis];
            linear /= dims[axis];
        }
        offset
    })
}
