use crate::{
    error::{DilconvError, DilconvResult},
    types::DType,
};
use half::{bf16, f16};

/// Host memory for one tensor, one variant per dtype.
#[derive(Debug, Clone, PartialEq)]
pub enum CpuStorage {
    BF16(Vec<bf16>),
    F16(Vec<f16>),
    F32(Vec<f32>),
    F64(Vec<f64>),
    I32(Vec<i32>),
    I64(Vec<i64>),
}

/// Element types a [`CpuStorage`] can hold.
pub trait TensorElement: Copy + Send + Sync + 'static {
    const DTYPE: DType;

    fn from_f64(v: f64) -> Self;
    fn into_storage(data: Vec<Self>) -> CpuStorage;
    fn slice(storage: &CpuStorage) -> Option<&[Self]>;
    fn slice_mut(storage: &mut CpuStorage) -> Option<&mut [Self]>;
}

macro_rules! tensor_element {
    ($ty:ty, $variant:ident, $from:expr) => {
        impl TensorElement for $ty {
            const DTYPE: DType = DType::$variant;

            #[inline]
            fn from_f64(v: f64) -> Self {
                $from(v)
            }

            fn into_storage(data: Vec<Self>) -> CpuStorage {
                CpuStorage::$variant(data)
            }

            fn slice(storage: &CpuStorage) -> Option<&[Self]> {
                match storage {
                    CpuStorage::$variant(v) => Some(v),
                    _ => None,
                }
            }

            fn slice_mut(storage: &mut CpuStorage) -> Option<&mut [Self]> {
                match storage {
                    CpuStorage::$variant(v) => Some(v),
                    _ => None,
                }
            }
        }
    };
}

tensor_element!(bf16, BF16, bf16::from_f64);
tensor_element!(f16, F16, f16::from_f64);
tensor_element!(f32, F32, |v: f64| v as f32);
tensor_element!(f64, F64, |v: f64| v);
tensor_element!(i32, I32, |v: f64| v as i32);
tensor_element!(i64, I64, |v: f64| v as i64);

/// `len` copies of `value`, reporting allocation failure instead of aborting.
pub(crate) fn try_filled<T: TensorElement>(len: usize, value: T) -> DilconvResult<Vec<T>> {
    let mut data = Vec::new();
    data.try_reserve_exact(len).map_err(|e| {
        DilconvError::ResourceExhausted(format!("{} elements of {}: {}", len, T::DTYPE, e))
    })?;
    data.resize(len, value);
    Ok(data)
}

impl CpuStorage {
    pub fn from_vec<T: TensorElement>(data: Vec<T>) -> Self {
        T::into_storage(data)
    }

    /// `len` elements of `dtype`, all equal to `value` (converted from f64).
    pub fn filled(dtype: DType, len: usize, value: f64) -> DilconvResult<Self> {
        let storage = match dtype {
            DType::BF16 => Self::BF16(try_filled(len, bf16::from_f64(value))?),
            DType::F16 => Self::F16(try_filled(len, f16::from_f64(value))?),
            DType::F32 => Self::F32(try_filled(len, value as f32)?),
            DType::F64 => Self::F64(try_filled(len, value)?),
            DType::I32 => Self::I32(try_filled(len, value as i32)?),
            DType::I64 => Self::I64(try_filled(len, value as i64)?),
        };
        Ok(storage)
    }

    pub fn zeros(dtype: DType, len: usize) -> DilconvResult<Self> {
        Self::filled(dtype, len, 0.0)
    }

    pub fn dtype(&self) -> DType {
        match self {
            Self::BF16(_) => DType::BF16,
            Self::F16(_) => DType::F16,
            Self::F32(_) => DType::F32,
            Self::F64(_) => DType::F64,
            Self::I32(_) => DType::I32,
            Self::I64(_) => DType::I64,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::BF16(v) => v.len(),
            Self::F16(v) => v.len(),
            Self::F32(v) => v.len(),
            Self::F64(v) => v.len(),
            Self::I32(v) => v.len(),
            Self::I64(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_slice<T: TensorElement>(&self) -> Option<&[T]> {
        T::slice(self)
    }

    pub fn as_mut_slice<T: TensorElement>(&mut self) -> Option<&mut [T]> {
        T::slice_mut(self)
    }

    /// Every element widened to f64.
    pub fn to_f64_vec(&self) -> Vec<f64> {
        match self {
            Self::BF16(v) => v.iter().map(|x| x.to_f64()).collect(),
            Self::F16(v) => v.iter().map(|x| x.to_f64()).collect(),
            Self::F32(v) => v.iter().map(|&x| x as f64).collect(),
            Self::F64(v) => v.clone(),
            Self::I32(v) => v.iter().map(|&x| x as f64).collect(),
            Self::I64(v) => v.iter().map(|&x| x as f64).collect(),
        }
    }
}
