use crate::types::Shape;

/// Shape, strides and offset of a tensor view over its storage.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Layout {
    shape: Shape,
    strides: Vec<usize>,
    offset: usize,
}

impl Layout {
    pub fn new(shape: &[usize], strides: &[usize], offset: usize) -> Self {
        Self {
            shape: Shape::new(shape),
            strides: strides.to_vec(),
            offset,
        }
    }

    /// Dense row-major layout.
    pub fn from_shape(shape: &[usize]) -> Self {
        Self {
            shape: Shape::new(shape),
            strides: Self::compute_strides(shape),
            offset: 0,
        }
    }

    pub fn get_shape(&self) -> &Shape {
        &self.shape
    }

    pub fn get_strides(&self) -> &[usize] {
        &self.strides
    }

    pub fn get_offset(&self) -> usize {
        self.offset
    }

    pub fn get_ndim(&self) -> usize {
        self.shape.ndim()
    }

    pub fn get_size(&self) -> usize {
        self.shape.size()
    }

    /// Dense row-major with no offset. Extents of 1 ignore their stride.
    pub fn is_contiguous(&self) -> bool {
        if self.offset != 0 || self.strides.len() != self.get_ndim() {
            return false;
        }

        let mut expected_stride = 1;
        for i in (0..self.get_ndim()).rev() {
            let dim = self.shape[i];
            if dim != 1 && self.strides[i] != expected_stride {
                return false;
            }
            expected_stride *= dim;
        }

        true
    }

    pub(crate) fn compute_strides(shape: &[usize]) -> Vec<usize> {
        if shape.is_empty() {
            return vec![];
        }

        let mut strides = vec![1; shape.len()];
        for i in (0..shape.len() - 1).rev() {
            strides[i] = strides[i + 1] * shape[i + 1];
        }
        strides
    }
}
