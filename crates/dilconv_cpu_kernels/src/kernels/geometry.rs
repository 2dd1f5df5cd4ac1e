use crate::{
    error::{CpuKernelError, Result},
    kernels::reflect::{ReflectedAxis, TapSource, TAPS_PER_AXIS},
};

/// Problem geometry of one launch, decoded from kernel metadata.
///
/// Metadata layout (`N` = spatial rank):
/// `[num_els, batch, in_channels, out_channels, spatial_0, .., spatial_{N-1}, dilation]`
///
/// Tensors are contiguous, batch-major:
/// - input  `[batch, in_channels, *spatial]`
/// - weight `[out_channels, in_channels, 3, .., 3]`
/// - output `[batch, out_channels, *spatial]`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConvGeometry<const N: usize> {
    pub batch: usize,
    pub in_channels: usize,
    pub out_channels: usize,
    pub spatial: [usize; N],
    pub dilation: usize,
}

impl<const N: usize> ConvGeometry<N> {
    pub const METADATA_LEN: usize = 5 + N;

    pub fn from_metadata(metadata: &[usize]) -> Result<Self> {
        if metadata.len() != Self::METADATA_LEN {
            return Err(CpuKernelError::InvalidInput(format!(
                "{}d conv metadata must have {} entries, got {}",
                N,
                Self::METADATA_LEN,
                metadata.len()
            )));
        }

        let mut spatial = [0usize; N];
        spatial.copy_from_slice(&metadata[4..4 + N]);
        let geometry = Self {
            batch: metadata[1],
            in_channels: metadata[2],
            out_channels: metadata[3],
            spatial,
            dilation: metadata[4 + N],
        };
        geometry.validate()?;
        Ok(geometry)
    }

    pub fn validate(&self) -> Result<()> {
        if self.dilation == 0 {
            return Err(CpuKernelError::InvalidInput("dilation must be positive".to_string()));
        }
        if let Some(axis) = self.spatial.iter().position(|&extent| extent == 0) {
            return Err(CpuKernelError::InvalidInput(format!(
                "spatial axis {} has zero extent",
                axis
            )));
        }
        Ok(())
    }

    /// Metadata for this geometry with `num_els` in front.
    pub fn to_metadata(&self, num_els: usize) -> Vec<usize> {
        let mut metadata = Vec::with_capacity(Self::METADATA_LEN);
        metadata.extend_from_slice(&[num_els, self.batch, self.in_channels, self.out_channels]);
        metadata.extend_from_slice(&self.spatial);
        metadata.push(self.dilation);
        metadata
    }

    #[inline]
    pub fn spatial_size(&self) -> usize {
        self.spatial.iter().product()
    }

    #[inline]
    pub fn taps(&self) -> usize {
        TAPS_PER_AXIS.pow(N as u32)
    }

    pub fn input_len(&self) -> usize {
        self.batch * self.in_channels * self.spatial_size()
    }

    pub fn output_len(&self) -> usize {
        self.batch * self.out_channels * self.spatial_size()
    }

    pub fn weight_len(&self) -> usize {
        self.out_channels * self.in_channels * self.taps()
    }

    /// Row-major strides of one spatial plane.
    pub fn spatial_strides(&self) -> [usize; N] {
        let mut strides = [1usize; N];
        for a in (0..N.saturating_sub(1)).rev() {
            strides[a] = strides[a + 1] * self.spatial[a + 1];
        }
        strides
    }

    /// Strides of the per-axis tap digits inside one `3 x .. x 3` kernel block.
    pub fn tap_strides(&self) -> [usize; N] {
        let mut strides = [1usize; N];
        for a in (0..N.saturating_sub(1)).rev() {
            strides[a] = strides[a + 1] * TAPS_PER_AXIS;
        }
        strides
    }

    #[inline]
    pub fn unravel(&self, mut pos: usize) -> [usize; N] {
        let mut coords = [0usize; N];
        for a in (0..N).rev() {
            coords[a] = pos % self.spatial[a];
            pos /= self.spatial[a];
        }
        coords
    }

    #[inline]
    pub fn tap_digits(&self, mut tap: usize) -> [usize; N] {
        let mut digits = [0usize; N];
        for a in (0..N).rev() {
            digits[a] = tap % TAPS_PER_AXIS;
            tap /= TAPS_PER_AXIS;
        }
        digits
    }

    /// Reflected addressing tables, one per spatial axis.
    pub fn axes(&self) -> [ReflectedAxis; N] {
        core::array::from_fn(|a| ReflectedAxis::new(self.spatial[a], self.dilation))
    }
}

/// Visits every combination of per-axis sources in row-major order, passing
/// the flat tap index and the flat output position.
#[inline]
pub(crate) fn for_each_source<const N: usize>(
    sources: &[&[TapSource]; N],
    tap_strides: &[usize; N],
    spatial_strides: &[usize; N],
    mut f: impl FnMut(usize, usize),
) {
    if N == 0 || sources.iter().any(|s| s.is_empty()) {
        return;
    }

    let mut idx = [0usize; N];
    loop {
        let mut tap = 0;
        let mut pos = 0;
        for a in 0..N {
            let src = sources[a][idx[a]];
            tap += src.tap * tap_strides[a];
            pos += src.output * spatial_strides[a];
        }
        f(tap, pos);

        let mut axis = N;
        loop {
            if axis == 0 {
                return;
            }
            axis -= 1;
            idx[axis] += 1;
            if idx[axis] < sources[axis].len() {
                break;
            }
            idx[axis] = 0;
        }
    }
}
