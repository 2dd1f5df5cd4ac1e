//! Boundary-reflection addressing
//!
//! Every kernel in this crate reaches the input through [`reflect_tap`]. The
//! per-axis tables in [`ReflectedAxis`] are built from it once per launch, so
//! forward and backward passes always agree on which input element a tap reads.

/// Number of taps along every spatial axis.
pub const TAPS_PER_AXIS: usize = 3;

/// Mirrors `coord` into `[0, extent)`.
///
/// Symmetric extension with the edge sample repeated: `-1 -> 0`,
/// `extent -> extent - 1`. The mapping is periodic with period `2 * extent`, so
/// coordinates any number of extents away from the axis still land in range.
///
/// # Panics
///
/// Panics if `extent` is zero.
#[inline]
pub fn reflect(coord: isize, extent: usize) -> usize {
    assert!(extent > 0, "reflect: axis extent must be positive");
    let period = 2 * extent as isize;
    let m = coord.rem_euclid(period) as usize;
    if m < extent {
        m
    } else {
        2 * extent - 1 - m
    }
}

/// Input coordinate read by tap `tap` (0, 1 or 2) of the output element at
/// `output_coord` along an axis of length `extent`.
#[inline]
pub fn reflect_tap(output_coord: usize, tap: usize, dilation: usize, extent: usize) -> usize {
    debug_assert!(tap < TAPS_PER_AXIS);
    let offset = (tap as isize - 1) * dilation as isize;
    reflect(output_coord as isize + offset, extent)
}

/// One (tap, output coordinate) pair reading a given input coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TapSource {
    pub tap: usize,
    pub output: usize,
}

/// Reflected addressing along one spatial axis, tabulated in both directions.
#[derive(Debug, Clone)]
pub struct ReflectedAxis {
    extent: usize,
    // [output * TAPS_PER_AXIS + tap] -> input coordinate
    forward: Vec<usize>,
    // CSR over input coordinates: sources[starts[i]..starts[i + 1]]
    starts: Vec<usize>,
    sources: Vec<TapSource>,
}

impl ReflectedAxis {
    pub fn new(extent: usize, dilation: usize) -> Self {
        let mut forward = Vec::with_capacity(extent * TAPS_PER_AXIS);
        let mut counts = vec![0usize; extent];
        for output in 0..extent {
            for tap in 0..TAPS_PER_AXIS {
                let input = reflect_tap(output, tap, dilation, extent);
                forward.push(input);
                counts[input] += 1;
            }
        }

        let mut starts = Vec::with_capacity(extent + 1);
        let mut acc = 0;
        starts.push(0);
        for &count in &counts {
            acc += count;
            starts.push(acc);
        }

        // Fill in (output, tap) order so the gather order is fixed.
        let mut cursor = starts[..extent].to_vec();
        let mut sources = vec![TapSource { tap: 0, output: 0 }; acc];
        for output in 0..extent {
            for tap in 0..TAPS_PER_AXIS {
                let input = forward[output * TAPS_PER_AXIS + tap];
                sources[cursor[input]] = TapSource { tap, output };
                cursor[input] += 1;
            }
        }

        Self {
            extent,
            forward,
            starts,
            sources,
        }
    }

    pub fn extent(&self) -> usize {
        self.extent
    }

    /// Input coordinate read by `tap` at `output`.
    #[inline]
    pub fn input_of(&self, output: usize, tap: usize) -> usize {
        self.forward[output * TAPS_PER_AXIS + tap]
    }

    /// All (tap, output) pairs whose reflected read lands on `input`.
    #[inline]
    pub fn sources_of(&self, input: usize) -> &[TapSource] {
        &self.sources[self.starts[input]..self.starts[input + 1]]
    }
}
