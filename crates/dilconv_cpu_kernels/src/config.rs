//! Launch configuration shared by every kernel.

/// Default number of elements handled by one parallel unit of work.
pub const DEFAULT_BLOCK_SIZE: usize = 256;

/// Environment variable overriding [`DEFAULT_BLOCK_SIZE`].
pub const BLOCK_SIZE_ENV: &str = "DILCONV_BLOCK_SIZE";

/// Launch parameters for a kernel.
///
/// `block_size` is the minimum number of consecutive elements a single
/// parallel unit of work processes before the scheduler may split the range.
/// It only affects scheduling; results are identical for every value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaunchConfig {
    pub block_size: usize,
}

impl Default for LaunchConfig {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
        }
    }
}

impl LaunchConfig {
    pub fn new(block_size: usize) -> Self {
        Self {
            block_size: block_size.max(1),
        }
    }

    /// Reads `DILCONV_BLOCK_SIZE`, falling back to the default when it is
    /// unset, unparsable or zero.
    pub fn from_env() -> Self {
        Self {
            block_size: effective_block_size(std::env::var(BLOCK_SIZE_ENV).ok().as_deref()),
        }
    }
}

fn effective_block_size(raw: Option<&str>) -> usize {
    raw.and_then(|v| v.trim().parse::<usize>().ok())
        .filter(|&v| v > 0)
        .unwrap_or(DEFAULT_BLOCK_SIZE)
}
