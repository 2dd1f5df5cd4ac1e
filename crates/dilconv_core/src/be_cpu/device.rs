use log::{debug, warn};
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::sync::OnceLock;

/// Environment variable sizing the dedicated kernel thread pool.
pub const NUM_THREADS_ENV: &str = "DILCONV_NUM_THREADS";

static POOL: OnceLock<Option<ThreadPool>> = OnceLock::new();

/// The CPU execution device: the thread pool kernels launch on.
#[derive(Debug, Clone, Copy)]
pub struct CpuDevice;

impl CpuDevice {
    /// Runs `op` on the kernel pool and waits for it to finish.
    ///
    /// Uses the global rayon pool when `DILCONV_NUM_THREADS` is unset or the
    /// dedicated pool could not be built.
    pub fn install<R, F>(op: F) -> R
    where
        R: Send,
        F: FnOnce() -> R + Send,
    {
        match pool() {
            Some(pool) => pool.install(op),
            None => op(),
        }
    }

    /// Number of worker threads kernels are spread over.
    pub fn num_threads() -> usize {
        match pool() {
            Some(pool) => pool.current_num_threads(),
            None => rayon::current_num_threads(),
        }
    }
}

fn pool() -> Option<&'static ThreadPool> {
    POOL.get_or_init(|| {
        let raw = std::env::var(NUM_THREADS_ENV).ok()?;
        let threads = match parse_num_threads(&raw) {
            Some(threads) => threads,
            None => {
                warn!("ignoring {}={:?}: expected a positive integer", NUM_THREADS_ENV, raw);
                return None;
            },
        };

        match ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("dilconv-{i}"))
            .build()
        {
            Ok(pool) => {
                debug!("built kernel thread pool with {} threads", threads);
                Some(pool)
            },
            Err(e) => {
                warn!("failed to build kernel thread pool ({}), using the global pool", e);
                None
            },
        }
    })
    .as_ref()
}

fn parse_num_threads(raw: &str) -> Option<usize> {
    raw.trim().parse::<usize>().ok().filter(|&n| n > 0)
}
