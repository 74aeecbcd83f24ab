//! Shared parallel processing configuration types.

use serde::{Deserialize, Serialize};

/// Configuration for data parallelism inside the CPU-bound stages.
///
/// Segmentation spreads its per-pixel work (mixture component assignment and
/// likelihood evaluation) across rayon's global pool; this policy sizes that pool
/// and decides when an image is large enough to be worth splitting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParallelPolicy {
    /// Maximum number of threads to use for parallel processing.
    /// If None, rayon will use the default thread pool size (typically number of CPU cores).
    #[serde(default)]
    pub max_threads: Option<usize>,

    /// Images with at most this many pixels are processed sequentially.
    #[serde(default = "ParallelPolicy::default_pixel_threshold")]
    pub pixel_threshold: usize,
}

impl ParallelPolicy {
    /// Create a new ParallelPolicy with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum number of threads.
    pub fn with_max_threads(mut self, max_threads: Option<usize>) -> Self {
        self.max_threads = max_threads;
        self
    }

    /// Set the pixel threshold.
    pub fn with_pixel_threshold(mut self, threshold: usize) -> Self {
        self.pixel_threshold = threshold;
        self
    }

    /// Whether an image with `pixels` pixels should use the parallel path.
    pub fn should_parallelize(&self, pixels: usize) -> bool {
        pixels > self.pixel_threshold
    }

    /// Install the global rayon thread pool with the configured number of threads.
    ///
    /// Call once at startup, before any stage runs. If `max_threads` is None this
    /// does nothing and rayon keeps its default size.
    ///
    /// # Returns
    ///
    /// - `Ok(true)` if the thread pool was successfully configured
    /// - `Ok(false)` if `max_threads` is None (no configuration needed)
    /// - `Err` if the thread pool has already been initialized
    pub fn install_global_thread_pool(&self) -> Result<bool, rayon::ThreadPoolBuildError> {
        if let Some(num_threads) = self.max_threads {
            rayon::ThreadPoolBuilder::new()
                .num_threads(num_threads)
                .build_global()?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// Default pixel threshold.
    fn default_pixel_threshold() -> usize {
        16_384
    }
}

impl Default for ParallelPolicy {
    fn default() -> Self {
        Self {
            max_threads: None,
            pixel_threshold: Self::default_pixel_threshold(),
        }
    }
}
