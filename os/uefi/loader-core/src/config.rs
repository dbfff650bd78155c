//! # Loader Configuration
//!
//! The loader has no runtime configuration surface; this is the compile-time
//! layout from `kernel-info` gathered in one place.

use kernel_info::boot::KERNEL_FILE_NAME;
use kernel_info::memory::{MIN_KERNEL_FOOTPRINT, PAGE_SIZE};

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct LoaderConfig {
    /// File in the boot volume root that holds the kernel.
    pub kernel_file_name: &'static str,
    /// Bytes reserved for the kernel image. The selected region must be larger.
    pub kernel_footprint: u64,
}

impl LoaderConfig {
    /// [`Self::kernel_footprint`] in whole pages.
    #[must_use]
    pub const fn kernel_pages(&self) -> u64 {
        self.kernel_footprint.div_ceil(PAGE_SIZE)
    }
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            kernel_file_name: KERNEL_FILE_NAME,
            kernel_footprint: MIN_KERNEL_FOOTPRINT,
        }
    }
}
