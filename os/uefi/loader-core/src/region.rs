//! # Load Region Selection

use crate::error::LoaderError;
use crate::mmap::MemoryDescriptor;
use kernel_info::boot::RegionKind;
use kernel_info::memory::LOW_MEMORY_LIMIT;
use log::debug;

/// Picks the physical base the kernel is loaded at.
///
/// First fit in firmware order: the first conventional descriptor that starts at
/// or above [`LOW_MEMORY_LIMIT`] and holds strictly more than `minimum_bytes`.
/// Firmware already coalesces adjacent free ranges, so the first fit is as good
/// as any, and it is deterministic.
///
/// The bound is inclusive: a region starting exactly at 1 MiB is eligible.
/// Everything from `0x10_0000` up lies above the legacy area, and the first
/// conventional region on PC firmware commonly starts right there.
///
/// # Errors
/// [`LoaderError::NoSuitableLoadRegion`] if no descriptor qualifies.
pub fn select_region<I>(descriptors: I, minimum_bytes: u64) -> Result<u64, LoaderError>
where
    I: IntoIterator<Item = MemoryDescriptor>,
{
    let chosen = descriptors
        .into_iter()
        .find(|d| {
            d.kind() == RegionKind::Conventional
                && d.physical_start >= LOW_MEMORY_LIMIT
                && d.size_bytes() > minimum_bytes
        })
        .ok_or(LoaderError::NoSuitableLoadRegion)?;

    debug!(
        "Selected load region {:#x}..{:#x} ({} pages)",
        chosen.physical_start,
        chosen.end(),
        chosen.number_of_pages
    );
    Ok(chosen.physical_start)
}
