//! # Memory Layout

/// UEFI page size; memory map page counts are in these units.
pub const PAGE_SIZE: u64 = 4096;

/// Everything below this address is legacy low memory and never hosts the kernel.
pub const LOW_MEMORY_LIMIT: u64 = 0x0010_0000; // 1 MiB

/// Bytes the loader sets aside for the kernel image, including its BSS.
///
/// A conventional region must be strictly larger than this to be selected.
pub const MIN_KERNEL_FOOTPRINT: u64 = 4 * 1024 * 1024; // 4 MiB

/// [`MIN_KERNEL_FOOTPRINT`] in pages.
pub const MIN_KERNEL_PAGES: u64 = MIN_KERNEL_FOOTPRINT / PAGE_SIZE;

const _: () = {
    assert!(MIN_KERNEL_FOOTPRINT.is_multiple_of(PAGE_SIZE));
    assert!(LOW_MEMORY_LIMIT.is_multiple_of(PAGE_SIZE));
    assert!(MIN_KERNEL_PAGES == 1024);
};
