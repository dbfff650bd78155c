//! # Pool-backed Global Allocator
//!
//! Every heap allocation of the loader, including the memory map buffers and the
//! data handed to the kernel, comes from the boot services pool as
//! `EfiLoaderData`. Loader data survives `ExitBootServices`, so leaked
//! allocations stay valid for the kernel.

use core::alloc::{GlobalAlloc, Layout};
use core::mem::size_of;
use core::ptr::{self, NonNull};
use uefi::boot::{self, MemoryType};

/// Only valid while boot services are active. Pool memory is 8-byte aligned;
/// larger alignments are handled by over-allocating and keeping the pool
/// pointer in the word before the returned block.
pub struct UefiBootAllocator;

#[global_allocator]
static GLOBAL_ALLOC: UefiBootAllocator = UefiBootAllocator;

const HEADER: usize = size_of::<usize>();

unsafe impl GlobalAlloc for UefiBootAllocator {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        let align = layout.align().max(HEADER);
        let Some(total) = layout
            .size()
            .max(1)
            .checked_add(align)
            .and_then(|v| v.checked_add(HEADER))
        else {
            return ptr::null_mut();
        };

        let Ok(raw) = boot::allocate_pool(MemoryType::LOADER_DATA, total) else {
            return ptr::null_mut();
        };

        let raw = raw.as_ptr();
        let padding = raw.wrapping_add(HEADER).align_offset(align);
        // SAFETY: `HEADER + padding < HEADER + align`, which the allocation covers.
        let block = unsafe { raw.add(HEADER + padding) };

        // SAFETY: The header word lies between `raw` and `block`. `block` is at
        // least word aligned, and so is the word before it.
        unsafe { block.sub(HEADER).cast::<*mut u8>().write(raw) };
        block
    }

    unsafe fn dealloc(&self, ptr: *mut u8, _layout: Layout) {
        // SAFETY: `ptr` came from `alloc`, which stored the pool pointer right before it.
        let raw = unsafe { ptr.sub(HEADER).cast::<*mut u8>().read() };

        if let Some(raw) = NonNull::new(raw) {
            // SAFETY: `raw` was returned by `allocate_pool`. A failed free leaks.
            let _ = unsafe { boot::free_pool(raw) };
        }
    }
}
