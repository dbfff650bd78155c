//! # ELF Segment Loader

use crate::elf::parser::ProgramHeaderTable;
use crate::error::LoaderError;
use crate::firmware::ImageFile;
use core::ptr;
use core::slice;
use log::{debug, info};

/// The physical range the kernel image is loaded into.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct LoadRegion {
    base: u64,
    size: u64,
}

impl LoadRegion {
    /// # Safety
    /// `[base, base + size)` must be memory the caller owns exclusively: identity
    /// mapped, writable, and not covered by any live Rust reference. Segment
    /// loading writes anywhere inside it.
    #[must_use]
    pub const unsafe fn new(base: u64, size: u64) -> Self {
        Self { base, size }
    }

    #[must_use]
    pub const fn base(&self) -> u64 {
        self.base
    }

    #[must_use]
    pub const fn size(&self) -> u64 {
        self.size
    }

    /// Physical address of the image offset `entry`.
    ///
    /// # Errors
    /// [`LoaderError::EntryPointOutOfRegion`] if the entry lies outside the region.
    pub const fn entry_point(&self, entry: u64) -> Result<u64, LoaderError> {
        if entry >= self.size {
            return Err(LoaderError::EntryPointOutOfRegion { entry });
        }
        Ok(self.base + entry)
    }

    /// Start pointer and length of `[offset, offset + len)`, or `None` if it leaves the region.
    fn destination(&self, offset: u64, len: u64) -> Option<(*mut u8, usize)> {
        let end = offset.checked_add(len)?;
        if end > self.size {
            return None;
        }

        let addr = usize::try_from(self.base.checked_add(offset)?).ok()?;
        let len = usize::try_from(len).ok()?;
        Some((ptr::with_exposed_provenance_mut(addr), len))
    }
}

/// Copies every `PT_LOAD` segment of `table` to `region.base() + p_vaddr`, in
/// table order, and zero-fills the `p_memsz - p_filesz` tail of each.
///
/// No relocation is applied. Segments are assumed not to overlap.
///
/// Returns the number of segments loaded.
///
/// # Errors
/// [`LoaderError::SegmentOutOfRegion`] for a segment that leaves the region or
/// claims more file than memory bytes; [`LoaderError::SegmentReadFailed`] if
/// seeking or reading its file content fails.
pub fn load_segments<F: ImageFile>(
    file: &mut F,
    table: &ProgramHeaderTable,
    region: &LoadRegion,
) -> Result<usize, LoaderError> {
    let mut loaded = 0;

    for (index, seg) in table.loadable() {
        if seg.memsz == 0 {
            continue;
        }
        if seg.filesz > seg.memsz {
            return Err(LoaderError::SegmentOutOfRegion { index });
        }

        let (dst, len) = region
            .destination(seg.vaddr, seg.memsz)
            .ok_or(LoaderError::SegmentOutOfRegion { index })?;

        // SAFETY: The range lies inside the region, which `LoadRegion::new`'s
        // contract makes ours to write.
        let dst = unsafe { slice::from_raw_parts_mut(dst, len) };

        debug!(
            "Segment {index} [{}]: file {:#x}+{:#x} -> {:#x}+{:#x}",
            seg.flags,
            seg.offset,
            seg.filesz,
            region.base() + seg.vaddr,
            seg.memsz
        );

        file.set_position(seg.offset)
            .map_err(|status| LoaderError::SegmentReadFailed { index, status })?;

        // `filesz <= memsz` and `memsz` fit into usize, so this cannot truncate.
        #[allow(clippy::cast_possible_truncation)]
        let (data, bss) = dst.split_at_mut(seg.filesz as usize);
        file.read_exact(data)
            .map_err(|status| LoaderError::SegmentReadFailed { index, status })?;
        bss.fill(0);

        loaded += 1;
    }

    info!("Loaded {loaded} segments at {:#x}", region.base());
    Ok(loaded)
}
