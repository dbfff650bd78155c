//! # Memory Map Service
//!
//! `GetMemoryMap` is a two-phase protocol: ask for the size with an empty
//! buffer, allocate, ask again. The allocation in between can itself add a
//! descriptor to the map, so the buffer gets a margin of
//! [`DESCRIPTOR_MARGIN`] descriptors. The key returned by the second call is
//! only good until the next allocation.
//!
//! Descriptors are decoded by the stride firmware reports, never by the size of
//! a native struct: newer firmware may append fields to each record.

use crate::error::LoaderError;
use crate::firmware::{BootFirmware, MapKey, MapLayout};
use alloc::vec::Vec;
use kernel_info::boot::{MemoryMapEntry, RegionKind};
use kernel_info::memory::PAGE_SIZE;
use log::debug;
use uefi::Status;

/// Extra descriptors allocated on top of the size firmware asked for.
pub const DESCRIPTOR_MARGIN: usize = 2;

/// One physical range, decoded from an `EFI_MEMORY_DESCRIPTOR`.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct MemoryDescriptor {
    pub physical_start: u64,
    pub number_of_pages: u64,
    /// Raw `EFI_MEMORY_TYPE`.
    pub memory_type: u32,
}

impl MemoryDescriptor {
    /// Bytes of an `EFI_MEMORY_DESCRIPTOR` (version 1) the loader reads.
    ///
    /// ```text
    /// 0x00 Type           u32 (+4 padding)
    /// 0x08 PhysicalStart  u64
    /// 0x10 VirtualStart   u64
    /// 0x18 NumberOfPages  u64
    /// 0x20 Attribute      u64
    /// ```
    pub const ENCODED_SIZE: usize = 40;

    const TYPE_OFFSET: usize = 0x00;
    const PHYSICAL_START_OFFSET: usize = 0x08;
    const NUMBER_OF_PAGES_OFFSET: usize = 0x18;

    #[must_use]
    pub const fn new(physical_start: u64, number_of_pages: u64, memory_type: u32) -> Self {
        Self {
            physical_start,
            number_of_pages,
            memory_type,
        }
    }

    /// Decodes the leading [`Self::ENCODED_SIZE`] bytes of `record`.
    ///
    /// # Panics
    /// If `record` is shorter than [`Self::ENCODED_SIZE`].
    #[must_use]
    pub fn decode(record: &[u8]) -> Self {
        let u32_at = |at: usize| {
            let mut raw = [0u8; 4];
            raw.copy_from_slice(&record[at..at + 4]);
            u32::from_le_bytes(raw)
        };
        let u64_at = |at: usize| {
            let mut raw = [0u8; 8];
            raw.copy_from_slice(&record[at..at + 8]);
            u64::from_le_bytes(raw)
        };

        Self {
            memory_type: u32_at(Self::TYPE_OFFSET),
            physical_start: u64_at(Self::PHYSICAL_START_OFFSET),
            number_of_pages: u64_at(Self::NUMBER_OF_PAGES_OFFSET),
        }
    }

    /// Writes the descriptor in firmware layout into the leading bytes of `record`.
    /// Virtual start and attributes are written as zero.
    ///
    /// # Panics
    /// If `record` is shorter than [`Self::ENCODED_SIZE`].
    pub fn encode(&self, record: &mut [u8]) {
        record[..Self::ENCODED_SIZE].fill(0);
        record[Self::TYPE_OFFSET..Self::TYPE_OFFSET + 4]
            .copy_from_slice(&self.memory_type.to_le_bytes());
        record[Self::PHYSICAL_START_OFFSET..Self::PHYSICAL_START_OFFSET + 8]
            .copy_from_slice(&self.physical_start.to_le_bytes());
        record[Self::NUMBER_OF_PAGES_OFFSET..Self::NUMBER_OF_PAGES_OFFSET + 8]
            .copy_from_slice(&self.number_of_pages.to_le_bytes());
    }

    #[must_use]
    pub const fn kind(&self) -> RegionKind {
        RegionKind::from_efi_type(self.memory_type)
    }

    /// Capacity in bytes, saturating at `u64::MAX`.
    #[must_use]
    pub const fn size_bytes(&self) -> u64 {
        self.number_of_pages.saturating_mul(PAGE_SIZE)
    }

    /// One past the last byte, saturating at `u64::MAX`.
    #[must_use]
    pub const fn end(&self) -> u64 {
        self.physical_start.saturating_add(self.size_bytes())
    }

    #[must_use]
    pub const fn to_portable(&self) -> MemoryMapEntry {
        MemoryMapEntry::new(self.physical_start, self.number_of_pages, self.memory_type)
    }
}

/// Descriptors captured by one `GetMemoryMap` call, together with their key.
#[derive(Debug)]
pub struct MemoryMapSnapshot {
    buffer: Vec<u8>,
    layout: MapLayout,
}

impl MemoryMapSnapshot {
    /// Wraps a buffer filled by firmware.
    ///
    /// # Errors
    /// [`LoaderError::MemoryMapRetrieveFailed`] if the layout does not describe
    /// whole descriptors inside `buffer`.
    pub fn from_raw(mut buffer: Vec<u8>, layout: MapLayout) -> Result<Self, LoaderError> {
        if layout.descriptor_size < MemoryDescriptor::ENCODED_SIZE {
            return Err(LoaderError::MemoryMapRetrieveFailed(Status::INCOMPATIBLE_VERSION));
        }
        if layout.map_size > buffer.len() {
            return Err(LoaderError::MemoryMapRetrieveFailed(Status::BUFFER_TOO_SMALL));
        }

        buffer.truncate(layout.map_size);
        Ok(Self { buffer, layout })
    }

    #[must_use]
    pub const fn map_key(&self) -> MapKey {
        self.layout.map_key
    }

    #[must_use]
    pub const fn layout(&self) -> MapLayout {
        self.layout
    }

    /// Number of descriptors.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.layout.map_size / self.layout.descriptor_size
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Descriptors in firmware order.
    #[must_use]
    pub fn descriptors(&self) -> Descriptors<'_> {
        Descriptors::new(&self.buffer, self.len(), self.layout.descriptor_size)
    }

    /// The snapshot in kernel-facing form, same order, no terminator.
    pub fn portable_entries(&self) -> impl ExactSizeIterator<Item = MemoryMapEntry> + '_ {
        self.descriptors().map(|d| d.to_portable())
    }
}

/// Walks `count` records of `stride` bytes each.
#[derive(Debug, Clone)]
pub struct Descriptors<'a> {
    bytes: &'a [u8],
    count: usize,
    stride: usize,
    index: usize,
}

impl<'a> Descriptors<'a> {
    /// # Panics
    /// If `stride` is shorter than [`MemoryDescriptor::ENCODED_SIZE`] or the
    /// records do not fit into `bytes`.
    #[must_use]
    pub fn new(bytes: &'a [u8], count: usize, stride: usize) -> Self {
        assert!(stride >= MemoryDescriptor::ENCODED_SIZE);
        assert!(count.checked_mul(stride).is_some_and(|n| n <= bytes.len()));
        Self {
            bytes,
            count,
            stride,
            index: 0,
        }
    }
}

impl Iterator for Descriptors<'_> {
    type Item = MemoryDescriptor;

    fn next(&mut self) -> Option<Self::Item> {
        if self.index >= self.count {
            return None;
        }

        let at = self.index * self.stride;
        self.index += 1;
        Some(MemoryDescriptor::decode(&self.bytes[at..at + self.stride]))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.count - self.index;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Descriptors<'_> {}

/// Kernel-facing memory map whose storage was set aside before the snapshot
/// it is filled from, so filling it allocates nothing.
#[derive(Debug)]
pub struct PortableMemoryMap {
    entries: Vec<MemoryMapEntry>,
}

impl PortableMemoryMap {
    /// Reserves room for `descriptors` entries plus the terminator.
    ///
    /// # Errors
    /// [`LoaderError::MemoryMapAllocationFailed`] if the pool is exhausted.
    pub fn with_capacity(descriptors: usize) -> Result<Self, LoaderError> {
        let mut entries = Vec::new();
        entries
            .try_reserve_exact(descriptors.saturating_add(1))
            .map_err(|_| LoaderError::MemoryMapAllocationFailed(Status::OUT_OF_RESOURCES))?;
        Ok(Self { entries })
    }

    /// Replaces the contents with `snapshot`, followed by the terminator.
    ///
    /// # Errors
    /// [`LoaderError::MemoryMapAllocationFailed`] if the reserved room is too
    /// small; growing would invalidate the snapshot's key.
    pub fn fill_from(&mut self, snapshot: &MemoryMapSnapshot) -> Result<(), LoaderError> {
        if snapshot.len() >= self.entries.capacity() {
            return Err(LoaderError::MemoryMapAllocationFailed(Status::BUFFER_TOO_SMALL));
        }

        self.entries.clear();
        self.entries.extend(snapshot.portable_entries());
        self.entries.push(MemoryMapEntry::TERMINATOR);
        Ok(())
    }

    /// Entries without the terminator.
    #[must_use]
    pub fn entries(&self) -> &[MemoryMapEntry] {
        match self.entries.split_last() {
            Some((last, rest)) if last.is_terminator() => rest,
            _ => &self.entries,
        }
    }

    /// Hands the storage over for good, terminator included. The memory is
    /// never returned to the pool.
    #[must_use]
    pub fn leak(self) -> &'static [MemoryMapEntry] {
        self.entries.leak()
    }
}

/// Takes a snapshot of the current memory map.
///
/// # Errors
/// [`LoaderError::MemoryMapQueryFailed`], [`LoaderError::MemoryMapAllocationFailed`]
/// or [`LoaderError::MemoryMapRetrieveFailed`] for the three protocol phases.
pub fn acquire_snapshot<F: BootFirmware>(firmware: &mut F) -> Result<MemoryMapSnapshot, LoaderError> {
    acquire_with(firmware, |_| Ok(())).map(|(snapshot, ())| snapshot)
}

/// Takes the snapshot whose key is used for the exit transition, and sets aside
/// the storage for its portable form before the map is retrieved.
///
/// # Errors
/// As [`acquire_snapshot`].
pub fn acquire_final_snapshot<F: BootFirmware>(
    firmware: &mut F,
) -> Result<(MemoryMapSnapshot, PortableMemoryMap), LoaderError> {
    acquire_with(firmware, PortableMemoryMap::with_capacity)
}

/// Runs the two-phase protocol. `reserve` is called with the descriptor capacity
/// of the buffer, after all allocations for the buffer and before the retrieve.
fn acquire_with<F, T>(
    firmware: &mut F,
    reserve: impl FnOnce(usize) -> Result<T, LoaderError>,
) -> Result<(MemoryMapSnapshot, T), LoaderError>
where
    F: BootFirmware,
{
    let (status, probe) = firmware.get_memory_map(&mut []);
    if status != Status::BUFFER_TOO_SMALL {
        return Err(LoaderError::MemoryMapQueryFailed(status));
    }
    if probe.descriptor_size < MemoryDescriptor::ENCODED_SIZE {
        return Err(LoaderError::MemoryMapQueryFailed(Status::INCOMPATIBLE_VERSION));
    }

    let capacity = DESCRIPTOR_MARGIN
        .checked_mul(probe.descriptor_size)
        .and_then(|margin| probe.map_size.checked_add(margin))
        .ok_or(LoaderError::MemoryMapAllocationFailed(Status::BAD_BUFFER_SIZE))?;

    let mut buffer = Vec::new();
    buffer
        .try_reserve_exact(capacity)
        .map_err(|_| LoaderError::MemoryMapAllocationFailed(Status::OUT_OF_RESOURCES))?;
    buffer.resize(capacity, 0);

    let extra = reserve(capacity / probe.descriptor_size)?;

    let (status, layout) = firmware.get_memory_map(&mut buffer);
    if status.is_error() {
        return Err(LoaderError::MemoryMapRetrieveFailed(status));
    }

    let snapshot = MemoryMapSnapshot::from_raw(buffer, layout)?;
    debug!(
        "Memory map: {} descriptors, stride {} bytes, key {:#x}",
        snapshot.len(),
        layout.descriptor_size,
        layout.map_key.as_usize()
    );
    Ok((snapshot, extra))
}
