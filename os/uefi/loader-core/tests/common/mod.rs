//! Firmware double for driving the coordinator on the host.
//!
//! Memory the kernel is loaded into is a plain heap arena; the memory map the
//! mock reports places a conventional descriptor exactly over it.
//!
//! The test binary's global allocator stands in for the firmware pool. Every
//! allocation or free invalidates the map key, and every allocation adds a
//! `LOADER_DATA` descriptor to the map, the same way real pool growth does.

#![allow(dead_code)]

mod tracking;

use kernel_info::boot::GraphicsInfo;
use loader_core::mmap::MemoryDescriptor;
use loader_core::{BootFirmware, BootVolume, ImageFile, MapKey, MapLayout};
use std::cell::RefCell;
use std::rc::Rc;
use uefi::Status;

pub use tracking::untracked;

pub const RESERVED: u32 = 0;
pub const LOADER_DATA: u32 = 2;
pub const BOOT_SERVICES_DATA: u32 = 4;
pub const CONVENTIONAL: u32 = 7;

pub const PAGE: usize = 4096;

/// Descriptor stride of newer firmware: larger than the version 1 record.
pub const STRIDE: usize = 48;

/// Where descriptors for pool growth are placed; far above any test map.
pub const POOL_BASE: u64 = 0x1_0000_0000;

/// Firmware calls in the order they happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    DisplayMode,
    /// Size query; `descriptors` is the map size reported.
    SizeQuery { descriptors: usize },
    Retrieve { key: MapKey, descriptors: usize },
    Reserve { base: u64, pages: u64 },
    OpenVolume,
    OpenFile(String),
    CloseFile,
    Quiesce,
    Resume,
    Exit { key: MapKey },
}

pub type Journal = Rc<RefCell<Vec<Call>>>;

pub const GRAPHICS: GraphicsInfo = GraphicsInfo {
    framebuffer_base: 0x8000_0000,
    framebuffer_size: 1024 * 768 * 4,
    vertical_resolution: 768,
    horizontal_resolution: 1024,
    pixels_per_scan_line: 1024,
};

/// Page-aligned memory standing in for physical RAM.
pub struct Arena {
    storage: Vec<u8>,
    offset: usize,
    base: u64,
    pub pages: usize,
}

impl Arena {
    pub fn new(pages: usize) -> Self {
        let mut storage = vec![0xCCu8; (pages + 1) * PAGE];
        let addr = storage.as_mut_ptr().expose_provenance();
        let offset = addr.next_multiple_of(PAGE) - addr;
        Self {
            storage,
            offset,
            base: (addr + offset) as u64,
            pages,
        }
    }

    pub fn base(&self) -> u64 {
        self.base
    }

    pub fn bytes(&self) -> &[u8] {
        &self.storage[self.offset..self.offset + self.pages * PAGE]
    }

    /// Conventional descriptor covering the arena.
    pub fn descriptor(&self) -> MemoryDescriptor {
        MemoryDescriptor::new(self.base(), self.pages as u64, CONVENTIONAL)
    }
}

pub struct MockFirmware {
    pub graphics: Option<GraphicsInfo>,
    pub descriptors: Vec<MemoryDescriptor>,
    pub kernel: Option<Vec<u8>>,
    /// Answer to every size query when it is not `BUFFER_TOO_SMALL`.
    pub size_query_status: Option<Status>,
    /// Answer to the size query of the final pass only.
    pub final_size_query_status: Option<Status>,
    pub reserve_status: Option<Status>,
    pub volume_status: Option<Status>,
    /// Descriptors firmware adds on its own between the final size query and
    /// the final retrieve.
    pub final_pass_growth: usize,
    /// Something in the background allocates right after the final map was retrieved.
    pub allocate_after_final_retrieve: bool,
    pub journal: Journal,
    generation: usize,
    pool_descriptors: usize,
    size_queries: usize,
    retrieves: usize,
}

impl MockFirmware {
    pub fn new(descriptors: Vec<MemoryDescriptor>, kernel: Option<Vec<u8>>) -> Self {
        // Setting up the test is not the loader's doing.
        let _ = tracking::take();
        Self {
            graphics: Some(GRAPHICS),
            descriptors,
            kernel,
            size_query_status: None,
            final_size_query_status: None,
            reserve_status: None,
            volume_status: None,
            final_pass_growth: 0,
            allocate_after_final_retrieve: false,
            journal: Journal::default(),
            generation: 0x1000,
            pool_descriptors: 0,
            size_queries: 0,
            retrieves: 0,
        }
    }

    fn record(&self, call: Call) {
        untracked(|| self.journal.borrow_mut().push(call));
    }

    /// Applies what the pool went through since the last firmware call.
    fn absorb_pool_changes(&mut self) {
        let changes = tracking::take();
        self.generation += changes.total();
        self.pool_descriptors += changes.allocations;
    }

    fn grow_pool(&mut self, descriptors: usize) {
        self.generation += descriptors;
        self.pool_descriptors += descriptors;
    }

    fn descriptor_count(&self) -> usize {
        self.descriptors.len() + self.pool_descriptors
    }

    fn pool_descriptor(index: usize) -> MemoryDescriptor {
        MemoryDescriptor::new(POOL_BASE + (index * PAGE) as u64, 1, LOADER_DATA)
    }

    fn layout(&self) -> MapLayout {
        MapLayout {
            map_size: self.descriptor_count() * STRIDE,
            map_key: MapKey::new(self.generation),
            descriptor_size: STRIDE,
            descriptor_version: 1,
        }
    }
}

impl BootFirmware for MockFirmware {
    type Volume = MockVolume;

    fn active_display_mode(&mut self) -> Result<GraphicsInfo, Status> {
        self.record(Call::DisplayMode);
        self.graphics.ok_or(Status::UNSUPPORTED)
    }

    fn get_memory_map(&mut self, buffer: &mut [u8]) -> (Status, MapLayout) {
        self.absorb_pool_changes();

        if buffer.is_empty() {
            self.size_queries += 1;
            self.record(Call::SizeQuery {
                descriptors: self.descriptor_count(),
            });
            let status = self
                .final_size_query_status
                .filter(|_| self.size_queries == 2)
                .or(self.size_query_status)
                .unwrap_or(Status::BUFFER_TOO_SMALL);
            return (status, self.layout());
        }

        if self.retrieves == 1 {
            self.grow_pool(self.final_pass_growth);
        }
        let layout = self.layout();
        if buffer.len() < layout.map_size {
            return (Status::BUFFER_TOO_SMALL, layout);
        }

        let pool = (0..self.pool_descriptors).map(Self::pool_descriptor);
        let records = buffer.chunks_exact_mut(STRIDE);
        for (d, record) in self.descriptors.iter().copied().chain(pool).zip(records) {
            d.encode(record);
            record[MemoryDescriptor::ENCODED_SIZE..].fill(0xEE);
        }

        self.record(Call::Retrieve {
            key: layout.map_key,
            descriptors: self.descriptor_count(),
        });
        self.retrieves += 1;
        if self.allocate_after_final_retrieve && self.retrieves == 2 {
            drop(std::hint::black_box(vec![0u8; 64]));
        }
        (Status::SUCCESS, layout)
    }

    fn reserve_pages(&mut self, base: u64, pages: u64) -> Result<(), Status> {
        self.absorb_pool_changes();
        self.record(Call::Reserve { base, pages });
        if let Some(status) = self.reserve_status {
            return Err(status);
        }
        self.generation += 1;
        Ok(())
    }

    fn open_boot_volume(&mut self) -> Result<MockVolume, Status> {
        self.record(Call::OpenVolume);
        if let Some(status) = self.volume_status {
            return Err(status);
        }
        Ok(untracked(|| MockVolume {
            kernel: self.kernel.clone(),
            journal: self.journal.clone(),
        }))
    }

    fn quiesce(&mut self) {
        self.record(Call::Quiesce);
    }

    fn resume(&mut self) {
        self.record(Call::Resume);
    }

    fn exit_boot_services(mut self, key: MapKey) -> Result<(), Status> {
        self.absorb_pool_changes();
        self.record(Call::Exit { key });
        if key.as_usize() == self.generation {
            Ok(())
        } else {
            Err(Status::INVALID_PARAMETER)
        }
    }
}

pub struct MockVolume {
    kernel: Option<Vec<u8>>,
    journal: Journal,
}

impl BootVolume for MockVolume {
    type File = MockFile;

    fn open(&mut self, name: &str) -> Result<MockFile, Status> {
        untracked(|| -> Result<MockFile, Status> {
            self.journal.borrow_mut().push(Call::OpenFile(name.to_owned()));
            let bytes = self
                .kernel
                .clone()
                .filter(|_| name == "Kernel.elf")
                .ok_or(Status::NOT_FOUND)?;
            Ok(MockFile {
                bytes,
                pos: 0,
                journal: self.journal.clone(),
            })
        })
    }
}

pub struct MockFile {
    bytes: Vec<u8>,
    pos: usize,
    journal: Journal,
}

impl ImageFile for MockFile {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Status> {
        // Firmware file reads may come back short.
        let rest = self.bytes.get(self.pos..).unwrap_or_default();
        let n = rest.len().min(buf.len()).min(512);
        buf[..n].copy_from_slice(&rest[..n]);
        self.pos += n;
        Ok(n)
    }

    fn set_position(&mut self, position: u64) -> Result<(), Status> {
        self.pos = usize::try_from(position).map_err(|_| Status::INVALID_PARAMETER)?;
        Ok(())
    }
}

impl Drop for MockFile {
    fn drop(&mut self) {
        untracked(|| self.journal.borrow_mut().push(Call::CloseFile));
    }
}

/// One loadable segment of a generated kernel image.
pub struct Segment {
    pub vaddr: u64,
    pub data: Vec<u8>,
    pub memsz: u64,
}

/// Builds a minimal ELF64 x86-64 executable. Segment data starts at file
/// offset `0x1000`, one page per segment.
pub fn kernel_image(entry: u64, segments: &[Segment]) -> Vec<u8> {
    const PHOFF: usize = 64;
    const PHENTSIZE: usize = 56;
    const DATA: usize = 0x1000;

    let mut image = vec![0u8; DATA + segments.len() * PAGE];

    image[..4].copy_from_slice(b"\x7FELF");
    image[4] = 2; // ELFCLASS64
    image[5] = 1; // little endian
    image[6] = 1; // EV_CURRENT
    image[16..18].copy_from_slice(&2u16.to_le_bytes()); // ET_EXEC
    image[18..20].copy_from_slice(&0x3Eu16.to_le_bytes());
    image[20..24].copy_from_slice(&1u32.to_le_bytes());
    image[24..32].copy_from_slice(&entry.to_le_bytes());
    image[32..40].copy_from_slice(&(PHOFF as u64).to_le_bytes());
    image[52..54].copy_from_slice(&64u16.to_le_bytes());
    image[54..56].copy_from_slice(&(PHENTSIZE as u16).to_le_bytes());
    image[56..58].copy_from_slice(&(segments.len() as u16).to_le_bytes());

    for (i, seg) in segments.iter().enumerate() {
        let offset = DATA + i * PAGE;
        let ph = &mut image[PHOFF + i * PHENTSIZE..PHOFF + (i + 1) * PHENTSIZE];
        ph[0..4].copy_from_slice(&1u32.to_le_bytes()); // PT_LOAD
        ph[4..8].copy_from_slice(&0b101u32.to_le_bytes()); // R-X
        ph[8..16].copy_from_slice(&(offset as u64).to_le_bytes());
        ph[16..24].copy_from_slice(&seg.vaddr.to_le_bytes());
        ph[24..32].copy_from_slice(&seg.vaddr.to_le_bytes());
        ph[32..40].copy_from_slice(&(seg.data.len() as u64).to_le_bytes());
        ph[40..48].copy_from_slice(&seg.memsz.to_le_bytes());
        ph[48..56].copy_from_slice(&(PAGE as u64).to_le_bytes());

        image[offset..offset + seg.data.len()].copy_from_slice(&seg.data);
    }

    image
}
