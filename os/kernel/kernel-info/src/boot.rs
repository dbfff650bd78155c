//! # Kernel Boot Information

/// Name of the kernel image in the root directory of the boot volume.
pub const KERNEL_FILE_NAME: &str = "Kernel.elf";

/// Kernel function pointer.
///
/// # ABI
/// The kernel is an ELF image built by a System V toolchain, so the entry point
/// is called with the `sysv64` convention even though the caller is a PE/COFF
/// UEFI application.
pub type KernelEntryFn = extern "sysv64" fn(*const MemoryMapEntry, *const GraphicsInfo, u64) -> !;

/// One physical memory range, reduced from the firmware's memory descriptor.
///
/// The kernel receives a sequence of these, closed by [`MemoryMapEntry::TERMINATOR`].
#[repr(C)]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct MemoryMapEntry {
    /// Physical address of the first byte of the range (4 KiB aligned).
    pub physical_start: u64,

    /// Length of the range in 4 KiB pages.
    pub number_of_pages: u64,

    /// Raw UEFI memory type code. Use [`MemoryMapEntry::kind`] to classify it.
    pub memory_type: u64,
}

impl MemoryMapEntry {
    /// Marks the end of the handed-off memory map.
    pub const TERMINATOR: Self = Self {
        physical_start: 0,
        number_of_pages: 0,
        memory_type: u64::MAX,
    };

    #[must_use]
    pub const fn new(physical_start: u64, number_of_pages: u64, memory_type: u32) -> Self {
        Self {
            physical_start,
            number_of_pages,
            memory_type: memory_type as u64,
        }
    }

    #[must_use]
    pub const fn is_terminator(&self) -> bool {
        self.memory_type == u64::MAX && self.number_of_pages == 0
    }

    /// Coarse classification of the raw memory type.
    #[must_use]
    pub const fn kind(&self) -> RegionKind {
        if self.memory_type > u32::MAX as u64 {
            return RegionKind::Other;
        }

        #[allow(clippy::cast_possible_truncation)]
        RegionKind::from_efi_type(self.memory_type as u32)
    }

    /// Size of the range in bytes, saturating at `u64::MAX`.
    #[must_use]
    pub const fn size_bytes(&self) -> u64 {
        self.number_of_pages
            .saturating_mul(crate::memory::PAGE_SIZE)
    }
}

/// The region classes the loader and the kernel care about.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum RegionKind {
    /// Free RAM (`EfiConventionalMemory`).
    Conventional,
    /// Not usable by the OS (`EfiReservedMemoryType`).
    Reserved,
    /// Allocated by the loader (`EfiLoaderCode` / `EfiLoaderData`); holds the
    /// kernel image and the handoff data.
    LoaderOwned,
    /// Any other firmware type (boot/runtime services, ACPI, MMIO, ...).
    Other,
}

impl RegionKind {
    const EFI_RESERVED_MEMORY_TYPE: u32 = 0;
    const EFI_LOADER_CODE: u32 = 1;
    const EFI_LOADER_DATA: u32 = 2;
    const EFI_CONVENTIONAL_MEMORY: u32 = 7;

    #[must_use]
    pub const fn from_efi_type(ty: u32) -> Self {
        match ty {
            Self::EFI_CONVENTIONAL_MEMORY => Self::Conventional,
            Self::EFI_RESERVED_MEMORY_TYPE => Self::Reserved,
            Self::EFI_LOADER_CODE | Self::EFI_LOADER_DATA => Self::LoaderOwned,
            _ => Self::Other,
        }
    }
}

/// Linear framebuffer of the display mode that was active at boot.
///
/// Keep the field order: the kernel reads the resolution fields by offset.
#[repr(C)]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct GraphicsInfo {
    /// Linear framebuffer base address (CPU physical address). Valid to write after `ExitBootServices`.
    pub framebuffer_base: u64,

    /// Total framebuffer size in **bytes**.
    pub framebuffer_size: u64,

    /// Visible height in **pixels**.
    pub vertical_resolution: u32,

    /// Visible width in **pixels**.
    pub horizontal_resolution: u32,

    /// Pixels per scanline (a.k.a. stride). May be >= width due to padding.
    pub pixels_per_scan_line: u32,
}
