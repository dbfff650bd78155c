//! # ELF Header Parsing

use crate::elf::{ELFCLASS64, EM_X86_64, PT_LOAD};
use crate::error::LoaderError;
use alloc::vec::Vec;
use core::mem::size_of;
use core::ptr::read_unaligned;
use uefi::Status;

// Minimal ELF64 definitions
#[repr(C)]
#[derive(Clone, Copy)]
#[allow(clippy::struct_field_names)]
struct Elf64Ehdr {
    e_ident: [u8; 16],
    e_type: u16,
    e_machine: u16,
    e_version: u32,
    e_entry: u64,
    e_phoff: u64,
    e_shoff: u64,
    e_flags: u32,
    e_ehsize: u16,
    e_phentsize: u16,
    e_phnum: u16,
    e_shentsize: u16,
    e_shnum: u16,
    e_shstrndx: u16,
}

#[repr(C)]
#[derive(Clone, Copy)]
#[allow(clippy::struct_field_names)]
struct Elf64Phdr {
    p_type: u32,
    p_flags: u32,
    p_offset: u64,
    p_vaddr: u64,
    p_paddr: u64,
    p_filesz: u64,
    p_memsz: u64,
    p_align: u64,
}

const _: () = {
    assert!(size_of::<Elf64Ehdr>() == 64);
    assert!(size_of::<Elf64Phdr>() == 56);
};

/// The validated parts of an ELF64 file header.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct ElfHeader {
    /// Entry point, as an offset from the load base.
    pub entry: u64,
    /// File offset of the program header table.
    pub program_header_offset: u64,
    /// Size of one program header table entry.
    pub program_header_entry_size: u16,
    /// Number of program header table entries.
    pub program_header_count: u16,
}

impl ElfHeader {
    /// Size of the ELF64 file header.
    pub const SIZE: usize = size_of::<Elf64Ehdr>();

    const EI_MAGIC_BYTES: [u8; 4] = [0x7F, b'E', b'L', b'F'];
    const EI_CLASS: usize = 4;
    const E_MACHINE: usize = 18;

    /// Validates and parses the leading bytes of an image.
    ///
    /// Checks, in this order: the signature, the class byte (must be ELF64)
    /// together with the machine (must be x86-64), then that the whole header
    /// is present. Nothing else in `e_ident` is inspected.
    ///
    /// # Errors
    /// [`LoaderError::InvalidMagic`], [`LoaderError::UnsupportedClassOrArchitecture`],
    /// or [`LoaderError::ImageReadFailed`] if `bytes` ends inside the header.
    pub fn parse(bytes: &[u8]) -> Result<Self, LoaderError> {
        if bytes.len() < Self::EI_MAGIC_BYTES.len() || bytes[..4] != Self::EI_MAGIC_BYTES {
            return Err(LoaderError::InvalidMagic);
        }

        if bytes.len() < Self::E_MACHINE + 2 {
            return Err(LoaderError::ImageReadFailed(Status::END_OF_FILE));
        }
        let class = bytes[Self::EI_CLASS];
        let machine = u16::from_le_bytes([bytes[Self::E_MACHINE], bytes[Self::E_MACHINE + 1]]);
        if class != ELFCLASS64 || machine != EM_X86_64 {
            return Err(LoaderError::UnsupportedClassOrArchitecture { class, machine });
        }

        if bytes.len() < Self::SIZE {
            return Err(LoaderError::ImageReadFailed(Status::END_OF_FILE));
        }

        // SAFETY: We just checked bounds; using read_unaligned to avoid alignment assumptions.
        let ehdr = unsafe { read_unaligned(bytes.as_ptr().cast::<Elf64Ehdr>()) };

        Ok(Self {
            entry: ehdr.e_entry,
            program_header_offset: ehdr.e_phoff,
            program_header_entry_size: ehdr.e_phentsize,
            program_header_count: ehdr.e_phnum,
        })
    }

    /// Bytes occupied by the program header table (`e_phentsize * e_phnum`).
    #[must_use]
    pub const fn program_table_size(&self) -> usize {
        self.program_header_entry_size as usize * self.program_header_count as usize
    }
}

/// One program header table entry.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct ProgramHeader {
    pub kind: u32,
    pub flags: PFlags,
    pub offset: u64,
    /// Destination, as an offset from the load base.
    pub vaddr: u64,
    pub filesz: u64,
    pub memsz: u64,
    pub align: u64,
}

impl ProgramHeader {
    /// Size of an ELF64 program header.
    pub const SIZE: usize = size_of::<Elf64Phdr>();

    /// Whether the segment must be copied into memory (`PT_LOAD`).
    #[must_use]
    pub const fn is_load(&self) -> bool {
        self.kind == PT_LOAD
    }

    /// # Panics
    /// If `bytes` is shorter than [`Self::SIZE`].
    #[must_use]
    pub fn parse(bytes: &[u8]) -> Self {
        assert!(bytes.len() >= Self::SIZE);

        // SAFETY: Length asserted above; read_unaligned copes with any alignment.
        let ph = unsafe { read_unaligned(bytes.as_ptr().cast::<Elf64Phdr>()) };
        Self {
            kind: ph.p_type,
            flags: PFlags::from_bits(ph.p_flags),
            offset: ph.p_offset,
            vaddr: ph.p_vaddr,
            filesz: ph.p_filesz,
            memsz: ph.p_memsz,
            align: ph.p_align,
        }
    }
}

/// The raw program header table, walked by `e_phentsize`.
#[derive(Debug)]
pub struct ProgramHeaderTable {
    bytes: Vec<u8>,
    entry_size: usize,
}

impl ProgramHeaderTable {
    /// # Errors
    /// [`LoaderError::ImageReadFailed`] if `entry_size` is smaller than an ELF64
    /// program header while the table is not empty.
    pub fn new(bytes: Vec<u8>, entry_size: usize) -> Result<Self, LoaderError> {
        if !bytes.is_empty() && entry_size < ProgramHeader::SIZE {
            return Err(LoaderError::ImageReadFailed(Status::LOAD_ERROR));
        }
        Ok(Self { bytes, entry_size })
    }

    /// Number of entries.
    #[must_use]
    pub const fn len(&self) -> usize {
        if self.entry_size == 0 {
            0
        } else {
            self.bytes.len() / self.entry_size
        }
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All entries in table order.
    pub fn iter(&self) -> impl Iterator<Item = ProgramHeader> + '_ {
        (0..self.len()).map(|i| {
            let at = i * self.entry_size;
            ProgramHeader::parse(&self.bytes[at..at + self.entry_size])
        })
    }

    /// `PT_LOAD` entries in table order, with their table index.
    pub fn loadable(&self) -> impl Iterator<Item = (usize, ProgramHeader)> + '_ {
        self.iter().enumerate().filter(|(_, ph)| ph.is_load())
    }
}

/// Bitfield wrapper for `Elf64_Phdr.p_flags` (32-bit)
///
/// Layout (LSB→MSB):
/// - bit 0: execute
/// - bit 1: write
/// - bit 2: read
/// - bits 3..31: reserved (must be zero for standard flags)
#[bitfield_struct::bitfield(u32)]
#[derive(PartialEq, Eq)]
pub struct PFlags {
    #[bits(1)]
    pub execute: bool,
    #[bits(1)]
    pub write: bool,
    #[bits(1)]
    pub read: bool,
    #[bits(29)]
    __: u32,
}

impl core::fmt::Display for PFlags {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let bit = |set: bool, c: char| if set { c } else { '-' };
        write!(
            f,
            "{}{}{}",
            bit(self.read(), 'R'),
            bit(self.write(), 'W'),
            bit(self.execute(), 'X')
        )
    }
}
