//! # Kernel Image Reader

use crate::elf::parser::{ElfHeader, ProgramHeaderTable};
use crate::error::LoaderError;
use crate::firmware::{BootVolume, ImageFile};
use alloc::vec::Vec;
use log::{debug, info};
use uefi::Status;

/// An opened and validated kernel image.
#[derive(Debug)]
pub struct KernelImage<F> {
    pub header: ElfHeader,
    pub file: F,
}

/// Opens `file_name` in the volume root, validates its ELF header and leaves
/// the file positioned at the program header table.
///
/// # Errors
/// [`LoaderError::FileNotFound`] if the file cannot be opened,
/// [`LoaderError::InvalidMagic`] / [`LoaderError::UnsupportedClassOrArchitecture`]
/// for foreign files, [`LoaderError::ImageReadFailed`] for read and seek failures.
pub fn open_and_validate<V: BootVolume>(
    volume: &mut V,
    file_name: &str,
) -> Result<KernelImage<V::File>, LoaderError> {
    info!("Opening {file_name} ...");
    let mut file = volume.open(file_name).map_err(LoaderError::FileNotFound)?;

    let mut raw = [0u8; ElfHeader::SIZE];
    let read = file
        .read_to_fill(&mut raw)
        .map_err(LoaderError::ImageReadFailed)?;
    let header = ElfHeader::parse(&raw[..read])?;

    debug!(
        "ELF header: entry={:#x}, phoff={:#x}, phentsize={}, phnum={}",
        header.entry,
        header.program_header_offset,
        header.program_header_entry_size,
        header.program_header_count
    );

    file.set_position(header.program_header_offset)
        .map_err(LoaderError::ImageReadFailed)?;

    Ok(KernelImage { header, file })
}

impl<F: ImageFile> KernelImage<F> {
    /// Reads `e_phentsize * e_phnum` bytes from the current position into a
    /// fresh buffer.
    ///
    /// # Errors
    /// [`LoaderError::ImageReadFailed`] if the table cannot be allocated or read,
    /// or its entries are too small.
    pub fn read_program_headers(&mut self) -> Result<ProgramHeaderTable, LoaderError> {
        let size = self.header.program_table_size();

        let mut bytes = Vec::new();
        bytes
            .try_reserve_exact(size)
            .map_err(|_| LoaderError::ImageReadFailed(Status::OUT_OF_RESOURCES))?;
        bytes.resize(size, 0);

        self.file
            .read_exact(&mut bytes)
            .map_err(LoaderError::ImageReadFailed)?;

        ProgramHeaderTable::new(bytes, usize::from(self.header.program_header_entry_size))
    }
}
