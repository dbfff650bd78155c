//! # Boot Volume Access

use loader_core::{BootVolume, ImageFile};
use log::debug;
use uefi::boot::{self, ScopedProtocol};
use uefi::proto::media::file::{Directory, File, FileAttribute, FileMode, RegularFile};
use uefi::proto::media::fs::SimpleFileSystem;
use uefi::{CStr16, Status};

/// Longest file name accepted, in UCS-2 code units including the terminator.
const MAX_NAME_LEN: usize = 64;

/// Root directory of the volume the loader image was started from.
pub struct EspVolume {
    root: Directory,
    // Keeps the protocol open for as long as the directory is in use.
    _fs: ScopedProtocol<SimpleFileSystem>,
}

impl EspVolume {
    /// # Errors
    /// Fails if the boot device exposes no simple file system.
    pub fn open() -> Result<Self, Status> {
        let mut fs = boot::get_image_file_system(boot::image_handle()).map_err(|e| e.status())?;
        let root = fs.open_volume().map_err(|e| e.status())?;
        Ok(Self { root, _fs: fs })
    }
}

impl BootVolume for EspVolume {
    type File = EspFile;

    fn open(&mut self, name: &str) -> Result<EspFile, Status> {
        let mut buf = [0u16; MAX_NAME_LEN];
        let path = CStr16::from_str_with_buf(name, &mut buf).map_err(|_| Status::INVALID_PARAMETER)?;

        let handle = self
            .root
            .open(path, FileMode::Read, FileAttribute::empty())
            .map_err(|e| e.status())?;
        let file = handle.into_regular_file().ok_or(Status::NOT_FOUND)?;

        debug!("Opened {name}");
        Ok(EspFile(file))
    }
}

/// A file opened for reading. Closed on drop.
pub struct EspFile(RegularFile);

impl ImageFile for EspFile {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Status> {
        self.0.read(buf).map_err(|e| e.status())
    }

    fn set_position(&mut self, position: u64) -> Result<(), Status> {
        self.0.set_position(position).map_err(|e| e.status())
    }
}
