//! # Firmware Capabilities
//!
//! The loader never reaches for firmware globals. Everything it needs from the
//! platform is a method on [`BootFirmware`], passed down explicitly. The UEFI
//! application implements it over boot services; tests implement it over
//! plain memory.

use kernel_info::boot::GraphicsInfo;
use uefi::Status;

/// Opaque token identifying one memory map snapshot.
///
/// Any allocation or free after the snapshot was taken invalidates the key.
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq, Hash)]
pub struct MapKey(usize);

impl MapKey {
    #[must_use]
    pub const fn new(raw: usize) -> Self {
        Self(raw)
    }

    #[must_use]
    pub const fn as_usize(self) -> usize {
        self.0
    }
}

/// The out-parameters of one `GetMemoryMap` call.
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq)]
pub struct MapLayout {
    /// Bytes the map occupies (or would occupy, if the buffer was too small).
    pub map_size: usize,
    /// Key of the map that was (or would have been) written.
    pub map_key: MapKey,
    /// Stride between two descriptors in bytes. May exceed the size of the
    /// descriptor structure the loader knows about.
    pub descriptor_size: usize,
    pub descriptor_version: u32,
}

/// Boot-time services the loader consumes.
pub trait BootFirmware {
    type Volume: BootVolume;

    /// Describes the display mode that is active right now. Must not change it.
    ///
    /// # Errors
    /// Fails if no graphics output is available.
    fn active_display_mode(&mut self) -> Result<GraphicsInfo, Status>;

    /// A single raw `GetMemoryMap` call into `buffer`.
    ///
    /// An empty buffer is the size query: firmware answers
    /// [`Status::BUFFER_TOO_SMALL`] and fills in the required size.
    fn get_memory_map(&mut self, buffer: &mut [u8]) -> (Status, MapLayout);

    /// Claims `pages` pages starting at the physical address `base` for the kernel image.
    ///
    /// # Errors
    /// Fails if firmware refuses to hand out the range.
    fn reserve_pages(&mut self, base: u64, pages: u64) -> Result<(), Status>;

    /// Opens the root directory of the volume the loader was started from.
    ///
    /// # Errors
    /// Fails if the boot device has no usable file system.
    fn open_boot_volume(&mut self) -> Result<Self::Volume, Status>;

    /// Silences everything that may call into boot services on its own,
    /// such as console mirroring of log output. Called right before the final
    /// memory map snapshot.
    fn quiesce(&mut self) {}

    /// Undoes [`Self::quiesce`]. Called if the final snapshot fails, so the
    /// halt message reaches the console again.
    fn resume(&mut self) {}

    /// Terminates boot services with the key of the most recent snapshot.
    ///
    /// Consumes the capability: nothing may call into firmware afterwards,
    /// whether the call succeeded or not.
    ///
    /// # Errors
    /// Fails with [`Status::INVALID_PARAMETER`] if `key` is stale.
    fn exit_boot_services(self, key: MapKey) -> Result<(), Status>
    where
        Self: Sized;
}

/// Root directory of the boot volume.
pub trait BootVolume {
    type File: ImageFile;

    /// Opens `name` in the root directory for reading.
    ///
    /// # Errors
    /// Fails if the file does not exist or cannot be opened.
    fn open(&mut self, name: &str) -> Result<Self::File, Status>;
}

/// A readable, seekable file.
pub trait ImageFile {
    /// Reads up to `buf.len()` bytes from the current position; returns the number read.
    /// A return of `0` means end of file.
    ///
    /// # Errors
    /// Returns the firmware status of a failed read.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Status>;

    /// Moves the read position to the absolute byte offset `position`.
    ///
    /// # Errors
    /// Returns the firmware status of a failed seek.
    fn set_position(&mut self, position: u64) -> Result<(), Status>;

    /// Reads until `buf` is full.
    ///
    /// # Errors
    /// [`Status::END_OF_FILE`] if the file ends first, or the status of a failed read.
    fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), Status> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.read(&mut buf[filled..])? {
                0 => return Err(Status::END_OF_FILE),
                n => filled += n,
            }
        }
        Ok(())
    }

    /// Reads until `buf` is full or the file ends; returns the number of bytes read.
    ///
    /// # Errors
    /// The status of a failed read.
    fn read_to_fill(&mut self, buf: &mut [u8]) -> Result<usize, Status> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.read(&mut buf[filled..])? {
                0 => break,
                n => filled += n,
            }
        }
        Ok(filled)
    }
}
