//! # Boot Services Capability
//!
//! [`BootFirmware`] over the live UEFI system table.
//!
//! `GetMemoryMap` and `ExitBootServices` are called through the raw boot
//! services table: the safe wrappers allocate their own buffers and retry the
//! exit with a fresh key internally, while the loader needs to own both the
//! buffer and the key it exits with.

use crate::file_system::EspVolume;
use crate::framebuffer;
use crate::logger::UefiLogger;
use kernel_info::boot::GraphicsInfo;
use loader_core::{BootFirmware, MapKey, MapLayout};
use log::trace;
use uefi::boot::{self, AllocateType, MemoryType};
use uefi::Status;
use uefi_raw::table::boot::BootServices;

pub struct UefiFirmware {
    logger: &'static UefiLogger,
}

impl UefiFirmware {
    pub const fn new(logger: &'static UefiLogger) -> Self {
        Self { logger }
    }

    fn boot_services() -> Result<*const BootServices, Status> {
        let st = uefi::table::system_table_raw().ok_or(Status::NOT_READY)?;
        // SAFETY: The system table pointer is valid while the image runs.
        let bs = unsafe { st.as_ref().boot_services };
        if bs.is_null() {
            return Err(Status::UNSUPPORTED);
        }
        Ok(bs.cast_const())
    }
}

impl BootFirmware for UefiFirmware {
    type Volume = EspVolume;

    fn active_display_mode(&mut self) -> Result<GraphicsInfo, Status> {
        framebuffer::active_display_mode()
    }

    fn get_memory_map(&mut self, buffer: &mut [u8]) -> (Status, MapLayout) {
        let bs = match Self::boot_services() {
            Ok(bs) => bs,
            Err(status) => return (status, MapLayout::default()),
        };

        let mut map_size = buffer.len();
        let mut map_key = 0usize;
        let mut descriptor_size = 0usize;
        let mut descriptor_version = 0u32;

        // SAFETY: `buffer` is writable for `map_size` bytes and firmware writes at
        // most that many. Pool memory is 8-byte aligned.
        let status = unsafe {
            ((*bs).get_memory_map)(
                &raw mut map_size,
                buffer.as_mut_ptr().cast(),
                &raw mut map_key,
                &raw mut descriptor_size,
                &raw mut descriptor_version,
            )
        };
        trace!("GetMemoryMap({}) = {status:?}, size {map_size}, key {map_key:#x}", buffer.len());

        (
            status,
            MapLayout {
                map_size,
                map_key: MapKey::new(map_key),
                descriptor_size,
                descriptor_version,
            },
        )
    }

    fn reserve_pages(&mut self, base: u64, pages: u64) -> Result<(), Status> {
        let count = usize::try_from(pages).map_err(|_| Status::INVALID_PARAMETER)?;
        boot::allocate_pages(AllocateType::Address(base), MemoryType::LOADER_CODE, count)
            .map(|_| ())
            .map_err(|e| e.status())
    }

    fn open_boot_volume(&mut self) -> Result<EspVolume, Status> {
        EspVolume::open()
    }

    fn quiesce(&mut self) {
        self.logger.detach_console();
    }

    fn resume(&mut self) {
        self.logger.attach_console();
    }

    fn exit_boot_services(self, key: MapKey) -> Result<(), Status> {
        let bs = Self::boot_services()?;
        let image = boot::image_handle();

        // SAFETY: Called once, with the key of the most recent map. On success
        // nothing calls into boot services again: `self` is consumed and the
        // logger no longer mirrors to the console.
        let status = unsafe { ((*bs).exit_boot_services)(image.as_ptr(), key.as_usize()) };
        if status.is_success() {
            Ok(())
        } else {
            Err(status)
        }
    }
}
