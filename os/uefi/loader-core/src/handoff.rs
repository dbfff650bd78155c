//! # Handoff Coordinator
//!
//! Drives the loader from the first firmware call to the exit transition:
//!
//! ```text
//! Bootstrapped -> GraphicsCaptured -> MemorySized -> RegionSelected
//!     -> ImageValidated -> SegmentsLoaded -> MapFinalized -> Exited
//! ```
//!
//! Any failure ends in [`BootState::Halted`]. Nothing is retried.
//!
//! Between the final memory map snapshot and the exit call nothing may allocate
//! or free: the portable map is reserved while the snapshot is taken, file
//! handles are closed before it, and the snapshot buffer itself is never freed.
//!
//! Firmware is quiesced before the final snapshot. If that snapshot fails it is
//! resumed, so the halt message reaches the console. A failed exit call leaves
//! it quiesced: firmware may already have torn down parts of boot services.

use crate::config::LoaderConfig;
use crate::elf::loader::{LoadRegion, load_segments};
use crate::elf::reader::open_and_validate;
use crate::error::{LoaderError, SAFE_TO_POWER_OFF};
use crate::firmware::BootFirmware;
use crate::mmap::{MemoryMapSnapshot, PortableMemoryMap, acquire_final_snapshot, acquire_snapshot};
use crate::region::select_region;
use alloc::boxed::Box;
use core::fmt;
use kernel_info::boot::{GraphicsInfo, KernelEntryFn, MemoryMapEntry};
use log::{error, info};

/// Progress of the loader. Only ever moves forward.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum BootState {
    Bootstrapped,
    GraphicsCaptured,
    MemorySized,
    RegionSelected,
    ImageValidated,
    SegmentsLoaded,
    MapFinalized,
    /// Boot services are gone. Only captured data remains.
    Exited,
    /// Terminal failure.
    Halted(LoaderError),
}

impl BootState {
    const fn rank(self) -> u8 {
        match self {
            Self::Bootstrapped => 0,
            Self::GraphicsCaptured => 1,
            Self::MemorySized => 2,
            Self::RegionSelected => 3,
            Self::ImageValidated => 4,
            Self::SegmentsLoaded => 5,
            Self::MapFinalized => 6,
            Self::Exited => 7,
            Self::Halted(_) => 8,
        }
    }

    /// Whether the loader can no longer make progress.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Exited | Self::Halted(_))
    }
}

impl fmt::Display for BootState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Halted(reason) => write!(f, "Halted ({reason})"),
            other => fmt::Debug::fmt(other, f),
        }
    }
}

/// Everything the kernel receives. Valid only after the exit transition.
#[derive(Debug, Copy, Clone)]
pub struct Handoff {
    /// Physical address of the kernel entry point.
    pub entry: u64,
    /// The portable memory map, terminator included.
    pub memory_map: &'static [MemoryMapEntry],
    pub graphics: &'static GraphicsInfo,
    /// Physical address of the ACPI RSDP. Always zero: the loader does not look for it.
    pub acpi_root: u64,
}

impl Handoff {
    /// Calls the kernel entry point.
    ///
    /// # Safety
    /// `entry` must be the address of a loaded kernel whose entry point follows
    /// [`KernelEntryFn`], and boot services must have been exited.
    pub unsafe fn enter(self) -> ! {
        info!("Jumping to kernel entry at {:#x}", self.entry);

        #[allow(clippy::cast_possible_truncation)]
        let entry = core::ptr::with_exposed_provenance::<()>(self.entry as usize);

        // SAFETY: Per this function's contract, `entry` points at code with the
        // `KernelEntryFn` signature.
        let kernel: KernelEntryFn = unsafe { core::mem::transmute(entry) };
        kernel(self.memory_map.as_ptr(), self.graphics, self.acpi_root)
    }
}

/// Runs the boot sequence against one firmware instance.
#[derive(Debug)]
pub struct Coordinator {
    state: BootState,
    config: LoaderConfig,
}

impl Coordinator {
    #[must_use]
    pub const fn new(config: LoaderConfig) -> Self {
        Self {
            state: BootState::Bootstrapped,
            config,
        }
    }

    #[must_use]
    pub const fn state(&self) -> BootState {
        self.state
    }

    /// Loads the kernel and exits boot services.
    ///
    /// Returns `None` if the sequence halted; the reason is in [`Self::state`]
    /// and has been logged together with operator guidance.
    pub fn boot<F: BootFirmware>(&mut self, firmware: F) -> Option<Handoff> {
        if self.state != BootState::Bootstrapped {
            return None;
        }

        match self.run(firmware) {
            Ok(handoff) => Some(handoff),
            Err(err) => {
                self.halt(err);
                None
            }
        }
    }

    fn advance(&mut self, next: BootState) {
        debug_assert!(next.rank() > self.state.rank(), "boot state went backwards");
        info!("Boot state: {} -> {}", self.state, next);
        self.state = next;
    }

    fn halt(&mut self, err: LoaderError) {
        let guidance = err.guidance();
        error!("{}", guidance.symptom);
        error!("Cause: {}", guidance.cause);
        error!("Remedy: {}", guidance.remedy);
        error!("Details: {err}");
        error!("{SAFE_TO_POWER_OFF}");
        self.state = BootState::Halted(err);
    }

    fn run<F: BootFirmware>(&mut self, mut firmware: F) -> Result<Handoff, LoaderError> {
        let graphics = firmware
            .active_display_mode()
            .map_err(LoaderError::GraphicsUnavailable)?;
        let graphics: &'static GraphicsInfo = Box::leak(Box::new(graphics));
        info!(
            "Framebuffer {}x{} at {:#x}",
            graphics.horizontal_resolution, graphics.vertical_resolution, graphics.framebuffer_base
        );
        self.advance(BootState::GraphicsCaptured);

        let sizing = acquire_snapshot(&mut firmware)?;
        self.advance(BootState::MemorySized);

        let base = select_region(sizing.descriptors(), self.config.kernel_footprint)?;
        drop(sizing);
        firmware
            .reserve_pages(base, self.config.kernel_pages())
            .map_err(|status| LoaderError::LoadRegionUnavailable { base, status })?;

        // SAFETY: The pages were just handed to us by firmware, which identity maps
        // all memory during boot services.
        let region = unsafe { LoadRegion::new(base, self.config.kernel_footprint) };
        self.advance(BootState::RegionSelected);

        let mut volume = firmware
            .open_boot_volume()
            .map_err(LoaderError::FileSystemUnavailable)?;
        let mut image = open_and_validate(&mut volume, self.config.kernel_file_name)?;
        let table = image.read_program_headers()?;
        self.advance(BootState::ImageValidated);

        load_segments(&mut image.file, &table, &region)?;
        let entry = region.entry_point(image.header.entry)?;
        drop(table);
        drop(image);
        drop(volume);
        self.advance(BootState::SegmentsLoaded);

        firmware.quiesce();
        let (snapshot, portable) = match finalize_map(&mut firmware) {
            Ok(finalized) => finalized,
            Err(err) => {
                firmware.resume();
                return Err(err);
            }
        };
        let key = snapshot.map_key();
        self.advance(BootState::MapFinalized);

        firmware
            .exit_boot_services(key)
            .map_err(LoaderError::ExitFailed)?;

        // The pool is gone with boot services; freeing into it is undefined.
        core::mem::forget(snapshot);
        let memory_map = portable.leak();
        self.advance(BootState::Exited);

        Ok(Handoff {
            entry,
            memory_map,
            graphics,
            acpi_root: 0,
        })
    }
}

/// Final snapshot and its portable form. Nothing between this and the exit call
/// may allocate.
fn finalize_map<F: BootFirmware>(
    firmware: &mut F,
) -> Result<(MemoryMapSnapshot, PortableMemoryMap), LoaderError> {
    let (snapshot, mut portable) = acquire_final_snapshot(firmware)?;
    portable.fill_from(&snapshot)?;
    Ok((snapshot, portable))
}
