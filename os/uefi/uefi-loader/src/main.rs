//! # UEFI Kernel Loader
//!
//! Loads `Kernel.elf` from the root of the boot volume into the first free
//! region above 1 MiB, exits boot services and calls the kernel with the memory
//! map, the framebuffer description and a (zero) ACPI root pointer.
//!
//! ```text
//! UEFI Firmware
//!       ↓
//! ┌─────────────────────────────────────────────┐
//! │  uefi-loader                                │
//! │  1. Logger, allocator, watchdog off         │
//! │  2. Capture GOP mode                        │
//! │  3. Size memory map, select + reserve region│
//! │  4. Validate Kernel.elf, load PT_LOAD       │
//! │  5. Final memory map, ExitBootServices      │
//! │  6. entry(mmap, graphics, acpi)             │
//! └─────────────────────────────────────────────┘
//!       ↓
//! Kernel (physical, identity mapped)
//! ```
//!
//! All of the logic lives in `loader-core`; this crate binds it to the UEFI
//! tables. On failure the loader prints operator guidance and idles.
//!
//! ## Debug Output
//!
//! With the `qemu` feature (default) every log record also goes to QEMU's
//! debug console, which keeps working after boot services are gone:
//!
//! ```text
//! qemu-system-x86_64 ... -debugcon file:debug.log
//! ```

#![cfg_attr(target_os = "uefi", no_std, no_main)]
#![allow(unsafe_code)]

#[cfg(target_os = "uefi")]
mod file_system;
#[cfg(target_os = "uefi")]
mod firmware;
#[cfg(target_os = "uefi")]
mod framebuffer;
#[cfg(target_os = "uefi")]
mod logger;
#[cfg(target_os = "uefi")]
mod memory;

#[cfg(target_os = "uefi")]
mod app {
    use crate::firmware::UefiFirmware;
    use crate::logger::UefiLogger;
    use loader_core::{Coordinator, LoaderConfig};
    use log::{LevelFilter, info, warn};
    use uefi::prelude::*;
    use uefi::{boot, system};

    static LOGGER: UefiLogger = UefiLogger::new(LevelFilter::Debug);

    /// Watchdog code reported if the disabled timer fires anyway.
    const WATCHDOG_CODE: u64 = 0x1_0000;

    #[entry]
    fn efi_main() -> Status {
        if uefi::helpers::init().is_err() {
            return Status::UNSUPPORTED;
        }

        if LOGGER.init().is_err() {
            return Status::ABORTED;
        }

        if let Err(e) = system::with_stdout(|stdout| stdout.clear()) {
            warn!("Failed to clear the console: {:?}", e.status());
        }

        // Firmware resets the machine after five minutes unless told otherwise.
        if let Err(e) = boot::set_watchdog_timer(0, WATCHDOG_CODE, None) {
            warn!("Failed to disable the watchdog timer: {:?}", e.status());
        }

        info!("UEFI loader reporting, loading the kernel ...");

        let mut coordinator = Coordinator::new(LoaderConfig::default());
        match coordinator.boot(UefiFirmware::new(&LOGGER)) {
            // SAFETY: The coordinator loaded and validated the image and exited
            // boot services.
            Some(handoff) => unsafe { handoff.enter() },
            None => halt(),
        }
    }

    /// Idles until the machine is switched off.
    fn halt() -> ! {
        loop {
            // SAFETY: `hlt` only waits for the next interrupt.
            unsafe {
                core::arch::asm!("hlt", options(nomem, nostack, preserves_flags));
            }
        }
    }
}

#[cfg(not(target_os = "uefi"))]
fn main() {
    eprintln!("uefi-loader only runs as a UEFI application (x86_64-unknown-uefi)");
}
