//! # Kernel Loader Core
//!
//! Everything the UEFI loader does between taking over from firmware and
//! jumping into the kernel, written against the [`firmware::BootFirmware`]
//! capability instead of the UEFI tables directly, so it runs under test on
//! the host.
//!
//! ## Boot Sequence
//!
//! 1. Capture the active display mode ([`kernel_info::boot::GraphicsInfo`]).
//! 2. Take a sizing snapshot of the memory map ([`mmap`]).
//! 3. Pick the first conventional region above 1 MiB that is larger than the
//!    kernel footprint ([`region`]) and reserve it.
//! 4. Open `Kernel.elf` on the boot volume and validate its header ([`elf::reader`]).
//! 5. Copy every `PT_LOAD` segment into the region and zero its tail ([`elf::loader`]).
//! 6. Take the final snapshot, convert it to the kernel's format, exit boot
//!    services with its key and call the kernel ([`handoff`]).
//!
//! Any failure halts with operator guidance ([`error`]).

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod config;
pub mod elf;
pub mod error;
pub mod firmware;
pub mod handoff;
pub mod mmap;
pub mod region;

pub use config::LoaderConfig;
pub use error::LoaderError;
pub use firmware::{BootFirmware, BootVolume, ImageFile, MapKey, MapLayout};
pub use handoff::{BootState, Coordinator, Handoff};
