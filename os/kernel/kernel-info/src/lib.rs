//! # Loader-to-Kernel Handoff Interface
//!
//! This crate defines the data structures and constants shared between the
//! UEFI loader and the kernel it starts. Everything in here crosses the
//! handoff boundary, so it is `#[repr(C)]`, built from fixed-size integers,
//! and free of firmware types: the kernel must be able to read it without
//! knowing anything about UEFI.
//!
//! ## Handoff Contract
//!
//! After `ExitBootServices` the loader performs exactly one call:
//!
//! ```rust
//! # use kernel_info::boot::{GraphicsInfo, MemoryMapEntry};
//! pub type KernelEntryFn =
//!     extern "sysv64" fn(*const MemoryMapEntry, *const GraphicsInfo, u64) -> !;
//! ```
//!
//! * **Memory map**: a pointer to the first [`MemoryMapEntry`](boot::MemoryMapEntry)
//!   of a sequence that ends with [`MemoryMapEntry::TERMINATOR`](boot::MemoryMapEntry::TERMINATOR).
//! * **Graphics**: a pointer to the [`GraphicsInfo`](boot::GraphicsInfo) of the
//!   display mode that was active when the loader started.
//! * **ACPI root**: the physical address of the RSDP, currently always `0`.
//!
//! Both pointed-to objects live in loader-data memory that the firmware does not
//! reclaim; ownership passes to the kernel.
//!
//! ## Physical Layout
//!
//! ```text
//! 0x0000_0000 ┌─────────────────────────────────┐
//!             │     Low Memory (< 1 MiB)        │
//!             │  (BIOS, VGA, legacy DMA)        │  never used as a load base
//! 0x0010_0000 ├─────────────────────────────────┤
//!             │  First conventional region      │
//!             │  with > MIN_KERNEL_FOOTPRINT    │  ← load base (first fit)
//!             │    base + p_vaddr  → segment    │
//!             │    base + e_entry  → entry      │
//!             └─────────────────────────────────┘
//! ```
//!
//! The kernel is linked at virtual address zero; each `p_vaddr` is an offset from
//! whatever physical base the loader selects.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![deny(unsafe_code)]

pub mod boot;
pub mod memory;
