//! # QEMU Debug Console Sink
//!
//! Writes text to QEMU's debug console (`-debugcon`), I/O port `0x402`.
//! The port needs neither boot services nor an allocator, which makes it the
//! one output channel that survives `ExitBootServices`: the loader keeps
//! tracing through it up to the very jump into the kernel.
//!
//! ```text
//! log::info!(..) ──► UefiLogger ──► write_record(..)
//!                                         │
//!                                         ▼
//!                                   qemu_trace!(..) ──► QemuSink (fmt::Write) ──► out 0x402
//! ```
//!
//! Capture the output on the host with
//! `qemu-system-x86_64 ... -debugcon file:debug.log`.
//!
//! ## Features
//! * `enabled` (default): port writes are compiled in.
//! * without `enabled`: [`qemu_trace!`] still type-checks its arguments but
//!   writes nothing, which keeps the sink harmless on real hardware builds.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

mod logger;

pub use logger::{RecordLine, write_record};

#[cfg(all(feature = "enabled", target_arch = "x86_64"))]
#[doc(hidden)]
pub mod qemu_fmt {
    use core::fmt::{self, Write};

    /// QEMU's debug console port.
    const QEMU_DEBUG_PORT: u16 = 0x402;

    #[allow(clippy::inline_always)]
    #[inline(always)]
    fn dbg_putc(c: u8) {
        // SAFETY: a single `out` to the debug console port; on hardware without
        // the device the write goes nowhere.
        unsafe {
            core::arch::asm!(
                "out dx, al",
                in("dx") QEMU_DEBUG_PORT,
                in("al") c,
                options(nomem, nostack, preserves_flags)
            );
        }
    }

    pub struct QemuSink;

    impl Write for QemuSink {
        #[inline]
        fn write_str(&mut self, s: &str) -> fmt::Result {
            for b in s.bytes() {
                dbg_putc(b);
            }
            Ok(())
        }
    }

    #[doc(hidden)]
    #[inline]
    pub fn qemu_write(args: fmt::Arguments) {
        // Best effort; there is nobody to report a failed debug write to.
        let _ = fmt::write(&mut QemuSink, args);
    }
}

#[cfg(not(all(feature = "enabled", target_arch = "x86_64")))]
#[doc(hidden)]
pub mod qemu_fmt {
    use core::fmt;

    #[doc(hidden)]
    #[inline]
    pub fn qemu_write(_: fmt::Arguments) {}
}

/// `format!`-style write to the QEMU debug console. Never allocates.
#[macro_export]
macro_rules! qemu_trace {
    ($($arg:tt)*) => {{
        $crate::qemu_fmt::qemu_write(core::format_args!($($arg)*));
    }};
}
