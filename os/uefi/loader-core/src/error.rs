//! # Loader Errors and Operator Guidance
//!
//! Every error is fatal. There is no caller to hand a failure to, so each
//! variant carries the text an operator needs in front of a halted machine:
//! what happened, why it probably happened, and what to try next.

use uefi::Status;

/// Appended to every halt message.
pub const SAFE_TO_POWER_OFF: &str = "It is safe to shut down by pressing the power button.";

const REBOOT_OR_UPDATE_FIRMWARE: &str = "Try rebooting your system. If the issue persists, update your UEFI firmware.";
const REPAIR_KERNEL: &str =
    "Try repairing the kernel file using the installation USB. The command is \"fixkernel\".";

#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum LoaderError {
    #[error("Failed to load graphics information (status {0:?})")]
    GraphicsUnavailable(Status),
    #[error("Failed to determine the size of the memory map (status {0:?})")]
    MemoryMapQueryFailed(Status),
    #[error("Failed to allocate memory to hold the memory map (status {0:?})")]
    MemoryMapAllocationFailed(Status),
    #[error("Failed to retrieve the memory map (status {0:?})")]
    MemoryMapRetrieveFailed(Status),
    #[error("Could not find a suitable memory region to load the kernel")]
    NoSuitableLoadRegion,
    #[error("The kernel load region at {base:#x} could not be reserved (status {status:?})")]
    LoadRegionUnavailable { base: u64, status: Status },
    #[error("Failed to access the file system of the boot device (status {0:?})")]
    FileSystemUnavailable(Status),
    #[error("Failed to open the kernel file (status {0:?})")]
    FileNotFound(Status),
    #[error("The kernel file is not an ELF image")]
    InvalidMagic,
    #[error("The kernel file is not a 64-bit x86-64 ELF image (class {class}, machine {machine:#x})")]
    UnsupportedClassOrArchitecture { class: u8, machine: u16 },
    #[error("Failed to read the kernel file headers (status {0:?})")]
    ImageReadFailed(Status),
    #[error("Failed to read kernel segment {index} (status {status:?})")]
    SegmentReadFailed { index: usize, status: Status },
    #[error("Kernel segment {index} does not fit the load region")]
    SegmentOutOfRegion { index: usize },
    #[error("The kernel entry point {entry:#x} lies outside the load region")]
    EntryPointOutOfRegion { entry: u64 },
    #[error("Failed to exit the UEFI environment (status {0:?})")]
    ExitFailed(Status),
}

/// Operator-facing description of a fatal condition.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Guidance {
    /// What went wrong, in the operator's terms.
    pub symptom: &'static str,
    /// The most likely reason.
    pub cause: &'static str,
    /// What to try.
    pub remedy: &'static str,
}

impl LoaderError {
    /// Guidance to print before halting.
    #[must_use]
    pub const fn guidance(&self) -> Guidance {
        match self {
            Self::GraphicsUnavailable(_) => Guidance {
                symptom: "Failed to load graphics information. Booting is no longer possible.",
                cause: "The firmware does not expose a graphics output device.",
                remedy: "Try rebooting your system or switching between integrated and external graphics. If the issue persists, update your UEFI firmware.",
            },
            Self::MemoryMapQueryFailed(_) => Guidance {
                symptom: "Failed to determine the size of memory required to hold all memory information.",
                cause: "The firmware rejected the memory map size query.",
                remedy: REBOOT_OR_UPDATE_FIRMWARE,
            },
            Self::MemoryMapAllocationFailed(_) => Guidance {
                symptom: "Failed to allocate memory space to hold full memory information.",
                cause: "The firmware memory pool is exhausted.",
                remedy: REBOOT_OR_UPDATE_FIRMWARE,
            },
            Self::MemoryMapRetrieveFailed(_) => Guidance {
                symptom: "Failed to load full memory information.",
                cause: "The firmware could not fill in the memory map.",
                remedy: REBOOT_OR_UPDATE_FIRMWARE,
            },
            Self::NoSuitableLoadRegion => Guidance {
                symptom: "Could not find suitable space to load the kernel.",
                cause: "No free memory region above 1 MiB is large enough for the kernel.",
                remedy: "Try adding more memory to your device or upgrading your memory.",
            },
            Self::LoadRegionUnavailable { .. } => Guidance {
                symptom: "Could not reserve the memory selected for the kernel.",
                cause: "The firmware handed the selected region out in the meantime.",
                remedy: REBOOT_OR_UPDATE_FIRMWARE,
            },
            Self::FileSystemUnavailable(_) => Guidance {
                symptom: "Failed to activate the file system of the boot device.",
                cause: "The boot device is disconnected, damaged, or not FAT formatted.",
                remedy: "Check that the storage device is properly connected and free of physical damage. If the problem persists, update your UEFI firmware.",
            },
            Self::FileNotFound(_) => Guidance {
                symptom: "Failed to read the kernel file.",
                cause: "The file \"Kernel.elf\" is missing from the root of the boot device.",
                remedy: "Verify that the \"Kernel.elf\" file exists and that the device is properly connected. If the problem persists, update your UEFI firmware.",
            },
            Self::InvalidMagic => Guidance {
                symptom: "The kernel file is in an untrusted format.",
                cause: "The file does not start with the ELF signature.",
                remedy: REPAIR_KERNEL,
            },
            Self::UnsupportedClassOrArchitecture { .. } => Guidance {
                symptom: "The kernel file does not support 64-bit.",
                cause: "Only 64-bit x86-64 kernels are supported. This may be a modified kernel file.",
                remedy: REPAIR_KERNEL,
            },
            Self::ImageReadFailed(_) => Guidance {
                symptom: "An error occurred while parsing the kernel file.",
                cause: "The kernel file is truncated or its program header table is malformed.",
                remedy: REPAIR_KERNEL,
            },
            Self::SegmentReadFailed { .. } => Guidance {
                symptom: "An error occurred while loading the kernel into memory.",
                cause: "The kernel file is truncated or the boot device failed mid-read.",
                remedy: REPAIR_KERNEL,
            },
            Self::SegmentOutOfRegion { .. } | Self::EntryPointOutOfRegion { .. } => Guidance {
                symptom: "The kernel does not fit into the memory reserved for it.",
                cause: "The kernel was linked for a different load address or has grown beyond the supported size.",
                remedy: REPAIR_KERNEL,
            },
            Self::ExitFailed(_) => Guidance {
                symptom: "Failed to exit the UEFI environment.",
                cause: "The memory map changed between the final snapshot and the exit call.",
                remedy: REBOOT_OR_UPDATE_FIRMWARE,
            },
        }
    }
}
