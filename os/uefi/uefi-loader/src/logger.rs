use core::sync::atomic::{AtomicBool, Ordering};
use log::{LevelFilter, Log, Metadata, Record, SetLoggerError};

/// Logs to the QEMU debug port and, while boot services may be called, to the
/// firmware console.
pub struct UefiLogger {
    max_level: LevelFilter,
    console: AtomicBool,
}

impl UefiLogger {
    #[must_use]
    pub const fn new(max_level: LevelFilter) -> Self {
        Self {
            max_level,
            console: AtomicBool::new(true),
        }
    }

    /// Call this once during early init.
    ///
    /// # Errors
    /// Fails if another logger was installed first.
    pub fn init(&'static self) -> Result<(), SetLoggerError> {
        log::set_logger(self)?;
        log::set_max_level(self.max_level);
        Ok(())
    }

    /// Stops mirroring to the console. Console output goes through boot
    /// services, which may allocate.
    pub fn detach_console(&self) {
        self.console.store(false, Ordering::Release);
    }

    /// Mirrors to the console again. Boot services must still be available.
    pub fn attach_console(&self) {
        self.console.store(true, Ordering::Release);
    }
}

impl Log for UefiLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.max_level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        kernel_qemu::write_record(record);

        if self.console.load(Ordering::Acquire) {
            uefi::println!("[{}] {}", record.level(), record.args());
        }
    }

    fn flush(&self) {}
}
