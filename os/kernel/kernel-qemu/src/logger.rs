use crate::qemu_trace;
use core::fmt;
use log::Record;

/// One record in the `[LEVEL] target: message` format shared by every sink of
/// this project.
pub struct RecordLine<'a, 'b>(pub &'a Record<'b>);

impl fmt::Display for RecordLine<'_, '_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let record = self.0;
        write!(f, "[{}] {}: {}", record.level(), record.target(), record.args())
    }
}

/// Writes one record to the debug console. Never allocates, so it is usable
/// up to the jump into the kernel.
pub fn write_record(record: &Record) {
    qemu_trace!("{}\n", RecordLine(record));
}
