//! Log sink writing through the USART polling debug path.
//!
//! Records go out over the same wire as transport traffic, byte-interleaved
//! with whatever transmission is in flight; acceptable for bring-up and
//! fault reporting, not a framing guarantee.

use core::fmt::{self, Write};
use log::{LevelFilter, Log, Metadata, Record};

struct UsartLog;

static LOGGER: UsartLog = UsartLog;

/// Install the sink. Does nothing if a logger is already set.
pub fn init() {
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(LevelFilter::Info);
    }
}

struct DebugWriter;

impl fmt::Write for DebugWriter {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        crate::USART3.debug_write(s.as_bytes());
        Ok(())
    }
}

impl Log for UsartLog {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let mut out = DebugWriter;
            let _ = writeln!(out, "[{}] {}", record.level(), record.args());
        }
    }

    fn flush(&self) {}
}
