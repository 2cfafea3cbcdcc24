//! Diagnostic output.
//
// The core never drives a terminal itself. Whoever owns the console
// registers a `Report` sink; every line the kernel prints is handed to it.
// Reporting is fire-and-forget: with no sink, or while the sink is busy,
// the message is dropped.

pub mod printf;

use crate::param::LINE_MAX;
use arrayvec::ArrayString;
use core::fmt;
use log::{LevelFilter, Log, Metadata, Record};
use spin::Mutex;

/// Consumer of kernel diagnostics.
pub trait Report: Sync {
    fn report(&self, message: &str);
}

static REPORTER: Mutex<Option<&'static dyn Report>> = Mutex::new(None);

/// Install the diagnostic sink, replacing any previous one.
pub fn set_reporter(sink: &'static dyn Report) {
    *REPORTER.lock() = Some(sink);
}

/// Disconnect the diagnostic sink.
pub fn clear_reporter() {
    *REPORTER.lock() = None;
}

/// Hand a message to the sink, if there is one and it is free.
pub fn report(message: &str) {
    if let Some(sink) = REPORTER.try_lock() {
        if let Some(sink) = *sink {
            sink.report(message);
        }
    }
}

/// One line of formatted output. Text that does not fit is cut.
pub struct Line(ArrayString<LINE_MAX>);
impl Line {
    pub const fn new() -> Line {
        Line(ArrayString::new_const())
    }
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}
impl Default for Line {
    fn default() -> Line {
        Line::new()
    }
}
impl fmt::Write for Line {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for c in s.chars() {
            if self.0.try_push(c).is_err() {
                break;
            }
        }
        Ok(())
    }
}

/// `log` backend printing through the console sink.
pub struct KernelLogger;
impl Log for KernelLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }
    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            printf::println!("[{}] {}: {}", record.level(), record.target(), record.args());
        }
    }
    fn flush(&self) {}
}

static LOGGER: KernelLogger = KernelLogger;

/// Route `log` records to the console. Only the first call installs
/// the logger; later calls just change the level.
pub fn consoleinit(level: LevelFilter) {
    let _ = log::set_logger(&LOGGER);
    log::set_max_level(level);
}
