//! System module: OS abstraction seams and logging setup.
//!
//! The engine never touches `/sys`, `/proc` or other processes directly;
//! everything goes through the [`fs::TunableFs`] and
//! [`process::ProcessControl`] traits so the apply/revert logic is testable
//! against recording in-memory doubles.

pub mod fs;
pub mod process;

use log::{Level, LevelFilter, Metadata, Record};

/// Minimal logger writing level-tagged lines to stderr.
///
/// Progress lines required by the privileged-channel contract go to stdout
/// and are printed by the binary itself; the log stream must not mix with
/// them.
struct StderrLogger;

impl log::Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= Level::Info
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            eprintln!("[{}] {}", record.level(), record.args());
        }
    }

    fn flush(&self) {}
}

/// Install the stderr logger as the global `log` backend.
///
/// Safe to call more than once; later calls are no-ops.
pub fn initialize_logging() {
    if log::set_boxed_logger(Box::new(StderrLogger)).is_ok() {
        log::set_max_level(LevelFilter::Info);
    }
}

#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {{
        let msg = format!($($arg)*);
        $crate::log::info!("{}", msg);
    }}
}

#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {{
        let msg = format!($($arg)*);
        $crate::log::warn!("{}", msg);
    }}
}

#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {{
        let msg = format!($($arg)*);
        $crate::log::error!("{}", msg);
    }}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initialize_logging_is_idempotent() {
        initialize_logging();
        initialize_logging();
        log::info!("logger installed twice without panicking");
    }
}
