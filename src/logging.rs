//! Minimal stderr logger for the `log` facade.

use log::{LevelFilter, Log, Metadata, Record};
use std::io::Write;

/// Environment variable holding the log level (`error` .. `trace`, or `off`).
pub const LOG_ENV: &str = "KERNEL_INVENTORY_LOG";

struct StderrLogger {
    level: LevelFilter,
}

impl Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let _ = writeln!(std::io::stderr(), "[{}] {}", record.level(), record.args());
        }
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

/// Level named by `value`, falling back to `Info` for unset or unknown values.
pub fn level_from(value: Option<&str>) -> LevelFilter {
    value
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(LevelFilter::Info)
}

/// Install the stderr logger at the level from [`LOG_ENV`].
///
/// Fails only if another logger was installed first.
pub fn init() -> Result<(), log::SetLoggerError> {
    let level = level_from(std::env::var(LOG_ENV).ok().as_deref());
    log::set_boxed_logger(Box::new(StderrLogger { level }))
        .map(|()| log::set_max_level(level))
}
