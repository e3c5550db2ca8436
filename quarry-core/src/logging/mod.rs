//! Logging backend
//!
//! The engine logs through the standard `log` facade. Applications embedding
//! it may install any logger; [`init_logging`] installs the built-in one,
//! which writes formatted records to stderr.
//!
//! ```rust,no_run
//! use quarry_core::config::QuarryConfig;
//!
//! let config = QuarryConfig::load()?;
//! quarry_core::logging::init_logging(&config.logging)?;
//! log::info!("engine ready");
//! # Ok::<(), anyhow::Error>(())
//! ```

pub mod formatter;

pub use formatter::{LogEntry, LogFormat};

use crate::config::LoggingConfig;
use anyhow::{anyhow, Context};
use std::io::Write;
use std::sync::Once;

static INIT: Once = Once::new();

/// Initialize the logging system
///
/// Safe to call multiple times; only the first call installs the logger.
pub fn init_logging(config: &LoggingConfig) -> anyhow::Result<()> {
    let level: log::LevelFilter =
        config.level.parse().with_context(|| format!("Invalid log level: {}", config.level))?;
    let format = LogFormat::parse(&config.format)
        .ok_or_else(|| anyhow!("Invalid log format: {}", config.format))?;

    let mut result = Ok(());
    INIT.call_once(|| {
        result = log::set_boxed_logger(Box::new(QuarryLogger { level, format }))
            .map(|()| log::set_max_level(level))
            .map_err(|e| anyhow!("Failed to install logger: {}", e));
    });
    result
}

/// `log::Log` implementation writing formatted records to stderr
struct QuarryLogger {
    level: log::LevelFilter,
    format: LogFormat,
}

impl log::Log for QuarryLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &log::Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let entry = LogEntry::from_record(record);
        let _ = writeln!(std::io::stderr().lock(), "{}", self.format.format_entry(&entry));
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}
