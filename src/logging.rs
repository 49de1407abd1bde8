//! Structured logging for the buoy analysis service
//!
//! Backend for the `log` facade. Messages carry an optional unit context
//! (station / analysis) through the log target, so a batch run reads as
//! `WARN M4/gpd: ...`. Supports console output and an append-only log file
//! for scheduled batch runs.

use chrono::Utc;
use log::{Level, LevelFilter, Log, Metadata, Record};
use std::fs::OpenOptions;
use std::io::Write;
use std::sync::Mutex;

/// Target prefix used by [`unit_target`]; everything else is shown as-is.
const UNIT_PREFIX: &str = "unit:";

// ---------------------------------------------------------------------------
// Logger
// ---------------------------------------------------------------------------

pub struct ServiceLogger {
    /// Minimum log level to display
    min_level: LevelFilter,
    /// Optional file path for logging
    log_file: Option<Mutex<std::fs::File>>,
    /// Whether to include timestamps in console output
    console_timestamps: bool,
}

impl ServiceLogger {
    pub fn new(min_level: LevelFilter, log_file: Option<&str>, console_timestamps: bool) -> std::io::Result<Self> {
        let log_file = match log_file {
            Some(path) => Some(Mutex::new(
                OpenOptions::new().create(true).append(true).open(path)?,
            )),
            None => None,
        };
        Ok(Self {
            min_level,
            log_file,
            console_timestamps,
        })
    }

    /// Full log line as written to the log file.
    fn format_entry(level: Level, context: Option<&str>, message: &str) -> String {
        let timestamp = Utc::now().format("%Y-%m-%d %H:%M:%S UTC");
        let context_part = context.map(|c| format!(" [{}]", c)).unwrap_or_default();
        format!("{} {:<5}{}: {}", timestamp, level, context_part, message)
    }
}

impl Log for ServiceLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.min_level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let context = unit_context(record.target());
        let message = record.args().to_string();
        let entry = Self::format_entry(record.level(), context, &message);
        let context_part = context.map(|c| format!(" {}", c)).unwrap_or_default();

        if self.console_timestamps {
            match record.level() {
                Level::Error | Level::Warn => eprintln!("{}", entry),
                _ => println!("{}", entry),
            }
        } else {
            match record.level() {
                Level::Error => eprintln!("   ✗{}: {}", context_part, message),
                Level::Warn => eprintln!("   ⚠{}: {}", context_part, message),
                Level::Info => println!("   {}", message),
                Level::Debug | Level::Trace => println!("   [DEBUG] {}", message),
            }
        }

        if let Some(file) = &self.log_file {
            if let Ok(mut file) = file.lock() {
                if let Err(e) = writeln!(file, "{}", entry) {
                    eprintln!("Failed to write to log file: {}", e);
                }
            }
        }
    }

    fn flush(&self) {
        if let Some(file) = &self.log_file {
            if let Ok(mut file) = file.lock() {
                let _ = file.flush();
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Public helpers
// ---------------------------------------------------------------------------

/// Installs the service logger as the global `log` backend.
///
/// Fails if a logger is already installed (e.g. when a test harness set one).
pub fn init_logger(
    min_level: LevelFilter,
    log_file: Option<&str>,
    console_timestamps: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let logger = ServiceLogger::new(min_level, log_file, console_timestamps)?;
    log::set_boxed_logger(Box::new(logger))?;
    log::set_max_level(min_level);
    Ok(())
}

/// Log target carrying a station/analysis context, e.g.
/// `log::warn!(target: unit_target("M4", "gpd").as_str(), "...")`.
pub fn unit_target(station_id: &str, analysis: &str) -> String {
    format!("{}{}/{}", UNIT_PREFIX, station_id, analysis)
}

fn unit_context(target: &str) -> Option<&str> {
    target.strip_prefix(UNIT_PREFIX)
}

/// Logs the outcome of a batch run at a level matching how much failed.
pub fn log_batch_summary(total: usize, successful: usize, skipped: usize) {
    let message = format!(
        "Batch complete: {}/{} stations analyzed, {} units skipped",
        successful, total, skipped
    );

    if skipped == 0 {
        log::info!("{}", message);
    } else if successful == 0 {
        log::error!("{}", message);
    } else {
        log::warn!("{}", message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_target_round_trip() {
        let target = unit_target("M4", "gpd");
        assert_eq!(unit_context(&target), Some("M4/gpd"));
        assert_eq!(unit_context("buoymon_service::analysis"), None);
    }

    #[test]
    fn test_level_filter_respected() {
        let logger = ServiceLogger::new(LevelFilter::Warn, None, false).unwrap();
        let info = Metadata::builder().level(Level::Info).target("x").build();
        let warn = Metadata::builder().level(Level::Warn).target("x").build();
        assert!(!logger.enabled(&info));
        assert!(logger.enabled(&warn));
    }

    #[test]
    fn test_entry_format_includes_context() {
        let entry = ServiceLogger::format_entry(Level::Warn, Some("M2/gev"), "too few years");
        assert!(entry.contains("WARN"));
        assert!(entry.ends_with("[M2/gev]: too few years"));
    }
}
