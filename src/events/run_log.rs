//! Run-scoped log file

use chrono::Local;
use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::{Mutex, PoisonError};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
        })
    }
}

/// Timestamped line journal for one run.
///
/// A disabled log (no file configured) accepts and drops every line.
/// `close` flushes and releases the file; later writes are dropped.
#[derive(Debug, Default)]
pub struct RunLog {
    sink: Mutex<Option<BufWriter<File>>>,
}

impl RunLog {
    /// A log that discards everything
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Create (truncating) the log file at `path`
    pub fn open(path: &Path) -> std::io::Result<Self> {
        let file = File::create(path)?;
        Ok(Self {
            sink: Mutex::new(Some(BufWriter::new(file))),
        })
    }

    pub fn write_line(&self, level: LogLevel, message: &str) {
        let mut sink = self.sink.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(writer) = sink.as_mut() {
            let stamp = Local::now().format("%Y-%m-%d %H:%M:%S%.3f");
            if let Err(err) = writeln!(writer, "{} {:<5} {}", stamp, level, message) {
                warn!(error = %err, "run log write failed; closing it");
                *sink = None;
            }
        }
    }

    pub fn is_open(&self) -> bool {
        self.sink
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Flush and release the file. Safe to call more than once.
    pub fn close(&self) {
        let writer = self
            .sink
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(mut writer) = writer {
            if let Err(err) = writer.flush() {
                warn!(error = %err, "run log flush failed");
            }
        }
    }
}
