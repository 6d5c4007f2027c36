//! Per-run state shared by the sizing and mirroring passes

use super::progress::ProgressTracker;
use crate::events::{Event, EventBus, LogLevel, RunLog};
use crate::types::CompareMode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Everything a worker needs while walking one pair.
///
/// Built once per `execute` and shared read-only across workers; the stop flag
/// and the progress counters are the only parts mutated concurrently.
#[derive(Debug)]
pub struct RunContext {
    mode: CompareMode,
    copy_hidden: bool,
    stop: Arc<AtomicBool>,
    bus: Arc<EventBus>,
    log: Arc<RunLog>,
    progress: ProgressTracker,
}

impl RunContext {
    pub fn new(mode: CompareMode, copy_hidden: bool, bus: Arc<EventBus>) -> Self {
        Self {
            mode,
            copy_hidden,
            stop: Arc::new(AtomicBool::new(false)),
            bus,
            log: Arc::new(RunLog::disabled()),
            progress: ProgressTracker::new(),
        }
    }

    /// Share an externally owned stop flag
    pub fn with_stop_flag(mut self, stop: Arc<AtomicBool>) -> Self {
        self.stop = stop;
        self
    }

    pub fn with_log(mut self, log: Arc<RunLog>) -> Self {
        self.log = log;
        self
    }

    pub fn mode(&self) -> CompareMode {
        self.mode
    }

    pub fn copy_hidden(&self) -> bool {
        self.copy_hidden
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    pub fn progress(&self) -> &ProgressTracker {
        &self.progress
    }

    pub fn log(&self) -> &RunLog {
        &self.log
    }

    /// Publish an informational CONSOLE line
    pub fn console(&self, message: impl Into<String>) {
        let message = message.into();
        debug!("{}", message);
        self.emit(LogLevel::Info, message);
    }

    /// Publish a CONSOLE line describing a failure
    pub fn problem(&self, message: impl Into<String>) {
        let message = message.into();
        warn!("{}", message);
        self.emit(LogLevel::Warn, message);
    }

    /// Count processed bytes and publish the percentage if it moved up
    pub fn advance(&self, bytes: u64) {
        let percent = self.progress.add(bytes);
        self.publish_progress(percent);
    }

    /// Publish `percent` unless an equal or higher value already went out
    pub fn publish_progress(&self, percent: u8) {
        self.progress.publish_if_advanced(percent, |p| {
            self.bus.publish(&Event::Progress(p));
        });
    }

    pub fn publish(&self, event: &Event) {
        self.bus.publish(event);
    }

    fn emit(&self, level: LogLevel, message: String) {
        self.log.write_line(level, &message);
        self.bus.publish(&Event::Console(message));
    }
}
