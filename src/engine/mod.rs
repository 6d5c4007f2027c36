//! Mirror engine: runs the sizing and mirroring passes over the scheduler
//!
//! A run goes through these steps:
//! 1. `execute` publishes PROGRESS(0) and schedules the sizing pass
//! 2. the sizing total becomes the progress denominator
//! 3. the mirroring pass runs over the same pairs
//! 4. the merged statistics are summarised on CONSOLE and FINISH is published
//!
//! Everything after step 1 happens on worker threads; observers subscribe to
//! the bus to follow it.

mod context;
mod progress;

pub use context::RunContext;
pub use progress::{percent_of, ProgressTracker};

use crate::config::Config;
use crate::diff::mirror_pair;
use crate::events::{Event, EventBus, RunLog, SubscriptionId, Topic};
use crate::executor::Scheduler;
use crate::scanner::path_size;
use crate::types::{validate_pairs, MirrorError, PathPair, StatKind, Statistics};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tracing::{debug, info};

/// Lifecycle of the engine's current run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Running,
    StopRequested,
    Finished { success: bool },
}

impl RunState {
    pub fn is_active(self) -> bool {
        matches!(self, RunState::Running | RunState::StopRequested)
    }
}

#[derive(Debug)]
struct RunControl {
    stop: Arc<AtomicBool>,
    state: Mutex<RunState>,
}

impl RunControl {
    fn state(&self) -> RunState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: RunState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }

    fn request_stop(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.is_active() {
            self.stop.store(true, Ordering::SeqCst);
            if *state == RunState::Running {
                *state = RunState::StopRequested;
                debug!("stop requested");
            }
        }
    }
}

/// Cloneable handle that can stop the engine's run from any thread,
/// including from inside a bus listener.
#[derive(Debug, Clone)]
pub struct StopHandle {
    control: Arc<RunControl>,
}

impl StopHandle {
    pub fn stop(&self) {
        self.control.request_stop();
    }
}

/// Backup engine mirroring a validated list of path pairs.
pub struct MirrorEngine {
    config: RwLock<Config>,
    bus: Arc<EventBus>,
    scheduler: Arc<Scheduler>,
    paths: Mutex<Vec<PathPair>>,
    control: Arc<RunControl>,
    last_statistics: Arc<Mutex<Option<Statistics>>>,
    run_log: Mutex<Option<Arc<RunLog>>>,
}

impl MirrorEngine {
    pub fn new(config: Config) -> Self {
        let scheduler = Scheduler::new(config.effective_workers())
            .with_join_interval(config.join_poll_interval());
        Self::with_scheduler(config, scheduler)
    }

    /// Engine running on a caller-supplied scheduler (e.g. with a custom device resolver)
    pub fn with_scheduler(config: Config, scheduler: Scheduler) -> Self {
        Self {
            config: RwLock::new(config),
            bus: Arc::new(EventBus::new()),
            scheduler: Arc::new(scheduler),
            paths: Mutex::new(Vec::new()),
            control: Arc::new(RunControl {
                stop: Arc::new(AtomicBool::new(false)),
                state: Mutex::new(RunState::Idle),
            }),
            last_statistics: Arc::new(Mutex::new(None)),
            run_log: Mutex::new(None),
        }
    }

    /// Replace the path list after validating every pair.
    ///
    /// # Errors
    /// * `MirrorError::NoPaths` for an empty list
    /// * `MirrorError::MissingDirectory` / `MirrorError::OverlappingPaths` for the first bad pair
    ///
    /// On error the previously accepted list stays in place.
    pub fn set_paths<S, D>(&self, pairs: &[(S, D)]) -> Result<(), MirrorError>
    where
        S: AsRef<Path>,
        D: AsRef<Path>,
    {
        let validated = validate_pairs(pairs)?;
        debug!(pairs = validated.len(), "backup paths accepted");
        *self.paths.lock().unwrap_or_else(PoisonError::into_inner) = validated;
        Ok(())
    }

    pub fn paths(&self) -> Vec<PathPair> {
        self.paths
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Whether hidden entries are copied by the next run
    pub fn set_copy_hidden(&self, copy_hidden: bool) {
        self.config
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .copy_hidden = copy_hidden;
    }

    pub fn config(&self) -> Config {
        self.config
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Label of the active comparison policy
    pub fn backup_type(&self) -> &'static str {
        self.config().compare_mode.backup_type()
    }

    pub fn state(&self) -> RunState {
        self.control.state()
    }

    /// Statistics of the most recently finished run
    pub fn last_statistics(&self) -> Option<Statistics> {
        *self
            .last_statistics
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn bus(&self) -> Arc<EventBus> {
        Arc::clone(&self.bus)
    }

    pub fn subscribe<F>(&self, topic: Topic, listener: F) -> SubscriptionId
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.bus.subscribe(topic, listener)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.bus.unsubscribe(id)
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            control: Arc::clone(&self.control),
        }
    }

    /// Request cooperative cancellation of the current run. Idempotent.
    pub fn stop(&self) {
        self.control.request_stop();
    }

    /// Start a run and return immediately.
    ///
    /// # Errors
    /// * `MirrorError::NoPaths` if no paths were set
    /// * `MirrorError::AlreadyRunning` while a previous run is active
    /// * `MirrorError::Io` if the run log or the worker pool cannot be opened
    pub fn execute(&self) -> Result<(), MirrorError> {
        let pairs = self.paths();
        if pairs.is_empty() {
            return Err(MirrorError::NoPaths);
        }
        let config = self.config();

        let log = {
            let mut state = self
                .control
                .state
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if state.is_active() {
                return Err(MirrorError::AlreadyRunning);
            }

            let log = match &config.log_file {
                Some(path) => Arc::new(RunLog::open(path)?),
                None => Arc::new(RunLog::disabled()),
            };
            self.control.stop.store(false, Ordering::SeqCst);
            *state = RunState::Running;
            log
        };
        *self.run_log.lock().unwrap_or_else(PoisonError::into_inner) = Some(Arc::clone(&log));

        let ctx = Arc::new(
            RunContext::new(config.compare_mode, config.copy_hidden, Arc::clone(&self.bus))
                .with_stop_flag(Arc::clone(&self.control.stop))
                .with_log(Arc::clone(&log)),
        );
        info!(
            pairs = pairs.len(),
            mode = config.compare_mode.backup_type(),
            workers = self.scheduler.workers(),
            "backup run started"
        );
        ctx.publish_progress(0);

        let finisher = Finisher {
            ctx: Arc::clone(&ctx),
            control: Arc::clone(&self.control),
            last_statistics: Arc::clone(&self.last_statistics),
        };
        let sizing_ctx = Arc::clone(&ctx);
        let error_ctx = Arc::clone(&ctx);
        let scheduler = Arc::clone(&self.scheduler);
        let mirror_pairs = pairs.clone();
        let next = finisher.clone();

        let scheduled = self.scheduler.execute(
            &pairs,
            move |source, _destination| Ok(path_size(source, &sizing_ctx)),
            |a: Option<u64>, b: Option<u64>| a.unwrap_or(0).saturating_add(b.unwrap_or(0)),
            move |total| start_mirroring(&scheduler, &mirror_pairs, next, total),
            |err, pair| report_pair_error(&error_ctx, err, pair),
        );

        if let Err(err) = scheduled {
            log.close();
            self.control.set_state(RunState::Idle);
            return Err(err);
        }
        Ok(())
    }

    /// Wait for the current run to drain, then release its resources.
    ///
    /// Safe to call without a prior `execute` and more than once. Must not be
    /// called from a bus listener, which runs on a worker thread.
    pub fn join_and_dispose(&self) {
        self.scheduler.join();

        let log = self
            .run_log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(log) = log {
            log.close();
        }

        let mut state = self
            .control
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if matches!(*state, RunState::Finished { .. }) {
            *state = RunState::Idle;
        }
    }
}

impl std::fmt::Debug for MirrorEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MirrorEngine")
            .field("config", &self.config())
            .field("state", &self.state())
            .field("pairs", &self.paths().len())
            .finish()
    }
}

/// Sizing-pass completion: start the mirroring pass on the same scheduler.
fn start_mirroring(
    scheduler: &Scheduler,
    pairs: &[PathPair],
    finisher: Finisher,
    total: Option<u64>,
) {
    let ctx = Arc::clone(&finisher.ctx);
    if ctx.is_stopped() {
        debug!("stopped after sizing; mirroring skipped");
        finisher.complete(None, false);
        return;
    }

    let total = total.unwrap_or(0);
    ctx.progress().set_total(total);
    debug!(bytes = total, "sizing pass finished");
    if total == 0 {
        ctx.publish_progress(100);
    }

    // A pair dropped here is never mirrored, so the run cannot succeed
    let dropped = Arc::new(AtomicBool::new(false));
    let work_ctx = Arc::clone(&ctx);
    let on_finish = finisher.clone();
    let finish_dropped = Arc::clone(&dropped);
    let scheduled = scheduler.execute(
        pairs,
        move |source, destination| Ok(mirror_pair(&work_ctx, source, destination)),
        Statistics::merge,
        move |stats| on_finish.complete(stats, finish_dropped.load(Ordering::SeqCst)),
        |err, pair| {
            dropped.store(true, Ordering::SeqCst);
            report_pair_error(&ctx, err, pair);
        },
    );

    if let Err(err) = scheduled {
        ctx.problem(format!("Cannot start mirroring: {}", err));
        finisher.complete(None, true);
    }
}

fn report_pair_error(ctx: &RunContext, err: &MirrorError, pair: &PathPair) {
    ctx.problem(format!(
        "Skipping {} -> {}: {}",
        pair.source().display(),
        pair.destination().display(),
        err
    ));
}

/// Terminal step of a run, shared by every path that can end it.
#[derive(Clone)]
struct Finisher {
    ctx: Arc<RunContext>,
    control: Arc<RunControl>,
    last_statistics: Arc<Mutex<Option<Statistics>>>,
}

impl Finisher {
    fn complete(&self, stats: Option<Statistics>, failed: bool) {
        let ctx = &self.ctx;
        let stats = stats.unwrap_or_default();
        let stopped = ctx.is_stopped();

        if !stopped {
            ctx.publish_progress(100);
        }

        ctx.console("Statistics:");
        for kind in StatKind::ALL {
            ctx.console(stats.message(kind));
        }

        let success = stats.is_successful() && !stopped && !failed;
        *self
            .last_statistics
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(stats);
        self.control.set_state(RunState::Finished { success });

        info!(
            success,
            stopped,
            copied = stats.get(StatKind::CopiedFiles),
            removed = stats.get(StatKind::RemovedFiles),
            errors = stats.error_count(),
            "backup run finished"
        );

        ctx.log().close();
        ctx.publish(&Event::Finish(success));
    }
}
