//! Device-aware task scheduler.
//!
//! Pairs are grouped by [`DeviceKey`]; every group becomes a chain:
//! - pairs of one chain run strictly one after another, in submission order
//! - distinct chains run concurrently on a bounded tokio pool
//! - chain results are folded with `merge`, then reduced across chains
//! - `on_finish` runs on a pool thread once all work and merges settled

use crate::device::{DeviceKey, DeviceResolver, FsDeviceResolver};
use crate::types::{MirrorError, PathPair};
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::Duration;
use tokio::runtime::{Builder, Handle, Runtime};
use tracing::{debug, error, info, warn};

const DEFAULT_JOIN_INTERVAL: Duration = Duration::from_secs(60);

/// Generic executor shared by the sizing and mirroring passes.
pub struct Scheduler {
    workers: usize,
    resolver: Arc<dyn DeviceResolver>,
    runtime: Mutex<Option<Runtime>>,
    inflight: Arc<Inflight>,
    join_interval: Duration,
}

impl Scheduler {
    /// Scheduler resolving devices from filesystem metadata.
    pub fn new(workers: usize) -> Self {
        Self::with_resolver(workers, Arc::new(FsDeviceResolver))
    }

    /// Scheduler with a custom device resolver.
    pub fn with_resolver(workers: usize, resolver: Arc<dyn DeviceResolver>) -> Self {
        Self {
            workers: workers.max(1),
            resolver,
            runtime: Mutex::new(None),
            inflight: Arc::new(Inflight::default()),
            join_interval: DEFAULT_JOIN_INTERVAL,
        }
    }

    /// Interval between liveness messages while `join` waits.
    pub fn with_join_interval(mut self, interval: Duration) -> Self {
        self.join_interval = interval.max(Duration::from_millis(1));
        self
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Number of `execute` calls whose `on_finish` has not returned yet.
    pub fn outstanding(&self) -> usize {
        self.inflight.count()
    }

    /// Run `work` for every pair and hand the merged result to `on_finish`.
    ///
    /// Returns as soon as the chains are scheduled. Pairs whose device cannot be
    /// resolved are reported through `on_pair_error` (on the calling thread) and
    /// dropped. A failing or panicking `work`, and a panicking `merge`, yield `None`
    /// in place of their result; the chain continues. `on_finish` is called exactly
    /// once, never on the calling thread, with `None` when no pair survived.
    ///
    /// # Errors
    /// * `MirrorError::Io` if the worker pool cannot be started
    pub fn execute<R, W, M, F, E>(
        &self,
        pairs: &[PathPair],
        work: W,
        merge: M,
        on_finish: F,
        mut on_pair_error: E,
    ) -> Result<(), MirrorError>
    where
        R: Send + 'static,
        W: Fn(&Path, &Path) -> Result<R, MirrorError> + Send + Sync + 'static,
        M: Fn(Option<R>, Option<R>) -> R + Send + Sync + 'static,
        F: FnOnce(Option<R>) + Send + 'static,
        E: FnMut(&MirrorError, &PathPair),
    {
        let handle = self.handle()?;

        let mut chains: HashMap<DeviceKey, Vec<PathPair>> = HashMap::new();
        for pair in pairs {
            match DeviceKey::resolve(self.resolver.as_ref(), pair) {
                Ok(key) => chains.entry(key).or_default().push(pair.clone()),
                Err(err) => {
                    warn!(
                        source = %pair.source().display(),
                        destination = %pair.destination().display(),
                        error = %err,
                        "dropping pair with unresolvable device"
                    );
                    on_pair_error(&err, pair);
                }
            }
        }
        debug!(chains = chains.len(), "scheduling backup chains");

        let work = Arc::new(work);
        let merge = Arc::new(merge);
        let guard = InflightGuard::begin(Arc::clone(&self.inflight));

        handle.spawn(async move {
            let _guard = guard;

            let tasks: Vec<_> = chains
                .into_iter()
                .map(|(key, chain)| {
                    tokio::spawn(run_chain(key, chain, Arc::clone(&work), Arc::clone(&merge)))
                })
                .collect();

            let mut results = Vec::with_capacity(tasks.len());
            for task in tasks {
                match task.await {
                    Ok(result) => results.push(result),
                    Err(err) => {
                        error!(error = %err, "backup chain aborted");
                        results.push(None);
                    }
                }
            }

            let reduced = reduce(results, merge.as_ref());
            if let Err(err) = tokio::task::spawn_blocking(move || on_finish(reduced)).await {
                error!(error = %err, "finish callback panicked");
            }
        });

        Ok(())
    }

    /// Block until every scheduled run has finished, then release the pool.
    ///
    /// Logs a liveness line each join interval while waiting. Must not be called
    /// from inside an `on_finish` callback of this scheduler.
    pub fn join(&self) {
        let mut runs = self
            .inflight
            .runs
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        while *runs > 0 {
            let (guard, timeout) = self
                .inflight
                .drained
                .wait_timeout(runs, self.join_interval)
                .unwrap_or_else(PoisonError::into_inner);
            runs = guard;
            if timeout.timed_out() && *runs > 0 {
                info!(outstanding = *runs, "joining scheduler...");
            }
        }
        drop(runs);

        let runtime = self
            .runtime
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(runtime) = runtime {
            runtime.shutdown_background();
            debug!("worker pool released");
        }
    }

    fn handle(&self) -> Result<Handle, MirrorError> {
        let mut runtime = self.runtime.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = runtime.as_ref() {
            return Ok(existing.handle().clone());
        }

        let created = Builder::new_multi_thread()
            .worker_threads(self.workers)
            .max_blocking_threads(self.workers)
            .thread_name("backmirror-worker")
            .enable_all()
            .build()
            .map_err(MirrorError::Io)?;
        let handle = created.handle().clone();
        *runtime = Some(created);
        debug!(workers = self.workers, "worker pool started");
        Ok(handle)
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        let runtime = self
            .runtime
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(runtime) = runtime {
            runtime.shutdown_background();
        }
    }
}

async fn run_chain<R, W, M>(
    key: DeviceKey,
    chain: Vec<PathPair>,
    work: Arc<W>,
    merge: Arc<M>,
) -> Option<R>
where
    R: Send + 'static,
    W: Fn(&Path, &Path) -> Result<R, MirrorError> + Send + Sync + 'static,
    M: Fn(Option<R>, Option<R>) -> R + Send + Sync + 'static,
{
    debug!(?key, pairs = chain.len(), "chain started");
    let mut accumulated: Option<R> = None;

    for (position, pair) in chain.into_iter().enumerate() {
        let job = Arc::clone(&work);
        let task_pair = pair.clone();
        let outcome =
            tokio::task::spawn_blocking(move || job(task_pair.source(), task_pair.destination()))
                .await;

        let result = match outcome {
            Ok(Ok(result)) => Some(result),
            Ok(Err(err)) => {
                error!(
                    source = %pair.source().display(),
                    destination = %pair.destination().display(),
                    error = %err,
                    "backup task failed"
                );
                None
            }
            Err(err) => {
                error!(
                    source = %pair.source().display(),
                    destination = %pair.destination().display(),
                    error = %map_join_error(err),
                    "backup task aborted"
                );
                None
            }
        };

        accumulated = if position == 0 {
            result
        } else {
            merge_guarded(merge.as_ref(), accumulated, result)
        };
    }

    accumulated
}

fn merge_guarded<R, M>(merge: &M, a: Option<R>, b: Option<R>) -> Option<R>
where
    M: Fn(Option<R>, Option<R>) -> R,
{
    match panic::catch_unwind(AssertUnwindSafe(|| merge(a, b))) {
        Ok(merged) => Some(merged),
        Err(_) => {
            error!("merge function panicked; substituting an empty result");
            None
        }
    }
}

fn reduce<R, M>(results: Vec<Option<R>>, merge: &M) -> Option<R>
where
    M: Fn(Option<R>, Option<R>) -> R,
{
    let mut results = results.into_iter();
    let first = results.next()?;
    results.fold(first, |accumulated, next| {
        merge_guarded(merge, accumulated, next)
    })
}

fn map_join_error(error: tokio::task::JoinError) -> MirrorError {
    MirrorError::TaskFailed(error.to_string())
}

#[derive(Default)]
struct Inflight {
    runs: Mutex<usize>,
    drained: Condvar,
}

impl Inflight {
    fn count(&self) -> usize {
        *self.runs.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Counts one `execute` call as outstanding until dropped.
struct InflightGuard(Arc<Inflight>);

impl InflightGuard {
    fn begin(inflight: Arc<Inflight>) -> Self {
        *inflight.runs.lock().unwrap_or_else(PoisonError::into_inner) += 1;
        Self(inflight)
    }
}

impl Drop for InflightGuard {
    fn drop(&mut self) {
        let mut runs = self.0.runs.lock().unwrap_or_else(PoisonError::into_inner);
        *runs = runs.saturating_sub(1);
        if *runs == 0 {
            self.0.drained.notify_all();
        }
    }
}
