//! Parallel execution of run batches.
//!
//! [`RunCoordinator`] fans a batch of [`RunJob`]s out over a fixed pool of
//! worker threads. Workers pull jobs from a shared queue and report back
//! through an event channel, no other state crosses thread boundaries.
//!
//! # Engine ownership
//!
//! Each worker owns at most one engine instance at a time, created lazily
//! on the worker's first job and reused for every job that follows. After a
//! failed or panicked run the engine is discarded and the next job starts
//! with a fresh one.
//!
//! # Supervision
//!
//! With a run timeout configured, a run exceeding it is reported as timed
//! out and its worker is retired: the worker's engine is terminated through
//! its [`TerminateHandle`] when it provides one, whatever the stuck run
//! eventually returns is ignored, and the worker exits as soon as it
//! regains control. A fresh replacement worker takes over the remaining
//! queue.
//!
//! [`RunCoordinator`]: struct.RunCoordinator.html
//! [`RunJob`]: struct.RunJob.html
//! [`TerminateHandle`]: ../engine/type.TerminateHandle.html

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use fnv::FnvHashMap;

use crate::engine::{Engine, EngineFactory, TerminateHandle, TickRange};
use crate::error::Error;
use crate::params::ParameterSet;
use crate::result::RunResult;
use crate::sampler::Sampler;
use crate::{Fingerprint, Result};

/// Identifier of a worker within a single batch.
pub type WorkerId = usize;

/// Single unit of work: one run with one parameter set.
#[derive(Debug, Clone)]
pub struct RunJob {
    /// Zero-based index of the parameter set within the sweep
    pub index: usize,
    pub params: ParameterSet,
    pub deterministic: bool,
    /// Passed to the engine as `run-ix`, multi-run mode only
    pub run_tag: Option<usize>,
}

impl RunJob {
    pub fn new(index: usize, params: ParameterSet, deterministic: bool) -> Self {
        Self {
            index,
            params,
            deterministic,
            run_tag: None,
        }
    }

    pub fn tagged(mut self) -> Self {
        self.run_tag = Some(self.index);
        self
    }
}

/// Reason a run didn't produce a result.
#[derive(thiserror::Error, Debug)]
pub enum RunFailure {
    #[error("{0}")]
    Engine(#[from] Error),
    #[error("timed out after {0:?}")]
    TimedOut(Duration),
    #[error("worker panicked: {0}")]
    WorkerPanicked(String),
    #[error("no worker available: {0}")]
    WorkerUnavailable(String),
    #[error("cancelled before start")]
    Cancelled,
}

/// Failed run, with enough context to re-run it in isolation.
#[derive(thiserror::Error, Debug)]
#[error("run {index} (fingerprint {fingerprint:016x}) failed: {failure}")]
pub struct RunError {
    pub index: usize,
    pub fingerprint: Fingerprint,
    pub params: ParameterSet,
    pub failure: RunFailure,
}

/// Outcome of a single run.
pub type RunOutcome = std::result::Result<RunResult, RunError>;

/// Coordinator configuration.
#[derive(Debug, Clone)]
pub struct CoordConfig {
    /// Model each engine opens on creation
    pub model: PathBuf,
    pub ticks: TickRange,
    /// Size of the worker pool, 0 means available parallelism
    pub workers: usize,
    pub run_timeout: Option<Duration>,
    /// How long to wait for worker events before checking timeouts and
    /// cancellation
    pub poll_wait: Duration,
}

impl Default for CoordConfig {
    fn default() -> Self {
        Self {
            model: PathBuf::new(),
            ticks: TickRange::default(),
            workers: 0,
            run_timeout: None,
            poll_wait: Duration::from_millis(50),
        }
    }
}

impl CoordConfig {
    /// Number of workers to spawn for the given number of jobs.
    pub fn worker_count(&self, jobs: usize) -> usize {
        let n = match self.workers {
            0 => thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            n => n,
        };
        n.min(jobs).max(1)
    }
}

struct Dispatch {
    position: usize,
    job: RunJob,
}

enum WorkerEvent {
    Started {
        worker: WorkerId,
        position: usize,
    },
    Finished {
        worker: WorkerId,
        position: usize,
        result: std::result::Result<RunResult, RunFailure>,
    },
}

/// Terminate handle of the engine a worker currently holds.
type EngineSlot = Arc<Mutex<Option<TerminateHandle>>>;

struct WorkerHandle {
    handle: JoinHandle<()>,
    retired: Arc<AtomicBool>,
    engine: EngineSlot,
}

impl WorkerHandle {
    /// Flags the worker to exit and terminates its engine, if possible.
    fn retire(&self) {
        self.retired.store(true, Ordering::SeqCst);
        let handle = match self.engine.lock() {
            Ok(mut slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(handle) = handle {
            handle.terminate();
        }
    }
}

/// State owned by a single worker for its whole lifetime.
struct WorkerContext<F: EngineFactory> {
    id: WorkerId,
    factory: Arc<F>,
    model: PathBuf,
    sampler: Sampler,
    engine: Option<F::Engine>,
    /// Shared with the coordinator, holds the current engine's handle
    slot: EngineSlot,
}

impl<F: EngineFactory> WorkerContext<F> {
    fn engine(&mut self) -> Result<&mut F::Engine> {
        let engine = match self.engine.take() {
            Some(engine) => engine,
            None => {
                debug!("worker {}: starting engine", self.id);
                let mut engine = self.factory.create()?;
                self.set_slot(engine.terminate_handle());
                engine.open_model(&self.model)?;
                engine
            }
        };
        Ok(self.engine.get_or_insert(engine))
    }

    fn set_slot(&self, handle: Option<TerminateHandle>) {
        match self.slot.lock() {
            Ok(mut slot) => *slot = handle,
            Err(poisoned) => *poisoned.into_inner() = handle,
        }
    }

    /// Drops the current engine, the next run starts a fresh one.
    fn discard_engine(&mut self) {
        self.set_slot(None);
        self.engine = None;
    }

    fn run(&mut self, job: &RunJob) -> Result<RunResult> {
        let sampler = self.sampler;
        let engine = self.engine()?;
        sampler.sample(engine, &job.params, job.deterministic, job.run_tag)
    }
}

fn worker_loop<F: EngineFactory>(
    mut ctx: WorkerContext<F>,
    jobs: Receiver<Dispatch>,
    events: Sender<WorkerEvent>,
    retired: Arc<AtomicBool>,
) {
    while !retired.load(Ordering::SeqCst) {
        let Dispatch { position, job } = match jobs.recv() {
            Ok(d) => d,
            Err(_) => break,
        };
        let worker = ctx.id;
        if events.send(WorkerEvent::Started { worker, position }).is_err() {
            break;
        }
        let result = match panic::catch_unwind(AssertUnwindSafe(|| ctx.run(&job))) {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(e)) => {
                ctx.discard_engine();
                Err(RunFailure::Engine(e))
            }
            Err(payload) => {
                ctx.discard_engine();
                Err(RunFailure::WorkerPanicked(panic_message(&payload)))
            }
        };
        let finished = WorkerEvent::Finished {
            worker,
            position,
            result,
        };
        if events.send(finished).is_err() {
            break;
        }
    }
    trace!("worker {} exiting", ctx.id);
}

fn panic_message(payload: &Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Runs batches of independent simulation runs on a pool of workers.
pub struct RunCoordinator<F: EngineFactory + 'static> {
    factory: Arc<F>,
    config: CoordConfig,
}

impl<F: EngineFactory + 'static> RunCoordinator<F> {
    pub fn new(factory: F, config: CoordConfig) -> Self {
        Self {
            factory: Arc::new(factory),
            config,
        }
    }

    pub fn config(&self) -> &CoordConfig {
        &self.config
    }

    /// Runs all the jobs to exhaustion.
    ///
    /// Outcomes are returned in submission order, regardless of the order
    /// in which runs complete.
    pub fn run(&self, jobs: Vec<RunJob>) -> Result<Vec<RunOutcome>> {
        self.run_until(jobs, Arc::new(AtomicBool::new(true)))
    }

    /// Same as `run`, except jobs that haven't started yet once `running`
    /// turns false are reported as cancelled. Runs already in progress are
    /// allowed to finish.
    pub fn run_until(&self, jobs: Vec<RunJob>, running: Arc<AtomicBool>) -> Result<Vec<RunOutcome>> {
        self.config.ticks.validate()?;
        let total = jobs.len();
        if total == 0 {
            return Ok(Vec::new());
        }
        let submitted: Vec<(usize, ParameterSet)> =
            jobs.iter().map(|j| (j.index, j.params.clone())).collect();
        let mut slots: Vec<Option<RunOutcome>> = (0..total).map(|_| None).collect();

        let (job_tx, job_rx) = unbounded::<Dispatch>();
        let (event_tx, event_rx) = unbounded::<WorkerEvent>();
        for (position, job) in jobs.into_iter().enumerate() {
            // receiver is alive, sending can't fail
            let _ = job_tx.send(Dispatch { position, job });
        }

        if !running.load(Ordering::SeqCst) {
            warn!("cancelled before any run started");
            return Ok(submitted
                .into_iter()
                .map(|(index, params)| {
                    Err(RunError {
                        index,
                        fingerprint: params.deterministic_hash(),
                        params,
                        failure: RunFailure::Cancelled,
                    })
                })
                .collect());
        }

        let worker_count = self.config.worker_count(total);
        info!(
            "running {} jobs on {} workers, ticks {}",
            total, worker_count, self.config.ticks
        );
        let mut workers: FnvHashMap<WorkerId, WorkerHandle> = FnvHashMap::default();
        let mut next_id: WorkerId = 0;
        for _ in 0..worker_count {
            let handle = self.spawn_worker(next_id, job_rx.clone(), event_tx.clone())?;
            workers.insert(next_id, handle);
            next_id += 1;
        }

        let fail = |position: usize, failure: RunFailure| -> RunError {
            let (index, params) = &submitted[position];
            RunError {
                index: *index,
                fingerprint: params.deterministic_hash(),
                params: params.clone(),
                failure,
            }
        };

        let mut in_flight: FnvHashMap<usize, (WorkerId, Instant)> = FnvHashMap::default();
        let mut pending = total;
        let mut cancelled = false;
        while pending > 0 {
            if !cancelled && !running.load(Ordering::SeqCst) {
                cancelled = true;
                warn!("cancellation requested, skipping runs that haven't started");
                while let Ok(d) = job_rx.try_recv() {
                    slots[d.position] = Some(Err(fail(d.position, RunFailure::Cancelled)));
                    pending -= 1;
                }
                continue;
            }

            match event_rx.recv_timeout(self.config.poll_wait) {
                Ok(WorkerEvent::Started { worker, position }) => {
                    debug!(
                        "worker {} started run {}",
                        worker, submitted[position].0
                    );
                    in_flight.insert(position, (worker, Instant::now()));
                }
                Ok(WorkerEvent::Finished {
                    worker,
                    position,
                    result,
                }) => {
                    in_flight.remove(&position);
                    let index = submitted[position].0;
                    if slots[position].is_some() {
                        debug!(
                            "discarding late outcome of run {} from worker {}",
                            index, worker
                        );
                        continue;
                    }
                    pending -= 1;
                    slots[position] = match result {
                        Ok(result) => {
                            info!(
                                "run {} finished on worker {} ({}/{})",
                                index,
                                worker,
                                total - pending,
                                total
                            );
                            Some(Ok(result))
                        }
                        Err(failure) => {
                            let e = fail(position, failure);
                            error!("{}", e);
                            Some(Err(e))
                        }
                    };
                }
                Err(RecvTimeoutError::Timeout) => (),
                Err(RecvTimeoutError::Disconnected) => break,
            }

            if let Some(limit) = self.config.run_timeout {
                let expired: Vec<(usize, WorkerId)> = in_flight
                    .iter()
                    .filter(|(_, (_, started))| started.elapsed() > limit)
                    .map(|(position, (worker, _))| (*position, *worker))
                    .collect();
                for (position, worker) in expired {
                    in_flight.remove(&position);
                    pending -= 1;
                    let e = fail(position, RunFailure::TimedOut(limit));
                    error!("{}", e);
                    slots[position] = Some(Err(e));

                    if let Some(stuck) = workers.remove(&worker) {
                        warn!("retiring worker {}", worker);
                        stuck.retire();
                    }
                    if job_rx.is_empty() {
                        continue;
                    }
                    match self.spawn_worker(next_id, job_rx.clone(), event_tx.clone()) {
                        Ok(handle) => {
                            debug!("spawned replacement worker {}", next_id);
                            workers.insert(next_id, handle);
                            next_id += 1;
                        }
                        Err(e) => error!("failed spawning replacement worker: {}", e),
                    }
                }
                if workers.is_empty() {
                    while let Ok(d) = job_rx.try_recv() {
                        slots[d.position] = Some(Err(fail(
                            d.position,
                            RunFailure::WorkerUnavailable("all workers retired".to_string()),
                        )));
                        pending -= 1;
                    }
                }
            }
        }

        // closing the queue lets the remaining workers exit
        drop(job_tx);
        for (id, worker) in workers {
            if worker.handle.join().is_err() {
                error!("worker {} terminated abnormally", id);
            }
        }

        Ok(slots
            .into_iter()
            .enumerate()
            .map(|(position, slot)| match slot {
                Some(outcome) => outcome,
                None => Err(fail(
                    position,
                    RunFailure::WorkerUnavailable("worker pool shut down".to_string()),
                )),
            })
            .collect())
    }

    fn spawn_worker(
        &self,
        id: WorkerId,
        jobs: Receiver<Dispatch>,
        events: Sender<WorkerEvent>,
    ) -> Result<WorkerHandle> {
        let retired = Arc::new(AtomicBool::new(false));
        let flag = retired.clone();
        let engine: EngineSlot = Arc::new(Mutex::new(None));
        let slot = engine.clone();
        let factory = self.factory.clone();
        let model = self.config.model.clone();
        let sampler = Sampler::new(self.config.ticks);
        let handle = thread::Builder::new()
            .name(format!("antsweep-worker-{}", id))
            .spawn(move || {
                let ctx = WorkerContext {
                    id,
                    factory,
                    model,
                    sampler,
                    engine: None,
                    slot,
                };
                worker_loop(ctx, jobs, events, flag)
            })?;
        Ok(WorkerHandle {
            handle,
            retired,
            engine,
        })
    }
}
