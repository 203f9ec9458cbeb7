//! The lockstep multi-environment controller.
//!
//! [`MultiEnv`] owns N worker threads, each running one environment
//! behind a private channel. Every batched operation is a barrier: the
//! command is fanned out to all N workers before any response is read,
//! then all N responses are collected in worker-index order. The
//! wall-clock cost of a batched step is therefore the slowest worker,
//! not the sum.
//!
//! # Failure model
//!
//! Shape and argument errors are detected before anything is sent, so a
//! rejected call has no side effects. Errors reported by workers are
//! returned only after every outstanding response of the barrier has
//! been drained, naming the first failing worker in index order. A
//! worker whose channel disconnects or times out is marked
//! [`Closed`](WorkerState::Closed) and rejected locally from then on.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use indexmap::IndexSet;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tandem_core::{
    Action, EnvError, Environment, Info, Observation, ObservationCodec, Parameters, Spaces,
    WorkerId,
};
use tandem_wire::{Command, Response, SeedReport};
use tracing::{debug, info, warn};

use crate::channel::{self, deadline_after};
use crate::config::{ConfigError, MultiEnvConfig, ShutdownPolicy};
use crate::error::{BatchError, WorkerExit};
use crate::handle::{WorkerHandle, WorkerState};
use crate::worker;

// ── BatchResult ─────────────────────────────────────────────────────

/// Per-worker outcome of one batched step, in worker-index order.
#[derive(Clone, Debug, PartialEq)]
pub struct BatchResult {
    /// Observation after the step. For a worker whose step ended the
    /// episode this is the first observation of the next episode.
    pub observations: Vec<Observation>,
    /// Reward of the step.
    pub rewards: Vec<f64>,
    /// Whether the step ended the episode.
    pub dones: Vec<bool>,
    /// Auxiliary diagnostics of the step.
    pub infos: Vec<Info>,
}

impl BatchResult {
    fn with_capacity(n: usize) -> Self {
        Self {
            observations: Vec::with_capacity(n),
            rewards: Vec::with_capacity(n),
            dones: Vec::with_capacity(n),
            infos: Vec::with_capacity(n),
        }
    }

    /// Number of workers covered.
    pub fn len(&self) -> usize {
        self.observations.len()
    }

    /// True when no worker is covered.
    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }
}

// ── ShutdownReport ──────────────────────────────────────────────────

/// Report from [`MultiEnv::close`].
#[derive(Debug, Default)]
pub struct ShutdownReport {
    /// Total time spent in the shutdown sequence.
    pub total_ms: u64,
    /// Workers that answered `Close` with `Closed`.
    pub acknowledged: usize,
    /// Worker threads joined.
    pub joined: usize,
    /// Worker threads detached without being joined.
    pub abandoned: usize,
    /// Joined workers that exited abnormally.
    pub abnormal_exits: Vec<(WorkerId, WorkerExit)>,
}

// ── MultiEnv ────────────────────────────────────────────────────────

/// Lockstep controller over N environment workers.
pub struct MultiEnv {
    workers: Vec<WorkerHandle>,
    spaces: Spaces,
    codec: ObservationCodec,
    seed: u64,
    config: MultiEnvConfig,
    closed: bool,
}

impl MultiEnv {
    /// Spawn the workers and establish the shared spaces.
    ///
    /// `factory` runs once inside each worker thread to build that
    /// worker's environment. A factory error does not fail construction
    /// directly: the worker answers every request with a setup fault, so
    /// a failure on worker 0 surfaces here as
    /// [`ConfigError::SpacesUnavailable`] and on any other worker at the
    /// first batched call.
    pub fn new<E, F>(config: MultiEnvConfig, factory: F) -> Result<Self, ConfigError>
    where
        E: Environment + 'static,
        F: Fn(WorkerId) -> Result<E, EnvError> + Send + Sync + 'static,
    {
        config.validate()?;
        let n = config.resolved_num_envs();
        let seed = config.seed.unwrap_or_else(|| rand::rng().random());
        let seeds = derive_worker_seeds(seed, n);
        let factory = Arc::new(factory);

        let mut workers = Vec::with_capacity(n);
        for (i, &worker_seed) in seeds.iter().enumerate() {
            let id = WorkerId(i as u32);
            let (ctl, wrk) = channel::pair();
            let factory = Arc::clone(&factory);
            let retry = config.reset_retry;
            let spawned = thread::Builder::new()
                .name(format!("{}-{i}", config.thread_name_prefix))
                .spawn(move || worker::run(id, worker_seed, retry, &*factory, wrk));
            match spawned {
                Ok(thread) => workers.push(WorkerHandle::new(id, ctl, thread, worker_seed)),
                Err(e) => {
                    // Dropping the handles hangs up every worker already
                    // spawned.
                    return Err(ConfigError::ThreadSpawnFailed {
                        reason: format!("worker {i}: {e}"),
                    });
                }
            }
        }
        debug!(num_envs = n, seed, "workers spawned");

        let spaces = match fetch_spaces(&mut workers, config.response_timeout) {
            Ok(spaces) => spaces,
            Err(e) => {
                warn!(error = %e, "could not establish spaces");
                shutdown_workers(&mut workers, config.shutdown);
                return Err(ConfigError::SpacesUnavailable(e));
            }
        };
        let codec = ObservationCodec::new(spaces.observation.clone());

        Ok(Self {
            workers,
            spaces,
            codec,
            seed,
            config,
            closed: false,
        })
    }

    // ── Batched operations ──────────────────────────────────────────

    /// Step every environment with its action.
    ///
    /// `actions[i]` goes to worker `i`. Arity and membership in the
    /// action space are checked before anything is sent.
    pub fn step(&mut self, actions: &[Action]) -> Result<BatchResult, BatchError> {
        let n = self.workers.len();
        if actions.len() != n {
            return Err(BatchError::ArityMismatch {
                expected: n,
                actual: actions.len(),
            });
        }
        for (index, action) in actions.iter().enumerate() {
            self.spaces
                .action
                .check(action)
                .map_err(|reason| BatchError::InvalidActionType { index, reason })?;
        }
        self.ensure_all_open()?;

        let codec = &self.codec;
        let replies = round_trip(
            &mut self.workers,
            self.config.response_timeout,
            |i| Command::Step(actions[i].clone()),
            |worker, resp| match resp {
                Response::Step(reply) => {
                    let obs = codec
                        .decode(&reply.observation)
                        .map_err(|error| BatchError::Codec { worker, error })?;
                    Ok((obs, reply.reward, reply.done, reply.info))
                }
                other => Err(mismatch(worker, "step", other)),
            },
        )?;

        let mut out = BatchResult::with_capacity(n);
        for (obs, reward, done, info) in replies {
            out.observations.push(obs);
            out.rewards.push(reward);
            out.dones.push(done);
            out.infos.push(info);
        }
        Ok(out)
    }

    /// Reset every environment and return the initial observations.
    pub fn reset(&mut self) -> Result<Vec<Observation>, BatchError> {
        self.ensure_all_open()?;
        let codec = &self.codec;
        round_trip(
            &mut self.workers,
            self.config.response_timeout,
            |_| Command::Reset,
            |worker, resp| match resp {
                Response::Reset(flat) => codec
                    .decode(&flat)
                    .map_err(|error| BatchError::Codec { worker, error }),
                other => Err(mismatch(worker, "reset", other)),
            },
        )
    }

    /// Set the data-source chunk size of every environment. Takes
    /// effect at each worker's next reset.
    pub fn set_chunk_size(&mut self, chunk_size: i64) -> Result<(), BatchError> {
        if chunk_size <= 0 {
            return Err(BatchError::InvalidChunkSize { value: chunk_size });
        }
        self.broadcast_ack(Command::SetChunkSize(chunk_size.unsigned_abs()))
    }

    /// Set the fast-forward bound of every worker. From the next reset
    /// on, each reset skips a uniform `[0, max)` number of data steps;
    /// `0` disables skipping. [`DEFAULT_FAST_FORWARD`](crate::DEFAULT_FAST_FORWARD)
    /// is the usual bound.
    ///
    /// Each worker that acknowledges has its new bound recorded in
    /// [`fast_forward_bounds`](Self::fast_forward_bounds), even when
    /// another worker fails the broadcast.
    pub fn set_fast_forward(&mut self, max: i64) -> Result<(), BatchError> {
        if max < 0 {
            return Err(BatchError::InvalidFastForward { value: max });
        }
        let bound = max.unsigned_abs();
        self.ensure_all_open()?;
        let mut acked = Vec::with_capacity(self.workers.len());
        let outcome = round_trip(
            &mut self.workers,
            self.config.response_timeout,
            |_| Command::SetFastForward(bound),
            |worker, resp| match resp {
                Response::Ack => {
                    acked.push(worker);
                    Ok(())
                }
                other => Err(mismatch(worker, "ack", other)),
            },
        );
        for w in self.workers.iter_mut().filter(|w| acked.contains(&w.id())) {
            w.set_fast_forward_max(bound);
        }
        outcome.map(drop)
    }

    /// Every worker's seed and the seeds its environment propagated.
    pub fn get_seeds(&mut self) -> Result<Vec<SeedReport>, BatchError> {
        self.ensure_all_open()?;
        round_trip(
            &mut self.workers,
            self.config.response_timeout,
            |_| Command::GetSeed,
            |worker, resp| match resp {
                Response::Seed(report) => Ok(report),
                other => Err(mismatch(worker, "seed", other)),
            },
        )
    }

    /// Every environment's configuration.
    pub fn get_parameters(&mut self) -> Result<Vec<Parameters>, BatchError> {
        self.ensure_all_open()?;
        round_trip(
            &mut self.workers,
            self.config.response_timeout,
            |_| Command::GetParameters,
            |worker, resp| match resp {
                Response::Parameters(params) => Ok(params),
                other => Err(mismatch(worker, "parameters", other)),
            },
        )
    }

    fn broadcast_ack(&mut self, cmd: Command) -> Result<(), BatchError> {
        self.ensure_all_open()?;
        round_trip(
            &mut self.workers,
            self.config.response_timeout,
            |_| cmd.clone(),
            |worker, resp| match resp {
                Response::Ack => Ok(()),
                other => Err(mismatch(worker, "ack", other)),
            },
        )?;
        Ok(())
    }

    fn ensure_all_open(&self) -> Result<(), BatchError> {
        match self.workers.iter().find(|w| w.is_closed()) {
            Some(w) => Err(BatchError::ChannelClosed { worker: w.id() }),
            None => Ok(()),
        }
    }

    // ── Accessors ───────────────────────────────────────────────────

    /// Observation schema and action space shared by every worker.
    pub fn spaces(&self) -> &Spaces {
        &self.spaces
    }

    /// Codec built from the shared observation schema.
    pub fn codec(&self) -> &ObservationCodec {
        &self.codec
    }

    /// Number of workers.
    pub fn num_envs(&self) -> usize {
        self.workers.len()
    }

    /// Top-level seed from which every worker seed was derived.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Seeds handed to each worker, in worker order.
    pub fn worker_seeds(&self) -> Vec<u64> {
        self.workers.iter().map(WorkerHandle::seed).collect()
    }

    /// Fast-forward bound each worker last acknowledged, in worker order.
    /// `0` until [`set_fast_forward`](Self::set_fast_forward) succeeds.
    pub fn fast_forward_bounds(&self) -> Vec<u64> {
        self.workers.iter().map(WorkerHandle::fast_forward_max).collect()
    }

    /// Controller-side lifecycle of each worker.
    pub fn worker_states(&self) -> Vec<WorkerState> {
        self.workers.iter().map(WorkerHandle::state).collect()
    }

    /// Requests sent to each worker so far, including the initial
    /// `GetSpaces` to worker 0.
    pub fn messages_sent(&self) -> Vec<u64> {
        self.workers.iter().map(WorkerHandle::messages_sent).collect()
    }

    // ── Closing ─────────────────────────────────────────────────────

    /// Close one worker and join its thread.
    ///
    /// Batched operations fail with [`BatchError::ChannelClosed`] once
    /// any worker is closed.
    pub fn close_worker(&mut self, index: usize) -> Result<(), BatchError> {
        let num_envs = self.workers.len();
        let timeout = self.config.response_timeout;
        let handle = self
            .workers
            .get_mut(index)
            .ok_or(BatchError::UnknownWorker { index, num_envs })?;
        let worker = handle.id();
        handle.send(&Command::Close)?;
        let resp = handle.recv(deadline_after(timeout));
        handle.mark_closed();
        match resp? {
            Response::Closed => {}
            other => {
                handle.hang_up();
                return Err(mismatch(worker, "closed", other));
            }
        }
        handle.hang_up();
        if let Some(Err(exit)) = handle.join() {
            warn!(worker = %worker, reason = %exit, "worker exited abnormally");
        }
        debug!(worker = %worker, "worker closed");
        Ok(())
    }

    /// Close every worker and apply the configured shutdown policy.
    ///
    /// Idempotent: a second call returns an empty report.
    pub fn close(&mut self) -> ShutdownReport {
        if self.closed {
            return ShutdownReport::default();
        }
        self.closed = true;
        shutdown_workers(&mut self.workers, self.config.shutdown)
    }

    /// Whether [`close`](Self::close) has run.
    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Drop for MultiEnv {
    fn drop(&mut self) {
        if !self.closed {
            self.close();
        }
    }
}

impl std::fmt::Debug for MultiEnv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MultiEnv")
            .field("num_envs", &self.workers.len())
            .field("seed", &self.seed)
            .field("states", &self.worker_states())
            .field("closed", &self.closed)
            .finish()
    }
}

// ── Internals ───────────────────────────────────────────────────────

/// Draw `n` distinct worker seeds from a generator seeded with `seed`.
fn derive_worker_seeds(seed: u64, n: usize) -> IndexSet<u64> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut seeds = IndexSet::with_capacity(n);
    while seeds.len() < n {
        seeds.insert(rng.random::<u64>());
    }
    seeds
}

fn fetch_spaces(
    workers: &mut [WorkerHandle],
    timeout: Option<Duration>,
) -> Result<Spaces, BatchError> {
    let Some(first) = workers.first_mut() else {
        return Err(BatchError::ArityMismatch {
            expected: 1,
            actual: 0,
        });
    };
    first.send(&Command::GetSpaces)?;
    match first.recv(deadline_after(timeout))? {
        Response::Spaces(spaces) => Ok(spaces),
        other => Err(mismatch(first.id(), "spaces", other)),
    }
}

/// Map a response of the wrong kind to an error, surfacing faults as
/// such.
fn mismatch(worker: WorkerId, expected: &'static str, got: Response) -> BatchError {
    match got {
        Response::Fault(fault) => BatchError::Fault { worker, fault },
        other => BatchError::UnexpectedResponse {
            worker,
            expected,
            got: other.name(),
        },
    }
}

/// One barrier: send `command_for(i)` to every worker, then collect and
/// convert every response that is owed.
///
/// All sends precede all receives, and all receives share one deadline.
/// The first error in worker order is returned only after every owed
/// response has been read.
fn round_trip<T>(
    workers: &mut [WorkerHandle],
    timeout: Option<Duration>,
    mut command_for: impl FnMut(usize) -> Command,
    mut accept: impl FnMut(WorkerId, Response) -> Result<T, BatchError>,
) -> Result<Vec<T>, BatchError> {
    let sent: Vec<Result<(), BatchError>> = workers
        .iter_mut()
        .enumerate()
        .map(|(i, w)| w.send(&command_for(i)))
        .collect();

    let deadline = deadline_after(timeout);
    let mut out = Vec::with_capacity(workers.len());
    let mut first_err = None;
    for (w, sent) in workers.iter_mut().zip(sent) {
        let outcome = sent
            .and_then(|()| w.recv(deadline))
            .and_then(|resp| accept(w.id(), resp));
        match outcome {
            Ok(v) => out.push(v),
            Err(e) => {
                if first_err.is_none() {
                    first_err = Some(e);
                }
            }
        }
    }
    match first_err {
        Some(e) => Err(e),
        None => Ok(out),
    }
}

/// Two-phase shutdown: broadcast `Close`, then wait for acknowledgement
/// and exit according to `policy`.
fn shutdown_workers(workers: &mut [WorkerHandle], policy: ShutdownPolicy) -> ShutdownReport {
    let start = Instant::now();
    let mut report = ShutdownReport::default();

    // Phase 1: broadcast Close to every worker still open.
    let mut owed = Vec::with_capacity(workers.len());
    for w in workers.iter_mut() {
        owed.push(!w.is_closed() && w.send(&Command::Close).is_ok());
    }

    let grace = match policy {
        ShutdownPolicy::FireAndForget => {
            for w in workers.iter_mut() {
                w.hang_up();
                if w.detach() {
                    report.abandoned += 1;
                }
            }
            report.total_ms = start.elapsed().as_millis() as u64;
            debug!(abandoned = report.abandoned, "workers detached");
            return report;
        }
        ShutdownPolicy::Graceful { grace } => grace,
    };
    let deadline = start + grace;

    // Phase 2: collect acknowledgements, then hang up so that workers
    // which never saw Close exit on their next receive.
    for (w, owed) in workers.iter_mut().zip(owed) {
        if owed && matches!(w.recv(Some(deadline)), Ok(Response::Closed)) {
            report.acknowledged += 1;
        }
        w.hang_up();
    }

    // Phase 3: join finished threads until the deadline.
    loop {
        for w in workers.iter_mut() {
            if let Some(result) = w.try_join() {
                report.joined += 1;
                if let Err(exit) = result {
                    report.abnormal_exits.push((w.id(), exit));
                }
            }
        }
        if workers.iter().all(|w| !w.has_thread()) || Instant::now() >= deadline {
            break;
        }
        thread::sleep(Duration::from_millis(1));
    }

    for w in workers.iter_mut() {
        if w.detach() {
            warn!(worker = %w.id(), "worker did not exit within grace period");
            report.abandoned += 1;
        }
    }

    report.total_ms = start.elapsed().as_millis() as u64;
    info!(
        total_ms = report.total_ms,
        acknowledged = report.acknowledged,
        joined = report.joined,
        abandoned = report.abandoned,
        "controller shut down"
    );
    report
}
