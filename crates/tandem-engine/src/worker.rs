//! Worker loop: one environment, one channel, one command at a time.
//!
//! The worker thread owns its [`Environment`] exclusively (constructed
//! inside the thread by the factory) together with a private
//! `ChaCha8Rng`. Nothing is shared with the controller except the
//! channel. Invalid observations, whether from a terminal step or from a
//! reset that landed on bad data, are absorbed here by the reset-retry
//! loop and never reach the controller.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use smallvec::SmallVec;
use tandem_core::{Action, EnvError, Environment, Observation, ObservationCodec, Spaces, WorkerId};
use tandem_wire::{Command, Response, SeedReport, StepReply, WorkerFault};
use tracing::{debug, error, warn};

use crate::channel::{Incoming, WorkerEndpoint};
use crate::config::ResetRetry;
use crate::error::WorkerExit;

/// Entry point of a worker thread.
///
/// Builds the environment with `factory`, then serves requests until
/// `Close` or until the controller hangs up. Returns `Err` only for an
/// abnormal exit. An undecodable request is fatal.
pub(crate) fn run<E, F>(
    id: WorkerId,
    seed: u64,
    reset_retry: ResetRetry,
    factory: &F,
    endpoint: WorkerEndpoint,
) -> Result<(), WorkerExit>
where
    E: Environment,
    F: Fn(WorkerId) -> Result<E, EnvError>,
{
    match factory(id) {
        Ok(env) => Worker::new(id, env, seed, reset_retry).serve(&endpoint),
        Err(e) => {
            error!(worker = %id, error = %e, "environment construction failed");
            serve_unavailable(id, &e, &endpoint)
        }
    }
}

/// Answer every request with [`WorkerFault::Setup`] until closed.
fn serve_unavailable(
    id: WorkerId,
    cause: &EnvError,
    endpoint: &WorkerEndpoint,
) -> Result<(), WorkerExit> {
    let fault = Response::Fault(WorkerFault::Setup {
        reason: cause.to_string(),
    });
    loop {
        let cmd = match endpoint.recv() {
            Incoming::Command(cmd) => cmd,
            Incoming::Invalid(e) => return Err(abnormal_exit(id, e.into())),
            Incoming::Hangup => return Ok(()),
        };
        if cmd == Command::Close {
            let _ = endpoint.send(&Response::Closed);
            return Ok(());
        }
        if !endpoint.send(&fault) {
            return Err(WorkerExit::ControllerGone);
        }
    }
}

fn abnormal_exit(id: WorkerId, exit: WorkerExit) -> WorkerExit {
    error!(worker = %id, reason = %exit, "worker terminating");
    exit
}

/// State owned by one worker thread.
pub(crate) struct Worker<E> {
    id: WorkerId,
    env: E,
    rng: ChaCha8Rng,
    seed: u64,
    propagated: SmallVec<[u64; 4]>,
    spaces: Spaces,
    codec: ObservationCodec,
    fast_forward_max: u64,
    reset_retry: ResetRetry,
}

impl<E: Environment> Worker<E> {
    /// Seed the private generator, seed the environment from it, and
    /// shuffle the environment's data source with the same generator.
    pub fn new(id: WorkerId, mut env: E, seed: u64, reset_retry: ResetRetry) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let env_seed: u64 = rng.random();
        let propagated = env.seed(env_seed).into_iter().collect();
        env.shuffle(&mut rng);
        let spaces = env.spaces();
        let codec = ObservationCodec::new(spaces.observation.clone());
        debug!(worker = %id, seed, env_seed, "worker ready");
        Self {
            id,
            env,
            rng,
            seed,
            propagated,
            spaces,
            codec,
            fast_forward_max: 0,
            reset_retry,
        }
    }

    /// Main loop. Runs until `Close` or hangup.
    pub fn serve(mut self, endpoint: &WorkerEndpoint) -> Result<(), WorkerExit> {
        loop {
            let cmd = match endpoint.recv() {
                Incoming::Command(cmd) => cmd,
                Incoming::Invalid(e) => {
                    self.env.close();
                    return Err(abnormal_exit(self.id, e.into()));
                }
                Incoming::Hangup => {
                    debug!(worker = %self.id, "controller hung up");
                    self.env.close();
                    return Ok(());
                }
            };

            let closing = cmd == Command::Close;
            let resp = self.handle(cmd);
            if closing {
                // The controller may already have hung up; still a clean close.
                let _ = endpoint.send(&resp);
                debug!(worker = %self.id, "worker closed");
                return Ok(());
            }
            if !endpoint.send(&resp) {
                self.env.close();
                return Err(WorkerExit::ControllerGone);
            }
        }
    }

    /// Execute one command and produce its response.
    pub fn handle(&mut self, cmd: Command) -> Response {
        match cmd {
            Command::GetSpaces => Response::Spaces(self.spaces.clone()),
            Command::Step(action) => self.step(&action),
            Command::Reset => match self.reset_until_valid() {
                Ok(v) => Response::Reset(v),
                Err(fault) => Response::Fault(fault),
            },
            Command::Close => {
                self.env.close();
                Response::Closed
            }
            Command::SetChunkSize(n) => {
                self.env
                    .set_chunk_size(usize::try_from(n).unwrap_or(usize::MAX));
                Response::Ack
            }
            Command::SetFastForward(max) => {
                self.fast_forward_max = max;
                Response::Ack
            }
            Command::GetSeed => Response::Seed(SeedReport {
                seed: self.seed,
                propagated: self.propagated.clone(),
            }),
            Command::GetParameters => Response::Parameters(self.env.parameters()),
        }
    }

    /// Check the action against this worker's own action space, step, and
    /// substitute a fresh observation if the episode ended or the
    /// observation is unusable.
    fn step(&mut self, action: &Action) -> Response {
        if let Err(e) = self.spaces.action.check(action) {
            warn!(worker = %self.id, error = %e, "action rejected");
            return Response::Fault(WorkerFault::InvalidAction {
                reason: e.to_string(),
            });
        }
        let t = match self.env.step(action) {
            Ok(t) => t,
            Err(e) => {
                warn!(worker = %self.id, error = %e, "step failed");
                return Response::Fault(WorkerFault::StepFailed {
                    reason: e.to_string(),
                });
            }
        };
        let observation = if t.done || !t.observation.is_finite() {
            self.reset_until_valid()
        } else {
            self.encode(&t.observation)
        };
        match observation {
            Ok(observation) => Response::Step(StepReply {
                observation,
                reward: t.reward,
                done: t.done,
                info: t.info,
            }),
            Err(fault) => Response::Fault(fault),
        }
    }

    fn encode(&self, obs: &Observation) -> Result<Vec<f64>, WorkerFault> {
        self.codec.encode(obs).map_err(|e| WorkerFault::Encoding {
            reason: e.to_string(),
        })
    }

    /// One reset attempt, including the random fast-forward.
    fn try_reset(&mut self) -> Result<Observation, EnvError> {
        let obs = self.env.reset()?;
        if self.fast_forward_max == 0 {
            return Ok(obs);
        }
        let skip = self.rng.random_range(0..self.fast_forward_max);
        self.env.fast_forward(skip)?;
        self.env.observe()
    }

    /// Reset until the environment yields a finite observation of a live
    /// episode, subject to the retry policy.
    fn reset_until_valid(&mut self) -> Result<Vec<f64>, WorkerFault> {
        let mut attempts: u32 = 0;
        loop {
            attempts = attempts.saturating_add(1);
            match self.try_reset() {
                Ok(obs) if obs.is_finite() && !self.env.episode_over() => {
                    return self.encode(&obs);
                }
                Ok(_) => debug!(worker = %self.id, attempts, "invalid observation after reset"),
                Err(e) => debug!(worker = %self.id, attempts, error = %e, "reset failed"),
            }
            if let ResetRetry::Bounded(max) = self.reset_retry {
                if attempts >= max {
                    warn!(worker = %self.id, attempts, "giving up on reset");
                    return Err(WorkerFault::ResetExhausted { attempts });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{self, ChannelError};
    use std::thread;
    use tandem_test_utils::{Probe, ScriptedEnv};

    fn worker(env: ScriptedEnv) -> Worker<ScriptedEnv> {
        Worker::new(WorkerId(0), env, 7, ResetRetry::Bounded(10))
    }

    fn obs_of(resp: Response) -> Vec<f64> {
        match resp {
            Response::Reset(v) => v,
            Response::Step(r) => r.observation,
            other => panic!("unexpected response {other:?}"),
        }
    }

    #[test]
    fn reset_retries_past_invalid_observations() {
        let probe = Probe::new();
        let env = ScriptedEnv::builder()
            .invalid_resets(3)
            .probe(probe.clone())
            .build();
        let mut w = worker(env);
        let obs = obs_of(w.handle(Command::Reset));
        assert!(obs.iter().all(|v| v.is_finite()));
        assert_eq!(probe.resets(), 4);
    }

    #[test]
    fn bounded_retry_reports_exhaustion() {
        let env = ScriptedEnv::builder().invalid_resets(50).build();
        let mut w = worker(env);
        assert_eq!(
            w.handle(Command::Reset),
            Response::Fault(WorkerFault::ResetExhausted { attempts: 10 })
        );
    }

    #[test]
    fn terminal_step_substitutes_fresh_observation() {
        let mut w = worker(ScriptedEnv::builder().build());
        w.handle(Command::Reset);
        w.handle(Command::Step(Action::new(vec![0.0])));
        let Response::Step(reply) = w.handle(Command::Step(Action::new(vec![1.0]))) else {
            panic!("expected step reply");
        };
        assert!(reply.done);
        assert_eq!(reply.reward, 0.0);
        assert_eq!(reply.info["cursor"], 2.0);
        // Fresh episode: cursor and episode step counter back at zero.
        assert_eq!(reply.observation[1], 0.0);
        assert_eq!(reply.observation[2], 0.0);
    }

    #[test]
    fn non_finite_step_is_recovered_but_reported_done() {
        let mut w = worker(ScriptedEnv::builder().nan_steps(1).build());
        w.handle(Command::Reset);
        let Response::Step(reply) = w.handle(Command::Step(Action::new(vec![0.0]))) else {
            panic!("expected step reply");
        };
        assert!(reply.done);
        assert!(reply.observation.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn step_error_becomes_fault() {
        let mut w = worker(ScriptedEnv::builder().fail_below(-1.0).build());
        w.handle(Command::Reset);
        assert!(matches!(
            w.handle(Command::Step(Action::new(vec![-5.0]))),
            Response::Fault(WorkerFault::StepFailed { .. })
        ));
    }

    #[test]
    fn mismatched_action_is_rejected_before_step() {
        let counts = Probe::new();
        let env = ScriptedEnv::builder()
            .action_dim(2)
            .probe(counts.clone())
            .build();
        let mut w = worker(env);
        w.handle(Command::Reset);
        assert!(matches!(
            w.handle(Command::Step(Action::new(vec![0.0]))),
            Response::Fault(WorkerFault::InvalidAction { .. })
        ));
        assert!(matches!(
            w.handle(Command::Step(Action::new(vec![f64::NAN, 0.0]))),
            Response::Fault(WorkerFault::InvalidAction { .. })
        ));
        assert_eq!(counts.steps(), 0);
        assert!(matches!(
            w.handle(Command::Step(Action::new(vec![0.0, 0.0]))),
            Response::Step(_)
        ));
        assert_eq!(counts.steps(), 1);
    }

    #[test]
    fn fast_forward_draws_below_bound_at_reset() {
        let probe = Probe::new();
        let env = ScriptedEnv::builder()
            .data_len(1000)
            .probe(probe.clone())
            .build();
        let mut w = worker(env);
        assert_eq!(w.handle(Command::SetFastForward(50)), Response::Ack);
        assert_eq!(probe.fast_forwarded(), 0);
        for _ in 0..20 {
            let before = probe.fast_forwarded();
            let obs = obs_of(w.handle(Command::Reset));
            let skipped = probe.fast_forwarded() - before;
            assert!(skipped < 50);
            assert_eq!(obs[1], skipped as f64);
        }
    }

    #[test]
    fn same_seed_same_reset_sequence() {
        let run = || {
            let mut w = Worker::new(
                WorkerId(3),
                ScriptedEnv::builder().data_len(500).build(),
                1234,
                ResetRetry::Unbounded,
            );
            w.handle(Command::SetFastForward(400));
            (0..5)
                .map(|_| obs_of(w.handle(Command::Reset)))
                .collect::<Vec<_>>()
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn seed_report_carries_propagated_seeds() {
        let mut w = worker(ScriptedEnv::builder().build());
        let Response::Seed(report) = w.handle(Command::GetSeed) else {
            panic!("expected seed report");
        };
        assert_eq!(report.seed, 7);
        assert_eq!(report.propagated.len(), 2);
    }

    #[test]
    fn unknown_command_terminates_worker() {
        let (mut ctl, wrk) = channel::pair();
        let factory = |_id: WorkerId| Ok::<_, EnvError>(ScriptedEnv::builder().build());
        let handle = thread::spawn(move || run(WorkerId(0), 1, ResetRetry::Unbounded, &factory, wrk));

        ctl.send_raw(vec![0x42]).unwrap();
        assert_eq!(
            handle.join().unwrap(),
            Err(WorkerExit::UnknownCommand { tag: 0x42 })
        );
        assert_eq!(ctl.recv(None), Err(ChannelError::Disconnected));
    }

    #[test]
    fn setup_failure_answers_with_fault_until_close() {
        let (mut ctl, wrk) = channel::pair();
        let factory = |_id: WorkerId| -> Result<ScriptedEnv, EnvError> {
            Err(EnvError::Construction {
                reason: "missing data".into(),
            })
        };
        let handle = thread::spawn(move || run(WorkerId(0), 1, ResetRetry::Unbounded, &factory, wrk));

        ctl.send(&Command::Reset).unwrap();
        assert!(matches!(
            ctl.recv(None),
            Ok(Response::Fault(WorkerFault::Setup { .. }))
        ));
        ctl.send(&Command::Close).unwrap();
        assert_eq!(ctl.recv(None), Ok(Response::Closed));
        assert_eq!(handle.join().unwrap(), Ok(()));
    }

    #[test]
    fn close_after_controller_hangup_is_clean() {
        let (mut ctl, wrk) = channel::pair();
        ctl.send(&Command::Close).unwrap();
        drop(ctl);
        let factory = |_id: WorkerId| Ok::<_, EnvError>(ScriptedEnv::builder().build());
        let handle = thread::spawn(move || run(WorkerId(0), 1, ResetRetry::Unbounded, &factory, wrk));
        assert_eq!(handle.join().unwrap(), Ok(()));
    }

    #[test]
    fn unavailable_worker_closes_cleanly_after_hangup() {
        let (mut ctl, wrk) = channel::pair();
        ctl.send(&Command::Close).unwrap();
        drop(ctl);
        let factory = |_id: WorkerId| -> Result<ScriptedEnv, EnvError> {
            Err(EnvError::Construction {
                reason: "missing data".into(),
            })
        };
        let handle = thread::spawn(move || run(WorkerId(0), 1, ResetRetry::Unbounded, &factory, wrk));
        assert_eq!(handle.join().unwrap(), Ok(()));
    }
}
