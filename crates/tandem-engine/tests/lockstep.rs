//! Integration test: barrier semantics of the lockstep controller.
//!
//! Exercises batched reset/step across several workers, fail-fast
//! validation (nothing is sent when arguments are rejected), seeding
//! reproducibility, and the configuration broadcasts.

use std::time::{Duration, Instant};

use proptest::prelude::*;
use tandem_core::{ActionError, WorkerId};
use tandem_engine::{BatchError, MultiEnv, MultiEnvConfig, WorkerState, DEFAULT_FAST_FORWARD};
use tandem_test_utils::{actions, flat_spaces, zero_actions, Probe, ScriptedEnv};

fn spawn<F>(n: usize, seed: u64, build: F) -> MultiEnv
where
    F: Fn(WorkerId) -> ScriptedEnv + Send + Sync + 'static,
{
    MultiEnv::new(MultiEnvConfig::seeded(n, seed), move |id| Ok(build(id))).unwrap()
}

fn flat(obs: &tandem_core::Observation) -> Vec<f64> {
    obs.to_flat_vec()
}

// ── Barrier round trips ──────────────────────────────────────────────

#[test]
fn three_workers_one_terminal() {
    let mut env = spawn(3, 11, |_| ScriptedEnv::builder().obs_dim(4).build());
    assert_eq!(env.num_envs(), 3);
    assert_eq!(env.spaces(), &flat_spaces(4, 1));
    assert_eq!(env.codec().vector_len(), 4);

    let obs = env.reset().unwrap();
    assert_eq!(obs.len(), 3);
    for o in &obs {
        assert_eq!(flat(o).len(), 4);
    }

    let result = env
        .step(&actions(&[&[0.0], &[1.0], &[0.0]]))
        .unwrap();
    assert_eq!(result.len(), 3);
    assert_eq!(result.dones, vec![false, true, false]);

    // Worker 1 was reset: cursor and episode counter are back at zero.
    let fresh = flat(&result.observations[1]);
    assert!(fresh.iter().all(|v| v.is_finite()));
    assert_eq!(fresh[1], 0.0);
    assert_eq!(fresh[2], 0.0);
    // The others advanced one step.
    assert_eq!(flat(&result.observations[0])[1], 1.0);
    assert_eq!(flat(&result.observations[2])[1], 1.0);

    assert_eq!(result.rewards, vec![1.0, 0.0, 1.0]);
    assert_eq!(result.infos[1]["cursor"], 1.0);
    assert_eq!(
        env.worker_states(),
        vec![WorkerState::Running; 3]
    );
}

#[test]
fn batched_step_runs_workers_concurrently() {
    let delay = Duration::from_millis(100);
    let n = 4;
    let mut env = spawn(n, 5, move |_| ScriptedEnv::builder().step_delay(delay).build());
    env.reset().unwrap();

    let start = Instant::now();
    env.step(&zero_actions(n, 1)).unwrap();
    let elapsed = start.elapsed();

    assert!(elapsed >= delay);
    assert!(
        elapsed < delay * (n as u32) - Duration::from_millis(50),
        "batched step took {elapsed:?}, expected about {delay:?}"
    );
}

// ── Fail-fast validation ─────────────────────────────────────────────

#[test]
fn wrong_arity_sends_nothing() {
    let probe = Probe::new();
    let shared = probe.clone();
    let mut env = spawn(3, 1, move |_| ScriptedEnv::builder().probe(shared.clone()).build());
    env.reset().unwrap();
    let before = env.messages_sent();

    assert_eq!(
        env.step(&zero_actions(2, 1)),
        Err(BatchError::ArityMismatch {
            expected: 3,
            actual: 2
        })
    );
    assert_eq!(env.messages_sent(), before);
    assert_eq!(probe.steps(), 0);
}

#[test]
fn invalid_action_sends_nothing() {
    let mut env = spawn(2, 1, |_| ScriptedEnv::builder().action_dim(2).build());
    let before = env.messages_sent();

    assert_eq!(
        env.step(&actions(&[&[0.0, 0.0], &[0.0]])),
        Err(BatchError::InvalidActionType {
            index: 1,
            reason: ActionError::DimensionMismatch {
                expected: 2,
                actual: 1
            }
        })
    );
    assert_eq!(
        env.step(&actions(&[&[f64::NAN, 0.0], &[0.0, 0.0]])),
        Err(BatchError::InvalidActionType {
            index: 0,
            reason: ActionError::NonFinite { index: 0 }
        })
    );
    assert_eq!(env.messages_sent(), before);
}

#[test]
fn chunk_size_validation_and_deferred_effect() {
    let mut env = spawn(2, 3, |_| ScriptedEnv::builder().chunk_size(1).build());
    let before = env.messages_sent();

    assert_eq!(
        env.set_chunk_size(0),
        Err(BatchError::InvalidChunkSize { value: 0 })
    );
    assert_eq!(
        env.set_chunk_size(-5),
        Err(BatchError::InvalidChunkSize { value: -5 })
    );
    assert_eq!(env.messages_sent(), before);

    env.set_chunk_size(10).unwrap();
    for params in env.get_parameters().unwrap() {
        assert_eq!(params["chunk_size"], 1.0);
    }
    let obs = env.reset().unwrap();
    for (o, params) in obs.iter().zip(env.get_parameters().unwrap()) {
        assert_eq!(params["chunk_size"], 10.0);
        assert_eq!(flat(o)[3], 10.0);
    }
}

#[test]
fn fast_forward_offsets_every_reset() {
    let mut env = spawn(3, 9, |_| ScriptedEnv::builder().data_len(1000).build());
    assert_eq!(env.fast_forward_bounds(), vec![0; 3]);
    assert_eq!(
        env.set_fast_forward(-1),
        Err(BatchError::InvalidFastForward { value: -1 })
    );
    assert_eq!(env.fast_forward_bounds(), vec![0; 3]);

    env.set_fast_forward(30).unwrap();
    assert_eq!(env.fast_forward_bounds(), vec![30; 3]);
    let mut skipped_any = false;
    for _ in 0..5 {
        for o in env.reset().unwrap() {
            let cursor = flat(&o)[1];
            assert!((0.0..30.0).contains(&cursor));
            skipped_any |= cursor > 0.0;
        }
    }
    assert!(skipped_any);

    env.set_fast_forward(0).unwrap();
    assert_eq!(env.fast_forward_bounds(), vec![0; 3]);
    for o in env.reset().unwrap() {
        assert_eq!(flat(&o)[1], 0.0);
    }
}

#[test]
fn default_fast_forward_is_one_week_of_five_minute_steps() {
    assert_eq!(DEFAULT_FAST_FORWARD, 7 * 24 * 12);

    let mut env = spawn(2, 4, |_| ScriptedEnv::builder().data_len(5000).build());
    env.set_fast_forward(DEFAULT_FAST_FORWARD as i64).unwrap();
    assert_eq!(env.fast_forward_bounds(), vec![DEFAULT_FAST_FORWARD; 2]);
    for o in env.reset().unwrap() {
        assert!(flat(&o)[1] < DEFAULT_FAST_FORWARD as f64);
    }
}

// ── Seeding ──────────────────────────────────────────────────────────

#[test]
fn same_seed_reproduces_seeds_and_observations() {
    let build = |_: WorkerId| ScriptedEnv::builder().data_len(256).build();
    let mut a = spawn(4, 2024, build);
    let mut b = spawn(4, 2024, build);
    let mut c = spawn(4, 2025, build);

    assert_eq!(a.seed(), 2024);
    let seeds_a = a.get_seeds().unwrap();
    assert_eq!(seeds_a, b.get_seeds().unwrap());
    assert_ne!(seeds_a, c.get_seeds().unwrap());

    let distinct: std::collections::HashSet<u64> = seeds_a.iter().map(|s| s.seed).collect();
    assert_eq!(distinct.len(), 4);
    assert_eq!(
        seeds_a.iter().map(|s| s.seed).collect::<Vec<_>>(),
        a.worker_seeds()
    );

    a.set_fast_forward(100).unwrap();
    b.set_fast_forward(100).unwrap();
    for _ in 0..3 {
        assert_eq!(a.reset().unwrap(), b.reset().unwrap());
    }
}

#[test]
fn unseeded_controller_reports_its_seed() {
    let config = MultiEnvConfig {
        num_envs: Some(2),
        ..MultiEnvConfig::default()
    };
    let env = MultiEnv::new(config, |_| Ok(ScriptedEnv::builder().build())).unwrap();
    let replay = spawn(2, env.seed(), |_| ScriptedEnv::builder().build());
    assert_eq!(env.worker_seeds(), replay.worker_seeds());
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(12))]

    #[test]
    fn reset_returns_one_observation_per_worker(n in 1usize..6, dim in 1usize..8, seed in any::<u64>()) {
        let mut env = spawn(n, seed, move |_| ScriptedEnv::builder().obs_dim(dim).build());
        let obs = env.reset().unwrap();
        prop_assert_eq!(obs.len(), n);
        for o in &obs {
            prop_assert_eq!(o.to_flat_vec().len(), dim);
        }
    }
}
