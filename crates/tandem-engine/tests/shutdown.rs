//! Integration test: closing workers individually and as a whole.

use std::time::Duration;

use tandem_core::WorkerId;
use tandem_engine::{BatchError, MultiEnv, MultiEnvConfig, ShutdownPolicy, WorkerState};
use tandem_test_utils::{Probe, ScriptedEnv};

fn spawn_probed(config: MultiEnvConfig) -> (MultiEnv, std::sync::Arc<Probe>) {
    let probe = Probe::new();
    let shared = probe.clone();
    let env = MultiEnv::new(config, move |_| {
        Ok(ScriptedEnv::builder().probe(shared.clone()).build())
    })
    .unwrap();
    (env, probe)
}

#[test]
fn graceful_close_joins_every_worker() {
    let (mut env, probe) = spawn_probed(MultiEnvConfig::seeded(4, 1));
    env.reset().unwrap();

    let report = env.close();
    assert_eq!(report.acknowledged, 4);
    assert_eq!(report.joined, 4);
    assert_eq!(report.abandoned, 0);
    assert!(report.abnormal_exits.is_empty());
    assert_eq!(probe.closes(), 4);
    assert!(env.is_closed());
    assert_eq!(env.worker_states(), vec![WorkerState::Closed; 4]);

    let again = env.close();
    assert_eq!(again.joined, 0);
    assert_eq!(
        env.reset(),
        Err(BatchError::ChannelClosed {
            worker: WorkerId(0)
        })
    );
}

#[test]
fn fire_and_forget_detaches() {
    let config = MultiEnvConfig {
        shutdown: ShutdownPolicy::FireAndForget,
        ..MultiEnvConfig::seeded(3, 1)
    };
    let (mut env, _probe) = spawn_probed(config);

    let report = env.close();
    assert_eq!(report.acknowledged, 0);
    assert_eq!(report.joined, 0);
    assert_eq!(report.abandoned, 3);
}

#[test]
fn straggler_is_abandoned_after_grace() {
    let config = MultiEnvConfig {
        shutdown: ShutdownPolicy::Graceful {
            grace: Duration::from_millis(50),
        },
        response_timeout: Some(Duration::from_millis(20)),
        ..MultiEnvConfig::seeded(2, 1)
    };
    let mut env = MultiEnv::new(config, |id| {
        let delay = if id.0 == 1 { 500 } else { 0 };
        Ok(ScriptedEnv::builder()
            .step_delay(Duration::from_millis(delay))
            .build())
    })
    .unwrap();
    env.reset().unwrap();
    assert!(env.step(&tandem_test_utils::zero_actions(2, 1)).is_err());

    let report = env.close();
    assert_eq!(report.acknowledged, 1);
    assert_eq!(report.joined, 1);
    assert_eq!(report.abandoned, 1);
}

#[test]
fn close_worker_rejects_later_requests() {
    let (mut env, probe) = spawn_probed(MultiEnvConfig::seeded(3, 1));

    env.close_worker(1).unwrap();
    assert_eq!(probe.closes(), 1);
    assert_eq!(env.worker_states()[1], WorkerState::Closed);

    assert_eq!(
        env.close_worker(1),
        Err(BatchError::ChannelClosed {
            worker: WorkerId(1)
        })
    );
    assert_eq!(
        env.close_worker(7),
        Err(BatchError::UnknownWorker {
            index: 7,
            num_envs: 3
        })
    );
    assert_eq!(
        env.get_parameters(),
        Err(BatchError::ChannelClosed {
            worker: WorkerId(1)
        })
    );

    let report = env.close();
    assert_eq!(report.acknowledged, 2);
    assert_eq!(report.joined, 2);
    assert_eq!(probe.closes(), 3);
}

#[test]
fn drop_closes_environments() {
    let (env, probe) = spawn_probed(MultiEnvConfig::seeded(3, 1));
    drop(env);
    assert_eq!(probe.closes(), 3);
}
