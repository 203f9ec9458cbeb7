//! Benchmark profiles and utilities for the Tandem multi-environment runner.
//!
//! - [`reference_profile`]: 8 workers, fixed seed, no timeouts
//! - [`stress_profile`]: 32 workers with a response timeout
//! - [`scripted_factory`]: builds a [`ScriptedEnv`] per worker
//! - [`sweep_actions`]: deterministic actions that end an episode on a
//!   fixed cadence

#![forbid(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use std::time::Duration;

use tandem_core::{Action, EnvError, WorkerId};
use tandem_engine::MultiEnvConfig;
pub use tandem_test_utils::ScriptedEnv;

/// Observation width used by the benchmark environments.
pub const BENCH_OBS_DIM: usize = 64;

/// Reference profile: 8 workers, seed fixed, waits forever.
pub fn reference_profile(seed: u64) -> MultiEnvConfig {
    MultiEnvConfig {
        thread_name_prefix: "tandem-bench".into(),
        ..MultiEnvConfig::seeded(8, seed)
    }
}

/// Stress profile: 32 workers, each response bounded by one second.
pub fn stress_profile(seed: u64) -> MultiEnvConfig {
    MultiEnvConfig {
        num_envs: Some(32),
        response_timeout: Some(Duration::from_secs(1)),
        ..reference_profile(seed)
    }
}

/// Factory producing a [`ScriptedEnv`] of width `obs_dim` over
/// `data_len` data points for every worker.
pub fn scripted_factory(
    obs_dim: usize,
    data_len: usize,
) -> impl Fn(WorkerId) -> Result<ScriptedEnv, EnvError> + Send + Sync + 'static {
    move |_| {
        Ok(ScriptedEnv::builder()
            .obs_dim(obs_dim)
            .data_len(data_len)
            .build())
    }
}

/// One action per worker for tick `tick`. Worker `i` ends its episode
/// every `period` ticks, offset by `i`, so terminal resets are spread
/// across the batch.
pub fn sweep_actions(num_envs: usize, tick: usize, period: usize) -> Vec<Action> {
    let period = period.max(1);
    (0..num_envs)
        .map(|i| {
            let terminal = (tick + i) % period == period - 1;
            Action::new(vec![if terminal { 1.0 } else { 0.0 }])
        })
        .collect()
}
