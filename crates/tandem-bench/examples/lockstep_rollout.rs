//! End-to-end lockstep rollout example.
//!
//! Demonstrates: build config -> MultiEnv -> reset -> step batches ->
//! read rewards and terminal flags -> close. Set `RUST_LOG=debug` to see
//! worker lifecycle events.

use tandem_bench::{reference_profile, scripted_factory, sweep_actions};
use tandem_engine::MultiEnv;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    println!("=== Tandem Lockstep Rollout ===\n");

    let mut env = match MultiEnv::new(reference_profile(7), scripted_factory(8, 256)) {
        Ok(env) => env,
        Err(e) => {
            eprintln!("failed to start workers: {e}");
            std::process::exit(1);
        }
    };
    let n = env.num_envs();
    info!(num_envs = n, seed = env.seed(), "controller ready");

    let first = env.reset().expect("reset");
    println!("reset: {} observations of width {}", first.len(), env.codec().vector_len());

    let mut returns = vec![0.0; n];
    let mut episodes = vec![0u32; n];
    for tick in 0..200 {
        let result = env.step(&sweep_actions(n, tick, 25)).expect("step");
        for (i, (&r, &done)) in result.rewards.iter().zip(&result.dones).enumerate() {
            returns[i] += r;
            if done {
                episodes[i] += 1;
            }
        }
        if tick % 50 == 0 || tick == 199 {
            let total: f64 = returns.iter().sum();
            println!(
                "  tick {:>3}: total_return={:>8.1}, episodes={:>3}",
                tick + 1,
                total,
                episodes.iter().sum::<u32>(),
            );
        }
    }

    for (i, report) in env.get_seeds().expect("seeds").iter().enumerate() {
        println!("  worker {i}: seed={:#018x}", report.seed);
    }

    let report = env.close();
    println!(
        "\nshutdown: {} acknowledged, {} joined, {} abandoned in {}ms",
        report.acknowledged, report.joined, report.abandoned, report.total_ms
    );
}
