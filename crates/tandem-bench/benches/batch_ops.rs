//! Criterion benchmarks for batched controller operations and the frame
//! codec.

use std::hint::black_box;

use criterion::{criterion_group, criterion_main, Criterion};
use tandem_bench::{reference_profile, scripted_factory, sweep_actions, BENCH_OBS_DIM};
use tandem_core::Action;
use tandem_engine::MultiEnv;
use tandem_wire::{
    decode_response, encode_command, encode_response, Command, Response, StepReply,
};

fn make_env() -> MultiEnv {
    MultiEnv::new(reference_profile(42), scripted_factory(BENCH_OBS_DIM, 4096)).unwrap()
}

/// Benchmark: one barrier step across 8 workers, terminals spread so
/// that about one worker in sixteen resets per tick.
fn bench_batched_step(c: &mut Criterion) {
    let mut env = make_env();
    env.reset().unwrap();
    let n = env.num_envs();
    let mut tick = 0usize;

    c.bench_function("batched_step_8x64", |b| {
        b.iter(|| {
            let result = env.step(&sweep_actions(n, tick, 16)).unwrap();
            tick += 1;
            black_box(result);
        });
    });
}

/// Benchmark: batched reset across 8 workers.
fn bench_batched_reset(c: &mut Criterion) {
    let mut env = make_env();

    c.bench_function("batched_reset_8x64", |b| {
        b.iter(|| black_box(env.reset().unwrap()));
    });
}

/// Benchmark: encode a step command with a 16-component action.
fn bench_encode_step_command(c: &mut Criterion) {
    let cmd = Command::Step(Action::new((0..16).map(f64::from).collect()));

    c.bench_function("encode_step_command", |b| {
        b.iter(|| black_box(encode_command(black_box(&cmd))));
    });
}

/// Benchmark: decode a step response carrying a 1024-wide observation.
fn bench_decode_step_response(c: &mut Criterion) {
    let mut info = tandem_core::Info::new();
    info.insert("cursor".into(), 17.0);
    let frame = encode_response(&Response::Step(StepReply {
        observation: (0..1024).map(|i| i as f64 * 0.5).collect(),
        reward: 1.0,
        done: false,
        info,
    }));

    c.bench_function("decode_step_response_1024", |b| {
        b.iter(|| black_box(decode_response(black_box(&frame)).unwrap()));
    });
}

criterion_group!(
    benches,
    bench_batched_step,
    bench_batched_reset,
    bench_encode_step_command,
    bench_decode_step_response
);
criterion_main!(benches);
