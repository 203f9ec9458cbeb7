//! Test utilities and mock environments for Tandem development.
//!
//! Provides [`ScriptedEnv`], a deterministic [`Environment`] whose
//! failure modes (terminal actions, non-finite observations, slow steps,
//! crashes) are switched on through [`ScriptedEnvBuilder`], and a shared
//! [`Probe`] for counting what happened inside a worker from the test
//! thread.

#![forbid(unsafe_code)]
#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod fixtures;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, RngCore, SeedableRng};
use tandem_core::{
    Action, ActionSpace, EnvError, Environment, Info, ObsSchema, Observation, Parameters, Spaces,
    Transition,
};

pub use fixtures::{actions, flat_spaces, zero_actions};

/// Counters shared between a [`ScriptedEnv`] and the test that built it.
#[derive(Debug, Default)]
pub struct Probe {
    pub resets: AtomicU64,
    pub steps: AtomicU64,
    pub closes: AtomicU64,
    pub fast_forwarded: AtomicU64,
}

impl Probe {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn resets(&self) -> u64 {
        self.resets.load(Ordering::SeqCst)
    }

    pub fn steps(&self) -> u64 {
        self.steps.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> u64 {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn fast_forwarded(&self) -> u64 {
        self.fast_forwarded.load(Ordering::SeqCst)
    }
}

/// Deterministic scripted environment.
///
/// The backing data source is the sequence `0.0, 1.0, ..` of length
/// `data_len`, permuted by [`shuffle`](Environment::shuffle). The
/// observation is:
///
/// - `[0]` the data value under the cursor,
/// - `[1]` the cursor position,
/// - `[2]` steps taken in the current episode,
/// - `[3]` the effective chunk size,
/// - further components are `0.0`.
///
/// A step whose first action component is at least `terminal_at` ends
/// the episode; so does running off the end of the data.
pub struct ScriptedEnv {
    obs_dim: usize,
    action_dim: usize,
    data: Vec<f64>,
    cursor: usize,
    episode_steps: u64,
    chunk_size: usize,
    pending_chunk_size: Option<usize>,
    terminal_at: f64,
    fail_below: Option<f64>,
    crash_at: Option<f64>,
    step_delay: Duration,
    nan_steps: u32,
    invalid_resets: u32,
    probe: Arc<Probe>,
}

/// Builder for [`ScriptedEnv`].
pub struct ScriptedEnvBuilder {
    obs_dim: usize,
    action_dim: usize,
    data_len: usize,
    chunk_size: usize,
    terminal_at: f64,
    fail_below: Option<f64>,
    crash_at: Option<f64>,
    step_delay: Duration,
    nan_steps: u32,
    invalid_resets: u32,
    probe: Option<Arc<Probe>>,
}

impl ScriptedEnv {
    pub fn builder() -> ScriptedEnvBuilder {
        ScriptedEnvBuilder {
            obs_dim: 4,
            action_dim: 1,
            data_len: 64,
            chunk_size: 1,
            terminal_at: 1.0,
            fail_below: None,
            crash_at: None,
            step_delay: Duration::ZERO,
            nan_steps: 0,
            invalid_resets: 0,
            probe: None,
        }
    }

    fn current(&self) -> Observation {
        let mut values = vec![0.0; self.obs_dim];
        let slots = [
            self.data.get(self.cursor).copied().unwrap_or(-1.0),
            self.cursor as f64,
            self.episode_steps as f64,
            self.chunk_size as f64,
        ];
        for (dst, src) in values.iter_mut().zip(slots) {
            *dst = src;
        }
        Observation::flat(values)
    }

    fn poisoned(&self) -> Observation {
        Observation::flat(vec![f64::NAN; self.obs_dim])
    }
}

impl ScriptedEnvBuilder {
    /// Observation dimension (default 4).
    pub fn obs_dim(mut self, n: usize) -> Self {
        self.obs_dim = n;
        self
    }

    /// Action dimension (default 1, minimum 1).
    pub fn action_dim(mut self, n: usize) -> Self {
        self.action_dim = n.max(1);
        self
    }

    /// Length of the backing data source (default 64).
    pub fn data_len(mut self, n: usize) -> Self {
        self.data_len = n;
        self
    }

    /// Initial chunk size (default 1).
    pub fn chunk_size(mut self, n: usize) -> Self {
        self.chunk_size = n;
        self
    }

    /// First action component at or above which a step is terminal
    /// (default 1.0).
    pub fn terminal_at(mut self, threshold: f64) -> Self {
        self.terminal_at = threshold;
        self
    }

    /// First action component below which `step` returns an error.
    pub fn fail_below(mut self, threshold: f64) -> Self {
        self.fail_below = Some(threshold);
        self
    }

    /// First action component at or above which `step` panics.
    pub fn crash_at(mut self, threshold: f64) -> Self {
        self.crash_at = Some(threshold);
        self
    }

    /// Sleep this long inside every `step`.
    pub fn step_delay(mut self, delay: Duration) -> Self {
        self.step_delay = delay;
        self
    }

    /// The first `n` steps return an all-NaN observation and end the
    /// episode.
    pub fn nan_steps(mut self, n: u32) -> Self {
        self.nan_steps = n;
        self
    }

    /// The first `n` resets return an all-NaN observation.
    pub fn invalid_resets(mut self, n: u32) -> Self {
        self.invalid_resets = n;
        self
    }

    /// Share counters with the caller.
    pub fn probe(mut self, probe: Arc<Probe>) -> Self {
        self.probe = Some(probe);
        self
    }

    pub fn build(self) -> ScriptedEnv {
        ScriptedEnv {
            obs_dim: self.obs_dim,
            action_dim: self.action_dim,
            data: (0..self.data_len).map(|i| i as f64).collect(),
            cursor: 0,
            episode_steps: 0,
            chunk_size: self.chunk_size,
            pending_chunk_size: None,
            terminal_at: self.terminal_at,
            fail_below: self.fail_below,
            crash_at: self.crash_at,
            step_delay: self.step_delay,
            nan_steps: self.nan_steps,
            invalid_resets: self.invalid_resets,
            probe: self.probe.unwrap_or_default(),
        }
    }
}

impl Environment for ScriptedEnv {
    fn spaces(&self) -> Spaces {
        Spaces {
            observation: ObsSchema::flat(self.obs_dim),
            action: ActionSpace::new(self.action_dim),
        }
    }

    fn seed(&mut self, seed: u64) -> Vec<u64> {
        let mut rng = StdRng::seed_from_u64(seed);
        vec![rng.random(), rng.random()]
    }

    fn shuffle(&mut self, rng: &mut dyn RngCore) {
        self.data.shuffle(rng);
    }

    fn reset(&mut self) -> Result<Observation, EnvError> {
        self.probe.resets.fetch_add(1, Ordering::SeqCst);
        if let Some(n) = self.pending_chunk_size.take() {
            self.chunk_size = n;
        }
        self.cursor = 0;
        self.episode_steps = 0;
        if self.invalid_resets > 0 {
            self.invalid_resets -= 1;
            return Ok(self.poisoned());
        }
        Ok(self.current())
    }

    fn observe(&self) -> Result<Observation, EnvError> {
        Ok(self.current())
    }

    fn step(&mut self, action: &Action) -> Result<Transition, EnvError> {
        self.probe.steps.fetch_add(1, Ordering::SeqCst);
        if !self.step_delay.is_zero() {
            std::thread::sleep(self.step_delay);
        }

        let a0 = action.as_slice().first().copied().unwrap_or(0.0);
        if let Some(threshold) = self.crash_at {
            if a0 >= threshold {
                panic!("scripted crash on action {a0}");
            }
        }
        if let Some(threshold) = self.fail_below {
            if a0 < threshold {
                return Err(EnvError::InvalidAction {
                    reason: format!("action {a0} below {threshold}"),
                });
            }
        }

        self.cursor += 1;
        self.episode_steps += 1;

        let mut info = Info::new();
        info.insert("cursor".into(), self.cursor as f64);

        if self.nan_steps > 0 {
            self.nan_steps -= 1;
            return Ok(Transition {
                observation: self.poisoned(),
                reward: -1.0,
                done: true,
                info,
            });
        }

        let done = a0 >= self.terminal_at || self.cursor >= self.data.len();
        Ok(Transition {
            observation: self.current(),
            reward: if done { 0.0 } else { 1.0 },
            done,
            info,
        })
    }

    fn episode_over(&self) -> bool {
        self.cursor >= self.data.len()
    }

    fn set_chunk_size(&mut self, chunk_size: usize) {
        self.pending_chunk_size = Some(chunk_size);
    }

    fn fast_forward(&mut self, steps: u64) -> Result<(), EnvError> {
        self.probe.fast_forwarded.fetch_add(steps, Ordering::SeqCst);
        self.cursor = self.cursor.saturating_add(steps as usize);
        Ok(())
    }

    fn parameters(&self) -> Parameters {
        let mut params = Parameters::new();
        params.insert("obs_dim".into(), self.obs_dim as f64);
        params.insert("data_len".into(), self.data.len() as f64);
        params.insert("chunk_size".into(), self.chunk_size as f64);
        params
    }

    fn close(&mut self) {
        self.probe.closes.fetch_add(1, Ordering::SeqCst);
    }
}
