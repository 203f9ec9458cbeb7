//! The environment contract implemented by simulation backends.

use rand::RngCore;

use crate::error::EnvError;
use crate::space::Spaces;
use crate::types::{Action, Observation, Parameters, Transition};

/// A stateful simulation instance driven by exactly one worker.
///
/// Implementations are constructed inside the worker thread and never
/// leave it. No method is ever called concurrently.
///
/// Randomness inside an environment must come from the seed passed to
/// [`seed`](Environment::seed) and the generator handed to
/// [`shuffle`](Environment::shuffle), never from a process-wide source,
/// or replaying a top-level seed will not reproduce the run.
pub trait Environment: Send {
    /// Observation schema and action space. Must be constant over the
    /// environment's lifetime.
    fn spaces(&self) -> Spaces;

    /// Seed every internal random source from `seed`.
    ///
    /// Returns each seed that was propagated to a sub-component, for audit.
    fn seed(&mut self, seed: u64) -> Vec<u64>;

    /// Reorder the backing data source using the worker's private generator.
    fn shuffle(&mut self, rng: &mut dyn RngCore) {
        let _ = rng;
    }

    /// Start a new episode and return its first observation.
    fn reset(&mut self) -> Result<Observation, EnvError>;

    /// The current observation, without advancing.
    fn observe(&self) -> Result<Observation, EnvError>;

    /// Advance one tick.
    fn step(&mut self, action: &Action) -> Result<Transition, EnvError>;

    /// `true` if the current episode is already over (for example after a
    /// fast-forward ran past the end of the data).
    fn episode_over(&self) -> bool {
        false
    }

    /// Number of records read from the backing data source at a time.
    /// Takes effect at the next [`reset`](Environment::reset).
    fn set_chunk_size(&mut self, chunk_size: usize);

    /// Skip `steps` records of the backing data source.
    fn fast_forward(&mut self, steps: u64) -> Result<(), EnvError>;

    /// The environment's configuration.
    fn parameters(&self) -> Parameters;

    /// Release resources. Called once, when the worker shuts down.
    fn close(&mut self) {}
}
