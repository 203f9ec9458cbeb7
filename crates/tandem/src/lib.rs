//! Tandem: lockstep parallel execution of independent simulation
//! environments.
//!
//! This is the top-level facade crate that re-exports the public API from
//! all Tandem sub-crates. For most users, adding `tandem` as a single
//! dependency is sufficient.
//!
//! # Quick start
//!
//! ```rust
//! use tandem::prelude::*;
//! use tandem::types::{ActionSpace, EnvError, ObsSchema, Parameters, Transition};
//!
//! // A counter that ends its episode after three steps.
//! struct Counter {
//!     t: u64,
//! }
//!
//! impl Environment for Counter {
//!     fn spaces(&self) -> Spaces {
//!         Spaces { observation: ObsSchema::flat(1), action: ActionSpace::new(1) }
//!     }
//!     fn seed(&mut self, seed: u64) -> Vec<u64> { vec![seed] }
//!     fn reset(&mut self) -> Result<Observation, EnvError> {
//!         self.t = 0;
//!         self.observe()
//!     }
//!     fn observe(&self) -> Result<Observation, EnvError> {
//!         Ok(Observation::flat(vec![self.t as f64]))
//!     }
//!     fn step(&mut self, _action: &Action) -> Result<Transition, EnvError> {
//!         self.t += 1;
//!         Ok(Transition {
//!             observation: self.observe()?,
//!             reward: 1.0,
//!             done: self.t == 3,
//!             info: Default::default(),
//!         })
//!     }
//!     fn set_chunk_size(&mut self, _chunk_size: usize) {}
//!     fn fast_forward(&mut self, steps: u64) -> Result<(), EnvError> {
//!         self.t += steps;
//!         Ok(())
//!     }
//!     fn parameters(&self) -> Parameters { Parameters::new() }
//! }
//!
//! let mut envs = MultiEnv::new(MultiEnvConfig::seeded(4, 42), |_| Ok(Counter { t: 0 })).unwrap();
//! let first = envs.reset().unwrap();
//! assert_eq!(first.len(), 4);
//!
//! let actions = vec![Action::zeros(1); 4];
//! for _ in 0..2 {
//!     envs.step(&actions).unwrap();
//! }
//! let result: BatchResult = envs.step(&actions).unwrap();
//! assert_eq!(result.dones, vec![true; 4]);
//! // Terminal workers come back already reset.
//! assert_eq!(result.observations[0].to_flat_vec(), vec![0.0]);
//!
//! let report = envs.close();
//! assert_eq!(report.joined, 4);
//! ```
//!
//! # Modules
//!
//! Each module corresponds to a sub-crate. Use them for types not in the prelude:
//!
//! | Module | Sub-crate | Contents |
//! |--------|-----------|----------|
//! | [`types`] | `tandem-core` | Spaces, observations, actions, the `Environment` trait, codec |
//! | [`wire`] | `tandem-wire` | Command/response protocol and binary frame codec |
//! | [`engine`] | `tandem-engine` | `MultiEnv` controller, configuration, batch errors |

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

/// Core types, traits, and IDs (`tandem-core`).
///
/// Contains observation schemas, the [`types::ObservationCodec`], action
/// spaces, and the [`types::Environment`] trait that simulation backends
/// implement.
pub use tandem_core as types;

/// Worker protocol (`tandem-wire`).
///
/// The closed [`wire::Command`] and [`wire::Response`] sets and their
/// frame encoding. Only needed to inspect [`wire::WorkerFault`]s or seed
/// reports.
pub use tandem_wire as wire;

/// Lockstep controller (`tandem-engine`).
///
/// [`engine::MultiEnv`] and its [`engine::MultiEnvConfig`].
pub use tandem_engine as engine;

/// Common imports for typical Tandem usage.
///
/// ```rust
/// use tandem::prelude::*;
/// ```
pub mod prelude {
    // Core types and traits
    pub use tandem_core::{Action, Environment, Observation, Spaces, WorkerId};

    // Engine
    pub use tandem_engine::{BatchError, BatchResult, MultiEnv, MultiEnvConfig};
}
