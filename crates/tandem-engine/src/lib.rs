//! Lockstep controller and worker pool for Tandem environments.
//!
//! [`MultiEnv`] spawns one worker thread per environment, each reached
//! through a private request/response channel carrying encoded
//! [`Command`](tandem_wire::Command) and [`Response`](tandem_wire::Response)
//! frames. Batched `step`/`reset` calls are barriers across all workers.
//! Workers recover locally from terminal or invalid observations by
//! resetting, so the controller always receives usable observations.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod multi;

mod channel;
mod handle;
mod worker;

pub use config::{
    ConfigError, MultiEnvConfig, ResetRetry, ShutdownPolicy, DEFAULT_FAST_FORWARD, MAX_ENVS,
};
pub use error::{BatchError, WorkerExit};
pub use handle::WorkerState;
pub use multi::{BatchResult, MultiEnv, ShutdownReport};
