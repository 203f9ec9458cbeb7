//! Controller configuration, validation, and error types.
//!
//! [`MultiEnvConfig`] is the builder-input for
//! [`MultiEnv::new`](crate::multi::MultiEnv::new).
//! [`validate()`](MultiEnvConfig::validate) checks structural invariants
//! before any worker is spawned.

use std::error::Error;
use std::fmt;
use std::time::Duration;

use crate::error::BatchError;

/// Upper bound on the number of workers a controller may own.
pub const MAX_ENVS: usize = 1024;

/// Customary fast-forward bound: one week of data at 5-minute resolution.
pub const DEFAULT_FAST_FORWARD: u64 = 2016;

// ── ResetRetry ──────────────────────────────────────────────────────

/// How many times a worker retries `reset` while the environment keeps
/// producing invalid (non-finite or already-over) observations.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResetRetry {
    /// Give up after this many attempts and report
    /// [`WorkerFault::ResetExhausted`](tandem_wire::WorkerFault::ResetExhausted).
    Bounded(u32),
    /// Retry forever. A data source that never yields a valid observation
    /// again will hang the worker, and with it the next barrier.
    Unbounded,
}

impl Default for ResetRetry {
    fn default() -> Self {
        Self::Bounded(100)
    }
}

// ── ShutdownPolicy ──────────────────────────────────────────────────

/// What [`MultiEnv::close`](crate::multi::MultiEnv::close) does after
/// broadcasting `Close`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShutdownPolicy {
    /// Send `Close` and return immediately; worker threads are detached.
    FireAndForget,
    /// Wait up to `grace` for every worker to acknowledge and exit, then
    /// join the ones that did and abandon the stragglers.
    Graceful {
        /// Total time budget for acknowledgement and exit.
        grace: Duration,
    },
}

impl Default for ShutdownPolicy {
    fn default() -> Self {
        Self::Graceful {
            grace: Duration::from_secs(1),
        }
    }
}

// ── MultiEnvConfig ──────────────────────────────────────────────────

/// Configuration for a [`MultiEnv`](crate::multi::MultiEnv).
#[derive(Clone, Debug)]
pub struct MultiEnvConfig {
    /// Number of workers. `None` = auto-detect
    /// (`available_parallelism`, clamped to `[1, 64]`).
    pub num_envs: Option<usize>,
    /// Top-level seed from which every worker seed is derived. `None`
    /// draws one from the OS-seeded thread generator; the seed in use is
    /// always available from [`MultiEnv::seed`](crate::multi::MultiEnv::seed).
    pub seed: Option<u64>,
    /// Bound on how long one barrier waits for its responses. `None`
    /// waits forever.
    pub response_timeout: Option<Duration>,
    /// Worker reset-retry policy.
    pub reset_retry: ResetRetry,
    /// Shutdown policy applied by `close()` and on drop.
    pub shutdown: ShutdownPolicy,
    /// Worker threads are named `{prefix}-{index}`.
    pub thread_name_prefix: String,
}

impl Default for MultiEnvConfig {
    fn default() -> Self {
        Self {
            num_envs: None,
            seed: None,
            response_timeout: None,
            reset_retry: ResetRetry::default(),
            shutdown: ShutdownPolicy::default(),
            thread_name_prefix: "tandem-worker".into(),
        }
    }
}

impl MultiEnvConfig {
    /// Shorthand for a config with `num_envs` workers and a fixed seed.
    pub fn seeded(num_envs: usize, seed: u64) -> Self {
        Self {
            num_envs: Some(num_envs),
            seed: Some(seed),
            ..Self::default()
        }
    }

    /// Resolve the actual worker count, applying auto-detection if `None`.
    pub fn resolved_num_envs(&self) -> usize {
        match self.num_envs {
            Some(n) => n,
            None => std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4)
                .clamp(1, 64),
        }
    }

    /// Check structural invariants.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let n = self.resolved_num_envs();
        if n == 0 {
            return Err(ConfigError::NoEnvs);
        }
        if n > MAX_ENVS {
            return Err(ConfigError::TooManyEnvs { configured: n });
        }
        if self.response_timeout == Some(Duration::ZERO) {
            return Err(ConfigError::ZeroTimeout);
        }
        if self.reset_retry == ResetRetry::Bounded(0) {
            return Err(ConfigError::ZeroRetryBound);
        }
        Ok(())
    }
}

// ── ConfigError ─────────────────────────────────────────────────────

/// Errors detected while constructing a controller.
#[derive(Debug, PartialEq)]
pub enum ConfigError {
    /// `num_envs` is zero.
    NoEnvs,
    /// `num_envs` exceeds [`MAX_ENVS`].
    TooManyEnvs {
        /// The configured count.
        configured: usize,
    },
    /// `response_timeout` is zero.
    ZeroTimeout,
    /// `reset_retry` is `Bounded(0)`, which could never succeed.
    ZeroRetryBound,
    /// A worker thread could not be spawned.
    ThreadSpawnFailed {
        /// Description of which thread failed and why.
        reason: String,
    },
    /// The initial `GetSpaces` exchange with worker 0 failed.
    SpacesUnavailable(BatchError),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoEnvs => write!(f, "num_envs must be at least 1"),
            Self::TooManyEnvs { configured } => {
                write!(f, "num_envs {configured} exceeds maximum {MAX_ENVS}")
            }
            Self::ZeroTimeout => write!(f, "response_timeout must be non-zero"),
            Self::ZeroRetryBound => write!(f, "reset_retry bound must be at least 1"),
            Self::ThreadSpawnFailed { reason } => write!(f, "thread spawn failed: {reason}"),
            Self::SpacesUnavailable(e) => write!(f, "could not establish spaces: {e}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::SpacesUnavailable(e) => Some(e),
            _ => None,
        }
    }
}
