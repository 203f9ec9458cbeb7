//! Protocol message types.

use std::fmt;

use smallvec::SmallVec;
use tandem_core::{Action, Info, Parameters, Spaces};

/// A request sent from the controller to one worker.
///
/// The set is closed: workers match it exhaustively, and a frame whose tag
/// maps to none of these variants terminates the receiving worker.
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    /// Report the observation schema and action space.
    GetSpaces,
    /// Advance the environment one tick with this action.
    Step(Action),
    /// Start a new episode.
    Reset,
    /// Close the environment and exit the worker loop.
    Close,
    /// Change the data-source chunk size, effective at the next reset.
    SetChunkSize(u64),
    /// Set the exclusive upper bound of the random fast-forward applied at
    /// each reset. Zero disables fast-forward.
    SetFastForward(u64),
    /// Report the worker's seed and every seed it propagated.
    GetSeed,
    /// Report the environment's configuration.
    GetParameters,
}

impl Command {
    /// Short name, used in logs and protocol error messages.
    pub fn name(&self) -> &'static str {
        match self {
            Self::GetSpaces => "get_spaces",
            Self::Step(_) => "step",
            Self::Reset => "reset",
            Self::Close => "close",
            Self::SetChunkSize(_) => "set_chunk_size",
            Self::SetFastForward(_) => "set_fast_forward",
            Self::GetSeed => "get_seed",
            Self::GetParameters => "get_parameters",
        }
    }
}

/// Result of a `Step` command.
///
/// `observation` is the post-step observation, or the first observation
/// of a fresh episode when the step ended the episode or produced an
/// invalid observation. `reward`, `done`, and `info` always describe the
/// step itself.
#[derive(Clone, Debug, PartialEq)]
pub struct StepReply {
    /// Flat observation vector, encoded with the shared schema.
    pub observation: Vec<f64>,
    /// Reward of the step.
    pub reward: f64,
    /// Whether the step ended the episode.
    pub done: bool,
    /// Auxiliary diagnostics of the step.
    pub info: Info,
}

/// A worker's seeding record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SeedReport {
    /// Seed the worker's private generator was constructed from.
    pub seed: u64,
    /// Seeds the environment propagated to its own components.
    pub propagated: SmallVec<[u64; 4]>,
}

/// A failure the worker reports instead of a normal response.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WorkerFault {
    /// The environment could not be constructed; every request is answered
    /// with this fault.
    Setup {
        /// Description of the construction failure.
        reason: String,
    },
    /// The environment's `step` returned an error.
    StepFailed {
        /// Description of the failure.
        reason: String,
    },
    /// The reset-retry loop hit its attempt bound without producing a
    /// valid observation.
    ResetExhausted {
        /// Number of reset attempts made.
        attempts: u32,
    },
    /// A `Step` action is not a member of the worker's action space.
    InvalidAction {
        /// Why the action was rejected.
        reason: String,
    },
    /// An observation did not match the worker's own schema.
    Encoding {
        /// Description of the mismatch.
        reason: String,
    },
}

impl fmt::Display for WorkerFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Setup { reason } => write!(f, "environment setup failed: {reason}"),
            Self::StepFailed { reason } => write!(f, "step failed: {reason}"),
            Self::ResetExhausted { attempts } => write!(
                f,
                "no valid observation after {attempts} reset attempts"
            ),
            Self::InvalidAction { reason } => write!(f, "action rejected by worker: {reason}"),
            Self::Encoding { reason } => write!(f, "observation encoding failed: {reason}"),
        }
    }
}

impl std::error::Error for WorkerFault {}

/// A worker's answer to one [`Command`].
#[derive(Clone, Debug, PartialEq)]
pub enum Response {
    /// Answer to [`Command::GetSpaces`].
    Spaces(Spaces),
    /// Answer to [`Command::Step`].
    Step(StepReply),
    /// Answer to [`Command::Reset`]: the flat first observation.
    Reset(Vec<f64>),
    /// Answer to [`Command::Close`]; the worker exits after sending it.
    Closed,
    /// Answer to [`Command::SetChunkSize`] and [`Command::SetFastForward`].
    Ack,
    /// Answer to [`Command::GetSeed`].
    Seed(SeedReport),
    /// Answer to [`Command::GetParameters`].
    Parameters(Parameters),
    /// The command could not be carried out.
    Fault(WorkerFault),
}

impl Response {
    /// Short name, used in logs and protocol error messages.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Spaces(_) => "spaces",
            Self::Step(_) => "step",
            Self::Reset(_) => "reset",
            Self::Closed => "closed",
            Self::Ack => "ack",
            Self::Seed(_) => "seed",
            Self::Parameters(_) => "parameters",
            Self::Fault(_) => "fault",
        }
    }
}
