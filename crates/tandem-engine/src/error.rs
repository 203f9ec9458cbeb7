//! Error types for batched controller operations and worker exits.

use std::error::Error;
use std::fmt;

use tandem_core::{ActionError, CodecError, WorkerId};
use tandem_wire::{WireError, WorkerFault};

/// Error from a batched controller operation.
///
/// Validation variants (`ArityMismatch`, `InvalidActionType`,
/// `InvalidChunkSize`, `InvalidFastForward`, `UnknownWorker`,
/// `ChannelClosed`) are raised
/// before any message is sent. The remaining variants are raised only
/// after every outstanding response of the barrier has been drained, and
/// name the first failing worker in index order.
#[derive(Clone, Debug, PartialEq)]
pub enum BatchError {
    /// The number of actions does not match the number of workers.
    ArityMismatch {
        /// Number of workers.
        expected: usize,
        /// Number of actions supplied.
        actual: usize,
    },
    /// An action is not a member of the shared action space.
    InvalidActionType {
        /// Position of the offending action.
        index: usize,
        /// Why it was rejected.
        reason: ActionError,
    },
    /// Chunk size is zero or negative.
    InvalidChunkSize {
        /// The rejected value.
        value: i64,
    },
    /// Fast-forward bound is negative.
    InvalidFastForward {
        /// The rejected value.
        value: i64,
    },
    /// No worker has this index.
    UnknownWorker {
        /// The rejected index.
        index: usize,
        /// Number of workers.
        num_envs: usize,
    },
    /// The addressed worker is closed.
    ChannelClosed {
        /// The closed worker.
        worker: WorkerId,
    },
    /// The worker's channel disconnected: its thread has exited.
    WorkerCrashed {
        /// The crashed worker.
        worker: WorkerId,
    },
    /// The worker did not answer within the response timeout.
    Timeout {
        /// The unresponsive worker.
        worker: WorkerId,
    },
    /// The worker answered with a fault.
    Fault {
        /// The faulting worker.
        worker: WorkerId,
        /// What went wrong.
        fault: WorkerFault,
    },
    /// An observation vector did not match the shared schema.
    Codec {
        /// The worker that sent it.
        worker: WorkerId,
        /// The codec failure.
        error: CodecError,
    },
    /// A response frame could not be decoded.
    Protocol {
        /// The worker that sent it.
        worker: WorkerId,
        /// The decoding failure.
        error: WireError,
    },
    /// A well-formed response of the wrong kind.
    UnexpectedResponse {
        /// The worker that sent it.
        worker: WorkerId,
        /// Response kind the command calls for.
        expected: &'static str,
        /// Response kind received.
        got: &'static str,
    },
}

impl BatchError {
    /// The worker this error is attributed to, if any.
    pub fn worker(&self) -> Option<WorkerId> {
        match self {
            Self::ChannelClosed { worker }
            | Self::WorkerCrashed { worker }
            | Self::Timeout { worker }
            | Self::Fault { worker, .. }
            | Self::Codec { worker, .. }
            | Self::Protocol { worker, .. }
            | Self::UnexpectedResponse { worker, .. } => Some(*worker),
            Self::ArityMismatch { .. }
            | Self::InvalidActionType { .. }
            | Self::InvalidChunkSize { .. }
            | Self::InvalidFastForward { .. }
            | Self::UnknownWorker { .. } => None,
        }
    }
}

impl fmt::Display for BatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ArityMismatch { expected, actual } => write!(
                f,
                "got {actual} actions for {expected} environments"
            ),
            Self::InvalidActionType { index, reason } => {
                write!(f, "action {index} rejected: {reason}")
            }
            Self::InvalidChunkSize { value } => {
                write!(f, "chunk size must be a positive integer, got {value}")
            }
            Self::InvalidFastForward { value } => {
                write!(f, "fast-forward bound must be non-negative, got {value}")
            }
            Self::UnknownWorker { index, num_envs } => {
                write!(f, "no worker {index} among {num_envs}")
            }
            Self::ChannelClosed { worker } => write!(f, "worker {worker} is closed"),
            Self::WorkerCrashed { worker } => write!(f, "worker {worker} crashed"),
            Self::Timeout { worker } => write!(f, "worker {worker} timed out"),
            Self::Fault { worker, fault } => write!(f, "worker {worker}: {fault}"),
            Self::Codec { worker, error } => write!(f, "worker {worker}: {error}"),
            Self::Protocol { worker, error } => write!(f, "worker {worker}: {error}"),
            Self::UnexpectedResponse {
                worker,
                expected,
                got,
            } => write!(
                f,
                "worker {worker} answered '{got}', expected '{expected}'"
            ),
        }
    }
}

impl Error for BatchError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InvalidActionType { reason, .. } => Some(reason),
            Self::Fault { fault, .. } => Some(fault),
            Self::Codec { error, .. } => Some(error),
            Self::Protocol { error, .. } => Some(error),
            _ => None,
        }
    }
}

/// Why a worker thread terminated abnormally.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WorkerExit {
    /// A request frame carried a tag outside the command set.
    UnknownCommand {
        /// The unrecognized tag.
        tag: u8,
    },
    /// A request frame with a known tag could not be decoded.
    Protocol(WireError),
    /// The response channel disconnected while the worker was replying.
    ControllerGone,
    /// The worker thread panicked, usually inside the environment.
    Panicked {
        /// The panic payload, if it was a string.
        message: String,
    },
}

impl fmt::Display for WorkerExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownCommand { tag } => write!(f, "unknown command tag {tag:#04x}"),
            Self::Protocol(e) => write!(f, "undecodable request: {e}"),
            Self::ControllerGone => write!(f, "controller dropped the response channel"),
            Self::Panicked { message } => write!(f, "worker panicked: {message}"),
        }
    }
}

impl Error for WorkerExit {}

impl From<WireError> for WorkerExit {
    fn from(e: WireError) -> Self {
        match e {
            WireError::UnknownTag { tag } => Self::UnknownCommand { tag },
            other => Self::Protocol(other),
        }
    }
}
