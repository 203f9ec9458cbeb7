//! Error types for the Tandem core contract.
//!
//! Organized by who raises them: the environment backend ([`EnvError`]),
//! the observation codec ([`CodecError`]), and action-space validation
//! ([`ActionError`]).

use std::error::Error;
use std::fmt;

/// Errors raised by an [`Environment`](crate::Environment) implementation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EnvError {
    /// The environment could not be constructed inside its worker.
    Construction {
        /// Human-readable description of the failure.
        reason: String,
    },
    /// A reset, step, or fast-forward failed.
    ExecutionFailed {
        /// Human-readable description of the failure.
        reason: String,
    },
    /// The environment rejected an action that passed space validation.
    InvalidAction {
        /// Why the action was rejected.
        reason: String,
    },
}

impl fmt::Display for EnvError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Construction { reason } => write!(f, "environment construction failed: {reason}"),
            Self::ExecutionFailed { reason } => write!(f, "environment execution failed: {reason}"),
            Self::InvalidAction { reason } => write!(f, "invalid action: {reason}"),
        }
    }
}

impl Error for EnvError {}

/// Errors from encoding or decoding observations against an
/// [`ObsSchema`](crate::ObsSchema).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CodecError {
    /// A flat vector does not have the schema's length.
    LengthMismatch {
        /// Length required by the schema.
        expected: usize,
        /// Length of the vector supplied.
        actual: usize,
    },
    /// The observation lacks a field the schema requires.
    MissingField {
        /// The missing field name.
        name: String,
    },
    /// The observation has a field the schema does not declare.
    UnexpectedField {
        /// The undeclared field name.
        name: String,
    },
    /// A field has the wrong number of elements.
    FieldLength {
        /// The field name.
        name: String,
        /// Length declared by the schema.
        expected: usize,
        /// Length found in the observation.
        actual: usize,
    },
    /// Two schema fields share a name.
    DuplicateField {
        /// The repeated field name.
        name: String,
    },
    /// The field lengths sum past `usize::MAX`.
    SchemaOverflow {
        /// The field whose length overflowed the running total.
        name: String,
    },
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LengthMismatch { expected, actual } => {
                write!(f, "observation vector has length {actual}, schema expects {expected}")
            }
            Self::MissingField { name } => write!(f, "observation is missing field '{name}'"),
            Self::UnexpectedField { name } => {
                write!(f, "observation has undeclared field '{name}'")
            }
            Self::FieldLength {
                name,
                expected,
                actual,
            } => write!(
                f,
                "field '{name}' has {actual} elements, schema expects {expected}"
            ),
            Self::DuplicateField { name } => write!(f, "schema declares field '{name}' twice"),
            Self::SchemaOverflow { name } => {
                write!(f, "schema length overflows at field '{name}'")
            }
        }
    }
}

impl Error for CodecError {}

/// Reasons an [`Action`](crate::Action) does not belong to an
/// [`ActionSpace`](crate::ActionSpace).
#[derive(Clone, Debug, PartialEq)]
pub enum ActionError {
    /// The action vector has the wrong dimension.
    DimensionMismatch {
        /// Dimension of the action space.
        expected: usize,
        /// Dimension of the action supplied.
        actual: usize,
    },
    /// An action component is NaN or infinite.
    NonFinite {
        /// Index of the first offending component.
        index: usize,
    },
    /// An action component lies outside the space's bounds.
    OutOfBounds {
        /// Index of the first offending component.
        index: usize,
        /// The offending value.
        value: f64,
        /// Inclusive lower bound.
        low: f64,
        /// Inclusive upper bound.
        high: f64,
    },
}

impl fmt::Display for ActionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DimensionMismatch { expected, actual } => {
                write!(f, "action has dimension {actual}, space expects {expected}")
            }
            Self::NonFinite { index } => write!(f, "action component {index} is not finite"),
            Self::OutOfBounds {
                index,
                value,
                low,
                high,
            } => write!(
                f,
                "action component {index} = {value} outside [{low}, {high}]"
            ),
        }
    }
}

impl Error for ActionError {}
