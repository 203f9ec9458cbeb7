//! Core types and traits for the Tandem multi-environment runner.
//!
//! This is the leaf crate with no internal dependencies. It defines the
//! contract shared by workers and the controller: observation schemas and
//! the [`ObservationCodec`], action spaces, the [`Environment`] trait that
//! simulation backends implement, and the associated error types.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod codec;
pub mod error;
pub mod id;
pub mod space;
pub mod traits;
pub mod types;

pub use codec::ObservationCodec;
pub use error::{ActionError, CodecError, EnvError};
pub use id::WorkerId;
pub use space::{ActionSpace, FieldLayout, ObsSchema, Spaces, FLAT_FIELD};
pub use traits::Environment;
pub use types::{Action, Info, Observation, Parameters, Transition};
