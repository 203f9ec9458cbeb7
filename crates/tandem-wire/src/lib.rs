//! Command/response protocol between the Tandem controller and its workers.
//!
//! Every interaction with a worker is one request frame followed by
//! exactly one response frame. Frames are tagged binary messages; the tag
//! set is closed and shared by both sides, so an unknown tag is a protocol
//! violation rather than something to skip over.
//!
//! # Format
//!
//! ```text
//! [TAG u8] [payload]
//! ```
//!
//! All integers and floats are little-endian. Vectors, strings, and maps
//! are prefixed with a `u32` element count. A frame must be consumed
//! exactly; trailing bytes are rejected.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod codec;
pub mod error;
pub mod types;

pub use codec::{decode_command, decode_response, encode_command, encode_response};
pub use error::WireError;
pub use types::{Command, Response, SeedReport, StepReply, WorkerFault};

/// Command tag for [`Command::GetSpaces`].
pub const CMD_GET_SPACES: u8 = 0x01;
/// Command tag for [`Command::Step`].
pub const CMD_STEP: u8 = 0x02;
/// Command tag for [`Command::Reset`].
pub const CMD_RESET: u8 = 0x03;
/// Command tag for [`Command::Close`].
pub const CMD_CLOSE: u8 = 0x04;
/// Command tag for [`Command::SetChunkSize`].
pub const CMD_SET_CHUNK_SIZE: u8 = 0x05;
/// Command tag for [`Command::SetFastForward`].
pub const CMD_SET_FAST_FORWARD: u8 = 0x06;
/// Command tag for [`Command::GetSeed`].
pub const CMD_GET_SEED: u8 = 0x07;
/// Command tag for [`Command::GetParameters`].
pub const CMD_GET_PARAMETERS: u8 = 0x08;

/// Response tag for [`Response::Spaces`].
pub const RESP_SPACES: u8 = 0x81;
/// Response tag for [`Response::Step`].
pub const RESP_STEP: u8 = 0x82;
/// Response tag for [`Response::Reset`].
pub const RESP_RESET: u8 = 0x83;
/// Response tag for [`Response::Closed`].
pub const RESP_CLOSED: u8 = 0x84;
/// Response tag for [`Response::Ack`].
pub const RESP_ACK: u8 = 0x85;
/// Response tag for [`Response::Seed`].
pub const RESP_SEED: u8 = 0x86;
/// Response tag for [`Response::Parameters`].
pub const RESP_PARAMETERS: u8 = 0x87;
/// Response tag for [`Response::Fault`].
pub const RESP_FAULT: u8 = 0xFF;
