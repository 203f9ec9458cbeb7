//! Error types for frame decoding.

use std::fmt;

/// Errors that can occur while decoding a command or response frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WireError {
    /// The frame ended before the payload was complete.
    Truncated,
    /// The frame is empty (no tag byte).
    EmptyFrame,
    /// The leading tag byte is not part of the protocol.
    UnknownTag {
        /// The unrecognized tag.
        tag: u8,
    },
    /// A fault frame carries an unrecognized fault code.
    UnknownFaultCode {
        /// The unrecognized code.
        code: u8,
    },
    /// The payload is structurally invalid.
    MalformedFrame {
        /// Human-readable description of what went wrong.
        detail: String,
    },
}

impl fmt::Display for WireError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Truncated => write!(f, "frame truncated"),
            Self::EmptyFrame => write!(f, "empty frame"),
            Self::UnknownTag { tag } => write!(f, "unknown frame tag {tag:#04x}"),
            Self::UnknownFaultCode { code } => write!(f, "unknown fault code {code}"),
            Self::MalformedFrame { detail } => write!(f, "malformed frame: {detail}"),
        }
    }
}

impl std::error::Error for WireError {}
