//! # Error Definitions
//!
//! Failures of the framing layer itself. Remote failures are not errors here;
//! they travel inside a [`crate::ReplyFrame`] as an [`crate::ErrorInfo`].

use relaypack::Error as PackError;

/// Operational failures within the framing mechanism.
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// The underlying relaypack serialization failed.
    Pack(PackError),
    /// The structure of the frame was malformed (e.g., missing id).
    ProtocolViolation(String),
    /// The value is not a 3-element reply list.
    NotAReply,
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pack(e) => write!(f, "Serialization error: {}", e),
            Self::ProtocolViolation(msg) => write!(f, "Protocol violation: {}", msg),
            Self::NotAReply => write!(f, "Frame is not a 3-element reply"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Pack(e) => Some(e),
            _ => None,
        }
    }
}

impl From<PackError> for Error {
    fn from(e: PackError) -> Self { Self::Pack(e) }
}

/// A specialized Result type for framing operations.
pub type Result<T> = std::result::Result<T, Error>;
