//! # Transport Abstraction
//!
//! A minimal, async interface for moving bytes between two contexts.
//!
//! ## Philosophy
//!
//! - **Byte-Oriented**: The Transport knows nothing about frames or values.
//!   It moves opaque buffers.
//! - **Fire-and-Forget**: `send` hands a buffer to the channel and returns. Replies
//!   are ordinary inbound buffers, correlated above this layer.
//! - **Single Reader**: Exactly one task pumps `recv` on each endpoint.

use std::fmt;

/// Errors that occur at the channel layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The peer is unreachable or the channel was dropped.
    ConnectionLost(String),
    /// Generic I/O error or internal transport failure.
    Io(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConnectionLost(msg) => write!(f, "Connection lost: {}", msg),
            Self::Io(msg) => write!(f, "I/O error: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;

/// One endpoint of a message channel.
///
/// This trait is designed to be object-safe (`Arc<dyn Transport>`).
#[async_trait::async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Posts one buffer to the peer without waiting for anything in return.
    async fn send(&self, payload: &[u8]) -> Result<()>;

    /// Waits for the next inbound buffer.
    ///
    /// Returns `Ok(None)` once the peer has hung up and nothing is left to read.
    async fn recv(&self) -> Result<Option<Vec<u8>>>;
}
