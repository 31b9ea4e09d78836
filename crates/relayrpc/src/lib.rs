//! # RelayRPC
//!
//! The correlated wire shapes exchanged between a caller and an executor.
//!
//! ## Architecture
//!
//! Every frame is a plain [`relaypack::Value`] before it is a byte buffer, so the
//! shapes below are exactly what crosses the isolation boundary:
//!
//! - **Call**: `{ id, message: { type, method, payload } }`
//! - **Reply**: `[id, error | unit, result]`
//!
//! Correlation is by `id` alone. Nothing here depends on send order.

pub mod error;
pub mod frame;

pub use error::Error;
pub use error::Result;
pub use frame::ActionType;
pub use frame::CallFrame;
pub use frame::Envelope;
pub use frame::ErrorInfo;
pub use frame::ReplyFrame;

pub use relaypack::Value;
