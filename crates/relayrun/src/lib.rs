//! # Relayrun
//!
//! Correlated RPC between a controller and an isolated executor.
//!
//! - **Executor side**: a [`Registry`] of named callables served by an
//!   [`Executor`] over a [`Transport`]. Each incoming call is answered with
//!   exactly one correlated reply.
//! - **Controller side**: a [`Caller`] that numbers its requests, keeps a table
//!   of pending calls and completes each one when its reply arrives, in
//!   whatever order replies come back.
//!
//! [`Isolate`] puts an executor on its own thread with nothing shared but a
//! byte channel.

pub mod builder;
pub mod caller;
pub mod channel;
pub mod compiler;
pub mod executor;
pub mod isolate;
pub mod method;
pub mod registry;
pub mod transport;

pub use builder::RegistryBuilder;
pub use caller::Caller;
pub use channel::ChannelTransport;
pub use compiler::Compiler;
pub use compiler::ScriptCompiler;
pub use executor::Executor;
pub use isolate::Isolate;
pub use method::FnMethod;
pub use method::Method;
pub use method::ScriptMethod;
pub use registry::Handle;
pub use registry::Registration;
pub use registry::Registry;
pub use transport::Transport;

pub use relaypack::Value;
