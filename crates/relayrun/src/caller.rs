//! # Caller with Async Pump
//!
//! The controller-side proxy. Each request gets a fresh id and a pending entry;
//! a background pump reads replies from the transport and completes the entry
//! with the matching id.
//!
//! ## Invariants
//! - **Fresh Ids**: Ids start at 1 and are never reused by a caller.
//! - **Complete Once**: An entry is removed and completed in one step; a reply for
//!   an id with no entry is dropped.
//! - **Error Wins**: A reply with an error rejects the call even if it also carries
//!   a result.
//! - **No Timeout**: A call waits until its reply arrives or the transport dies.

use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use dashmap::DashMap;
use relaypack::Value;
use relayrpc::CallFrame;
use relayrpc::Envelope;
use relayrpc::ErrorInfo;
use relayrpc::ReplyFrame;
use relayscript::Function;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::debug;
use tracing::trace;
use tracing::warn;

use crate::transport;
use crate::transport::Transport;

#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// The registration argument is not an executable callable.
    InvalidRegistrationArgument,
    /// The executor answered with an error.
    Remote(ErrorInfo),
    Transport(transport::Error),
    Rpc(relayrpc::Error),
    ChannelClosed,
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidRegistrationArgument => write!(f, "Second parameter must be a function"),
            Self::Remote(info) => write!(f, "{}", info.message),
            Self::Transport(e) => write!(f, "Transport error: {}", e),
            Self::Rpc(e) => write!(f, "RPC error: {}", e),
            Self::ChannelClosed => write!(f, "Response channel closed"),
        }
    }
}

impl std::error::Error for Error {}

impl From<transport::Error> for Error {
    fn from(e: transport::Error) -> Self {
        Self::Transport(e)
    }
}

impl From<relayrpc::Error> for Error {
    fn from(e: relayrpc::Error) -> Self {
        Self::Rpc(e)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

type Pending = DashMap<u64, oneshot::Sender<Result<Value>>>;

/// Controller-side proxy with an async pump for concurrent requests.
///
/// Each caller owns its transport exclusively, so ids are scoped to one
/// channel. Callers can be wrapped in `Arc` for sharing across tasks. Dropping
/// the caller stops its pump and releases the transport.
pub struct Caller {
    name: String,
    transport: Arc<dyn Transport>,
    pending: Arc<Pending>,
    closed: Arc<AtomicBool>,
    next_id: AtomicU64,
    pump: JoinHandle<()>,
}

impl Caller {
    /// Creates a new caller and spawns the background pump task.
    ///
    /// Must be called within a tokio runtime. The `name` is used for logging
    /// and diagnostics.
    pub fn new(name: impl Into<String>, transport: impl Transport) -> Self {
        let name = name.into();
        let transport: Arc<dyn Transport> = Arc::new(transport);
        let pending: Arc<Pending> = Arc::new(DashMap::new());
        let closed = Arc::new(AtomicBool::new(false));

        let pump = tokio::spawn(Self::pump(
            name.clone(),
            transport.clone(),
            pending.clone(),
            closed.clone(),
        ));

        Self {
            name,
            transport,
            pending,
            closed,
            next_id: AtomicU64::new(1),
            pump,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of calls still waiting for a reply.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    async fn pump(name: String, transport: Arc<dyn Transport>, pending: Arc<Pending>, closed: Arc<AtomicBool>) {
        let error = loop {
            match transport.recv().await {
                Ok(Some(msg)) => Self::handle_message(&name, &msg, &pending),
                Ok(None) => break transport::Error::ConnectionLost("Stream closed".into()),
                Err(e) => {
                    warn!(caller = %name, error = %e, "transport failed");
                    break e;
                }
            }
        };

        closed.store(true, Ordering::SeqCst);
        debug!(caller = %name, pending = pending.len(), %error, "pump stopped");
        Self::notify_all_pending(&pending, Error::Transport(error));
    }

    /// Fail every pending call with the given error.
    fn notify_all_pending(pending: &Pending, error: Error) {
        let keys: Vec<u64> = pending.iter().map(|e| *e.key()).collect();
        for key in keys {
            if let Some((_, tx)) = pending.remove(&key) {
                let _ = tx.send(Err(error.clone()));
            }
        }
    }

    /// Routes one inbound message to its pending call. Anything else is dropped.
    fn handle_message(name: &str, msg: &[u8], pending: &Pending) {
        let reply = match ReplyFrame::decode(msg) {
            Ok(reply) => reply,
            Err(relayrpc::Error::NotAReply) => {
                debug!(caller = %name, "ignoring message that is not a reply");
                return;
            }
            Err(error) => {
                warn!(caller = %name, %error, "dropping malformed reply");
                return;
            }
        };

        let Some((_, tx)) = pending.remove(&reply.id) else {
            debug!(caller = %name, id = reply.id, "ignoring reply without a pending call");
            return;
        };

        trace!(caller = %name, id = reply.id, "completing call");
        // The receiver may be gone if the calling task was dropped.
        let _ = tx.send(reply.into_result().map_err(Error::Remote));
    }

    /// Sends one envelope and waits for its correlated outcome.
    pub async fn send(&self, envelope: Envelope) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let bytes = CallFrame::new(id, envelope).encode()?;

        let (tx, rx) = oneshot::channel();
        self.pending.insert(id, tx);

        // The pump may already have drained the table for the last time.
        if self.closed.load(Ordering::SeqCst) && self.pending.remove(&id).is_some() {
            return Err(Error::Transport(transport::Error::ConnectionLost("Stream closed".into())));
        }

        trace!(caller = %self.name, id, "sending call");
        if let Err(e) = self.transport.send(&bytes).await {
            self.pending.remove(&id);
            return Err(e.into());
        }

        match rx.await {
            Ok(result) => result,
            Err(_) => {
                self.pending.remove(&id);
                Err(Error::ChannelClosed)
            }
        }
    }

    /// Invokes `method` on the executor.
    pub async fn dispatch(&self, method: &str, payload: Value) -> Result<Value> {
        self.send(Envelope::dispatch(method, payload)).await
    }

    /// Registers a compiled function under `method` by shipping its source text.
    pub async fn register(&self, method: &str, function: &Function) -> Result<()> {
        self.send(Envelope::register(method, function.source())).await?;
        Ok(())
    }

    /// Registers source text after checking locally that it is a function.
    pub async fn register_source(&self, method: &str, source: &str) -> Result<()> {
        let function = relayscript::compile(source).map_err(|error| {
            debug!(caller = %self.name, method, %error, "refusing to register non-function source");
            Error::InvalidRegistrationArgument
        })?;
        self.register(method, &function).await
    }

    pub async fn unregister(&self, method: &str) -> Result<()> {
        self.send(Envelope::unregister(method)).await?;
        Ok(())
    }
}

impl Drop for Caller {
    fn drop(&mut self) {
        self.pump.abort();
    }
}
