//! # Executor Loop
//!
//! Binds a [`Registry`] to a transport: reads call frames, performs their
//! actions and posts back correlated replies.
//!
//! ## Invariants
//! - **One Reply Per Call**: Every frame that carries a usable id is answered exactly
//!   once, whatever its envelope looks like and whatever the callable does.
//! - **Sequential**: A frame is handled to completion, including all nested work,
//!   before the next one is read.
//! - **Uncorrelatable Frames Are Dropped**: Without an id there is nobody to answer.

use std::sync::Arc;

use relayrpc::CallFrame;
use relayrpc::ReplyFrame;
use tracing::debug;
use tracing::trace;
use tracing::warn;

use crate::registry::Error;
use crate::registry::Registry;
use crate::transport;
use crate::transport::Transport;

pub struct Executor {
    name: String,
    registry: Registry,
    transport: Arc<dyn Transport>,
}

impl Executor {
    /// The `name` is used for logging and diagnostics.
    pub fn new(name: impl Into<String>, registry: Registry, transport: impl Transport) -> Self {
        Self {
            name: name.into(),
            registry,
            transport: Arc::new(transport),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Serves until the peer hangs up.
    ///
    /// Returns `Ok(())` on a clean hang-up and the transport error otherwise.
    pub async fn serve(&self) -> transport::Result<()> {
        debug!(executor = %self.name, "serving");
        while let Some(bytes) = self.transport.recv().await? {
            let Some(reply) = self.respond(&bytes).await else {
                continue;
            };
            if let Some(bytes) = self.encode_reply(&reply) {
                self.transport.send(&bytes).await?;
            }
        }
        debug!(executor = %self.name, "peer hung up");
        Ok(())
    }

    /// Handles one inbound frame. Returns `None` when the frame cannot be answered.
    pub async fn respond(&self, bytes: &[u8]) -> Option<ReplyFrame> {
        let frame = match CallFrame::decode(bytes) {
            Ok(frame) => frame,
            Err(error) => {
                warn!(executor = %self.name, %error, "dropping frame without a usable id");
                return None;
            }
        };

        let id = frame.id;
        trace!(
            executor = %self.name,
            id,
            kind = %frame.envelope.kind,
            method = %frame.envelope.method,
            "handling action"
        );

        let reply = match self.registry.handle_incoming(frame.envelope).await {
            Ok(result) => ReplyFrame::ok(id, result),
            Err(error) => {
                debug!(executor = %self.name, id, kind = error.name(), %error, "action failed");
                ReplyFrame::err(id, error.to_info())
            }
        };
        Some(reply)
    }

    fn encode_reply(&self, reply: &ReplyFrame) -> Option<Vec<u8>> {
        match reply.encode() {
            Ok(bytes) => Some(bytes),
            Err(error) => {
                // Typically a result nested deeper than the codec allows.
                warn!(executor = %self.name, id = reply.id, %error, "result does not encode");
                let failure = Error::user(format!("Result could not be encoded: {}", error));
                ReplyFrame::err(reply.id, failure.to_info()).encode().ok()
            }
        }
    }
}
