//! An executor running in its own thread of control.
//!
//! The isolate owns a dedicated OS thread with a single-threaded runtime. The
//! only way in or out is the byte channel returned to the controller.

use std::thread;

use tracing::debug;

use crate::caller::Caller;
use crate::channel::ChannelTransport;
use crate::executor::Executor;
use crate::registry::Registry;
use crate::transport;

#[derive(Debug)]
pub enum Error {
    /// The thread or its runtime could not be started.
    Spawn(std::io::Error),
    /// The executor loop ended with a transport failure.
    Transport(transport::Error),
    /// The executor thread panicked.
    Panicked,
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Spawn(e) => write!(f, "Failed to start isolate: {}", e),
            Self::Transport(e) => write!(f, "Transport error: {}", e),
            Self::Panicked => write!(f, "Isolate thread panicked"),
        }
    }
}

impl std::error::Error for Error {}

impl From<transport::Error> for Error {
    fn from(e: transport::Error) -> Self {
        Self::Transport(e)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Stack size of the executor thread unless configured otherwise.
pub const DEFAULT_STACK_SIZE: usize = 8 * 1024 * 1024;

/// How the executor thread is started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    pub stack_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self { stack_size: DEFAULT_STACK_SIZE }
    }
}

pub struct Isolate {
    name: String,
    controller: Option<ChannelTransport>,
    thread: thread::JoinHandle<Result<()>>,
}

impl Isolate {
    /// Starts `registry` behind a fresh channel on a new thread.
    pub fn spawn(name: impl Into<String>, registry: Registry) -> Result<Self> {
        Self::spawn_with(name, registry, Config::default())
    }

    pub fn spawn_with(name: impl Into<String>, registry: Registry, config: Config) -> Result<Self> {
        let name = name.into();
        let (controller, executor_end) = ChannelTransport::pair();

        let executor = Executor::new(name.clone(), registry, executor_end);
        let thread = thread::Builder::new()
            .name(name.clone())
            .stack_size(config.stack_size)
            .spawn(move || -> Result<()> {
                // Dropping the executor end hangs up on the controller if this fails.
                let runtime = tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .map_err(Error::Spawn)?;
                runtime.block_on(executor.serve())?;
                debug!(isolate = %executor.name(), "executor finished");
                Ok(())
            })
            .map_err(Error::Spawn)?;

        Ok(Self {
            name,
            controller: Some(controller),
            thread,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Takes the controller end of the channel. Returns `None` once taken.
    pub fn take_transport(&mut self) -> Option<ChannelTransport> {
        self.controller.take()
    }

    /// Builds a caller over the controller end. Returns `None` once taken.
    ///
    /// Must be called within a tokio runtime.
    pub fn caller(&mut self) -> Option<Caller> {
        let transport = self.take_transport()?;
        Some(Caller::new(self.name.clone(), transport))
    }

    /// Hangs up and waits for the executor to drain and stop.
    ///
    /// Any caller built from this isolate must be dropped first, or this never
    /// completes.
    pub async fn join(self) -> Result<()> {
        drop(self.controller);
        let thread = self.thread;
        match tokio::task::spawn_blocking(move || thread.join()).await {
            Ok(Ok(result)) => result,
            _ => Err(Error::Panicked),
        }
    }
}
