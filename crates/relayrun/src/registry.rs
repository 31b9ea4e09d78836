//! # Method Registry
//!
//! The executor-side table of named callables and the three actions that
//! operate on it.
//!
//! ## Invariants
//! - **Last Write Wins**: Registering an existing name replaces the callable.
//! - **No Guards Across Awaits**: A callable is cloned out of the table before it
//!   runs, so a running callable may freely dispatch, register or unregister,
//!   including its own name.
//! - **Contained Failures**: Errors and panics raised by user callables come back
//!   as `Error::UserCallable`; they never unwind into the executor.
//! - **Flat Nesting**: A dispatch made through a [`Handle`] runs as its own task,
//!   so a chain of reentrant calls does not grow the polling thread's stack.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use dashmap::DashMap;
use futures::FutureExt;
use relaypack::Value;
use relayrpc::ActionType;
use relayrpc::Envelope;
use relayrpc::ErrorInfo;
use tracing::debug;

use crate::builder::RegistryBuilder;
use crate::compiler::Compiler;
use crate::method::Method;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// No callable is registered under the name.
    MethodNotFound(String),
    /// The registration was neither a callable nor source text that compiles to one.
    UnsupportedRegistration,
    /// The envelope named an action this registry does not perform.
    UnsupportedActionType(String),
    /// A user callable failed or panicked; carries its message.
    UserCallable(String),
}

impl Error {
    /// Wraps any displayable failure raised inside a callable.
    pub fn user(message: impl std::fmt::Display) -> Self {
        Self::UserCallable(message.to_string())
    }

    /// Stable name of the failure kind, carried in the error half of a reply.
    pub fn name(&self) -> &'static str {
        match self {
            Self::MethodNotFound(_) => "MethodNotFound",
            Self::UnsupportedRegistration => "UnsupportedRegistration",
            Self::UnsupportedActionType(_) => "UnsupportedActionType",
            Self::UserCallable(_) => "UserCallableFailure",
        }
    }

    pub fn to_info(&self) -> ErrorInfo {
        ErrorInfo::new(self.name(), self.to_string())
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MethodNotFound(name) => write!(f, "Method \"{}\" not registered", name),
            Self::UnsupportedRegistration => {
                write!(f, "Unsupported function type. Pass either a function or a stringified function")
            }
            Self::UnsupportedActionType(_) => write!(f, "Unsupported action type"),
            Self::UserCallable(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;

/// What can be registered under a name.
pub enum Registration {
    /// A callable, inserted as is.
    Callable(Arc<dyn Method>),
    /// Serialized source; only a string that compiles to a callable is accepted.
    Source(Value),
}

impl Registration {
    pub fn callable(method: impl Method) -> Self {
        Self::Callable(Arc::new(method))
    }

    pub fn source(text: impl Into<String>) -> Self {
        Self::Source(Value::String(text.into()))
    }
}

impl From<Arc<dyn Method>> for Registration {
    fn from(method: Arc<dyn Method>) -> Self {
        Self::Callable(method)
    }
}

pub(crate) struct Inner {
    methods: DashMap<String, Arc<dyn Method>>,
    compiler: Option<Arc<dyn Compiler>>,
}

impl Inner {
    pub(crate) fn new(
        methods: impl IntoIterator<Item = (String, Arc<dyn Method>)>,
        compiler: Option<Arc<dyn Compiler>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            methods: methods.into_iter().collect(),
            compiler,
        })
    }

    async fn dispatch(self: &Arc<Self>, name: &str, payload: Value) -> Result<Value> {
        let method = self.methods
            .get(name)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| Error::MethodNotFound(name.to_owned()))?;

        let handle = Handle { inner: self.clone() };
        match AssertUnwindSafe(method.call(payload, handle)).catch_unwind().await {
            Ok(result) => result,
            Err(panic) => Err(Error::UserCallable(panic_message(panic.as_ref()))),
        }
    }

    fn register(&self, name: String, registration: Registration) -> Result<()> {
        let method = match registration {
            Registration::Callable(method) => method,
            Registration::Source(Value::String(text)) => {
                let Some(compiler) = &self.compiler else {
                    debug!(method = %name, "source registration is disabled");
                    return Err(Error::UnsupportedRegistration);
                };
                compiler.compile(&text).map_err(|reason| {
                    debug!(method = %name, %reason, "source did not compile to a callable");
                    Error::UnsupportedRegistration
                })?
            }
            Registration::Source(other) => {
                debug!(method = %name, kind = other.type_name(), "registration is not source text");
                return Err(Error::UnsupportedRegistration);
            }
        };

        self.methods.insert(name, method);
        Ok(())
    }

    fn unregister(&self, name: &str) {
        self.methods.remove(name);
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "Callable panicked".into()
    }
}

/// The executor-side method table.
///
/// Cheap to clone; clones share the same table.
#[derive(Clone)]
pub struct Registry {
    inner: Arc<Inner>,
}

impl Registry {
    /// An empty registry with source registration disabled.
    pub fn new() -> Self {
        Self { inner: Inner::new(Vec::new(), None) }
    }

    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    pub(crate) fn from_inner(inner: Arc<Inner>) -> Self {
        Self { inner }
    }

    /// Invokes the callable registered under `name` and returns what it completes with.
    pub async fn dispatch(&self, name: &str, payload: Value) -> Result<Value> {
        self.inner.dispatch(name, payload).await
    }

    pub fn register(&self, name: impl Into<String>, registration: Registration) -> Result<()> {
        self.inner.register(name.into(), registration)
    }

    /// Removes `name`. Removing a name that is not registered does nothing.
    pub fn unregister(&self, name: &str) {
        self.inner.unregister(name)
    }

    /// Performs the action an envelope asks for.
    ///
    /// `dispatch` yields the callable's result; `register` and `unregister`
    /// yield `Unit`.
    pub async fn handle_incoming(&self, envelope: Envelope) -> Result<Value> {
        match envelope.action_type() {
            Some(ActionType::Dispatch) => self.dispatch(&envelope.method, envelope.payload).await,
            Some(ActionType::Register) => {
                self.register(envelope.method, Registration::Source(envelope.payload))?;
                Ok(Value::Unit)
            }
            Some(ActionType::Unregister) => {
                self.unregister(&envelope.method);
                Ok(Value::Unit)
            }
            None => Err(Error::UnsupportedActionType(envelope.kind)),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.inner.methods.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.inner.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.methods.is_empty()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

/// What a running callable gets to see of its registry.
///
/// Exposes `dispatch`, `register` and `unregister` and nothing else.
#[derive(Clone)]
pub struct Handle {
    inner: Arc<Inner>,
}

impl Handle {
    /// Invokes `name` from inside a running callable.
    ///
    /// Inside a tokio runtime the nested call is spawned and awaited; outside
    /// one it runs inline.
    pub async fn dispatch(&self, name: &str, payload: Value) -> Result<Value> {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return self.inner.dispatch(name, payload).await;
        };

        let inner = self.inner.clone();
        let name = name.to_owned();
        let nested = runtime.spawn(async move { inner.dispatch(&name, payload).await });
        match nested.await {
            Ok(result) => result,
            Err(error) => {
                debug!(%error, "nested dispatch did not finish");
                Err(Error::UserCallable("Nested dispatch was cancelled".into()))
            }
        }
    }

    pub fn register(&self, name: impl Into<String>, registration: Registration) -> Result<()> {
        self.inner.register(name.into(), registration)
    }

    pub fn unregister(&self, name: &str) {
        self.inner.unregister(name)
    }
}

#[async_trait::async_trait]
impl relayscript::Host for Handle {
    async fn dispatch(&self, method: &str, payload: Value) -> std::result::Result<Value, String> {
        Handle::dispatch(self, method, payload).await.map_err(|e| e.to_string())
    }

    async fn register(&self, method: &str, source: Value) -> std::result::Result<(), String> {
        Handle::register(self, method, Registration::Source(source)).map_err(|e| e.to_string())
    }

    async fn unregister(&self, method: &str) {
        Handle::unregister(self, method)
    }
}
