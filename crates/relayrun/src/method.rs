//! Callables that can live in a registry.

use std::future::Future;

use relaypack::Value;
use relayscript::Function;

use crate::registry::Error;
use crate::registry::Handle;
use crate::registry::Result;

/// A named operation the executor can run.
///
/// The handle lets a callable reach back into the registry that is running it.
/// This trait is designed to be object-safe (`Arc<dyn Method>`).
#[async_trait::async_trait]
pub trait Method: Send + Sync + 'static {
    async fn call(&self, payload: Value, handle: Handle) -> Result<Value>;
}

/// Adapts an async closure into a [`Method`].
pub struct FnMethod<F>(F);

impl<F> FnMethod<F> {
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

#[async_trait::async_trait]
impl<F, Fut> Method for FnMethod<F>
where
    F: Fn(Value, Handle) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value>> + Send + 'static,
{
    async fn call(&self, payload: Value, handle: Handle) -> Result<Value> {
        (self.0)(payload, handle).await
    }
}

/// A callable compiled from source text.
pub struct ScriptMethod {
    function: Function,
}

impl ScriptMethod {
    pub fn new(function: Function) -> Self {
        Self { function }
    }
}

#[async_trait::async_trait]
impl Method for ScriptMethod {
    async fn call(&self, payload: Value, handle: Handle) -> Result<Value> {
        self.function
            .call(payload, &handle)
            .await
            .map_err(Error::user)
    }
}
