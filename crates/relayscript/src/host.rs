use async_trait::async_trait;
use relaypack::Value;

/// The registry operations a running script may perform.
///
/// A script receives this as its second parameter. Failures come back as the
/// message text a script would see in a caught error.
#[async_trait]
pub trait Host: Send + Sync {
    async fn dispatch(&self, method: &str, payload: Value) -> Result<Value, String>;
    async fn register(&self, method: &str, source: Value) -> Result<(), String>;
    async fn unregister(&self, method: &str);
}

/// A host with no registry behind it; every dispatch fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct Detached;

#[async_trait]
impl Host for Detached {
    async fn dispatch(&self, method: &str, _payload: Value) -> Result<Value, String> {
        Err(format!("Method \"{}\" not registered", method))
    }

    async fn register(&self, _method: &str, _source: Value) -> Result<(), String> {
        Err("Registration is not available here".into())
    }

    async fn unregister(&self, _method: &str) {}
}
