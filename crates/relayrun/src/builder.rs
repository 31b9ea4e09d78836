//! # Registry Builder
//!
//! Provides a fluent API for composing a registry with its initial methods and
//! its source registration policy.

use std::future::Future;
use std::sync::Arc;

use relaypack::Value;

use crate::compiler::Compiler;
use crate::method::FnMethod;
use crate::method::Method;
use crate::registry::Handle;
use crate::registry::Inner;
use crate::registry::Registry;
use crate::registry::Result;

/// Fluent builder for a [`Registry`].
#[derive(Default)]
pub struct RegistryBuilder {
    methods: Vec<(String, Arc<dyn Method>)>,
    compiler: Option<Arc<dyn Compiler>>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the registry with an async closure.
    pub fn function<F, Fut>(self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(Value, Handle) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        self.method(name, FnMethod::new(f))
    }

    /// Seeds the registry with a callable. A later seed with the same name wins.
    pub fn method(mut self, name: impl Into<String>, method: impl Method) -> Self {
        self.methods.push((name.into(), Arc::new(method)));
        self
    }

    /// Accepts source-text registrations, compiled with `compiler`.
    pub fn allow_source(mut self, compiler: impl Compiler) -> Self {
        self.compiler = Some(Arc::new(compiler));
        self
    }

    pub fn build(self) -> Registry {
        Registry::from_inner(Inner::new(self.methods, self.compiler))
    }
}
