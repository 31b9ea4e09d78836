//! Turning source text into callables.
//!
//! A registry only accepts source registrations when it was built with a
//! [`Compiler`]. Without one, every source registration is rejected.

use std::sync::Arc;

use relayscript::Limits;

use crate::method::Method;
use crate::method::ScriptMethod;

pub type CompileError = Box<dyn std::error::Error + Send + Sync>;

pub trait Compiler: Send + Sync + 'static {
    /// Compiles `source` into a callable, or explains why it is not one.
    fn compile(&self, source: &str) -> Result<Arc<dyn Method>, CompileError>;
}

/// Compiles the restricted script dialect of [`relayscript`].
#[derive(Debug, Clone, Default)]
pub struct ScriptCompiler {
    limits: Limits,
}

impl ScriptCompiler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limits(limits: Limits) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> &Limits {
        &self.limits
    }
}

impl Compiler for ScriptCompiler {
    fn compile(&self, source: &str) -> Result<Arc<dyn Method>, CompileError> {
        let function = relayscript::compile_with(source, &self.limits)?;
        Ok(Arc::new(ScriptMethod::new(function)))
    }
}
