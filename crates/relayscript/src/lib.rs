//! # Relayscript
//!
//! Turns the source text of a remotely registered method into something the
//! registry can call.
//!
//! The dialect is a small, loop-free subset of JavaScript: one top-level
//! function literal (`function`, `async function` or an arrow) whose first
//! parameter receives the payload and whose second receives the registry
//! handle. Inside, a script has `let`/`const`, `if`/`else`, `return`, `throw`,
//! the usual operators, array and object literals, `Math.*`, and calls on the
//! registry handle.
//!
//! ## Boundaries
//!
//! - Compilation is bounded by [`Limits`]: source length and nesting depth.
//! - A script can reach nothing but its arguments, the registry handle and `Math`.
//! - There are no loops; every script terminates once its registry calls do.

mod ast;
mod error;
mod eval;
mod host;
mod lexer;
mod parser;

pub use error::CompileError;
pub use error::RuntimeError;
pub use host::Detached;
pub use host::Host;

pub use relaypack::Value;

use ast::FunctionDef;

#[cfg(test)]
mod tests;

/// Bounds applied before and during parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    pub max_source_len: usize,
    pub max_depth: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_source_len: 64 * 1024,
            max_depth: 64,
        }
    }
}

/// A compiled function, ready to be called any number of times.
#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    def: FunctionDef,
    source: String,
}

impl Function {
    /// The declared name, if the source used `function name(...)`.
    pub fn name(&self) -> Option<&str> {
        self.def.name.as_deref()
    }

    pub fn params(&self) -> &[String] {
        &self.def.params
    }

    /// The source text this function was compiled from, trimmed.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Runs the function with `payload` as its first argument and `host` as its second.
    pub async fn call(&self, payload: Value, host: &dyn Host) -> Result<Value, RuntimeError> {
        eval::call(&self.def, payload, host).await
    }
}

impl std::fmt::Display for Function {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.source)
    }
}

/// Compiles with the default [`Limits`].
pub fn compile(source: &str) -> Result<Function, CompileError> {
    compile_with(source, &Limits::default())
}

pub fn compile_with(source: &str, limits: &Limits) -> Result<Function, CompileError> {
    if source.len() > limits.max_source_len {
        return Err(CompileError::TooLong { len: source.len(), max: limits.max_source_len });
    }

    let tokens = lexer::tokenize(source)?;
    let def = parser::parse_program(tokens, limits.max_depth)?;
    Ok(Function { def, source: source.trim().to_owned() })
}
