//! # Error Definitions

use relaypack::Value;

/// Why source text could not be turned into a callable.
#[derive(Debug, Clone, PartialEq)]
pub enum CompileError {
    /// The source is longer than `Limits::max_source_len`.
    TooLong { len: usize, max: usize },
    /// Expressions or blocks nest deeper than `Limits::max_depth`.
    TooDeep(usize),
    /// The text is not valid in the dialect.
    Syntax { offset: usize, message: String },
    /// The text is valid but evaluates to something other than a function.
    NotAFunction(String),
}

impl std::fmt::Display for CompileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TooLong { len, max } => write!(f, "Source of {} bytes exceeds the limit of {}", len, max),
            Self::TooDeep(max) => write!(f, "Source nests deeper than {} levels", max),
            Self::Syntax { offset, message } => write!(f, "Syntax error at byte {}: {}", offset, message),
            Self::NotAFunction(what) => write!(f, "Source evaluates to {}, not a function", what),
        }
    }
}

impl std::error::Error for CompileError {}

/// Failures raised while a compiled function runs.
#[derive(Debug, Clone, PartialEq)]
pub enum RuntimeError {
    /// The script executed `throw`.
    Thrown(Value),
    /// An operation was applied to a value that does not support it.
    Type(String),
    /// An identifier was read or assigned before being declared.
    Reference(String),
    /// The registry handle reported a failure.
    Host(String),
}

impl std::fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            // Thrown error objects surface their message, like an uncaught JS error.
            Self::Thrown(value) => match value.get("message") {
                Some(message) => write!(f, "{}", message),
                None => write!(f, "{}", value),
            },
            Self::Type(msg) => write!(f, "TypeError: {}", msg),
            Self::Reference(name) => write!(f, "ReferenceError: {} is not defined", name),
            Self::Host(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for RuntimeError {}
