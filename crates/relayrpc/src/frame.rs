//! # Protocol Frames
//!
//! Defines the structure of the correlated envelope (Call vs Reply).
//!
//! ## Invariants
//! - **Panic Safety**: All decoding paths return `Result`, never panicking on unknown data.
//! - **Forward Compatibility**: Unknown fields in a call frame or an envelope are ignored.
//! - **Answerable Calls**: A call frame only fails to decode when it has no usable `id`.
//!   A broken envelope still decodes, so the executor has something to reply to.

use relaypack::Value;

use crate::error::Error;
use crate::error::Result;

/// The three actions an executor understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionType {
    Dispatch,
    Register,
    Unregister,
}

impl ActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Dispatch => "dispatch",
            Self::Register => "register",
            Self::Unregister => "unregister",
        }
    }

    pub fn parse(kind: &str) -> Option<Self> {
        match kind {
            "dispatch" => Some(Self::Dispatch),
            "register" => Some(Self::Register),
            "unregister" => Some(Self::Unregister),
            _ => None,
        }
    }
}

/// One requested operation: action type, target method name and payload.
///
/// `kind` is kept as the raw string that arrived on the wire. Use
/// [`Envelope::action_type`] to interpret it.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Envelope {
    pub kind: String,
    pub method: String,
    pub payload: Value,
}

impl Envelope {
    pub fn new(action: ActionType, method: impl Into<String>, payload: Value) -> Self {
        Self {
            kind: action.as_str().to_owned(),
            method: method.into(),
            payload,
        }
    }

    pub fn dispatch(method: impl Into<String>, payload: Value) -> Self {
        Self::new(ActionType::Dispatch, method, payload)
    }

    /// A register action carrying the callable's source text.
    pub fn register(method: impl Into<String>, source: impl Into<String>) -> Self {
        Self::new(ActionType::Register, method, Value::String(source.into()))
    }

    pub fn unregister(method: impl Into<String>) -> Self {
        Self::new(ActionType::Unregister, method, Value::Unit)
    }

    /// Returns `None` for an action type this protocol does not know.
    pub fn action_type(&self) -> Option<ActionType> {
        ActionType::parse(&self.kind)
    }

    pub fn to_value(&self) -> Value {
        Value::map([
            ("type", Value::String(self.kind.clone())),
            ("method", Value::String(self.method.clone())),
            ("payload", self.payload.clone()),
        ])
    }

    /// Decodes leniently: a missing or non-string field becomes empty.
    pub fn from_value(value: &Value) -> Self {
        let text = |key: &str| {
            value.get(key).and_then(Value::as_str).unwrap_or_default().to_owned()
        };

        Self {
            kind: text("type"),
            method: text("method"),
            payload: value.get("payload").cloned().unwrap_or_default(),
        }
    }
}

/// Outbound correlated message: `{ id, message }`.
#[derive(Debug, Clone, PartialEq)]
pub struct CallFrame {
    pub id: u64,
    pub envelope: Envelope,
}

impl CallFrame {
    pub fn new(id: u64, envelope: Envelope) -> Self {
        Self { id, envelope }
    }

    pub fn to_value(&self) -> Result<Value> {
        Ok(Value::map([
            ("id", encode_id(self.id)?),
            ("message", self.envelope.to_value()),
        ]))
    }

    /// Decode a Call frame from a value.
    ///
    /// Fails only if the frame is not a map or carries no usable `id`.
    pub fn from_value(value: &Value) -> Result<Self> {
        if value.as_map().is_none() {
            return Err(Error::ProtocolViolation(format!("Call frame is a {}, not a map", value.type_name())));
        }

        let id = value.get("id")
            .and_then(decode_id)
            .ok_or(Error::ProtocolViolation("Missing id".into()))?;

        let envelope = value.get("message")
            .map(Envelope::from_value)
            .unwrap_or_default();

        Ok(Self { id, envelope })
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(relaypack::encode(&self.to_value()?)?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        Self::from_value(&relaypack::decode(bytes)?)
    }
}

/// The serializable description of a failure: at least a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorInfo {
    pub name: String,
    pub message: String,
}

impl ErrorInfo {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self { name: name.into(), message: message.into() }
    }

    pub fn to_value(&self) -> Value {
        Value::map([
            ("name", Value::String(self.name.clone())),
            ("message", Value::String(self.message.clone())),
        ])
    }

    /// Reconstructs error information from whatever sits in a reply's error slot.
    ///
    /// Total by construction: a map yields its `message` and `name`, and any
    /// other value becomes the message text.
    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::Map(_) => Self {
                name: value.get("name").and_then(Value::as_str).unwrap_or("Error").to_owned(),
                message: value.get("message").map(Value::to_string).unwrap_or_default(),
            },
            other => Self::new("Error", other.to_string()),
        }
    }
}

impl std::fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// Inbound correlated reply: `[id, error, result]`.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplyFrame {
    pub id: u64,
    pub error: Option<ErrorInfo>,
    pub result: Value,
}

impl ReplyFrame {
    pub fn ok(id: u64, result: Value) -> Self {
        Self { id, error: None, result }
    }

    pub fn err(id: u64, error: ErrorInfo) -> Self {
        Self { id, error: Some(error), result: Value::Unit }
    }

    /// Splits into the outcome the caller should observe.
    ///
    /// A set error always wins over a result.
    pub fn into_result(self) -> std::result::Result<Value, ErrorInfo> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.result),
        }
    }

    pub fn to_value(&self) -> Result<Value> {
        let error = self.error.as_ref().map(ErrorInfo::to_value).unwrap_or_default();
        Ok(Value::List(vec![encode_id(self.id)?, error, self.result.clone()]))
    }

    /// Decode a Reply frame from a value.
    ///
    /// Returns `Error::NotAReply` for anything but a 3-element list.
    pub fn from_value(value: &Value) -> Result<Self> {
        let Some([id, error, result]) = value.as_list() else {
            return Err(Error::NotAReply);
        };

        let id = decode_id(id)
            .ok_or(Error::ProtocolViolation("Reply id is not a non-negative integer".into()))?;

        let error = is_set(error).then(|| ErrorInfo::from_value(error));

        Ok(Self { id, error, result: result.clone() })
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(relaypack::encode(&self.to_value()?)?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        Self::from_value(&relaypack::decode(bytes)?)
    }
}

// Helper functions

fn encode_id(id: u64) -> Result<Value> {
    i64::try_from(id)
        .map(Value::Int)
        .map_err(|_| Error::ProtocolViolation(format!("Id {} does not fit the wire", id)))
}

/// Whether an error slot counts as set. Falsy slots (`false`, `0`, `""`, NaN)
/// read as no error, matching how JS peers test the slot with `if (err)`.
fn is_set(error: &Value) -> bool {
    match error {
        Value::Unit => false,
        Value::Bool(b) => *b,
        Value::Int(v) => *v != 0,
        Value::Float(v) => *v != 0.0 && !v.is_nan(),
        Value::String(s) => !s.is_empty(),
        _ => true,
    }
}

fn decode_id(value: &Value) -> Option<u64> {
    value.as_int().and_then(|id| u64::try_from(id).ok())
}
