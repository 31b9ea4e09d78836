//! # Relaypack
//!
//! The transportable value type of relay and a small, bounded TLV codec for it.
//!
//! ## Philosophy
//!
//! - **Closed Values**: Everything that crosses an isolation boundary is a [`Value`].
//!   There is no way to smuggle a live reference through the codec.
//! - **TLV Architecture**: `[Tag][Length?][Value]`, so every item can be skipped or
//!   bounds-checked without knowing what is inside.
//! - **Hostile Input**: Decoders are bounds-checked views. Truncated buffers, unknown
//!   tags, invalid UTF-8 and runaway nesting are errors, never panics.
//!
//! ## Format
//!
//! - **Scalars**: `[Tag: 1b][Data: N]`
//! - **Strings**: `[Tag: 1b][Len: 4b][Data: Len]`
//! - **Containers**: `[Tag: 1b][Len: 4b][Body: Len]`
//! - **Map bodies**: `([String key][Value])*`
//!
//! All integers are Little-Endian.

mod value;

pub use value::Value;

use std::collections::BTreeMap;

#[cfg(test)]
mod tests;

/// Maximum container nesting accepted by the encoder and the decoder.
pub const MAX_DEPTH: usize = 64;

/// Relaypack serialization and deserialization errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Byte does not correspond to a valid `Tag`, or a different tag was expected.
    InvalidTag(u8),
    /// String data is not valid UTF-8.
    InvalidUtf8,
    /// Buffer exhausted while reading.
    UnexpectedEnd,
    /// String or container length exceeds `u32::MAX`.
    BlobTooLarge(usize),
    /// Containers are nested deeper than [`MAX_DEPTH`].
    DepthExceeded(usize),
    /// A map carries the same key twice.
    DuplicateKey(String),
    /// Bytes left over after the top-level value.
    TrailingBytes(usize),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::InvalidTag(b) => write!(f, "Invalid Tag byte: {:#04x}", b),
            Error::BlobTooLarge(n) => write!(f, "Blob of {} bytes does not fit a u32 length", n),
            Error::DepthExceeded(max) => write!(f, "Nesting exceeds the limit of {} containers", max),
            Error::DuplicateKey(k) => write!(f, "Duplicate map key: {:?}", k),
            Error::TrailingBytes(n) => write!(f, "{} trailing bytes after value", n),
            _ => write!(f, "{:?}", self),
        }
    }
}

impl std::error::Error for Error {}

/// Specialized `Result` for Relaypack operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Identifies the type of the encoded value.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tag {
    BoolTrue = 0x01,
    BoolFalse = 0x02,
    S64 = 0x0A,
    F64 = 0x0C,

    // Unit / undefined
    Unit = 0x0E,

    // Blobs (Tag + u32 Len + Bytes)
    String = 0x10,

    // Containers (Tag + u32 Len + Body)
    List = 0x20,
    Map = 0x21,
}

impl Tag {
    /// Returns the Tag variant for a given byte, or `None` if invalid.
    pub fn from_u8(b: u8) -> Option<Self> {
        match b {
            0x01 => Some(Tag::BoolTrue),
            0x02 => Some(Tag::BoolFalse),
            0x0A => Some(Tag::S64),
            0x0C => Some(Tag::F64),
            0x0E => Some(Tag::Unit),
            0x10 => Some(Tag::String),
            0x20 => Some(Tag::List),
            0x21 => Some(Tag::Map),
            _ => None,
        }
    }
}

/// Encodes a value into a fresh byte vector.
pub fn encode(value: &Value) -> Result<Vec<u8>> {
    let mut enc = Encoder::new();
    enc.value(value)?;
    Ok(enc.into_bytes())
}

/// Decodes exactly one value from `bytes`.
///
/// # Errors
/// Returns `Error::TrailingBytes` if anything follows the value.
pub fn decode(bytes: &[u8]) -> Result<Value> {
    let mut dec = Decoder::new(bytes);
    let value = dec.value()?;
    if dec.remaining() != 0 {
        return Err(Error::TrailingBytes(dec.remaining()));
    }
    Ok(value)
}

/// An append-only encoder that back-patches container lengths.
pub struct Encoder {
    buf: Vec<u8>,
}

impl Encoder {
    /// Creates a new encoder with default capacity.
    pub fn new() -> Self {
        Self { buf: Vec::with_capacity(256) }
    }

    /// Consumes the encoder and returns the final byte vector.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    /// Encodes a value and all of its children.
    pub fn value(&mut self, value: &Value) -> Result<()> {
        self.value_at(value, 0)
    }

    fn value_at(&mut self, value: &Value, depth: usize) -> Result<()> {
        match value {
            Value::Unit => self.buf.push(Tag::Unit as u8),
            Value::Bool(true) => self.buf.push(Tag::BoolTrue as u8),
            Value::Bool(false) => self.buf.push(Tag::BoolFalse as u8),
            Value::Int(v) => {
                self.buf.push(Tag::S64 as u8);
                self.buf.extend_from_slice(&v.to_le_bytes());
            }
            Value::Float(v) => {
                self.buf.push(Tag::F64 as u8);
                self.buf.extend_from_slice(&v.to_le_bytes());
            }
            Value::String(s) => self.str(s)?,
            Value::List(items) => {
                let start = self.begin_container(Tag::List, depth)?;
                for item in items {
                    self.value_at(item, depth + 1)?;
                }
                self.end_container(start)?;
            }
            Value::Map(entries) => {
                let start = self.begin_container(Tag::Map, depth)?;
                for (key, item) in entries {
                    self.str(key)?;
                    self.value_at(item, depth + 1)?;
                }
                self.end_container(start)?;
            }
        }
        Ok(())
    }

    fn str(&mut self, v: &str) -> Result<()> {
        let len = u32::try_from(v.len()).map_err(|_| Error::BlobTooLarge(v.len()))?;
        self.buf.push(Tag::String as u8);
        self.buf.extend_from_slice(&len.to_le_bytes());
        self.buf.extend_from_slice(v.as_bytes());
        Ok(())
    }

    fn begin_container(&mut self, tag: Tag, depth: usize) -> Result<usize> {
        if depth >= MAX_DEPTH {
            return Err(Error::DepthExceeded(MAX_DEPTH));
        }
        self.buf.push(tag as u8);
        self.buf.extend_from_slice(&[0, 0, 0, 0]); // Length placeholder
        Ok(self.buf.len())
    }

    fn end_container(&mut self, start: usize) -> Result<()> {
        let body_len = self.buf.len() - start;
        let len = u32::try_from(body_len).map_err(|_| Error::BlobTooLarge(body_len))?;
        self.buf[start - 4..start].copy_from_slice(&len.to_le_bytes());
        Ok(())
    }
}

impl Default for Encoder {
    fn default() -> Self {
        Self::new()
    }
}

/// A zero-copy, bounds-checked cursor over a byte slice.
///
/// Reading advances the internal cursor. Container reads hand out new `Decoder`
/// instances restricted to the container's body.
#[derive(Debug, Clone)]
pub struct Decoder<'a> {
    buf: &'a [u8],
}

impl<'a> Decoder<'a> {
    /// Creates a decoder over the slice.
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    /// Returns the remaining bytes in the view.
    pub fn remaining(&self) -> usize {
        self.buf.len()
    }

    /// Peeks the next Tag without advancing.
    pub fn peek_tag(&self) -> Result<Tag> {
        let Some(&b) = self.buf.first() else { return Err(Error::UnexpectedEnd) };
        Tag::from_u8(b).ok_or(Error::InvalidTag(b))
    }

    fn read_bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        if n > self.buf.len() { return Err(Error::UnexpectedEnd); }
        let (head, tail) = self.buf.split_at(n);
        self.buf = tail;
        Ok(head)
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        self.read_bytes(N)?.try_into().map_err(|_| Error::UnexpectedEnd)
    }

    fn read_len(&mut self) -> Result<usize> {
        Ok(u32::from_le_bytes(self.read_array()?) as usize)
    }

    /// Decodes a string slice (UTF-8).
    pub fn str(&mut self) -> Result<&'a str> {
        let tag = self.peek_tag()?;
        if tag != Tag::String {
            return Err(Error::InvalidTag(tag as u8));
        }
        self.read_bytes(1)?;
        self.str_body()
    }

    fn str_body(&mut self) -> Result<&'a str> {
        let len = self.read_len()?;
        let bytes = self.read_bytes(len)?;
        std::str::from_utf8(bytes).map_err(|_| Error::InvalidUtf8)
    }

    /// Decodes the next value and all of its children.
    pub fn value(&mut self) -> Result<Value> {
        self.value_at(0)
    }

    fn value_at(&mut self, depth: usize) -> Result<Value> {
        let tag = self.peek_tag()?;
        if matches!(tag, Tag::List | Tag::Map) && depth >= MAX_DEPTH {
            return Err(Error::DepthExceeded(MAX_DEPTH));
        }
        self.read_bytes(1)?; // Consume Tag

        match tag {
            Tag::Unit => Ok(Value::Unit),
            Tag::BoolTrue => Ok(Value::Bool(true)),
            Tag::BoolFalse => Ok(Value::Bool(false)),
            Tag::S64 => Ok(Value::Int(i64::from_le_bytes(self.read_array()?))),
            Tag::F64 => Ok(Value::Float(f64::from_le_bytes(self.read_array()?))),
            Tag::List => {
                let mut body = self.enter_container()?;
                let mut items = Vec::new();
                while body.remaining() > 0 {
                    items.push(body.value_at(depth + 1)?);
                }
                Ok(Value::List(items))
            }
            Tag::Map => {
                let mut body = self.enter_container()?;
                let mut entries = BTreeMap::new();
                while body.remaining() > 0 {
                    let key = body.str()?;
                    let item = body.value_at(depth + 1)?;
                    if entries.insert(key.to_owned(), item).is_some() {
                        return Err(Error::DuplicateKey(key.to_owned()));
                    }
                }
                Ok(Value::Map(entries))
            }
            Tag::String => Ok(Value::String(self.str_body()?.to_owned())),
        }
    }

    fn enter_container(&mut self) -> Result<Decoder<'a>> {
        let len = self.read_len()?;
        Ok(Decoder::new(self.read_bytes(len)?))
    }
}
