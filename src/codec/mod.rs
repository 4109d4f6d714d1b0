//! Structural codec capability
//!
//! The schema store never walks values itself. It asks a [`StructuralCodec`]
//! for a fingerprint of a live type's layout, and for encoders and decoders
//! bound to one recorded fingerprint. [`BinaryCodec`] is the default
//! implementation; any other codec honoring the same contract can be plugged
//! into [`SchemaStore`](crate::SchemaStore) by composition.

use std::fmt::Display;
use std::io::{self, Read, Write};

use serde::de::DeserializeOwned;
use serde::{de, ser, Deserialize, Serialize};
use thiserror::Error;

use crate::checksum::Checksum;

pub mod binary;
pub mod trace;
pub mod value;
pub mod wire;

pub use binary::{BinaryCodec, BinaryDecoder, BinaryEncoder};
pub use value::Value;

/// Errors raised by the structural codec
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("unexpected end of input while reading {context}")]
    UnexpectedEof { context: &'static str },

    #[error("varint exceeds maximum length (10 bytes)")]
    VarintTooLong,

    #[error("varint overflow (value exceeds u64)")]
    VarintOverflow,

    #[error("invalid value tag {tag:#04x}")]
    InvalidTag { tag: u8 },

    #[error("invalid UTF-8 in {field}")]
    InvalidUtf8 { field: &'static str },

    #[error("{field} length {len} exceeds maximum {max}")]
    LengthExceedsLimit {
        field: &'static str,
        len: usize,
        max: usize,
    },

    #[error("nesting depth exceeds maximum {max}")]
    DepthExceeded { max: usize },

    #[error("{0}")]
    Message(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl ser::Error for CodecError {
    fn custom<T: Display>(msg: T) -> Self {
        CodecError::Message(msg.to_string())
    }
}

impl de::Error for CodecError {
    fn custom<T: Display>(msg: T) -> Self {
        CodecError::Message(msg.to_string())
    }
}

/// Bounds applied while decoding untrusted bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodecLimits {
    /// Maximum nesting of arrays, objects and structs
    pub max_depth: usize,
    /// Maximum value of any single length or count prefix
    pub max_len: usize,
}

impl Default for CodecLimits {
    fn default() -> Self {
        Self {
            max_depth: 64,
            max_len: 64 * 1024 * 1024,
        }
    }
}

/// Structural layout of a live type, as seen by [`BinaryCodec`].
///
/// Only structs and tuples are laid out positionally on the wire, so only
/// they carry nested shapes. Everything else is written self-describing.
/// A field the default value skipped while serializing is recorded as
/// [`Shape::Skipped`] so it keeps its place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Shape {
    Unit,
    Bool,
    Int,
    UInt,
    Float,
    Char,
    Str,
    Bytes,
    Option,
    Seq,
    Map,
    Enum,
    Tuple(Vec<Shape>),
    Struct(Vec<Field>),
    Skipped,
}

/// A named struct field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub shape: Shape,
}

impl Shape {
    /// Short name of this shape's kind, for error messages
    pub fn kind(&self) -> &'static str {
        match self {
            Shape::Unit => "unit",
            Shape::Bool => "bool",
            Shape::Int => "int",
            Shape::UInt => "uint",
            Shape::Float => "float",
            Shape::Char => "char",
            Shape::Str => "string",
            Shape::Bytes => "bytes",
            Shape::Option => "option",
            Shape::Seq => "seq",
            Shape::Map => "map",
            Shape::Enum => "enum",
            Shape::Tuple(_) => "tuple",
            Shape::Struct(_) => "struct",
            Shape::Skipped => "skipped",
        }
    }
}

/// Opaque, deterministic description of a shape.
///
/// Two fingerprints are equal iff the codec cannot tell their shapes apart.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(Vec<u8>);

impl Fingerprint {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn checksum(&self) -> Checksum {
        Checksum::from_bytes(&self.0)
    }
}

/// Encoder bound to exactly one wire shape for its whole life
pub trait ShapeEncoder: Send {
    /// Writes the payload for `value`. Implementations must not leave partial
    /// output behind on failure.
    fn encode<T: Serialize + ?Sized>(
        &mut self,
        out: &mut dyn Write,
        value: &T,
    ) -> Result<(), CodecError>;
}

/// Decoder bound to exactly one wire shape for its whole life
pub trait ShapeDecoder: Send {
    /// Reads exactly one payload from `input` into a value of the live type.
    fn decode<T: DeserializeOwned>(&mut self, input: &mut dyn Read) -> Result<T, CodecError>;
}

/// The structural codec capability consumed by the schema store
pub trait StructuralCodec: Send + Sync {
    type Encoder: ShapeEncoder;
    type Decoder: ShapeDecoder;

    /// Fingerprint of `T`'s current layout, derived from `T::default()`.
    fn fingerprint<T: Serialize + Default>(&self) -> Result<Fingerprint, CodecError>;

    /// Builds an encoder whose wire shape is `shape`.
    fn encoder(&self, shape: &Fingerprint) -> Result<Self::Encoder, CodecError>;

    /// Builds a decoder whose wire shape is `shape`, which may be an older
    /// layout than the live type it decodes into.
    fn decoder(&self, shape: &Fingerprint) -> Result<Self::Decoder, CodecError>;

    /// Self-describing serialization, used for the registry file itself.
    fn write_document<T: Serialize>(&self, out: &mut dyn Write, doc: &T) -> Result<(), CodecError>;

    fn read_document<T: DeserializeOwned>(&self, input: &mut dyn Read) -> Result<T, CodecError>;
}
