//! Error types for the schema store and marshalers

use std::path::PathBuf;

use thiserror::Error;

use crate::codec::CodecError;
use crate::version::FramingError;

/// Result type for schema operations
pub type Result<T> = std::result::Result<T, SchemaError>;

/// Schema store and marshaling errors
#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("schema for {name} is not registered")]
    NotRegistered { name: String },

    #[error("no live type is bound to {name}; register it in this process first")]
    TypeNotBound { name: String },

    #[error("type mismatch: expected {expected} but got {actual}")]
    TypeMismatch {
        expected: &'static str,
        actual: &'static str,
    },

    #[error("decoder not found for type {type_name}, version {version}")]
    VersionNotFound {
        type_name: &'static str,
        version: u64,
    },

    #[error("marshaler of type {type_name} cannot be found")]
    MarshalerNotFound { type_name: &'static str },

    #[error("unmarshaler of type {type_name} cannot be found")]
    UnmarshalerNotFound { type_name: &'static str },

    #[error("type {type_name} is bound to both {first} and {second}")]
    DuplicateType {
        type_name: &'static str,
        first: String,
        second: String,
    },

    #[error("invalid version tag: {0}")]
    Framing(#[from] FramingError),

    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("registry file {path}: {reason}")]
    Persistence { path: PathBuf, reason: String },

    #[error("checksum mismatch in {path}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    #[error("corrupt registry entry {name}: {reason}")]
    CorruptRegistry { name: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
