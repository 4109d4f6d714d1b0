//! Schema Marshal
//!
//! Versioned binary marshaling: values are persisted under a named schema
//! whose shape history is tracked for you, so payloads written by an older
//! layout of a type can still be read after the type changes.
//!
//! ## Features
//!
//! - **Shape Versioning**: every distinct layout of a name gets a stable version, in first-seen order
//! - **Self-Tagged Payloads**: each payload starts with the version it was written under
//! - **Field Drift**: added fields take their defaults, removed fields are dropped
//! - **Crash-Safe Registry**: the shape history is saved by atomic replace and checksummed
//! - **Shared Marshalers**: encoders and decoders are safe to call from many threads
//!
//! ## Usage
//!
//! ```no_run
//! use serde::{Deserialize, Serialize};
//! use schema_marshal::SchemaStore;
//!
//! #[derive(Serialize, Deserialize, Default)]
//! #[serde(default)]
//! struct User {
//!     name: String,
//! }
//!
//! # fn main() -> schema_marshal::Result<()> {
//! let mut store = SchemaStore::open("schemas.bin")?;
//! store.register::<User>("user")?;
//! store.save()?;
//!
//! let marshaler = store.new_type_marshaler("user")?;
//! let bytes = marshaler.marshal(&User { name: "alice".into() })?;
//!
//! let unmarshaler = store.new_type_unmarshaler("user")?;
//! let mut user = User::default();
//! unmarshaler.unmarshal(&bytes, &mut user)?;
//! # Ok(())
//! # }
//! ```
//!
//! Live types must implement `Default` (their shape is traced from the default
//! value) and should carry `#[serde(default)]` so fields missing from older
//! payloads can be filled in.

pub mod checksum;
pub mod codec;
pub mod config;
pub mod encoder;
pub mod error;
pub mod marshal;
pub mod registry;
pub mod schema;
pub mod types;
pub mod version;

pub use checksum::Checksum;
pub use codec::{BinaryCodec, CodecError, CodecLimits, Fingerprint, Shape, StructuralCodec, Value};
pub use config::MarshalConfig;
pub use encoder::{Decoder, Encoder};
pub use error::{Result, SchemaError};
pub use marshal::{Marshaler, TypeMarshaler, TypeUnmarshaler, Unmarshaler};
pub use registry::SchemaStore;
pub use schema::SchemaEntry;
pub use types::TypeKey;
pub use version::{decode_version, encode_version, FramingError, Version};
