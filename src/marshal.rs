//! Marshalers and unmarshalers
//!
//! Payload layout:
//!
//! ```text
//! [ version tag (varint, != 0) ][ structural codec payload ]
//! ```
//!
//! A [`TypeMarshaler`] always writes under the shape of the live type it was
//! built for. A [`TypeUnmarshaler`] keeps one decoder per historical shape
//! and picks one by the tag. Both are snapshots of the store at build time.

use std::collections::HashMap;
use std::io::{Read, Write};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::codec::{BinaryCodec, StructuralCodec};
use crate::encoder::{check_type, Decoder, Encoder};
use crate::error::{Result, SchemaError};
use crate::types::TypeKey;
use crate::version::{decode_version, encode_version, Version};

/// Marshals values of one live type under one name
pub struct TypeMarshaler<C: StructuralCodec = BinaryCodec> {
    version: Version,
    encoder: Encoder<C::Encoder>,
}

impl<C: StructuralCodec> TypeMarshaler<C> {
    pub(crate) fn new(version: Version, encoder: Encoder<C::Encoder>) -> Self {
        Self { version, encoder }
    }

    /// Version written in front of every payload
    pub fn version(&self) -> Version {
        self.version
    }

    pub fn type_key(&self) -> TypeKey {
        self.encoder.type_key()
    }

    /// Marshal `value` into a new buffer
    pub fn marshal<T: Serialize + 'static>(&self, value: &T) -> Result<Vec<u8>> {
        check_type::<T>(self.encoder.type_key())?;
        let mut buf = Vec::new();
        encode_version(&mut buf, self.version.get())?;
        self.encoder.encode(&mut buf, value)?;
        Ok(buf)
    }

    /// Marshal `value` and append it to `out` in one write
    pub fn marshal_to<T: Serialize + 'static>(&self, out: &mut dyn Write, value: &T) -> Result<()> {
        let buf = self.marshal(value)?;
        out.write_all(&buf)?;
        Ok(())
    }
}

/// Unmarshals payloads written under any recorded shape of one name
pub struct TypeUnmarshaler<C: StructuralCodec = BinaryCodec> {
    typ: TypeKey,
    decoders: HashMap<Version, Decoder<C::Decoder>>,
}

impl<C: StructuralCodec> TypeUnmarshaler<C> {
    pub(crate) fn new(typ: TypeKey, decoders: HashMap<Version, Decoder<C::Decoder>>) -> Self {
        Self { typ, decoders }
    }

    pub fn type_key(&self) -> TypeKey {
        self.typ
    }

    /// Versions this unmarshaler can decode, oldest first
    pub fn versions(&self) -> Vec<Version> {
        let mut versions: Vec<_> = self.decoders.keys().copied().collect();
        versions.sort();
        versions
    }

    /// Unmarshal one payload from `data` into `out`.
    ///
    /// `out` is left untouched on error.
    pub fn unmarshal<T: DeserializeOwned + 'static>(&self, data: &[u8], out: &mut T) -> Result<()> {
        let mut input = data;
        self.unmarshal_from(&mut input, out)
    }

    /// Unmarshal the next payload from `input`, leaving any bytes after it unread
    pub fn unmarshal_from<T: DeserializeOwned + 'static>(
        &self,
        input: &mut dyn Read,
        out: &mut T,
    ) -> Result<()> {
        check_type::<T>(self.typ)?;
        let version = decode_version(input)?;
        let decoder = self
            .decoders
            .get(&version)
            .ok_or(SchemaError::VersionNotFound {
                type_name: self.typ.name(),
                version: version.get(),
            })?;
        decoder.decode(input, out)
    }
}

/// Type-directed marshaling over many registered names
pub struct Marshaler<C: StructuralCodec = BinaryCodec> {
    marshalers: HashMap<TypeKey, TypeMarshaler<C>>,
}

impl<C: StructuralCodec> Marshaler<C> {
    pub(crate) fn new(marshalers: HashMap<TypeKey, TypeMarshaler<C>>) -> Self {
        Self { marshalers }
    }

    /// The marshaler bound to `T`, if any
    pub fn get<T: 'static>(&self) -> Option<&TypeMarshaler<C>> {
        self.marshalers.get(&TypeKey::of::<T>())
    }

    fn find<T: 'static>(&self) -> Result<&TypeMarshaler<C>> {
        self.get::<T>().ok_or(SchemaError::MarshalerNotFound {
            type_name: TypeKey::of::<T>().name(),
        })
    }

    pub fn marshal<T: Serialize + 'static>(&self, value: &T) -> Result<Vec<u8>> {
        self.find::<T>()?.marshal(value)
    }

    pub fn marshal_to<T: Serialize + 'static>(&self, out: &mut dyn Write, value: &T) -> Result<()> {
        self.find::<T>()?.marshal_to(out, value)
    }

    pub fn len(&self) -> usize {
        self.marshalers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.marshalers.is_empty()
    }
}

/// Type-directed unmarshaling over many registered names
pub struct Unmarshaler<C: StructuralCodec = BinaryCodec> {
    unmarshalers: HashMap<TypeKey, TypeUnmarshaler<C>>,
}

impl<C: StructuralCodec> Unmarshaler<C> {
    pub(crate) fn new(unmarshalers: HashMap<TypeKey, TypeUnmarshaler<C>>) -> Self {
        Self { unmarshalers }
    }

    /// The unmarshaler bound to `T`, if any
    pub fn get<T: 'static>(&self) -> Option<&TypeUnmarshaler<C>> {
        self.unmarshalers.get(&TypeKey::of::<T>())
    }

    fn find<T: 'static>(&self) -> Result<&TypeUnmarshaler<C>> {
        self.get::<T>().ok_or(SchemaError::UnmarshalerNotFound {
            type_name: TypeKey::of::<T>().name(),
        })
    }

    pub fn unmarshal<T: DeserializeOwned + 'static>(&self, data: &[u8], out: &mut T) -> Result<()> {
        self.find::<T>()?.unmarshal(data, out)
    }

    pub fn unmarshal_from<T: DeserializeOwned + 'static>(
        &self,
        input: &mut dyn Read,
        out: &mut T,
    ) -> Result<()> {
        self.find::<T>()?.unmarshal_from(input, out)
    }

    pub fn len(&self) -> usize {
        self.unmarshalers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.unmarshalers.is_empty()
    }
}
