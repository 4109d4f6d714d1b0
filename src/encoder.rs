//! Lock-guarded encoder and decoder wrappers
//!
//! A codec encoder or decoder is bound to one (live type, wire shape) pair
//! for its whole life and may keep internal state between calls. These
//! wrappers let one bound instance serve many destinations: each call checks
//! the value's type, then takes the lock and hands the codec the stream for
//! that call only.

use std::io::{Read, Write};

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::codec::{Fingerprint, ShapeDecoder, ShapeEncoder, StructuralCodec};
use crate::error::{Result, SchemaError};
use crate::types::TypeKey;

/// Reusable, thread-safe encoder for one live type
#[derive(Debug)]
pub struct Encoder<E> {
    typ: TypeKey,
    inner: Mutex<E>,
}

impl<E: ShapeEncoder> Encoder<E> {
    /// Binds `codec`'s encoder for `shape` to the live type `typ`.
    pub fn new<C>(codec: &C, typ: TypeKey, shape: &Fingerprint) -> Result<Self>
    where
        C: StructuralCodec<Encoder = E>,
    {
        Ok(Self {
            typ,
            inner: Mutex::new(codec.encoder(shape)?),
        })
    }

    pub fn type_key(&self) -> TypeKey {
        self.typ
    }

    /// Encodes `value` into `out`. Fails before touching the codec if `T` is
    /// not the bound type.
    pub fn encode<T: Serialize + 'static>(&self, out: &mut dyn Write, value: &T) -> Result<()> {
        check_type::<T>(self.typ)?;
        let mut enc = self.inner.lock();
        enc.encode(out, value)?;
        Ok(())
    }
}

/// Reusable, thread-safe decoder for one live type and one wire shape
#[derive(Debug)]
pub struct Decoder<D> {
    typ: TypeKey,
    inner: Mutex<D>,
}

impl<D: ShapeDecoder> Decoder<D> {
    /// Binds `codec`'s decoder for the recorded `shape` to the live type `typ`.
    /// `shape` may be older than `typ`'s current layout.
    pub fn new<C>(codec: &C, typ: TypeKey, shape: &Fingerprint) -> Result<Self>
    where
        C: StructuralCodec<Decoder = D>,
    {
        Ok(Self {
            typ,
            inner: Mutex::new(codec.decoder(shape)?),
        })
    }

    pub fn type_key(&self) -> TypeKey {
        self.typ
    }

    /// Decodes one payload from `input` into `out`. `out` is only written
    /// when decoding succeeds.
    pub fn decode<T: DeserializeOwned + 'static>(
        &self,
        input: &mut dyn Read,
        out: &mut T,
    ) -> Result<()> {
        check_type::<T>(self.typ)?;
        let mut dec = self.inner.lock();
        *out = dec.decode(input)?;
        Ok(())
    }
}

pub(crate) fn check_type<T: ?Sized + 'static>(expected: TypeKey) -> Result<()> {
    let actual = TypeKey::of::<T>();
    if actual != expected {
        return Err(SchemaError::TypeMismatch {
            expected: expected.name(),
            actual: actual.name(),
        });
    }
    Ok(())
}
