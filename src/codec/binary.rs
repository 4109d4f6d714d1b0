//! The default structural codec.
//!
//! Values go through a [`Value`] tree. A struct or tuple that fits the bound
//! shape is written as [`tag::SHAPED`] followed by its members in the shape's
//! order with no field names. A field the value skipped is written as
//! [`tag::ABSENT`]. Anything that does not fit, and every other kind of
//! value, uses the self-describing format from [`wire`](super::wire).
//! Decoding walks the bound (possibly historical) shape to put names back,
//! then lets serde populate the live type, so added fields take their
//! `#[serde(default)]` and removed fields are ignored.

use std::io::{Read, Write};

use serde::de::DeserializeOwned;
use serde::Serialize;
use super::trace::trace;
use super::value::{from_value, to_value};
use super::wire::{check_depth, tag, Reader, Writer};
use super::{
    CodecError, CodecLimits, Field, Fingerprint, Shape, ShapeDecoder, ShapeEncoder,
    StructuralCodec, Value,
};

/// Shape-positional binary codec over any serde type
#[derive(Debug, Clone, Default)]
pub struct BinaryCodec {
    limits: CodecLimits,
}

impl BinaryCodec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limits(limits: CodecLimits) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> &CodecLimits {
        &self.limits
    }

    /// Decodes a fingerprint produced by this codec back into its shape.
    pub fn describe(&self, fingerprint: &Fingerprint) -> Result<Shape, CodecError> {
        let mut input = fingerprint.as_bytes();
        let value = Reader::new(&mut input, self.limits).read_value(0)?;
        from_value(value)
    }

    /// Fingerprint of an already traced shape.
    pub fn fingerprint_of(&self, shape: &Shape) -> Result<Fingerprint, CodecError> {
        let value = to_value(shape)?;
        let mut writer = Writer::new();
        writer.write_value(&value, 0, &self.limits)?;
        Ok(Fingerprint::from_bytes(writer.into_bytes()))
    }
}

impl StructuralCodec for BinaryCodec {
    type Encoder = BinaryEncoder;
    type Decoder = BinaryDecoder;

    fn fingerprint<T: Serialize + Default>(&self) -> Result<Fingerprint, CodecError> {
        let shape = trace(&T::default())?;
        self.fingerprint_of(&shape)
    }

    fn encoder(&self, shape: &Fingerprint) -> Result<BinaryEncoder, CodecError> {
        Ok(BinaryEncoder {
            shape: self.describe(shape)?,
            limits: self.limits,
            scratch: Vec::new(),
        })
    }

    fn decoder(&self, shape: &Fingerprint) -> Result<BinaryDecoder, CodecError> {
        Ok(BinaryDecoder {
            shape: self.describe(shape)?,
            limits: self.limits,
        })
    }

    fn write_document<T: Serialize>(&self, out: &mut dyn Write, doc: &T) -> Result<(), CodecError> {
        let value = to_value(doc)?;
        let mut writer = Writer::new();
        writer.write_value(&value, 0, &self.limits)?;
        out.write_all(writer.as_bytes())?;
        Ok(())
    }

    fn read_document<T: DeserializeOwned>(&self, input: &mut dyn Read) -> Result<T, CodecError> {
        let value = Reader::new(input, self.limits).read_value(0)?;
        from_value(value)
    }
}

/// Encoder bound to one shape; reuses its scratch buffer between calls
#[derive(Debug)]
pub struct BinaryEncoder {
    shape: Shape,
    limits: CodecLimits,
    scratch: Vec<u8>,
}

impl BinaryEncoder {
    pub fn shape(&self) -> &Shape {
        &self.shape
    }
}

impl ShapeEncoder for BinaryEncoder {
    fn encode<T: Serialize + ?Sized>(
        &mut self,
        out: &mut dyn Write,
        value: &T,
    ) -> Result<(), CodecError> {
        let value = to_value(value)?;
        let mut writer = Writer::from_vec(std::mem::take(&mut self.scratch));
        let result = write_shaped(&mut writer, &self.shape, &value, 0, &self.limits)
            .and_then(|()| out.write_all(writer.as_bytes()).map_err(CodecError::from));
        self.scratch = writer.into_bytes();
        result
    }
}

/// Decoder bound to one (possibly historical) shape
#[derive(Debug)]
pub struct BinaryDecoder {
    shape: Shape,
    limits: CodecLimits,
}

impl BinaryDecoder {
    pub fn shape(&self) -> &Shape {
        &self.shape
    }
}

impl ShapeDecoder for BinaryDecoder {
    fn decode<T: DeserializeOwned>(&mut self, input: &mut dyn Read) -> Result<T, CodecError> {
        let mut reader = Reader::new(input, self.limits);
        let value = read_shaped(&mut reader, &self.shape, 0)?
            .ok_or(CodecError::InvalidTag { tag: tag::ABSENT })?;
        from_value(value)
    }
}

fn write_shaped(
    writer: &mut Writer,
    shape: &Shape,
    value: &Value,
    depth: usize,
    limits: &CodecLimits,
) -> Result<(), CodecError> {
    match (shape, value) {
        (Shape::Struct(fields), Value::Struct(members)) if fits_fields(fields, members) => {
            check_depth(depth, limits)?;
            writer.write_byte(tag::SHAPED);
            for field in fields {
                match members.iter().find(|(name, _)| *name == field.name) {
                    Some((_, item)) => write_shaped(writer, &field.shape, item, depth + 1, limits)?,
                    None => writer.write_byte(tag::ABSENT),
                }
            }
            Ok(())
        }
        (Shape::Tuple(items), Value::Seq(values)) if items.len() == values.len() => {
            check_depth(depth, limits)?;
            writer.write_byte(tag::SHAPED);
            for (item_shape, item) in items.iter().zip(values) {
                write_shaped(writer, item_shape, item, depth + 1, limits)?;
            }
            Ok(())
        }
        _ => writer.write_value(value, depth, limits),
    }
}

/// True when every member names a distinct field of the shape.
fn fits_fields(fields: &[Field], members: &[(String, Value)]) -> bool {
    members.iter().enumerate().all(|(i, (name, _))| {
        fields.iter().any(|f| f.name == *name)
            && !members[..i].iter().any(|(earlier, _)| earlier == name)
    })
}

/// Reads one value at a shaped position. `None` means the field was absent.
fn read_shaped(
    reader: &mut Reader<'_>,
    shape: &Shape,
    depth: usize,
) -> Result<Option<Value>, CodecError> {
    let tag = reader.read_byte("value tag")?;
    if tag != tag::SHAPED {
        if tag == tag::ABSENT {
            return Ok(None);
        }
        return reader.read_tagged(tag, depth).map(Some);
    }
    check_depth(depth, reader.limits())?;
    match shape {
        Shape::Struct(fields) => {
            let mut members = Vec::with_capacity(fields.len());
            for field in fields {
                if let Some(item) = read_shaped(reader, &field.shape, depth + 1)? {
                    members.push((field.name.clone(), item));
                }
            }
            Ok(Some(Value::Struct(members)))
        }
        Shape::Tuple(items) => {
            let mut values = Vec::with_capacity(items.len());
            for item_shape in items {
                let item = read_shaped(reader, item_shape, depth + 1)?
                    .ok_or(CodecError::InvalidTag { tag: tag::ABSENT })?;
                values.push(item);
            }
            Ok(Some(Value::Seq(values)))
        }
        _ => Err(CodecError::InvalidTag { tag: tag::SHAPED }),
    }
}
