//! Shape tracing.
//!
//! [`trace`] serializes a value through a recording [`Serializer`] that keeps
//! the layout and throws the data away. Struct field names and order come
//! straight from serde, so the traced shape is exactly what the value tree
//! produced by [`to_value`](super::value::to_value) will look like.

use serde::ser::{self, Serialize, Serializer};

use super::{CodecError, Field, Shape};

/// Records the shape of `value`.
pub fn trace<T: Serialize + ?Sized>(value: &T) -> Result<Shape, CodecError> {
    value.serialize(Tracer)
}

struct Tracer;

impl Serializer for Tracer {
    type Ok = Shape;
    type Error = CodecError;
    type SerializeSeq = Opaque;
    type SerializeTuple = TupleTracer;
    type SerializeTupleStruct = TupleTracer;
    type SerializeTupleVariant = Opaque;
    type SerializeMap = Opaque;
    type SerializeStruct = StructTracer;
    type SerializeStructVariant = Opaque;

    fn serialize_bool(self, _v: bool) -> Result<Shape, CodecError> {
        Ok(Shape::Bool)
    }

    fn serialize_i8(self, _v: i8) -> Result<Shape, CodecError> {
        Ok(Shape::Int)
    }

    fn serialize_i16(self, _v: i16) -> Result<Shape, CodecError> {
        Ok(Shape::Int)
    }

    fn serialize_i32(self, _v: i32) -> Result<Shape, CodecError> {
        Ok(Shape::Int)
    }

    fn serialize_i64(self, _v: i64) -> Result<Shape, CodecError> {
        Ok(Shape::Int)
    }

    fn serialize_i128(self, _v: i128) -> Result<Shape, CodecError> {
        Ok(Shape::Int)
    }

    fn serialize_u8(self, _v: u8) -> Result<Shape, CodecError> {
        Ok(Shape::UInt)
    }

    fn serialize_u16(self, _v: u16) -> Result<Shape, CodecError> {
        Ok(Shape::UInt)
    }

    fn serialize_u32(self, _v: u32) -> Result<Shape, CodecError> {
        Ok(Shape::UInt)
    }

    fn serialize_u64(self, _v: u64) -> Result<Shape, CodecError> {
        Ok(Shape::UInt)
    }

    fn serialize_u128(self, _v: u128) -> Result<Shape, CodecError> {
        Ok(Shape::UInt)
    }

    fn serialize_f32(self, _v: f32) -> Result<Shape, CodecError> {
        Ok(Shape::Float)
    }

    fn serialize_f64(self, _v: f64) -> Result<Shape, CodecError> {
        Ok(Shape::Float)
    }

    fn serialize_char(self, _v: char) -> Result<Shape, CodecError> {
        Ok(Shape::Char)
    }

    fn serialize_str(self, _v: &str) -> Result<Shape, CodecError> {
        Ok(Shape::Str)
    }

    fn serialize_bytes(self, _v: &[u8]) -> Result<Shape, CodecError> {
        Ok(Shape::Bytes)
    }

    fn serialize_none(self) -> Result<Shape, CodecError> {
        Ok(Shape::Option)
    }

    fn serialize_some<T: ?Sized + Serialize>(self, _value: &T) -> Result<Shape, CodecError> {
        Ok(Shape::Option)
    }

    fn serialize_unit(self) -> Result<Shape, CodecError> {
        Ok(Shape::Unit)
    }

    fn serialize_unit_struct(self, _name: &'static str) -> Result<Shape, CodecError> {
        Ok(Shape::Unit)
    }

    fn serialize_unit_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
    ) -> Result<Shape, CodecError> {
        Ok(Shape::Enum)
    }

    // Newtypes are transparent in the value tree, so they are here too.
    fn serialize_newtype_struct<T: ?Sized + Serialize>(
        self,
        _name: &'static str,
        value: &T,
    ) -> Result<Shape, CodecError> {
        value.serialize(self)
    }

    fn serialize_newtype_variant<T: ?Sized + Serialize>(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        _value: &T,
    ) -> Result<Shape, CodecError> {
        Ok(Shape::Enum)
    }

    fn serialize_seq(self, _len: Option<usize>) -> Result<Opaque, CodecError> {
        Ok(Opaque(Shape::Seq))
    }

    fn serialize_tuple(self, len: usize) -> Result<TupleTracer, CodecError> {
        Ok(TupleTracer(Vec::with_capacity(len)))
    }

    fn serialize_tuple_struct(
        self,
        _name: &'static str,
        len: usize,
    ) -> Result<TupleTracer, CodecError> {
        Ok(TupleTracer(Vec::with_capacity(len)))
    }

    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> Result<Opaque, CodecError> {
        Ok(Opaque(Shape::Enum))
    }

    fn serialize_map(self, _len: Option<usize>) -> Result<Opaque, CodecError> {
        Ok(Opaque(Shape::Map))
    }

    fn serialize_struct(self, _name: &'static str, len: usize) -> Result<StructTracer, CodecError> {
        Ok(StructTracer(Vec::with_capacity(len)))
    }

    fn serialize_struct_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> Result<Opaque, CodecError> {
        Ok(Opaque(Shape::Enum))
    }
}

/// Compound whose contents are written self-describing, so only its kind matters
struct Opaque(Shape);

impl ser::SerializeSeq for Opaque {
    type Ok = Shape;
    type Error = CodecError;

    fn serialize_element<T: ?Sized + Serialize>(&mut self, _value: &T) -> Result<(), CodecError> {
        Ok(())
    }

    fn end(self) -> Result<Shape, CodecError> {
        Ok(self.0)
    }
}

impl ser::SerializeTupleVariant for Opaque {
    type Ok = Shape;
    type Error = CodecError;

    fn serialize_field<T: ?Sized + Serialize>(&mut self, _value: &T) -> Result<(), CodecError> {
        Ok(())
    }

    fn end(self) -> Result<Shape, CodecError> {
        Ok(self.0)
    }
}

impl ser::SerializeMap for Opaque {
    type Ok = Shape;
    type Error = CodecError;

    fn serialize_key<T: ?Sized + Serialize>(&mut self, _key: &T) -> Result<(), CodecError> {
        Ok(())
    }

    fn serialize_value<T: ?Sized + Serialize>(&mut self, _value: &T) -> Result<(), CodecError> {
        Ok(())
    }

    fn end(self) -> Result<Shape, CodecError> {
        Ok(self.0)
    }
}

impl ser::SerializeStructVariant for Opaque {
    type Ok = Shape;
    type Error = CodecError;

    fn serialize_field<T: ?Sized + Serialize>(
        &mut self,
        _key: &'static str,
        _value: &T,
    ) -> Result<(), CodecError> {
        Ok(())
    }

    fn end(self) -> Result<Shape, CodecError> {
        Ok(self.0)
    }
}

struct TupleTracer(Vec<Shape>);

impl ser::SerializeTuple for TupleTracer {
    type Ok = Shape;
    type Error = CodecError;

    fn serialize_element<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), CodecError> {
        self.0.push(value.serialize(Tracer)?);
        Ok(())
    }

    fn end(self) -> Result<Shape, CodecError> {
        Ok(Shape::Tuple(self.0))
    }
}

impl ser::SerializeTupleStruct for TupleTracer {
    type Ok = Shape;
    type Error = CodecError;

    fn serialize_field<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), CodecError> {
        self.0.push(value.serialize(Tracer)?);
        Ok(())
    }

    fn end(self) -> Result<Shape, CodecError> {
        Ok(Shape::Tuple(self.0))
    }
}

struct StructTracer(Vec<Field>);

impl ser::SerializeStruct for StructTracer {
    type Ok = Shape;
    type Error = CodecError;

    fn serialize_field<T: ?Sized + Serialize>(
        &mut self,
        key: &'static str,
        value: &T,
    ) -> Result<(), CodecError> {
        self.0.push(Field {
            name: key.to_owned(),
            shape: value.serialize(Tracer)?,
        });
        Ok(())
    }

    fn skip_field(&mut self, key: &'static str) -> Result<(), CodecError> {
        self.0.push(Field {
            name: key.to_owned(),
            shape: Shape::Skipped,
        });
        Ok(())
    }

    fn end(self) -> Result<Shape, CodecError> {
        Ok(Shape::Struct(self.0))
    }
}
