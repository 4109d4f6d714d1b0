//! Wire primitives: varints, strings and the self-describing value format.
//!
//! A self-describing [`Value`] is one tag byte followed by its data:
//!
//! ```text
//! 0x00 unit      0x01 false     0x02 true
//! 0x03 uint      varint
//! 0x04 int       zigzag varint
//! 0x05 float     f64 little-endian, any bit pattern
//! 0x06 string    varint length + UTF-8
//! 0x07 seq       varint count + values
//! 0x08 map       varint count + (key value, value) pairs
//! 0x09 bytes     varint length + raw bytes
//! 0x0a none
//! 0x0b some      value
//! 0x0c struct    varint count + (string name, value) pairs
//! 0x0d variant   string name + value
//! ```
//!
//! Shaped payloads add two tags of their own, see [`tag::SHAPED`] and
//! [`tag::ABSENT`].

use std::io::{self, Read};

use super::{CodecError, CodecLimits, Value};

/// Maximum bytes of a 64-bit varint.
pub const MAX_VARINT_BYTES: usize = 10;

pub mod tag {
    pub const UNIT: u8 = 0x00;
    pub const FALSE: u8 = 0x01;
    pub const TRUE: u8 = 0x02;
    pub const UINT: u8 = 0x03;
    pub const INT: u8 = 0x04;
    pub const FLOAT: u8 = 0x05;
    pub const STRING: u8 = 0x06;
    pub const SEQ: u8 = 0x07;
    pub const MAP: u8 = 0x08;
    pub const BYTES: u8 = 0x09;
    pub const NONE: u8 = 0x0A;
    pub const SOME: u8 = 0x0B;
    pub const STRUCT: u8 = 0x0C;
    pub const VARIANT: u8 = 0x0D;
    /// A struct or tuple laid out positionally by its bound shape
    pub const SHAPED: u8 = 0x0E;
    /// A struct field the value skipped while serializing
    pub const ABSENT: u8 = 0x0F;
}

// =============================================================================
// DECODING
// =============================================================================

/// Reader for decoding from a byte stream.
///
/// Reads byte-at-a-time where it must, so it never pulls bytes past the end
/// of the value it is decoding.
pub struct Reader<'a> {
    input: &'a mut dyn Read,
    limits: CodecLimits,
}

impl<'a> Reader<'a> {
    pub fn new(input: &'a mut dyn Read, limits: CodecLimits) -> Self {
        Self { input, limits }
    }

    pub fn limits(&self) -> &CodecLimits {
        &self.limits
    }

    /// Reads a single byte.
    pub fn read_byte(&mut self, context: &'static str) -> Result<u8, CodecError> {
        let mut byte = [0u8; 1];
        self.fill(&mut byte, context)?;
        Ok(byte[0])
    }

    /// Reads exactly n bytes. Allocation grows with the bytes actually read,
    /// so a lying length prefix costs nothing up front.
    pub fn read_bytes(&mut self, n: usize, context: &'static str) -> Result<Vec<u8>, CodecError> {
        let mut bytes = Vec::with_capacity(n.min(4096));
        (&mut self.input).take(n as u64).read_to_end(&mut bytes)?;
        if bytes.len() != n {
            return Err(CodecError::UnexpectedEof { context });
        }
        Ok(bytes)
    }

    fn fill(&mut self, buf: &mut [u8], context: &'static str) -> Result<(), CodecError> {
        self.input.read_exact(buf).map_err(|e| match e.kind() {
            io::ErrorKind::UnexpectedEof => CodecError::UnexpectedEof { context },
            _ => CodecError::Io(e),
        })
    }

    /// Reads an unsigned varint (LEB128).
    pub fn read_varint(&mut self, context: &'static str) -> Result<u64, CodecError> {
        let mut result: u64 = 0;
        let mut shift = 0;

        for _ in 0..MAX_VARINT_BYTES {
            let byte = self.read_byte(context)?;
            let value = (byte & 0x7F) as u64;

            if shift == 63 && value > 1 {
                return Err(CodecError::VarintOverflow);
            }

            result |= value << shift;

            if byte & 0x80 == 0 {
                return Ok(result);
            }
            shift += 7;
        }

        Err(CodecError::VarintTooLong)
    }

    /// Reads a signed varint (zigzag encoded).
    pub fn read_signed_varint(&mut self, context: &'static str) -> Result<i64, CodecError> {
        let unsigned = self.read_varint(context)?;
        Ok(zigzag_decode(unsigned))
    }

    /// Reads a length or count prefix and checks it against the limits.
    pub fn read_len(&mut self, field: &'static str) -> Result<usize, CodecError> {
        let len = usize::try_from(self.read_varint(field)?).unwrap_or(usize::MAX);
        if len > self.limits.max_len {
            return Err(CodecError::LengthExceedsLimit {
                field,
                len,
                max: self.limits.max_len,
            });
        }
        Ok(len)
    }

    /// Reads a length-prefixed UTF-8 string.
    pub fn read_string(&mut self, field: &'static str) -> Result<String, CodecError> {
        let len = self.read_len(field)?;
        let bytes = self.read_bytes(len, field)?;
        String::from_utf8(bytes).map_err(|_| CodecError::InvalidUtf8 { field })
    }

    /// Reads a little-endian f64.
    pub fn read_f64(&mut self, context: &'static str) -> Result<f64, CodecError> {
        let mut bytes = [0u8; 8];
        self.fill(&mut bytes, context)?;
        Ok(f64::from_le_bytes(bytes))
    }

    /// Reads one self-describing value.
    pub fn read_value(&mut self, depth: usize) -> Result<Value, CodecError> {
        let tag = self.read_byte("value tag")?;
        self.read_tagged(tag, depth)
    }

    /// Reads the data of a self-describing value whose tag was already read.
    pub fn read_tagged(&mut self, tag: u8, depth: usize) -> Result<Value, CodecError> {
        check_depth(depth, &self.limits)?;
        let value = match tag {
            tag::UNIT => Value::Unit,
            tag::FALSE => Value::Bool(false),
            tag::TRUE => Value::Bool(true),
            tag::UINT => Value::UInt(self.read_varint("unsigned integer")?),
            tag::INT => Value::Int(self.read_signed_varint("signed integer")?),
            tag::FLOAT => Value::Float(self.read_f64("float")?),
            tag::STRING => Value::Str(self.read_string("string")?),
            tag::BYTES => {
                let len = self.read_len("bytes")?;
                Value::Bytes(self.read_bytes(len, "bytes")?)
            }
            tag::NONE => Value::Option(None),
            tag::SOME => Value::Option(Some(Box::new(self.read_value(depth + 1)?))),
            tag::SEQ => {
                let count = self.read_len("seq")?;
                let mut items = Vec::with_capacity(count.min(1024));
                for _ in 0..count {
                    items.push(self.read_value(depth + 1)?);
                }
                Value::Seq(items)
            }
            tag::MAP => {
                let count = self.read_len("map")?;
                let mut entries = Vec::with_capacity(count.min(1024));
                for _ in 0..count {
                    let key = self.read_value(depth + 1)?;
                    let value = self.read_value(depth + 1)?;
                    entries.push((key, value));
                }
                Value::Map(entries)
            }
            tag::STRUCT => {
                let count = self.read_len("struct")?;
                let mut fields = Vec::with_capacity(count.min(1024));
                for _ in 0..count {
                    let name = self.read_string("field name")?;
                    let value = self.read_value(depth + 1)?;
                    fields.push((name, value));
                }
                Value::Struct(fields)
            }
            tag::VARIANT => {
                let name = self.read_string("variant name")?;
                Value::Variant(name, Box::new(self.read_value(depth + 1)?))
            }
            other => return Err(CodecError::InvalidTag { tag: other }),
        };
        Ok(value)
    }
}

// =============================================================================
// ENCODING
// =============================================================================

/// Writer for encoding binary data.
#[derive(Debug, Clone, Default)]
pub struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    /// Creates a new writer.
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    /// Reuses an existing allocation; previous contents are discarded.
    pub fn from_vec(mut buf: Vec<u8>) -> Self {
        buf.clear();
        Self { buf }
    }

    /// Returns the written bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    /// Returns a reference to the written bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Writes a single byte.
    #[inline]
    pub fn write_byte(&mut self, byte: u8) {
        self.buf.push(byte);
    }

    /// Writes an unsigned varint (LEB128).
    #[inline]
    pub fn write_varint(&mut self, mut value: u64) {
        let mut buf = [0u8; MAX_VARINT_BYTES];
        let mut len = 0;
        loop {
            let mut byte = (value & 0x7F) as u8;
            value >>= 7;
            if value != 0 {
                byte |= 0x80;
            }
            buf[len] = byte;
            len += 1;
            if value == 0 {
                break;
            }
        }
        self.buf.extend_from_slice(&buf[..len]);
    }

    /// Writes a signed varint (zigzag encoded).
    pub fn write_signed_varint(&mut self, value: i64) {
        self.write_varint(zigzag_encode(value));
    }

    /// Writes a length-prefixed UTF-8 string.
    pub fn write_string(&mut self, s: &str) {
        self.write_varint(s.len() as u64);
        self.buf.extend_from_slice(s.as_bytes());
    }

    /// Writes a little-endian f64.
    pub fn write_f64(&mut self, value: f64) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    /// Writes one self-describing value.
    pub fn write_value(
        &mut self,
        value: &Value,
        depth: usize,
        limits: &CodecLimits,
    ) -> Result<(), CodecError> {
        check_depth(depth, limits)?;
        match value {
            Value::Unit => self.write_byte(tag::UNIT),
            Value::Bool(false) => self.write_byte(tag::FALSE),
            Value::Bool(true) => self.write_byte(tag::TRUE),
            Value::UInt(n) => {
                self.write_byte(tag::UINT);
                self.write_varint(*n);
            }
            Value::Int(n) => {
                self.write_byte(tag::INT);
                self.write_signed_varint(*n);
            }
            Value::Float(f) => {
                self.write_byte(tag::FLOAT);
                self.write_f64(*f);
            }
            Value::Str(s) => {
                self.write_byte(tag::STRING);
                self.write_string(s);
            }
            Value::Bytes(bytes) => {
                self.write_byte(tag::BYTES);
                self.write_varint(bytes.len() as u64);
                self.buf.extend_from_slice(bytes);
            }
            Value::Option(None) => self.write_byte(tag::NONE),
            Value::Option(Some(inner)) => {
                self.write_byte(tag::SOME);
                self.write_value(inner, depth + 1, limits)?;
            }
            Value::Seq(items) => {
                self.write_byte(tag::SEQ);
                self.write_varint(items.len() as u64);
                for item in items {
                    self.write_value(item, depth + 1, limits)?;
                }
            }
            Value::Map(entries) => {
                self.write_byte(tag::MAP);
                self.write_varint(entries.len() as u64);
                for (key, item) in entries {
                    self.write_value(key, depth + 1, limits)?;
                    self.write_value(item, depth + 1, limits)?;
                }
            }
            Value::Struct(fields) => {
                self.write_byte(tag::STRUCT);
                self.write_varint(fields.len() as u64);
                for (name, item) in fields {
                    self.write_string(name);
                    self.write_value(item, depth + 1, limits)?;
                }
            }
            Value::Variant(name, inner) => {
                self.write_byte(tag::VARIANT);
                self.write_string(name);
                self.write_value(inner, depth + 1, limits)?;
            }
        }
        Ok(())
    }
}

pub(crate) fn check_depth(depth: usize, limits: &CodecLimits) -> Result<(), CodecError> {
    if depth > limits.max_depth {
        return Err(CodecError::DepthExceeded {
            max: limits.max_depth,
        });
    }
    Ok(())
}

/// Zigzag encodes a signed integer.
#[inline]
pub fn zigzag_encode(n: i64) -> u64 {
    ((n << 1) ^ (n >> 63)) as u64
}

/// Zigzag decodes an unsigned integer.
#[inline]
pub fn zigzag_decode(n: u64) -> i64 {
    ((n >> 1) as i64) ^ (-((n & 1) as i64))
}
