//! Schema version numbers and the version tag that prefixes every payload
//!
//! A tag is an unsigned LEB128 varint. Zero is reserved, so a decoded zero is
//! always a framing error rather than a lookup miss.

use std::fmt;
use std::io::{self, Read, Write};
use std::num::NonZeroU64;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Maximum bytes of a 64-bit varint tag.
pub const MAX_TAG_BYTES: usize = 10;

/// A schema version: positive, dense within one entry, assigned in first-seen order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Version(NonZeroU64);

impl Version {
    /// The version given to the first shape of every entry.
    pub const FIRST: Version = Version(NonZeroU64::MIN);

    /// Returns `None` for zero.
    pub fn new(version: u64) -> Option<Self> {
        NonZeroU64::new(version).map(Self)
    }

    /// The version following `count` already-known shapes.
    pub fn after(count: usize) -> Self {
        Self(NonZeroU64::MIN.saturating_add(count as u64))
    }

    pub fn get(self) -> u64 {
        self.0.get()
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Malformed or missing version tag
#[derive(Error, Debug)]
pub enum FramingError {
    #[error("version should not be zero")]
    ZeroVersion,

    #[error("stream ended inside the version tag")]
    Truncated,

    #[error("version tag overflows 64 bits")]
    Overflow,

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Writes `version` as a varint tag and returns the number of bytes written.
pub fn encode_version<W: Write + ?Sized>(out: &mut W, version: u64) -> Result<usize, FramingError> {
    if version == 0 {
        return Err(FramingError::ZeroVersion);
    }
    let mut buf = [0u8; MAX_TAG_BYTES];
    let mut len = 0;
    let mut value = version;
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
    out.write_all(&buf[..len])?;
    Ok(len)
}

/// Reads a varint tag, consuming exactly the tag bytes and nothing after them.
pub fn decode_version<R: Read + ?Sized>(input: &mut R) -> Result<Version, FramingError> {
    let mut result: u64 = 0;
    let mut shift = 0;
    for _ in 0..MAX_TAG_BYTES {
        let mut byte = [0u8; 1];
        input.read_exact(&mut byte).map_err(|e| match e.kind() {
            io::ErrorKind::UnexpectedEof => FramingError::Truncated,
            _ => FramingError::Io(e),
        })?;
        let value = (byte[0] & 0x7F) as u64;
        if shift == 63 && value > 1 {
            return Err(FramingError::Overflow);
        }
        result |= value << shift;
        if byte[0] & 0x80 == 0 {
            return Version::new(result).ok_or(FramingError::ZeroVersion);
        }
        shift += 7;
    }
    Err(FramingError::Overflow)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_small_versions_take_one_byte() {
        let mut buf = Vec::new();
        assert_eq!(encode_version(&mut buf, 1).unwrap(), 1);
        assert_eq!(buf, vec![0x01]);
    }

    #[test]
    fn test_multi_byte_tag() {
        let mut buf = Vec::new();
        encode_version(&mut buf, 300).unwrap();
        assert_eq!(buf, vec![0xAC, 0x02]);
        assert_eq!(decode_version(&mut buf.as_slice()).unwrap().get(), 300);
    }

    #[test]
    fn test_full_range() {
        let mut buf = Vec::new();
        assert_eq!(encode_version(&mut buf, u64::MAX).unwrap(), MAX_TAG_BYTES);
        assert_eq!(decode_version(&mut buf.as_slice()).unwrap().get(), u64::MAX);
    }

    #[test]
    fn test_zero_is_rejected() {
        let mut buf = Vec::new();
        assert!(matches!(encode_version(&mut buf, 0), Err(FramingError::ZeroVersion)));
        assert!(buf.is_empty());
        assert!(matches!(
            decode_version(&mut [0x00u8].as_slice()),
            Err(FramingError::ZeroVersion)
        ));
    }

    #[test]
    fn test_truncated_tag() {
        assert!(matches!(decode_version(&mut [0u8; 0].as_slice()), Err(FramingError::Truncated)));
        assert!(matches!(
            decode_version(&mut [0x80u8].as_slice()),
            Err(FramingError::Truncated)
        ));
    }

    #[test]
    fn test_overflow() {
        let bytes = [0xFFu8; 11];
        assert!(matches!(decode_version(&mut bytes.as_slice()), Err(FramingError::Overflow)));
    }

    #[test]
    fn test_payload_bytes_are_left_unread() {
        let data = [0x02u8, 0xAA, 0xBB];
        let mut input = &data[..];
        assert_eq!(decode_version(&mut input).unwrap(), Version::new(2).unwrap());
        assert_eq!(input, &[0xAA, 0xBB]);
    }

    #[test]
    fn test_version_after_count() {
        assert_eq!(Version::after(0), Version::FIRST);
        assert_eq!(Version::after(4).get(), 5);
    }
}
