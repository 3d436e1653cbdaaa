//! Fixed header for the cluster wire format
//!
//! Fixed header is 6 bytes:
//! - Bytes 0-3: Magic `PXMA`
//! - Byte 4: Wire version
//! - Byte 5: Channel name length

use bytes::{Buf, BufMut};

use proxima_core::{ProximaError, ProximaResult};

/// Fixed header size in bytes
pub const FIXED_HEADER_SIZE: usize = 6;

/// Frame magic
pub const WIRE_MAGIC: [u8; 4] = *b"PXMA";

/// Current wire protocol version
pub const WIRE_VERSION: u8 = 1;

/// Fixed header structure
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FixedHeader {
    /// Wire protocol version
    pub version: u8,
    /// Length of the channel name that follows the header
    pub channel_len: u8,
}

impl FixedHeader {
    pub fn new(channel_len: u8) -> Self {
        FixedHeader {
            version: WIRE_VERSION,
            channel_len,
        }
    }

    /// Parse the fixed header from the front of `buf`
    pub fn parse(mut buf: &[u8]) -> ProximaResult<Self> {
        if buf.len() < FIXED_HEADER_SIZE {
            return Err(ProximaError::BufferTooShort {
                expected: FIXED_HEADER_SIZE,
                actual: buf.len(),
            });
        }

        let mut magic = [0u8; 4];
        buf.copy_to_slice(&mut magic);
        if magic != WIRE_MAGIC {
            return Err(ProximaError::InvalidWireFormat(format!(
                "Bad magic: {:02x?}",
                magic
            )));
        }

        let version = buf.get_u8();
        if version != WIRE_VERSION {
            return Err(ProximaError::UnsupportedVersion(version));
        }

        Ok(FixedHeader {
            version,
            channel_len: buf.get_u8(),
        })
    }

    /// Append the header to `buf`
    pub fn serialize(&self, buf: &mut impl BufMut) {
        buf.put_slice(&WIRE_MAGIC);
        buf.put_u8(self.version);
        buf.put_u8(self.channel_len);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_layout() {
        let mut buf = Vec::new();
        FixedHeader::new(9).serialize(&mut buf);
        assert_eq!(buf, b"PXMA\x01\x09");
        assert_eq!(FixedHeader::parse(&buf).unwrap().channel_len, 9);
    }

    #[test]
    fn test_header_rejects_bad_magic() {
        let err = FixedHeader::parse(b"ELRA\x01\x00").unwrap_err();
        assert!(matches!(err, ProximaError::InvalidWireFormat(_)));
    }

    #[test]
    fn test_header_rejects_future_version() {
        let err = FixedHeader::parse(b"PXMA\x07\x00").unwrap_err();
        assert!(matches!(err, ProximaError::UnsupportedVersion(7)));
    }

    #[test]
    fn test_header_too_short() {
        let err = FixedHeader::parse(b"PXM").unwrap_err();
        assert!(matches!(
            err,
            ProximaError::BufferTooShort {
                expected: FIXED_HEADER_SIZE,
                actual: 3
            }
        ));
    }
}
