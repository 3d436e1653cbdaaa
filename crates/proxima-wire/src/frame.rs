//! Complete frame structure for the cluster wire format
//!
//! Frame = Fixed Header + Channel + Payload Length + JSON Payload

use bytes::{Buf, BufMut, Bytes, BytesMut};

use proxima_core::{DistanceEvent, ProximaError, ProximaResult};

use crate::{FixedHeader, FIXED_HEADER_SIZE};

/// Maximum frame size (MTU-friendly)
pub const MAX_FRAME_SIZE: usize = 1400;

/// Payload length prefix size
const PAYLOAD_LEN_SIZE: usize = 2;

/// Minimum frame size (header + empty channel + length prefix)
pub const MIN_FRAME_SIZE: usize = FIXED_HEADER_SIZE + PAYLOAD_LEN_SIZE;

/// One cluster message
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    /// Channel the payload was published on
    pub channel: String,
    /// JSON-encoded distance event
    pub payload: Bytes,
}

impl Frame {
    /// Build a frame carrying `event` on `channel`
    pub fn from_event(channel: &str, event: &DistanceEvent) -> ProximaResult<Self> {
        Ok(Frame {
            channel: channel.to_string(),
            payload: Bytes::from(event.to_json()?),
        })
    }

    /// Decode the payload as a distance event
    pub fn event(&self) -> ProximaResult<DistanceEvent> {
        DistanceEvent::from_json(&self.payload)
    }

    /// Parse a frame from bytes
    pub fn parse(buf: &[u8]) -> ProximaResult<Self> {
        if buf.len() < MIN_FRAME_SIZE {
            return Err(ProximaError::BufferTooShort {
                expected: MIN_FRAME_SIZE,
                actual: buf.len(),
            });
        }

        let header = FixedHeader::parse(buf)?;
        let mut rest = &buf[FIXED_HEADER_SIZE..];

        let channel_len = header.channel_len as usize;
        if rest.len() < channel_len + PAYLOAD_LEN_SIZE {
            return Err(ProximaError::BufferTooShort {
                expected: FIXED_HEADER_SIZE + channel_len + PAYLOAD_LEN_SIZE,
                actual: buf.len(),
            });
        }
        let channel = std::str::from_utf8(&rest[..channel_len])
            .map_err(|_| ProximaError::InvalidWireFormat("Channel is not UTF-8".into()))?
            .to_string();
        rest.advance(channel_len);

        let payload_len = rest.get_u16_le() as usize;
        if rest.len() != payload_len {
            return Err(ProximaError::InvalidWireFormat(format!(
                "Payload length mismatch: header says {}, frame has {}",
                payload_len,
                rest.len()
            )));
        }

        Ok(Frame {
            channel,
            payload: Bytes::copy_from_slice(rest),
        })
    }

    /// Serialize frame to bytes
    pub fn serialize(&self) -> ProximaResult<Bytes> {
        let channel_len = u8::try_from(self.channel.len()).map_err(|_| {
            ProximaError::InvalidWireFormat(format!(
                "Channel name too long: {} bytes",
                self.channel.len()
            ))
        })?;

        let total_size = self.serialized_size();
        if total_size > MAX_FRAME_SIZE {
            return Err(ProximaError::InvalidWireFormat(format!(
                "Frame too large: {} > {}",
                total_size, MAX_FRAME_SIZE
            )));
        }

        let mut buf = BytesMut::with_capacity(total_size);
        FixedHeader::new(channel_len).serialize(&mut buf);
        buf.put_slice(self.channel.as_bytes());
        buf.put_u16_le(self.payload.len() as u16);
        buf.put_slice(&self.payload);

        Ok(buf.freeze())
    }

    pub fn serialized_size(&self) -> usize {
        FIXED_HEADER_SIZE + self.channel.len() + PAYLOAD_LEN_SIZE + self.payload.len()
    }
}
