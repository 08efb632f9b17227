//! General frame format and the protocol initiation header.
//!
//! ```text
//! +------+---------+---------+-------------+-----------+
//! | type | channel |  size   |   payload   | frame-end |
//! |  u8  | u16 BE  | u32 BE  | size bytes  |   0xCE    |
//! +------+---------+---------+-------------+-----------+
//! ```
//!
//! Frames arrive fully reassembled at the method layer; the streaming decoder
//! here is what the transport uses to get them there.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;

use crate::version::{ProtocolVersion, V0_8, V0_9, V0_91};

/// Frame header size: type, channel, size.
pub const FRAME_HEADER_SIZE: usize = 7;

/// Frame header plus the end marker.
pub const FRAME_OVERHEAD: usize = FRAME_HEADER_SIZE + 1;

/// Terminates every frame.
pub const FRAME_END: u8 = 0xCE;

/// Smallest frame size a peer may negotiate.
pub const FRAME_MIN_SIZE: u32 = 4096;

/// Size of the protocol initiation header.
pub const PROTOCOL_HEADER_SIZE: usize = 8;

/// Transport framing errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    /// Declared payload exceeds the negotiated maximum.
    #[error("Frame size {size} exceeds maximum {max}")]
    FrameTooLarge { size: usize, max: usize },

    /// The byte after the payload was not 0xCE.
    #[error("Bad frame end marker {0:#04x}")]
    BadFrameEnd(u8),

    /// Unknown frame type octet.
    #[error("Unknown frame type {0}")]
    UnknownFrameType(u8),

    /// Content header payload too short.
    #[error("Content header needs at least {needed} bytes, got {actual}")]
    TruncatedContentHeader { needed: usize, actual: usize },

    /// Protocol header did not start with "AMQP".
    #[error("Invalid protocol header {0:?}")]
    InvalidProtocolHeader([u8; PROTOCOL_HEADER_SIZE]),

    /// Well-formed protocol header naming a version without a method table.
    #[error("Unsupported protocol header {0:?}")]
    UnsupportedProtocolHeader([u8; PROTOCOL_HEADER_SIZE]),
}

/// Frame type identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FrameType {
    Method = 1,
    ContentHeader = 2,
    ContentBody = 3,
    /// 0-8 heartbeat value; accepted on input only.
    OobMethod = 4,
    Heartbeat = 8,
}

impl From<FrameType> for u8 {
    fn from(ft: FrameType) -> u8 {
        ft as u8
    }
}

impl TryFrom<u8> for FrameType {
    type Error = FrameError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(FrameType::Method),
            2 => Ok(FrameType::ContentHeader),
            3 => Ok(FrameType::ContentBody),
            4 => Ok(FrameType::OobMethod),
            8 => Ok(FrameType::Heartbeat),
            other => Err(FrameError::UnknownFrameType(other)),
        }
    }
}

/// A reassembled frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub frame_type: FrameType,
    pub channel: u16,
    pub payload: Bytes,
}

impl Frame {
    /// Method frame from an encoded method (header plus arguments).
    #[must_use]
    pub fn method(channel: u16, payload: Bytes) -> Self {
        Self {
            frame_type: FrameType::Method,
            channel,
            payload,
        }
    }

    /// Content header frame.
    #[must_use]
    pub fn content_header(channel: u16, header: &ContentHeader) -> Self {
        Self {
            frame_type: FrameType::ContentHeader,
            channel,
            payload: header.encode(),
        }
    }

    /// Content body frame.
    #[must_use]
    pub fn content_body(channel: u16, payload: Bytes) -> Self {
        Self {
            frame_type: FrameType::ContentBody,
            channel,
            payload,
        }
    }

    /// Heartbeat frame, always on channel 0.
    #[must_use]
    pub fn heartbeat() -> Self {
        Self {
            frame_type: FrameType::Heartbeat,
            channel: 0,
            payload: Bytes::new(),
        }
    }

    /// Whether this frame is a heartbeat in any supported version.
    #[must_use]
    pub fn is_heartbeat(&self) -> bool {
        matches!(self.frame_type, FrameType::Heartbeat | FrameType::OobMethod)
    }

    /// Size on the wire.
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        FRAME_OVERHEAD + self.payload.len()
    }

    /// Append the encoded frame to `buf`.
    pub fn encode_into(&self, buf: &mut BytesMut) {
        buf.reserve(self.encoded_len());
        buf.put_u8(self.frame_type.into());
        buf.put_u16(self.channel);
        buf.put_u32(self.payload.len() as u32);
        buf.extend_from_slice(&self.payload);
        buf.put_u8(FRAME_END);
    }

    /// Encode the frame to bytes.
    #[must_use]
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        self.encode_into(&mut buf);
        buf.freeze()
    }

    /// Try to decode a frame from a buffer, advancing it if successful.
    ///
    /// Returns `Ok(Some(frame))` if a complete frame was decoded,
    /// `Ok(None)` if more data is needed, or `Err` on a framing error.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame is too large, has an unknown type, or
    /// lacks the end marker.
    pub fn decode_from(buf: &mut BytesMut, max_frame_size: usize) -> Result<Option<Frame>, FrameError> {
        if buf.len() < FRAME_HEADER_SIZE {
            return Ok(None);
        }

        let frame_type = FrameType::try_from(buf[0])?;
        let channel = u16::from_be_bytes([buf[1], buf[2]]);
        let size = u32::from_be_bytes([buf[3], buf[4], buf[5], buf[6]]) as usize;

        if size + FRAME_OVERHEAD > max_frame_size {
            return Err(FrameError::FrameTooLarge {
                size: size + FRAME_OVERHEAD,
                max: max_frame_size,
            });
        }

        let total_size = FRAME_OVERHEAD + size;
        if buf.len() < total_size {
            return Ok(None);
        }

        let end = buf[total_size - 1];
        if end != FRAME_END {
            return Err(FrameError::BadFrameEnd(end));
        }

        buf.advance(FRAME_HEADER_SIZE);
        let payload = buf.split_to(size).freeze();
        buf.advance(1);

        Ok(Some(Frame {
            frame_type,
            channel,
            payload,
        }))
    }
}

/// Content header frame payload.
///
/// Property flags and the property list stay opaque; the broker core passes
/// them through unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentHeader {
    pub class_id: u16,
    pub weight: u16,
    pub body_size: u64,
    pub properties: Bytes,
}

impl ContentHeader {
    const FIXED_SIZE: usize = 12;

    /// Header with no properties set.
    #[must_use]
    pub fn new(class_id: u16, body_size: u64) -> Self {
        Self {
            class_id,
            weight: 0,
            body_size,
            properties: Bytes::from_static(&[0, 0]),
        }
    }

    #[must_use]
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(Self::FIXED_SIZE + self.properties.len());
        buf.put_u16(self.class_id);
        buf.put_u16(self.weight);
        buf.put_u64(self.body_size);
        buf.extend_from_slice(&self.properties);
        buf.freeze()
    }

    /// # Errors
    ///
    /// Returns an error if the payload is shorter than the fixed fields.
    pub fn decode(mut payload: Bytes) -> Result<Self, FrameError> {
        if payload.len() < Self::FIXED_SIZE {
            return Err(FrameError::TruncatedContentHeader {
                needed: Self::FIXED_SIZE,
                actual: payload.len(),
            });
        }
        let class_id = payload.get_u16();
        let weight = payload.get_u16();
        let body_size = payload.get_u64();
        Ok(Self {
            class_id,
            weight,
            body_size,
            properties: payload,
        })
    }
}

/// The 8-byte header a client sends before any frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtocolInitiation {
    pub header: [u8; PROTOCOL_HEADER_SIZE],
}

impl ProtocolInitiation {
    /// The header a peer of `version` sends.
    #[must_use]
    pub fn for_version(version: ProtocolVersion) -> Self {
        let header = if version == V0_91 {
            *b"AMQP\x00\x00\x09\x01"
        } else {
            [b'A', b'M', b'Q', b'P', 1, 1, version.major, version.minor]
        };
        Self { header }
    }

    #[must_use]
    pub fn encode(&self) -> [u8; PROTOCOL_HEADER_SIZE] {
        self.header
    }

    /// Map a received header to a supported version.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::InvalidProtocolHeader`] if the header is not an
    /// AMQP header, or [`FrameError::UnsupportedProtocolHeader`] if it names a
    /// version without a method table.
    pub fn decode(header: [u8; PROTOCOL_HEADER_SIZE]) -> Result<ProtocolVersion, FrameError> {
        if &header[..4] != b"AMQP" {
            return Err(FrameError::InvalidProtocolHeader(header));
        }
        match &header[4..] {
            [1, 1, 8, 0] => Ok(V0_8),
            [1, 1, 0, 9] => Ok(V0_9),
            [0, 0, 9, 1] => Ok(V0_91),
            _ => Err(FrameError::UnsupportedProtocolHeader(header)),
        }
    }
}
