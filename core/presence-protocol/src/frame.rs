//! Binary framing: fixed 8-byte header followed by a JSON body.

use crate::{ProtocolError, MAX_MESSAGE_SIZE};

pub const HEADER_LEN: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum Opcode {
    Handshake = 0,
    Frame = 1,
    Close = 2,
}

impl Opcode {
    pub fn as_u32(self) -> u32 {
        self as u32
    }
}

impl TryFrom<u32> for Opcode {
    type Error = ProtocolError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Opcode::Handshake),
            1 => Ok(Opcode::Frame),
            2 => Ok(Opcode::Close),
            other => Err(ProtocolError::UnknownOpcode(other)),
        }
    }
}

/// Raw header as read off the wire. The opcode is kept as a plain integer so
/// that an unexpected value from the peer can still be logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub opcode: u32,
    pub length: u32,
}

impl FrameHeader {
    pub fn encode(&self) -> [u8; HEADER_LEN] {
        let mut bytes = [0u8; HEADER_LEN];
        bytes[..4].copy_from_slice(&self.opcode.to_le_bytes());
        bytes[4..].copy_from_slice(&self.length.to_le_bytes());
        bytes
    }

    pub fn decode(bytes: &[u8; HEADER_LEN]) -> Self {
        let opcode = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        let length = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        Self { opcode, length }
    }

    /// Body length as declared by the peer, rejected when over the limit so the
    /// caller never allocates or reads an oversized body.
    pub fn checked_length(&self) -> Result<usize, ProtocolError> {
        let len = self.length as usize;
        if len > MAX_MESSAGE_SIZE {
            return Err(ProtocolError::PayloadTooLarge {
                len,
                max: MAX_MESSAGE_SIZE,
            });
        }
        Ok(len)
    }
}

/// An outbound message whose body is known to fit [`MAX_MESSAGE_SIZE`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    opcode: Opcode,
    body: String,
    nonce: Option<String>,
}

impl Frame {
    pub fn new(opcode: Opcode, body: String) -> Result<Self, ProtocolError> {
        if body.len() > MAX_MESSAGE_SIZE {
            return Err(ProtocolError::PayloadTooLarge {
                len: body.len(),
                max: MAX_MESSAGE_SIZE,
            });
        }
        Ok(Self {
            opcode,
            body,
            nonce: None,
        })
    }

    pub(crate) fn with_nonce(mut self, nonce: impl Into<String>) -> Self {
        self.nonce = Some(nonce.into());
        self
    }

    pub fn opcode(&self) -> Opcode {
        self.opcode
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    /// Nonce carried in the body, if any. Informational only.
    pub fn nonce(&self) -> Option<&str> {
        self.nonce.as_deref()
    }

    pub fn header(&self) -> FrameHeader {
        FrameHeader {
            opcode: self.opcode.as_u32(),
            length: self.body.len() as u32,
        }
    }

    /// Header and body as one contiguous buffer.
    pub fn encode(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(HEADER_LEN + self.body.len());
        bytes.extend_from_slice(&self.header().encode());
        bytes.extend_from_slice(self.body.as_bytes());
        bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_layout_is_little_endian_opcode_then_length() {
        let header = FrameHeader {
            opcode: 1,
            length: 0x0102,
        };
        assert_eq!(header.encode(), [1, 0, 0, 0, 0x02, 0x01, 0, 0]);
        assert_eq!(FrameHeader::decode(&header.encode()), header);
    }

    #[test]
    fn checked_length_rejects_oversized_bodies() {
        let header = FrameHeader {
            opcode: 1,
            length: (MAX_MESSAGE_SIZE + 1) as u32,
        };
        assert!(matches!(
            header.checked_length(),
            Err(ProtocolError::PayloadTooLarge { .. })
        ));

        let header = FrameHeader {
            opcode: 1,
            length: MAX_MESSAGE_SIZE as u32,
        };
        assert_eq!(header.checked_length().unwrap(), MAX_MESSAGE_SIZE);
    }

    #[test]
    fn frame_rejects_body_over_limit() {
        let body = "x".repeat(MAX_MESSAGE_SIZE + 1);
        assert!(Frame::new(Opcode::Frame, body).is_err());
    }

    #[test]
    fn encode_prefixes_header() {
        let frame = Frame::new(Opcode::Handshake, "{}".to_string()).unwrap();
        assert_eq!(frame.encode(), vec![0, 0, 0, 0, 2, 0, 0, 0, b'{', b'}']);
    }

    #[test]
    fn opcode_conversion() {
        assert_eq!(Opcode::try_from(2).unwrap(), Opcode::Close);
        assert!(matches!(
            Opcode::try_from(7),
            Err(ProtocolError::UnknownOpcode(7))
        ));
    }
}
