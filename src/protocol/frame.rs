//! Frame parsing and serialization (RFC 6455 Section 5.2).
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-------+-+-------------+-------------------------------+
//! |F|R|R|R| opcode|M| Payload len |    Extended payload length    |
//! |I|S|S|S|  (4)  |A|     (7)     |            (16/64)            |
//! |N|V|V|V|       |S|             |  (if payload len==126/127)    |
//! +-+-+-+-+-------+-+-------------+-------------------------------+
//! |                 Masking key (if MASK set)                     |
//! +---------------------------------------------------------------+
//! |                         Payload data                          |
//! +---------------------------------------------------------------+
//! ```

use bytes::BufMut;

use crate::error::{Error, Result};
use crate::protocol::OpCode;
use crate::protocol::mask::apply_mask;

/// Maximum payload size for control frames.
pub const MAX_CONTROL_FRAME_PAYLOAD: usize = 125;

/// Decoded fixed part of a frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub fin: bool,
    /// RSV1..RSV3 packed into the low three bits (RSV1 = 0b100).
    pub rsv: u8,
    pub opcode: OpCode,
    pub mask: Option<[u8; 4]>,
    pub payload_len: usize,
    /// Bytes taken by the header including extended length and mask key.
    pub header_len: usize,
}

impl FrameHeader {
    /// Decode the header at the start of `buf`.
    ///
    /// # Errors
    ///
    /// - [`Error::IncompleteFrame`] when `buf` ends inside the header
    /// - [`Error::ReservedOpcode`] / [`Error::InvalidOpcode`]
    /// - [`Error::PayloadTooLargeForPlatform`] for 64-bit lengths over `usize`
    pub fn parse(buf: &[u8]) -> Result<Self> {
        let [b0, b1, rest @ ..] = buf else {
            return Err(Error::IncompleteFrame {
                needed: 2 - buf.len(),
            });
        };

        let (b0, b1) = (*b0, *b1);
        let fin = b0 & 0x80 != 0;
        let rsv = (b0 >> 4) & 0x07;
        let opcode = OpCode::from_u8(b0 & 0x0F)?;
        let masked = b1 & 0x80 != 0;

        let (payload_len, ext_len) = match b1 & 0x7F {
            len @ 0..=125 => (usize::from(len), 0),
            126 => {
                let [hi, lo, ..] = rest else {
                    return Err(Error::IncompleteFrame {
                        needed: 4 - buf.len(),
                    });
                };
                (usize::from(u16::from_be_bytes([*hi, *lo])), 2)
            }
            _ => {
                let Some(ext) = rest.get(..8) else {
                    return Err(Error::IncompleteFrame {
                        needed: 10 - buf.len(),
                    });
                };
                let mut be = [0u8; 8];
                be.copy_from_slice(ext);
                let len = u64::from_be_bytes(be);
                let len = usize::try_from(len).map_err(|_| Error::PayloadTooLargeForPlatform {
                    size: len,
                    max: usize::MAX as u64,
                })?;
                (len, 8)
            }
        };

        let mask_start = 2 + ext_len;
        let header_len = if masked { mask_start + 4 } else { mask_start };
        if buf.len() < header_len {
            return Err(Error::IncompleteFrame {
                needed: header_len - buf.len(),
            });
        }
        let mask = masked.then(|| {
            [
                buf[mask_start],
                buf[mask_start + 1],
                buf[mask_start + 2],
                buf[mask_start + 3],
            ]
        });

        Ok(Self {
            fin,
            rsv,
            opcode,
            mask,
            payload_len,
            header_len,
        })
    }
}

/// A single WebSocket frame with an unmasked payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Final fragment of the message.
    pub fin: bool,
    /// Reserved bits, see [`FrameHeader::rsv`].
    pub rsv: u8,
    pub opcode: OpCode,
    payload: Vec<u8>,
}

impl Frame {
    #[must_use]
    pub fn new(fin: bool, opcode: OpCode, payload: Vec<u8>) -> Self {
        Self {
            fin,
            rsv: 0,
            opcode,
            payload,
        }
    }

    #[must_use]
    pub fn text(data: impl Into<Vec<u8>>) -> Self {
        Self::new(true, OpCode::Text, data.into())
    }

    #[must_use]
    pub fn binary(data: impl Into<Vec<u8>>) -> Self {
        Self::new(true, OpCode::Binary, data.into())
    }

    #[must_use]
    pub fn ping(data: impl Into<Vec<u8>>) -> Self {
        Self::new(true, OpCode::Ping, data.into())
    }

    #[must_use]
    pub fn pong(data: impl Into<Vec<u8>>) -> Self {
        Self::new(true, OpCode::Pong, data.into())
    }

    /// Close frame; `code: None` produces an empty payload.
    #[must_use]
    pub fn close(code: Option<u16>, reason: &str) -> Self {
        let payload = match code {
            Some(code) => {
                let mut data = Vec::with_capacity(2 + reason.len());
                data.extend_from_slice(&code.to_be_bytes());
                data.extend_from_slice(reason.as_bytes());
                data
            }
            None => Vec::new(),
        };
        Self::new(true, OpCode::Close, payload)
    }

    #[inline]
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    #[must_use]
    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }

    /// Parse one frame from the start of `buf`, returning it and the number
    /// of bytes consumed. Masked payloads are unmasked.
    ///
    /// # Errors
    ///
    /// Everything [`FrameHeader::parse`] returns, plus
    /// [`Error::IncompleteFrame`] while the payload is still short.
    pub fn parse(buf: &[u8]) -> Result<(Self, usize)> {
        let header = FrameHeader::parse(buf)?;
        let total = header
            .header_len
            .checked_add(header.payload_len)
            .ok_or(Error::PayloadTooLargeForPlatform {
                size: header.payload_len as u64,
                max: usize::MAX as u64,
            })?;
        if buf.len() < total {
            return Err(Error::IncompleteFrame {
                needed: total - buf.len(),
            });
        }

        let mut payload = buf[header.header_len..total].to_vec();
        if let Some(mask) = header.mask {
            apply_mask(&mut payload, mask);
        }

        Ok((
            Frame {
                fin: header.fin,
                rsv: header.rsv,
                opcode: header.opcode,
                payload,
            },
            total,
        ))
    }

    /// # Errors
    ///
    /// - [`Error::ReservedBitsSet`] when any RSV bit is set
    /// - [`Error::FragmentedControlFrame`] for a control frame with FIN=0
    /// - [`Error::ControlFrameTooLarge`] for control payloads over 125 bytes
    pub fn validate(&self) -> Result<()> {
        if self.rsv != 0 {
            return Err(Error::ReservedBitsSet);
        }
        if self.opcode.is_control() {
            if !self.fin {
                return Err(Error::FragmentedControlFrame);
            }
            if self.payload.len() > MAX_CONTROL_FRAME_PAYLOAD {
                return Err(Error::ControlFrameTooLarge(self.payload.len()));
            }
        }
        Ok(())
    }

    /// Append the wire encoding of this frame to `buf`.
    pub fn write<B: BufMut>(&self, buf: &mut B, mask: Option<[u8; 4]>) {
        let len = self.payload.len();
        let mut b0 = self.opcode.as_u8() | (self.rsv & 0x07) << 4;
        if self.fin {
            b0 |= 0x80;
        }
        buf.put_u8(b0);

        let mask_bit = if mask.is_some() { 0x80 } else { 0 };
        if len <= 125 {
            buf.put_u8(mask_bit | len as u8);
        } else if let Ok(len) = u16::try_from(len) {
            buf.put_u8(mask_bit | 126);
            buf.put_u16(len);
        } else {
            buf.put_u8(mask_bit | 127);
            buf.put_u64(len as u64);
        }

        match mask {
            Some(key) => {
                buf.put_slice(&key);
                let mut masked = self.payload.clone();
                apply_mask(&mut masked, key);
                buf.put_slice(&masked);
            }
            None => buf.put_slice(&self.payload),
        }
    }

    /// Encoded size of this frame.
    #[must_use]
    pub fn wire_size(&self, masked: bool) -> usize {
        let len = self.payload.len();
        let ext = match len {
            0..=125 => 0,
            126..=65535 => 2,
            _ => 8,
        };
        2 + ext + if masked { 4 } else { 0 } + len
    }
}

impl From<crate::message::Message> for Frame {
    fn from(message: crate::message::Message) -> Self {
        use crate::message::Message;
        let opcode = match &message {
            Message::Text(_) => OpCode::Text,
            Message::Binary(_) => OpCode::Binary,
            Message::Ping(_) => OpCode::Ping,
            Message::Pong(_) => OpCode::Pong,
            Message::Close(_) => OpCode::Close,
        };
        Frame::new(true, opcode, message.payload())
    }
}
