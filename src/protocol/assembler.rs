//! Reassembly of fragmented messages (RFC 6455 Section 5.4).

use bytes::BytesMut;

use crate::config::Limits;
use crate::error::{Error, Result};
use crate::protocol::{Frame, OpCode};

/// Collects data frames until one arrives with FIN set.
///
/// Control frames may be interleaved with fragments and are ignored here;
/// the connection handles them separately.
#[derive(Debug)]
pub struct MessageAssembler {
    buffer: BytesMut,
    opcode: Option<OpCode>,
    fragments: usize,
    limits: Limits,
}

/// A complete data message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembledMessage {
    /// `Text` or `Binary`.
    pub opcode: OpCode,
    pub payload: Vec<u8>,
}

impl MessageAssembler {
    #[must_use]
    pub fn new(limits: Limits) -> Self {
        Self {
            buffer: BytesMut::new(),
            opcode: None,
            fragments: 0,
            limits,
        }
    }

    /// Feed one frame; returns the message once its final fragment is in.
    ///
    /// # Errors
    ///
    /// - [`Error::ProtocolViolation`] for a stray continuation or a new data
    ///   frame while a message is still open
    /// - [`Error::TooManyFragments`] / [`Error::MessageTooLarge`]
    /// - [`Error::InvalidUtf8`] when a finished text message is not UTF-8
    pub fn push(&mut self, frame: Frame) -> Result<Option<AssembledMessage>> {
        if frame.opcode.is_control() {
            return Ok(None);
        }

        match (frame.opcode, self.opcode) {
            (OpCode::Continuation, None) => {
                return Err(Error::ProtocolViolation(
                    "Unexpected continuation frame".into(),
                ));
            }
            (OpCode::Continuation, Some(_)) => {}
            (_, Some(_)) => {
                return Err(Error::ProtocolViolation(
                    "Expected continuation frame".into(),
                ));
            }
            (opcode, None) => self.opcode = Some(opcode),
        }

        self.fragments += 1;
        self.limits.check_fragment_count(self.fragments)?;
        self.limits
            .check_message_size(self.buffer.len() + frame.payload().len())?;
        self.buffer.extend_from_slice(frame.payload());

        if !frame.fin {
            return Ok(None);
        }

        let payload = self.buffer.split().to_vec();
        let opcode = self.opcode.take().unwrap_or(OpCode::Binary);
        self.fragments = 0;
        if opcode == OpCode::Text {
            std::str::from_utf8(&payload)?;
        }
        Ok(Some(AssembledMessage { opcode, payload }))
    }

    /// Whether a fragmented message is in progress.
    #[must_use]
    pub fn is_assembling(&self) -> bool {
        self.opcode.is_some()
    }
}
