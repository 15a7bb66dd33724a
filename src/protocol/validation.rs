//! Role-based checks on incoming frame headers (RFC 6455 Section 5.1).
//!
//! Runs on the header alone so oversized or wrongly masked frames are
//! rejected before their payload is buffered.

use crate::config::Limits;
use crate::connection::Role;
use crate::error::{Error, Result};
use crate::protocol::frame::FrameHeader;

#[derive(Debug, Clone)]
pub struct FrameValidator {
    role: Role,
    limits: Limits,
    accept_unmasked: bool,
}

impl FrameValidator {
    #[must_use]
    pub fn new(role: Role, limits: Limits) -> Self {
        Self {
            role,
            limits,
            accept_unmasked: false,
        }
    }

    /// Let a server accept unmasked client frames.
    #[must_use]
    pub fn with_accept_unmasked(mut self, accept: bool) -> Self {
        self.accept_unmasked = accept;
        self
    }

    /// # Errors
    ///
    /// - [`Error::UnmaskedClientFrame`] when a server sees an unmasked frame
    /// - [`Error::MaskedServerFrame`] when a client sees a masked frame
    /// - [`Error::ReservedBitsSet`] when any RSV bit is set
    /// - [`Error::FrameTooLarge`] when the payload exceeds the frame limit
    pub fn check(&self, header: &FrameHeader) -> Result<()> {
        let masked = header.mask.is_some();
        match self.role {
            Role::Server if !masked && !self.accept_unmasked => {
                return Err(Error::UnmaskedClientFrame);
            }
            Role::Client if masked => return Err(Error::MaskedServerFrame),
            _ => {}
        }
        if header.rsv != 0 {
            return Err(Error::ReservedBitsSet);
        }
        self.limits.check_frame_size(header.payload_len)
    }
}
