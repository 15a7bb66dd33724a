use bytes::{Buf, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::config::Config;
use crate::connection::Role;
use crate::error::{Error, Result};
use crate::protocol::validation::FrameValidator;
use crate::protocol::{Frame, FrameHeader};

/// Seed for the mask generator. Falls back to the clock if the OS source fails.
fn random_mask_seed() -> u32 {
    let mut buf = [0u8; 4];
    if getrandom::getrandom(&mut buf).is_ok() {
        u32::from_le_bytes(buf)
    } else {
        use std::time::{SystemTime, UNIX_EPOCH};
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.subsec_nanos() ^ d.as_secs() as u32)
            .unwrap_or(0x1234_5678)
    }
}

/// Reads frames off the receiving half of a stream.
///
/// [`FrameReader::read_frame`] is cancel-safe: all progress lives in the
/// internal buffer, so it can sit in a `tokio::select!` arm.
pub struct FrameReader<R> {
    io: R,
    buf: BytesMut,
    validator: FrameValidator,
}

impl<R> FrameReader<R> {
    #[must_use]
    pub fn new(io: R, role: Role, config: &Config) -> Self {
        Self::with_buffered(io, role, config, BytesMut::new())
    }

    /// Start with bytes that were read past the end of the HTTP head.
    #[must_use]
    pub fn with_buffered(io: R, role: Role, config: &Config, leftover: BytesMut) -> Self {
        let mut buf = BytesMut::with_capacity(config.read_buffer_size.max(leftover.len()));
        buf.extend_from_slice(&leftover);
        Self {
            io,
            buf,
            validator: FrameValidator::new(role, config.limits.clone())
                .with_accept_unmasked(config.accept_unmasked_frames),
        }
    }

    #[must_use]
    pub fn into_inner(self) -> R {
        self.io
    }
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    /// # Errors
    ///
    /// - [`Error::ConnectionClosed`] on EOF
    /// - header validation errors before the payload is buffered
    /// - parse errors from [`Frame::parse`]
    pub async fn read_frame(&mut self) -> Result<Frame> {
        loop {
            match FrameHeader::parse(&self.buf) {
                Ok(header) => {
                    self.validator.check(&header)?;
                    match Frame::parse(&self.buf) {
                        Ok((frame, consumed)) => {
                            self.buf.advance(consumed);
                            return Ok(frame);
                        }
                        Err(Error::IncompleteFrame { needed }) => self.buf.reserve(needed),
                        Err(e) => return Err(e),
                    }
                }
                Err(Error::IncompleteFrame { .. }) => {}
                Err(e) => return Err(e),
            }

            if self.io.read_buf(&mut self.buf).await? == 0 {
                return Err(Error::ConnectionClosed(None));
            }
        }
    }
}

/// Writes frames to the sending half of a stream, masking for clients.
pub struct FrameWriter<W> {
    io: W,
    buf: BytesMut,
    role: Role,
    mask_counter: u32,
}

impl<W> FrameWriter<W> {
    #[must_use]
    pub fn new(io: W, role: Role, config: &Config) -> Self {
        Self {
            io,
            buf: BytesMut::with_capacity(config.write_buffer_size),
            role,
            mask_counter: random_mask_seed(),
        }
    }

    #[must_use]
    pub fn role(&self) -> Role {
        self.role
    }

    #[must_use]
    pub fn into_inner(self) -> W {
        self.io
    }

    fn next_mask(&mut self) -> [u8; 4] {
        self.mask_counter = self.mask_counter.wrapping_add(0x9E37_79B9);
        let mut x = self.mask_counter;
        x = (x ^ (x >> 16)).wrapping_mul(0x85EB_CA6B);
        x = (x ^ (x >> 13)).wrapping_mul(0xC2B2_AE35);
        (x ^ (x >> 16)).to_le_bytes()
    }
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    /// Encode and write one frame. Not flushed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the write fails.
    pub async fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        let mask = self.role.must_mask().then(|| self.next_mask());
        self.buf.clear();
        self.buf.reserve(frame.wire_size(mask.is_some()));
        frame.write(&mut self.buf, mask);
        self.io.write_all(&self.buf).await?;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns [`Error::Io`] if the flush fails.
    pub async fn flush(&mut self) -> Result<()> {
        self.io.flush().await?;
        Ok(())
    }

    /// Flush and shut down the write side.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the shutdown fails.
    pub async fn shutdown(&mut self) -> Result<()> {
        self.io.shutdown().await?;
        Ok(())
    }
}
