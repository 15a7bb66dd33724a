use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncWrite, ReadHalf, WriteHalf};

use crate::codec::{FrameReader, FrameWriter};
use crate::config::Config;
use crate::connection::fragmenter::fragments;
use crate::connection::{ConnectionState, Role};
use crate::error::{Error, Result};
use crate::message::{CloseCode, CloseFrame, Message};
use crate::protocol::assembler::MessageAssembler;
use crate::protocol::{Frame, OpCode};

/// An upgraded WebSocket connection.
///
/// Handles fragmentation, reassembly, pong replies and the close handshake.
/// Use [`Connection::split`] when reads and writes must happen from
/// different tasks.
///
/// ```rust,ignore
/// let mut conn = rsio::connection::connect("ws://127.0.0.1:9096/", Config::client()).await?;
/// conn.send(Message::text("hello")).await?;
/// while let Some(msg) = conn.recv().await? {
///     if msg.is_data() {
///         println!("{msg:?}");
///     }
/// }
/// ```
pub struct Connection<S> {
    recv: RecvHalf<S>,
    send: SendHalf<S>,
    role: Role,
    state: ConnectionState,
}

impl<S: AsyncRead + AsyncWrite> Connection<S> {
    /// Wrap a stream whose upgrade handshake is already done.
    pub fn new(io: S, role: Role, config: Config) -> Self {
        Self::with_buffered(io, role, config, BytesMut::new())
    }

    /// Like [`Connection::new`], replaying bytes that were read past the
    /// handshake.
    pub fn with_buffered(io: S, role: Role, config: Config, leftover: BytesMut) -> Self {
        let (read, write) = tokio::io::split(io);
        Self {
            recv: RecvHalf {
                reader: FrameReader::with_buffered(read, role, &config, leftover),
                assembler: MessageAssembler::new(config.limits.clone()),
                closed: false,
            },
            send: SendHalf {
                writer: FrameWriter::new(write, role, &config),
                config,
                closed: false,
            },
            role,
            state: ConnectionState::Open,
        }
    }
}

impl<S> Connection<S> {
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.state == ConnectionState::Open
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// Separate the receiving and sending sides.
    ///
    /// After a split nothing answers pings or echoes close frames
    /// automatically; the owner of the halves must do it.
    pub fn split(self) -> (RecvHalf<S>, SendHalf<S>) {
        (self.recv, self.send)
    }

    /// Take back the underlying stream.
    pub fn into_inner(self) -> S
    where
        S: Unpin,
    {
        self.recv
            .reader
            .into_inner()
            .unsplit(self.send.writer.into_inner())
    }
}

impl<S: AsyncRead + AsyncWrite> Connection<S> {
    /// Send and flush one message. Data larger than the configured fragment
    /// size goes out as continuation frames.
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectionClosed`] once a close frame was sent or received
    /// - [`Error::MessageTooLarge`] past `limits.max_message_size`
    /// - [`Error::ControlFrameTooLarge`] for control payloads over 125 bytes
    pub async fn send(&mut self, message: Message) -> Result<()> {
        if !self.state.can_send() {
            return Err(Error::ConnectionClosed(None));
        }
        let closing = matches!(message, Message::Close(_));
        self.send.send(message).await?;
        if closing {
            self.state = ConnectionState::Closing;
        }
        Ok(())
    }

    /// # Errors
    ///
    /// Same as [`Connection::send`].
    pub async fn send_no_flush(&mut self, message: Message) -> Result<()> {
        if !self.state.can_send() {
            return Err(Error::ConnectionClosed(None));
        }
        self.send.send_no_flush(message).await
    }

    /// # Errors
    ///
    /// Returns [`Error::Io`] if the flush fails.
    pub async fn flush(&mut self) -> Result<()> {
        self.send.flush().await
    }

    /// Next message from the peer.
    ///
    /// Pings are answered before they are returned. A close frame is echoed
    /// if we did not start the close. Returns `Ok(None)` once the
    /// connection is closed.
    ///
    /// # Errors
    ///
    /// Protocol violations and I/O failures.
    pub async fn recv(&mut self) -> Result<Option<Message>> {
        if !self.state.can_receive() {
            return Ok(None);
        }
        match self.recv.recv().await? {
            None => {
                self.state = ConnectionState::Closed;
                Ok(None)
            }
            Some(Message::Ping(data)) => {
                if self.state == ConnectionState::Open {
                    self.send.send(Message::Pong(data.clone())).await?;
                }
                Ok(Some(Message::Ping(data)))
            }
            Some(Message::Close(frame)) => {
                if self.state == ConnectionState::Open {
                    let echo = frame
                        .as_ref()
                        .map(|cf| Message::close(cf.code, cf.reason.clone()))
                        .unwrap_or(Message::Close(None));
                    // The peer may already be gone.
                    let _ = self.send.send(echo).await;
                }
                self.state = ConnectionState::Closed;
                Ok(Some(Message::Close(frame)))
            }
            Some(message) => Ok(Some(message)),
        }
    }

    /// # Errors
    ///
    /// Same as [`Connection::send`].
    pub async fn ping(&mut self, data: Vec<u8>) -> Result<()> {
        self.send(Message::Ping(data)).await
    }

    /// Start the close handshake. Keep calling [`Connection::recv`] to see
    /// the peer's reply.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidCloseCode`] for reserved codes, or I/O errors.
    pub async fn close(&mut self, code: CloseCode, reason: &str) -> Result<()> {
        if self.state != ConnectionState::Open {
            return Ok(());
        }
        self.send.close(code, reason).await?;
        self.state = ConnectionState::Closing;
        Ok(())
    }
}

/// Receiving side of a split [`Connection`].
pub struct RecvHalf<S> {
    reader: FrameReader<ReadHalf<S>>,
    assembler: MessageAssembler,
    closed: bool,
}

impl<S: AsyncRead> RecvHalf<S> {
    /// Next complete message, control frames included.
    ///
    /// Cancel-safe. Returns `Ok(None)` on EOF and after a close frame.
    ///
    /// # Errors
    ///
    /// Protocol violations and I/O failures.
    pub async fn recv(&mut self) -> Result<Option<Message>> {
        if self.closed {
            return Ok(None);
        }
        loop {
            let frame = match self.reader.read_frame().await {
                Ok(frame) => frame,
                Err(Error::ConnectionClosed(_)) => {
                    self.closed = true;
                    return Ok(None);
                }
                Err(e) => return Err(e),
            };
            frame.validate()?;

            match frame.opcode {
                OpCode::Ping => return Ok(Some(Message::Ping(frame.into_payload()))),
                OpCode::Pong => return Ok(Some(Message::Pong(frame.into_payload()))),
                OpCode::Close => {
                    self.closed = true;
                    return Ok(Some(Message::Close(CloseFrame::from_payload(
                        frame.payload(),
                    ))));
                }
                OpCode::Text | OpCode::Binary | OpCode::Continuation => {
                    if let Some(assembled) = self.assembler.push(frame)? {
                        return Ok(Some(match assembled.opcode {
                            OpCode::Text => Message::Text(String::from_utf8(assembled.payload)?),
                            _ => Message::Binary(assembled.payload),
                        }));
                    }
                }
            }
        }
    }
}

/// Sending side of a split [`Connection`].
pub struct SendHalf<S> {
    writer: FrameWriter<WriteHalf<S>>,
    config: Config,
    closed: bool,
}

impl<S> SendHalf<S> {
    /// Whether a close frame has gone out.
    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl<S: AsyncWrite> SendHalf<S> {
    /// # Errors
    ///
    /// Same as [`Connection::send`].
    pub async fn send(&mut self, message: Message) -> Result<()> {
        self.send_no_flush(message).await?;
        self.writer.flush().await
    }

    /// Write without flushing.
    ///
    /// # Errors
    ///
    /// Same as [`Connection::send`].
    pub async fn send_no_flush(&mut self, message: Message) -> Result<()> {
        if self.closed {
            return Err(Error::ConnectionClosed(None));
        }
        if message.is_control() {
            if let Message::Close(Some(cf)) = &message {
                if cf.code.is_reserved() {
                    return Err(Error::InvalidCloseCode(cf.code.as_u16()));
                }
            }
            let closing = matches!(message, Message::Close(_));
            let frame = Frame::from(message);
            frame.validate()?;
            self.writer.write_frame(&frame).await?;
            self.closed = closing;
            return Ok(());
        }

        let opcode = if message.is_text() {
            OpCode::Text
        } else {
            OpCode::Binary
        };
        let payload = message.payload();
        self.config.limits.check_message_size(payload.len())?;
        for frame in fragments(opcode, &payload, self.config.fragment_size) {
            self.writer.write_frame(&frame).await?;
        }
        Ok(())
    }

    /// # Errors
    ///
    /// Returns [`Error::Io`] if the flush fails.
    pub async fn flush(&mut self) -> Result<()> {
        self.writer.flush().await
    }

    /// Send a close frame unless one already went out.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidCloseCode`] for reserved codes, or I/O errors.
    pub async fn close(&mut self, code: CloseCode, reason: &str) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.send(Message::close(code, reason)).await
    }

    /// Shut down the write side of the stream.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the shutdown fails.
    pub async fn shutdown(&mut self) -> Result<()> {
        self.writer.shutdown().await
    }
}
