//! Server side of one Engine.IO session over an upgraded WebSocket.

use std::fmt;
use std::ops::ControlFlow;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::connection::{Connection, SendHalf};
use crate::engineio::packet::{OpenPacket, Packet, PacketType, generate_sid};
use crate::error::{Error, Result};
use crate::message::{CloseCode, Message};

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// The client sent an Engine.IO close packet.
    ClientClose,
    /// The upper layer asked to end the session.
    ClientDisconnect,
    /// WebSocket closed or EOF.
    TransportClose,
    /// Protocol error, oversized packet or I/O failure.
    TransportError,
    PingTimeout,
    ServerShutdown,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CloseReason::ClientClose => "forced close",
            CloseReason::ClientDisconnect => "client namespace disconnect",
            CloseReason::TransportClose => "transport close",
            CloseReason::TransportError => "transport error",
            CloseReason::PingTimeout => "ping timeout",
            CloseReason::ServerShutdown => "server shutting down",
        })
    }
}

/// Sending side of a session, shared by everything that writes to it.
///
/// Messages queue on an unbounded channel drained by the session's writer
/// task, so sending never blocks and keeps order.
#[derive(Debug, Clone)]
pub struct Outbox {
    tx: mpsc::UnboundedSender<Message>,
}

impl Outbox {
    /// # Errors
    ///
    /// [`Error::ConnectionClosed`] once the session's writer has stopped.
    pub fn send(&self, packet: &Packet) -> Result<()> {
        self.raw(Message::Text(packet.encode()))
    }

    /// Queue an Engine.IO message packet.
    ///
    /// # Errors
    ///
    /// [`Error::ConnectionClosed`] once the session's writer has stopped.
    pub fn message(&self, data: impl Into<String>) -> Result<()> {
        self.send(&Packet::message(data))
    }

    fn raw(&self, message: Message) -> Result<()> {
        self.tx
            .send(message)
            .map_err(|_| Error::ConnectionClosed(None))
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Drain `queue` into `outgoing` until a close frame went out or every
/// sender is gone, then shut the write side down.
pub(crate) fn spawn_writer<S>(
    mut outgoing: SendHalf<S>,
    mut queue: mpsc::UnboundedReceiver<Message>,
) -> JoinHandle<()>
where
    S: AsyncWrite + Send + 'static,
{
    tokio::spawn(async move {
        while let Some(message) = queue.recv().await {
            let closing = matches!(message, Message::Close(_));
            if let Err(e) = outgoing.send(message).await {
                debug!(error = %e, "writer stopped");
                break;
            }
            if closing {
                break;
            }
        }
        let _ = outgoing.shutdown().await;
    })
}

/// Upper layer fed by a [`Session`].
pub trait SessionHandler: Send {
    /// Payload of one message packet. `Break` ends the session.
    fn on_message(&mut self, data: String) -> ControlFlow<CloseReason>;

    /// Called once, after the read loop stops and before the close frame is
    /// queued.
    fn on_close(&mut self, reason: CloseReason);
}

pub struct Session {
    sid: String,
    config: EngineConfig,
    outbox: Outbox,
    queue: mpsc::UnboundedReceiver<Message>,
}

impl Session {
    /// # Errors
    ///
    /// Returns [`Error::Io`] if no session id can be generated.
    pub fn new(config: EngineConfig) -> Result<Self> {
        let (tx, queue) = mpsc::unbounded_channel();
        Ok(Self {
            sid: generate_sid()?,
            config,
            outbox: Outbox { tx },
            queue,
        })
    }

    #[must_use]
    pub fn sid(&self) -> &str {
        &self.sid
    }

    #[must_use]
    pub fn outbox(&self) -> Outbox {
        self.outbox.clone()
    }

    /// Send the open packet, then pump packets until the session ends.
    ///
    /// The server pings every `ping_interval`; a pong must come back within
    /// `ping_timeout` or the session ends with [`CloseReason::PingTimeout`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if the open packet cannot be built. Everything
    /// after that ends the session with a [`CloseReason`] instead.
    pub async fn run<S, H>(
        self,
        conn: Connection<S>,
        handler: &mut H,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<CloseReason>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
        H: SessionHandler,
    {
        let Self {
            sid,
            config,
            outbox,
            queue,
        } = self;
        let (mut incoming, outgoing) = conn.split();

        let mut writer = spawn_writer(outgoing, queue);

        outbox.send(&Packet::open(&OpenPacket::new(sid.as_str(), &config))?)?;
        info!(sid = %sid, "engine.io session open");

        // At most one ping is outstanding; the next is due `ping_interval`
        // after its pong.
        let mut next_ping = Instant::now() + config.ping_interval;
        let mut pong_deadline: Option<Instant> = None;

        let reason = loop {
            if *shutdown.borrow() {
                break CloseReason::ServerShutdown;
            }
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break CloseReason::ServerShutdown;
                    }
                }
                () = tokio::time::sleep_until(next_ping), if pong_deadline.is_none() => {
                    pong_deadline = Some(Instant::now() + config.ping_timeout);
                    if outbox.send(&Packet::ping("")).is_err() {
                        break CloseReason::TransportClose;
                    }
                }
                () = tokio::time::sleep_until(pong_deadline.unwrap_or_else(Instant::now)),
                    if pong_deadline.is_some() =>
                {
                    break CloseReason::PingTimeout;
                }
                received = incoming.recv() => match received {
                    Ok(Some(Message::Text(text))) => {
                        if text.len() > config.max_payload {
                            warn!(sid = %sid, size = text.len(), max = config.max_payload, "payload too large");
                            break CloseReason::TransportError;
                        }
                        let packet = match Packet::decode(&text) {
                            Ok(packet) => packet,
                            Err(e) => {
                                warn!(sid = %sid, error = %e, "dropping undecodable packet");
                                continue;
                            }
                        };
                        debug!(sid = %sid, packet = %packet, "engine.io packet");
                        match packet.kind {
                            PacketType::Pong => {
                                if pong_deadline.take().is_some() {
                                    next_ping = Instant::now() + config.ping_interval;
                                }
                            }
                            PacketType::Ping => {
                                if outbox.send(&Packet::pong(packet.data)).is_err() {
                                    break CloseReason::TransportClose;
                                }
                            }
                            PacketType::Message => {
                                if let ControlFlow::Break(reason) = handler.on_message(packet.data) {
                                    break reason;
                                }
                            }
                            PacketType::Close => break CloseReason::ClientClose,
                            PacketType::Noop => {}
                            PacketType::Open | PacketType::Upgrade => {
                                warn!(sid = %sid, packet = %packet, "unexpected packet from client");
                            }
                        }
                    }
                    Ok(Some(Message::Ping(data))) => {
                        let _ = outbox.raw(Message::Pong(data));
                    }
                    Ok(Some(Message::Pong(_))) => {}
                    Ok(Some(Message::Binary(data))) => {
                        warn!(sid = %sid, size = data.len(), "binary frames are not supported");
                    }
                    Ok(Some(Message::Close(_)) | None) => break CloseReason::TransportClose,
                    Err(e) => {
                        warn!(sid = %sid, error = %e, "websocket error");
                        break CloseReason::TransportError;
                    }
                },
            }
        };

        handler.on_close(reason);
        info!(sid = %sid, reason = %reason, "engine.io session closed");

        let code = match reason {
            CloseReason::ServerShutdown => {
                let _ = outbox.send(&Packet::close());
                CloseCode::GoingAway
            }
            CloseReason::TransportError => CloseCode::ProtocolError,
            _ => CloseCode::Normal,
        };
        let _ = outbox.raw(Message::close(code, ""));
        drop(outbox);

        if tokio::time::timeout(config.websocket.timeouts.write, &mut writer)
            .await
            .is_err()
        {
            writer.abort();
        }
        Ok(reason)
    }
}
