//! Socket.IO client over the Engine.IO websocket transport.
//!
//! Used by the scenario runner and the echo target tests. A background task
//! reads the socket, answers Engine.IO pings, resolves acks and queues
//! incoming events for [`SocketIoClient::next_event`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use url::Url;

use crate::config::EngineConfig;
use crate::connection::{self, Connection, RecvHalf};
use crate::engineio::session::spawn_writer;
use crate::engineio::{self, ENGINE_PATH, PROTOCOL_VERSION, PacketType};
use crate::error::{Error, Result};
use crate::message::{CloseCode, Message};
use crate::socketio::packet::{DEFAULT_NAMESPACE, Packet, PacketKind};

type PendingAcks = Arc<Mutex<HashMap<u64, oneshot::Sender<Vec<Value>>>>>;

/// An event pushed by the server.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub name: String,
    pub args: Vec<Value>,
}

pub struct SocketIoClient {
    sid: String,
    config: EngineConfig,
    out: mpsc::UnboundedSender<Message>,
    events: mpsc::UnboundedReceiver<Event>,
    pending: PendingAcks,
    next_ack: AtomicU64,
    reader: JoinHandle<()>,
    writer: Option<JoinHandle<()>>,
}

/// `ws://host:port[/...]` → the Engine.IO websocket endpoint on that host.
///
/// # Errors
///
/// [`Error::InvalidTarget`] if `target` is not a `ws://` URL.
pub fn engine_url(target: &str) -> Result<String> {
    let mut url =
        Url::parse(target).map_err(|e| Error::InvalidTarget(format!("{target}: {e}")))?;
    if url.scheme() != "ws" {
        return Err(Error::InvalidTarget(format!(
            "{target}: expected a ws:// URL"
        )));
    }
    url.set_path(ENGINE_PATH);
    url.query_pairs_mut()
        .clear()
        .append_pair("EIO", PROTOCOL_VERSION)
        .append_pair("transport", "websocket");
    Ok(url.into())
}

async fn next_engine_packet(conn: &mut Connection<TcpStream>) -> Result<engineio::Packet> {
    loop {
        match conn.recv().await? {
            Some(Message::Text(text)) => {
                let packet = engineio::Packet::decode(&text)?;
                if packet.kind == PacketType::Ping {
                    conn.send(Message::text(engineio::Packet::pong(packet.data).encode()))
                        .await?;
                    continue;
                }
                return Ok(packet);
            }
            Some(Message::Close(frame)) => {
                return Err(Error::ConnectionClosed(frame.map(|f| f.code.as_u16())));
            }
            Some(_) => {}
            None => return Err(Error::ConnectionClosed(None)),
        }
    }
}

async fn handshake(conn: &mut Connection<TcpStream>) -> Result<String> {
    let open = next_engine_packet(conn).await?.into_open()?;
    debug!(engine_sid = %open.sid, ping_interval = open.ping_interval, "engine.io open");

    let connect = engineio::Packet::message(Packet::connect(DEFAULT_NAMESPACE).encode());
    conn.send(Message::text(connect.encode())).await?;

    loop {
        let packet = next_engine_packet(conn).await?;
        if packet.kind != PacketType::Message {
            debug!(packet = %packet, "ignored during connect");
            continue;
        }
        let reply = Packet::decode(&packet.data)?;
        match reply.kind {
            PacketKind::Connect => {
                return reply
                    .data
                    .as_ref()
                    .and_then(|d| d.get("sid"))
                    .and_then(Value::as_str)
                    .map(String::from)
                    .ok_or_else(|| Error::InvalidPacket("connect reply without sid".into()));
            }
            PacketKind::ConnectError => {
                let message = match &reply.data {
                    Some(Value::String(m)) => m.clone(),
                    Some(data) => data
                        .get("message")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                    None => String::new(),
                };
                return Err(Error::ConnectError(message));
            }
            _ => debug!(packet = %reply, "ignored during connect"),
        }
    }
}

impl SocketIoClient {
    /// Connect to `target` (`ws://host:port`) and join the `/` namespace.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidTarget`] for non-`ws` URLs
    /// - [`Error::Timeout`] if either handshake exceeds the configured limit
    /// - [`Error::ConnectError`] if the server refuses the namespace
    pub async fn connect(target: &str, config: EngineConfig) -> Result<Self> {
        let url = engine_url(target)?;
        let deadline = config.websocket.timeouts.handshake;
        let ws = config.websocket.clone();
        let (conn, sid) = tokio::time::timeout(deadline, async {
            let mut conn = connection::connect(&url, ws).await?;
            let sid = handshake(&mut conn).await?;
            Ok::<_, Error>((conn, sid))
        })
        .await??;
        debug!(sid = %sid, "socket.io connected");

        let (incoming, outgoing) = conn.split();
        let (out, queue) = mpsc::unbounded_channel();
        let (events_tx, events) = mpsc::unbounded_channel();
        let pending = PendingAcks::default();
        let writer = spawn_writer(outgoing, queue);
        let reader = tokio::spawn(read_loop(incoming, out.clone(), events_tx, pending.clone()));

        Ok(Self {
            sid,
            config,
            out,
            events,
            pending,
            next_ack: AtomicU64::new(0),
            reader,
            writer: Some(writer),
        })
    }

    /// Socket id assigned by the server.
    #[must_use]
    pub fn sid(&self) -> &str {
        &self.sid
    }

    fn send_packet(&self, packet: &Packet) -> Result<()> {
        let text = engineio::Packet::message(packet.encode()).encode();
        self.out
            .send(Message::Text(text))
            .map_err(|_| Error::ConnectionClosed(None))
    }

    /// # Errors
    ///
    /// [`Error::ConnectionClosed`] once the connection is gone.
    pub fn emit(&self, event: &str, args: Vec<Value>) -> Result<()> {
        self.send_packet(&Packet::event(DEFAULT_NAMESPACE, event, args))
    }

    /// Emit with an ack id and wait for the server's answer.
    ///
    /// # Errors
    ///
    /// - [`Error::AckTimeout`] after `ack_timeout` without an answer
    /// - [`Error::ConnectionClosed`] if the connection drops first
    pub async fn emit_with_ack(&self, event: &str, args: Vec<Value>) -> Result<Vec<Value>> {
        let id = self.next_ack.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, tx);

        let packet = Packet::event(DEFAULT_NAMESPACE, event, args).with_ack_id(id);
        if let Err(e) = self.send_packet(&packet) {
            self.forget_ack(id);
            return Err(e);
        }

        match tokio::time::timeout(self.config.ack_timeout, rx).await {
            Ok(Ok(args)) => Ok(args),
            Ok(Err(_)) => Err(Error::ConnectionClosed(None)),
            Err(_) => {
                self.forget_ack(id);
                Err(Error::AckTimeout(id))
            }
        }
    }

    fn forget_ack(&self, id: u64) {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
    }

    /// Next event from the server, or `None` once the connection is closed.
    pub async fn next_event(&mut self) -> Option<Event> {
        self.events.recv().await
    }

    /// Leave the namespace and close the websocket.
    ///
    /// # Errors
    ///
    /// [`Error::ConnectionClosed`] if the connection was already gone.
    pub async fn disconnect(mut self) -> Result<()> {
        self.send_packet(&Packet::disconnect(DEFAULT_NAMESPACE))?;
        let _ = self.out.send(Message::close(CloseCode::Normal, ""));
        if let Some(writer) = self.writer.take() {
            if tokio::time::timeout(self.config.websocket.timeouts.write, writer)
                .await
                .is_err()
            {
                debug!("writer did not finish in time");
            }
        }
        Ok(())
    }
}

impl Drop for SocketIoClient {
    fn drop(&mut self) {
        self.reader.abort();
        if let Some(writer) = self.writer.take() {
            writer.abort();
        }
    }
}

async fn read_loop(
    mut incoming: RecvHalf<TcpStream>,
    out: mpsc::UnboundedSender<Message>,
    events: mpsc::UnboundedSender<Event>,
    pending: PendingAcks,
) {
    loop {
        let text = match incoming.recv().await {
            Ok(Some(Message::Text(text))) => text,
            Ok(Some(Message::Ping(data))) => {
                let _ = out.send(Message::Pong(data));
                continue;
            }
            Ok(Some(Message::Close(frame))) => {
                let echo = frame
                    .map(|cf| Message::close(cf.code, cf.reason))
                    .unwrap_or(Message::Close(None));
                let _ = out.send(echo);
                break;
            }
            Ok(Some(_)) => continue,
            Ok(None) => break,
            Err(e) => {
                warn!(error = %e, "socket.io client read failed");
                break;
            }
        };

        let packet = match engineio::Packet::decode(&text) {
            Ok(packet) => packet,
            Err(e) => {
                warn!(error = %e, "undecodable engine.io packet");
                continue;
            }
        };
        match packet.kind {
            PacketType::Ping => {
                let pong = engineio::Packet::pong(packet.data).encode();
                let _ = out.send(Message::Text(pong));
            }
            PacketType::Message => match Packet::decode(&packet.data) {
                Ok(sio) => match sio.kind {
                    PacketKind::Event => {
                        if let Ok((name, args)) = sio.into_event() {
                            if events.send(Event { name, args }).is_err() {
                                break;
                            }
                        }
                    }
                    PacketKind::Ack => {
                        let waiter = sio.ack_id.and_then(|id| {
                            pending
                                .lock()
                                .unwrap_or_else(PoisonError::into_inner)
                                .remove(&id)
                        });
                        match waiter {
                            Some(waiter) => {
                                let _ = waiter.send(sio.ack_args());
                            }
                            None => debug!(ack_id = ?sio.ack_id, "ack with no waiter"),
                        }
                    }
                    PacketKind::Disconnect => {
                        debug!("server disconnected the socket");
                        break;
                    }
                    _ => debug!(packet = %sio, "ignored"),
                },
                Err(e) => warn!(error = %e, "undecodable socket.io packet"),
            },
            PacketType::Close => break,
            _ => {}
        }
    }
    pending
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .clear();
}
