//! Socket.IO server: accept loop, HTTP fallback and per-socket dispatch.

use std::net::SocketAddr;
use std::ops::ControlFlow;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::connection::upgrade;
use crate::engineio::{CloseReason, Outbox, Route, Session, SessionHandler, generate_sid, route};
use crate::error::Result;
use crate::http::{RequestHead, Response, read_head};
use crate::server_handle::ServerHandle;
use crate::socketio::channels::Channels;
use crate::socketio::packet::{DEFAULT_NAMESPACE, Packet, PacketKind};
use crate::socketio::router::Router;
use crate::socketio::socket::{AckSender, SocketRef};

struct Shared {
    router: Router,
    config: EngineConfig,
    channels: Channels,
    fallback: Response,
}

/// Serves the `/` namespace over Engine.IO websockets and answers every
/// other HTTP request with a fixed fallback response.
pub struct SocketIoServer {
    router: Router,
    config: EngineConfig,
    channels: Channels,
    fallback: Response,
}

impl SocketIoServer {
    #[must_use]
    pub fn new(router: Router) -> Self {
        Self {
            router,
            config: EngineConfig::default(),
            channels: Channels::new(),
            fallback: Response::not_found("Not Found"),
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Response for plain HTTP requests.
    #[must_use]
    pub fn with_fallback(mut self, fallback: Response) -> Self {
        self.fallback = fallback;
        self
    }

    /// Registry shared with every socket this server accepts.
    #[must_use]
    pub fn channels(&self) -> Channels {
        self.channels.clone()
    }

    /// # Errors
    ///
    /// Returns [`crate::Error::Io`] if the address cannot be bound.
    pub async fn bind(self, addr: impl ToSocketAddrs) -> Result<ServerHandle> {
        let listener = TcpListener::bind(addr).await?;
        self.serve(listener)
    }

    /// # Errors
    ///
    /// Returns [`crate::Error::Io`] if the listener has no local address.
    pub fn serve(self, listener: TcpListener) -> Result<ServerHandle> {
        let shared = Arc::new(Shared {
            router: self.router,
            config: self.config,
            channels: self.channels,
            fallback: self.fallback,
        });
        ServerHandle::spawn(listener, move |stream, peer, shutdown| {
            let shared = shared.clone();
            async move {
                if let Err(e) = serve_connection(stream, peer, &shared, shutdown).await {
                    if e.is_disconnect() {
                        debug!(peer = %peer, error = %e, "connection dropped");
                    } else {
                        warn!(peer = %peer, error = %e, "connection failed");
                    }
                }
            }
        })
    }
}

async fn serve_connection(
    mut stream: TcpStream,
    peer: SocketAddr,
    shared: &Shared,
    shutdown: watch::Receiver<bool>,
) -> Result<()> {
    let ws = &shared.config.websocket;
    let (head, leftover) = tokio::time::timeout(
        ws.timeouts.handshake,
        read_head(&mut stream, ws.limits.max_handshake_size),
    )
    .await??;
    let head = match RequestHead::parse(&head) {
        Ok(head) => head,
        Err(e) => {
            Response::new(400, "text/plain", "Bad Request")
                .write_to(&mut stream)
                .await?;
            return Err(e);
        }
    };

    match route(&head) {
        Route::Plain => {
            debug!(peer = %peer, method = %head.method, path = %head.path, "plain http request");
            return shared.fallback.write_to(&mut stream).await;
        }
        Route::Reject(err) => {
            debug!(peer = %peer, code = err.code(), "engine.io request rejected");
            return err.response().write_to(&mut stream).await;
        }
        Route::Upgrade => {}
    }

    let conn = upgrade(stream, &head, leftover, ws.clone()).await?;
    let session = Session::new(shared.config.clone())?;
    let mut handler = SocketHandler {
        outbox: session.outbox(),
        shared,
        socket: None,
    };
    session.run(conn, &mut handler, shutdown).await?;
    Ok(())
}

/// Socket.IO layer of one Engine.IO session.
struct SocketHandler<'a> {
    outbox: Outbox,
    shared: &'a Shared,
    socket: Option<SocketRef>,
}

impl SocketHandler<'_> {
    fn reply(&self, packet: &Packet) {
        if let Err(e) = self.outbox.message(packet.encode()) {
            debug!(error = %e, "reply dropped");
        }
    }

    fn on_connect(&mut self) -> ControlFlow<CloseReason> {
        if let Some(socket) = &self.socket {
            debug!(sid = socket.id(), "duplicate connect ignored");
            return ControlFlow::Continue(());
        }
        let sid = match generate_sid() {
            Ok(sid) => sid,
            Err(e) => {
                warn!(error = %e, "cannot allocate socket id");
                return ControlFlow::Break(CloseReason::TransportError);
            }
        };
        self.shared.channels.register(&sid, self.outbox.clone());
        self.reply(&Packet::connect_ok(DEFAULT_NAMESPACE, &sid));
        info!(sid = %sid, "socket connected");
        self.socket = Some(SocketRef::new(
            sid,
            self.outbox.clone(),
            self.shared.channels.clone(),
        ));
        ControlFlow::Continue(())
    }

    fn on_event(&self, packet: Packet) {
        let Some(socket) = &self.socket else {
            warn!("event before connect, dropping");
            return;
        };
        let ack = packet
            .ack_id
            .map(|id| AckSender::new(id, self.outbox.clone()));
        let (event, args) = match packet.into_event() {
            Ok(parts) => parts,
            Err(e) => {
                warn!(sid = socket.id(), error = %e, "dropping event");
                return;
            }
        };
        debug!(sid = socket.id(), event = %event, "event");
        if let Err(e) = self.shared.router.dispatch(socket, &event, args, ack) {
            warn!(sid = socket.id(), event = %event, error = %e, "handler failed");
        }
    }
}

impl SessionHandler for SocketHandler<'_> {
    fn on_message(&mut self, data: String) -> ControlFlow<CloseReason> {
        let packet = match Packet::decode(&data) {
            Ok(packet) => packet,
            Err(e) => {
                warn!(error = %e, "dropping malformed socket.io packet");
                return ControlFlow::Continue(());
            }
        };

        if packet.namespace != DEFAULT_NAMESPACE {
            if packet.kind == PacketKind::Connect {
                self.reply(&Packet::connect_error(
                    packet.namespace.as_str(),
                    "Invalid namespace",
                ));
            } else {
                debug!(namespace = %packet.namespace, "packet for unknown namespace ignored");
            }
            return ControlFlow::Continue(());
        }

        match packet.kind {
            PacketKind::Connect => return self.on_connect(),
            PacketKind::Disconnect => return ControlFlow::Break(CloseReason::ClientDisconnect),
            PacketKind::Event => self.on_event(packet),
            PacketKind::Ack => debug!(ack_id = ?packet.ack_id, "ack ignored, server requests none"),
            PacketKind::ConnectError | PacketKind::BinaryEvent | PacketKind::BinaryAck => {
                warn!(kind = ?packet.kind, "unexpected packet from client");
            }
        }
        ControlFlow::Continue(())
    }

    fn on_close(&mut self, reason: CloseReason) {
        let Some(socket) = self.socket.take() else {
            return;
        };
        if reason == CloseReason::ServerShutdown {
            self.reply(&Packet::disconnect(DEFAULT_NAMESPACE));
        }
        self.shared.channels.leave_all(socket.id());
        info!(sid = socket.id(), reason = %reason, "socket disconnected");
    }
}
