//! Engine.IO socket driven by hand, for checking exact wire packets.

use std::net::SocketAddr;
use std::time::Duration;

use rsio::{CloseCode, Config, Connection, Message, connection};
use tokio::net::TcpStream;

pub struct RawSocket {
    conn: Connection<TcpStream>,
}

impl RawSocket {
    /// Upgrade to the Engine.IO websocket endpoint; returns the open packet
    /// text alongside the socket.
    pub async fn open(addr: SocketAddr) -> (Self, String) {
        let url = format!("ws://{addr}/socket.io/?EIO=4&transport=websocket");
        let conn = connection::connect(&url, Config::client()).await.unwrap();
        let mut socket = Self { conn };
        let open = socket.recv().await.expect("open packet");
        (socket, open)
    }

    /// Open and join `/`, returning the socket id.
    pub async fn connect(addr: SocketAddr) -> (Self, String) {
        let (mut socket, open) = Self::open(addr).await;
        assert!(open.starts_with('0'), "{open}");
        socket.send("40").await;
        let reply = socket.recv().await.expect("connect reply");
        let body: serde_json::Value = serde_json::from_str(
            reply.strip_prefix("40").expect("connect ack"),
        )
        .unwrap();
        let sid = body["sid"].as_str().unwrap().to_string();
        (socket, sid)
    }

    pub async fn send(&mut self, text: &str) {
        self.conn.send(Message::text(text)).await.unwrap();
    }

    /// Next text frame, or `None` once the server closed.
    pub async fn recv(&mut self) -> Option<String> {
        loop {
            match self.conn.recv().await.unwrap() {
                Some(Message::Text(text)) => return Some(text),
                Some(Message::Close(_)) | None => return None,
                Some(_) => {}
            }
        }
    }

    /// Like [`RawSocket::recv`] with a deadline. `Err` means nothing came.
    pub async fn recv_within(&mut self, wait: Duration) -> Result<Option<String>, ()> {
        tokio::time::timeout(wait, self.recv()).await.map_err(|_| ())
    }

    pub async fn close(mut self) {
        let _ = self.conn.close(CloseCode::Normal, "").await;
        while self.conn.recv().await.ok().flatten().is_some() {}
    }
}
