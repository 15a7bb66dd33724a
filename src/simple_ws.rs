//! Plain WebSocket echo server for runner tests.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tracing::{debug, info};

use crate::config::Config;
use crate::connection::accept;
use crate::error::Result;
use crate::message::{CloseCode, Message};
use crate::server_handle::ServerHandle;

/// Bind `127.0.0.1:0` and echo every text and binary message back.
///
/// # Errors
///
/// Returns [`crate::Error::Io`] if binding fails.
pub async fn spawn() -> Result<ServerHandle> {
    spawn_with_counter(Arc::new(AtomicUsize::new(0))).await
}

/// Like [`spawn`], counting every data message received into `received`.
///
/// # Errors
///
/// Returns [`crate::Error::Io`] if binding fails.
pub async fn spawn_with_counter(received: Arc<AtomicUsize>) -> Result<ServerHandle> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let handle = ServerHandle::spawn(listener, move |stream, peer, shutdown| {
        let received = received.clone();
        async move {
            if let Err(e) = echo(stream, shutdown, &received).await {
                debug!(peer = %peer, error = %e, "echo connection ended");
            }
        }
    })?;
    info!(port = handle.port(), "test websocket server listening");
    Ok(handle)
}

async fn echo(
    stream: TcpStream,
    mut shutdown: watch::Receiver<bool>,
    received: &AtomicUsize,
) -> Result<()> {
    let config = Config::server();
    let deadline = config.timeouts.handshake;
    let conn = tokio::time::timeout(deadline, accept(stream, config)).await??;
    let (mut rx, mut tx) = conn.split();

    loop {
        if *shutdown.borrow() {
            return tx.close(CloseCode::GoingAway, "server shutting down").await;
        }
        let message = tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() {
                    return tx.close(CloseCode::GoingAway, "server shutting down").await;
                }
                continue;
            }
            message = rx.recv() => message?,
        };
        match message {
            Some(message @ (Message::Text(_) | Message::Binary(_))) => {
                received.fetch_add(1, Ordering::Relaxed);
                tx.send(message).await?;
            }
            Some(Message::Ping(data)) => tx.send(Message::Pong(data)).await?,
            Some(Message::Pong(_)) => {}
            Some(Message::Close(frame)) => {
                let echo = frame
                    .map(|cf| Message::close(cf.code, cf.reason))
                    .unwrap_or(Message::Close(None));
                return tx.send(echo).await;
            }
            None => return Ok(()),
        }
    }
}

/// Address helper for tests: `ws://<addr>`.
#[must_use]
pub fn ws_url(addr: SocketAddr) -> String {
    format!("ws://{addr}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::connect;

    #[tokio::test]
    async fn test_echoes_and_counts() {
        let received = Arc::new(AtomicUsize::new(0));
        let server = spawn_with_counter(received.clone()).await.unwrap();
        let mut conn = connect(&ws_url(server.local_addr()), Config::client())
            .await
            .unwrap();

        conn.send(Message::text("hello")).await.unwrap();
        conn.send(Message::binary(vec![1, 2, 3])).await.unwrap();
        assert_eq!(conn.recv().await.unwrap(), Some(Message::text("hello")));
        assert_eq!(
            conn.recv().await.unwrap(),
            Some(Message::binary(vec![1, 2, 3]))
        );
        assert_eq!(received.load(Ordering::Relaxed), 2);

        conn.close(CloseCode::Normal, "").await.unwrap();
        assert!(matches!(conn.recv().await.unwrap(), Some(Message::Close(_))));
        server.close().await;
    }

    #[tokio::test]
    async fn test_close_notifies_open_clients() {
        let server = spawn().await.unwrap();
        let mut conn = connect(&ws_url(server.local_addr()), Config::client())
            .await
            .unwrap();
        conn.send(Message::text("x")).await.unwrap();
        assert_eq!(conn.recv().await.unwrap(), Some(Message::text("x")));

        let closing = tokio::spawn(server.close());
        let msg = conn.recv().await.unwrap();
        assert!(matches!(
            msg,
            Some(Message::Close(Some(ref cf))) if cf.code == CloseCode::GoingAway
        ));
        closing.await.unwrap();
    }
}
