//! Ownership of a spawned listener and its connection tasks.

use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

use crate::error::Result;

/// How long `close` waits for connection tasks before aborting them.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// A running server.
///
/// [`ServerHandle::close`] stops accepting, tells every connection to shut
/// down and waits for them. Dropping an unclosed handle aborts the server
/// instead, so the listener never outlives its owner.
#[derive(Debug)]
pub struct ServerHandle {
    local_addr: SocketAddr,
    shutdown: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl ServerHandle {
    /// Run an accept loop on `listener`, handing each stream to
    /// `on_connection` together with a shutdown signal it should watch.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Io`] if the listener has no local address.
    pub fn spawn<F, Fut>(listener: TcpListener, on_connection: F) -> Result<Self>
    where
        F: Fn(TcpStream, SocketAddr, watch::Receiver<bool>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let local_addr = listener.local_addr()?;
        let (shutdown, signal) = watch::channel(false);
        let task = tokio::spawn(accept_loop(listener, on_connection, signal));
        Ok(Self {
            local_addr,
            shutdown,
            task: Some(task),
        })
    }

    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    #[must_use]
    pub fn port(&self) -> u16 {
        self.local_addr.port()
    }

    /// Whether the accept loop has exited.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Stop accepting and wait until every connection task is done.
    pub async fn close(mut self) {
        let _ = self.shutdown.send(true);
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                error!(error = %e, "server task failed");
            }
        }
        info!(addr = %self.local_addr, "server closed");
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            let _ = self.shutdown.send(true);
            task.abort();
            debug!(addr = %self.local_addr, "server dropped without close, aborted");
        }
    }
}

async fn accept_loop<F, Fut>(listener: TcpListener, on_connection: F, mut shutdown: watch::Receiver<bool>)
where
    F: Fn(TcpStream, SocketAddr, watch::Receiver<bool>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let mut connections = JoinSet::new();
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    debug!(peer = %peer, "accepted connection");
                    let _ = stream.set_nodelay(true);
                    connections.spawn(on_connection(stream, peer, shutdown.clone()));
                }
                Err(e) => {
                    warn!(error = %e, "accept failed");
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
            },
            Some(finished) = connections.join_next(), if !connections.is_empty() => {
                if let Err(e) = finished {
                    if e.is_panic() {
                        error!(error = %e, "connection task panicked");
                    }
                }
            }
        }
    }
    drop(listener);

    let drain = async {
        while connections.join_next().await.is_some() {}
    };
    if tokio::time::timeout(DRAIN_TIMEOUT, drain).await.is_err() {
        warn!(remaining = connections.len(), "aborting connections after drain timeout");
        connections.abort_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    async fn echo_once(mut stream: TcpStream, _peer: SocketAddr, _shutdown: watch::Receiver<bool>) {
        let mut buf = [0u8; 16];
        if let Ok(n) = stream.read(&mut buf).await {
            let _ = stream.write_all(&buf[..n]).await;
        }
    }

    #[tokio::test]
    async fn test_serves_then_stops_listening() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let server = ServerHandle::spawn(listener, echo_once).unwrap();
        let addr = server.local_addr();
        assert_ne!(server.port(), 0);

        let mut client = TcpStream::connect(addr).await.unwrap();
        client.write_all(b"hi").await.unwrap();
        let mut buf = [0u8; 2];
        client.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"hi");

        server.close().await;
        assert!(TcpStream::connect(addr).await.is_err());
    }

    #[tokio::test]
    async fn test_close_signals_connections() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let server = ServerHandle::spawn(listener, |_stream, _peer, mut shutdown| async move {
            let _ = shutdown.changed().await;
        })
        .unwrap();
        let _client = TcpStream::connect(server.local_addr()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!server.is_finished());
        tokio::time::timeout(Duration::from_secs(1), server.close())
            .await
            .unwrap();
    }
}
