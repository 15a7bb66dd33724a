//! Turning a plain stream into a [`Connection`] on either side.

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;
use url::Url;

use crate::config::Config;
use crate::connection::{Connection, Role};
use crate::error::{Error, Result};
use crate::http::{RequestHead, Response, read_head};
use crate::protocol::handshake::generate_key;
use crate::protocol::{HandshakeRequest, HandshakeResponse};

/// Open a client connection to a `ws://` URL.
///
/// The whole dial and handshake is bounded by `config.timeouts.handshake`.
///
/// # Errors
///
/// - [`Error::InvalidTarget`] for unparseable URLs or non-`ws` schemes
/// - [`Error::Timeout`] if the handshake does not finish in time
/// - handshake and I/O errors
pub async fn connect(target: &str, config: Config) -> Result<Connection<TcpStream>> {
    let url = Url::parse(target).map_err(|e| Error::InvalidTarget(format!("{target}: {e}")))?;
    match url.scheme() {
        "ws" => {}
        "wss" => return Err(Error::InvalidTarget("wss:// is not supported".into())),
        other => return Err(Error::InvalidTarget(format!("unsupported scheme {other}"))),
    }
    let host = url
        .host_str()
        .ok_or_else(|| Error::InvalidTarget(format!("{target}: missing host")))?
        .to_string();
    let port = url.port_or_known_default().unwrap_or(80);
    let host_header = match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.clone(),
    };
    let mut path = url.path().to_string();
    if let Some(query) = url.query() {
        path.push('?');
        path.push_str(query);
    }

    tokio::time::timeout(config.timeouts.handshake, async move {
        let stream = TcpStream::connect((host.as_str(), port)).await?;
        stream.set_nodelay(true)?;
        debug!(%host, port, %path, "websocket dial");
        client_handshake(stream, host_header, path, config).await
    })
    .await?
}

/// Run the client side of the upgrade over an already connected stream.
///
/// # Errors
///
/// [`Error::InvalidHandshake`] if the server does not answer with a valid
/// `101`, or I/O errors.
pub async fn client_handshake<S>(
    mut io: S,
    host: String,
    path: String,
    config: Config,
) -> Result<Connection<S>>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let key = generate_key()?;
    let mut buf = Vec::new();
    HandshakeRequest::client(host, path, key.clone()).write(&mut buf)?;
    io.write_all(&buf).await?;
    io.flush().await?;

    let (head, leftover) = read_head(&mut io, config.limits.max_handshake_size).await?;
    HandshakeResponse::parse(&head)?.verify(&key)?;
    Ok(Connection::with_buffered(io, Role::Client, config, leftover))
}

/// Read a request head and upgrade it.
///
/// # Errors
///
/// See [`upgrade`].
pub async fn accept<S>(mut io: S, config: Config) -> Result<Connection<S>>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (head, leftover) = read_head(&mut io, config.limits.max_handshake_size).await?;
    let head = RequestHead::parse(&head)?;
    upgrade(io, &head, leftover, config).await
}

/// Answer an already parsed upgrade request with `101 Switching Protocols`.
///
/// Invalid requests get a `400` before the error is returned.
///
/// # Errors
///
/// [`Error::InvalidHandshake`] for bad upgrade requests, or I/O errors.
pub async fn upgrade<S>(
    mut io: S,
    head: &RequestHead,
    leftover: BytesMut,
    config: Config,
) -> Result<Connection<S>>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let request = match HandshakeRequest::from_head(head).and_then(|r| r.validate().map(|()| r)) {
        Ok(request) => request,
        Err(e) => {
            // Best effort; the handshake error is what matters.
            let _ = Response::new(400, "text/plain", e.to_string())
                .write_to(&mut io)
                .await;
            return Err(e);
        }
    };

    let mut buf = Vec::new();
    HandshakeResponse::from_request(&request).write(&mut buf)?;
    io.write_all(&buf).await?;
    io.flush().await?;
    Ok(Connection::with_buffered(io, Role::Server, config, leftover))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Message;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn test_client_and_server_handshake() {
        let (client_io, server_io) = tokio::io::duplex(4096);
        let server = tokio::spawn(async move {
            let mut conn = accept(server_io, Config::server()).await.unwrap();
            let msg = conn.recv().await.unwrap();
            conn.send(Message::text("pong")).await.unwrap();
            msg
        });

        let mut client = client_handshake(
            client_io,
            "localhost".into(),
            "/socket.io/?EIO=4&transport=websocket".into(),
            Config::client(),
        )
        .await
        .unwrap();
        client.send(Message::text("ping")).await.unwrap();
        assert_eq!(client.recv().await.unwrap(), Some(Message::text("pong")));
        assert_eq!(server.await.unwrap(), Some(Message::text("ping")));
    }

    #[tokio::test]
    async fn test_bad_upgrade_gets_400() {
        let (mut client_io, server_io) = tokio::io::duplex(4096);
        let server = tokio::spawn(accept(server_io, Config::server()));
        client_io
            .write_all(b"GET / HTTP/1.1\r\nHost: x\r\nUpgrade: websocket\r\nConnection: Upgrade\r\n\r\n")
            .await
            .unwrap();
        let result = server.await.unwrap();
        assert!(matches!(result, Err(Error::InvalidHandshake(_))));

        let mut reply = Vec::new();
        client_io.read_to_end(&mut reply).await.unwrap();
        assert!(reply.starts_with(b"HTTP/1.1 400"));
    }

    #[tokio::test]
    async fn test_connect_rejects_non_ws_targets() {
        assert!(matches!(
            connect("wss://localhost/", Config::client()).await,
            Err(Error::InvalidTarget(_))
        ));
        assert!(matches!(
            connect("http://localhost/", Config::client()).await,
            Err(Error::InvalidTarget(_))
        ));
        assert!(matches!(
            connect("not a url", Config::client()).await,
            Err(Error::InvalidTarget(_))
        ));
    }
}
