//! Socket.IO target that echoes event arguments back, for driving client
//! tests against a known peer.
//!
//! Events:
//!
//! - `join(channel)`: joins `channel` and greets the caller with
//!   `new_user_join("Welcome to <channel>")`
//! - `message(channel, ...payload)`: sends `message_response(channel,
//!   ...payload)` to every member of `channel`
//! - `new_server_version(m1, m2, ack)`: acknowledges with `(m1, m2)`
//!
//! Plain HTTP requests get `404 No http pages here`.

use serde_json::Value;
use tokio::net::ToSocketAddrs;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::error::Result;
use crate::http::Response;
use crate::server_handle::ServerHandle;
use crate::socketio::{AckSender, Router, SocketIoServer, SocketRef};

pub const DEFAULT_PORT: u16 = 9096;

pub const NOT_FOUND_BODY: &str = "No http pages here";

fn channel_arg<'a>(event: &str, socket: &SocketRef, args: &'a [Value]) -> Option<&'a str> {
    match args.first() {
        Some(Value::String(channel)) => Some(channel),
        other => {
            warn!(sid = socket.id(), event, channel = ?other, "channel must be a string, dropping");
            None
        }
    }
}

fn on_join(socket: &SocketRef, args: Vec<Value>, _ack: Option<AckSender>) -> Result<()> {
    let Some(channel) = channel_arg("join", socket, &args) else {
        return Ok(());
    };
    socket.join(channel);
    socket.emit(
        "new_user_join",
        vec![Value::String(format!("Welcome to {channel}"))],
    )
}

fn on_message(socket: &SocketRef, args: Vec<Value>, _ack: Option<AckSender>) -> Result<()> {
    let Some(channel) = channel_arg("message", socket, &args).map(str::to_owned) else {
        return Ok(());
    };
    let payload = Value::Array(args[1..].to_vec());
    info!(channel = %channel, payload = %payload, "message");
    let delivered = socket.to(&channel).emit("message_response", args);
    debug!(channel = %channel, delivered, "message_response broadcast");
    Ok(())
}

fn on_new_server_version(socket: &SocketRef, args: Vec<Value>, ack: Option<AckSender>) -> Result<()> {
    let Some(ack) = ack else {
        debug!(sid = socket.id(), "new_server_version without ack, ignoring");
        return Ok(());
    };
    let mut args = args.into_iter();
    let first = args.next().unwrap_or(Value::Null);
    let second = args.next().unwrap_or(Value::Null);
    ack.send(vec![first, second])
}

/// Handler table of the echo target.
#[must_use]
pub fn router() -> Router {
    Router::new()
        .on("join", on_join)
        .on("message", on_message)
        .on("new_server_version", on_new_server_version)
}

#[must_use]
pub fn server(config: EngineConfig) -> SocketIoServer {
    SocketIoServer::new(router())
        .with_config(config)
        .with_fallback(Response::not_found(NOT_FOUND_BODY))
}

/// Bind `addr` and serve until the handle is closed.
///
/// # Errors
///
/// Returns [`crate::Error::Io`] if the address cannot be bound.
pub async fn spawn(addr: impl ToSocketAddrs, config: EngineConfig) -> Result<ServerHandle> {
    let handle = server(config).bind(addr).await?;
    info!("Socket.io Args Server listening on {}", handle.port());
    Ok(handle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_router_registers_events() {
        let router = router();
        assert!(router.handles("join"));
        assert!(router.handles("message"));
        assert!(router.handles("new_server_version"));
        assert!(!router.handles("connection"));
    }
}
