//! What an event handler can do with the connection that sent the event.

use std::sync::Arc;

use serde_json::Value;

use crate::engineio::Outbox;
use crate::error::Result;
use crate::socketio::channels::Channels;
use crate::socketio::packet::{DEFAULT_NAMESPACE, Packet};

/// Handle on one connected socket.
#[derive(Debug, Clone)]
pub struct SocketRef {
    id: Arc<str>,
    outbox: Outbox,
    channels: Channels,
}

impl SocketRef {
    pub(crate) fn new(id: impl Into<Arc<str>>, outbox: Outbox, channels: Channels) -> Self {
        Self {
            id: id.into(),
            outbox,
            channels,
        }
    }

    /// Socket id sent to the client in the connect reply.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Emit an event to this socket only.
    ///
    /// # Errors
    ///
    /// [`crate::Error::ConnectionClosed`] if the socket is gone.
    pub fn emit(&self, event: &str, args: Vec<Value>) -> Result<()> {
        self.outbox
            .message(Packet::event(DEFAULT_NAMESPACE, event, args).encode())
    }

    pub fn join(&self, channel: &str) {
        self.channels.join(channel, &self.id);
    }

    /// Every current member of `channel`, this socket included if it joined.
    #[must_use]
    pub fn to(&self, channel: &str) -> BroadcastOperator {
        BroadcastOperator {
            channels: self.channels.clone(),
            channel: channel.to_string(),
        }
    }

    #[must_use]
    pub fn channels(&self) -> &Channels {
        &self.channels
    }
}

/// Emits to the members of one channel.
#[derive(Debug, Clone)]
pub struct BroadcastOperator {
    channels: Channels,
    channel: String,
}

impl BroadcastOperator {
    /// Returns the number of sockets the event was queued for.
    pub fn emit(&self, event: &str, args: Vec<Value>) -> usize {
        let payload = Packet::event(DEFAULT_NAMESPACE, event, args).encode();
        self.channels.broadcast(&self.channel, &payload)
    }
}

/// Answers one event's ack id. Consumed on use, so it can only answer once.
#[derive(Debug)]
pub struct AckSender {
    id: u64,
    outbox: Outbox,
}

impl AckSender {
    pub(crate) fn new(id: u64, outbox: Outbox) -> Self {
        Self { id, outbox }
    }

    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// # Errors
    ///
    /// [`crate::Error::ConnectionClosed`] if the socket is gone.
    pub fn send(self, args: Vec<Value>) -> Result<()> {
        self.outbox
            .message(Packet::ack(DEFAULT_NAMESPACE, self.id, args).encode())
    }
}
