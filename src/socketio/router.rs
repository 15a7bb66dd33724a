//! Event name → handler table.

use std::collections::HashMap;
use std::fmt;

use serde_json::Value;
use tracing::debug;

use crate::error::Result;
use crate::socketio::socket::{AckSender, SocketRef};

/// Event handler. Runs inline in the socket's read loop, so whatever it
/// emits is queued before the next packet from that socket is looked at.
pub type Handler = Box<dyn Fn(&SocketRef, Vec<Value>, Option<AckSender>) -> Result<()> + Send + Sync>;

#[derive(Default)]
pub struct Router {
    handlers: HashMap<String, Handler>,
}

impl Router {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `event`, replacing any earlier one.
    #[must_use]
    pub fn on<F>(mut self, event: &str, handler: F) -> Self
    where
        F: Fn(&SocketRef, Vec<Value>, Option<AckSender>) -> Result<()> + Send + Sync + 'static,
    {
        self.handlers.insert(event.to_string(), Box::new(handler));
        self
    }

    #[must_use]
    pub fn handles(&self, event: &str) -> bool {
        self.handlers.contains_key(event)
    }

    /// Run the handler for `event`. Returns `Ok(false)` if none is
    /// registered; the event is dropped.
    ///
    /// # Errors
    ///
    /// Whatever the handler returns.
    pub fn dispatch(
        &self,
        socket: &SocketRef,
        event: &str,
        args: Vec<Value>,
        ack: Option<AckSender>,
    ) -> Result<bool> {
        match self.handlers.get(event) {
            Some(handler) => {
                handler(socket, args, ack)?;
                Ok(true)
            }
            None => {
                debug!(sid = socket.id(), event, "no handler registered, dropping event");
                Ok(false)
            }
        }
    }
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut events: Vec<_> = self.handlers.keys().collect();
        events.sort();
        f.debug_struct("Router").field("events", &events).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::engineio::Session;
    use crate::error::Error;
    use crate::socketio::channels::Channels;
    use serde_json::json;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn socket() -> (SocketRef, Session) {
        let session = Session::new(EngineConfig::default()).unwrap();
        let socket = SocketRef::new("s1", session.outbox(), Channels::new());
        (socket, session)
    }

    #[test]
    fn test_dispatch_registered_handler() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        let router = Router::new().on("ping", move |_, args, ack| {
            assert_eq!(args, vec![json!(1)]);
            assert!(ack.is_none());
            seen.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        let (socket, _session) = socket();

        assert!(router.handles("ping"));
        assert!(router.dispatch(&socket, "ping", vec![json!(1)], None).unwrap());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unregistered_event_is_dropped() {
        let router = Router::new();
        let (socket, _session) = socket();
        assert!(!router.dispatch(&socket, "nope", vec![], None).unwrap());
    }

    #[test]
    fn test_handler_error_propagates() {
        let router = Router::new().on("bad", |_, _, _| Err(Error::InvalidPacket("bad".into())));
        let (socket, _session) = socket();
        assert!(router.dispatch(&socket, "bad", vec![], None).is_err());
    }

    #[test]
    fn test_debug_lists_events() {
        let router = Router::new().on("b", |_, _, _| Ok(())).on("a", |_, _, _| Ok(()));
        assert_eq!(format!("{router:?}"), r#"Router { events: ["a", "b"] }"#);
    }
}
