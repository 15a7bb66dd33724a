//! Channel membership and per-socket outboxes for one server instance.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::debug;

use crate::engineio::Outbox;

#[derive(Debug, Default)]
struct Registry {
    outboxes: HashMap<String, Outbox>,
    channels: HashMap<String, BTreeSet<String>>,
}

/// Shared registry: socket id → outbox, channel → member socket ids.
///
/// Cloning is cheap; every clone sees the same state.
#[derive(Debug, Clone, Default)]
pub struct Channels {
    inner: Arc<Mutex<Registry>>,
}

impl Channels {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Registry> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn register(&self, sid: &str, outbox: Outbox) {
        self.lock().outboxes.insert(sid.to_string(), outbox);
    }

    /// Adds `sid` to `channel`. Joining twice is a no-op.
    pub fn join(&self, channel: &str, sid: &str) {
        self.lock()
            .channels
            .entry(channel.to_string())
            .or_default()
            .insert(sid.to_string());
    }

    /// Drop the socket from every channel and forget its outbox.
    pub fn leave_all(&self, sid: &str) {
        let mut registry = self.lock();
        registry.outboxes.remove(sid);
        registry.channels.retain(|_, members| {
            members.remove(sid);
            !members.is_empty()
        });
    }

    /// Member socket ids of `channel`, sorted.
    #[must_use]
    pub fn members(&self, channel: &str) -> Vec<String> {
        self.lock()
            .channels
            .get(channel)
            .map(|members| members.iter().cloned().collect())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn is_member(&self, channel: &str, sid: &str) -> bool {
        self.lock()
            .channels
            .get(channel)
            .is_some_and(|members| members.contains(sid))
    }

    /// Number of registered sockets.
    #[must_use]
    pub fn socket_count(&self) -> usize {
        self.lock().outboxes.len()
    }

    /// Queue an already encoded Engine.IO message payload for every member of
    /// `channel`. Returns how many sockets it was queued for.
    pub fn broadcast(&self, channel: &str, payload: &str) -> usize {
        let registry = self.lock();
        let Some(members) = registry.channels.get(channel) else {
            return 0;
        };
        let mut delivered = 0;
        for sid in members {
            match registry.outboxes.get(sid) {
                Some(outbox) if outbox.message(payload).is_ok() => delivered += 1,
                _ => debug!(sid = %sid, channel, "skipping closed socket"),
            }
        }
        delivered
    }
}
