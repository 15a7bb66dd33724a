//! Configuration for WebSocket connections and Engine.IO sessions.

use std::time::Duration;

use crate::error::{Error, Result};

/// Resource limits applied to a WebSocket connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Limits {
    /// Maximum size of a single frame in bytes.
    ///
    /// Default: 16 MB
    pub max_frame_size: usize,

    /// Maximum size of a reassembled message in bytes.
    ///
    /// Default: 64 MB
    pub max_message_size: usize,

    /// Maximum number of fragments in a single message.
    ///
    /// Default: 128
    pub max_fragment_count: usize,

    /// Maximum size of the HTTP upgrade head in bytes.
    ///
    /// Default: 8 KB
    pub max_handshake_size: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_frame_size: 16 * 1024 * 1024,
            max_message_size: 64 * 1024 * 1024,
            max_fragment_count: 128,
            max_handshake_size: 8192,
        }
    }
}

impl Limits {
    /// Create limits with custom values.
    #[must_use]
    pub const fn new(
        max_frame_size: usize,
        max_message_size: usize,
        max_fragment_count: usize,
        max_handshake_size: usize,
    ) -> Self {
        Self {
            max_frame_size,
            max_message_size,
            max_fragment_count,
            max_handshake_size,
        }
    }

    /// Tight limits for fixtures that only ever see small payloads.
    ///
    /// - Max frame: 64 KB
    /// - Max message: 256 KB
    /// - Max fragments: 16
    /// - Max handshake: 4 KB
    #[must_use]
    pub const fn embedded() -> Self {
        Self {
            max_frame_size: 64 * 1024,
            max_message_size: 256 * 1024,
            max_fragment_count: 16,
            max_handshake_size: 4096,
        }
    }

    /// # Errors
    ///
    /// Returns [`Error::MessageTooLarge`] if `size` exceeds the maximum.
    pub const fn check_message_size(&self, size: usize) -> Result<()> {
        if size > self.max_message_size {
            Err(Error::MessageTooLarge {
                size,
                max: self.max_message_size,
            })
        } else {
            Ok(())
        }
    }

    /// # Errors
    ///
    /// Returns [`Error::FrameTooLarge`] if `size` exceeds the maximum.
    pub const fn check_frame_size(&self, size: usize) -> Result<()> {
        if size > self.max_frame_size {
            Err(Error::FrameTooLarge {
                size,
                max: self.max_frame_size,
            })
        } else {
            Ok(())
        }
    }

    /// # Errors
    ///
    /// Returns [`Error::TooManyFragments`] if `count` exceeds the maximum.
    pub const fn check_fragment_count(&self, count: usize) -> Result<()> {
        if count > self.max_fragment_count {
            Err(Error::TooManyFragments {
                count,
                max: self.max_fragment_count,
            })
        } else {
            Ok(())
        }
    }

    /// # Errors
    ///
    /// Returns [`Error::HandshakeTooLarge`] if `size` exceeds the maximum.
    pub const fn check_handshake_size(&self, size: usize) -> Result<()> {
        if size > self.max_handshake_size {
            Err(Error::HandshakeTooLarge {
                size,
                max: self.max_handshake_size,
            })
        } else {
            Ok(())
        }
    }
}

/// Timeouts for connection setup and I/O.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timeouts {
    /// Maximum time to complete the upgrade handshake.
    ///
    /// Default: 10 seconds
    pub handshake: Duration,

    /// Maximum time to wait for one incoming message.
    ///
    /// Default: 60 seconds
    pub read: Duration,

    /// Maximum time for a write to drain.
    ///
    /// Default: 60 seconds
    pub write: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            handshake: Duration::from_secs(10),
            read: Duration::from_secs(60),
            write: Duration::from_secs(60),
        }
    }
}

impl Timeouts {
    #[must_use]
    pub const fn new(handshake: Duration, read: Duration, write: Duration) -> Self {
        Self {
            handshake,
            read,
            write,
        }
    }
}

/// WebSocket connection configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Resource limits.
    pub limits: Limits,

    /// Outgoing messages larger than this are split into continuation frames.
    ///
    /// Default: 16 KB
    pub fragment_size: usize,

    /// Accept unmasked frames from clients (server only, testing aid).
    ///
    /// Default: false
    pub accept_unmasked_frames: bool,

    /// Initial capacity of the read buffer.
    ///
    /// Default: 8 KB
    pub read_buffer_size: usize,

    /// Initial capacity of the write buffer.
    ///
    /// Default: 8 KB
    pub write_buffer_size: usize,

    pub timeouts: Timeouts,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            limits: Limits::default(),
            fragment_size: 16 * 1024,
            accept_unmasked_frames: false,
            read_buffer_size: 8192,
            write_buffer_size: 8192,
            timeouts: Timeouts::default(),
        }
    }
}

impl Config {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    #[must_use]
    pub const fn with_fragment_size(mut self, size: usize) -> Self {
        self.fragment_size = size;
        self
    }

    #[must_use]
    pub const fn with_read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size;
        self
    }

    #[must_use]
    pub const fn with_write_buffer_size(mut self, size: usize) -> Self {
        self.write_buffer_size = size;
        self
    }

    #[must_use]
    pub const fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Server preset: client frames must arrive masked.
    #[must_use]
    pub fn server() -> Self {
        Self {
            accept_unmasked_frames: false,
            ..Default::default()
        }
    }

    /// Client preset.
    #[must_use]
    pub fn client() -> Self {
        Self::default()
    }
}

/// Engine.IO session parameters, advertised to clients in the open packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// How often the server pings the client.
    ///
    /// Default: 25 seconds
    pub ping_interval: Duration,

    /// How long the server waits for a pong before dropping the session.
    ///
    /// Default: 20 seconds
    pub ping_timeout: Duration,

    /// Largest packet payload accepted, in bytes.
    ///
    /// Default: 1 000 000
    pub max_payload: usize,

    /// How long a client waits for an acknowledgement.
    ///
    /// Default: 5 seconds
    pub ack_timeout: Duration,

    /// Transport settings for the underlying WebSocket.
    pub websocket: Config,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            ping_interval: Duration::from_millis(25_000),
            ping_timeout: Duration::from_millis(20_000),
            max_payload: 1_000_000,
            ack_timeout: Duration::from_secs(5),
            websocket: Config::default(),
        }
    }
}

impl EngineConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn with_ping_interval(mut self, interval: Duration) -> Self {
        self.ping_interval = interval;
        self
    }

    #[must_use]
    pub const fn with_ping_timeout(mut self, timeout: Duration) -> Self {
        self.ping_timeout = timeout;
        self
    }

    #[must_use]
    pub const fn with_max_payload(mut self, max: usize) -> Self {
        self.max_payload = max;
        self
    }

    #[must_use]
    pub const fn with_ack_timeout(mut self, timeout: Duration) -> Self {
        self.ack_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_websocket(mut self, websocket: Config) -> Self {
        self.websocket = websocket;
        self
    }
}
