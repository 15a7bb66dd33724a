//! Error types shared by the WebSocket core, the Engine.IO/Socket.IO layers
//! and the scenario runner.

use thiserror::Error;

/// Result type alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by transport, protocol and fixture code.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// Invalid frame structure or header.
    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    /// WebSocket protocol violation detected.
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    /// Invalid UTF-8 in a text frame or packet.
    #[error("Invalid UTF-8 in text payload")]
    InvalidUtf8,

    /// Frame size exceeds configured maximum.
    #[error("Frame too large: {size} bytes (max: {max})")]
    FrameTooLarge {
        /// Actual frame size.
        size: usize,
        /// Maximum allowed size.
        max: usize,
    },

    /// Message size exceeds configured maximum.
    #[error("Message too large: {size} bytes (max: {max})")]
    MessageTooLarge {
        /// Actual message size.
        size: usize,
        /// Maximum allowed size.
        max: usize,
    },

    /// Too many fragments in a single message.
    #[error("Too many fragments: {count} (max: {max})")]
    TooManyFragments {
        /// Actual fragment count.
        count: usize,
        /// Maximum allowed fragments.
        max: usize,
    },

    /// Declared payload length does not fit in `usize`.
    #[error("Payload length {size} exceeds platform maximum {max}")]
    PayloadTooLargeForPlatform {
        /// Declared length.
        size: u64,
        /// Platform maximum.
        max: u64,
    },

    /// Connection has been closed.
    #[error("Connection closed: {0:?}")]
    ConnectionClosed(Option<u16>),

    /// Invalid WebSocket or HTTP handshake.
    #[error("Invalid handshake: {0}")]
    InvalidHandshake(String),

    /// Handshake head exceeds the configured limit.
    #[error("Handshake too large: {size} bytes (max: {max})")]
    HandshakeTooLarge {
        /// Bytes read so far.
        size: usize,
        /// Maximum allowed size.
        max: usize,
    },

    /// A header value would break the response framing.
    #[error("Invalid value for header {header}: {reason}")]
    InvalidHeaderValue {
        /// Header name.
        header: String,
        /// Why the value was rejected.
        reason: String,
    },

    /// I/O error occurred.
    #[error("I/O error: {0}")]
    Io(String),

    /// Invalid close code.
    #[error("Invalid close code: {0}")]
    InvalidCloseCode(u16),

    /// Reserved opcode used.
    #[error("Reserved opcode: {0:#x}")]
    ReservedOpcode(u8),

    /// Invalid opcode value.
    #[error("Invalid opcode: {0:#x}")]
    InvalidOpcode(u8),

    /// Control frame fragmented.
    #[error("Control frames cannot be fragmented")]
    FragmentedControlFrame,

    /// Control frame payload larger than 125 bytes.
    #[error("Control frame payload too large: {0} bytes (max: 125)")]
    ControlFrameTooLarge(usize),

    /// Unmasked frame received by a server.
    #[error("Client frame must be masked")]
    UnmaskedClientFrame,

    /// Masked frame received by a client.
    #[error("Server frame must not be masked")]
    MaskedServerFrame,

    /// Reserved bits set without a negotiated extension.
    #[error("Reserved bits set without negotiated extension")]
    ReservedBitsSet,

    /// Incomplete frame data.
    #[error("Incomplete frame: need {needed} more bytes")]
    IncompleteFrame {
        /// Number of additional bytes needed.
        needed: usize,
    },

    /// Malformed Engine.IO or Socket.IO packet.
    #[error("Invalid packet: {0}")]
    InvalidPacket(String),

    /// Binary attachments are not supported.
    #[error("Binary packets are not supported")]
    UnsupportedBinary,

    /// Packet addressed to a namespace the server does not serve.
    #[error("Unknown namespace: {0}")]
    UnknownNamespace(String),

    /// Packet that is valid on the wire but not expected at this point.
    #[error("Unexpected packet: {0}")]
    UnexpectedPacket(String),

    /// Server refused the namespace connection.
    #[error("Connect error: {0}")]
    ConnectError(String),

    /// No acknowledgement arrived for the given ack id.
    #[error("Acknowledgement {0} timed out")]
    AckTimeout(u64),

    /// An operation did not complete in time.
    #[error("Timed out: {0}")]
    Timeout(String),

    /// JSON encoding or decoding failed.
    #[error("JSON error: {0}")]
    Json(String),

    /// Scenario descriptor is malformed.
    #[error("Invalid scenario: {0}")]
    InvalidScenario(String),

    /// Scenario target URL is not usable.
    #[error("Invalid target: {0}")]
    InvalidTarget(String),

    /// Scenario asks for an engine the runner does not have.
    #[error("Unsupported engine: {0}")]
    UnsupportedEngine(String),

    /// A spawned task was cancelled before it finished.
    #[error("Task failed: {0}")]
    TaskFailed(String),
}

impl Error {
    /// Whether the error means the peer went away rather than misbehaved.
    #[must_use]
    pub const fn is_disconnect(&self) -> bool {
        matches!(self, Error::ConnectionClosed(_) | Error::Io(_))
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}

impl From<std::str::Utf8Error> for Error {
    fn from(_: std::str::Utf8Error) -> Self {
        Error::InvalidUtf8
    }
}

impl From<std::string::FromUtf8Error> for Error {
    fn from(_: std::string::FromUtf8Error) -> Self {
        Error::InvalidUtf8
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Json(err.to_string())
    }
}

impl From<tokio::time::error::Elapsed> for Error {
    fn from(err: tokio::time::error::Elapsed) -> Self {
        Error::Timeout(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::MessageTooLarge {
            size: 2_000_000,
            max: 1_000_000,
        };
        assert_eq!(
            err.to_string(),
            "Message too large: 2000000 bytes (max: 1000000)"
        );
        assert_eq!(
            Error::UnknownNamespace("/admin".into()).to_string(),
            "Unknown namespace: /admin"
        );
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe broken");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
        assert!(err.is_disconnect());
    }

    #[test]
    fn test_error_from_json() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Json(_)));
        assert!(!err.is_disconnect());
    }

    #[test]
    fn test_error_clone() {
        let err = Error::AckTimeout(7);
        assert_eq!(err.clone(), err);
    }
}
