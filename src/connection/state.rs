//! Endpoint role and close-handshake state (RFC 6455 Sections 5.3 and 7).

use std::fmt;

/// Which end of the connection we are. Decides masking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Client,
    Server,
}

impl Role {
    /// Clients mask every frame they send.
    #[inline]
    #[must_use]
    pub const fn must_mask(&self) -> bool {
        matches!(self, Role::Client)
    }

    /// Servers only accept masked frames.
    #[inline]
    #[must_use]
    pub const fn expects_masked(&self) -> bool {
        matches!(self, Role::Server)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Role::Client => "client",
            Role::Server => "server",
        })
    }
}

/// Lifecycle of an upgraded connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[non_exhaustive]
pub enum ConnectionState {
    #[default]
    Open,
    /// We sent a close frame and wait for the peer's.
    Closing,
    Closed,
}

impl ConnectionState {
    #[inline]
    #[must_use]
    pub const fn can_send(&self) -> bool {
        matches!(self, ConnectionState::Open)
    }

    #[inline]
    #[must_use]
    pub const fn can_receive(&self) -> bool {
        matches!(self, ConnectionState::Open | ConnectionState::Closing)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ConnectionState::Open => "open",
            ConnectionState::Closing => "closing",
            ConnectionState::Closed => "closed",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_masking_rules() {
        assert!(Role::Client.must_mask());
        assert!(!Role::Client.expects_masked());
        assert!(!Role::Server.must_mask());
        assert!(Role::Server.expects_masked());
    }

    #[test]
    fn test_state_permissions() {
        assert!(ConnectionState::Open.can_send());
        assert!(ConnectionState::Open.can_receive());
        assert!(!ConnectionState::Closing.can_send());
        assert!(ConnectionState::Closing.can_receive());
        assert!(!ConnectionState::Closed.can_send());
        assert!(!ConnectionState::Closed.can_receive());
    }

    #[test]
    fn test_display() {
        assert_eq!(Role::Server.to_string(), "server");
        assert_eq!(ConnectionState::Closing.to_string(), "closing");
    }
}
