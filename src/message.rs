//! WebSocket messages and close codes (RFC 6455 Section 7.4).

/// Close status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[non_exhaustive]
pub enum CloseCode {
    /// 1000: the purpose of the connection has been fulfilled.
    #[default]
    Normal,
    /// 1001: endpoint is going away, e.g. server shutdown.
    GoingAway,
    /// 1002: protocol error.
    ProtocolError,
    /// 1003: data type the endpoint cannot accept.
    UnsupportedData,
    /// 1007: payload inconsistent with the message type.
    InvalidPayload,
    /// 1008: policy violation.
    PolicyViolation,
    /// 1009: message too big to process.
    MessageTooBig,
    /// 1011: unexpected server condition.
    InternalError,
    /// Any other code.
    Other(u16),
}

impl CloseCode {
    #[must_use]
    pub const fn from_u16(code: u16) -> Self {
        match code {
            1000 => CloseCode::Normal,
            1001 => CloseCode::GoingAway,
            1002 => CloseCode::ProtocolError,
            1003 => CloseCode::UnsupportedData,
            1007 => CloseCode::InvalidPayload,
            1008 => CloseCode::PolicyViolation,
            1009 => CloseCode::MessageTooBig,
            1011 => CloseCode::InternalError,
            other => CloseCode::Other(other),
        }
    }

    #[must_use]
    pub const fn as_u16(&self) -> u16 {
        match self {
            CloseCode::Normal => 1000,
            CloseCode::GoingAway => 1001,
            CloseCode::ProtocolError => 1002,
            CloseCode::UnsupportedData => 1003,
            CloseCode::InvalidPayload => 1007,
            CloseCode::PolicyViolation => 1008,
            CloseCode::MessageTooBig => 1009,
            CloseCode::InternalError => 1011,
            CloseCode::Other(code) => *code,
        }
    }

    /// Codes 1004-1006 and 1015 must never appear in a close frame.
    #[must_use]
    pub const fn is_reserved(&self) -> bool {
        matches!(self.as_u16(), 1004..=1006 | 1015)
    }
}

/// Status code and reason carried by a close frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseFrame {
    pub code: CloseCode,
    /// UTF-8 reason, at most 123 bytes on the wire.
    pub reason: String,
}

impl CloseFrame {
    #[must_use]
    pub fn new(code: CloseCode, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }

    /// Decode a close payload. An empty payload carries no status.
    #[must_use]
    pub fn from_payload(payload: &[u8]) -> Option<Self> {
        match payload {
            [] => None,
            [hi, lo, reason @ ..] => {
                let code = u16::from_be_bytes([*hi, *lo]);
                Some(match std::str::from_utf8(reason) {
                    Ok(reason) => CloseFrame::new(CloseCode::from_u16(code), reason),
                    Err(_) => CloseFrame::new(CloseCode::InvalidPayload, ""),
                })
            }
            [_] => Some(CloseFrame::new(
                CloseCode::ProtocolError,
                "Invalid close frame",
            )),
        }
    }
}

/// A complete WebSocket message.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Message {
    Text(String),
    Binary(Vec<u8>),
    Ping(Vec<u8>),
    Pong(Vec<u8>),
    Close(Option<CloseFrame>),
}

impl Message {
    #[must_use]
    pub fn text(s: impl Into<String>) -> Self {
        Message::Text(s.into())
    }

    #[must_use]
    pub fn binary(data: impl Into<Vec<u8>>) -> Self {
        Message::Binary(data.into())
    }

    #[must_use]
    pub fn close(code: CloseCode, reason: impl Into<String>) -> Self {
        Message::Close(Some(CloseFrame::new(code, reason)))
    }

    #[must_use]
    pub const fn is_text(&self) -> bool {
        matches!(self, Message::Text(_))
    }

    #[must_use]
    pub const fn is_data(&self) -> bool {
        matches!(self, Message::Text(_) | Message::Binary(_))
    }

    #[must_use]
    pub const fn is_control(&self) -> bool {
        matches!(
            self,
            Message::Ping(_) | Message::Pong(_) | Message::Close(_)
        )
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Message::Text(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn into_text(self) -> Option<String> {
        match self {
            Message::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Raw payload bytes as they go on the wire.
    #[must_use]
    pub fn payload(&self) -> Vec<u8> {
        match self {
            Message::Text(s) => s.as_bytes().to_vec(),
            Message::Binary(d) | Message::Ping(d) | Message::Pong(d) => d.clone(),
            Message::Close(Some(cf)) => {
                let mut data = cf.code.as_u16().to_be_bytes().to_vec();
                data.extend_from_slice(cf.reason.as_bytes());
                data
            }
            Message::Close(None) => Vec::new(),
        }
    }
}
