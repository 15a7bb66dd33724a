//! Engine.IO v4 packets over text WebSocket frames.
//!
//! A packet is a single type digit followed by its data: `2probe`, `4hello`,
//! `0{"sid":...}`.

use std::fmt;

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketType {
    Open,
    Close,
    Ping,
    Pong,
    Message,
    Upgrade,
    Noop,
}

impl PacketType {
    #[must_use]
    pub const fn as_char(&self) -> char {
        match self {
            PacketType::Open => '0',
            PacketType::Close => '1',
            PacketType::Ping => '2',
            PacketType::Pong => '3',
            PacketType::Message => '4',
            PacketType::Upgrade => '5',
            PacketType::Noop => '6',
        }
    }

    /// # Errors
    ///
    /// - [`Error::UnsupportedBinary`] for the `b` base64 prefix
    /// - [`Error::InvalidPacket`] for anything else outside `0`-`6`
    pub fn from_char(c: char) -> Result<Self> {
        Ok(match c {
            '0' => PacketType::Open,
            '1' => PacketType::Close,
            '2' => PacketType::Ping,
            '3' => PacketType::Pong,
            '4' => PacketType::Message,
            '5' => PacketType::Upgrade,
            '6' => PacketType::Noop,
            'b' => return Err(Error::UnsupportedBinary),
            other => {
                return Err(Error::InvalidPacket(format!(
                    "unknown engine.io packet type {other:?}"
                )));
            }
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub kind: PacketType,
    pub data: String,
}

impl Packet {
    #[must_use]
    pub fn new(kind: PacketType, data: impl Into<String>) -> Self {
        Self {
            kind,
            data: data.into(),
        }
    }

    /// # Errors
    ///
    /// Returns [`Error::Json`] if the handshake cannot be serialized.
    pub fn open(open: &OpenPacket) -> Result<Self> {
        Ok(Self::new(PacketType::Open, serde_json::to_string(open)?))
    }

    #[must_use]
    pub fn close() -> Self {
        Self::new(PacketType::Close, "")
    }

    #[must_use]
    pub fn ping(data: impl Into<String>) -> Self {
        Self::new(PacketType::Ping, data)
    }

    #[must_use]
    pub fn pong(data: impl Into<String>) -> Self {
        Self::new(PacketType::Pong, data)
    }

    #[must_use]
    pub fn message(data: impl Into<String>) -> Self {
        Self::new(PacketType::Message, data)
    }

    #[must_use]
    pub fn encode(&self) -> String {
        let mut out = String::with_capacity(1 + self.data.len());
        out.push(self.kind.as_char());
        out.push_str(&self.data);
        out
    }

    /// # Errors
    ///
    /// [`Error::InvalidPacket`] for an empty string or unknown type,
    /// [`Error::UnsupportedBinary`] for base64 binary packets.
    pub fn decode(text: &str) -> Result<Self> {
        let mut chars = text.chars();
        let first = chars
            .next()
            .ok_or_else(|| Error::InvalidPacket("empty engine.io packet".into()))?;
        Ok(Self::new(PacketType::from_char(first)?, chars.as_str()))
    }

    /// Decode the handshake carried by an open packet.
    ///
    /// # Errors
    ///
    /// [`Error::UnexpectedPacket`] for other packet types, [`Error::Json`] for
    /// a malformed handshake.
    pub fn into_open(self) -> Result<OpenPacket> {
        if self.kind != PacketType::Open {
            return Err(Error::UnexpectedPacket(format!(
                "expected open packet, got {self}"
            )));
        }
        Ok(serde_json::from_str(&self.data)?)
    }
}

impl fmt::Display for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.kind.as_char(), self.data)
    }
}

/// Handshake sent by the server as the first packet of a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenPacket {
    pub sid: String,
    pub upgrades: Vec<String>,
    pub ping_interval: u64,
    pub ping_timeout: u64,
    pub max_payload: u64,
}

impl OpenPacket {
    #[must_use]
    pub fn new(sid: impl Into<String>, config: &EngineConfig) -> Self {
        Self {
            sid: sid.into(),
            upgrades: Vec::new(),
            ping_interval: config.ping_interval.as_millis() as u64,
            ping_timeout: config.ping_timeout.as_millis() as u64,
            max_payload: config.max_payload as u64,
        }
    }
}

/// Random session id: 15 bytes, base64url without padding.
///
/// # Errors
///
/// Returns [`Error::Io`] if the OS random source fails.
pub fn generate_sid() -> Result<String> {
    let mut bytes = [0u8; 15];
    getrandom::getrandom(&mut bytes).map_err(|e| Error::Io(e.to_string()))?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_decode() {
        assert_eq!(Packet::ping("probe").encode(), "2probe");
        assert_eq!(Packet::close().encode(), "1");
        assert_eq!(
            Packet::decode("4hello world").unwrap(),
            Packet::message("hello world")
        );
        assert_eq!(Packet::decode("3").unwrap(), Packet::pong(""));
    }

    #[test]
    fn test_decode_rejects() {
        assert!(matches!(Packet::decode(""), Err(Error::InvalidPacket(_))));
        assert!(matches!(Packet::decode("9x"), Err(Error::InvalidPacket(_))));
        assert_eq!(Packet::decode("bAQI="), Err(Error::UnsupportedBinary));
    }

    #[test]
    fn test_open_packet_json() {
        let open = OpenPacket::new("abc", &EngineConfig::default());
        let packet = Packet::open(&open).unwrap();
        assert_eq!(
            packet.encode(),
            r#"0{"sid":"abc","upgrades":[],"pingInterval":25000,"pingTimeout":20000,"maxPayload":1000000}"#
        );
        assert_eq!(Packet::decode(&packet.encode()).unwrap().into_open().unwrap(), open);
    }

    #[test]
    fn test_into_open_wrong_type() {
        assert!(matches!(
            Packet::message("{}").into_open(),
            Err(Error::UnexpectedPacket(_))
        ));
    }

    #[test]
    fn test_sid_shape() {
        let sid = generate_sid().unwrap();
        assert_eq!(sid.len(), 20);
        assert!(
            sid.chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        );
        assert_ne!(sid, generate_sid().unwrap());
    }
}
