//! Socket.IO v5 packets carried in Engine.IO message packets.
//!
//! Text encoding: `<kind>[<namespace>,][<ack id>][<json>]`, with the
//! namespace left out when it is `/`. For example `2["join","room"]`,
//! `21["new_server_version","a","b"]` or `31["a","b"]`.

use std::fmt;

use serde_json::{Value, json};

use crate::error::{Error, Result};

pub const DEFAULT_NAMESPACE: &str = "/";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketKind {
    Connect,
    Disconnect,
    Event,
    Ack,
    ConnectError,
    BinaryEvent,
    BinaryAck,
}

impl PacketKind {
    #[must_use]
    pub const fn as_char(&self) -> char {
        match self {
            PacketKind::Connect => '0',
            PacketKind::Disconnect => '1',
            PacketKind::Event => '2',
            PacketKind::Ack => '3',
            PacketKind::ConnectError => '4',
            PacketKind::BinaryEvent => '5',
            PacketKind::BinaryAck => '6',
        }
    }

    fn from_char(c: char) -> Result<Self> {
        Ok(match c {
            '0' => PacketKind::Connect,
            '1' => PacketKind::Disconnect,
            '2' => PacketKind::Event,
            '3' => PacketKind::Ack,
            '4' => PacketKind::ConnectError,
            '5' => PacketKind::BinaryEvent,
            '6' => PacketKind::BinaryAck,
            other => {
                return Err(Error::InvalidPacket(format!(
                    "unknown socket.io packet type {other:?}"
                )));
            }
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Packet {
    pub kind: PacketKind,
    pub namespace: String,
    pub ack_id: Option<u64>,
    pub data: Option<Value>,
}

impl Packet {
    fn new(kind: PacketKind, namespace: impl Into<String>, data: Option<Value>) -> Self {
        Self {
            kind,
            namespace: namespace.into(),
            ack_id: None,
            data,
        }
    }

    /// Client request to join a namespace.
    #[must_use]
    pub fn connect(namespace: impl Into<String>) -> Self {
        Self::new(PacketKind::Connect, namespace, None)
    }

    /// Server acceptance carrying the socket id.
    #[must_use]
    pub fn connect_ok(namespace: impl Into<String>, sid: &str) -> Self {
        Self::new(PacketKind::Connect, namespace, Some(json!({ "sid": sid })))
    }

    #[must_use]
    pub fn connect_error(namespace: impl Into<String>, message: &str) -> Self {
        Self::new(
            PacketKind::ConnectError,
            namespace,
            Some(json!({ "message": message })),
        )
    }

    #[must_use]
    pub fn disconnect(namespace: impl Into<String>) -> Self {
        Self::new(PacketKind::Disconnect, namespace, None)
    }

    #[must_use]
    pub fn event(namespace: impl Into<String>, event: &str, args: Vec<Value>) -> Self {
        let mut data = Vec::with_capacity(args.len() + 1);
        data.push(Value::String(event.to_owned()));
        data.extend(args);
        Self::new(PacketKind::Event, namespace, Some(Value::Array(data)))
    }

    #[must_use]
    pub fn ack(namespace: impl Into<String>, ack_id: u64, args: Vec<Value>) -> Self {
        Self::new(PacketKind::Ack, namespace, Some(Value::Array(args))).with_ack_id(ack_id)
    }

    #[must_use]
    pub fn with_ack_id(mut self, ack_id: u64) -> Self {
        self.ack_id = Some(ack_id);
        self
    }

    #[must_use]
    pub fn encode(&self) -> String {
        let mut out = String::new();
        out.push(self.kind.as_char());
        if self.namespace != DEFAULT_NAMESPACE {
            out.push_str(&self.namespace);
            out.push(',');
        }
        if let Some(id) = self.ack_id {
            out.push_str(&id.to_string());
        }
        if let Some(data) = &self.data {
            out.push_str(&data.to_string());
        }
        out
    }

    /// # Errors
    ///
    /// - [`Error::UnsupportedBinary`] for binary event and ack packets
    /// - [`Error::InvalidPacket`] for unknown kinds, bad ack ids, event
    ///   payloads that are not a non-empty array headed by a non-empty name,
    ///   and payloads that do not fit the kind
    /// - [`Error::Json`] for malformed JSON
    pub fn decode(text: &str) -> Result<Self> {
        let mut chars = text.chars();
        let kind = PacketKind::from_char(
            chars
                .next()
                .ok_or_else(|| Error::InvalidPacket("empty socket.io packet".into()))?,
        )?;
        if matches!(kind, PacketKind::BinaryEvent | PacketKind::BinaryAck) {
            return Err(Error::UnsupportedBinary);
        }
        let mut rest = chars.as_str();

        let namespace = if rest.starts_with('/') {
            let (ns, tail) = rest.split_once(',').unwrap_or((rest, ""));
            rest = tail;
            ns.to_string()
        } else {
            DEFAULT_NAMESPACE.to_string()
        };

        let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
        let ack_id = if digits > 0 {
            let id = rest[..digits]
                .parse()
                .map_err(|_| Error::InvalidPacket(format!("bad ack id {}", &rest[..digits])))?;
            rest = &rest[digits..];
            Some(id)
        } else {
            None
        };

        let data = if rest.is_empty() {
            None
        } else {
            Some(serde_json::from_str::<Value>(rest)?)
        };

        let packet = Self {
            kind,
            namespace,
            ack_id,
            data,
        };
        packet.check_payload()?;
        Ok(packet)
    }

    fn check_payload(&self) -> Result<()> {
        let ok = match (self.kind, &self.data) {
            (PacketKind::Connect, None | Some(Value::Object(_))) => true,
            (PacketKind::Disconnect, None) => true,
            (PacketKind::Event, Some(Value::Array(items))) => {
                matches!(items.first(), Some(Value::String(name)) if !name.is_empty())
            }
            (PacketKind::Ack, Some(Value::Array(_))) => self.ack_id.is_some(),
            (PacketKind::ConnectError, Some(Value::Object(_) | Value::String(_))) => true,
            _ => false,
        };
        if ok {
            Ok(())
        } else {
            Err(Error::InvalidPacket(format!(
                "invalid payload for {:?} packet",
                self.kind
            )))
        }
    }

    /// Split an event packet into its name and arguments.
    ///
    /// # Errors
    ///
    /// [`Error::UnexpectedPacket`] for anything but a well-formed event.
    pub fn into_event(self) -> Result<(String, Vec<Value>)> {
        if let (PacketKind::Event, Some(Value::Array(mut items))) = (self.kind, self.data) {
            if let Some(Value::String(_)) = items.first() {
                if let Value::String(name) = items.remove(0) {
                    return Ok((name, items));
                }
            }
        }
        Err(Error::UnexpectedPacket("expected an event packet".into()))
    }

    /// Arguments of an ack packet.
    #[must_use]
    pub fn ack_args(&self) -> Vec<Value> {
        match &self.data {
            Some(Value::Array(items)) => items.clone(),
            _ => Vec::new(),
        }
    }
}

impl fmt::Display for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_event() {
        let packet = Packet::event("/", "join", vec![json!("room")]);
        assert_eq!(packet.encode(), r#"2["join","room"]"#);
        let packet = Packet::event("/admin", "x", vec![]).with_ack_id(12);
        assert_eq!(packet.encode(), r#"2/admin,12["x"]"#);
    }

    #[test]
    fn test_encode_connect_variants() {
        assert_eq!(Packet::connect("/").encode(), "0");
        assert_eq!(Packet::connect_ok("/", "abc").encode(), r#"0{"sid":"abc"}"#);
        assert_eq!(
            Packet::connect_error("/admin", "Invalid namespace").encode(),
            r#"4/admin,{"message":"Invalid namespace"}"#
        );
        assert_eq!(Packet::disconnect("/").encode(), "1");
    }

    #[test]
    fn test_decode_event_with_ack() {
        let packet = Packet::decode(r#"21["new_server_version","a",{"b":1}]"#).unwrap();
        assert_eq!(packet.kind, PacketKind::Event);
        assert_eq!(packet.namespace, "/");
        assert_eq!(packet.ack_id, Some(1));
        let (name, args) = packet.into_event().unwrap();
        assert_eq!(name, "new_server_version");
        assert_eq!(args, vec![json!("a"), json!({"b": 1})]);
    }

    #[test]
    fn test_decode_namespace() {
        let packet = Packet::decode("0/admin,").unwrap();
        assert_eq!(packet.namespace, "/admin");
        assert_eq!(packet.data, None);
        let packet = Packet::decode("0/chat").unwrap();
        assert_eq!(packet.namespace, "/chat");
    }

    #[test]
    fn test_decode_ack() {
        let packet = Packet::decode(r#"37["m1","m2"]"#).unwrap();
        assert_eq!(packet.kind, PacketKind::Ack);
        assert_eq!(packet.ack_id, Some(7));
        assert_eq!(packet.ack_args(), vec![json!("m1"), json!("m2")]);
    }

    #[test]
    fn test_decode_rejects() {
        assert_eq!(
            Packet::decode(r#"51-["x",{"_placeholder":true,"num":0}]"#),
            Err(Error::UnsupportedBinary)
        );
        assert!(matches!(Packet::decode(""), Err(Error::InvalidPacket(_))));
        assert!(matches!(Packet::decode("9"), Err(Error::InvalidPacket(_))));
        assert!(matches!(Packet::decode(r#"2{"a":1}"#), Err(Error::InvalidPacket(_))));
        assert!(matches!(Packet::decode("2[]"), Err(Error::InvalidPacket(_))));
        assert!(matches!(Packet::decode(r#"2[""]"#), Err(Error::InvalidPacket(_))));
        assert!(matches!(Packet::decode("2[1]"), Err(Error::InvalidPacket(_))));
        assert!(matches!(Packet::decode(r#"3["x"]"#), Err(Error::InvalidPacket(_))));
        assert!(matches!(Packet::decode("2[\"x\""), Err(Error::Json(_))));
    }

    #[test]
    fn test_into_event_wrong_kind() {
        assert!(matches!(
            Packet::connect("/").into_event(),
            Err(Error::UnexpectedPacket(_))
        ));
    }
}
