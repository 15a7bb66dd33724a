//! Opening handshake (RFC 6455 Section 4).

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use sha1::{Digest, Sha1};

use crate::error::{Error, Result};
use crate::http::{RequestHead, parse_headers};

/// GUID appended to the client key before hashing.
pub const WS_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// `Base64(SHA-1(key + GUID))`.
///
/// ```
/// use rsio::protocol::handshake::compute_accept_key;
///
/// assert_eq!(
///     compute_accept_key("dGhlIHNhbXBsZSBub25jZQ=="),
///     "s3pPLMBiTxaQ9kYGzzhZRbK+xOo="
/// );
/// ```
#[must_use]
pub fn compute_accept_key(key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(key.as_bytes());
    hasher.update(WS_GUID.as_bytes());
    BASE64.encode(hasher.finalize())
}

/// Fresh `Sec-WebSocket-Key`: 16 random bytes, base64 encoded.
///
/// # Errors
///
/// Returns [`Error::Io`] if the OS random source fails.
pub fn generate_key() -> Result<String> {
    let mut nonce = [0u8; 16];
    getrandom::getrandom(&mut nonce).map_err(|e| Error::Io(e.to_string()))?;
    Ok(BASE64.encode(nonce))
}

fn validate_header_value(header: &str, value: &str) -> Result<()> {
    if value.contains(['\r', '\n']) {
        return Err(Error::InvalidHeaderValue {
            header: header.to_string(),
            reason: "contains CR or LF characters".to_string(),
        });
    }
    Ok(())
}

fn comma_list(value: Option<&str>) -> Vec<String> {
    value
        .map(|v| {
            v.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect()
        })
        .unwrap_or_default()
}

/// Client upgrade request as seen by a server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeRequest {
    /// Request path without the query string.
    pub path: String,
    pub host: String,
    pub key: String,
    pub version: u8,
    pub origin: Option<String>,
    pub protocols: Vec<String>,
}

impl HandshakeRequest {
    /// # Errors
    ///
    /// See [`HandshakeRequest::from_head`].
    pub fn parse(data: &[u8]) -> Result<Self> {
        Self::from_head(&RequestHead::parse(data)?)
    }

    /// Extract the upgrade fields from an already parsed head.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidHandshake`] if the method is not `GET`, the
    /// version is not `HTTP/1.1`, or `Upgrade`, `Connection`, `Host`,
    /// `Sec-WebSocket-Key` or `Sec-WebSocket-Version` is missing or wrong.
    pub fn from_head(head: &RequestHead) -> Result<Self> {
        if head.method != "GET" {
            return Err(Error::InvalidHandshake(format!(
                "Expected GET method, got {}",
                head.method
            )));
        }
        if head.version != "HTTP/1.1" {
            return Err(Error::InvalidHandshake(format!(
                "Expected HTTP/1.1, got {}",
                head.version
            )));
        }
        let upgrade = head
            .header("upgrade")
            .ok_or_else(|| Error::InvalidHandshake("Missing Upgrade header".into()))?;
        if !upgrade.eq_ignore_ascii_case("websocket") {
            return Err(Error::InvalidHandshake(format!(
                "Invalid Upgrade header: {upgrade}"
            )));
        }
        if !head.is_websocket_upgrade() {
            return Err(Error::InvalidHandshake(
                "Missing Connection: Upgrade header".into(),
            ));
        }
        let host = head
            .header("host")
            .ok_or_else(|| Error::InvalidHandshake("Missing Host header".into()))?;
        let key = head
            .header("sec-websocket-key")
            .ok_or_else(|| Error::InvalidHandshake("Missing Sec-WebSocket-Key header".into()))?;
        let version = head.header("sec-websocket-version").ok_or_else(|| {
            Error::InvalidHandshake("Missing Sec-WebSocket-Version header".into())
        })?;
        let version = version
            .parse()
            .map_err(|_| Error::InvalidHandshake(format!("Invalid version: {version}")))?;

        Ok(Self {
            path: head.path.clone(),
            host: host.to_string(),
            key: key.to_string(),
            version,
            origin: head.header("origin").map(String::from),
            protocols: comma_list(head.header("sec-websocket-protocol")),
        })
    }

    /// # Errors
    ///
    /// Returns [`Error::InvalidHandshake`] if the version is not 13, the key
    /// does not decode to 16 bytes, or the host is empty.
    pub fn validate(&self) -> Result<()> {
        if self.version != 13 {
            return Err(Error::InvalidHandshake(format!(
                "Unsupported WebSocket version: {} (expected 13)",
                self.version
            )));
        }
        match BASE64.decode(&self.key) {
            Ok(nonce) if nonce.len() == 16 => {}
            Ok(nonce) => {
                return Err(Error::InvalidHandshake(format!(
                    "Sec-WebSocket-Key must be 16 bytes, got {}",
                    nonce.len()
                )));
            }
            Err(_) => {
                return Err(Error::InvalidHandshake(
                    "Invalid Sec-WebSocket-Key: not valid Base64".into(),
                ));
            }
        }
        if self.host.is_empty() {
            return Err(Error::InvalidHandshake("Host header cannot be empty".into()));
        }
        Ok(())
    }

    /// Build a client request for `path` (query string included) on `host`.
    #[must_use]
    pub fn client(host: impl Into<String>, path: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            host: host.into(),
            key: key.into(),
            version: 13,
            origin: None,
            protocols: Vec::new(),
        }
    }

    /// Serialize as a client would send it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidHeaderValue`] if any field contains CR/LF.
    pub fn write(&self, buf: &mut Vec<u8>) -> Result<()> {
        validate_header_value("Host", &self.host)?;
        validate_header_value("Sec-WebSocket-Key", &self.key)?;
        if self.path.contains(['\r', '\n', ' ']) {
            return Err(Error::InvalidHeaderValue {
                header: "request-target".into(),
                reason: "contains whitespace".into(),
            });
        }
        buf.extend_from_slice(format!("GET {} HTTP/1.1\r\n", self.path).as_bytes());
        buf.extend_from_slice(format!("Host: {}\r\n", self.host).as_bytes());
        buf.extend_from_slice(b"Upgrade: websocket\r\nConnection: Upgrade\r\n");
        buf.extend_from_slice(format!("Sec-WebSocket-Key: {}\r\n", self.key).as_bytes());
        buf.extend_from_slice(format!("Sec-WebSocket-Version: {}\r\n", self.version).as_bytes());
        if let Some(origin) = &self.origin {
            validate_header_value("Origin", origin)?;
            buf.extend_from_slice(format!("Origin: {origin}\r\n").as_bytes());
        }
        if !self.protocols.is_empty() {
            let joined = self.protocols.join(", ");
            validate_header_value("Sec-WebSocket-Protocol", &joined)?;
            buf.extend_from_slice(format!("Sec-WebSocket-Protocol: {joined}\r\n").as_bytes());
        }
        buf.extend_from_slice(b"\r\n");
        Ok(())
    }
}

/// Server's `101 Switching Protocols` answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeResponse {
    pub accept: String,
    pub protocol: Option<String>,
}

impl HandshakeResponse {
    /// Accept a validated request, selecting its first offered subprotocol.
    #[must_use]
    pub fn from_request(req: &HandshakeRequest) -> Self {
        Self {
            accept: compute_accept_key(&req.key),
            protocol: req.protocols.first().cloned(),
        }
    }

    /// # Errors
    ///
    /// Returns [`Error::InvalidHeaderValue`] if the protocol contains CR/LF.
    pub fn write(&self, buf: &mut Vec<u8>) -> Result<()> {
        buf.extend_from_slice(b"HTTP/1.1 101 Switching Protocols\r\n");
        buf.extend_from_slice(b"Upgrade: websocket\r\nConnection: Upgrade\r\n");
        buf.extend_from_slice(format!("Sec-WebSocket-Accept: {}\r\n", self.accept).as_bytes());
        if let Some(proto) = &self.protocol {
            validate_header_value("Sec-WebSocket-Protocol", proto)?;
            buf.extend_from_slice(format!("Sec-WebSocket-Protocol: {proto}\r\n").as_bytes());
        }
        buf.extend_from_slice(b"\r\n");
        Ok(())
    }

    /// # Errors
    ///
    /// Returns [`Error::InvalidHandshake`] unless the status is 101 with
    /// `Upgrade: websocket`, `Connection: Upgrade` and an accept key.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(data)
            .map_err(|_| Error::InvalidHandshake("Invalid UTF-8".into()))?;
        let mut lines = text.lines();
        let status = lines
            .next()
            .ok_or_else(|| Error::InvalidHandshake("Empty response".into()))?;
        if !status.starts_with("HTTP/1.1 101") {
            return Err(Error::InvalidHandshake(format!(
                "Expected 101 status, got: {status}"
            )));
        }

        let headers = parse_headers(lines, &[])?;
        let upgrade = headers
            .get("upgrade")
            .ok_or_else(|| Error::InvalidHandshake("Missing Upgrade header in response".into()))?;
        if !upgrade.eq_ignore_ascii_case("websocket") {
            return Err(Error::InvalidHandshake(format!(
                "Invalid Upgrade header: {upgrade}"
            )));
        }
        let connection = headers.get("connection").ok_or_else(|| {
            Error::InvalidHandshake("Missing Connection header in response".into())
        })?;
        if !connection.to_ascii_lowercase().contains("upgrade") {
            return Err(Error::InvalidHandshake(format!(
                "Invalid Connection header: {connection}"
            )));
        }
        let accept = headers
            .get("sec-websocket-accept")
            .ok_or_else(|| Error::InvalidHandshake("Missing Sec-WebSocket-Accept header".into()))?
            .clone();

        Ok(Self {
            accept,
            protocol: headers.get("sec-websocket-protocol").cloned(),
        })
    }

    /// Check the accept key against the key the client sent.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidHandshake`] on mismatch.
    pub fn verify(&self, key: &str) -> Result<()> {
        if self.accept == compute_accept_key(key) {
            Ok(())
        } else {
            Err(Error::InvalidHandshake("Invalid Sec-WebSocket-Accept".into()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_KEY: &str = "dGhlIHNhbXBsZSBub25jZQ==";

    fn sample_request() -> &'static [u8] {
        b"GET /chat?room=1 HTTP/1.1\r\n\
          Host: server.example.com\r\n\
          Upgrade: websocket\r\n\
          Connection: Upgrade\r\n\
          Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\
          Sec-WebSocket-Version: 13\r\n\
          Origin: http://example.com\r\n\
          Sec-WebSocket-Protocol: chat, superchat\r\n\r\n"
    }

    #[test]
    fn test_compute_accept_key_rfc_example() {
        assert_eq!(compute_accept_key(SAMPLE_KEY), "s3pPLMBiTxaQ9kYGzzhZRbK+xOo=");
    }

    #[test]
    fn test_parse_valid_request() {
        let req = HandshakeRequest::parse(sample_request()).unwrap();
        assert_eq!(req.path, "/chat");
        assert_eq!(req.host, "server.example.com");
        assert_eq!(req.key, SAMPLE_KEY);
        assert_eq!(req.version, 13);
        assert_eq!(req.origin.as_deref(), Some("http://example.com"));
        assert_eq!(req.protocols, vec!["chat", "superchat"]);
        assert!(req.validate().is_ok());
    }

    #[test]
    fn test_request_missing_headers() {
        let missing_key = b"GET / HTTP/1.1\r\nHost: x\r\nUpgrade: websocket\r\n\
            Connection: Upgrade\r\nSec-WebSocket-Version: 13\r\n\r\n";
        assert!(matches!(
            HandshakeRequest::parse(missing_key),
            Err(Error::InvalidHandshake(m)) if m.contains("Sec-WebSocket-Key")
        ));

        let missing_host = b"GET / HTTP/1.1\r\nUpgrade: websocket\r\nConnection: Upgrade\r\n\
            Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\nSec-WebSocket-Version: 13\r\n\r\n";
        assert!(matches!(
            HandshakeRequest::parse(missing_host),
            Err(Error::InvalidHandshake(m)) if m.contains("Host")
        ));
    }

    #[test]
    fn test_request_wrong_method_and_version() {
        let post = b"POST / HTTP/1.1\r\nHost: x\r\n\r\n";
        assert!(matches!(
            HandshakeRequest::parse(post),
            Err(Error::InvalidHandshake(m)) if m.contains("GET")
        ));
        let old = b"GET / HTTP/1.0\r\nHost: x\r\n\r\n";
        assert!(matches!(
            HandshakeRequest::parse(old),
            Err(Error::InvalidHandshake(m)) if m.contains("HTTP/1.1")
        ));
    }

    #[test]
    fn test_validate_rejects_bad_key_and_version() {
        let mut req = HandshakeRequest::parse(sample_request()).unwrap();
        req.version = 8;
        assert!(req.validate().is_err());
        req.version = 13;
        req.key = "c2hvcnQ=".into();
        assert!(req.validate().is_err());
        req.key = "!!!".into();
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_client_request_is_server_parseable() {
        let req = HandshakeRequest::client("127.0.0.1:9096", "/socket.io/?EIO=4", SAMPLE_KEY);
        let mut buf = Vec::new();
        req.write(&mut buf).unwrap();
        let parsed = HandshakeRequest::parse(&buf).unwrap();
        assert_eq!(parsed.path, "/socket.io/");
        assert_eq!(parsed.host, "127.0.0.1:9096");
        assert!(parsed.validate().is_ok());
    }

    #[test]
    fn test_client_request_rejects_injection() {
        let req = HandshakeRequest::client("x\r\nEvil: 1", "/", SAMPLE_KEY);
        assert!(matches!(
            req.write(&mut Vec::new()),
            Err(Error::InvalidHeaderValue { .. })
        ));
    }

    #[test]
    fn test_response_write_and_parse() {
        let req = HandshakeRequest::parse(sample_request()).unwrap();
        let resp = HandshakeResponse::from_request(&req);
        assert_eq!(resp.protocol.as_deref(), Some("chat"));

        let mut buf = Vec::new();
        resp.write(&mut buf).unwrap();
        assert!(buf.ends_with(b"\r\n\r\n"));

        let parsed = HandshakeResponse::parse(&buf).unwrap();
        assert_eq!(parsed, resp);
        assert!(parsed.verify(SAMPLE_KEY).is_ok());
        assert!(parsed.verify("AAAAAAAAAAAAAAAAAAAAAA==").is_err());
    }

    #[test]
    fn test_response_rejects_non_101() {
        let resp = b"HTTP/1.1 404 Not Found\r\n\r\n";
        assert!(matches!(
            HandshakeResponse::parse(resp),
            Err(Error::InvalidHandshake(m)) if m.contains("101")
        ));
    }

    #[test]
    fn test_response_crlf_protocol_rejected() {
        let resp = HandshakeResponse {
            accept: "x".into(),
            protocol: Some("chat\r\nX-Injected: evil".into()),
        };
        assert!(matches!(
            resp.write(&mut Vec::new()),
            Err(Error::InvalidHeaderValue { .. })
        ));
    }

    #[test]
    fn test_generated_keys_validate() {
        let key = generate_key().unwrap();
        let req = HandshakeRequest::client("h", "/", key.clone());
        assert!(req.validate().is_ok());
        assert_ne!(key, generate_key().unwrap());
    }
}
