//! Minimal HTTP/1.1 plumbing in front of the WebSocket upgrade.
//!
//! Only what the fixtures need: read a request or response head off a
//! stream, inspect it, and write small fixed responses.

use std::collections::HashMap;

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{Error, Result};

const HEAD_TERMINATOR: &[u8] = b"\r\n\r\n";

/// Parse `Name: value` lines into a map keyed by the lower-cased name.
///
/// Names listed in `unique` must appear at most once.
///
/// # Errors
///
/// Returns [`Error::InvalidHandshake`] on a duplicated unique header.
pub(crate) fn parse_headers<'a, I>(lines: I, unique: &[&str]) -> Result<HashMap<String, String>>
where
    I: Iterator<Item = &'a str>,
{
    let mut headers = HashMap::new();
    for line in lines {
        if line.is_empty() {
            break;
        }
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        let name = name.trim().to_ascii_lowercase();
        if unique.contains(&name.as_str()) && headers.contains_key(&name) {
            return Err(Error::InvalidHandshake(format!("Duplicate header: {name}")));
        }
        headers.insert(name, value.trim().to_string());
    }
    Ok(headers)
}

/// Read from `io` until the end of an HTTP head.
///
/// Returns the head (terminator included) and whatever bytes arrived after
/// it, which belong to the next protocol on the stream.
///
/// # Errors
///
/// - [`Error::HandshakeTooLarge`] if no terminator shows up within `limit`
/// - [`Error::ConnectionClosed`] on EOF before the head is complete
pub async fn read_head<R>(io: &mut R, limit: usize) -> Result<(Vec<u8>, BytesMut)>
where
    R: AsyncRead + Unpin,
{
    let mut buf = BytesMut::with_capacity(1024);
    let mut scanned: usize = 0;
    loop {
        // Resume the scan just before the previous end so a terminator split
        // across reads is still found.
        let from = scanned.saturating_sub(HEAD_TERMINATOR.len() - 1);
        if let Some(pos) = buf[from..]
            .windows(HEAD_TERMINATOR.len())
            .position(|w| w == HEAD_TERMINATOR)
        {
            let end = from + pos + HEAD_TERMINATOR.len();
            let rest = buf.split_off(end);
            return Ok((buf.to_vec(), rest));
        }
        if buf.len() > limit {
            return Err(Error::HandshakeTooLarge {
                size: buf.len(),
                max: limit,
            });
        }
        scanned = buf.len();
        if io.read_buf(&mut buf).await? == 0 {
            return Err(Error::ConnectionClosed(None));
        }
    }
}

/// Parsed request line and headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestHead {
    pub method: String,
    /// Path without the query string.
    pub path: String,
    /// Decoded `key=value` pairs of the query string, in order.
    pub query: Vec<(String, String)>,
    pub version: String,
    headers: HashMap<String, String>,
}

impl RequestHead {
    /// # Errors
    ///
    /// Returns [`Error::InvalidHandshake`] for non-UTF-8 input, a malformed
    /// request line or a duplicated `Host`/`Upgrade`/`Connection`/
    /// `Sec-WebSocket-Key`/`Sec-WebSocket-Version` header.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(data)
            .map_err(|_| Error::InvalidHandshake("Invalid UTF-8".into()))?;
        let mut lines = text.lines();
        let request_line = lines
            .next()
            .ok_or_else(|| Error::InvalidHandshake("Empty request".into()))?;

        let mut parts = request_line.split_whitespace();
        let (Some(method), Some(target), Some(version), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(Error::InvalidHandshake("Invalid request line".into()));
        };

        let (path, query) = match target.split_once('?') {
            Some((path, query)) => (
                path.to_string(),
                url::form_urlencoded::parse(query.as_bytes())
                    .into_owned()
                    .collect(),
            ),
            None => (target.to_string(), Vec::new()),
        };

        let headers = parse_headers(
            lines,
            &[
                "host",
                "upgrade",
                "connection",
                "sec-websocket-key",
                "sec-websocket-version",
            ],
        )?;

        Ok(Self {
            method: method.to_string(),
            path,
            query,
            version: version.to_string(),
            headers,
        })
    }

    /// Header value by case-insensitive name.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// First query value for `name`.
    #[must_use]
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// `Upgrade: websocket` together with a `Connection` token `upgrade`.
    #[must_use]
    pub fn is_websocket_upgrade(&self) -> bool {
        let upgrade = self
            .header("upgrade")
            .is_some_and(|v| v.eq_ignore_ascii_case("websocket"));
        let connection = self.header("connection").is_some_and(|v| {
            v.split(',')
                .any(|token| token.trim().eq_ignore_ascii_case("upgrade"))
        });
        upgrade && connection
    }
}

/// A small, fully buffered HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub content_type: &'static str,
    pub body: String,
}

impl Response {
    #[must_use]
    pub fn new(status: u16, content_type: &'static str, body: impl Into<String>) -> Self {
        Self {
            status,
            content_type,
            body: body.into(),
        }
    }

    #[must_use]
    pub fn not_found(body: impl Into<String>) -> Self {
        Self::new(404, "text/html", body)
    }

    #[must_use]
    pub fn bad_request_json(body: impl Into<String>) -> Self {
        Self::new(400, "application/json", body)
    }

    fn reason(&self) -> &'static str {
        match self.status {
            200 => "OK",
            400 => "Bad Request",
            403 => "Forbidden",
            404 => "Not Found",
            500 => "Internal Server Error",
            _ => "Unknown",
        }
    }

    /// Serialized response; the connection is closed after it.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        format!(
            "HTTP/1.1 {} {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            self.status,
            self.reason(),
            self.content_type,
            self.body.len(),
            self.body,
        )
        .into_bytes()
    }

    /// # Errors
    ///
    /// Returns [`Error::Io`] if the write fails.
    pub async fn write_to<W>(&self, io: &mut W) -> Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        io.write_all(&self.encode()).await?;
        io.flush().await?;
        Ok(())
    }
}
