//! Which HTTP requests become Engine.IO sessions.

use serde_json::json;

use crate::http::{RequestHead, Response};

/// Mount point of the Engine.IO endpoint.
pub const ENGINE_PATH: &str = "/socket.io/";

/// Protocol revision served here.
pub const PROTOCOL_VERSION: &str = "4";

/// Engine.IO handshake error codes, sent as the JSON body of a `400`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineError {
    TransportUnknown,
    UnknownSid,
    BadHandshakeMethod,
    BadRequest,
    UnsupportedProtocolVersion,
}

impl EngineError {
    #[must_use]
    pub const fn code(&self) -> u8 {
        match self {
            EngineError::TransportUnknown => 0,
            EngineError::UnknownSid => 1,
            EngineError::BadHandshakeMethod => 2,
            EngineError::BadRequest => 3,
            EngineError::UnsupportedProtocolVersion => 5,
        }
    }

    #[must_use]
    pub const fn message(&self) -> &'static str {
        match self {
            EngineError::TransportUnknown => "Transport unknown",
            EngineError::UnknownSid => "Session ID unknown",
            EngineError::BadHandshakeMethod => "Bad handshake method",
            EngineError::BadRequest => "Bad request",
            EngineError::UnsupportedProtocolVersion => "Unsupported protocol version",
        }
    }

    #[must_use]
    pub fn response(&self) -> Response {
        let body = json!({ "code": self.code(), "message": self.message() });
        Response::bad_request_json(body.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// A websocket handshake for a new session.
    Upgrade,
    /// An Engine.IO request this server cannot serve.
    Reject(EngineError),
    /// Not an Engine.IO request at all.
    Plain,
}

/// Classify a request.
///
/// Only `GET /socket.io/?EIO=4&transport=websocket` with upgrade headers
/// starts a session. Polling and session resumption (`sid`) are refused.
#[must_use]
pub fn route(head: &RequestHead) -> Route {
    if head.path != ENGINE_PATH && head.path != ENGINE_PATH.trim_end_matches('/') {
        return Route::Plain;
    }
    if head.query_param("transport") != Some("websocket") {
        return Route::Reject(EngineError::TransportUnknown);
    }
    if head.query_param("EIO") != Some(PROTOCOL_VERSION) {
        return Route::Reject(EngineError::UnsupportedProtocolVersion);
    }
    if head.query_param("sid").is_some() {
        return Route::Reject(EngineError::UnknownSid);
    }
    if head.method != "GET" {
        return Route::Reject(EngineError::BadHandshakeMethod);
    }
    if !head.is_websocket_upgrade() {
        return Route::Reject(EngineError::BadRequest);
    }
    Route::Upgrade
}
