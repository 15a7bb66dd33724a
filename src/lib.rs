//! # rsio - Socket.IO echo target and scenario fixtures
//!
//! `rsio` carries just enough of the real-time stack to test scenario
//! runners against known peers:
//!
//! - an RFC 6455 WebSocket core with strict frame validation
//! - Engine.IO v4 and Socket.IO v5 over the websocket transport
//! - an [echo target](echo_target) server answering `join`, `message` and
//!   `new_server_version`
//! - a [scenario runner](scenario) and a [`Fixture`] that owns the test
//!   server for the duration of a run
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use rsio::{EngineConfig, SocketIoClient, echo_target};
//! use serde_json::json;
//!
//! # async fn demo() -> rsio::Result<()> {
//! let server = echo_target::spawn("127.0.0.1:0", EngineConfig::default()).await?;
//! let url = format!("ws://{}", server.local_addr());
//!
//! let client = SocketIoClient::connect(&url, EngineConfig::default()).await?;
//! let ack = client
//!     .emit_with_ack("new_server_version", vec![json!("a"), json!("b")])
//!     .await?;
//! assert_eq!(ack, vec![json!("a"), json!("b")]);
//!
//! client.disconnect().await?;
//! server.close().await;
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod config;
pub mod connection;
pub mod echo_target;
pub mod engineio;
pub mod error;
pub mod fixture;
pub mod http;
pub mod message;
pub mod protocol;
pub mod scenario;
pub mod server_handle;
pub mod simple_ws;
pub mod socketio;

pub use config::{Config, EngineConfig, Limits, Timeouts};
pub use connection::{Connection, ConnectionState, Role};
pub use error::{Error, Result};
pub use fixture::{Fixture, FixtureCtx};
pub use message::{CloseCode, CloseFrame, Message};
pub use protocol::{HandshakeRequest, HandshakeResponse, OpCode, WS_GUID, compute_accept_key};
pub use scenario::{RunReport, Runner, Scenario};
pub use server_handle::ServerHandle;
pub use socketio::{Router, SocketIoClient, SocketIoServer, SocketRef};
