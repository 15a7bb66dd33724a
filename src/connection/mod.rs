//! Upgraded WebSocket connections.
//!
//! A [`Connection`] starts `Open` once the HTTP upgrade is done. Sending a
//! close frame moves it to `Closing`; receiving one (or EOF) moves it to
//! `Closed`.

#[allow(clippy::module_inception)]
mod connection;
mod fragmenter;
mod state;
mod upgrade;

pub use connection::{Connection, RecvHalf, SendHalf};
pub use state::{ConnectionState, Role};
pub use upgrade::{accept, client_handshake, connect, upgrade};
