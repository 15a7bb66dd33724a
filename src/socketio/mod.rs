//! Socket.IO protocol v5, `/` namespace only.

pub mod channels;
pub mod client;
pub mod packet;
pub mod router;
pub mod server;
pub mod socket;

pub use channels::Channels;
pub use client::{Event, SocketIoClient};
pub use packet::{DEFAULT_NAMESPACE, Packet, PacketKind};
pub use router::{Handler, Router};
pub use server::SocketIoServer;
pub use socket::{AckSender, BroadcastOperator, SocketRef};
