//! Engine.IO protocol v4, WebSocket transport only.

pub mod packet;
pub mod routing;
pub mod session;

pub use packet::{OpenPacket, Packet, PacketType, generate_sid};
pub use routing::{ENGINE_PATH, EngineError, PROTOCOL_VERSION, Route, route};
pub use session::{CloseReason, Outbox, Session, SessionHandler};
