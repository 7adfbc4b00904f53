//! Server stream: framing, opcode table and message handlers.

pub mod decoder;
pub mod entity_info;
pub mod handlers;
pub mod opcodes;

pub use decoder::{write_frame, Frame, FrameDecoder};
pub use handlers::dispatch;
pub use opcodes::{PacketLength, ServerProt};
