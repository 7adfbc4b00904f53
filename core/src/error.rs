//! Error types for the protocol and routing paths.
//!
//! `ProtocolError` is always fatal for the connection: once the codec has
//! lost its place in the stream nothing after it can be trusted. `RouteError`
//! is reported back to whoever asked for the route and never tears anything
//! down.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("unknown opcode {opcode} (recent opcodes {recent:?})")]
    UnknownOpcode { opcode: u8, recent: Vec<u8> },

    #[error("size mismatch in {message}: consumed {consumed} of {declared} bytes")]
    SizeMismatch {
        message: &'static str,
        consumed: usize,
        declared: usize,
    },

    #[error("read of {needed} bytes at {pos} overruns {len}-byte body")]
    Truncated { needed: usize, pos: usize, len: usize },

    #[error("read of {needed} bits at bit {bit_pos} overruns {len}-byte body")]
    BitsTruncated {
        needed: u32,
        bit_pos: usize,
        len: usize,
    },

    #[error("byte access while the cursor is in bit mode (bit {bit_pos})")]
    BitModeActive { bit_pos: usize },

    #[error("bit access while the cursor is in byte mode (byte {pos})")]
    ByteModeActive { pos: usize },

    #[error("too many {kind}: server declared {declared}, tracking {tracked}")]
    TooManyEntities {
        kind: &'static str,
        declared: usize,
        tracked: usize,
    },

    #[error("{kind} slot {index} is tracked but empty")]
    MissingEntity { kind: &'static str, index: usize },

    #[error("malformed {message}: {reason}")]
    BadMessage {
        message: &'static str,
        reason: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RouteError {
    #[error("no route to destination")]
    NoRoute,

    #[error("search queue overflowed")]
    QueueOverflow,

    #[error("tile ({x}, {z}) is outside the loaded region")]
    OutOfRegion { x: i32, z: i32 },

    #[error("route target no longer exists")]
    TargetGone,
}

pub type ProtocolResult<T> = Result<T, ProtocolError>;
