//! Incremental frame decoder for the server stream.
//!
//! Bytes arrive in arbitrary chunks; [`FrameDecoder::poll`] returns a frame
//! once its opcode, length and body are all buffered and otherwise leaves the
//! partial state in place for the next call.

use std::collections::VecDeque;

use log::trace;

use super::opcodes::{PacketLength, ServerProt};
use crate::circular_buffer::CircularBuffer;
use crate::constants::OPCODE_HISTORY;
use crate::error::{ProtocolError, ProtocolResult};
use crate::isaac::Isaac;

/// One complete server message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub prot: ServerProt,
    pub body: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    AwaitingOpcode,
    /// Waiting on a one or two byte length prefix.
    AwaitingLength { prot: ServerProt, width: usize },
    AwaitingBody { prot: ServerProt, len: usize },
}

#[derive(Debug)]
pub struct FrameDecoder {
    cipher: Isaac,
    inbound: VecDeque<u8>,
    state: State,
    history: CircularBuffer<u8>,
}

impl FrameDecoder {
    pub fn new(cipher: Isaac) -> Self {
        FrameDecoder {
            cipher,
            inbound: VecDeque::new(),
            state: State::AwaitingOpcode,
            history: CircularBuffer::new(OPCODE_HISTORY),
        }
    }

    pub fn push(&mut self, bytes: &[u8]) {
        self.inbound.extend(bytes);
    }

    /// Bytes received but not yet part of a returned frame.
    pub fn buffered(&self) -> usize {
        self.inbound.len()
    }

    /// Last few decoded opcodes, oldest first.
    pub fn recent_opcodes(&self) -> Vec<u8> {
        self.history.to_vec_oldest_first()
    }

    pub fn poll(&mut self) -> ProtocolResult<Option<Frame>> {
        loop {
            match self.state {
                State::AwaitingOpcode => {
                    let Some(raw) = self.inbound.pop_front() else {
                        return Ok(None);
                    };
                    let opcode = raw.wrapping_sub(self.cipher.next_int() as u8);
                    let prot = ServerProt::try_from(opcode).map_err(|opcode| ProtocolError::UnknownOpcode {
                        opcode,
                        recent: self.recent_opcodes(),
                    })?;
                    self.history.push(opcode);
                    self.state = match prot.length() {
                        PacketLength::Fixed(len) => State::AwaitingBody {
                            prot,
                            len: len as usize,
                        },
                        PacketLength::VarByte => State::AwaitingLength { prot, width: 1 },
                        PacketLength::VarShort => State::AwaitingLength { prot, width: 2 },
                        PacketLength::Unused => {
                            return Err(ProtocolError::UnknownOpcode {
                                opcode,
                                recent: self.recent_opcodes(),
                            });
                        }
                    };
                }
                State::AwaitingLength { prot, width } => {
                    if self.inbound.len() < width {
                        return Ok(None);
                    }
                    let len = self
                        .inbound
                        .drain(..width)
                        .fold(0usize, |acc, byte| (acc << 8) | byte as usize);
                    self.state = State::AwaitingBody { prot, len };
                }
                State::AwaitingBody { prot, len } => {
                    if self.inbound.len() < len {
                        return Ok(None);
                    }
                    let body: Vec<u8> = self.inbound.drain(..len).collect();
                    self.state = State::AwaitingOpcode;
                    trace!("frame {} ({} bytes)", prot.name(), body.len());
                    return Ok(Some(Frame { prot, body }));
                }
            }
        }
    }
}

/// Writes one frame the way the server would. Used by replay tooling and tests.
pub fn write_frame(cipher: &mut Isaac, prot: ServerProt, body: &[u8], out: &mut Vec<u8>) {
    out.push((prot as u8).wrapping_add(cipher.next_int() as u8));
    match prot.length() {
        PacketLength::VarByte => out.push(body.len() as u8),
        PacketLength::VarShort => out.extend_from_slice(&(body.len() as u16).to_be_bytes()),
        PacketLength::Fixed(_) | PacketLength::Unused => {}
    }
    out.extend_from_slice(body);
}
