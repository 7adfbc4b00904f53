//! Big-endian byte cursor with an MSB-first bit mode.
//!
//! Entity info and a few zone fields are bit-packed inside otherwise
//! byte-aligned bodies. The cursor is in exactly one mode at a time: byte
//! reads while in bit mode (or bit reads in byte mode) are errors rather than
//! silently reading from a stale position. Leaving bit mode rounds up to the
//! next byte boundary.

use crate::error::{ProtocolError, ProtocolResult};
use crate::isaac::Isaac;

/// Terminators accepted at the end of a string field.
const STRING_TERMINATORS: [u8; 2] = [0, 10];

#[derive(Debug, Clone)]
pub struct Packet<'a> {
    data: &'a [u8],
    pos: usize,
    bit_pos: Option<usize>,
}

impl<'a> Packet<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            bit_pos: None,
        }
    }

    /// Byte position. Only meaningful in byte mode.
    pub fn pos(&self) -> usize {
        self.pos
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    pub fn in_bit_mode(&self) -> bool {
        self.bit_pos.is_some()
    }

    fn take(&mut self, needed: usize) -> ProtocolResult<&'a [u8]> {
        if let Some(bit_pos) = self.bit_pos {
            return Err(ProtocolError::BitModeActive { bit_pos });
        }
        if self.remaining() < needed {
            return Err(ProtocolError::Truncated {
                needed,
                pos: self.pos,
                len: self.data.len(),
            });
        }
        let start = self.pos;
        self.pos += needed;
        Ok(&self.data[start..start + needed])
    }

    pub fn g1(&mut self) -> ProtocolResult<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn g1b(&mut self) -> ProtocolResult<i8> {
        Ok(self.take(1)?[0] as i8)
    }

    pub fn g2(&mut self) -> ProtocolResult<u16> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    pub fn g2b(&mut self) -> ProtocolResult<i16> {
        let b = self.take(2)?;
        Ok(i16::from_be_bytes([b[0], b[1]]))
    }

    /// Reads a u16 where 65535 means "none".
    pub fn g2_opt(&mut self) -> ProtocolResult<i32> {
        let value = self.g2()?;
        Ok(if value == u16::MAX { -1 } else { value as i32 })
    }

    pub fn g4(&mut self) -> ProtocolResult<u32> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn g8(&mut self) -> ProtocolResult<u64> {
        let b = self.take(8)?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(b);
        Ok(u64::from_be_bytes(raw))
    }

    /// Unsigned smart: one byte below 128, otherwise two bytes minus 32768.
    pub fn gsmart(&mut self) -> ProtocolResult<u16> {
        if self.peek()? < 128 {
            Ok(self.g1()? as u16)
        } else {
            Ok(self.g2()? - 32768)
        }
    }

    /// Signed smart: one byte biased by 64, otherwise two bytes biased by 49152.
    pub fn gsmarts(&mut self) -> ProtocolResult<i16> {
        if self.peek()? < 128 {
            Ok(self.g1()? as i16 - 64)
        } else {
            Ok((self.g2()? as i32 - 49152) as i16)
        }
    }

    fn peek(&self) -> ProtocolResult<u8> {
        if let Some(bit_pos) = self.bit_pos {
            return Err(ProtocolError::BitModeActive { bit_pos });
        }
        self.data
            .get(self.pos)
            .copied()
            .ok_or(ProtocolError::Truncated {
                needed: 1,
                pos: self.pos,
                len: self.data.len(),
            })
    }

    /// Reads a terminated string. Invalid UTF-8 is replaced rather than rejected.
    pub fn gjstr(&mut self) -> ProtocolResult<String> {
        if let Some(bit_pos) = self.bit_pos {
            return Err(ProtocolError::BitModeActive { bit_pos });
        }
        let rest = &self.data[self.pos.min(self.data.len())..];
        let Some(end) = rest.iter().position(|b| STRING_TERMINATORS.contains(b)) else {
            return Err(ProtocolError::Truncated {
                needed: rest.len() + 1,
                pos: self.pos,
                len: self.data.len(),
            });
        };
        let text = String::from_utf8_lossy(&rest[..end]).into_owned();
        self.pos += end + 1;
        Ok(text)
    }

    pub fn gdata(&mut self, len: usize) -> ProtocolResult<&'a [u8]> {
        self.take(len)
    }

    pub fn skip(&mut self, len: usize) -> ProtocolResult<()> {
        self.take(len).map(|_| ())
    }

    /// Switches to bit mode at the current byte.
    pub fn bits(&mut self) -> ProtocolResult<()> {
        if let Some(bit_pos) = self.bit_pos {
            return Err(ProtocolError::BitModeActive { bit_pos });
        }
        self.bit_pos = Some(self.pos * 8);
        Ok(())
    }

    /// Bit position. Only meaningful in bit mode.
    pub fn bit_pos(&self) -> Option<usize> {
        self.bit_pos
    }

    pub fn gbit(&mut self, count: u32) -> ProtocolResult<u32> {
        debug_assert!(count <= 32);
        let Some(mut bit_pos) = self.bit_pos else {
            return Err(ProtocolError::ByteModeActive { pos: self.pos });
        };
        if bit_pos + count as usize > self.data.len() * 8 {
            return Err(ProtocolError::BitsTruncated {
                needed: count,
                bit_pos,
                len: self.data.len(),
            });
        }

        let mut value: u64 = 0;
        let mut left = count;
        while left > 0 {
            let byte = self.data[bit_pos >> 3] as u64;
            let available = 8 - (bit_pos & 7) as u32;
            let take = left.min(available);
            let shift = available - take;
            let chunk = (byte >> shift) & ((1u64 << take) - 1);
            value = (value << take) | chunk;
            left -= take;
            bit_pos += take as usize;
        }

        self.bit_pos = Some(bit_pos);
        Ok(value as u32)
    }

    /// Returns to byte mode, rounding up to the next byte boundary.
    pub fn bytes(&mut self) -> ProtocolResult<()> {
        let Some(bit_pos) = self.bit_pos.take() else {
            return Err(ProtocolError::ByteModeActive { pos: self.pos });
        };
        self.pos = bit_pos.div_ceil(8);
        Ok(())
    }

    /// Fails unless every byte of the body has been consumed.
    pub fn expect_consumed(&self, message: &'static str) -> ProtocolResult<()> {
        if self.bit_pos.is_some() || self.pos != self.data.len() {
            return Err(ProtocolError::SizeMismatch {
                message,
                consumed: self.bit_pos.map(|b| b.div_ceil(8)).unwrap_or(self.pos),
                declared: self.data.len(),
            });
        }
        Ok(())
    }
}

/// Growable output buffer mirroring [`Packet`].
#[derive(Debug, Default, Clone)]
pub struct PacketWriter {
    data: Vec<u8>,
    bit_pos: Option<usize>,
}

impl PacketWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity),
            bit_pos: None,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn into_inner(self) -> Vec<u8> {
        debug_assert!(self.bit_pos.is_none(), "writer finished in bit mode");
        self.data
    }

    fn assert_byte_mode(&self) {
        debug_assert!(self.bit_pos.is_none(), "byte write while in bit mode");
    }

    pub fn p1(&mut self, value: u8) {
        self.assert_byte_mode();
        self.data.push(value);
    }

    /// Writes an opcode offset by the next value of the outbound cipher.
    pub fn p1isaac(&mut self, opcode: u8, cipher: &mut Isaac) {
        self.p1(opcode.wrapping_add(cipher.next_int() as u8));
    }

    pub fn p2(&mut self, value: u16) {
        self.assert_byte_mode();
        self.data.extend_from_slice(&value.to_be_bytes());
    }

    pub fn p4(&mut self, value: u32) {
        self.assert_byte_mode();
        self.data.extend_from_slice(&value.to_be_bytes());
    }

    pub fn p8(&mut self, value: u64) {
        self.assert_byte_mode();
        self.data.extend_from_slice(&value.to_be_bytes());
    }

    pub fn psmart(&mut self, value: u16) {
        if value < 128 {
            self.p1(value as u8);
        } else {
            self.p2(value + 32768);
        }
    }

    pub fn psmarts(&mut self, value: i16) {
        if (-64..64).contains(&value) {
            self.p1((value + 64) as u8);
        } else {
            self.p2((value as i32 + 49152) as u16);
        }
    }

    pub fn pjstr(&mut self, text: &str) {
        self.pdata(text.as_bytes());
        self.p1(0);
    }

    pub fn pdata(&mut self, bytes: &[u8]) {
        self.assert_byte_mode();
        self.data.extend_from_slice(bytes);
    }

    /// Overwrites a previously written byte, used to back-fill size prefixes.
    pub fn set_u8(&mut self, pos: usize, value: u8) {
        self.data[pos] = value;
    }

    pub fn set_u16(&mut self, pos: usize, value: u16) {
        self.data[pos..pos + 2].copy_from_slice(&value.to_be_bytes());
    }

    pub fn bits(&mut self) {
        self.assert_byte_mode();
        self.bit_pos = Some(self.data.len() * 8);
    }

    pub fn pbit(&mut self, count: u32, value: u32) {
        let Some(mut bit_pos) = self.bit_pos else {
            debug_assert!(false, "bit write while in byte mode");
            return;
        };
        for i in (0..count).rev() {
            let byte_index = bit_pos >> 3;
            if byte_index >= self.data.len() {
                self.data.push(0);
            }
            if (value >> i) & 1 != 0 {
                self.data[byte_index] |= 0x80 >> (bit_pos & 7);
            }
            bit_pos += 1;
        }
        self.bit_pos = Some(bit_pos);
    }

    pub fn bit_pos(&self) -> Option<usize> {
        self.bit_pos
    }

    pub fn bytes(&mut self) {
        if let Some(bit_pos) = self.bit_pos.take() {
            self.data.resize(bit_pos.div_ceil(8), 0);
        }
    }
}
