//! Text codecs: base-37 names and the nibble-packed chat alphabet.

use crate::error::ProtocolResult;
use crate::packet::{Packet, PacketWriter};

pub mod base37 {
    const ALPHABET: &[u8; 37] = b"_abcdefghijklmnopqrstuvwxyz0123456789";
    /// 37^12; encoded names are at most twelve characters.
    const LIMIT: u64 = 6_582_952_005_840_035_281;

    pub const INVALID_NAME: &str = "invalid_name";

    /// Encodes up to the first twelve characters of `name`. Characters outside
    /// the alphabet encode as `_`.
    pub fn encode(name: &str) -> u64 {
        let mut value: u64 = 0;
        for c in name.chars().take(12) {
            value *= 37;
            match c {
                'a'..='z' => value += 1 + (c as u64 - 'a' as u64),
                'A'..='Z' => value += 1 + (c as u64 - 'A' as u64),
                '0'..='9' => value += 27 + (c as u64 - '0' as u64),
                _ => {}
            }
        }
        while value != 0 && value % 37 == 0 {
            value /= 37;
        }
        value
    }

    /// Decodes to the raw lower-case form with underscores.
    pub fn decode(mut value: u64) -> String {
        if value == 0 || value >= LIMIT || value % 37 == 0 {
            return INVALID_NAME.to_string();
        }
        let mut out = Vec::with_capacity(12);
        while value != 0 {
            out.push(ALPHABET[(value % 37) as usize]);
            value /= 37;
        }
        out.reverse();
        String::from_utf8_lossy(&out).into_owned()
    }

    /// Display form: underscores become spaces and each word is capitalised.
    pub fn format_name(raw: &str) -> String {
        let mut out = String::with_capacity(raw.len());
        let mut word_start = true;
        for c in raw.chars() {
            if c == '_' {
                out.push(' ');
                word_start = true;
            } else if word_start {
                out.extend(c.to_uppercase());
                word_start = false;
            } else {
                out.push(c);
            }
        }
        out
    }

    pub fn display_name(value: u64) -> String {
        format_name(&decode(value))
    }
}

pub mod word_pack {
    use super::*;

    const TABLE: [char; 61] = [
        ' ', 'e', 't', 'a', 'o', 'i', 'h', 'n', 's', 'r', 'd', 'l', 'u', 'm', 'w', 'c', 'y', 'f',
        'g', 'p', 'b', 'v', 'k', 'x', 'j', 'q', 'z', '0', '1', '2', '3', '4', '5', '6', '7', '8',
        '9', ' ', '!', '?', '.', ',', ':', ';', '(', ')', '-', '&', '*', '\\', '\'', '@', '#', '+',
        '=', '\u{a3}', '$', '%', '"', '[', ']',
    ];
    /// Characters with a table index below this fit in one nibble.
    const NIBBLE_LIMIT: usize = 13;
    const ESCAPE_BIAS: usize = 195;
    pub const MAX_CHARS: usize = 80;

    /// Reads `len` packed bytes and returns the message in sentence case.
    pub fn unpack(packet: &mut Packet<'_>, len: usize) -> ProtocolResult<String> {
        let mut out = String::with_capacity(len * 2);
        let mut carry: Option<usize> = None;
        for _ in 0..len {
            let value = packet.g1()? as usize;
            for nibble in [value >> 4, value & 0xf] {
                match carry.take() {
                    None if nibble < NIBBLE_LIMIT => out.push(TABLE[nibble]),
                    None => carry = Some(nibble),
                    Some(high) => {
                        let index = ((high << 4) + nibble).wrapping_sub(ESCAPE_BIAS);
                        out.push(TABLE.get(index).copied().unwrap_or(' '));
                    }
                }
            }
        }
        // An odd number of nibbles is padded with the index-0 space.
        let trimmed = out.trim_end();
        Ok(to_sentence_case(trimmed))
    }

    /// Packs `text`, lower-cased and cut to the message limit.
    pub fn pack(writer: &mut PacketWriter, text: &str) {
        let mut carry: Option<usize> = None;
        for c in text.chars().take(MAX_CHARS).flat_map(char::to_lowercase) {
            let mut index = TABLE.iter().position(|&t| t == c).unwrap_or(0);
            if index >= NIBBLE_LIMIT {
                index += ESCAPE_BIAS;
            }
            match carry.take() {
                None if index < NIBBLE_LIMIT => carry = Some(index),
                None => writer.p1(index as u8),
                Some(high) if index < NIBBLE_LIMIT => writer.p1(((high << 4) + index) as u8),
                Some(high) => {
                    writer.p1(((high << 4) + (index >> 4)) as u8);
                    carry = Some(index & 0xf);
                }
            }
        }
        if let Some(high) = carry {
            writer.p1((high << 4) as u8);
        }
    }

    pub fn to_sentence_case(text: &str) -> String {
        let mut out = String::with_capacity(text.len());
        let mut capitalise = true;
        for c in text.chars().flat_map(char::to_lowercase) {
            if capitalise && c.is_ascii_lowercase() {
                out.push(c.to_ascii_uppercase());
                capitalise = false;
            } else {
                out.push(c);
            }
            if matches!(c, '.' | '!' | '?') {
                capitalise = true;
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base37_round_trips_names() {
        let value = base37::encode("zezima");
        assert_eq!(base37::decode(value), "zezima");
        assert_eq!(base37::display_name(base37::encode("mod_ash")), "Mod Ash");
    }

    #[test]
    fn base37_rejects_out_of_range_values() {
        assert_eq!(base37::decode(0), base37::INVALID_NAME);
        assert_eq!(base37::decode(37), base37::INVALID_NAME);
        assert_eq!(base37::decode(u64::MAX), base37::INVALID_NAME);
    }

    #[test]
    fn base37_truncates_to_twelve() {
        let value = base37::encode("abcdefghijklmnop");
        assert_eq!(base37::decode(value), "abcdefghijkl");
    }

    #[test]
    fn word_pack_round_trip_with_escapes() {
        let mut w = PacketWriter::new();
        word_pack::pack(&mut w, "Hello there! how are you? fine.");
        let bytes = w.into_inner();
        let mut p = Packet::new(&bytes);
        let text = word_pack::unpack(&mut p, bytes.len()).unwrap();
        assert_eq!(text, "Hello there! How are you? Fine.");
        assert_eq!(p.remaining(), 0);
    }

    #[test]
    fn word_pack_common_letters_take_half_a_byte() {
        let mut w = PacketWriter::new();
        word_pack::pack(&mut w, "tea ");
        assert_eq!(w.len(), 2);
    }

    #[test]
    fn word_pack_limits_length() {
        let long = "a".repeat(200);
        let mut w = PacketWriter::new();
        word_pack::pack(&mut w, &long);
        assert_eq!(w.len(), word_pack::MAX_CHARS / 2);
    }

    #[test]
    fn sentence_case_after_terminators() {
        assert_eq!(word_pack::to_sentence_case("HI. yes!no"), "Hi. Yes!No");
    }
}
