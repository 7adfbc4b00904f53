//! Server opcodes and their framing.
//!
//! Numeric codes appear only here; everything past the decoder matches on
//! [`ServerProt`].

/// How a frame's body length is determined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketLength {
    Fixed(u16),
    /// One length byte follows the opcode.
    VarByte,
    /// Two length bytes follow the opcode.
    VarShort,
    /// Not a valid opcode.
    Unused,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ServerProt {
    NpcInfo = 1,
    MessageGame = 4,
    UpdateZoneFullFollows = 7,
    LocAddChange = 23,
    LocAnim = 42,
    ObjDel = 49,
    ObjReveal = 50,
    LocMerge = 59,
    MapProjAnim = 69,
    LocDel = 76,
    UpdateZonePartialFollows = 135,
    ResetAnims = 136,
    UpdatePid = 139,
    Logout = 142,
    ObjCount = 151,
    UpdateZonePartialEnclosed = 162,
    PlayerInfo = 184,
    MapAnim = 191,
    ObjAdd = 223,
    RebuildNormal = 237,
}

impl ServerProt {
    pub fn length(self) -> PacketLength {
        use PacketLength::*;
        use ServerProt::*;
        match self {
            NpcInfo => VarShort,
            MessageGame => VarByte,
            UpdateZoneFullFollows => Fixed(2),
            LocAddChange => Fixed(4),
            LocAnim => Fixed(4),
            ObjDel => Fixed(3),
            ObjReveal => Fixed(7),
            LocMerge => Fixed(14),
            MapProjAnim => Fixed(15),
            LocDel => Fixed(2),
            UpdateZonePartialFollows => Fixed(2),
            ResetAnims => Fixed(0),
            UpdatePid => Fixed(2),
            Logout => Fixed(0),
            ObjCount => Fixed(7),
            UpdateZonePartialEnclosed => VarShort,
            PlayerInfo => VarShort,
            MapAnim => Fixed(6),
            ObjAdd => Fixed(5),
            RebuildNormal => VarShort,
        }
    }

    /// Messages that may appear inside a zone envelope.
    pub fn is_zone_message(self) -> bool {
        use ServerProt::*;
        matches!(
            self,
            LocAddChange | LocAnim | ObjDel | ObjReveal | LocMerge | MapProjAnim | LocDel | ObjCount | MapAnim | ObjAdd
        )
    }

    pub fn name(self) -> &'static str {
        use ServerProt::*;
        match self {
            NpcInfo => "NPC_INFO",
            MessageGame => "MESSAGE_GAME",
            UpdateZoneFullFollows => "UPDATE_ZONE_FULL_FOLLOWS",
            LocAddChange => "LOC_ADD_CHANGE",
            LocAnim => "LOC_ANIM",
            ObjDel => "OBJ_DEL",
            ObjReveal => "OBJ_REVEAL",
            LocMerge => "LOC_MERGE",
            MapProjAnim => "MAP_PROJANIM",
            LocDel => "LOC_DEL",
            UpdateZonePartialFollows => "UPDATE_ZONE_PARTIAL_FOLLOWS",
            ResetAnims => "RESET_ANIMS",
            UpdatePid => "UPDATE_PID",
            Logout => "LOGOUT",
            ObjCount => "OBJ_COUNT",
            UpdateZonePartialEnclosed => "UPDATE_ZONE_PARTIAL_ENCLOSED",
            PlayerInfo => "PLAYER_INFO",
            MapAnim => "MAP_ANIM",
            ObjAdd => "OBJ_ADD",
            RebuildNormal => "REBUILD_NORMAL",
        }
    }
}

impl TryFrom<u8> for ServerProt {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        use ServerProt::*;
        Ok(match value {
            1 => NpcInfo,
            4 => MessageGame,
            7 => UpdateZoneFullFollows,
            23 => LocAddChange,
            42 => LocAnim,
            49 => ObjDel,
            50 => ObjReveal,
            59 => LocMerge,
            69 => MapProjAnim,
            76 => LocDel,
            135 => UpdateZonePartialFollows,
            136 => ResetAnims,
            139 => UpdatePid,
            142 => Logout,
            151 => ObjCount,
            162 => UpdateZonePartialEnclosed,
            184 => PlayerInfo,
            191 => MapAnim,
            223 => ObjAdd,
            237 => RebuildNormal,
            other => return Err(other),
        })
    }
}

/// Length rule for any opcode byte.
pub fn packet_length(opcode: u8) -> PacketLength {
    ServerProt::try_from(opcode)
        .map(ServerProt::length)
        .unwrap_or(PacketLength::Unused)
}

/// Client opcode for walking to a clicked tile.
pub const CLIENT_MOVE_GAMECLICK: u8 = 181;
/// Client opcode for walking toward something the player interacted with.
pub const CLIENT_MOVE_OPCLICK: u8 = 93;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_variant_round_trips_its_code() {
        for code in 0..=255u8 {
            if let Ok(prot) = ServerProt::try_from(code) {
                assert_eq!(prot as u8, code);
                assert_ne!(prot.length(), PacketLength::Unused);
            } else {
                assert_eq!(packet_length(code), PacketLength::Unused);
            }
        }
    }

    #[test]
    fn zone_messages_have_fixed_lengths() {
        for code in 0..=255u8 {
            if let Ok(prot) = ServerProt::try_from(code) {
                if prot.is_zone_message() {
                    assert!(matches!(prot.length(), PacketLength::Fixed(_)), "{}", prot.name());
                }
            }
        }
    }
}
