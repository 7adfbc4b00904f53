use super::{MovementAnims, PathingEntity};
use crate::error::ProtocolResult;
use crate::packet::{Packet, PacketWriter};
use crate::text::base37;

pub const BODY_SLOTS: usize = 12;
pub const COLOUR_SLOTS: usize = 5;

/// Decoded appearance block.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Appearance {
    pub gender: u8,
    pub head_icon: u8,
    /// 0 = empty, below 0x200 a body kit, otherwise an equipped object.
    pub body: [u16; BODY_SLOTS],
    pub colours: [u8; COLOUR_SLOTS],
    pub anims: MovementAnims,
    pub name: String,
    pub combat_level: u8,
}

fn put_anim(w: &mut PacketWriter, id: i32) {
    w.p2(if id < 0 { u16::MAX } else { id as u16 });
}

impl Appearance {
    pub fn decode(p: &mut Packet<'_>) -> ProtocolResult<Self> {
        let gender = p.g1()?;
        let head_icon = p.g1()?;

        let mut body = [0u16; BODY_SLOTS];
        for slot in body.iter_mut() {
            let msb = p.g1()?;
            *slot = if msb == 0 {
                0
            } else {
                ((msb as u16) << 8) + p.g1()? as u16
            };
        }

        let mut colours = [0u8; COLOUR_SLOTS];
        for colour in colours.iter_mut() {
            *colour = p.g1()?;
        }

        let anims = MovementAnims {
            stand: p.g2_opt()?,
            turn: p.g2_opt()?,
            walk: p.g2_opt()?,
            turn_around: p.g2_opt()?,
            turn_left: p.g2_opt()?,
            turn_right: p.g2_opt()?,
            run: p.g2_opt()?,
        };

        let name = base37::display_name(p.g8()?);
        let combat_level = p.g1()?;

        Ok(Appearance {
            gender,
            head_icon,
            body,
            colours,
            anims,
            name,
            combat_level,
        })
    }

    pub fn encode(&self, w: &mut PacketWriter) {
        w.p1(self.gender);
        w.p1(self.head_icon);
        for &slot in &self.body {
            if slot == 0 {
                w.p1(0);
            } else {
                w.p2(slot);
            }
        }
        for &colour in &self.colours {
            w.p1(colour);
        }
        for id in [
            self.anims.stand,
            self.anims.turn,
            self.anims.walk,
            self.anims.turn_around,
            self.anims.turn_left,
            self.anims.turn_right,
            self.anims.run,
        ] {
            put_anim(w, id);
        }
        w.p8(base37::encode(&self.name));
        w.p1(self.combat_level);
    }
}

/// A loc temporarily drawn as part of a player (e.g. climbing a rope).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocMerge {
    pub loc_id: i32,
    pub start: i32,
    pub end: i32,
    /// Fine-unit centre of the loc.
    pub offset_x: i32,
    pub offset_z: i32,
    pub min_x: i32,
    pub max_x: i32,
    pub min_z: i32,
    pub max_z: i32,
}

impl LocMerge {
    pub fn active(&self, tick: i32) -> bool {
        tick >= self.start && tick < self.end
    }
}

#[derive(Debug, Clone, Default)]
pub struct Player {
    pub entity: PathingEntity,
    pub appearance: Option<Appearance>,
    pub loc_merge: Option<LocMerge>,
}

impl Player {
    pub fn name(&self) -> Option<&str> {
        self.appearance.as_ref().map(|a| a.name.as_str())
    }

    pub fn set_appearance(&mut self, appearance: Appearance) {
        self.entity.anims = appearance.anims;
        self.appearance = Some(appearance);
    }

    /// Visible once an appearance has arrived.
    pub fn is_visible(&self) -> bool {
        self.appearance.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Appearance {
        let mut body = [0u16; BODY_SLOTS];
        body[0] = 0x100 + 18;
        body[4] = 0x200 + 1205;
        Appearance {
            gender: 1,
            head_icon: 0,
            body,
            colours: [3, 0, 7, 1, 2],
            anims: MovementAnims {
                stand: 808,
                turn: 823,
                walk: 819,
                turn_around: 820,
                turn_left: 821,
                turn_right: 822,
                run: -1,
            },
            name: "Bob The Builder".chars().take(12).collect(),
            combat_level: 42,
        }
    }

    #[test]
    fn appearance_survives_the_wire() {
        let appearance = sample();
        let mut w = PacketWriter::new();
        appearance.encode(&mut w);
        let bytes = w.into_inner();

        let mut p = Packet::new(&bytes);
        let decoded = Appearance::decode(&mut p).unwrap();
        assert_eq!(p.remaining(), 0);
        assert_eq!(decoded.body, appearance.body);
        assert_eq!(decoded.anims, appearance.anims);
        assert_eq!(decoded.name, "Bob The Buil");
        assert_eq!(decoded.combat_level, 42);
    }

    #[test]
    fn setting_appearance_copies_movement_anims() {
        let mut player = Player::default();
        assert!(!player.is_visible());
        player.set_appearance(sample());
        assert_eq!(player.entity.anims.walk, 819);
        assert_eq!(player.name(), Some("Bob The Buil"));
    }

    #[test]
    fn loc_merge_window_is_half_open() {
        let merge = LocMerge {
            loc_id: 1,
            start: 10,
            end: 20,
            offset_x: 0,
            offset_z: 0,
            min_x: 0,
            max_x: 0,
            min_z: 0,
            max_z: 0,
        };
        assert!(!merge.active(9));
        assert!(merge.active(10));
        assert!(!merge.active(20));
    }
}
