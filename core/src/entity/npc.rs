use super::{MovementAnims, PathingEntity};
use crate::types::TypeTables;

#[derive(Debug, Clone, Default)]
pub struct Npc {
    pub entity: PathingEntity,
    pub type_id: u16,
}

impl Npc {
    /// Switches the NPC to another type, picking up its size and locomotion.
    /// Unknown types keep the default 1x1 footprint and no animations.
    pub fn set_type(&mut self, types: &TypeTables, type_id: u16) {
        self.type_id = type_id;
        let ty = types.npc(type_id as i32).cloned().unwrap_or_default();
        self.entity.size = ty.size;
        self.entity.anims = MovementAnims {
            stand: ty.stand_seq,
            turn: -1,
            walk: ty.walk_seq,
            turn_around: ty.turn_around_seq,
            turn_left: ty.turn_left_seq,
            turn_right: ty.turn_right_seq,
            run: -1,
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NpcType;

    #[test]
    fn type_sets_size_and_anims() {
        let mut types = TypeTables::default();
        types.npcs.insert(
            50,
            NpcType {
                size: 2,
                walk_seq: 11,
                ..NpcType::default()
            },
        );
        let mut npc = Npc::default();
        npc.set_type(&types, 50);
        assert_eq!(npc.entity.size, 2);
        assert_eq!(npc.entity.anims.walk, 11);

        npc.set_type(&types, 51);
        assert_eq!(npc.entity.size, 1);
    }
}
