//! Read-only per-tick view handed to whatever draws the world.

use serde::Serialize;

use crate::constants::LOCAL_PLAYER_INDEX;
use crate::entity::PathingEntity;
use crate::world::World;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EntityKind {
    LocalPlayer,
    Player,
    Npc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HitSplat {
    pub damage: i32,
    pub kind: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntityView {
    pub kind: EntityKind,
    /// Table slot.
    pub index: usize,
    pub x: i32,
    pub z: i32,
    pub yaw: i32,
    /// Primary sequence and frame, when one is playing.
    pub primary: Option<(i32, i32)>,
    pub secondary: Option<(i32, i32)>,
    pub spotanim: Option<i32>,
    pub chat: Option<String>,
    pub hits: Vec<HitSplat>,
    /// `(health, total)` while the health bar is showing.
    pub health: Option<(i32, i32)>,
    pub name: Option<String>,
    /// Merged loc id while a merge window is open.
    pub merged_loc: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorldSnapshot {
    pub tick: i32,
    pub base_x: i32,
    pub base_z: i32,
    pub level: usize,
    pub entities: Vec<EntityView>,
    pub loc_changes: usize,
    pub projectiles: usize,
    pub spotanims: usize,
    pub obj_tiles: usize,
}

fn view(kind: EntityKind, index: usize, e: &PathingEntity, tick: i32) -> EntityView {
    EntityView {
        kind,
        index,
        x: e.x,
        z: e.z,
        yaw: e.yaw,
        primary: (e.primary_seq != -1 && e.primary_delay == 0).then_some((e.primary_seq, e.primary_frame)),
        secondary: (e.secondary_seq != -1).then_some((e.secondary_seq, e.secondary_frame)),
        spotanim: e.spotanim.filter(|s| s.frame >= 0).map(|s| s.id),
        chat: e.chat.clone(),
        hits: e
            .hits
            .iter()
            .filter(|h| h.expires > tick)
            .map(|h| HitSplat {
                damage: h.damage,
                kind: h.kind,
            })
            .collect(),
        health: (e.combat_until > tick).then_some((e.health, e.total_health)),
        name: None,
        merged_loc: None,
    }
}

impl World {
    pub fn snapshot(&self) -> WorldSnapshot {
        let tick = self.tick;
        let mut entities = Vec::with_capacity(1 + self.player_ids.len() + self.npc_ids.len());

        let local = std::iter::once((EntityKind::LocalPlayer, LOCAL_PLAYER_INDEX));
        let others = self.player_ids.iter().map(|&i| (EntityKind::Player, i));
        for (kind, index) in local.chain(others) {
            if let Some(player) = self.players.get(index).and_then(Option::as_ref) {
                let mut v = view(kind, index, &player.entity, tick);
                v.name = player.name().map(str::to_owned);
                v.merged_loc = player
                    .loc_merge
                    .filter(|merge| merge.active(tick))
                    .map(|merge| merge.loc_id);
                entities.push(v);
            }
        }
        for &index in &self.npc_ids {
            if let Some(npc) = self.npcs.get(index).and_then(Option::as_ref) {
                entities.push(view(EntityKind::Npc, index, &npc.entity, tick));
            }
        }

        WorldSnapshot {
            tick,
            base_x: self.base_x,
            base_z: self.base_z,
            level: self.level,
            entities,
            loc_changes: self.loc_changes.len(),
            projectiles: self.projectiles.len(),
            spotanims: self.spotanims.len(),
            obj_tiles: self.objs.tile_count(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::Npc;
    use crate::types::TypeTables;

    #[test]
    fn snapshot_lists_local_player_first() {
        let mut world = World::new(TypeTables::default());
        let mut npc = Npc::default();
        npc.entity.hit(0, 1, 12);
        npc.entity.combat_until = 400;
        npc.entity.health = 3;
        npc.entity.total_health = 10;
        world.npcs[4] = Some(npc);
        world.npc_ids.push(4);

        let snap = world.snapshot();
        assert_eq!(snap.entities.len(), 2);
        assert_eq!(snap.entities[0].kind, EntityKind::LocalPlayer);
        let npc = &snap.entities[1];
        assert_eq!(npc.index, 4);
        assert_eq!(npc.hits, vec![HitSplat { damage: 12, kind: 1 }]);
        assert_eq!(npc.health, Some((3, 10)));
    }

    #[test]
    fn snapshot_serializes() {
        let world = World::new(TypeTables::default());
        let text = serde_json::to_string(&world.snapshot()).unwrap();
        assert!(text.contains("LocalPlayer"));
    }
}
