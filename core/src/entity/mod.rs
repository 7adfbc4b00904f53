//! Mobile entities: the state players and NPCs share.
//!
//! Positions are kept twice. `route_x`/`route_z` hold region-local tiles the
//! server has moved the entity to (index 0 is the newest), while `x`/`z` are
//! fine units the simulator walks toward the oldest pending tile.

pub mod npc;
pub mod player;

pub use npc::Npc;
pub use player::{Appearance, LocMerge, Player};

use crate::constants::{HALF_TILE, HIT_DURATION, HIT_SLOTS, ROUTE_CAPACITY, TILE_UNITS};
use crate::types::TypeTables;

/// Step deltas for the 3-bit direction codes, clockwise from north-west.
pub const DIRECTION_DELTAS: [(i32, i32); 8] = [
    (-1, 1),
    (0, 1),
    (1, 1),
    (-1, 0),
    (1, 0),
    (-1, -1),
    (0, -1),
    (1, -1),
];

/// Facing at the end of an exact move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FacingDirection {
    North,
    East,
    South,
    West,
}

impl FacingDirection {
    pub fn from_wire(value: u8) -> Self {
        match value & 3 {
            0 => FacingDirection::North,
            1 => FacingDirection::East,
            2 => FacingDirection::South,
            _ => FacingDirection::West,
        }
    }

    pub fn to_wire(self) -> u8 {
        self as u8
    }

    pub fn yaw(self) -> i32 {
        match self {
            FacingDirection::North => 1024,
            FacingDirection::East => 1536,
            FacingDirection::South => 0,
            FacingDirection::West => 512,
        }
    }
}

/// Server-scripted movement between two tiles over a tick window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForcedMove {
    pub start_x: i32,
    pub start_z: i32,
    pub end_x: i32,
    pub end_z: i32,
    /// Tick the entity must be standing on the start tile.
    pub arrive_start: i32,
    /// Tick the entity reaches the end tile.
    pub arrive_end: i32,
    pub facing: FacingDirection,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Hit {
    pub damage: i32,
    pub kind: i32,
    /// Tick the splat disappears; a slot is free once this has passed.
    pub expires: i32,
}

/// Animation ids used for plain locomotion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MovementAnims {
    pub stand: i32,
    pub turn: i32,
    pub walk: i32,
    pub turn_around: i32,
    pub turn_left: i32,
    pub turn_right: i32,
    pub run: i32,
}

impl Default for MovementAnims {
    fn default() -> Self {
        MovementAnims {
            stand: -1,
            turn: -1,
            walk: -1,
            turn_around: -1,
            turn_left: -1,
            turn_right: -1,
            run: -1,
        }
    }
}

/// An entity-attached graphic such as a spell impact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntitySpotAnim {
    pub id: i32,
    pub height: i32,
    pub start: i32,
    pub frame: i32,
    pub cycle: i32,
}

#[derive(Debug, Clone)]
pub struct PathingEntity {
    pub x: i32,
    pub z: i32,
    pub size: i32,
    pub yaw: i32,
    pub dst_yaw: i32,

    pub route_x: [i32; ROUTE_CAPACITY],
    pub route_z: [i32; ROUTE_CAPACITY],
    pub route_run: [bool; ROUTE_CAPACITY],
    pub route_len: usize,
    /// Route tiles queued before the current primary sequence started.
    pub preanim_route_len: usize,
    /// Ticks movement was held back by an animation; spent as extra speed.
    pub seq_delay_move: i32,

    pub anims: MovementAnims,
    pub secondary_seq: i32,
    pub secondary_frame: i32,
    pub secondary_cycle: i32,

    pub primary_seq: i32,
    pub primary_frame: i32,
    pub primary_cycle: i32,
    pub primary_delay: i32,
    pub primary_loop: i32,

    pub spotanim: Option<EntitySpotAnim>,

    /// `-1` for none, below 32768 an NPC index, otherwise 32768 + player id.
    pub face_entity: i32,
    /// Absolute half-tile coordinates to face once idle.
    pub face_tile: Option<(i32, i32)>,

    pub forced_move: Option<ForcedMove>,

    pub hits: [Hit; HIT_SLOTS],
    pub combat_until: i32,
    pub health: i32,
    pub total_health: i32,

    pub chat: Option<String>,
    pub chat_color: i32,
    pub chat_style: i32,
    pub chat_timer: i32,

    /// Tick this slot was last refreshed by an info packet.
    pub last_seen: i32,
}

impl Default for PathingEntity {
    fn default() -> Self {
        PathingEntity {
            x: 0,
            z: 0,
            size: 1,
            yaw: 0,
            dst_yaw: 0,
            route_x: [0; ROUTE_CAPACITY],
            route_z: [0; ROUTE_CAPACITY],
            route_run: [false; ROUTE_CAPACITY],
            route_len: 0,
            preanim_route_len: 0,
            seq_delay_move: 0,
            anims: MovementAnims::default(),
            secondary_seq: -1,
            secondary_frame: 0,
            secondary_cycle: 0,
            primary_seq: -1,
            primary_frame: 0,
            primary_cycle: 0,
            primary_delay: 0,
            primary_loop: 0,
            spotanim: None,
            face_entity: -1,
            face_tile: None,
            forced_move: None,
            hits: [Hit::default(); HIT_SLOTS],
            combat_until: -1000,
            health: 0,
            total_health: 0,
            chat: None,
            chat_color: 0,
            chat_style: 0,
            chat_timer: 0,
            last_seen: -1,
        }
    }
}

impl PathingEntity {
    /// Fine position of the centre of `tile` for this entity's footprint.
    pub fn tile_centre(&self, tile: i32) -> i32 {
        tile * TILE_UNITS + self.size * HALF_TILE
    }

    /// Newest server tile.
    pub fn tile(&self) -> (i32, i32) {
        (self.route_x[0], self.route_z[0])
    }

    fn push_route(&mut self, x: i32, z: i32, run: bool) {
        if self.route_len < ROUTE_CAPACITY - 1 {
            self.route_len += 1;
        }
        for i in (1..=self.route_len.min(ROUTE_CAPACITY - 1)).rev() {
            self.route_x[i] = self.route_x[i - 1];
            self.route_z[i] = self.route_z[i - 1];
            self.route_run[i] = self.route_run[i - 1];
        }
        self.route_x[0] = x;
        self.route_z[0] = z;
        self.route_run[0] = run;
    }

    fn abort_on_move(&mut self, types: &TypeTables) {
        if let Some(seq) = types.seq(self.primary_seq) {
            if seq.postanim_move == 1 {
                self.primary_seq = -1;
            }
        }
    }

    /// Places the entity at a tile. Short hops without `jump` are walked;
    /// anything else snaps.
    pub fn teleport(&mut self, types: &TypeTables, jump: bool, x: i32, z: i32) {
        self.abort_on_move(types);
        if !jump {
            let dx = x - self.route_x[0];
            let dz = z - self.route_z[0];
            if (-8..=8).contains(&dx) && (-8..=8).contains(&dz) {
                self.push_route(x, z, false);
                return;
            }
        }
        self.route_len = 0;
        self.seq_delay_move = 0;
        self.preanim_route_len = 0;
        self.route_x[0] = x;
        self.route_z[0] = z;
        self.route_run[0] = false;
        self.x = self.tile_centre(x);
        self.z = self.tile_centre(z);
    }

    /// Queues one tile in direction `dir` from the newest route tile.
    pub fn step(&mut self, types: &TypeTables, running: bool, dir: u32) {
        let (dx, dz) = DIRECTION_DELTAS[(dir & 7) as usize];
        let (x, z) = (self.route_x[0] + dx, self.route_z[0] + dz);
        self.abort_on_move(types);
        self.push_route(x, z, running);
    }

    /// Drops all pending movement and snaps to the newest tile.
    pub fn snap_to_route(&mut self) {
        self.x = self.tile_centre(self.route_x[0]);
        self.z = self.tile_centre(self.route_z[0]);
        self.route_len = 0;
        self.seq_delay_move = 0;
    }

    /// Shows a hit-splat in the first free slot. Dropped when all are busy.
    pub fn hit(&mut self, tick: i32, kind: i32, damage: i32) {
        if let Some(slot) = self.hits.iter_mut().find(|h| h.expires <= tick) {
            *slot = Hit {
                damage,
                kind,
                expires: tick + HIT_DURATION,
            };
        }
    }

    /// Starts a primary sequence, honouring priority and replay rules.
    pub fn apply_sequence(&mut self, types: &TypeTables, seq_id: i32, delay: i32) {
        if seq_id == self.primary_seq && seq_id != -1 {
            match types.seq(seq_id).map(|s| s.replay_mode) {
                Some(1) => {
                    self.primary_frame = 0;
                    self.primary_cycle = 0;
                    self.primary_delay = delay;
                    self.primary_loop = 0;
                }
                Some(2) => self.primary_loop = 0,
                _ => {}
            }
            return;
        }

        let replaces = seq_id == -1
            || self.primary_seq == -1
            || match (types.seq(seq_id), types.seq(self.primary_seq)) {
                (Some(new), Some(current)) => new.priority >= current.priority,
                _ => true,
            };
        if replaces {
            self.primary_seq = seq_id;
            self.primary_frame = 0;
            self.primary_cycle = 0;
            self.primary_delay = delay;
            self.primary_loop = 0;
            self.preanim_route_len = self.route_len;
        }
    }

    pub fn set_spotanim(&mut self, tick: i32, id: i32, height_delay: u32) {
        if id == -1 {
            self.spotanim = None;
            return;
        }
        let start = tick + (height_delay & 0xffff) as i32;
        self.spotanim = Some(EntitySpotAnim {
            id,
            height: (height_delay >> 16) as i32,
            start,
            frame: if start > tick { -1 } else { 0 },
            cycle: 0,
        });
    }

    pub fn say(&mut self, text: String, color: i32, style: i32, duration: i32) {
        self.chat = Some(text);
        self.chat_color = color;
        self.chat_style = style;
        self.chat_timer = duration;
    }

    /// Moves every fine and tile coordinate by whole tiles.
    pub fn shift(&mut self, dx: i32, dz: i32) {
        self.x -= dx * TILE_UNITS;
        self.z -= dz * TILE_UNITS;
        for i in 0..ROUTE_CAPACITY {
            self.route_x[i] -= dx;
            self.route_z[i] -= dz;
        }
        if let Some(forced) = self.forced_move.as_mut() {
            forced.start_x -= dx;
            forced.start_z -= dz;
            forced.end_x -= dx;
            forced.end_z -= dz;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SeqType;

    fn tables_with(seqs: &[(u16, SeqType)]) -> TypeTables {
        let mut tables = TypeTables::default();
        for (id, seq) in seqs {
            tables.seqs.insert(*id, seq.clone());
        }
        tables
    }

    #[test]
    fn step_queues_newest_first() {
        let types = TypeTables::default();
        let mut e = PathingEntity::default();
        e.teleport(&types, true, 50, 50);
        e.step(&types, false, 4);
        e.step(&types, true, 1);
        assert_eq!(e.route_len, 2);
        assert_eq!(e.tile(), (51, 51));
        assert_eq!((e.route_x[1], e.route_z[1]), (51, 50));
        assert!(e.route_run[0]);
        assert!(!e.route_run[1]);
    }

    #[test]
    fn route_is_bounded() {
        let types = TypeTables::default();
        let mut e = PathingEntity::default();
        e.teleport(&types, true, 10, 10);
        for _ in 0..40 {
            e.step(&types, false, 4);
        }
        assert_eq!(e.route_len, ROUTE_CAPACITY - 1);
        assert_eq!(e.tile(), (50, 10));
    }

    #[test]
    fn teleport_snaps_when_far_or_jumping() {
        let types = TypeTables::default();
        let mut e = PathingEntity::default();
        e.teleport(&types, true, 20, 20);
        assert_eq!((e.x, e.z), (20 * 128 + 64, 20 * 128 + 64));

        e.teleport(&types, false, 22, 21);
        assert_eq!(e.route_len, 1);
        assert_eq!((e.x, e.z), (20 * 128 + 64, 20 * 128 + 64));

        e.teleport(&types, false, 40, 40);
        assert_eq!(e.route_len, 0);
        assert_eq!(e.x, 40 * 128 + 64);
    }

    #[test]
    fn hits_fill_free_slots_only() {
        let mut e = PathingEntity::default();
        for damage in 0..5 {
            e.hit(100, 1, damage);
        }
        assert_eq!(e.hits.iter().map(|h| h.damage).collect::<Vec<_>>(), vec![0, 1, 2, 3]);
        e.hit(170, 1, 9);
        assert_eq!(e.hits[0].damage, 9);
        assert_eq!(e.hits[0].expires, 240);
    }

    #[test]
    fn lower_priority_sequence_is_ignored() {
        let types = tables_with(&[
            (1, SeqType { priority: 5, ..SeqType::default() }),
            (2, SeqType { priority: 3, ..SeqType::default() }),
        ]);
        let mut e = PathingEntity::default();
        e.apply_sequence(&types, 1, 0);
        e.apply_sequence(&types, 2, 0);
        assert_eq!(e.primary_seq, 1);
        e.apply_sequence(&types, -1, 0);
        assert_eq!(e.primary_seq, -1);
    }

    #[test]
    fn replay_mode_restarts_same_sequence() {
        let types = tables_with(&[(4, SeqType { replay_mode: 1, ..SeqType::default() })]);
        let mut e = PathingEntity::default();
        e.apply_sequence(&types, 4, 0);
        e.primary_frame = 3;
        e.primary_loop = 2;
        e.apply_sequence(&types, 4, 7);
        assert_eq!((e.primary_frame, e.primary_loop, e.primary_delay), (0, 0, 7));
    }

    #[test]
    fn aborting_sequence_stops_on_step() {
        let types = tables_with(&[(9, SeqType { postanim_move: 1, ..SeqType::default() })]);
        let mut e = PathingEntity::default();
        e.apply_sequence(&types, 9, 0);
        e.step(&types, false, 1);
        assert_eq!(e.primary_seq, -1);
    }
}
