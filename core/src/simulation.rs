//! Per-tick movement and animation.
//!
//! Every tick runs the local player, then the tracked players in server
//! order, then the tracked NPCs, and finally the transient effects. Each
//! entity goes through bounds correction, movement (forced or along its
//! route), facing, and sequence advancement, in that order.

use crate::constants::{
    ENTITY_MAX_FINE, ENTITY_MIN_FINE, HALF_TILE, LOCAL_MAX_FINE, LOCAL_MIN_FINE, LOCAL_PLAYER_INDEX,
    RADIANS_TO_YAW, TURN_SPEED, YAW_MASK, YAW_UNITS,
};
use crate::entity::PathingEntity;
use crate::types::TypeTables;
use crate::world::World;

/// Furthest an entity may lag behind its route before it is snapped forward.
const MAX_ROUTE_LAG: i32 = 256;

/// Inputs that come from outside the entity being updated.
#[derive(Debug, Clone, Copy)]
struct TickContext<'a> {
    types: &'a TypeTables,
    tick: i32,
    base_x: i32,
    base_z: i32,
    /// Fine position of the entity's face-entity target, if it resolves.
    face_target: Option<(i32, i32)>,
}

impl World {
    /// Runs `ticks` simulation ticks. Zero ticks changes nothing.
    pub fn advance(&mut self, ticks: u32) {
        for _ in 0..ticks {
            self.simulate_tick();
        }
    }

    fn simulate_tick(&mut self) {
        self.tick += 1;
        self.telemetry.record_tick();

        self.update_player(LOCAL_PLAYER_INDEX, true);
        for i in 0..self.player_ids.len() {
            let slot = self.player_ids[i];
            self.update_player(slot, false);
        }
        for i in 0..self.npc_ids.len() {
            let slot = self.npc_ids[i];
            self.update_npc(slot);
        }

        self.update_effects();
    }

    fn update_player(&mut self, slot: usize, local: bool) {
        let Some(face_entity) = self.players[slot].as_ref().map(|p| p.entity.face_entity) else {
            return;
        };
        let face_target = self.face_target(face_entity).map(|t| (t.x, t.z));
        let ctx = TickContext {
            types: &self.types,
            tick: self.tick,
            base_x: self.base_x,
            base_z: self.base_z,
            face_target,
        };
        let Some(player) = self.players[slot].as_mut() else {
            return;
        };
        update_entity(&ctx, &mut player.entity, local);
        if player.loc_merge.is_some_and(|merge| ctx.tick >= merge.end) {
            player.loc_merge = None;
        }
    }

    fn update_npc(&mut self, slot: usize) {
        let Some(face_entity) = self.npcs[slot].as_ref().map(|n| n.entity.face_entity) else {
            return;
        };
        let face_target = self.face_target(face_entity).map(|t| (t.x, t.z));
        let ctx = TickContext {
            types: &self.types,
            tick: self.tick,
            base_x: self.base_x,
            base_z: self.base_z,
            face_target,
        };
        if let Some(npc) = self.npcs[slot].as_mut() {
            update_entity(&ctx, &mut npc.entity, false);
        }
    }
}

fn update_entity(ctx: &TickContext<'_>, e: &mut PathingEntity, local: bool) {
    correct_bounds(e, local);

    match e.forced_move {
        Some(forced) if ctx.tick < forced.arrive_start => approach_forced_start(ctx, e),
        Some(forced) if ctx.tick <= forced.arrive_end => interpolate_forced_move(ctx, e),
        Some(_) => {
            e.forced_move = None;
            follow_route(ctx.types, e);
        }
        None => follow_route(ctx.types, e),
    }

    resolve_facing(ctx, e);
    advance_sequences(ctx, e);

    if e.chat_timer > 0 {
        e.chat_timer -= 1;
        if e.chat_timer == 0 {
            e.chat = None;
        }
    }
}

fn correct_bounds(e: &mut PathingEntity, local: bool) {
    let outside = |v: i32, min: i32, max: i32| v < min || v >= max;
    let mut lost = outside(e.x, ENTITY_MIN_FINE, ENTITY_MAX_FINE) || outside(e.z, ENTITY_MIN_FINE, ENTITY_MAX_FINE);
    if local {
        lost |= outside(e.x, LOCAL_MIN_FINE, LOCAL_MAX_FINE) || outside(e.z, LOCAL_MIN_FINE, LOCAL_MAX_FINE);
    }
    if lost {
        e.primary_seq = -1;
        e.spotanim = None;
        e.forced_move = None;
        e.snap_to_route();
    }
}

/// Before the window opens the entity closes on the start tile.
fn approach_forced_start(ctx: &TickContext<'_>, e: &mut PathingEntity) {
    let Some(forced) = e.forced_move else {
        return;
    };
    let remaining = forced.arrive_start - ctx.tick;
    let start_x = e.tile_centre(forced.start_x);
    let start_z = e.tile_centre(forced.start_z);
    e.x += (start_x - e.x) / remaining;
    e.z += (start_z - e.z) / remaining;
    e.seq_delay_move = 0;
    e.dst_yaw = forced.facing.yaw();
}

fn interpolate_forced_move(ctx: &TickContext<'_>, e: &mut PathingEntity) {
    let Some(forced) = e.forced_move else {
        return;
    };
    // A running animation holds the entity until its current frame is done.
    let free_to_move = ctx.tick == forced.arrive_end
        || e.primary_seq == -1
        || e.primary_delay != 0
        || ctx
            .types
            .seq(e.primary_seq)
            .is_none_or(|seq| e.primary_cycle + 1 > seq.delay(e.primary_frame));

    if free_to_move {
        let duration = forced.arrive_end - forced.arrive_start;
        let elapsed = ctx.tick - forced.arrive_start;
        let (src_x, src_z) = (e.tile_centre(forced.start_x), e.tile_centre(forced.start_z));
        let (dst_x, dst_z) = (e.tile_centre(forced.end_x), e.tile_centre(forced.end_z));
        if duration <= 0 {
            e.x = dst_x;
            e.z = dst_z;
        } else {
            e.x = (src_x * (duration - elapsed) + dst_x * elapsed) / duration;
            e.z = (src_z * (duration - elapsed) + dst_z * elapsed) / duration;
        }
    }

    e.seq_delay_move = 0;
    e.dst_yaw = forced.facing.yaw();
}

/// Yaw that points from the entity toward a fine position one tile step away.
fn step_yaw(x: i32, z: i32, dst_x: i32, dst_z: i32, current: i32) -> i32 {
    use std::cmp::Ordering::*;
    match (x.cmp(&dst_x), z.cmp(&dst_z)) {
        (Less, Less) => 1280,
        (Less, Greater) => 1792,
        (Less, Equal) => 1536,
        (Greater, Less) => 768,
        (Greater, Greater) => 256,
        (Greater, Equal) => 512,
        (Equal, Less) => 1024,
        (Equal, Greater) => 0,
        (Equal, Equal) => current,
    }
}

fn follow_route(types: &TypeTables, e: &mut PathingEntity) {
    e.secondary_seq = e.anims.stand;

    if e.route_len == 0 {
        e.seq_delay_move = 0;
        return;
    }

    if e.primary_seq != -1 && e.primary_delay == 0 {
        if let Some(seq) = types.seq(e.primary_seq) {
            let held = if e.preanim_route_len > 0 {
                seq.preanim_move == 0
            } else {
                seq.postanim_move == 0
            };
            if held {
                e.seq_delay_move += 1;
                return;
            }
        }
    }

    let last = e.route_len - 1;
    let dst_x = e.tile_centre(e.route_x[last]);
    let dst_z = e.tile_centre(e.route_z[last]);

    if (dst_x - e.x).abs() > MAX_ROUTE_LAG || (dst_z - e.z).abs() > MAX_ROUTE_LAG {
        e.x = dst_x;
        e.z = dst_z;
        return;
    }

    e.dst_yaw = step_yaw(e.x, e.z, dst_x, dst_z, e.dst_yaw);

    let mut delta = (e.dst_yaw - e.yaw) & YAW_MASK;
    if delta > YAW_UNITS / 2 {
        delta -= YAW_UNITS;
    }

    let mut seq = e.anims.turn_around;
    if (-256..=256).contains(&delta) {
        seq = e.anims.walk;
    } else if (256..768).contains(&delta) {
        seq = e.anims.turn_right;
    } else if (-768..=-256).contains(&delta) {
        seq = e.anims.turn_left;
    }
    if seq == -1 {
        seq = e.anims.walk;
    }
    e.secondary_seq = seq;

    let mut speed = 4;
    if e.yaw != e.dst_yaw && e.face_entity == -1 {
        speed = 2;
    }
    if e.route_len > 2 {
        speed = 6;
    }
    if e.route_len > 3 {
        speed = 8;
    }
    if e.seq_delay_move > 0 && e.route_len > 1 {
        speed = 8;
        e.seq_delay_move -= 1;
    }
    if e.route_run[last] {
        speed <<= 1;
    }
    if speed >= 8 && e.secondary_seq == e.anims.walk && e.anims.run != -1 {
        e.secondary_seq = e.anims.run;
    }

    e.x = approach(e.x, dst_x, speed);
    e.z = approach(e.z, dst_z, speed);

    if e.x == dst_x && e.z == dst_z {
        e.route_len -= 1;
        if e.preanim_route_len > 0 {
            e.preanim_route_len -= 1;
        }
    }
}

/// Moves `value` toward `target` by `speed` without passing it.
fn approach(value: i32, target: i32, speed: i32) -> i32 {
    if value < target {
        (value + speed).min(target)
    } else if value > target {
        (value - speed).max(target)
    } else {
        value
    }
}

fn yaw_towards(dx: i32, dz: i32) -> i32 {
    ((dx as f64).atan2(dz as f64) * RADIANS_TO_YAW) as i32 & YAW_MASK
}

fn resolve_facing(ctx: &TickContext<'_>, e: &mut PathingEntity) {
    if e.face_entity != -1 {
        if let Some((tx, tz)) = ctx.face_target {
            let (dx, dz) = (e.x - tx, e.z - tz);
            if dx != 0 || dz != 0 {
                e.dst_yaw = yaw_towards(dx, dz);
            }
        }
    }

    if let Some((tx, tz)) = e.face_tile {
        if e.route_len == 0 || e.seq_delay_move > 0 {
            let dx = e.x - (tx - ctx.base_x - ctx.base_x) * HALF_TILE;
            let dz = e.z - (tz - ctx.base_z - ctx.base_z) * HALF_TILE;
            if dx != 0 || dz != 0 {
                e.dst_yaw = yaw_towards(dx, dz);
            }
            e.face_tile = None;
        }
    }

    let remaining = (e.dst_yaw - e.yaw) & YAW_MASK;
    if remaining != 0 {
        if remaining < TURN_SPEED || remaining > YAW_UNITS - TURN_SPEED {
            e.yaw = e.dst_yaw;
        } else if remaining > YAW_UNITS / 2 {
            e.yaw -= TURN_SPEED;
        } else {
            e.yaw += TURN_SPEED;
        }
        e.yaw &= YAW_MASK;

        if e.secondary_seq == e.anims.stand && e.yaw != e.dst_yaw {
            e.secondary_seq = if e.anims.turn != -1 {
                e.anims.turn
            } else {
                e.anims.walk
            };
        }
    }
}

fn advance_sequences(ctx: &TickContext<'_>, e: &mut PathingEntity) {
    let types = ctx.types;

    if let Some(seq) = types.seq(e.secondary_seq) {
        let frames = seq.frame_count() as i32;
        e.secondary_cycle += 1;
        if e.secondary_frame < frames && e.secondary_cycle > seq.delay(e.secondary_frame) {
            e.secondary_cycle = 0;
            e.secondary_frame += 1;
        }
        if e.secondary_frame >= frames {
            e.secondary_cycle = 0;
            e.secondary_frame = 0;
        }
    }

    if let Some(mut spot) = e.spotanim {
        if ctx.tick >= spot.start {
            let seq = types.spotanim(spot.id).and_then(|s| types.seq(s.seq));
            e.spotanim = seq.and_then(|seq| {
                let frames = seq.frame_count() as i32;
                if spot.frame < 0 {
                    spot.frame = 0;
                }
                spot.cycle += 1;
                while spot.frame < frames && spot.cycle > seq.delay(spot.frame) {
                    spot.cycle -= seq.delay(spot.frame);
                    spot.frame += 1;
                }
                (spot.frame < frames).then_some(spot)
            });
        }
    }

    if e.primary_seq != -1 && e.primary_delay <= 1 {
        let forced_in_progress = e.forced_move.is_some_and(|f| ctx.tick <= f.arrive_end);
        if let Some(seq) = types.seq(e.primary_seq) {
            if seq.preanim_move == 1 && e.preanim_route_len > 0 && !forced_in_progress {
                e.primary_delay = 1;
                return;
            }
        }
    }

    if e.primary_seq != -1 && e.primary_delay == 0 {
        match types.seq(e.primary_seq) {
            None => e.primary_seq = -1,
            Some(seq) => {
                let frames = seq.frame_count() as i32;
                e.primary_cycle += 1;
                while e.primary_frame < frames && e.primary_cycle > seq.delay(e.primary_frame) {
                    e.primary_cycle -= seq.delay(e.primary_frame);
                    e.primary_frame += 1;
                }
                if e.primary_frame >= frames {
                    e.primary_frame -= seq.replay_offset;
                    e.primary_loop += 1;
                    if e.primary_loop >= seq.replay_count || e.primary_frame < 0 || e.primary_frame >= frames {
                        e.primary_seq = -1;
                    }
                }
            }
        }
    }

    if e.primary_delay > 0 {
        e.primary_delay -= 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{FacingDirection, ForcedMove, MovementAnims, Npc};
    use crate::types::SeqType;

    fn world_with_npc(x: i32, z: i32) -> World {
        let mut world = World::new(TypeTables::default());
        let mut npc = Npc::default();
        npc.entity.teleport(&world.types, true, x, z);
        world.npcs[0] = Some(npc);
        world.npc_ids.push(0);
        world
    }

    fn npc(world: &World) -> &PathingEntity {
        &world.npcs[0].as_ref().unwrap().entity
    }

    fn npc_mut(world: &mut World) -> &mut PathingEntity {
        &mut world.npcs[0].as_mut().unwrap().entity
    }

    #[test]
    fn step_yaw_covers_all_directions() {
        assert_eq!(step_yaw(0, 0, 1, 0, 7), 1536);
        assert_eq!(step_yaw(0, 0, -1, 0, 7), 512);
        assert_eq!(step_yaw(0, 0, 0, 1, 7), 1024);
        assert_eq!(step_yaw(0, 0, 0, -1, 7), 0);
        assert_eq!(step_yaw(0, 0, 1, 1, 7), 1280);
        assert_eq!(step_yaw(0, 0, 0, 0, 7), 7);
    }

    #[test]
    fn turning_needs_a_slower_step() {
        let mut world = world_with_npc(50, 50);
        let types = world.types.clone();
        npc_mut(&mut world).teleport(&types, false, 51, 50);
        world.advance(1);
        // Facing south, heading east: half speed while the turn is underway.
        assert_eq!(npc(&world).x, 50 * 128 + 64 + 2);
        assert_eq!(npc(&world).yaw, 2016);
    }

    #[test]
    fn queued_tiles_speed_up_and_run_doubles() {
        let mut world = world_with_npc(50, 50);
        let types = world.types.clone();
        {
            let e = npc_mut(&mut world);
            e.yaw = 1536;
            for _ in 0..4 {
                e.step(&types, true, 4);
            }
        }
        world.advance(1);
        assert_eq!(npc(&world).x, 50 * 128 + 64 + 16);
    }

    #[test]
    fn lagging_entity_snaps_without_popping() {
        let mut world = world_with_npc(50, 50);
        let types = world.types.clone();
        {
            let e = npc_mut(&mut world);
            e.step(&types, false, 4);
            e.step(&types, false, 4);
            e.step(&types, false, 4);
            e.x = 40 * 128;
        }
        world.advance(1);
        let e = npc(&world);
        assert_eq!(e.x, 51 * 128 + 64);
        assert_eq!(e.route_len, 3);
    }

    #[test]
    fn out_of_region_entity_is_reset() {
        let mut world = world_with_npc(50, 50);
        {
            let e = npc_mut(&mut world);
            e.x = 50;
            e.primary_seq = 3;
        }
        world.advance(1);
        let e = npc(&world);
        assert_eq!(e.x, 50 * 128 + 64);
        assert_eq!(e.primary_seq, -1);
    }

    #[test]
    fn facing_turns_in_fixed_steps_then_snaps() {
        let mut world = world_with_npc(50, 50);
        npc_mut(&mut world).dst_yaw = 100;
        world.advance(3);
        assert_eq!(npc(&world).yaw, 96);
        world.advance(1);
        assert_eq!(npc(&world).yaw, 100);

        npc_mut(&mut world).dst_yaw = 0;
        world.advance(1);
        assert_eq!(npc(&world).yaw, 68);
    }

    #[test]
    fn standing_entity_uses_turn_anim_while_turning() {
        let mut world = world_with_npc(50, 50);
        {
            let e = npc_mut(&mut world);
            e.anims = MovementAnims {
                stand: 1,
                turn: 2,
                walk: 3,
                ..MovementAnims::default()
            };
            e.dst_yaw = 1024;
        }
        world.advance(1);
        assert_eq!(npc(&world).secondary_seq, 2);
    }

    #[test]
    fn face_tile_is_consumed_when_idle() {
        let mut world = world_with_npc(50, 50);
        world.base_x = 3200;
        world.base_z = 3200;
        {
            let e = npc_mut(&mut world);
            e.yaw = 512;
            e.dst_yaw = 512;
            // Half-tile coordinates of the tile directly south.
            e.face_tile = Some(((3200 + 50) * 2 + 1, (3200 + 49) * 2 + 1));
        }
        world.advance(1);
        let e = npc(&world);
        assert_eq!(e.face_tile, None);
        assert_eq!(e.dst_yaw, 0);
    }

    #[test]
    fn primary_sequence_stops_after_replay_count() {
        let mut types = TypeTables::default();
        types.seqs.insert(
            5,
            SeqType {
                frame_delays: vec![1, 1],
                replay_offset: 2,
                replay_count: 2,
                ..SeqType::default()
            },
        );
        let mut world = world_with_npc(50, 50);
        world.types = types;
        let types = world.types.clone();
        npc_mut(&mut world).apply_sequence(&types, 5, 0);
        world.advance(2);
        assert_eq!(npc(&world).primary_seq, 5);
        assert_eq!(npc(&world).primary_frame, 1);
        world.advance(2);
        assert_eq!(npc(&world).primary_seq, 5);
        assert_eq!(npc(&world).primary_loop, 1);
        world.advance(2);
        assert_eq!(npc(&world).primary_seq, -1);
    }

    #[test]
    fn sequence_delay_postpones_start() {
        let mut types = TypeTables::default();
        types.seqs.insert(
            5,
            SeqType {
                frame_delays: vec![1, 1, 1],
                ..SeqType::default()
            },
        );
        let mut world = world_with_npc(50, 50);
        world.types = types;
        let types = world.types.clone();
        npc_mut(&mut world).apply_sequence(&types, 5, 2);
        world.advance(2);
        assert_eq!((npc(&world).primary_frame, npc(&world).primary_cycle), (0, 0));
        world.advance(1);
        assert_eq!(npc(&world).primary_cycle, 1);
    }

    #[test]
    fn entity_spotanim_waits_then_clears() {
        let mut types = TypeTables::default();
        types.seqs.insert(
            7,
            SeqType {
                frame_delays: vec![1],
                ..SeqType::default()
            },
        );
        types.spotanims.insert(3, crate::types::SpotAnimType { seq: 7 });
        let mut world = world_with_npc(50, 50);
        world.types = types;
        npc_mut(&mut world).set_spotanim(0, 3, 2);
        world.advance(2);
        assert_eq!(npc(&world).spotanim.map(|s| s.frame), Some(0));
        world.advance(1);
        assert!(npc(&world).spotanim.is_none());
    }

    #[test]
    fn forced_move_approaches_start_before_window() {
        let mut world = world_with_npc(10, 10);
        npc_mut(&mut world).forced_move = Some(ForcedMove {
            start_x: 12,
            start_z: 10,
            end_x: 14,
            end_z: 10,
            arrive_start: 3,
            arrive_end: 5,
            facing: FacingDirection::East,
        });
        world.advance(1);
        // One tick out of two remaining covers half the gap.
        assert_eq!(npc(&world).x, 10 * 128 + 64 + 128);
        assert_eq!(npc(&world).dst_yaw, 1536);
        world.advance(3);
        assert_eq!(npc(&world).x, 14 * 128 + 64);
        world.advance(1);
        assert!(npc(&world).forced_move.is_none());
    }

    #[test]
    fn chat_expires() {
        let mut world = world_with_npc(50, 50);
        npc_mut(&mut world).say("hi".into(), 0, 0, 2);
        world.advance(1);
        assert!(npc(&world).chat.is_some());
        world.advance(1);
        assert!(npc(&world).chat.is_none());
    }
}
