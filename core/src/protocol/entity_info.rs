//! Player and NPC info: the bit-packed movement pass followed by the
//! byte-aligned extended updates.

use bitflags::bitflags;

use crate::constants::{
    CHAT_DURATION, COMBAT_DURATION, LOCAL_PLAYER_INDEX, MAX_TRACKED, NEW_NPC_SENTINEL, NEW_PLAYER_SENTINEL,
};
use crate::entity::{Appearance, FacingDirection, ForcedMove, Npc, PathingEntity, Player};
use crate::error::{ProtocolError, ProtocolResult};
use crate::packet::{Packet, PacketWriter};
use crate::text::word_pack;
use crate::types::TypeTables;
use crate::world::World;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PlayerMask: u16 {
        const APPEARANCE = 0x1;
        const SEQUENCE = 0x2;
        const FACE_ENTITY = 0x4;
        const SAY = 0x8;
        const DAMAGE = 0x10;
        const FACE_COORD = 0x20;
        const CHAT = 0x40;
        /// A second mask byte follows.
        const WIDE = 0x80;
        const SPOTANIM = 0x100;
        const EXACT_MOVE = 0x200;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct NpcMask: u8 {
        const DAMAGE = 0x2;
        const SEQUENCE = 0x4;
        const FACE_ENTITY = 0x8;
        const SAY = 0x10;
        const SPOTANIM = 0x20;
        const CHANGE_TYPE = 0x40;
        const FACE_COORD = 0x80;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequenceStart {
    /// `-1` stops the current sequence.
    pub id: i32,
    pub delay: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Damage {
    pub damage: u8,
    pub kind: u8,
    pub health: u8,
    pub total: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicChat {
    pub colour: u8,
    pub effect: u8,
    pub kind: u8,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpotAnimStart {
    pub id: i32,
    /// Height in the high 16 bits, start delay in the low 16.
    pub height_delay: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExactMove {
    pub start_x: u8,
    pub start_z: u8,
    pub end_x: u8,
    pub end_z: u8,
    /// Ticks from now until the entity stands on the start tile.
    pub start: u16,
    /// Ticks from now until it reaches the end tile.
    pub end: u16,
    pub facing: FacingDirection,
}

fn put_opt(w: &mut PacketWriter, value: i32) {
    w.p2(if value < 0 { u16::MAX } else { value as u16 });
}

fn apply_damage(e: &mut PathingEntity, tick: i32, damage: Damage) {
    e.hit(tick, damage.kind as i32, damage.damage as i32);
    e.combat_until = tick + COMBAT_DURATION;
    e.health = damage.health as i32;
    e.total_health = damage.total as i32;
}

fn read_damage(p: &mut Packet<'_>) -> ProtocolResult<Damage> {
    Ok(Damage {
        damage: p.g1()?,
        kind: p.g1()?,
        health: p.g1()?,
        total: p.g1()?,
    })
}

fn write_damage(w: &mut PacketWriter, damage: Damage) {
    w.p1(damage.damage);
    w.p1(damage.kind);
    w.p1(damage.health);
    w.p1(damage.total);
}

/// Optional fields of one player's extended update, in mask order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlayerExtended {
    pub appearance: Option<Appearance>,
    pub sequence: Option<SequenceStart>,
    pub face_entity: Option<i32>,
    pub say: Option<String>,
    pub damage: Option<Damage>,
    /// Absolute half-tile coordinates.
    pub face_coord: Option<(u16, u16)>,
    pub chat: Option<PublicChat>,
    pub spotanim: Option<SpotAnimStart>,
    pub exact_move: Option<ExactMove>,
}

impl PlayerExtended {
    pub fn mask(&self) -> PlayerMask {
        let mut mask = PlayerMask::empty();
        mask.set(PlayerMask::APPEARANCE, self.appearance.is_some());
        mask.set(PlayerMask::SEQUENCE, self.sequence.is_some());
        mask.set(PlayerMask::FACE_ENTITY, self.face_entity.is_some());
        mask.set(PlayerMask::SAY, self.say.is_some());
        mask.set(PlayerMask::DAMAGE, self.damage.is_some());
        mask.set(PlayerMask::FACE_COORD, self.face_coord.is_some());
        mask.set(PlayerMask::CHAT, self.chat.is_some());
        mask.set(PlayerMask::SPOTANIM, self.spotanim.is_some());
        mask.set(PlayerMask::EXACT_MOVE, self.exact_move.is_some());
        if mask.bits() > 0xff {
            mask |= PlayerMask::WIDE;
        }
        mask
    }

    pub fn decode(p: &mut Packet<'_>) -> ProtocolResult<Self> {
        let mut bits = p.g1()? as u16;
        if bits & PlayerMask::WIDE.bits() != 0 {
            bits += (p.g1()? as u16) << 8;
        }
        let mask = PlayerMask::from_bits_truncate(bits);
        let mut ext = PlayerExtended::default();

        if mask.contains(PlayerMask::APPEARANCE) {
            let len = p.g1()? as usize;
            let blob = p.gdata(len)?;
            let mut inner = Packet::new(blob);
            ext.appearance = Some(Appearance::decode(&mut inner)?);
            inner.expect_consumed("player appearance")?;
        }
        if mask.contains(PlayerMask::SEQUENCE) {
            ext.sequence = Some(SequenceStart {
                id: p.g2_opt()?,
                delay: p.g1()?,
            });
        }
        if mask.contains(PlayerMask::FACE_ENTITY) {
            ext.face_entity = Some(p.g2_opt()?);
        }
        if mask.contains(PlayerMask::SAY) {
            ext.say = Some(p.gjstr()?);
        }
        if mask.contains(PlayerMask::DAMAGE) {
            ext.damage = Some(read_damage(p)?);
        }
        if mask.contains(PlayerMask::FACE_COORD) {
            ext.face_coord = Some((p.g2()?, p.g2()?));
        }
        if mask.contains(PlayerMask::CHAT) {
            let colour_effect = p.g2()?;
            let kind = p.g1()?;
            let len = p.g1()? as usize;
            ext.chat = Some(PublicChat {
                colour: (colour_effect >> 8) as u8,
                effect: (colour_effect & 0xff) as u8,
                kind,
                text: word_pack::unpack(p, len)?,
            });
        }
        if mask.contains(PlayerMask::SPOTANIM) {
            ext.spotanim = Some(SpotAnimStart {
                id: p.g2_opt()?,
                height_delay: p.g4()?,
            });
        }
        if mask.contains(PlayerMask::EXACT_MOVE) {
            ext.exact_move = Some(ExactMove {
                start_x: p.g1()?,
                start_z: p.g1()?,
                end_x: p.g1()?,
                end_z: p.g1()?,
                start: p.g2()?,
                end: p.g2()?,
                facing: FacingDirection::from_wire(p.g1()?),
            });
        }
        Ok(ext)
    }

    pub fn encode(&self, w: &mut PacketWriter) {
        let mask = self.mask();
        w.p1((mask.bits() & 0xff) as u8);
        if mask.contains(PlayerMask::WIDE) {
            w.p1((mask.bits() >> 8) as u8);
        }

        if let Some(appearance) = &self.appearance {
            let mut blob = PacketWriter::new();
            appearance.encode(&mut blob);
            w.p1(blob.len() as u8);
            w.pdata(blob.as_slice());
        }
        if let Some(seq) = self.sequence {
            put_opt(w, seq.id);
            w.p1(seq.delay);
        }
        if let Some(target) = self.face_entity {
            put_opt(w, target);
        }
        if let Some(text) = &self.say {
            w.pjstr(text);
        }
        if let Some(damage) = self.damage {
            write_damage(w, damage);
        }
        if let Some((x, z)) = self.face_coord {
            w.p2(x);
            w.p2(z);
        }
        if let Some(chat) = &self.chat {
            w.p2(((chat.colour as u16) << 8) | chat.effect as u16);
            w.p1(chat.kind);
            let mut packed = PacketWriter::new();
            word_pack::pack(&mut packed, &chat.text);
            w.p1(packed.len() as u8);
            w.pdata(packed.as_slice());
        }
        if let Some(spot) = self.spotanim {
            put_opt(w, spot.id);
            w.p4(spot.height_delay);
        }
        if let Some(exact) = self.exact_move {
            w.p1(exact.start_x);
            w.p1(exact.start_z);
            w.p1(exact.end_x);
            w.p1(exact.end_z);
            w.p2(exact.start);
            w.p2(exact.end);
            w.p1(exact.facing.to_wire());
        }
    }

    /// Applies the update to the player in `slot`.
    pub fn apply(self, world: &mut World, slot: usize) -> ProtocolResult<()> {
        let World {
            players,
            types,
            appearance_cache,
            tick,
            ..
        } = world;
        let tick = *tick;
        let player = players
            .get_mut(slot)
            .and_then(Option::as_mut)
            .ok_or(ProtocolError::MissingEntity { kind: "player", index: slot })?;
        let e = &mut player.entity;

        if let Some(seq) = self.sequence {
            e.apply_sequence(types, seq.id, seq.delay as i32);
        }
        if let Some(target) = self.face_entity {
            e.face_entity = target;
        }
        if let Some(text) = self.say {
            e.say(text, 0, 0, CHAT_DURATION);
        }
        if let Some(damage) = self.damage {
            apply_damage(e, tick, damage);
        }
        if let Some((x, z)) = self.face_coord {
            e.face_tile = Some((x as i32, z as i32));
        }
        if let Some(chat) = self.chat {
            e.say(chat.text, chat.colour as i32, chat.effect as i32, CHAT_DURATION);
        }
        if let Some(spot) = self.spotanim {
            e.set_spotanim(tick, spot.id, spot.height_delay);
        }
        if let Some(exact) = self.exact_move {
            apply_exact_move(e, tick, exact);
        }
        if let Some(appearance) = self.appearance {
            appearance_cache.insert(slot, appearance.clone());
            player.set_appearance(appearance);
        }
        Ok(())
    }
}

fn apply_exact_move(e: &mut PathingEntity, tick: i32, exact: ExactMove) {
    e.forced_move = Some(ForcedMove {
        start_x: exact.start_x as i32,
        start_z: exact.start_z as i32,
        end_x: exact.end_x as i32,
        end_z: exact.end_z as i32,
        arrive_start: exact.start as i32 + tick,
        arrive_end: exact.end as i32 + tick,
        facing: exact.facing,
    });
    e.route_len = 0;
    e.route_x[0] = exact.end_x as i32;
    e.route_z[0] = exact.end_z as i32;
}

/// Optional fields of one NPC's extended update, in mask order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NpcExtended {
    pub damage: Option<Damage>,
    pub sequence: Option<SequenceStart>,
    pub face_entity: Option<i32>,
    pub say: Option<String>,
    pub spotanim: Option<SpotAnimStart>,
    pub change_type: Option<u16>,
    pub face_coord: Option<(u16, u16)>,
}

impl NpcExtended {
    pub fn mask(&self) -> NpcMask {
        let mut mask = NpcMask::empty();
        mask.set(NpcMask::DAMAGE, self.damage.is_some());
        mask.set(NpcMask::SEQUENCE, self.sequence.is_some());
        mask.set(NpcMask::FACE_ENTITY, self.face_entity.is_some());
        mask.set(NpcMask::SAY, self.say.is_some());
        mask.set(NpcMask::SPOTANIM, self.spotanim.is_some());
        mask.set(NpcMask::CHANGE_TYPE, self.change_type.is_some());
        mask.set(NpcMask::FACE_COORD, self.face_coord.is_some());
        mask
    }

    pub fn decode(p: &mut Packet<'_>) -> ProtocolResult<Self> {
        let mask = NpcMask::from_bits_truncate(p.g1()?);
        let mut ext = NpcExtended::default();
        if mask.contains(NpcMask::DAMAGE) {
            ext.damage = Some(read_damage(p)?);
        }
        if mask.contains(NpcMask::SEQUENCE) {
            ext.sequence = Some(SequenceStart {
                id: p.g2_opt()?,
                delay: p.g1()?,
            });
        }
        if mask.contains(NpcMask::FACE_ENTITY) {
            ext.face_entity = Some(p.g2_opt()?);
        }
        if mask.contains(NpcMask::SAY) {
            ext.say = Some(p.gjstr()?);
        }
        if mask.contains(NpcMask::SPOTANIM) {
            ext.spotanim = Some(SpotAnimStart {
                id: p.g2_opt()?,
                height_delay: p.g4()?,
            });
        }
        if mask.contains(NpcMask::CHANGE_TYPE) {
            ext.change_type = Some(p.g2()?);
        }
        if mask.contains(NpcMask::FACE_COORD) {
            ext.face_coord = Some((p.g2()?, p.g2()?));
        }
        Ok(ext)
    }

    pub fn encode(&self, w: &mut PacketWriter) {
        w.p1(self.mask().bits());
        if let Some(damage) = self.damage {
            write_damage(w, damage);
        }
        if let Some(seq) = self.sequence {
            put_opt(w, seq.id);
            w.p1(seq.delay);
        }
        if let Some(target) = self.face_entity {
            put_opt(w, target);
        }
        if let Some(text) = &self.say {
            w.pjstr(text);
        }
        if let Some(spot) = self.spotanim {
            put_opt(w, spot.id);
            w.p4(spot.height_delay);
        }
        if let Some(id) = self.change_type {
            w.p2(id);
        }
        if let Some((x, z)) = self.face_coord {
            w.p2(x);
            w.p2(z);
        }
    }

    pub fn apply(self, world: &mut World, slot: usize) -> ProtocolResult<()> {
        let World { npcs, types, tick, .. } = world;
        let tick = *tick;
        let npc = npcs
            .get_mut(slot)
            .and_then(Option::as_mut)
            .ok_or(ProtocolError::MissingEntity { kind: "npc", index: slot })?;

        if let Some(damage) = self.damage {
            apply_damage(&mut npc.entity, tick, damage);
        }
        if let Some(seq) = self.sequence {
            npc.entity.apply_sequence(types, seq.id, seq.delay as i32);
        }
        if let Some(target) = self.face_entity {
            npc.entity.face_entity = target;
        }
        if let Some(text) = self.say {
            npc.entity.say(text, 0, 0, CHAT_DURATION);
        }
        if let Some(spot) = self.spotanim {
            npc.entity.set_spotanim(tick, spot.id, spot.height_delay);
        }
        if let Some(id) = self.change_type {
            npc.set_type(types, id);
        }
        if let Some((x, z)) = self.face_coord {
            npc.entity.face_tile = Some((x as i32, z as i32));
        }
        Ok(())
    }
}

/// Signed 5-bit tile delta.
fn read_delta(p: &mut Packet<'_>) -> ProtocolResult<i32> {
    let value = p.gbit(5)? as i32;
    Ok(if value > 15 { value - 32 } else { value })
}

/// Movement op for an already-tracked entity.
fn read_step(p: &mut Packet<'_>, types: &TypeTables, e: &mut PathingEntity, running: bool) -> ProtocolResult<()> {
    let dir = p.gbit(3)?;
    e.step(types, running, dir);
    Ok(())
}

/// Outcome of the shared old-entity pass.
struct Refresh {
    kept: Vec<usize>,
    updates: Vec<usize>,
    removals: Vec<usize>,
}

/// Reads the per-slot update classes for the tracked list.
fn read_tracked<T>(
    p: &mut Packet<'_>,
    kind: &'static str,
    tracked: &[usize],
    slots: &mut [Option<T>],
    types: &TypeTables,
    tick: i32,
    entity: fn(&mut T) -> &mut PathingEntity,
) -> ProtocolResult<Refresh> {
    let count = p.gbit(8)? as usize;
    if count > tracked.len() {
        return Err(ProtocolError::TooManyEntities {
            kind,
            declared: count,
            tracked: tracked.len(),
        });
    }

    let mut refresh = Refresh {
        kept: Vec::with_capacity(count),
        updates: Vec::new(),
        removals: tracked[count..].to_vec(),
    };

    for &index in &tracked[..count] {
        let e = slots
            .get_mut(index)
            .and_then(Option::as_mut)
            .map(entity)
            .ok_or(ProtocolError::MissingEntity { kind, index })?;

        if p.gbit(1)? == 0 {
            refresh.kept.push(index);
            e.last_seen = tick;
            continue;
        }

        match p.gbit(2)? {
            0 => {
                refresh.kept.push(index);
                e.last_seen = tick;
                refresh.updates.push(index);
            }
            op @ (1 | 2) => {
                refresh.kept.push(index);
                e.last_seen = tick;
                read_step(p, types, e, op == 2)?;
                if op == 2 {
                    read_step(p, types, e, true)?;
                }
                if p.gbit(1)? == 1 {
                    refresh.updates.push(index);
                }
            }
            _ => refresh.removals.push(index),
        }
    }
    Ok(refresh)
}

fn player_entity(player: &mut Player) -> &mut PathingEntity {
    &mut player.entity
}

fn npc_entity(npc: &mut Npc) -> &mut PathingEntity {
    &mut npc.entity
}

fn check_tracked_len(kind: &'static str, len: usize) -> ProtocolResult<()> {
    if len > MAX_TRACKED {
        return Err(ProtocolError::TooManyEntities {
            kind,
            declared: len,
            tracked: MAX_TRACKED,
        });
    }
    Ok(())
}

fn read_local_player(world: &mut World, p: &mut Packet<'_>, updates: &mut Vec<usize>) -> ProtocolResult<()> {
    if p.gbit(1)? == 0 {
        return Ok(());
    }
    let op = p.gbit(2)?;
    if op == 0 {
        updates.push(LOCAL_PLAYER_INDEX);
        return Ok(());
    }

    let World { players, types, level, .. } = world;
    let e = &mut players[LOCAL_PLAYER_INDEX].get_or_insert_with(Player::default).entity;
    match op {
        1 => read_step(p, types, e, false)?,
        2 => {
            read_step(p, types, e, true)?;
            read_step(p, types, e, true)?;
        }
        _ => {
            *level = p.gbit(2)? as usize;
            let x = p.gbit(7)? as i32;
            let z = p.gbit(7)? as i32;
            let jump = p.gbit(1)? == 1;
            e.teleport(types, jump, x, z);
        }
    }
    if p.gbit(1)? == 1 {
        updates.push(LOCAL_PLAYER_INDEX);
    }
    Ok(())
}

/// Decodes a PLAYER_INFO body and applies it.
pub fn read_player_info(world: &mut World, p: &mut Packet<'_>) -> ProtocolResult<()> {
    let tick = world.tick;
    let mut updates = Vec::new();

    p.bits()?;
    read_local_player(world, p, &mut updates)?;

    let tracked = std::mem::take(&mut world.player_ids);
    let refresh = read_tracked(
        p,
        "players",
        &tracked,
        &mut world.players,
        &world.types,
        tick,
        player_entity,
    )?;
    updates.extend(refresh.updates);
    world.player_ids = refresh.kept;

    let (local_x, local_z) = world
        .local_player()
        .map(|local| local.entity.tile())
        .unwrap_or_default();
    let body_bits = p.len() * 8;
    while p.bit_pos().is_some_and(|bit| bit + 10 < body_bits) {
        let index = p.gbit(11)?;
        if index == NEW_PLAYER_SENTINEL {
            break;
        }
        let index = index as usize;
        let World {
            players,
            types,
            appearance_cache,
            player_ids,
            ..
        } = &mut *world;
        let player = players[index].get_or_insert_with(|| {
            let mut player = Player::default();
            if let Some(appearance) = appearance_cache.get(&index) {
                player.set_appearance(appearance.clone());
            }
            player
        });
        player_ids.push(index);
        check_tracked_len("players", player_ids.len())?;
        player.entity.last_seen = tick;

        let dx = read_delta(p)?;
        let dz = read_delta(p)?;
        let jump = p.gbit(1)? == 1;
        player.entity.teleport(types, jump, local_x + dx, local_z + dz);
        if p.gbit(1)? == 1 {
            updates.push(index);
        }
    }
    p.bytes()?;

    for slot in updates {
        PlayerExtended::decode(p)?.apply(world, slot)?;
    }

    for index in refresh.removals {
        if world.players[index]
            .as_ref()
            .is_some_and(|player| player.entity.last_seen != tick)
        {
            world.players[index] = None;
        }
    }

    p.expect_consumed("PLAYER_INFO")?;
    for &index in &world.player_ids {
        if world.players[index].is_none() {
            return Err(ProtocolError::MissingEntity { kind: "players", index });
        }
    }
    Ok(())
}

/// Decodes an NPC_INFO body and applies it.
pub fn read_npc_info(world: &mut World, p: &mut Packet<'_>) -> ProtocolResult<()> {
    let tick = world.tick;
    let mut updates = Vec::new();

    p.bits()?;
    let tracked = std::mem::take(&mut world.npc_ids);
    let refresh = read_tracked(
        p,
        "npcs",
        &tracked,
        &mut world.npcs,
        &world.types,
        tick,
        npc_entity,
    )?;
    updates.extend(refresh.updates);
    world.npc_ids = refresh.kept;

    let (local_x, local_z) = world
        .local_player()
        .map(|local| local.entity.tile())
        .unwrap_or_default();
    let body_bits = p.len() * 8;
    while p.bit_pos().is_some_and(|bit| bit + 21 < body_bits) {
        let index = p.gbit(13)?;
        if index == NEW_NPC_SENTINEL {
            break;
        }
        let index = index as usize;
        let type_id = p.gbit(11)? as u16;
        let dx = read_delta(p)?;
        let dz = read_delta(p)?;
        let update = p.gbit(1)? == 1;

        let World {
            npcs, types, npc_ids, ..
        } = &mut *world;
        let npc = npcs[index].get_or_insert_with(Npc::default);
        npc_ids.push(index);
        check_tracked_len("npcs", npc_ids.len())?;
        npc.entity.last_seen = tick;
        npc.set_type(types, type_id);
        npc.entity.teleport(types, false, local_x + dx, local_z + dz);
        if update {
            updates.push(index);
        }
    }
    p.bytes()?;

    for slot in updates {
        NpcExtended::decode(p)?.apply(world, slot)?;
    }

    for index in refresh.removals {
        if world.npcs[index]
            .as_ref()
            .is_some_and(|npc| npc.entity.last_seen != tick)
        {
            world.npcs[index] = None;
        }
    }

    p.expect_consumed("NPC_INFO")?;
    for &index in &world.npc_ids {
        if world.npcs[index].is_none() {
            return Err(ProtocolError::MissingEntity { kind: "npcs", index });
        }
    }
    Ok(())
}
