//! Zone delta messages: scenery, ground objects and map effects addressed
//! relative to the current zone base.

use crate::constants::{HALF_TILE, REGION_SIZE, TILE_UNITS, ZONE_SIZE};
use crate::effects::{in_scenery_bounds, AnimatedLoc, Projectile, SpotAnim};
use crate::entity::LocMerge;
use crate::error::{ProtocolError, ProtocolResult};
use crate::packet::Packet;
use crate::protocol::opcodes::ServerProt;
use crate::types::{LocLayer, LocShape};
use crate::world::World;

/// Shape and rotation packed as `shape << 2 | rotation`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocInfo {
    pub shape: LocShape,
    pub rotation: u8,
}

impl LocInfo {
    fn decode(p: &mut Packet<'_>, message: &'static str) -> ProtocolResult<Self> {
        let info = p.g1()?;
        let shape = LocShape::try_from(info >> 2).map_err(|shape| ProtocolError::BadMessage {
            message,
            reason: format!("loc shape {shape}"),
        })?;
        Ok(LocInfo {
            shape,
            rotation: info & 3,
        })
    }

    pub fn layer(self) -> LocLayer {
        self.shape.layer()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ZoneMessage {
    LocAddChange {
        pos: u8,
        info: LocInfo,
        id: u16,
    },
    LocDel {
        pos: u8,
        info: LocInfo,
    },
    LocAnim {
        pos: u8,
        info: LocInfo,
        seq: u16,
    },
    LocMerge {
        pos: u8,
        info: LocInfo,
        id: u16,
        start: u16,
        end: u16,
        pid: u16,
        /// Footprint offsets from the loc tile.
        east: i8,
        south: i8,
        west: i8,
        north: i8,
    },
    ObjAdd {
        pos: u8,
        id: u16,
        count: u16,
    },
    ObjDel {
        pos: u8,
        id: u16,
    },
    ObjCount {
        pos: u8,
        id: u16,
        old: u16,
        new: u16,
    },
    ObjReveal {
        pos: u8,
        id: u16,
        count: u16,
        receiver: u16,
    },
    MapProjAnim {
        pos: u8,
        dx: i8,
        dz: i8,
        target: i16,
        spotanim: u16,
        src_height: i32,
        dst_height: i32,
        start: u16,
        end: u16,
        peak: u8,
        arc: u8,
    },
    MapAnim {
        pos: u8,
        id: u16,
        height: u8,
        delay: u16,
    },
}

impl ZoneMessage {
    /// Reads the body of a zone sub-message. Returns `Ok(None)` when `prot`
    /// isn't one.
    pub fn decode(prot: ServerProt, p: &mut Packet<'_>) -> ProtocolResult<Option<Self>> {
        let name = prot.name();
        let message = match prot {
            ServerProt::LocAddChange => ZoneMessage::LocAddChange {
                pos: p.g1()?,
                info: LocInfo::decode(p, name)?,
                id: p.g2()?,
            },
            ServerProt::LocDel => ZoneMessage::LocDel {
                pos: p.g1()?,
                info: LocInfo::decode(p, name)?,
            },
            ServerProt::LocAnim => ZoneMessage::LocAnim {
                pos: p.g1()?,
                info: LocInfo::decode(p, name)?,
                seq: p.g2()?,
            },
            ServerProt::LocMerge => ZoneMessage::LocMerge {
                pos: p.g1()?,
                info: LocInfo::decode(p, name)?,
                id: p.g2()?,
                start: p.g2()?,
                end: p.g2()?,
                pid: p.g2()?,
                east: p.g1b()?,
                south: p.g1b()?,
                west: p.g1b()?,
                north: p.g1b()?,
            },
            ServerProt::ObjAdd => ZoneMessage::ObjAdd {
                pos: p.g1()?,
                id: p.g2()?,
                count: p.g2()?,
            },
            ServerProt::ObjDel => ZoneMessage::ObjDel {
                pos: p.g1()?,
                id: p.g2()?,
            },
            ServerProt::ObjCount => ZoneMessage::ObjCount {
                pos: p.g1()?,
                id: p.g2()?,
                old: p.g2()?,
                new: p.g2()?,
            },
            ServerProt::ObjReveal => ZoneMessage::ObjReveal {
                pos: p.g1()?,
                id: p.g2()?,
                count: p.g2()?,
                receiver: p.g2()?,
            },
            ServerProt::MapProjAnim => ZoneMessage::MapProjAnim {
                pos: p.g1()?,
                dx: p.g1b()?,
                dz: p.g1b()?,
                target: p.g2b()?,
                spotanim: p.g2()?,
                src_height: p.g1()? as i32 * 4,
                dst_height: p.g1()? as i32 * 4,
                start: p.g2()?,
                end: p.g2()?,
                peak: p.g1()?,
                arc: p.g1()?,
            },
            ServerProt::MapAnim => ZoneMessage::MapAnim {
                pos: p.g1()?,
                id: p.g2()?,
                height: p.g1()?,
                delay: p.g2()?,
            },
            _ => return Ok(None),
        };
        Ok(Some(message))
    }
}

fn in_region(x: i32, z: i32) -> bool {
    (0..REGION_SIZE).contains(&x) && (0..REGION_SIZE).contains(&z)
}

impl World {
    pub fn set_zone_base(&mut self, x: i32, z: i32) {
        self.zone_base_x = x;
        self.zone_base_z = z;
    }

    /// Region-local tile addressed by a packed zone offset.
    pub fn zone_tile(&self, pos: u8) -> (i32, i32) {
        (
            self.zone_base_x + ((pos >> 4) & 7) as i32,
            self.zone_base_z + (pos & 7) as i32,
        )
    }

    /// Forgets everything the server will resend for the current zone:
    /// object stacks are dropped and pending scenery is restored next tick.
    pub fn clear_zone(&mut self) {
        let (x0, z0, level) = (self.zone_base_x, self.zone_base_z, self.level);
        self.objs.clear_zone(level, x0, z0);
        self.loc_changes.sweep(|change| {
            if change.level == level
                && (x0..x0 + ZONE_SIZE).contains(&change.x)
                && (z0..z0 + ZONE_SIZE).contains(&change.z)
            {
                change.duration = 0;
            }
            true
        });
        log::trace!("zone ({x0}, {z0}) cleared");
    }

    fn soft_failure(&mut self, what: &str) {
        self.telemetry.soft_failures += 1;
        log::warn!("{what} dropped");
    }

    pub fn apply_zone_message(&mut self, message: ZoneMessage) {
        let level = self.level;
        match message {
            ZoneMessage::LocAddChange { pos, info, id } => {
                let (x, z) = self.zone_tile(pos);
                if in_region(x, z) {
                    self.append_loc_change(level, x, z, info.layer(), id as i32, info.shape, info.rotation, 0, -1);
                }
            }
            ZoneMessage::LocDel { pos, info } => {
                let (x, z) = self.zone_tile(pos);
                if in_region(x, z) {
                    self.append_loc_change(level, x, z, info.layer(), -1, info.shape, info.rotation, 0, -1);
                }
            }
            ZoneMessage::LocAnim { pos, info, seq } => {
                let (x, z) = self.zone_tile(pos);
                if in_scenery_bounds(x, z) {
                    let layer = info.layer();
                    match self.scene.get(level, x, z, layer) {
                        Some(placed) => {
                            self.animated_locs
                                .push(AnimatedLoc::new(level, layer, x, z, placed.id, seq as i32));
                        }
                        None => log::debug!("loc anim at ({x}, {z}) has no loc on {layer:?}"),
                    }
                }
            }
            ZoneMessage::LocMerge {
                pos,
                info,
                id,
                start,
                end,
                pid,
                east,
                south,
                west,
                north,
            } => {
                let (x, z) = self.zone_tile(pos);
                let slot = self.player_slot(pid as usize);
                if !in_region(x, z) || self.players.get(slot).is_none_or(Option::is_none) {
                    return;
                }
                let (start, end) = (start as i32, end as i32);
                self.append_loc_change(level, x, z, info.layer(), -1, info.shape, info.rotation, start + 1, end + 1);

                let ty = self.types.loc(id as i32).cloned().unwrap_or_default();
                let (width, length) = ty.rotated_size(info.rotation);
                let (min_dx, max_dx) = if east > west { (west, east) } else { (east, west) };
                let (min_dz, max_dz) = if south > north { (north, south) } else { (south, north) };
                let merge = LocMerge {
                    loc_id: id as i32,
                    start: start + self.tick,
                    end: end + self.tick,
                    offset_x: x * TILE_UNITS + width * HALF_TILE,
                    offset_z: z * TILE_UNITS + length * HALF_TILE,
                    min_x: x + min_dx as i32,
                    max_x: x + max_dx as i32,
                    min_z: z + min_dz as i32,
                    max_z: z + max_dz as i32,
                };
                if let Some(player) = self.players[slot].as_mut() {
                    player.loc_merge = Some(merge);
                }
            }
            ZoneMessage::ObjAdd { pos, id, count } => {
                let (x, z) = self.zone_tile(pos);
                if in_region(x, z) && !self.objs.add(&self.types, level, x, z, id, count as i32) {
                    self.soft_failure("obj add");
                }
            }
            ZoneMessage::ObjDel { pos, id } => {
                let (x, z) = self.zone_tile(pos);
                if in_region(x, z) {
                    self.objs.remove(&self.types, level, x, z, id);
                }
            }
            ZoneMessage::ObjCount { pos, id, old, new } => {
                let (x, z) = self.zone_tile(pos);
                if in_region(x, z) {
                    self.objs.recount(&self.types, level, x, z, id, old as i32, new as i32);
                }
            }
            ZoneMessage::ObjReveal {
                pos,
                id,
                count,
                receiver,
            } => {
                let (x, z) = self.zone_tile(pos);
                if in_region(x, z)
                    && receiver as i32 != self.local_pid
                    && !self.objs.add(&self.types, level, x, z, id, count as i32)
                {
                    self.soft_failure("obj reveal");
                }
            }
            ZoneMessage::MapProjAnim {
                pos,
                dx,
                dz,
                target,
                spotanim,
                src_height,
                dst_height,
                start,
                end,
                peak,
                arc,
            } => {
                let (x, z) = self.zone_tile(pos);
                let (dst_x, dst_z) = (x + dx as i32, z + dz as i32);
                if !in_region(x, z) || !in_region(dst_x, dst_z) {
                    return;
                }
                let (fx, fz) = (x * TILE_UNITS + HALF_TILE, z * TILE_UNITS + HALF_TILE);
                let (fdx, fdz) = (dst_x * TILE_UNITS + HALF_TILE, dst_z * TILE_UNITS + HALF_TILE);
                let start = start as i32 + self.tick;
                let mut projectile = Projectile::new(
                    spotanim as i32,
                    level,
                    (fx, self.scene.height_at(level, fx, fz) - src_height, fz),
                    start,
                    end as i32 + self.tick,
                    peak as i32,
                    arc as i32,
                    target as i32,
                    dst_height,
                );
                projectile.update_velocity(fdx, self.scene.height_at(level, fdx, fdz) - dst_height, fdz, start);
                self.projectiles.push(projectile);
            }
            ZoneMessage::MapAnim { pos, id, height, delay } => {
                let (x, z) = self.zone_tile(pos);
                if in_region(x, z) {
                    let (fx, fz) = (x * TILE_UNITS + HALF_TILE, z * TILE_UNITS + HALF_TILE);
                    let y = self.scene.height_at(level, fx, fz) - height as i32;
                    self.spotanims
                        .push(SpotAnim::new(id as i32, level, fx, y, fz, self.tick, delay as i32));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collision::CollisionFlags;
    use crate::entity::Player;
    use crate::packet::PacketWriter;
    use crate::types::{LocType, TypeTables};

    fn world() -> World {
        let mut types = TypeTables::default();
        types.locs.insert(
            10,
            LocType {
                width: 2,
                length: 1,
                ..LocType::default()
            },
        );
        let mut world = World::new(types);
        world.set_zone_base(40, 48);
        world
    }

    fn info(shape: LocShape, rotation: u8) -> LocInfo {
        LocInfo { shape, rotation }
    }

    #[test]
    fn zone_offsets_unpack_from_pos() {
        let world = world();
        assert_eq!(world.zone_tile(0x35), (43, 53));
        assert_eq!(world.zone_tile(0xff), (47, 55));
    }

    #[test]
    fn decode_reads_every_field() {
        let mut w = PacketWriter::new();
        w.p1(0x12);
        w.p1((10 << 2) | 1);
        w.p2(10);
        w.p2(3);
        w.p2(9);
        w.p2(7);
        w.p1((-1i8) as u8);
        w.p1(0);
        w.p1(1);
        w.p1(2);
        let bytes = w.into_inner();
        assert_eq!(bytes.len(), 14);

        let mut p = Packet::new(&bytes);
        let message = ZoneMessage::decode(ServerProt::LocMerge, &mut p).unwrap().unwrap();
        assert_eq!(p.remaining(), 0);
        assert_eq!(
            message,
            ZoneMessage::LocMerge {
                pos: 0x12,
                info: info(LocShape::CentrepieceStraight, 1),
                id: 10,
                start: 3,
                end: 9,
                pid: 7,
                east: -1,
                south: 0,
                west: 1,
                north: 2,
            }
        );
    }

    #[test]
    fn bad_shape_is_rejected() {
        let bytes = [0u8, 23 << 2];
        let mut p = Packet::new(&bytes);
        assert!(matches!(
            ZoneMessage::decode(ServerProt::LocDel, &mut p),
            Err(ProtocolError::BadMessage { .. })
        ));
    }

    #[test]
    fn non_zone_opcode_decodes_to_none() {
        let mut p = Packet::new(&[]);
        assert_eq!(ZoneMessage::decode(ServerProt::Logout, &mut p).unwrap(), None);
    }

    #[test]
    fn loc_add_installs_on_next_tick_with_collision() {
        let mut world = world();
        world.apply_zone_message(ZoneMessage::LocAddChange {
            pos: 0x00,
            info: info(LocShape::CentrepieceStraight, 0),
            id: 10,
        });
        assert_eq!(world.loc_changes.len(), 1);
        assert!(world.scene.get(0, 40, 48, LocLayer::Ground).is_none());

        world.advance(1);
        assert_eq!(world.scene.get(0, 40, 48, LocLayer::Ground).map(|l| l.id), Some(10));
        assert!(world.collision[0].get(41, 48).contains(CollisionFlags::LOC));
        // Permanent change stays pending, installed.
        assert_eq!(world.loc_changes.iter().next().map(|(_, c)| c.delay), Some(-1));

        world.apply_zone_message(ZoneMessage::LocDel {
            pos: 0x00,
            info: info(LocShape::CentrepieceStraight, 0),
        });
        world.advance(1);
        assert!(world.scene.get(0, 40, 48, LocLayer::Ground).is_none());
        assert!(world.collision[0].get(41, 48).is_empty());
        // Back to what was there before the first change.
        assert!(world.loc_changes.is_empty());
    }

    #[test]
    fn full_follows_restores_pending_scenery() {
        let mut world = world();
        world.apply_zone_message(ZoneMessage::LocAddChange {
            pos: 0x00,
            info: info(LocShape::WallStraight, 0),
            id: 10,
        });
        world.apply_zone_message(ZoneMessage::ObjAdd {
            pos: 0x11,
            id: 995,
            count: 5,
        });
        world.advance(1);
        assert!(world.scene.get(0, 40, 48, LocLayer::Wall).is_some());

        world.clear_zone();
        assert!(world.objs.get(0, 41, 49).is_empty());
        world.advance(1);
        assert!(world.scene.get(0, 40, 48, LocLayer::Wall).is_none());
        assert!(world.collision[0].get(40, 48).is_empty());
        assert!(world.loc_changes.is_empty());
    }

    #[test]
    fn obj_reveal_skips_local_player() {
        let mut world = world();
        world.local_pid = 7;
        world.apply_zone_message(ZoneMessage::ObjReveal {
            pos: 0,
            id: 1,
            count: 1,
            receiver: 7,
        });
        assert_eq!(world.objs.tile_count(), 0);
        world.apply_zone_message(ZoneMessage::ObjReveal {
            pos: 0,
            id: 1,
            count: 1,
            receiver: 8,
        });
        assert_eq!(world.objs.get(0, 40, 48).len(), 1);
    }

    #[test]
    fn obj_count_and_delete() {
        let mut world = world();
        world.apply_zone_message(ZoneMessage::ObjAdd { pos: 0, id: 995, count: 5 });
        world.apply_zone_message(ZoneMessage::ObjCount {
            pos: 0,
            id: 995,
            old: 5,
            new: 8,
        });
        assert_eq!(world.objs.get(0, 40, 48)[0].count, 8);
        world.apply_zone_message(ZoneMessage::ObjDel { pos: 0, id: 995 });
        assert_eq!(world.objs.tile_count(), 0);
    }

    #[test]
    fn loc_merge_attaches_to_player_and_hides_loc() {
        let mut world = world();
        world.tick = 100;
        world.players[7] = Some(Player::default());
        world.apply_zone_message(ZoneMessage::LocMerge {
            pos: 0x00,
            info: info(LocShape::CentrepieceStraight, 1),
            id: 10,
            start: 3,
            end: 9,
            pid: 7,
            east: 1,
            south: 2,
            west: -1,
            north: 0,
        });
        let merge = world.players[7].as_ref().unwrap().loc_merge.unwrap();
        assert_eq!((merge.start, merge.end), (103, 109));
        // Rotated once, so the 2x1 loc is 1 wide and 2 long.
        assert_eq!((merge.offset_x, merge.offset_z), (40 * 128 + 64, 48 * 128 + 128));
        assert_eq!((merge.min_x, merge.max_x), (39, 41));
        assert_eq!((merge.min_z, merge.max_z), (48, 50));
        let (_, change) = world.loc_changes.iter().next().unwrap();
        assert_eq!((change.id, change.delay, change.duration), (-1, 4, 10));
    }

    #[test]
    fn loc_merge_for_unknown_player_is_ignored() {
        let mut world = world();
        world.apply_zone_message(ZoneMessage::LocMerge {
            pos: 0,
            info: info(LocShape::CentrepieceStraight, 0),
            id: 10,
            start: 0,
            end: 1,
            pid: 9,
            east: 0,
            south: 0,
            west: 0,
            north: 0,
        });
        assert!(world.loc_changes.is_empty());
    }

    #[test]
    fn projectile_needs_both_ends_in_region() {
        let mut world = world();
        world.set_zone_base(96, 96);
        let projectile = |dx| ZoneMessage::MapProjAnim {
            pos: 0x77,
            dx,
            dz: 0,
            target: 0,
            spotanim: 1,
            src_height: 0,
            dst_height: 0,
            start: 5,
            end: 20,
            peak: 16,
            arc: 0,
        };
        world.apply_zone_message(projectile(10));
        assert!(world.projectiles.is_empty());
        world.apply_zone_message(projectile(-10));
        let (_, p) = world.projectiles.iter().next().unwrap();
        assert_eq!((p.start, p.end), (5, 20));
        assert_eq!(p.src_x, (103 * 128 + 64) as f64);
    }

    #[test]
    fn map_anim_starts_after_delay() {
        let mut world = world();
        world.tick = 10;
        world.apply_zone_message(ZoneMessage::MapAnim {
            pos: 0,
            id: 4,
            height: 0,
            delay: 3,
        });
        let (_, spot) = world.spotanims.iter().next().unwrap();
        assert_eq!(spot.start, 13);
        assert_eq!((spot.x, spot.z), (40 * 128 + 64, 48 * 128 + 64));
    }
}
