//! Routes decoded frames to the world.

use log::debug;

use super::decoder::Frame;
use super::entity_info::{read_npc_info, read_player_info};
use super::opcodes::ServerProt;
use crate::error::{ProtocolError, ProtocolResult};
use crate::packet::Packet;
use crate::world::zone::ZoneMessage;
use crate::world::{MapSquare, World};

/// Bytes per map square entry in a rebuild.
const MAP_SQUARE_LEN: usize = 10;

fn bad(message: &'static str, reason: impl Into<String>) -> ProtocolError {
    ProtocolError::BadMessage {
        message,
        reason: reason.into(),
    }
}

/// Applies one frame. Any error leaves the stream unusable.
pub fn dispatch(world: &mut World, frame: &Frame) -> ProtocolResult<()> {
    let prot = frame.prot;
    let mut p = Packet::new(&frame.body);

    match prot {
        ServerProt::PlayerInfo => read_player_info(world, &mut p)?,
        ServerProt::NpcInfo => read_npc_info(world, &mut p)?,
        ServerProt::UpdateZonePartialFollows => {
            let (x, z) = (p.g1()?, p.g1()?);
            world.set_zone_base(x as i32, z as i32);
        }
        ServerProt::UpdateZoneFullFollows => {
            let (x, z) = (p.g1()?, p.g1()?);
            world.set_zone_base(x as i32, z as i32);
            world.clear_zone();
        }
        ServerProt::UpdateZonePartialEnclosed => {
            let (x, z) = (p.g1()?, p.g1()?);
            world.set_zone_base(x as i32, z as i32);
            while p.remaining() > 0 {
                let code = p.g1()?;
                let sub = ServerProt::try_from(code)
                    .ok()
                    .filter(|sub| sub.is_zone_message())
                    .ok_or_else(|| bad(prot.name(), format!("sub-opcode {code}")))?;
                apply_zone(world, sub, &mut p)?;
            }
        }
        ServerProt::RebuildNormal => {
            let zone_x = p.g2()? as i32;
            let zone_z = p.g2()? as i32;
            if p.remaining() % MAP_SQUARE_LEN != 0 {
                return Err(bad(prot.name(), format!("{} trailing bytes", p.remaining())));
            }
            let mut squares = Vec::with_capacity(p.remaining() / MAP_SQUARE_LEN);
            while p.remaining() > 0 {
                squares.push(MapSquare {
                    x: p.g1()?,
                    z: p.g1()?,
                    land_crc: p.g4()?,
                    loc_crc: p.g4()?,
                });
            }
            world.rebuild_region(zone_x, zone_z);
            world.map_squares = squares;
        }
        ServerProt::UpdatePid => {
            world.local_pid = p.g2()? as i32;
            debug!("local pid {}", world.local_pid);
        }
        ServerProt::ResetAnims => {
            let players = world.players.iter_mut().flatten().map(|player| &mut player.entity);
            let npcs = world.npcs.iter_mut().flatten().map(|npc| &mut npc.entity);
            for e in players.chain(npcs) {
                e.primary_seq = -1;
            }
        }
        ServerProt::MessageGame => {
            let text = p.gjstr()?;
            world.push_message(text);
        }
        ServerProt::Logout => {
            debug!("server requested logout");
            world.logged_out = true;
        }
        zone => apply_zone(world, zone, &mut p)?,
    }

    p.expect_consumed(prot.name())
}

fn apply_zone(world: &mut World, prot: ServerProt, p: &mut Packet<'_>) -> ProtocolResult<()> {
    let message = ZoneMessage::decode(prot, p)?.ok_or_else(|| bad(prot.name(), "not a zone message"))?;
    debug!("{} at zone ({}, {})", prot.name(), world.zone_base_x, world.zone_base_z);
    world.apply_zone_message(message);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::PacketWriter;
    use crate::types::TypeTables;

    fn frame(prot: ServerProt, build: impl FnOnce(&mut PacketWriter)) -> Frame {
        let mut w = PacketWriter::new();
        build(&mut w);
        Frame {
            prot,
            body: w.into_inner(),
        }
    }

    fn world() -> World {
        World::new(TypeTables::default())
    }

    #[test]
    fn enclosed_zone_runs_every_sub_message() {
        let mut world = world();
        let f = frame(ServerProt::UpdateZonePartialEnclosed, |w| {
            w.p1(48);
            w.p1(56);
            for (x, z, id) in [(1u8, 2u8, 995u16), (3, 4, 1511)] {
                w.p1(ServerProt::ObjAdd as u8);
                w.p1((x << 4) | z);
                w.p2(id);
                w.p2(1);
            }
        });
        dispatch(&mut world, &f).unwrap();
        assert_eq!((world.zone_base_x, world.zone_base_z), (48, 56));
        assert_eq!(world.objs.tile_count(), 2);
    }

    #[test]
    fn enclosed_zone_rejects_top_level_opcodes() {
        let mut world = world();
        let f = frame(ServerProt::UpdateZonePartialEnclosed, |w| {
            w.p1(0);
            w.p1(0);
            w.p1(ServerProt::Logout as u8);
        });
        assert!(matches!(
            dispatch(&mut world, &f),
            Err(ProtocolError::BadMessage { .. })
        ));
        assert!(!world.logged_out);
    }

    #[test]
    fn full_follows_clears_zone_objects() {
        let mut world = world();
        dispatch(
            &mut world,
            &frame(ServerProt::UpdateZonePartialFollows, |w| {
                w.p1(16);
                w.p1(16);
            }),
        )
        .unwrap();
        dispatch(
            &mut world,
            &frame(ServerProt::ObjAdd, |w| {
                w.p1(0x11);
                w.p2(995);
                w.p2(10);
            }),
        )
        .unwrap();
        assert_eq!(world.objs.tile_count(), 1);

        dispatch(
            &mut world,
            &frame(ServerProt::UpdateZoneFullFollows, |w| {
                w.p1(16);
                w.p1(16);
            }),
        )
        .unwrap();
        assert_eq!(world.objs.tile_count(), 0);
    }

    #[test]
    fn rebuild_records_map_squares() {
        let mut world = world();
        let f = frame(ServerProt::RebuildNormal, |w| {
            w.p2(400);
            w.p2(400);
            w.p1(50);
            w.p1(50);
            w.p4(0xdead);
            w.p4(0xbeef);
        });
        dispatch(&mut world, &f).unwrap();
        assert_eq!((world.base_x, world.base_z), (3152, 3152));
        assert_eq!(
            world.map_squares,
            vec![MapSquare {
                x: 50,
                z: 50,
                land_crc: 0xdead,
                loc_crc: 0xbeef
            }]
        );
    }

    #[test]
    fn rebuild_with_partial_square_is_fatal() {
        let mut world = world();
        let f = frame(ServerProt::RebuildNormal, |w| {
            w.p2(400);
            w.p2(400);
            w.p1(50);
        });
        assert!(dispatch(&mut world, &f).is_err());
    }

    #[test]
    fn small_messages_update_session_state() {
        let mut world = world();
        dispatch(&mut world, &frame(ServerProt::UpdatePid, |w| w.p2(7))).unwrap();
        assert_eq!(world.local_pid, 7);
        assert_eq!(world.player_slot(7), crate::constants::LOCAL_PLAYER_INDEX);

        dispatch(&mut world, &frame(ServerProt::MessageGame, |w| w.pjstr("Welcome."))).unwrap();
        assert_eq!(world.messages.get(0).map(String::as_str), Some("Welcome."));

        world.local_player_mut().entity.primary_seq = 808;
        dispatch(&mut world, &frame(ServerProt::ResetAnims, |_| {})).unwrap();
        assert_eq!(world.local_player().unwrap().entity.primary_seq, -1);

        dispatch(&mut world, &frame(ServerProt::Logout, |_| {})).unwrap();
        assert!(world.logged_out);
    }

    #[test]
    fn oversized_fixed_body_is_fatal() {
        let mut world = world();
        let f = Frame {
            prot: ServerProt::UpdatePid,
            body: vec![0, 1, 2],
        };
        assert!(matches!(
            dispatch(&mut world, &f),
            Err(ProtocolError::SizeMismatch { .. })
        ));
    }
}
