//! The client's mirror of the world around the local player.

pub mod objs;
pub mod scene;
pub mod snapshot;
pub mod zone;

use std::collections::HashMap;

use crate::circular_buffer::CircularBuffer;
use crate::collision::CollisionGrid;
use crate::constants::{
    GAME_MESSAGE_HISTORY, LEVELS, LOCAL_PLAYER_INDEX, MAX_NPCS, MAX_PLAYERS, PLAYER_TARGET_BASE, REGION_CENTRE_OFFSET, REGION_SIZE,
    TILE_UNITS, ZONE_SIZE,
};
use crate::effects::{in_scenery_bounds, AnimatedLoc, EffectList, LocChange, Projectile, SpotAnim};
use crate::entity::{Appearance, Npc, PathingEntity, Player};
use crate::error::RouteError;
use crate::pathfinding::{PathFinder, Route, RouteRequest, RouteTarget};
use crate::telemetry::Telemetry;
use crate::types::{LocLayer, LocShape, TypeTables};

use objs::ObjStacks;
use scene::{PlacedLoc, Scene};

/// Something the local player can be routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InteractionTarget {
    /// Walk onto a region-local tile.
    Tile { x: i32, z: i32 },
    /// Stand next to an NPC.
    Npc(usize),
    /// Stand next to another player, by table slot.
    Player(usize),
    /// Reach whatever loc occupies `layer` at the tile.
    Loc { x: i32, z: i32, layer: LocLayer },
}

/// Map square the external loader should fetch after a rebuild.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MapSquare {
    pub x: u8,
    pub z: u8,
    pub land_crc: u32,
    pub loc_crc: u32,
}

pub struct World {
    /// Simulation ticks elapsed.
    pub tick: i32,
    pub types: TypeTables,

    /// Absolute tile of the region's south-west corner.
    pub base_x: i32,
    pub base_z: i32,
    /// Level the local player is on.
    pub level: usize,
    /// Server-side id of the local player; `-1` until assigned.
    pub local_pid: i32,

    pub players: Vec<Option<Player>>,
    /// Tracked player slots in server order.
    pub player_ids: Vec<usize>,
    pub npcs: Vec<Option<Npc>>,
    pub npc_ids: Vec<usize>,
    /// Last appearance seen per player slot, reapplied when a player returns.
    pub appearance_cache: HashMap<usize, Appearance>,

    pub collision: Vec<CollisionGrid>,
    pub scene: Scene,
    pub objs: ObjStacks,

    pub loc_changes: EffectList<LocChange>,
    pub animated_locs: EffectList<AnimatedLoc>,
    pub projectiles: EffectList<Projectile>,
    pub spotanims: EffectList<SpotAnim>,

    /// Region-local tile the current zone message is relative to.
    pub zone_base_x: i32,
    pub zone_base_z: i32,
    /// Squares named by the last region rebuild.
    pub map_squares: Vec<MapSquare>,

    pub messages: CircularBuffer<String>,
    pub logged_out: bool,
    pub telemetry: Telemetry,

    pathfinder: PathFinder,
}

impl World {
    pub fn new(types: TypeTables) -> Self {
        let mut players = vec![None; MAX_PLAYERS];
        players[LOCAL_PLAYER_INDEX] = Some(Player::default());
        World {
            tick: 0,
            types,
            base_x: 0,
            base_z: 0,
            level: 0,
            local_pid: -1,
            players,
            player_ids: Vec::new(),
            npcs: vec![None; MAX_NPCS],
            npc_ids: Vec::new(),
            appearance_cache: HashMap::new(),
            collision: (0..LEVELS).map(|_| CollisionGrid::default()).collect(),
            scene: Scene::default(),
            objs: ObjStacks::default(),
            loc_changes: EffectList::new(),
            animated_locs: EffectList::new(),
            projectiles: EffectList::new(),
            spotanims: EffectList::new(),
            zone_base_x: 0,
            zone_base_z: 0,
            map_squares: Vec::new(),
            messages: CircularBuffer::new(GAME_MESSAGE_HISTORY),
            logged_out: false,
            telemetry: Telemetry::default(),
            pathfinder: PathFinder::new(REGION_SIZE, REGION_SIZE),
        }
    }

    pub fn local_player(&self) -> Option<&Player> {
        self.players[LOCAL_PLAYER_INDEX].as_ref()
    }

    pub fn local_player_mut(&mut self) -> &mut Player {
        self.players[LOCAL_PLAYER_INDEX].get_or_insert_with(Player::default)
    }

    /// Table slot for a server player id; the local player lives in a fixed slot.
    pub fn player_slot(&self, pid: usize) -> usize {
        if pid as i32 == self.local_pid {
            LOCAL_PLAYER_INDEX
        } else {
            pid
        }
    }

    /// Entity a face-entity id refers to.
    pub fn face_target(&self, target: i32) -> Option<&PathingEntity> {
        if target < 0 {
            return None;
        }
        if target < PLAYER_TARGET_BASE {
            return self.npcs.get(target as usize)?.as_ref().map(|n| &n.entity);
        }
        let slot = self.player_slot((target - PLAYER_TARGET_BASE) as usize);
        self.players.get(slot)?.as_ref().map(|p| &p.entity)
    }

    pub fn push_message(&mut self, text: String) {
        log::debug!("game message: {text}");
        self.messages.push(text);
    }

    /// Replaces the occupant of a scene layer, keeping the collision grid in
    /// step. `id == -1` only clears. Tiles on the region margin are ignored.
    #[allow(clippy::too_many_arguments)]
    pub fn change_loc(&mut self, level: usize, x: i32, z: i32, layer: LocLayer, id: i32, shape: LocShape, rotation: u8) {
        if level >= LEVELS || !in_scenery_bounds(x, z) {
            return;
        }

        if let Some(old) = self.scene.set(level, x, z, layer, None) {
            let ty = self.types.loc(old.id as i32).cloned().unwrap_or_default();
            let grid = &mut self.collision[level];
            match layer {
                LocLayer::Wall => {
                    if ty.blockwalk {
                        grid.remove_wall(x, z, old.shape, old.rotation, ty.blockrange);
                    }
                }
                LocLayer::WallDecor => {}
                LocLayer::Ground => {
                    if ty.blockwalk {
                        grid.remove_loc(x, z, ty.width, ty.length, old.rotation, ty.blockrange);
                    }
                }
                LocLayer::GroundDecor => {
                    if ty.blockwalk && ty.active {
                        grid.remove_floor(x, z);
                    }
                }
            }
        }

        let Ok(loc_id) = u16::try_from(id) else {
            return;
        };
        let ty = self.types.loc(id).cloned().unwrap_or_default();
        self.scene.set(
            level,
            x,
            z,
            layer,
            Some(PlacedLoc {
                id: loc_id,
                shape,
                rotation,
            }),
        );

        let grid = &mut self.collision[level];
        match shape {
            LocShape::GroundDecor => {
                if ty.blockwalk && ty.active {
                    grid.add_floor(x, z);
                }
            }
            LocShape::WallStraight
            | LocShape::WallDiagonalCorner
            | LocShape::WallL
            | LocShape::WallSquareCorner => {
                if ty.blockwalk {
                    grid.add_wall(x, z, shape, rotation, ty.blockrange);
                }
            }
            s if s.layer() == LocLayer::Ground => {
                if ty.blockwalk {
                    grid.add_loc(x, z, ty.width, ty.length, rotation, ty.blockrange);
                }
            }
            _ => {}
        }

        if ty.anim != -1 {
            self.animated_locs
                .push(AnimatedLoc::new(level, layer, x, z, loc_id, ty.anim));
        }
    }

    /// Schedules a scenery change, merging with one already pending for the
    /// same slot. The slot's current occupant is remembered on first use.
    #[allow(clippy::too_many_arguments)]
    pub fn append_loc_change(
        &mut self,
        level: usize,
        x: i32,
        z: i32,
        layer: LocLayer,
        id: i32,
        shape: LocShape,
        rotation: u8,
        delay: i32,
        duration: i32,
    ) {
        let existing = self
            .loc_changes
            .iter()
            .find(|(_, c)| c.level == level && c.layer == layer && c.x == x && c.z == z)
            .map(|(handle, _)| handle);

        let handle = match existing {
            Some(handle) => handle,
            None => {
                log::trace!("loc change queued at ({x}, {z}) layer {layer:?}");
                self.loc_changes.push(LocChange {
                    level,
                    layer,
                    x,
                    z,
                    id,
                    shape,
                    rotation,
                    delay,
                    duration,
                    previous: self.scene.get(level, x, z, layer),
                })
            }
        };
        if let Some(change) = self.loc_changes.get_mut(handle) {
            change.id = id;
            change.shape = shape;
            change.rotation = rotation;
            change.delay = delay;
            change.duration = duration;
        }
    }

    /// Moves the region to be centred on zone `(zone_x, zone_z)`.
    ///
    /// Everything still inside the new region is shifted by the change in
    /// origin; the rest is dropped. Collision and scenery are cleared for the
    /// map loader to fill in again.
    pub fn rebuild_region(&mut self, zone_x: i32, zone_z: i32) {
        let new_base_x = (zone_x - REGION_CENTRE_OFFSET) * ZONE_SIZE;
        let new_base_z = (zone_z - REGION_CENTRE_OFFSET) * ZONE_SIZE;
        let dx = new_base_x - self.base_x;
        let dz = new_base_z - self.base_z;
        self.base_x = new_base_x;
        self.base_z = new_base_z;
        log::info!("region rebuilt at zone ({zone_x}, {zone_z}), shift ({dx}, {dz})");

        for player in self.players.iter_mut().flatten() {
            player.entity.shift(dx, dz);
            if let Some(merge) = player.loc_merge.as_mut() {
                merge.offset_x -= dx * TILE_UNITS;
                merge.offset_z -= dz * TILE_UNITS;
                merge.min_x -= dx;
                merge.max_x -= dx;
                merge.min_z -= dz;
                merge.max_z -= dz;
            }
        }
        for npc in self.npcs.iter_mut().flatten() {
            npc.entity.shift(dx, dz);
        }

        self.objs.shift(dx, dz);

        self.loc_changes.sweep(|change| {
            change.x -= dx;
            change.z -= dz;
            if !(0..REGION_SIZE).contains(&change.x) || !(0..REGION_SIZE).contains(&change.z) {
                return false;
            }
            // Installed permanent changes are reapplied over the fresh map.
            if change.delay == -1 && change.duration == -1 {
                change.delay = 0;
            }
            true
        });

        let fine_dx = (dx * TILE_UNITS) as f64;
        let fine_dz = (dz * TILE_UNITS) as f64;
        let fine_max = (REGION_SIZE * TILE_UNITS) as f64;
        self.projectiles.sweep(|proj| {
            proj.src_x -= fine_dx;
            proj.src_z -= fine_dz;
            proj.x -= fine_dx;
            proj.z -= fine_dz;
            (0.0..fine_max).contains(&proj.x) && (0.0..fine_max).contains(&proj.z)
        });
        let fine_max = REGION_SIZE * TILE_UNITS;
        self.spotanims.sweep(|spot| {
            spot.x -= dx * TILE_UNITS;
            spot.z -= dz * TILE_UNITS;
            (0..fine_max).contains(&spot.x) && (0..fine_max).contains(&spot.z)
        });
        self.animated_locs.clear();

        for grid in &mut self.collision {
            grid.reset();
        }
        self.scene.reset();
    }

    /// Routes the local player toward `target`.
    pub fn route_to(&mut self, target: InteractionTarget, try_nearest: bool) -> Result<Route, RouteError> {
        self.telemetry.route_requests += 1;
        let (src_x, src_z) = self
            .local_player()
            .map(|p| p.entity.tile())
            .ok_or(RouteError::TargetGone)?;
        let (dest_x, dest_z, route_target) = match target {
            InteractionTarget::Tile { x, z } => (x, z, RouteTarget::Tile),
            InteractionTarget::Npc(index) => {
                let npc = self
                    .npcs
                    .get(index)
                    .and_then(Option::as_ref)
                    .ok_or(RouteError::TargetGone)?;
                let (x, z) = npc.entity.tile();
                (x, z, adjacent())
            }
            InteractionTarget::Player(index) => {
                let player = self
                    .players
                    .get(index)
                    .and_then(Option::as_ref)
                    .ok_or(RouteError::TargetGone)?;
                let (x, z) = player.entity.tile();
                (x, z, adjacent())
            }
            InteractionTarget::Loc { x, z, layer } => {
                let placed = self
                    .scene
                    .get(self.level, x, z, layer)
                    .ok_or(RouteError::TargetGone)?;
                (x, z, self.loc_route_target(placed))
            }
        };

        let request = RouteRequest {
            src_x,
            src_z,
            dest_x,
            dest_z,
            target: route_target,
            try_nearest,
        };
        let result = self.pathfinder.find(&self.collision[self.level], &request);
        if let Err(err) = &result {
            self.telemetry.route_failures += 1;
            log::debug!("route from ({src_x}, {src_z}) to ({dest_x}, {dest_z}) failed: {err}");
        }
        result
    }

    fn loc_route_target(&self, placed: PlacedLoc) -> RouteTarget {
        match placed.shape {
            LocShape::CentrepieceStraight | LocShape::CentrepieceDiagonal | LocShape::GroundDecor => {
                let ty = self.types.loc(placed.id as i32).cloned().unwrap_or_default();
                let (width, length) = ty.rotated_size(placed.rotation);
                RouteTarget::Footprint {
                    width,
                    length,
                    blocked_sides: ty.rotated_forceapproach(placed.rotation),
                }
            }
            shape => RouteTarget::Boundary {
                shape,
                rotation: placed.rotation,
            },
        }
    }
}

fn adjacent() -> RouteTarget {
    RouteTarget::Footprint {
        width: 1,
        length: 1,
        blocked_sides: 0,
    }
}
