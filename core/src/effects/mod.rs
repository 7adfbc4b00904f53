//! Transient world effects and their per-tick lifecycle.

pub mod arena;

pub use arena::{EffectList, Handle};

use crate::constants::{LOCAL_PLAYER_INDEX, RADIANS_TO_YAW, REGION_SIZE, SCENERY_MARGIN, YAW_MASK};
use crate::entity::{Npc, Player};
use crate::types::{LocLayer, LocShape, SeqType};
use crate::world::scene::PlacedLoc;
use crate::world::World;

/// Radians per unit of projectile peak pitch.
const PITCH_TO_RADIANS: f64 = 0.02454369;

/// A scheduled scenery change, remembered so it can be undone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocChange {
    pub level: usize,
    pub layer: LocLayer,
    pub x: i32,
    pub z: i32,
    /// Loc to install, `-1` to clear the slot.
    pub id: i32,
    pub shape: LocShape,
    pub rotation: u8,
    /// Ticks until installation; `-1` once installed.
    pub delay: i32,
    /// Ticks until the previous occupant is restored; `-1` for permanent.
    pub duration: i32,
    pub previous: Option<PlacedLoc>,
}

/// Looping animation on a placed loc.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnimatedLoc {
    pub level: usize,
    pub layer: LocLayer,
    pub x: i32,
    pub z: i32,
    pub loc_id: u16,
    pub seq: i32,
    pub frame: i32,
    pub cycle: i32,
}

impl AnimatedLoc {
    pub fn new(level: usize, layer: LocLayer, x: i32, z: i32, loc_id: u16, seq: i32) -> Self {
        AnimatedLoc {
            level,
            layer,
            x,
            z,
            loc_id,
            seq,
            frame: -1,
            cycle: 0,
        }
    }

    /// Advances one tick. Returns false once the sequence runs off its frames.
    pub fn advance(&mut self, seq: &SeqType) -> bool {
        self.cycle += 1;
        if self.frame == -1 {
            self.frame = 0;
        }
        let frames = seq.frame_count() as i32;
        while self.frame < frames && self.cycle > seq.delay(self.frame) {
            self.cycle -= seq.delay(self.frame) + 1;
            self.frame += 1;
            if self.frame >= frames {
                self.frame -= seq.replay_offset;
                if self.frame < 0 || self.frame >= frames {
                    return false;
                }
            }
        }
        frames > 0
    }
}

/// A projectile arcing from a tile toward a tile or an entity.
#[derive(Debug, Clone, PartialEq)]
pub struct Projectile {
    pub spotanim: i32,
    pub level: usize,
    pub src_x: f64,
    pub src_y: f64,
    pub src_z: f64,
    pub start: i32,
    pub end: i32,
    pub peak_pitch: i32,
    pub arc: i32,
    /// Above zero an NPC index + 1, below zero -(player id + 1).
    pub target: i32,
    pub dst_height: i32,

    pub mobile: bool,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub vx: f64,
    pub vy: f64,
    pub vz: f64,
    pub velocity: f64,
    pub accel_y: f64,
    pub yaw: i32,
    pub pitch: i32,
    pub frame: i32,
    pub cycle: i32,
}

impl Projectile {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        spotanim: i32,
        level: usize,
        src: (i32, i32, i32),
        start: i32,
        end: i32,
        peak_pitch: i32,
        arc: i32,
        target: i32,
        dst_height: i32,
    ) -> Self {
        let (x, y, z) = (src.0 as f64, src.1 as f64, src.2 as f64);
        Projectile {
            spotanim,
            level,
            src_x: x,
            src_y: y,
            src_z: z,
            start,
            end,
            peak_pitch,
            arc,
            target,
            dst_height,
            mobile: false,
            x,
            y,
            z,
            vx: 0.0,
            vy: 0.0,
            vz: 0.0,
            velocity: 0.0,
            accel_y: 0.0,
            yaw: 0,
            pitch: 0,
            frame: 0,
            cycle: 0,
        }
    }

    /// Aims at `(dst_x, dst_y, dst_z)` so the projectile lands after its last tick.
    pub fn update_velocity(&mut self, dst_x: i32, dst_y: i32, dst_z: i32, tick: i32) {
        let (dst_x, dst_y, dst_z) = (dst_x as f64, dst_y as f64, dst_z as f64);
        if !self.mobile {
            let dx = dst_x - self.src_x;
            let dz = dst_z - self.src_z;
            let distance = (dx * dx + dz * dz).sqrt();
            if distance > 0.0 {
                self.x = self.src_x + dx * self.arc as f64 / distance;
                self.z = self.src_z + dz * self.arc as f64 / distance;
            }
            self.y = self.src_y;
        }

        let dt = (self.end + 1 - tick).max(1) as f64;
        self.vx = (dst_x - self.x) / dt;
        self.vz = (dst_z - self.z) / dt;
        self.velocity = (self.vx * self.vx + self.vz * self.vz).sqrt();
        if !self.mobile {
            self.vy = -self.velocity * (self.peak_pitch as f64 * PITCH_TO_RADIANS).tan();
        }
        self.accel_y = (dst_y - self.y - self.vy * dt) * 2.0 / (dt * dt);
    }

    pub fn update(&mut self, delta: i32, seq: Option<&SeqType>) {
        let d = delta as f64;
        self.mobile = true;
        self.x += self.vx * d;
        self.z += self.vz * d;
        self.y += self.vy * d + 0.5 * self.accel_y * d * d;
        self.vy += self.accel_y * d;
        self.yaw = ((self.vx.atan2(self.vz) * RADIANS_TO_YAW) as i32 + 1024) & YAW_MASK;
        self.pitch = ((self.vy.atan2(self.velocity) * RADIANS_TO_YAW) as i32) & YAW_MASK;

        if let Some(seq) = seq {
            let frames = seq.frame_count() as i32;
            self.cycle += delta;
            while self.frame < frames && self.cycle > seq.delay(self.frame) {
                self.cycle -= seq.delay(self.frame);
                self.frame += 1;
                if self.frame >= frames {
                    self.frame = 0;
                }
            }
        }
    }
}

/// A one-shot graphic at a fixed spot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpotAnim {
    pub id: i32,
    pub level: usize,
    pub x: i32,
    pub y: i32,
    pub z: i32,
    pub start: i32,
    pub frame: i32,
    pub cycle: i32,
    pub complete: bool,
}

impl SpotAnim {
    pub fn new(id: i32, level: usize, x: i32, y: i32, z: i32, tick: i32, delay: i32) -> Self {
        SpotAnim {
            id,
            level,
            x,
            y,
            z,
            start: tick + delay,
            frame: 0,
            cycle: 0,
            complete: false,
        }
    }

    pub fn update(&mut self, delta: i32, seq: Option<&SeqType>) {
        let Some(seq) = seq else {
            self.complete = true;
            return;
        };
        let frames = seq.frame_count() as i32;
        self.cycle += delta;
        while self.frame < frames && self.cycle > seq.delay(self.frame) {
            self.cycle -= seq.delay(self.frame);
            self.frame += 1;
            if self.frame >= frames {
                self.frame = 0;
                self.complete = true;
            }
        }
        if frames == 0 {
            self.complete = true;
        }
    }
}

pub(crate) fn in_scenery_bounds(x: i32, z: i32) -> bool {
    let max = REGION_SIZE - 1 - SCENERY_MARGIN;
    (SCENERY_MARGIN..=max).contains(&x) && (SCENERY_MARGIN..=max).contains(&z)
}

/// Fine position of a projectile target.
fn resolve_target(players: &[Option<Player>], npcs: &[Option<Npc>], local_pid: i32, target: i32) -> Option<(i32, i32)> {
    if target > 0 {
        let npc = npcs.get((target - 1) as usize)?.as_ref()?;
        Some((npc.entity.x, npc.entity.z))
    } else if target < 0 {
        let mut index = (-target - 1) as usize;
        if index as i32 == local_pid {
            index = LOCAL_PLAYER_INDEX;
        }
        let player = players.get(index)?.as_ref()?;
        Some((player.entity.x, player.entity.z))
    } else {
        None
    }
}

impl World {
    /// Counts down pending scenery changes, installing and restoring them.
    pub(crate) fn update_loc_changes(&mut self) {
        for handle in self.loc_changes.handles() {
            let Some(mut change) = self.loc_changes.get(handle).copied() else {
                continue;
            };

            if change.duration > 0 {
                change.duration -= 1;
            }
            if change.duration == 0 {
                let (id, shape, rotation) = match change.previous {
                    Some(prev) => (prev.id as i32, prev.shape, prev.rotation),
                    None => (-1, change.shape, change.rotation),
                };
                self.change_loc(change.level, change.x, change.z, change.layer, id, shape, rotation);
                self.loc_changes.remove(handle);
                continue;
            }

            if change.delay > 0 {
                change.delay -= 1;
            }
            let mut finished = false;
            if change.delay == 0 && in_scenery_bounds(change.x, change.z) {
                self.change_loc(
                    change.level,
                    change.x,
                    change.z,
                    change.layer,
                    change.id,
                    change.shape,
                    change.rotation,
                );
                change.delay = -1;
                finished = match change.previous {
                    None => change.id == -1,
                    Some(prev) => {
                        prev.id as i32 == change.id
                            && prev.shape == change.shape
                            && prev.rotation == change.rotation
                    }
                };
            }

            if finished {
                self.loc_changes.remove(handle);
            } else if let Some(slot) = self.loc_changes.get_mut(handle) {
                *slot = change;
            }
        }
    }

    pub(crate) fn update_animated_locs(&mut self) {
        let World {
            animated_locs,
            types,
            scene,
            ..
        } = self;
        animated_locs.sweep(|loc| {
            // The loc may have been replaced since the animation started.
            match scene.get(loc.level, loc.x, loc.z, loc.layer) {
                Some(placed) if placed.id == loc.loc_id => {}
                _ => return false,
            }
            match types.seq(loc.seq) {
                Some(seq) => loc.advance(seq),
                None => false,
            }
        });
    }

    pub(crate) fn update_projectiles(&mut self) {
        let World {
            projectiles,
            players,
            npcs,
            scene,
            types,
            tick,
            level,
            local_pid,
            ..
        } = self;
        let (tick, level, local_pid) = (*tick, *level, *local_pid);
        projectiles.sweep(|proj| {
            if proj.level != level || tick > proj.end {
                return false;
            }
            if tick >= proj.start {
                if let Some((tx, tz)) = resolve_target(players, npcs, local_pid, proj.target) {
                    let ty = scene.height_at(level, tx, tz) - proj.dst_height;
                    proj.update_velocity(tx, ty, tz, tick);
                }
                let seq = types.spotanim(proj.spotanim).and_then(|s| types.seq(s.seq));
                proj.update(1, seq);
            }
            true
        });
    }

    pub(crate) fn update_spotanims(&mut self) {
        let World {
            spotanims,
            types,
            tick,
            level,
            ..
        } = self;
        let (tick, level) = (*tick, *level);
        spotanims.sweep(|spot| {
            if spot.level != level || spot.complete {
                return false;
            }
            if tick >= spot.start {
                let seq = types.spotanim(spot.id).and_then(|s| types.seq(s.seq));
                spot.update(1, seq);
                return !spot.complete;
            }
            true
        });
    }

    /// Runs every transient lifecycle once.
    pub(crate) fn update_effects(&mut self) {
        self.update_loc_changes();
        self.update_animated_locs();
        self.update_projectiles();
        self.update_spotanims();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seq(delays: &[i32], replay_offset: i32) -> SeqType {
        SeqType {
            frame_delays: delays.to_vec(),
            replay_offset,
            ..SeqType::default()
        }
    }

    #[test]
    fn animated_loc_loops_with_replay_offset() {
        let seq = seq(&[1, 1], 2);
        let mut loc = AnimatedLoc::new(0, LocLayer::Ground, 5, 5, 1, 0);
        assert!(loc.advance(&seq));
        assert_eq!(loc.frame, 0);
        for _ in 0..10 {
            assert!(loc.advance(&seq));
            assert!(loc.frame >= 0 && loc.frame < 2);
        }
    }

    #[test]
    fn animated_loc_without_replay_ends() {
        let seq = seq(&[1], -1);
        let mut loc = AnimatedLoc::new(0, LocLayer::Ground, 5, 5, 1, 0);
        let mut alive = true;
        for _ in 0..5 {
            alive = loc.advance(&seq);
            if !alive {
                break;
            }
        }
        assert!(!alive);
    }

    #[test]
    fn projectile_lands_on_target_at_end() {
        let mut proj = Projectile::new(1, 0, (1000, 0, 1000), 10, 20, 16, 0, 0, 0);
        proj.update_velocity(2000, 0, 1000, 10);
        for _ in 0..11 {
            proj.update(1, None);
        }
        assert!((proj.x - 2000.0).abs() < 1e-6);
        assert!(proj.y.abs() < 1e-6);
        // Eastward flight.
        assert_eq!(proj.yaw, ((std::f64::consts::FRAC_PI_2 * RADIANS_TO_YAW) as i32 + 1024) & YAW_MASK);
    }

    #[test]
    fn projectile_arcs_upward_first() {
        let mut proj = Projectile::new(1, 0, (0, 0, 0), 0, 10, 16, 0, 0, 0);
        proj.update_velocity(1280, 0, 0, 0);
        assert!(proj.vy < 0.0);
        proj.update(1, None);
        assert!(proj.y < 0.0);
    }

    #[test]
    fn spot_anim_completes_after_one_pass() {
        let seq = seq(&[2, 2], -1);
        let mut spot = SpotAnim::new(1, 0, 0, 0, 0, 0, 0);
        let mut ticks = 0;
        while !spot.complete {
            spot.update(1, Some(&seq));
            ticks += 1;
            assert!(ticks < 100);
        }
        assert_eq!(ticks, 5);
    }

    #[test]
    fn scenery_margin_excludes_edges() {
        assert!(!in_scenery_bounds(0, 50));
        assert!(in_scenery_bounds(1, 1));
        assert!(in_scenery_bounds(102, 102));
        assert!(!in_scenery_bounds(103, 50));
    }
}
