//! Placed scenery and terrain heights for the loaded region.

use crate::constants::{LEVELS, REGION_SIZE, TILE_UNITS};
use crate::types::{LocLayer, LocShape};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlacedLoc {
    pub id: u16,
    pub shape: LocShape,
    pub rotation: u8,
}

/// One loc per layer per tile, plus a vertex heightmap per level.
#[derive(Debug, Clone)]
pub struct Scene {
    size: i32,
    slots: Vec<Option<PlacedLoc>>,
    /// `(size + 1)^2` vertices per level.
    heights: Vec<i32>,
}

impl Default for Scene {
    fn default() -> Self {
        Self::new(REGION_SIZE)
    }
}

impl Scene {
    pub fn new(size: i32) -> Self {
        let tiles = (size * size) as usize;
        let vertices = ((size + 1) * (size + 1)) as usize;
        Scene {
            size,
            slots: vec![None; LEVELS * tiles * LocLayer::ALL.len()],
            heights: vec![0; LEVELS * vertices],
        }
    }

    pub fn reset(&mut self) {
        self.slots.iter_mut().for_each(|slot| *slot = None);
        self.heights.iter_mut().for_each(|h| *h = 0);
    }

    fn in_bounds(&self, level: usize, x: i32, z: i32) -> bool {
        level < LEVELS && x >= 0 && z >= 0 && x < self.size && z < self.size
    }

    fn slot_index(&self, level: usize, x: i32, z: i32, layer: LocLayer) -> usize {
        let tile = (x * self.size + z) as usize;
        ((level * (self.size * self.size) as usize) + tile) * LocLayer::ALL.len() + layer as usize
    }

    pub fn get(&self, level: usize, x: i32, z: i32, layer: LocLayer) -> Option<PlacedLoc> {
        if !self.in_bounds(level, x, z) {
            return None;
        }
        self.slots[self.slot_index(level, x, z, layer)]
    }

    /// Replaces the occupant of a layer, returning the old one.
    pub fn set(&mut self, level: usize, x: i32, z: i32, layer: LocLayer, loc: Option<PlacedLoc>) -> Option<PlacedLoc> {
        if !self.in_bounds(level, x, z) {
            return None;
        }
        let index = self.slot_index(level, x, z, layer);
        std::mem::replace(&mut self.slots[index], loc)
    }

    fn vertex_index(&self, level: usize, x: i32, z: i32) -> usize {
        let side = self.size + 1;
        level * (side * side) as usize + (x * side + z) as usize
    }

    /// Sets the height of the south-west vertex of a tile.
    pub fn set_height(&mut self, level: usize, x: i32, z: i32, height: i32) {
        if level < LEVELS && (0..=self.size).contains(&x) && (0..=self.size).contains(&z) {
            let index = self.vertex_index(level, x, z);
            self.heights[index] = height;
        }
    }

    pub fn vertex_height(&self, level: usize, x: i32, z: i32) -> i32 {
        if level < LEVELS && (0..=self.size).contains(&x) && (0..=self.size).contains(&z) {
            self.heights[self.vertex_index(level, x, z)]
        } else {
            0
        }
    }

    /// Terrain height under a fine position, interpolated across the tile.
    pub fn height_at(&self, level: usize, fine_x: i32, fine_z: i32) -> i32 {
        let tile_x = fine_x >> 7;
        let tile_z = fine_z >> 7;
        if !self.in_bounds(level, tile_x, tile_z) {
            return 0;
        }
        let local_x = fine_x & (TILE_UNITS - 1);
        let local_z = fine_z & (TILE_UNITS - 1);
        let h00 = self.vertex_height(level, tile_x, tile_z);
        let h10 = self.vertex_height(level, tile_x + 1, tile_z);
        let h01 = self.vertex_height(level, tile_x, tile_z + 1);
        let h11 = self.vertex_height(level, tile_x + 1, tile_z + 1);
        let south = (h00 * (TILE_UNITS - local_x) + h10 * local_x) >> 7;
        let north = (h01 * (TILE_UNITS - local_x) + h11 * local_x) >> 7;
        (south * (TILE_UNITS - local_z) + north * local_z) >> 7
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layers_are_independent() {
        let mut scene = Scene::default();
        let wall = PlacedLoc {
            id: 1,
            shape: LocShape::WallStraight,
            rotation: 2,
        };
        assert_eq!(scene.set(0, 10, 10, LocLayer::Wall, Some(wall)), None);
        assert_eq!(scene.get(0, 10, 10, LocLayer::Wall), Some(wall));
        assert_eq!(scene.get(0, 10, 10, LocLayer::Ground), None);
        assert_eq!(scene.get(1, 10, 10, LocLayer::Wall), None);
        assert_eq!(scene.set(0, 10, 10, LocLayer::Wall, None), Some(wall));
    }

    #[test]
    fn height_interpolates_between_vertices() {
        let mut scene = Scene::default();
        scene.set_height(0, 5, 5, 0);
        scene.set_height(0, 6, 5, -256);
        scene.set_height(0, 5, 6, 0);
        scene.set_height(0, 6, 6, -256);
        assert_eq!(scene.height_at(0, 5 * 128, 5 * 128 + 10), 0);
        assert_eq!(scene.height_at(0, 5 * 128 + 64, 5 * 128 + 64), -128);
        assert_eq!(scene.height_at(0, -5, 0), 0);
    }
}
