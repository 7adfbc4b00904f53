//! Per-level tile collision flags.
//!
//! Only the scenery path mutates a grid; pathfinding and the simulator read it.

use bitflags::bitflags;

use crate::constants::REGION_SIZE;
use crate::types::LocShape;

bitflags! {
    /// One word per tile. Wall bits name the edge of *this* tile that is
    /// blocked; the projectile variants sit nine bits higher.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct CollisionFlags: u32 {
        const WALL_NORTH_WEST = 0x1;
        const WALL_NORTH = 0x2;
        const WALL_NORTH_EAST = 0x4;
        const WALL_EAST = 0x8;
        const WALL_SOUTH_EAST = 0x10;
        const WALL_SOUTH = 0x20;
        const WALL_SOUTH_WEST = 0x40;
        const WALL_WEST = 0x80;
        const LOC = 0x100;

        const WALL_NORTH_WEST_PROJ = 0x200;
        const WALL_NORTH_PROJ = 0x400;
        const WALL_NORTH_EAST_PROJ = 0x800;
        const WALL_EAST_PROJ = 0x1000;
        const WALL_SOUTH_EAST_PROJ = 0x2000;
        const WALL_SOUTH_PROJ = 0x4000;
        const WALL_SOUTH_WEST_PROJ = 0x8000;
        const WALL_WEST_PROJ = 0x10000;
        const LOC_PROJ = 0x20000;

        /// Occupied by a mobile entity. Never set by this client.
        const ENTITY = 0x80000;
        /// Unwalkable floor, or a blocking ground decoration.
        const FLOOR = 0x200000;

        /// Region border: blocks everything.
        const BORDER = 0xffffff;
    }
}

const PROJECTILE_SHIFT: u32 = 9;

impl CollisionFlags {
    const STEP_BLOCKERS: u32 = 0x100 | 0x80000 | 0x200000;

    /// Blocks stepping onto the tile while moving west.
    pub const BLOCK_WEST: Self = Self::from_bits_retain(Self::STEP_BLOCKERS | 0x8);
    pub const BLOCK_EAST: Self = Self::from_bits_retain(Self::STEP_BLOCKERS | 0x80);
    pub const BLOCK_SOUTH: Self = Self::from_bits_retain(Self::STEP_BLOCKERS | 0x2);
    pub const BLOCK_NORTH: Self = Self::from_bits_retain(Self::STEP_BLOCKERS | 0x20);
    pub const BLOCK_SOUTH_WEST: Self = Self::from_bits_retain(Self::STEP_BLOCKERS | 0x2 | 0x4 | 0x8);
    pub const BLOCK_SOUTH_EAST: Self = Self::from_bits_retain(Self::STEP_BLOCKERS | 0x1 | 0x2 | 0x80);
    pub const BLOCK_NORTH_WEST: Self = Self::from_bits_retain(Self::STEP_BLOCKERS | 0x8 | 0x10 | 0x20);
    pub const BLOCK_NORTH_EAST: Self = Self::from_bits_retain(Self::STEP_BLOCKERS | 0x20 | 0x40 | 0x80);

    /// Projectile counterpart of a set of walk-blocking wall bits.
    pub fn projectile(self) -> Self {
        Self::from_bits_retain((self.bits() & 0x1ff) << PROJECTILE_SHIFT)
    }
}

#[derive(Debug, Clone)]
pub struct CollisionGrid {
    size_x: i32,
    size_z: i32,
    flags: Vec<CollisionFlags>,
}

impl Default for CollisionGrid {
    fn default() -> Self {
        Self::new(REGION_SIZE, REGION_SIZE)
    }
}

impl CollisionGrid {
    pub fn new(size_x: i32, size_z: i32) -> Self {
        let mut grid = CollisionGrid {
            size_x,
            size_z,
            flags: vec![CollisionFlags::empty(); (size_x * size_z) as usize],
        };
        grid.reset();
        grid
    }

    pub fn size_x(&self) -> i32 {
        self.size_x
    }

    pub fn size_z(&self) -> i32 {
        self.size_z
    }

    /// Clears the interior and walls off the outermost ring of tiles.
    pub fn reset(&mut self) {
        for x in 0..self.size_x {
            for z in 0..self.size_z {
                let border = x == 0 || z == 0 || x == self.size_x - 1 || z == self.size_z - 1;
                let value = if border {
                    CollisionFlags::BORDER
                } else {
                    CollisionFlags::empty()
                };
                let index = self.index(x, z);
                self.flags[index] = value;
            }
        }
    }

    pub fn in_bounds(&self, x: i32, z: i32) -> bool {
        x >= 0 && z >= 0 && x < self.size_x && z < self.size_z
    }

    fn index(&self, x: i32, z: i32) -> usize {
        (x * self.size_z + z) as usize
    }

    /// Flags at a tile. Tiles outside the grid read as fully blocked.
    pub fn get(&self, x: i32, z: i32) -> CollisionFlags {
        if self.in_bounds(x, z) {
            self.flags[self.index(x, z)]
        } else {
            CollisionFlags::BORDER
        }
    }

    /// True when none of `mask` is set at the tile.
    pub fn is_clear(&self, x: i32, z: i32, mask: CollisionFlags) -> bool {
        !self.get(x, z).intersects(mask)
    }

    fn add(&mut self, x: i32, z: i32, flags: CollisionFlags) {
        if self.in_bounds(x, z) {
            let index = self.index(x, z);
            self.flags[index] |= flags;
        }
    }

    fn remove(&mut self, x: i32, z: i32, flags: CollisionFlags) {
        if self.in_bounds(x, z) {
            let index = self.index(x, z);
            self.flags[index] &= !flags;
        }
    }

    pub fn add_floor(&mut self, x: i32, z: i32) {
        self.add(x, z, CollisionFlags::FLOOR);
    }

    pub fn remove_floor(&mut self, x: i32, z: i32) {
        self.remove(x, z, CollisionFlags::FLOOR);
    }

    pub fn add_loc(&mut self, x: i32, z: i32, width: i32, length: i32, rotation: u8, blockrange: bool) {
        self.apply_loc(x, z, width, length, rotation, blockrange, true);
    }

    pub fn remove_loc(&mut self, x: i32, z: i32, width: i32, length: i32, rotation: u8, blockrange: bool) {
        self.apply_loc(x, z, width, length, rotation, blockrange, false);
    }

    #[allow(clippy::too_many_arguments)]
    fn apply_loc(
        &mut self,
        x: i32,
        z: i32,
        width: i32,
        length: i32,
        rotation: u8,
        blockrange: bool,
        adding: bool,
    ) {
        let mut flags = CollisionFlags::LOC;
        if blockrange {
            flags |= CollisionFlags::LOC_PROJ;
        }
        let (w, l) = if rotation & 1 == 1 {
            (length, width)
        } else {
            (width, length)
        };
        for tx in x..x + w {
            for tz in z..z + l {
                if adding {
                    self.add(tx, tz, flags);
                } else {
                    self.remove(tx, tz, flags);
                }
            }
        }
    }

    pub fn add_wall(&mut self, x: i32, z: i32, shape: LocShape, rotation: u8, blockrange: bool) {
        for (dx, dz, flags) in wall_edges(shape, rotation) {
            self.add(x + dx, z + dz, flags);
            if blockrange {
                self.add(x + dx, z + dz, flags.projectile());
            }
        }
    }

    pub fn remove_wall(&mut self, x: i32, z: i32, shape: LocShape, rotation: u8, blockrange: bool) {
        for (dx, dz, flags) in wall_edges(shape, rotation) {
            self.remove(x + dx, z + dz, flags);
            if blockrange {
                self.remove(x + dx, z + dz, flags.projectile());
            }
        }
    }
}

/// Edges a wall shape blocks: the tile itself plus the matching edge of each
/// neighbour it borders.
fn wall_edges(shape: LocShape, rotation: u8) -> Vec<(i32, i32, CollisionFlags)> {
    use CollisionFlags as F;
    let rotation = rotation & 3;
    match shape {
        LocShape::WallStraight => match rotation {
            0 => vec![(0, 0, F::WALL_WEST), (-1, 0, F::WALL_EAST)],
            1 => vec![(0, 0, F::WALL_NORTH), (0, 1, F::WALL_SOUTH)],
            2 => vec![(0, 0, F::WALL_EAST), (1, 0, F::WALL_WEST)],
            _ => vec![(0, 0, F::WALL_SOUTH), (0, -1, F::WALL_NORTH)],
        },
        LocShape::WallDiagonalCorner | LocShape::WallSquareCorner => match rotation {
            0 => vec![(0, 0, F::WALL_NORTH_WEST), (-1, 1, F::WALL_SOUTH_EAST)],
            1 => vec![(0, 0, F::WALL_NORTH_EAST), (1, 1, F::WALL_SOUTH_WEST)],
            2 => vec![(0, 0, F::WALL_SOUTH_EAST), (1, -1, F::WALL_NORTH_WEST)],
            _ => vec![(0, 0, F::WALL_SOUTH_WEST), (-1, -1, F::WALL_NORTH_EAST)],
        },
        LocShape::WallL => match rotation {
            0 => vec![
                (0, 0, F::WALL_NORTH | F::WALL_WEST),
                (-1, 0, F::WALL_EAST),
                (0, 1, F::WALL_SOUTH),
            ],
            1 => vec![
                (0, 0, F::WALL_NORTH | F::WALL_EAST),
                (0, 1, F::WALL_SOUTH),
                (1, 0, F::WALL_WEST),
            ],
            2 => vec![
                (0, 0, F::WALL_SOUTH | F::WALL_EAST),
                (1, 0, F::WALL_WEST),
                (0, -1, F::WALL_NORTH),
            ],
            _ => vec![
                (0, 0, F::WALL_SOUTH | F::WALL_WEST),
                (0, -1, F::WALL_NORTH),
                (-1, 0, F::WALL_EAST),
            ],
        },
        _ => Vec::new(),
    }
}
