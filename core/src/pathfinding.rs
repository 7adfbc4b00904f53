//! Breadth-first route search over a collision grid
//!
//! Routes are searched in region-local tiles. The search records, per tile,
//! the direction it was entered from and its step cost; the route is then
//! recovered by walking those directions back from the destination and keeping
//! only the tiles where the direction changes.

use crate::collision::{CollisionFlags, CollisionGrid};
use crate::constants::{
    BFS_QUEUE_CAPACITY, MAX_WAYPOINTS, NEAREST_MAX_COST, NEAREST_RADIUS,
};
use crate::error::RouteError;
use crate::types::LocShape;

/// Direction bits stored per tile: which way to step to get back toward the
/// source. 1 = north, 2 = east, 4 = south, 8 = west.
const FROM_NORTH: u8 = 1;
const FROM_EAST: u8 = 2;
const FROM_SOUTH: u8 = 4;
const FROM_WEST: u8 = 8;
const SOURCE_MARK: u8 = 99;
const UNREACHED: i32 = i32::MAX;

/// What counts as arriving.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteTarget {
    /// Stand on the destination tile.
    Tile,
    /// Stand beside a wall or wall decoration placed on the destination tile.
    Boundary { shape: LocShape, rotation: u8 },
    /// Stand on or next to a rectangular footprint. `blocked_sides` uses the
    /// rotated forceapproach bits (0x1 north, 0x2 east, 0x4 south, 0x8 west).
    Footprint {
        width: i32,
        length: i32,
        blocked_sides: u8,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteRequest {
    pub src_x: i32,
    pub src_z: i32,
    pub dest_x: i32,
    pub dest_z: i32,
    pub target: RouteTarget,
    /// Fall back to the closest reachable tile when the target can't be reached.
    pub try_nearest: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    /// Turn points from the source side to the destination side.
    pub waypoints: Vec<(i32, i32)>,
    /// Set when the route ends at a fallback tile instead of the target.
    pub approximate: bool,
}

/// Search buffers sized for one grid and reused between requests.
pub struct PathFinder {
    size_x: i32,
    size_z: i32,
    /// Arrived-from direction per tile (0 = unvisited)
    directions: Vec<u8>,
    /// Steps from the source per tile
    costs: Vec<i32>,
    /// Circular BFS queue
    queue: Vec<(i32, i32)>,
}

impl PathFinder {
    pub fn new(size_x: i32, size_z: i32) -> Self {
        let tiles = (size_x * size_z) as usize;
        Self {
            size_x,
            size_z,
            directions: vec![0; tiles],
            costs: vec![UNREACHED; tiles],
            queue: vec![(0, 0); BFS_QUEUE_CAPACITY],
        }
    }

    fn reset(&mut self) {
        self.directions.iter_mut().for_each(|d| *d = 0);
        self.costs.iter_mut().for_each(|c| *c = UNREACHED);
    }

    fn index(&self, x: i32, z: i32) -> usize {
        (x * self.size_z + z) as usize
    }

    fn direction(&self, x: i32, z: i32) -> u8 {
        self.directions[self.index(x, z)]
    }

    fn cost(&self, x: i32, z: i32) -> i32 {
        self.costs[self.index(x, z)]
    }

    /// Finds a route for `request` over `grid`.
    ///
    /// The result holds at most [`MAX_WAYPOINTS`] turn points. A straight
    /// unobstructed walk produces only the destination.
    pub fn find(&mut self, grid: &CollisionGrid, request: &RouteRequest) -> Result<Route, RouteError> {
        if grid.size_x() != self.size_x || grid.size_z() != self.size_z {
            *self = PathFinder::new(grid.size_x(), grid.size_z());
        }
        for (x, z) in [
            (request.src_x, request.src_z),
            (request.dest_x, request.dest_z),
        ] {
            if !grid.in_bounds(x, z) {
                return Err(RouteError::OutOfRegion { x, z });
            }
        }

        self.reset();
        let arrived = self.search(grid, request)?;

        let (end_x, end_z, approximate) = match arrived {
            Some((x, z)) => (x, z, false),
            None if request.try_nearest => {
                let (x, z) = self.nearest(request).ok_or(RouteError::NoRoute)?;
                (x, z, true)
            }
            None => return Err(RouteError::NoRoute),
        };

        Ok(Route {
            waypoints: self.backtrack(request, end_x, end_z),
            approximate,
        })
    }

    /// Runs the flood fill and returns the tile the target was reached from.
    fn search(&mut self, grid: &CollisionGrid, request: &RouteRequest) -> Result<Option<(i32, i32)>, RouteError> {
        let (src_x, src_z) = (request.src_x, request.src_z);
        let src = self.index(src_x, src_z);
        self.directions[src] = SOURCE_MARK;
        self.costs[src] = 0;

        let mut head = 0usize;
        let mut tail = 0usize;
        let mut pending = 0usize;
        self.queue[tail] = (src_x, src_z);
        tail = (tail + 1) % BFS_QUEUE_CAPACITY;
        pending += 1;

        let max_x = self.size_x - 1;
        let max_z = self.size_z - 1;

        while pending > 0 {
            let (x, z) = self.queue[head];
            head = (head + 1) % BFS_QUEUE_CAPACITY;
            pending -= 1;

            if reached(grid, request, x, z) {
                return Ok(Some((x, z)));
            }

            let next_cost = self.cost(x, z) + 1;
            let clear = |tx: i32, tz: i32, mask: CollisionFlags| grid.is_clear(tx, tz, mask);

            // West, east, south, north, then the diagonals.
            let mut candidates: [(bool, i32, i32, u8); 8] = [(false, 0, 0, 0); 8];
            candidates[0] = (
                x > 0 && clear(x - 1, z, CollisionFlags::BLOCK_WEST),
                x - 1,
                z,
                FROM_EAST,
            );
            candidates[1] = (
                x < max_x && clear(x + 1, z, CollisionFlags::BLOCK_EAST),
                x + 1,
                z,
                FROM_WEST,
            );
            candidates[2] = (
                z > 0 && clear(x, z - 1, CollisionFlags::BLOCK_SOUTH),
                x,
                z - 1,
                FROM_NORTH,
            );
            candidates[3] = (
                z < max_z && clear(x, z + 1, CollisionFlags::BLOCK_NORTH),
                x,
                z + 1,
                FROM_SOUTH,
            );
            candidates[4] = (
                x > 0
                    && z > 0
                    && clear(x - 1, z - 1, CollisionFlags::BLOCK_SOUTH_WEST)
                    && clear(x - 1, z, CollisionFlags::BLOCK_WEST)
                    && clear(x, z - 1, CollisionFlags::BLOCK_SOUTH),
                x - 1,
                z - 1,
                FROM_NORTH | FROM_EAST,
            );
            candidates[5] = (
                x < max_x
                    && z > 0
                    && clear(x + 1, z - 1, CollisionFlags::BLOCK_SOUTH_EAST)
                    && clear(x + 1, z, CollisionFlags::BLOCK_EAST)
                    && clear(x, z - 1, CollisionFlags::BLOCK_SOUTH),
                x + 1,
                z - 1,
                FROM_NORTH | FROM_WEST,
            );
            candidates[6] = (
                x > 0
                    && z < max_z
                    && clear(x - 1, z + 1, CollisionFlags::BLOCK_NORTH_WEST)
                    && clear(x - 1, z, CollisionFlags::BLOCK_WEST)
                    && clear(x, z + 1, CollisionFlags::BLOCK_NORTH),
                x - 1,
                z + 1,
                FROM_SOUTH | FROM_EAST,
            );
            candidates[7] = (
                x < max_x
                    && z < max_z
                    && clear(x + 1, z + 1, CollisionFlags::BLOCK_NORTH_EAST)
                    && clear(x + 1, z, CollisionFlags::BLOCK_EAST)
                    && clear(x, z + 1, CollisionFlags::BLOCK_NORTH),
                x + 1,
                z + 1,
                FROM_SOUTH | FROM_WEST,
            );

            for (open, nx, nz, dir) in candidates {
                if !open || self.direction(nx, nz) != 0 {
                    continue;
                }
                if pending == BFS_QUEUE_CAPACITY {
                    return Err(RouteError::QueueOverflow);
                }
                let index = self.index(nx, nz);
                self.directions[index] = dir;
                self.costs[index] = next_cost;
                self.queue[tail] = (nx, nz);
                tail = (tail + 1) % BFS_QUEUE_CAPACITY;
                pending += 1;
            }
        }

        Ok(None)
    }

    /// Closest visited tile to the target footprint, searching outward ring
    /// by ring. Ties break on step cost, then x, then z.
    fn nearest(&self, request: &RouteRequest) -> Option<(i32, i32)> {
        let (width, length) = match request.target {
            RouteTarget::Footprint { width, length, .. } => (width.max(1), length.max(1)),
            _ => (1, 1),
        };
        let (min_x, min_z) = (request.dest_x, request.dest_z);
        let (max_x, max_z) = (min_x + width - 1, min_z + length - 1);

        let mut best: Option<(i32, i32, i32, i32)> = None;
        for ring in 0..=NEAREST_RADIUS {
            for x in min_x - ring..=max_x + ring {
                for z in min_z - ring..=max_z + ring {
                    let dx = (min_x - x).max(x - max_x).max(0);
                    let dz = (min_z - z).max(z - max_z).max(0);
                    if dx.max(dz) != ring {
                        continue;
                    }
                    if x < 0 || z < 0 || x >= self.size_x || z >= self.size_z {
                        continue;
                    }
                    let cost = self.cost(x, z);
                    if cost >= NEAREST_MAX_COST {
                        continue;
                    }
                    let candidate = (dx * dx + dz * dz, cost, x, z);
                    if best.is_none_or(|b| candidate < b) {
                        best = Some(candidate);
                    }
                }
            }
            // Anything further out is at least (ring + 1)^2 away.
            if let Some((distance, ..)) = best {
                if distance < (ring + 1) * (ring + 1) {
                    break;
                }
            }
        }
        best.map(|(_, _, x, z)| (x, z))
    }

    fn backtrack(&self, request: &RouteRequest, mut x: i32, mut z: i32) -> Vec<(i32, i32)> {
        let mut turns = vec![(x, z)];
        let mut current = self.direction(x, z);
        let mut next = current;
        while x != request.src_x || z != request.src_z {
            if next != current {
                current = next;
                turns.push((x, z));
            }
            if next & FROM_EAST != 0 {
                x += 1;
            } else if next & FROM_WEST != 0 {
                x -= 1;
            }
            if next & FROM_NORTH != 0 {
                z += 1;
            } else if next & FROM_SOUTH != 0 {
                z -= 1;
            }
            next = self.direction(x, z);
        }
        turns.reverse();
        turns.truncate(MAX_WAYPOINTS);
        turns
    }
}

/// Arrival test for the tile currently taken off the queue.
fn reached(grid: &CollisionGrid, request: &RouteRequest, x: i32, z: i32) -> bool {
    let (dx, dz) = (request.dest_x, request.dest_z);
    if x == dx && z == dz {
        return true;
    }
    match request.target {
        RouteTarget::Tile => false,
        RouteTarget::Boundary { shape, rotation } => {
            (shape.is_wall_reach() && reaches_wall(grid, x, z, dx, dz, shape, rotation))
                || (shape.is_wall_decor_reach()
                    && reaches_wall_decoration(grid, x, z, dx, dz, shape, rotation))
        }
        RouteTarget::Footprint {
            width,
            length,
            blocked_sides,
        } => width > 0 && length > 0 && reaches_footprint(grid, x, z, dx, dz, width, length, blocked_sides),
    }
}

/// Whether standing at `(sx, sz)` reaches a wall at `(dx, dz)`.
pub fn reaches_wall(
    grid: &CollisionGrid,
    sx: i32,
    sz: i32,
    dx: i32,
    dz: i32,
    shape: LocShape,
    rotation: u8,
) -> bool {
    use CollisionFlags as F;
    if sx == dx && sz == dz {
        return true;
    }
    let flags = grid.get(sx, sz);
    let open = |mask: F| !flags.intersects(mask);
    let west = sx == dx - 1 && sz == dz;
    let east = sx == dx + 1 && sz == dz;
    let south = sx == dx && sz == dz - 1;
    let north = sx == dx && sz == dz + 1;

    match shape {
        LocShape::WallStraight => match rotation & 3 {
            0 => west || (north && open(F::BLOCK_NORTH)) || (south && open(F::BLOCK_SOUTH)),
            1 => north || (west && open(F::BLOCK_WEST)) || (east && open(F::BLOCK_EAST)),
            2 => east || (north && open(F::BLOCK_NORTH)) || (south && open(F::BLOCK_SOUTH)),
            _ => south || (west && open(F::BLOCK_WEST)) || (east && open(F::BLOCK_EAST)),
        },
        LocShape::WallL => match rotation & 3 {
            0 => {
                west || north
                    || (east && open(F::BLOCK_EAST))
                    || (south && open(F::BLOCK_SOUTH))
            }
            1 => {
                (west && open(F::BLOCK_WEST))
                    || north
                    || east
                    || (south && open(F::BLOCK_SOUTH))
            }
            2 => {
                (west && open(F::BLOCK_WEST))
                    || (north && open(F::BLOCK_NORTH))
                    || east
                    || south
            }
            _ => {
                west || (north && open(F::BLOCK_NORTH))
                    || (east && open(F::BLOCK_EAST))
                    || south
            }
        },
        LocShape::WallDiagonal => {
            (north && open(F::WALL_SOUTH))
                || (south && open(F::WALL_NORTH))
                || (west && open(F::WALL_EAST))
                || (east && open(F::WALL_WEST))
        }
        _ => false,
    }
}

/// Whether standing at `(sx, sz)` reaches a diagonal wall decoration.
pub fn reaches_wall_decoration(
    grid: &CollisionGrid,
    sx: i32,
    sz: i32,
    dx: i32,
    dz: i32,
    shape: LocShape,
    rotation: u8,
) -> bool {
    use CollisionFlags as F;
    if sx == dx && sz == dz {
        return true;
    }
    let flags = grid.get(sx, sz);
    let open = |mask: F| !flags.intersects(mask);
    let west = sx == dx - 1 && sz == dz;
    let east = sx == dx + 1 && sz == dz;
    let south = sx == dx && sz == dz - 1;
    let north = sx == dx && sz == dz + 1;

    match shape {
        LocShape::WallDecorDiagonalOffset | LocShape::WallDecorDiagonalNoOffset => {
            let rotation = if shape == LocShape::WallDecorDiagonalNoOffset {
                (rotation + 2) & 3
            } else {
                rotation & 3
            };
            match rotation {
                0 => (east && open(F::WALL_WEST)) || (south && open(F::WALL_NORTH)),
                1 => (west && open(F::WALL_EAST)) || (south && open(F::WALL_NORTH)),
                2 => (west && open(F::WALL_EAST)) || (north && open(F::WALL_SOUTH)),
                _ => (east && open(F::WALL_WEST)) || (north && open(F::WALL_SOUTH)),
            }
        }
        LocShape::WallDecorDiagonalBoth => {
            (north && open(F::WALL_SOUTH))
                || (south && open(F::WALL_NORTH))
                || (west && open(F::WALL_EAST))
                || (east && open(F::WALL_WEST))
        }
        _ => false,
    }
}

/// Whether standing at `(sx, sz)` reaches a `width` x `length` footprint whose
/// south-west corner is `(dx, dz)`.
#[allow(clippy::too_many_arguments)]
pub fn reaches_footprint(
    grid: &CollisionGrid,
    sx: i32,
    sz: i32,
    dx: i32,
    dz: i32,
    width: i32,
    length: i32,
    blocked_sides: u8,
) -> bool {
    use CollisionFlags as F;
    let max_x = dx + width - 1;
    let max_z = dz + length - 1;
    let along_x = sx >= dx && sx <= max_x;
    let along_z = sz >= dz && sz <= max_z;
    if along_x && along_z {
        return true;
    }
    let flags = grid.get(sx, sz);
    let open = |mask: F| !flags.intersects(mask);

    (sx == dx - 1 && along_z && open(F::WALL_EAST) && blocked_sides & 0x8 == 0)
        || (sx == max_x + 1 && along_z && open(F::WALL_WEST) && blocked_sides & 0x2 == 0)
        || (sz == dz - 1 && along_x && open(F::WALL_NORTH) && blocked_sides & 0x4 == 0)
        || (sz == max_z + 1 && along_x && open(F::WALL_SOUTH) && blocked_sides & 0x1 == 0)
}
