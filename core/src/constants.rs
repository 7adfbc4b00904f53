//! Constants module - region geometry, table capacities and tick timing

// =============================================================================
// Region geometry
// =============================================================================

/// Fine world units per tile.
pub const TILE_UNITS: i32 = 128;
/// Half a tile; entity centres sit at `tile * TILE_UNITS + size * HALF_TILE`.
pub const HALF_TILE: i32 = 64;

/// Tiles along each side of the loaded region.
pub const REGION_SIZE: i32 = 104;
/// Number of levels (floors) in a region.
pub const LEVELS: usize = 4;
/// Side length of a zone, the addressing unit of scenery deltas.
pub const ZONE_SIZE: i32 = 8;
/// Zones between the region's south-west corner and the zone the region is
/// centred on.
pub const REGION_CENTRE_OFFSET: i32 = 6;

/// Tiles at the edge of the region that scenery changes never touch.
pub const SCENERY_MARGIN: i32 = 1;

/// Fine-unit bounds an entity may occupy before being snapped back to its route.
pub const ENTITY_MIN_FINE: i32 = TILE_UNITS;
pub const ENTITY_MAX_FINE: i32 = (REGION_SIZE - 1) * TILE_UNITS;
/// Tighter bounds applied to the local player.
pub const LOCAL_MIN_FINE: i32 = 12 * TILE_UNITS;
pub const LOCAL_MAX_FINE: i32 = (REGION_SIZE - 12) * TILE_UNITS;

// =============================================================================
// Entity tables
// =============================================================================

pub const MAX_PLAYERS: usize = 2048;
/// Slot reserved for the local player inside the player table.
pub const LOCAL_PLAYER_INDEX: usize = 2047;
pub const MAX_NPCS: usize = 8192;
/// The tracked count is sent in 8 bits.
pub const MAX_TRACKED: usize = 255;

/// Index value that terminates the new-player list.
pub const NEW_PLAYER_SENTINEL: u32 = 2047;
/// Index value that terminates the new-NPC list.
pub const NEW_NPC_SENTINEL: u32 = 8191;

/// Face-entity ids at or above this value refer to players.
pub const PLAYER_TARGET_BASE: i32 = 32768;

/// Pending route tiles an entity remembers.
pub const ROUTE_CAPACITY: usize = 25;
/// Simultaneous hit-splats per entity.
pub const HIT_SLOTS: usize = 4;
/// Ticks a hit-splat stays visible.
pub const HIT_DURATION: i32 = 70;
/// Ticks a health bar stays visible after a hit.
pub const COMBAT_DURATION: i32 = 400;
/// Ticks overhead chat stays visible.
pub const CHAT_DURATION: i32 = 150;

// =============================================================================
// Pathfinding
// =============================================================================

/// Waypoints in one move request.
pub const MAX_WAYPOINTS: usize = 25;
/// Slots in the breadth-first queue.
pub const BFS_QUEUE_CAPACITY: usize = 4000;
/// Search radius around the destination when falling back to the nearest tile.
pub const NEAREST_RADIUS: i32 = 10;
/// Tiles costing this much or more are never picked as a fallback.
pub const NEAREST_MAX_COST: i32 = 100;

// =============================================================================
// Session
// =============================================================================

/// Client ticks per second.
pub const TICKS_PER_SECOND: u32 = 50;
/// Milliseconds per client tick.
pub const TICK_MILLIS: u64 = 1000 / TICKS_PER_SECOND as u64;
/// Ticks without server traffic before the connection is presumed dead.
pub const RECONNECT_IDLE_TICKS: u32 = 750;
/// Frames dispatched per `process_incoming` call.
pub const MAX_FRAMES_PER_POLL: usize = 100;
/// Opcodes remembered for error reports.
pub const OPCODE_HISTORY: usize = 3;
/// Game messages remembered for the chat box.
pub const GAME_MESSAGE_HISTORY: usize = 100;
/// Entries a single object stack may hold.
pub const OBJ_STACK_CAPACITY: usize = 128;
/// Added to every seed word to derive the inbound cipher.
pub const DECODER_SEED_OFFSET: u32 = 50;

// =============================================================================
// Yaw
// =============================================================================

/// Full turn in yaw units.
pub const YAW_UNITS: i32 = 2048;
pub const YAW_MASK: i32 = YAW_UNITS - 1;
/// Yaw units turned per tick.
pub const TURN_SPEED: i32 = 32;
/// Radians to yaw units.
pub const RADIANS_TO_YAW: f64 = 325.949;
