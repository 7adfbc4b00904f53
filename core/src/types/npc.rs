use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NpcType {
    pub name: String,
    /// Footprint side length in tiles.
    pub size: i32,
    pub stand_seq: i32,
    pub walk_seq: i32,
    pub turn_around_seq: i32,
    pub turn_left_seq: i32,
    pub turn_right_seq: i32,
}

impl Default for NpcType {
    fn default() -> Self {
        NpcType {
            name: String::new(),
            size: 1,
            stand_seq: -1,
            walk_seq: -1,
            turn_around_seq: -1,
            turn_left_seq: -1,
            turn_right_seq: -1,
        }
    }
}
