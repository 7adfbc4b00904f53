use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpotAnimType {
    pub seq: i32,
}

impl Default for SpotAnimType {
    fn default() -> Self {
        SpotAnimType { seq: -1 }
    }
}
