//! Config type tables shared by the decoder and the simulator.
//!
//! The archive unpacker lives outside this crate; it hands the tables over as
//! JSON (or builds them in code) and they are read-only afterwards.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

mod loc;
mod npc;
mod obj;
mod seq;
mod spotanim;

pub use loc::{LocLayer, LocShape, LocType};
pub use npc::NpcType;
pub use obj::ObjType;
pub use seq::SeqType;
pub use spotanim::SpotAnimType;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TypeTables {
    pub seqs: HashMap<u16, SeqType>,
    pub npcs: HashMap<u16, NpcType>,
    pub locs: HashMap<u16, LocType>,
    pub objs: HashMap<u16, ObjType>,
    pub spotanims: HashMap<u16, SpotAnimType>,
}

/// Converts a signed wire id (`-1` = none) into a table key.
fn key(id: i32) -> Option<u16> {
    u16::try_from(id).ok()
}

impl TypeTables {
    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    pub fn seq(&self, id: i32) -> Option<&SeqType> {
        key(id).and_then(|id| self.seqs.get(&id))
    }

    pub fn npc(&self, id: i32) -> Option<&NpcType> {
        key(id).and_then(|id| self.npcs.get(&id))
    }

    pub fn loc(&self, id: i32) -> Option<&LocType> {
        key(id).and_then(|id| self.locs.get(&id))
    }

    pub fn spotanim(&self, id: i32) -> Option<&SpotAnimType> {
        key(id).and_then(|id| self.spotanims.get(&id))
    }

    /// Unknown objects are worth nothing and never stack.
    pub fn obj(&self, id: u16) -> ObjType {
        self.objs.get(&id).cloned().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_sections_default_to_empty() {
        let tables = TypeTables::from_json(r#"{ "seqs": { "7": { "frame_delays": [2, 3] } } }"#)
            .unwrap();
        let seq = tables.seq(7).unwrap();
        assert_eq!(seq.frame_delays, vec![2, 3]);
        assert_eq!(seq.replay_offset, -1);
        assert!(tables.npcs.is_empty());
        assert!(tables.seq(-1).is_none());
    }

    #[test]
    fn unknown_obj_is_worthless() {
        let tables = TypeTables::default();
        let obj = tables.obj(995);
        assert_eq!(obj.cost, 0);
        assert!(!obj.stackable);
    }
}
