use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObjType {
    pub name: String,
    pub cost: i32,
    pub stackable: bool,
}

impl ObjType {
    /// Ordering key inside an object stack. Stackables are weighed by count.
    pub fn stack_value(&self, count: i32) -> i64 {
        let cost = self.cost as i64;
        if self.stackable {
            cost * (count as i64 + 1)
        } else {
            cost
        }
    }
}
