//! Ground object stacks.

use std::collections::BTreeMap;

use crate::constants::{OBJ_STACK_CAPACITY, REGION_SIZE, ZONE_SIZE};
use crate::types::TypeTables;

/// Only the low 15 bits of a wire object id name the type.
const OBJ_ID_MASK: u16 = 0x7fff;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjEntry {
    pub id: u16,
    pub count: i32,
}

/// Up to three distinct object types shown for a stack, most valuable first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackView {
    pub top: ObjEntry,
    pub middle: Option<ObjEntry>,
    pub bottom: Option<ObjEntry>,
}

/// Stacks keyed by `(level, x, z)`.
#[derive(Debug, Clone, Default)]
pub struct ObjStacks {
    stacks: BTreeMap<(usize, i32, i32), Vec<ObjEntry>>,
}

impl ObjStacks {
    pub fn get(&self, level: usize, x: i32, z: i32) -> &[ObjEntry] {
        self.stacks
            .get(&(level, x, z))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn tile_count(&self) -> usize {
        self.stacks.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&(usize, i32, i32), &Vec<ObjEntry>)> {
        self.stacks.iter()
    }

    /// Adds an entry. Returns false if the stack is full.
    pub fn add(&mut self, types: &TypeTables, level: usize, x: i32, z: i32, id: u16, count: i32) -> bool {
        let id = id & OBJ_ID_MASK;
        let stack = self.stacks.entry((level, x, z)).or_default();
        if stack.len() >= OBJ_STACK_CAPACITY {
            log::warn!("obj stack at ({x}, {z}) level {level} is full; dropping obj {id}");
            return false;
        }
        stack.push(ObjEntry { id, count });
        self.sort(types, level, x, z);
        true
    }

    /// Removes the first entry of type `id`.
    pub fn remove(&mut self, types: &TypeTables, level: usize, x: i32, z: i32, id: u16) -> bool {
        let id = id & OBJ_ID_MASK;
        let Some(stack) = self.stacks.get_mut(&(level, x, z)) else {
            return false;
        };
        let Some(pos) = stack.iter().position(|e| e.id == id) else {
            return false;
        };
        stack.remove(pos);
        if stack.is_empty() {
            self.stacks.remove(&(level, x, z));
        } else {
            self.sort(types, level, x, z);
        }
        true
    }

    /// Changes the count of the first entry matching both `id` and `old`.
    #[allow(clippy::too_many_arguments)]
    pub fn recount(
        &mut self,
        types: &TypeTables,
        level: usize,
        x: i32,
        z: i32,
        id: u16,
        old: i32,
        new: i32,
    ) -> bool {
        let id = id & OBJ_ID_MASK;
        let Some(entry) = self
            .stacks
            .get_mut(&(level, x, z))
            .and_then(|stack| stack.iter_mut().find(|e| e.id == id && e.count == old))
        else {
            return false;
        };
        entry.count = new;
        self.sort(types, level, x, z);
        true
    }

    /// Moves the most valuable entry to the front. Ties keep the earlier one.
    fn sort(&mut self, types: &TypeTables, level: usize, x: i32, z: i32) {
        let Some(stack) = self.stacks.get_mut(&(level, x, z)) else {
            return;
        };
        let mut best: Option<(usize, i64)> = None;
        for (i, entry) in stack.iter().enumerate() {
            let value = types.obj(entry.id).stack_value(entry.count);
            if best.is_none_or(|(_, top)| value > top) {
                best = Some((i, value));
            }
        }
        if let Some((i, _)) = best {
            let top = stack.remove(i);
            stack.insert(0, top);
        }
    }

    pub fn view(&self, level: usize, x: i32, z: i32) -> Option<StackView> {
        let stack = self.stacks.get(&(level, x, z))?;
        let top = *stack.first()?;
        let middle = stack.iter().find(|e| e.id != top.id).copied();
        let bottom = middle.and_then(|m| {
            stack
                .iter()
                .find(|e| e.id != top.id && e.id != m.id)
                .copied()
        });
        Some(StackView { top, middle, bottom })
    }

    /// Drops every stack in the 8x8 zone whose south-west tile is `(x, z)`.
    pub fn clear_zone(&mut self, level: usize, x: i32, z: i32) {
        self.stacks.retain(|&(l, sx, sz), _| {
            !(l == level && (x..x + ZONE_SIZE).contains(&sx) && (z..z + ZONE_SIZE).contains(&sz))
        });
    }

    /// Re-keys every stack after the region origin moved by `(dx, dz)` tiles.
    pub fn shift(&mut self, dx: i32, dz: i32) {
        let old = std::mem::take(&mut self.stacks);
        for ((level, x, z), stack) in old {
            let (nx, nz) = (x - dx, z - dz);
            if (0..REGION_SIZE).contains(&nx) && (0..REGION_SIZE).contains(&nz) {
                self.stacks.insert((level, nx, nz), stack);
            }
        }
    }

    pub fn clear(&mut self) {
        self.stacks.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ObjType;

    fn tables() -> TypeTables {
        let mut t = TypeTables::default();
        t.objs.insert(1, ObjType { cost: 10, ..ObjType::default() });
        t.objs.insert(2, ObjType { cost: 50, ..ObjType::default() });
        t.objs.insert(995, ObjType { cost: 1, stackable: true, ..ObjType::default() });
        t
    }

    #[test]
    fn most_valuable_moves_to_front() {
        let t = tables();
        let mut objs = ObjStacks::default();
        objs.add(&t, 0, 5, 5, 1, 1);
        objs.add(&t, 0, 5, 5, 2, 1);
        objs.add(&t, 0, 5, 5, 995, 10);
        let ids: Vec<u16> = objs.get(0, 5, 5).iter().map(|e| e.id).collect();
        assert_eq!(ids[0], 2);

        // 1 * (100 + 1) beats 50.
        objs.recount(&t, 0, 5, 5, 995, 10, 100);
        assert_eq!(objs.get(0, 5, 5)[0].id, 995);

        let view = objs.view(0, 5, 5).unwrap();
        assert_eq!(view.top.id, 995);
        assert!(view.middle.is_some() && view.bottom.is_some());
    }

    #[test]
    fn high_bit_id_is_stored_masked() {
        let t = tables();
        let mut objs = ObjStacks::default();
        assert!(objs.add(&t, 0, 7, 7, 0x8002, 1));
        assert_eq!(objs.get(0, 7, 7)[0].id, 2);
        assert!(objs.remove(&t, 0, 7, 7, 0x8002));
        assert_eq!(objs.tile_count(), 0);
    }

    #[test]
    fn remove_masks_id_and_drops_empty_tile() {
        let t = tables();
        let mut objs = ObjStacks::default();
        objs.add(&t, 0, 5, 5, 1, 1);
        assert!(objs.remove(&t, 0, 5, 5, 0x8001));
        assert!(objs.get(0, 5, 5).is_empty());
        assert_eq!(objs.tile_count(), 0);
        assert!(!objs.remove(&t, 0, 5, 5, 1));
    }

    #[test]
    fn recount_requires_matching_count() {
        let t = tables();
        let mut objs = ObjStacks::default();
        objs.add(&t, 0, 5, 5, 995, 3);
        assert!(!objs.recount(&t, 0, 5, 5, 995, 4, 9));
        assert!(objs.recount(&t, 0, 5, 5, 995, 3, 9));
        assert_eq!(objs.get(0, 5, 5)[0].count, 9);
    }

    #[test]
    fn full_stack_rejects_more() {
        let t = tables();
        let mut objs = ObjStacks::default();
        for _ in 0..OBJ_STACK_CAPACITY {
            assert!(objs.add(&t, 0, 1, 1, 1, 1));
        }
        assert!(!objs.add(&t, 0, 1, 1, 1, 1));
    }

    #[test]
    fn shift_drops_out_of_region() {
        let t = tables();
        let mut objs = ObjStacks::default();
        objs.add(&t, 0, 50, 50, 1, 1);
        objs.add(&t, 0, 2, 2, 1, 1);
        objs.shift(8, 0);
        assert_eq!(objs.get(0, 42, 50).len(), 1);
        assert_eq!(objs.tile_count(), 1);
    }

    #[test]
    fn clear_zone_only_touches_that_zone() {
        let t = tables();
        let mut objs = ObjStacks::default();
        objs.add(&t, 0, 16, 16, 1, 1);
        objs.add(&t, 0, 23, 23, 1, 1);
        objs.add(&t, 0, 24, 16, 1, 1);
        objs.add(&t, 1, 16, 16, 1, 1);
        objs.clear_zone(0, 16, 16);
        assert_eq!(objs.tile_count(), 2);
        assert_eq!(objs.get(0, 24, 16).len(), 1);
    }
}
