//! Insertion-ordered slot list with generation-checked handles.
//!
//! Removing an entry frees its slot immediately and bumps the slot's
//! generation, so a stale [`Handle`] never resolves to whatever reuses it.
//! Traversal order is insertion order regardless of slot reuse.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle {
    index: u32,
    generation: u32,
}

#[derive(Debug, Clone)]
struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

#[derive(Debug, Clone)]
pub struct EffectList<T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    /// Live slot indices, oldest first. May briefly hold freed indices until
    /// the next sweep compacts it.
    order: Vec<u32>,
    len: usize,
}

impl<T> Default for EffectList<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> EffectList<T> {
    pub fn new() -> Self {
        EffectList {
            slots: Vec::new(),
            free: Vec::new(),
            order: Vec::new(),
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn push(&mut self, value: T) -> Handle {
        let index = match self.free.pop() {
            Some(index) => {
                self.slots[index as usize].value = Some(value);
                index
            }
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    value: Some(value),
                });
                (self.slots.len() - 1) as u32
            }
        };
        self.order.push(index);
        self.len += 1;
        Handle {
            index,
            generation: self.slots[index as usize].generation,
        }
    }

    pub fn get(&self, handle: Handle) -> Option<&T> {
        self.slots
            .get(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.value.as_ref())
    }

    pub fn get_mut(&mut self, handle: Handle) -> Option<&mut T> {
        self.slots
            .get_mut(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.value.as_mut())
    }

    pub fn remove(&mut self, handle: Handle) -> Option<T> {
        let slot = self.slots.get_mut(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        let value = slot.value.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(handle.index);
        self.len -= 1;
        // Drop from the traversal order now so a reused slot isn't visited twice.
        self.order.retain(|&i| i != handle.index);
        Some(value)
    }

    pub fn clear(&mut self) {
        let handles: Vec<Handle> = self.iter().map(|(h, _)| h).collect();
        for handle in handles {
            self.remove(handle);
        }
    }

    fn handle_at(&self, index: u32) -> Handle {
        Handle {
            index,
            generation: self.slots[index as usize].generation,
        }
    }

    /// Live entries, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = (Handle, &T)> + '_ {
        self.order.iter().filter_map(move |&index| {
            self.slots[index as usize]
                .value
                .as_ref()
                .map(|value| (self.handle_at(index), value))
        })
    }

    pub fn handles(&self) -> Vec<Handle> {
        self.iter().map(|(handle, _)| handle).collect()
    }

    /// Visits every entry oldest first; entries for which `keep` returns
    /// false are unlinked. Later entries are still visited after an earlier
    /// one is removed.
    pub fn sweep(&mut self, mut keep: impl FnMut(&mut T) -> bool) {
        let mut kept = Vec::with_capacity(self.order.len());
        for index in std::mem::take(&mut self.order) {
            let slot = &mut self.slots[index as usize];
            let Some(value) = slot.value.as_mut() else {
                continue;
            };
            if keep(value) {
                kept.push(index);
            } else {
                slot.value = None;
                slot.generation = slot.generation.wrapping_add(1);
                self.free.push(index);
                self.len -= 1;
            }
        }
        self.order = kept;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stale_handle_does_not_resolve() {
        let mut list = EffectList::new();
        let a = list.push("a");
        assert_eq!(list.remove(a), Some("a"));
        let b = list.push("b");
        assert_eq!(list.get(a), None);
        assert_eq!(list.get(b), Some(&"b"));
        assert_eq!(list.remove(a), None);
    }

    #[test]
    fn sweep_keeps_order_and_removes() {
        let mut list = EffectList::new();
        for i in 0..6 {
            list.push(i);
        }
        let mut seen = Vec::new();
        list.sweep(|v| {
            seen.push(*v);
            *v % 2 == 0
        });
        assert_eq!(seen, vec![0, 1, 2, 3, 4, 5]);
        assert_eq!(list.iter().map(|(_, v)| *v).collect::<Vec<_>>(), vec![0, 2, 4]);
        assert_eq!(list.len(), 3);
    }

    #[test]
    fn reused_slots_keep_insertion_order() {
        let mut list = EffectList::new();
        let a = list.push(1);
        list.push(2);
        list.remove(a);
        list.push(3);
        assert_eq!(list.iter().map(|(_, v)| *v).collect::<Vec<_>>(), vec![2, 3]);
    }

    #[test]
    fn clear_empties() {
        let mut list = EffectList::new();
        let h = list.push(1);
        list.push(2);
        list.clear();
        assert!(list.is_empty());
        assert_eq!(list.get(h), None);
    }
}
