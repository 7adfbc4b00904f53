/// Fixed-size ring keeping the most recent `capacity` entries.
///
/// Used for the recent-opcode history attached to framing errors and for the
/// game message log.
#[derive(Debug, Clone)]
pub struct CircularBuffer<T> {
    slots: Vec<Option<T>>,
    head: usize,
    filled: usize,
}

impl<T> CircularBuffer<T> {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "capacity must be > 0");
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);
        CircularBuffer {
            slots,
            head: 0,
            filled: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Stores `item`, evicting the oldest entry once full.
    pub fn push(&mut self, item: T) {
        self.slots[self.head] = Some(item);
        self.head = (self.head + 1) % self.capacity();
        self.filled = (self.filled + 1).min(self.capacity());
    }

    /// Entry `age` pushes ago; 0 is the newest.
    pub fn get(&self, age: usize) -> Option<&T> {
        if age >= self.filled {
            return None;
        }
        let cap = self.capacity();
        self.slots[(self.head + cap - age - 1) % cap].as_ref()
    }

    pub fn clear(&mut self) {
        self.slots.iter_mut().for_each(|slot| *slot = None);
        self.head = 0;
        self.filled = 0;
    }

    pub fn len(&self) -> usize {
        self.filled
    }

    pub fn is_empty(&self) -> bool {
        self.filled == 0
    }

    /// Newest first.
    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        (0..self.filled).filter_map(move |age| self.get(age))
    }
}

impl<T: Clone> CircularBuffer<T> {
    /// Oldest first, the order errors print history in.
    pub fn to_vec_oldest_first(&self) -> Vec<T> {
        let mut out: Vec<T> = self.iter().cloned().collect();
        out.reverse();
        out
    }
}
