/// Fixed capacity circular buffer of samples forming one symbol's sliding window.
///
/// Slots start at zero, so [`RingBuffer::add`] returns `0.0` as the victim until the buffer has
/// been filled once.
#[derive(Debug, Clone, PartialEq)]
pub struct RingBuffer {
    slots: Vec<f64>,
    /// Index of the oldest slot, ie/ the next slot to be overwritten.
    head: usize,
    len: usize,
}

impl RingBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: vec![0.0; capacity.max(1)],
            head: 0,
            len: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of values inserted so far, capped at capacity.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_full(&self) -> bool {
        self.len == self.capacity()
    }

    /// Overwrite the oldest slot, returning the evicted value.
    pub fn add(&mut self, value: f64) -> f64 {
        let victim = std::mem::replace(&mut self.slots[self.head], value);
        self.head = (self.head + 1) % self.slots.len();
        self.len = (self.len + 1).min(self.slots.len());
        victim
    }

    /// Every slot in insertion order, oldest first. Always `capacity` values long.
    pub fn get_all(&self) -> Vec<f64> {
        let (newer, older) = self.slots.split_at(self.head);
        older.iter().chain(newer).copied().collect()
    }
}
