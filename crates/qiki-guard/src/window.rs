//! Fixed-capacity history of approved actions
//!
//! A ring buffer indexed by arrival order. Once full, each push overwrites
//! the oldest slot, so memory stays bounded by the capacity.

/// Sliding window of the most recently approved primary actions
///
/// An entry of `None` records an approved proposal that carried no commands.
#[derive(Debug, Clone)]
pub struct FlapWindow {
    slots: Vec<Option<String>>,
    capacity: usize,
    /// Slot the next push writes once the buffer is full
    head: usize,
}

impl FlapWindow {
    /// A window holding at most `capacity` entries. Zero disables recording.
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            capacity,
            head: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Record an approval, evicting the oldest entry when full
    pub fn push(&mut self, action: Option<String>) {
        if self.capacity == 0 {
            return;
        }
        if self.slots.len() < self.capacity {
            self.slots.push(action);
        } else {
            self.slots[self.head] = action;
            self.head = (self.head + 1) % self.capacity;
        }
    }

    /// Most recent entry, `None` when the window is empty
    pub fn last(&self) -> Option<Option<&str>> {
        if self.slots.is_empty() {
            return None;
        }
        let idx = if self.slots.len() < self.capacity {
            self.slots.len() - 1
        } else {
            (self.head + self.capacity - 1) % self.capacity
        };
        Some(self.slots[idx].as_deref())
    }

    /// Occurrences of `action` currently in the window
    pub fn count(&self, action: &str) -> usize {
        self.slots
            .iter()
            .filter(|slot| slot.as_deref() == Some(action))
            .count()
    }

    /// Entries from oldest to newest
    pub fn iter(&self) -> impl Iterator<Item = Option<&str>> + '_ {
        let (newer, older) = if self.slots.len() < self.capacity {
            (&self.slots[..], &self.slots[..0])
        } else {
            (&self.slots[..self.head], &self.slots[self.head..])
        };
        older.iter().chain(newer.iter()).map(|slot| slot.as_deref())
    }

    /// Whether approving `action` now would repeat it a third time in a row
    ///
    /// Flapping requires the action to be the most recent entry and to occur
    /// at least twice in the window already.
    pub fn is_flapping(&self, action: Option<&str>) -> bool {
        let Some(action) = action else {
            return false;
        };
        self.last() == Some(Some(action)) && self.count(action) >= 2
    }
}
