//! Id-indexed tables and the process-wide pool that recycles their
//! backing storage between runs.
//!
//! Functions, class definitions, resolved classes, and constants are
//! referred to by small integer ids assigned once per name and stable
//! across runs. Each environment owns its own table per kind, indexed
//! by those ids and grown by copy when an id lands past the end. On
//! teardown the backing vector is cleared and parked on a free list so
//! the next environment starts with a warm allocation.

use parking_lot::Mutex;

/// A sparse, growable id-to-slot table.
pub struct IdTable<T> {
    slots: Vec<Option<T>>,
}

impl<T> IdTable<T> {
    pub fn new() -> IdTable<T> {
        IdTable { slots: Vec::new() }
    }

    fn from_storage(slots: Vec<Option<T>>) -> IdTable<T> {
        IdTable { slots }
    }

    pub fn get(&self, id: u32) -> Option<&T> {
        self.slots.get(id as usize).and_then(Option::as_ref)
    }

    pub fn set(&mut self, id: u32, value: T) {
        let id = id as usize;
        if id >= self.slots.len() {
            // Grow by copy, with headroom so runs of fresh ids do not
            // reallocate per insert.
            let new_len = (id + 1).next_power_of_two().max(16);
            self.slots.resize_with(new_len, || None);
        }
        self.slots[id] = Some(value);
    }

    pub fn take(&mut self, id: u32) -> Option<T> {
        self.slots.get_mut(id as usize).and_then(Option::take)
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Occupied `(id, value)` pairs in id order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &T)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(id, slot)| slot.as_ref().map(|v| (id as u32, v)))
    }
}

impl<T> Default for IdTable<T> {
    fn default() -> Self {
        IdTable::new()
    }
}

/// Free list of table storage, shared process-wide.
///
/// `checkout` hands back a cleared table with whatever capacity its
/// previous run grew; `park` returns one. A parked table is cleared
/// immediately, never lazily, so no value outlives its environment.
pub struct TablePool<T> {
    free: Mutex<Vec<Vec<Option<T>>>>,
}

impl<T> TablePool<T> {
    pub fn new() -> TablePool<T> {
        TablePool {
            free: Mutex::new(Vec::new()),
        }
    }

    pub fn checkout(&self) -> IdTable<T> {
        match self.free.lock().pop() {
            Some(slots) => IdTable::from_storage(slots),
            None => IdTable::new(),
        }
    }

    pub fn park(&self, mut table: IdTable<T>) {
        for slot in &mut table.slots {
            *slot = None;
        }
        self.free.lock().push(table.slots);
    }

    #[cfg(test)]
    fn pooled(&self) -> usize {
        self.free.lock().len()
    }
}

impl<T> Default for TablePool<T> {
    fn default() -> Self {
        TablePool::new()
    }
}
