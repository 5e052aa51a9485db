//! The ordered associative array.
//!
//! Entries live in an arena indexed by `i32`, threaded onto two lists at
//! once: per-bucket hash chains for key lookup and one doubly-linked
//! insertion-order list for iteration. Each array also carries an
//! internal cursor over the order list for `reset`/`next`/`each`.

use std::cell::{Ref, RefCell, RefMut};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use rustc_hash::FxHasher;

use crate::string::StrValue;
use crate::value::Value;
use crate::var::Var;

/// Sentinel for "no entry" in arena links.
const NIL: i32 = -1;

const MIN_BUCKETS: usize = 8;

/// A canonicalized array key: either an integer or a byte string that
/// does not look like one. [`Value::to_key`] produces these.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ArrayKey {
    Int(i64),
    Str(StrValue),
}

impl ArrayKey {
    pub fn to_value(&self) -> Value {
        match self {
            ArrayKey::Int(i) => Value::Int(*i),
            ArrayKey::Str(s) => Value::Str(s.clone()),
        }
    }

    fn hash_code(&self) -> u64 {
        let mut hasher = FxHasher::default();
        self.hash(&mut hasher);
        hasher.finish()
    }
}

impl fmt::Debug for ArrayKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArrayKey::Int(i) => write!(f, "{i}"),
            ArrayKey::Str(s) => write!(f, "{s:?}"),
        }
    }
}

impl From<i64> for ArrayKey {
    fn from(i: i64) -> ArrayKey {
        ArrayKey::Int(i)
    }
}

impl From<&str> for ArrayKey {
    fn from(s: &str) -> ArrayKey {
        ArrayKey::Str(StrValue::from_str(s))
    }
}

struct Entry {
    key: ArrayKey,
    value: Value,
    /// Next entry in this bucket's chain.
    next_hash: i32,
    /// Neighbours on the insertion-order list.
    prev: i32,
    next: i32,
}

/// An insertion-ordered hash array with an internal cursor.
pub struct ArrayValue {
    entries: Vec<Entry>,
    free: Vec<i32>,
    buckets: Vec<i32>,
    head: i32,
    tail: i32,
    cursor: i32,
    size: usize,
    /// Key the next bare append will use.
    next_index: i64,
}

impl ArrayValue {
    pub fn new() -> ArrayValue {
        ArrayValue {
            entries: Vec::new(),
            free: Vec::new(),
            buckets: vec![NIL; MIN_BUCKETS],
            head: NIL,
            tail: NIL,
            cursor: NIL,
            size: 0,
            next_index: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Key the next append will receive.
    pub fn next_index(&self) -> i64 {
        self.next_index
    }

    fn bucket_of(&self, key: &ArrayKey) -> usize {
        (key.hash_code() as usize) & (self.buckets.len() - 1)
    }

    fn find(&self, key: &ArrayKey) -> i32 {
        let mut id = self.buckets[self.bucket_of(key)];
        while id != NIL {
            let entry = &self.entries[id as usize];
            if entry.key == *key {
                return id;
            }
            id = entry.next_hash;
        }
        NIL
    }

    pub fn contains_key(&self, key: &ArrayKey) -> bool {
        self.find(key) != NIL
    }

    pub fn get(&self, key: &ArrayKey) -> Option<&Value> {
        let id = self.find(key);
        if id == NIL {
            None
        } else {
            Some(&self.entries[id as usize].value)
        }
    }

    pub fn get_mut(&mut self, key: &ArrayKey) -> Option<&mut Value> {
        let id = self.find(key);
        if id == NIL {
            None
        } else {
            Some(&mut self.entries[id as usize].value)
        }
    }

    /// Inserts or replaces. Integer keys push the append index forward.
    pub fn insert(&mut self, key: ArrayKey, value: Value) {
        let id = self.find(&key);
        if id != NIL {
            let slot = &mut self.entries[id as usize].value;
            // Writing through an aliased entry updates the shared cell.
            if let Value::Ref(var) = slot {
                var.set(value);
            } else {
                *slot = value;
            }
            return;
        }
        if let ArrayKey::Int(i) = key {
            if i >= self.next_index {
                self.next_index = i.saturating_add(1);
            }
        }
        self.push_entry(key, value);
    }

    /// Appends under the next integer index.
    pub fn append(&mut self, value: Value) -> ArrayKey {
        let key = ArrayKey::Int(self.next_index);
        self.next_index += 1;
        self.push_entry(key.clone(), value);
        key
    }

    fn push_entry(&mut self, key: ArrayKey, value: Value) {
        if self.size + 1 > self.buckets.len() * 3 / 4 {
            self.grow();
        }
        let id = match self.free.pop() {
            Some(id) => {
                self.entries[id as usize] = Entry {
                    key,
                    value,
                    next_hash: NIL,
                    prev: NIL,
                    next: NIL,
                };
                id
            }
            None => {
                self.entries.push(Entry {
                    key,
                    value,
                    next_hash: NIL,
                    prev: NIL,
                    next: NIL,
                });
                (self.entries.len() - 1) as i32
            }
        };

        let bucket = self.bucket_of(&self.entries[id as usize].key);
        self.entries[id as usize].next_hash = self.buckets[bucket];
        self.buckets[bucket] = id;

        self.entries[id as usize].prev = self.tail;
        if self.tail != NIL {
            self.entries[self.tail as usize].next = id;
        } else {
            self.head = id;
        }
        self.tail = id;
        self.size += 1;
    }

    fn grow(&mut self) {
        let new_len = (self.buckets.len() * 2).max(MIN_BUCKETS);
        self.buckets = vec![NIL; new_len];
        let mut id = self.head;
        while id != NIL {
            let bucket = self.bucket_of(&self.entries[id as usize].key);
            self.entries[id as usize].next_hash = self.buckets[bucket];
            self.buckets[bucket] = id;
            id = self.entries[id as usize].next;
        }
    }

    pub fn remove(&mut self, key: &ArrayKey) -> Option<Value> {
        let id = self.find(key);
        if id == NIL {
            return None;
        }

        // Unchain from the bucket.
        let bucket = self.bucket_of(key);
        let mut link = self.buckets[bucket];
        if link == id {
            self.buckets[bucket] = self.entries[id as usize].next_hash;
        } else {
            while link != NIL {
                let next = self.entries[link as usize].next_hash;
                if next == id {
                    self.entries[link as usize].next_hash =
                        self.entries[id as usize].next_hash;
                    break;
                }
                link = next;
            }
        }

        // Unchain from the order list.
        let (prev, next) = {
            let e = &self.entries[id as usize];
            (e.prev, e.next)
        };
        if prev != NIL {
            self.entries[prev as usize].next = next;
        } else {
            self.head = next;
        }
        if next != NIL {
            self.entries[next as usize].prev = prev;
        } else {
            self.tail = prev;
        }
        if self.cursor == id {
            self.cursor = next;
        }

        self.size -= 1;
        let entry = std::mem::replace(
            &mut self.entries[id as usize],
            Entry {
                key: ArrayKey::Int(0),
                value: Value::Null,
                next_hash: NIL,
                prev: NIL,
                next: NIL,
            },
        );
        self.free.push(id);

        // Removing the topmost integer key frees it for reuse.
        if let ArrayKey::Int(i) = entry.key {
            if i + 1 == self.next_index {
                self.update_next_index();
            }
        }
        Some(entry.value)
    }

    fn update_next_index(&mut self) {
        let mut max = -1i64;
        let mut id = self.head;
        while id != NIL {
            if let ArrayKey::Int(i) = self.entries[id as usize].key {
                max = max.max(i);
            }
            id = self.entries[id as usize].next;
        }
        self.next_index = max + 1;
    }

    /// Removes and returns the last entry's value.
    pub fn pop(&mut self) -> Option<Value> {
        if self.tail == NIL {
            return None;
        }
        let key = self.entries[self.tail as usize].key.clone();
        self.remove(&key)
    }

    /// Shared cell for an entry, creating the entry if missing.
    pub fn entry_var(&mut self, key: ArrayKey) -> Var {
        let id = self.find(&key);
        if id != NIL {
            return Var::promote(&mut self.entries[id as usize].value);
        }
        let var = Var::new(Value::Null);
        self.insert(key, Value::Ref(var.clone()));
        var
    }

    // --- order-list traversal ------------------------------------------

    /// Entry ids in insertion order; stable across value mutation.
    pub fn first_id(&self) -> i32 {
        self.head
    }

    pub fn next_id(&self, id: i32) -> i32 {
        if id == NIL {
            NIL
        } else {
            self.entries[id as usize].next
        }
    }

    pub fn entry_at(&self, id: i32) -> Option<(&ArrayKey, &Value)> {
        if id == NIL {
            return None;
        }
        let e = &self.entries[id as usize];
        Some((&e.key, &e.value))
    }

    pub fn iter(&self) -> ArrayIter<'_> {
        ArrayIter {
            array: self,
            id: self.head,
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &ArrayKey> {
        self.iter().map(|(k, _)| k)
    }

    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.iter().map(|(_, v)| v)
    }

    // --- cursor ---------------------------------------------------------

    /// Moves the cursor to the first entry and returns its value.
    pub fn reset(&mut self) -> Option<Value> {
        self.cursor = self.head;
        self.current()
    }

    /// Moves the cursor to the last entry and returns its value.
    pub fn end(&mut self) -> Option<Value> {
        self.cursor = self.tail;
        self.current()
    }

    pub fn current(&self) -> Option<Value> {
        self.entry_at(self.cursor).map(|(_, v)| v.clone())
    }

    pub fn current_key(&self) -> Option<ArrayKey> {
        self.entry_at(self.cursor).map(|(k, _)| k.clone())
    }

    /// Advances the cursor; past the end it parks at nothing.
    pub fn next(&mut self) -> Option<Value> {
        if self.cursor != NIL {
            self.cursor = self.entries[self.cursor as usize].next;
        }
        self.current()
    }

    pub fn prev(&mut self) -> Option<Value> {
        if self.cursor != NIL {
            self.cursor = self.entries[self.cursor as usize].prev;
        }
        self.current()
    }

    /// Returns `{0: key, "key": key, 1: value, "value": value}` for the
    /// cursor entry and advances, or `None` past the end.
    pub fn each(&mut self) -> Option<ArrayValue> {
        let (key, value) = self.entry_at(self.cursor)?;
        let (key, value) = (key.clone(), value.clone());
        let mut pair = ArrayValue::new();
        pair.insert(ArrayKey::Int(0), key.to_value());
        pair.insert(ArrayKey::from("key"), key.to_value());
        pair.insert(ArrayKey::Int(1), value.clone());
        pair.insert(ArrayKey::from("value"), value);
        self.cursor = self.entries[self.cursor as usize].next;
        Some(pair)
    }

    // --- whole-array operations ----------------------------------------

    /// Entries of `other` whose keys are absent here are appended;
    /// existing keys keep their current values.
    pub fn union(&mut self, other: &ArrayValue) {
        for (key, value) in other.iter() {
            if !self.contains_key(key) {
                self.insert(key.clone(), value.copy_as_array_item());
            }
        }
    }

    /// Sorts by value. With `reset_keys`, integer keys are renumbered
    /// sequentially (all keys when `strict`); other keys ride along.
    /// The cursor resets.
    pub fn sort_values(
        &mut self,
        mut compare: impl FnMut(&Value, &Value) -> Ordering,
        reset_keys: bool,
        strict: bool,
    ) {
        let mut pairs: Vec<(ArrayKey, Value)> = self
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        pairs.sort_by(|a, b| compare(&a.1, &b.1));
        self.rebuild(pairs, if reset_keys { Some(0) } else { None }, strict);
    }

    /// Renumbers integer keys sequentially from `base` (all keys when
    /// `strict`), keeping entry order. The cursor resets.
    pub fn key_reset(&mut self, base: i64, strict: bool) {
        let pairs: Vec<(ArrayKey, Value)> = self
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        self.rebuild(pairs, Some(base), strict);
    }

    /// Sorts by key. The cursor resets.
    pub fn sort_keys(&mut self, mut compare: impl FnMut(&ArrayKey, &ArrayKey) -> Ordering) {
        let mut pairs: Vec<(ArrayKey, Value)> = self
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        pairs.sort_by(|a, b| compare(&a.0, &b.0));
        self.rebuild(pairs, None, false);
    }

    fn rebuild(&mut self, pairs: Vec<(ArrayKey, Value)>, renumber_from: Option<i64>, strict: bool) {
        *self = ArrayValue::new();
        let mut next = renumber_from.unwrap_or(0);
        for (key, value) in pairs {
            if renumber_from.is_some() && (strict || matches!(key, ArrayKey::Int(_))) {
                self.insert(ArrayKey::Int(next), value);
                next += 1;
            } else {
                self.insert(key, value);
            }
        }
    }

    /// Key-wise comparison. A missing right-hand key yields `missing`;
    /// otherwise sizes break ties first, then the first unequal pair of
    /// values decides.
    pub fn cmp_with(&self, other: &ArrayValue, missing: Ordering) -> Ordering {
        match self.size.cmp(&other.size) {
            Ordering::Equal => {}
            unequal => return unequal,
        }
        for (key, value) in self.iter() {
            match other.get(key) {
                None => return missing,
                Some(rhs) => match value.cmp_loose(rhs) {
                    Ordering::Equal => {}
                    unequal => return unequal,
                },
            }
        }
        Ordering::Equal
    }

    /// Loose equality: same size and every key maps to a loosely equal
    /// value, order ignored.
    pub fn eq_loose(&self, other: &ArrayValue) -> bool {
        self.size == other.size
            && self
                .iter()
                .all(|(key, value)| other.get(key).is_some_and(|rhs| value.eq_loose(rhs)))
    }

    /// Strict equality: same keys in the same order, values strictly
    /// equal.
    pub fn eq_strict(&self, other: &ArrayValue) -> bool {
        if self.size != other.size {
            return false;
        }
        let mut a = self.iter();
        let mut b = other.iter();
        loop {
            match (a.next(), b.next()) {
                (None, None) => return true,
                (Some((ka, va)), Some((kb, vb))) => {
                    if ka != kb || !va.eq_strict(vb) {
                        return false;
                    }
                }
                _ => return false,
            }
        }
    }

    /// Runs `f` over every entry value in insertion order.
    pub fn for_each_value_mut(&mut self, mut f: impl FnMut(&mut Value)) {
        let mut id = self.head;
        while id != NIL {
            f(&mut self.entries[id as usize].value);
            id = self.entries[id as usize].next;
        }
    }

    /// Value-semantics copy. Nested arrays copy recursively; objects
    /// and reference cells keep their identity. The copy's cursor is
    /// reset.
    pub fn copy(&self) -> ArrayValue {
        let mut out = ArrayValue::new();
        for (key, value) in self.iter() {
            out.insert(key.clone(), value.copy_as_array_item());
        }
        out.next_index = self.next_index;
        out
    }
}

impl Default for ArrayValue {
    fn default() -> Self {
        ArrayValue::new()
    }
}

impl FromIterator<(ArrayKey, Value)> for ArrayValue {
    fn from_iter<T: IntoIterator<Item = (ArrayKey, Value)>>(iter: T) -> Self {
        let mut array = ArrayValue::new();
        for (key, value) in iter {
            array.insert(key, value);
        }
        array
    }
}

impl fmt::Debug for ArrayValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

pub struct ArrayIter<'a> {
    array: &'a ArrayValue,
    id: i32,
}

impl<'a> Iterator for ArrayIter<'a> {
    type Item = (&'a ArrayKey, &'a Value);

    fn next(&mut self) -> Option<Self::Item> {
        let item = self.array.entry_at(self.id)?;
        self.id = self.array.entries[self.id as usize].next;
        Some(item)
    }
}

/// Shared handle to an array. Plain assignment copies the array value;
/// sharing a handle only happens through explicit aliasing.
#[derive(Clone)]
pub struct ArrayRef(Rc<RefCell<ArrayValue>>);

impl ArrayRef {
    pub fn new(array: ArrayValue) -> ArrayRef {
        ArrayRef(Rc::new(RefCell::new(array)))
    }

    pub fn borrow(&self) -> Ref<'_, ArrayValue> {
        self.0.borrow()
    }

    pub fn borrow_mut(&self) -> RefMut<'_, ArrayValue> {
        self.0.borrow_mut()
    }

    pub fn ptr_eq(&self, other: &ArrayRef) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub fn addr(&self) -> usize {
        Rc::as_ptr(&self.0) as usize
    }
}

impl fmt::Debug for ArrayRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.borrow().fmt(f)
    }
}
