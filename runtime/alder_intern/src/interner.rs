//! Sharded string interner for identifier storage.
//!
//! Provides O(1) interning and lookup with thread-safe concurrent access
//! via per-shard locking. One interner is shared by every execution that
//! runs against the same resolved program.

use super::Name;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Per-shard storage for interned strings.
struct InternShard {
    /// Map from string content to local index.
    map: FxHashMap<&'static str, u32>,
    /// Storage for string contents.
    strings: Vec<&'static str>,
}

/// Error when interning a string fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InternError {
    /// Shard exceeded capacity (over 256 million strings).
    ShardOverflow { shard_idx: usize, count: usize },
}

impl std::fmt::Display for InternError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InternError::ShardOverflow { shard_idx, count } => write!(
                f,
                "interner shard {shard_idx} exceeded capacity: {count} strings, max is {}",
                Name::MAX_LOCAL
            ),
        }
    }
}

impl std::error::Error for InternError {}

impl InternShard {
    fn new() -> Self {
        Self {
            map: FxHashMap::default(),
            strings: Vec::with_capacity(256),
        }
    }

    fn with_empty() -> Self {
        let mut shard = Self::new();
        // Pre-intern empty string at index 0
        let empty: &'static str = "";
        shard.map.insert(empty, 0);
        shard.strings.push(empty);
        shard
    }
}

/// Sharded string interner for concurrent access.
///
/// # Thread Safety
/// Uses `RwLock` per shard for concurrent read/write access.
/// Wrap in [`SharedInterner`] for sharing across executions.
pub struct StringInterner {
    shards: [RwLock<InternShard>; Name::NUM_SHARDS],
    /// Total count of interned strings across all shards (O(1) `len()`).
    total_count: AtomicUsize,
}

impl StringInterner {
    /// Create a new interner with the empty string pre-interned.
    pub fn new() -> Self {
        let shards = std::array::from_fn(|i| {
            if i == 0 {
                RwLock::new(InternShard::with_empty())
            } else {
                RwLock::new(InternShard::new())
            }
        });

        Self {
            shards,
            total_count: AtomicUsize::new(1),
        }
    }

    /// Compute shard for a string based on its hash.
    #[inline]
    fn shard_for(s: &str) -> usize {
        let mut hash = 0u32;
        for byte in s.bytes().take(8) {
            hash = hash.wrapping_mul(31).wrapping_add(u32::from(byte));
        }
        (hash as usize) % Name::NUM_SHARDS
    }

    /// Try to intern a string, returning its Name or an error on overflow.
    pub fn try_intern(&self, s: &str) -> Result<Name, InternError> {
        let shard_idx = Self::shard_for(s);
        let shard_idx_u32 = shard_idx as u32;
        let shard = &self.shards[shard_idx];

        // Fast path: check if already interned
        {
            let guard = shard.read();
            if let Some(&local) = guard.map.get(s) {
                return Ok(Name::new(shard_idx_u32, local));
            }
        }

        // Slow path: need to insert
        let mut guard = shard.write();

        // Double-check after acquiring write lock
        if let Some(&local) = guard.map.get(s) {
            return Ok(Name::new(shard_idx_u32, local));
        }

        // Leak the string to get 'static lifetime
        let owned: String = s.to_owned();
        let leaked: &'static str = Box::leak(owned.into_boxed_str());

        let local = u32::try_from(guard.strings.len()).map_err(|_| InternError::ShardOverflow {
            shard_idx,
            count: guard.strings.len(),
        })?;
        if local > Name::MAX_LOCAL {
            return Err(InternError::ShardOverflow {
                shard_idx,
                count: guard.strings.len(),
            });
        }

        guard.map.insert(leaked, local);
        guard.strings.push(leaked);
        self.total_count.fetch_add(1, Ordering::Relaxed);

        Ok(Name::new(shard_idx_u32, local))
    }

    /// Intern a string, panicking on shard overflow.
    ///
    /// Overflow requires hundreds of millions of distinct identifiers;
    /// use [`StringInterner::try_intern`] to handle it gracefully.
    #[inline]
    pub fn intern(&self, s: &str) -> Name {
        match self.try_intern(s) {
            Ok(name) => name,
            Err(e) => panic!("{e}"),
        }
    }

    /// Intern the lower-cased form of a string.
    ///
    /// Method tables are case-insensitive; folding at intern time gives
    /// every lookup a single canonical key.
    pub fn intern_lower(&self, s: &str) -> Name {
        if s.bytes().any(|b| b.is_ascii_uppercase()) {
            self.intern(&s.to_ascii_lowercase())
        } else {
            self.intern(s)
        }
    }

    /// Look up the string for a name.
    ///
    /// # Panics
    /// Panics if the name was not produced by this interner.
    pub fn lookup(&self, name: Name) -> &'static str {
        let shard = self.shards[name.shard()].read();
        shard.strings[name.local()]
    }

    /// Number of interned strings.
    pub fn len(&self) -> usize {
        self.total_count.load(Ordering::Relaxed)
    }

    /// Returns true if only the pre-interned empty string is present.
    pub fn is_empty(&self) -> bool {
        self.len() <= 1
    }
}

impl Default for StringInterner {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared handle to a [`StringInterner`].
#[derive(Clone)]
pub struct SharedInterner(Arc<StringInterner>);

impl SharedInterner {
    /// Create a fresh interner behind a shared handle.
    pub fn new() -> Self {
        SharedInterner(Arc::new(StringInterner::new()))
    }
}

impl Default for SharedInterner {
    fn default() -> Self {
        Self::new()
    }
}

impl std::ops::Deref for SharedInterner {
    type Target = StringInterner;

    #[inline]
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl std::fmt::Debug for SharedInterner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedInterner")
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn intern_same_string_returns_same_name() {
        let interner = StringInterner::new();
        let a = interner.intern("count");
        let b = interner.intern("count");
        assert_eq!(a, b);
    }

    #[test]
    fn intern_distinct_strings_differ() {
        let interner = StringInterner::new();
        let a = interner.intern("a");
        let b = interner.intern("b");
        assert_ne!(a, b);
    }

    #[test]
    fn lookup_roundtrips() {
        let interner = StringInterner::new();
        let name = interner.intern("getValue");
        assert_eq!(interner.lookup(name), "getValue");
    }

    #[test]
    fn empty_string_is_preinterned() {
        let interner = StringInterner::new();
        assert_eq!(interner.intern(""), Name::EMPTY);
        assert_eq!(interner.lookup(Name::EMPTY), "");
    }

    #[test]
    fn intern_lower_folds_case() {
        let interner = StringInterner::new();
        let a = interner.intern_lower("getValue");
        let b = interner.intern_lower("GETVALUE");
        let c = interner.intern_lower("getvalue");
        assert_eq!(a, b);
        assert_eq!(b, c);
    }

    #[test]
    fn shared_interner_clones_share_storage() {
        let interner = SharedInterner::new();
        let other = interner.clone();
        let a = interner.intern("x");
        let b = other.intern("x");
        assert_eq!(a, b);
    }

    #[test]
    fn concurrent_interning_agrees() {
        let interner = SharedInterner::new();
        let names: Vec<String> = (0..64).map(|i| format!("sym{i}")).collect();

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let interner = interner.clone();
                let names = names.clone();
                std::thread::spawn(move || {
                    names.iter().map(|n| interner.intern(n)).collect::<Vec<_>>()
                })
            })
            .collect();

        let results: Vec<Vec<Name>> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        for window in results.windows(2) {
            assert_eq!(window[0], window[1]);
        }
    }
}
