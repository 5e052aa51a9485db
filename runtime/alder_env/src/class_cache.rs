//! The cross-run resolved-class cache.
//!
//! Resolutions are keyed by `(definition id, parent resolution
//! identity)`. Lookups are concurrent; population is insert-if-absent,
//! so a losing writer discards its resolution and adopts the winner's.
//! Marking a definition modified drops its entries and, transitively,
//! every resolution that was built on top of one of them.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

use alder_value::{ClassDefId, ResolveKey, ResolvedClass};

pub struct ClassCache {
    map: DashMap<ResolveKey, Arc<ResolvedClass>>,
    /// For each definition, the keys of cached resolutions whose
    /// parent chain passes through it.
    dependents: DashMap<ClassDefId, Vec<ResolveKey>>,
}

impl ClassCache {
    pub fn new() -> ClassCache {
        ClassCache {
            map: DashMap::new(),
            dependents: DashMap::new(),
        }
    }

    pub fn get(&self, key: &ResolveKey) -> Option<Arc<ResolvedClass>> {
        self.map.get(key).map(|entry| entry.clone())
    }

    /// Publishes a resolution unless someone else already did; the
    /// cached copy is returned either way.
    pub fn publish(&self, key: ResolveKey, resolved: Arc<ResolvedClass>) -> Arc<ResolvedClass> {
        let winner = self.map.entry(key).or_insert(resolved).clone();

        // Register the chain so an ancestor modification evicts this.
        let mut ancestor = winner.parent.clone();
        while let Some(class) = ancestor {
            self.dependents
                .entry(class.def_id)
                .or_default()
                .push(key);
            ancestor = class.parent.clone();
        }
        winner
    }

    /// Drops every resolution of `def` and everything resolved on top
    /// of one.
    pub fn invalidate(&self, def: ClassDefId) {
        let keys: Vec<ResolveKey> = self
            .map
            .iter()
            .filter(|entry| entry.key().def == def)
            .map(|entry| *entry.key())
            .collect();
        for key in keys {
            self.map.remove(&key);
        }
        if let Some((_, dependents)) = self.dependents.remove(&def) {
            debug!(def = def.0, dependents = dependents.len(), "class cache invalidated");
            for key in dependents {
                self.map.remove(&key);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

impl Default for ClassCache {
    fn default() -> Self {
        ClassCache::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alder_intern::Name;

    fn stub(name: &str) -> Arc<ResolvedClass> {
        ResolvedClass::incomplete(Name::EMPTY, Arc::from(name))
    }

    #[test]
    fn publish_is_insert_if_absent() {
        let cache = ClassCache::new();
        let key = ResolveKey {
            def: ClassDefId(1),
            parent_identity: 0,
        };
        let first = cache.publish(key, stub("A"));
        let second = cache.publish(key, stub("A-later"));
        // The loser adopts the winner.
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn invalidation_drops_own_entries() {
        let cache = ClassCache::new();
        let key = ResolveKey {
            def: ClassDefId(2),
            parent_identity: 0,
        };
        cache.publish(key, stub("B"));
        cache.invalidate(ClassDefId(2));
        assert!(cache.get(&key).is_none());
    }
}
