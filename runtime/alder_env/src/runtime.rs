//! Process-wide shared state: the interner, per-name id assignment,
//! the resolved-class cache, and the table pools.
//!
//! A `Runtime` is shared by every environment in the process. Names
//! map to small integer ids exactly once; the ids index each
//! environment's private tables, so a warmed program resolves the same
//! slot across runs. Everything here is read-mostly and safe to share
//! across threads; the values the ids point at stay thread-local.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use dashmap::DashMap;

use alder_intern::{Name, SharedInterner};
use alder_value::{ClassDef, FunId, ResolvedClass};

use crate::class_cache::ClassCache;
use crate::tables::TablePool;

/// A function as the environment tracks it: its name and the handle of
/// the body the evaluator owns.
#[derive(Debug)]
pub struct FunctionDecl {
    pub name: Name,
    pub body: FunId,
}

pub struct Runtime {
    interner: SharedInterner,
    fun_ids: DashMap<Name, u32>,
    class_ids: DashMap<Name, u32>,
    const_ids: DashMap<Name, u32>,
    next_fun_id: AtomicU32,
    next_class_id: AtomicU32,
    next_const_id: AtomicU32,
    pub(crate) class_cache: ClassCache,
    pub(crate) fun_pool: TablePool<Arc<FunctionDecl>>,
    pub(crate) class_def_pool: TablePool<Arc<ClassDef>>,
    pub(crate) class_pool: TablePool<Arc<ResolvedClass>>,
}

impl Runtime {
    pub fn new() -> Arc<Runtime> {
        Arc::new(Runtime {
            interner: SharedInterner::new(),
            fun_ids: DashMap::new(),
            class_ids: DashMap::new(),
            const_ids: DashMap::new(),
            next_fun_id: AtomicU32::new(0),
            next_class_id: AtomicU32::new(0),
            next_const_id: AtomicU32::new(0),
            class_cache: ClassCache::new(),
            fun_pool: TablePool::new(),
            class_def_pool: TablePool::new(),
            class_pool: TablePool::new(),
        })
    }

    pub fn interner(&self) -> &SharedInterner {
        &self.interner
    }

    pub fn intern(&self, text: &str) -> Name {
        self.interner.intern(text)
    }

    /// Lower-cased interned form, for case-insensitive tables.
    pub fn lower(&self, name: Name) -> Name {
        self.interner.intern_lower(self.interner.lookup(name))
    }

    /// Function id for a lower-cased name, assigned on first use and
    /// stable for the life of the process.
    pub fn fun_id(&self, lower_name: Name) -> u32 {
        *self
            .fun_ids
            .entry(lower_name)
            .or_insert_with(|| self.next_fun_id.fetch_add(1, Ordering::Relaxed))
    }

    pub fn class_id(&self, lower_name: Name) -> u32 {
        *self
            .class_ids
            .entry(lower_name)
            .or_insert_with(|| self.next_class_id.fetch_add(1, Ordering::Relaxed))
    }

    pub fn const_id(&self, name: Name) -> u32 {
        *self
            .const_ids
            .entry(name)
            .or_insert_with(|| self.next_const_id.fetch_add(1, Ordering::Relaxed))
    }

    pub fn class_cache(&self) -> &ClassCache {
        &self.class_cache
    }
}
