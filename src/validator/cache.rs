//! Compiled rule cache
//!
//! Read-mostly map from type name to compilation outcome. Readers share the
//! read lock. A miss takes the write lock, re-checks, then compiles and
//! inserts, so a type is compiled at most once however many threads race on
//! it. Failures are cached too and returned to every later caller.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::rules::CompiledMessage;
use crate::schema::SchemaError;

pub type CacheEntry = Result<Arc<CompiledMessage>, SchemaError>;

/// Whether a lookup was served from the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup {
    Hit,
    Compiled,
}

#[derive(Debug, Default)]
pub struct RuleCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl RuleCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached outcome for `type_name`, compiling it on a miss.
    pub fn get_or_compile<F>(&self, type_name: &str, compile: F) -> (CacheEntry, Lookup)
    where
        F: FnOnce() -> CacheEntry,
    {
        if let Some(entry) = self.entries.read().get(type_name) {
            return (entry.clone(), Lookup::Hit);
        }

        let mut entries = self.entries.write();
        // Another thread may have compiled it between the two locks
        if let Some(entry) = entries.get(type_name) {
            return (entry.clone(), Lookup::Hit);
        }
        let entry = compile();
        entries.insert(type_name.to_string(), entry.clone());
        (entry, Lookup::Compiled)
    }

    /// Cached outcome, without compiling.
    pub fn get(&self, type_name: &str) -> Option<CacheEntry> {
        self.entries.read().get(type_name).cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Number of types that compiled successfully.
    pub fn compiled_count(&self) -> usize {
        self.entries.read().values().filter(|e| e.is_ok()).count()
    }
}
