//! Read-mostly memo maps for column models and prepared statements.
//!
//! Entries are built outside any lock. When two callers miss on the same key
//! at once, both build, the first insert wins and the other result is
//! dropped. Entries are never invalidated.

use std::any::TypeId;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;

use crate::column::ColumnModel;
use crate::dialect::Dialect;
use crate::error::SqlRowResult;
use crate::naming::Convention;
use crate::schema::PreparedStatement;

/// Thread-safe build-once map.
pub struct Memo<K, V> {
    entries: DashMap<K, Arc<V>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<K, V> Memo<K, V>
where
    K: Eq + Hash + Clone + Debug,
{
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn get(&self, key: &K) -> Option<Arc<V>> {
        self.entries.get(key).map(|entry| Arc::clone(entry.value()))
    }

    /// Return the entry for `key`, building it with `build` on a miss.
    /// A failed build caches nothing.
    pub fn get_or_try_insert_with<F>(&self, key: K, build: F) -> SqlRowResult<Arc<V>>
    where
        F: FnOnce() -> SqlRowResult<V>,
    {
        if let Some(found) = self.get(&key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(found);
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(key = ?key, "cache miss, building entry");
        let built = Arc::new(build()?);

        let entry = self.entries.entry(key).or_insert(built);
        Ok(Arc::clone(entry.value()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Lookup counters since creation.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

impl<K, V> Default for Memo<K, V>
where
    K: Eq + Hash + Clone + Debug,
{
    fn default() -> Self {
        Self::new()
    }
}

/// Cache statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
}

/// Everything an expansion depends on.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StatementKey {
    pub record: TypeId,
    pub dialect: Dialect,
    pub convention: Convention,
    pub template: String,
}

/// Column models per record type.
pub type ColumnCache = Memo<TypeId, ColumnModel>;

/// Prepared statements per (record type, dialect, convention, template).
pub type StatementCache = Memo<StatementKey, PreparedStatement>;
