use dashmap::DashMap;
use dc_types::Table;
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;

/// Process-wide cache of merged source tables, keyed by source id.
///
/// Entries are replaced wholesale; a reader holding an `Arc` keeps its
/// snapshot even if a refresh swaps the entry underneath it.
#[derive(Debug, Default)]
pub struct SourceCache {
    tables: DashMap<String, Arc<Table>>,
    stats: RwLock<CacheStats>,
}

impl SourceCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, source_id: &str) -> Option<Arc<Table>> {
        let found = self.tables.get(source_id).map(|entry| Arc::clone(entry.value()));

        let mut stats = self.stats.write();
        if found.is_some() {
            stats.hits += 1;
            tracing::debug!(source = source_id, "Cache hit");
        } else {
            stats.misses += 1;
        }

        found
    }

    pub fn put(&self, source_id: &str, table: Arc<Table>) {
        let rows = table.len();
        self.tables.insert(source_id.to_string(), table);
        self.stats.write().stores += 1;
        tracing::debug!(source = source_id, rows, "Cache entry replaced");
    }

    pub fn contains(&self, source_id: &str) -> bool {
        self.tables.contains_key(source_id)
    }

    /// Drop every entry. Hit/miss counters are kept.
    pub fn clear(&self) {
        self.tables.clear();
        self.stats.write().clears += 1;
    }

    pub fn stats(&self) -> CacheStats {
        self.stats.read().clone()
    }

    pub fn info(&self) -> CacheInfo {
        CacheInfo {
            total_entries: self.tables.len(),
            total_rows: self.tables.iter().map(|e| e.value().len()).sum(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub stores: u64,
    pub clears: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        if self.hits + self.misses == 0 {
            0.0
        } else {
            self.hits as f64 / (self.hits + self.misses) as f64
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheInfo {
    pub total_entries: usize,
    pub total_rows: usize,
}
