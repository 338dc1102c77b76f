//! In-memory table source for testing and fixtures.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::{TableKey, TableSource};

/// Error type for the in-memory source.
#[derive(Debug, Clone, thiserror::Error)]
pub enum InMemorySourceError {
    /// No bytes registered for the key.
    #[error("Table not found: {0}")]
    NotFound(String),
}

/// In-memory table source.
///
/// Counts fetches so tests can tell cache hits from origin reads.
#[derive(Debug, Default)]
pub struct InMemoryTableSource {
    tables: BTreeMap<TableKey, Vec<u8>>,
    fetches: AtomicUsize,
}

impl InMemoryTableSource {
    /// Create a new empty source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register bytes for a key.
    pub fn insert(&mut self, key: TableKey, bytes: Vec<u8>) {
        self.tables.insert(key, bytes);
    }

    /// Number of registered tables.
    pub fn len(&self) -> usize {
        self.tables.len()
    }

    /// Whether no tables are registered.
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Number of fetches served so far (including misses).
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl TableSource for InMemoryTableSource {
    type Error = InMemorySourceError;

    async fn fetch(&self, key: &TableKey) -> Result<Vec<u8>, Self::Error> {
        self.fetches.fetch_add(1, Ordering::Relaxed);
        self.tables
            .get(key)
            .cloned()
            .ok_or_else(|| InMemorySourceError::NotFound(key.to_string()))
    }
}
