//! In-memory entity store
//!
//! Rows are kept in a `BTreeMap` keyed by their id, so iteration order is
//! insertion order. Operation counters and an availability switch make
//! the store convenient for exercising cache and fault behaviour.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::RwLock;
use permrs_sdk::{EntityRow, RowFilter, RowId};

use crate::error::{StoreError, StoreResult};
use crate::seed::Dataset;
use crate::EntityStore;

/// Thread-safe in-memory [`EntityStore`]
#[derive(Debug)]
pub struct MemoryStore {
    rows: RwLock<BTreeMap<RowId, EntityRow>>,
    next_id: AtomicU64,
    available: AtomicBool,
    reads: AtomicU64,
    writes: AtomicU64,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self {
            rows: RwLock::new(BTreeMap::new()),
            next_id: AtomicU64::new(1),
            available: AtomicBool::new(true),
            reads: AtomicU64::new(0),
            writes: AtomicU64::new(0),
        }
    }

    /// Create a store pre-populated with every row of a dataset
    pub fn from_dataset(dataset: &Dataset) -> StoreResult<Self> {
        let store = Self::new();
        for row in dataset.to_rows() {
            store.insert_row(row)?;
        }
        tracing::debug!("Seeded memory store with {} rows", store.len());
        // Seeding is not traffic
        store.reads.store(0, Ordering::Relaxed);
        store.writes.store(0, Ordering::Relaxed);
        Ok(store)
    }

    /// Toggle availability; while unavailable every call fails
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::Release);
    }

    /// Number of query calls served
    pub fn read_count(&self) -> u64 {
        self.reads.load(Ordering::Relaxed)
    }

    /// Number of insert/delete calls served
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    /// Number of stored rows
    pub fn len(&self) -> usize {
        self.rows.read().len()
    }

    /// Check if the store holds no rows
    pub fn is_empty(&self) -> bool {
        self.rows.read().is_empty()
    }

    fn check_available(&self) -> StoreResult<()> {
        if self.available.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(StoreError::Unavailable)
        }
    }
}

impl EntityStore for MemoryStore {
    fn query_rows(&self, filter: &RowFilter) -> StoreResult<Vec<EntityRow>> {
        self.check_available()?;
        self.reads.fetch_add(1, Ordering::Relaxed);

        let rows = self.rows.read();
        Ok(rows
            .values()
            .filter(|row| filter.matches(row))
            .cloned()
            .collect())
    }

    fn insert_row(&self, row: EntityRow) -> StoreResult<RowId> {
        self.check_available()?;
        row.validate().map_err(StoreError::InvalidRow)?;
        self.writes.fetch_add(1, Ordering::Relaxed);

        let id = RowId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.rows.write().insert(id, row);
        Ok(id)
    }

    fn delete_rows(&self, filter: &RowFilter) -> StoreResult<usize> {
        self.check_available()?;
        self.writes.fetch_add(1, Ordering::Relaxed);

        let mut rows = self.rows.write();
        let before = rows.len();
        rows.retain(|_, row| !filter.matches(row));
        Ok(before - rows.len())
    }
}
