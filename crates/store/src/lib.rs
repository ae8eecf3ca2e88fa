//! permrs Store - Entity Row Storage
//!
//! This crate defines the contract between the permission engine and
//! whatever durable storage holds entity rows, plus an in-memory backend
//! used by tests and the demo CLI.
//!
//! # Contract
//!
//! ```text
//! query_rows(filter)  -> ordered rows (insertion order)
//! insert_row(row)     -> assigned RowId
//! delete_rows(filter) -> number of rows deleted
//! ```
//!
//! No transactions are required across calls. A mutation reads the
//! affected rows at most once before writing.

mod error;
pub mod memory;
pub mod seed;

pub use error::{StoreError, StoreResult};
pub use memory::MemoryStore;
pub use seed::{Dataset, EntityEntry, ScopedEntry};

use permrs_sdk::{EntityRow, RowFilter, RowId};

/// Durable key/value rows per entity
///
/// Implementations must return query results in insertion order, since
/// permission and inheritance lists are ordered.
pub trait EntityStore: Send + Sync {
    /// Fetch every row matching the filter
    fn query_rows(&self, filter: &RowFilter) -> StoreResult<Vec<EntityRow>>;

    /// Insert one row and return its id
    fn insert_row(&self, row: EntityRow) -> StoreResult<RowId>;

    /// Delete every row matching the filter, returning how many were removed
    fn delete_rows(&self, filter: &RowFilter) -> StoreResult<usize>;
}
