//! permrs SDK - Permission Data Type Definitions
//!
//! This crate contains the plain data types shared by the storage layer
//! and the resolution engine. It has no dependencies and compiles quickly,
//! allowing parallel compilation of dependent crates.
//!
//! # Modules
//!
//! - [`entity`] - Entity identity (user or group)
//! - [`row`] - Raw persisted rows and row filters
//! - [`scope`] - The `(server, world)` scope key

pub mod entity;
pub mod row;
pub mod scope;

pub use entity::{EntityId, EntityType};
pub use row::{DataKey, EntityRow, NameMatch, RowFilter, RowId};
pub use scope::ServerWorldKey;
