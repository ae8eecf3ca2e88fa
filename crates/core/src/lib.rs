//! permrs core - permission resolution engine
//!
//! Decides whether a player or group holds a permission at a given scope
//! and what its effective prefix and suffix are.
//!
//! # Resolution
//!
//! Each node (player or group) is checked in order:
//! 1. special permissions (players only)
//! 2. self permission literals at the queried scope
//! 3. self literals at wider scopes (`server+world` -> `server` -> global)
//! 4. the union of every directly inherited group, recursively
//!
//! Contradictions that cannot be settled yield an undefined answer and are
//! reported through `tracing` and debug trees, never as errors.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use permrs_core::{EngineConfig, PermissionEngine, PermissionEntity};
//! use permrs_store::MemoryStore;
//!
//! let engine = PermissionEngine::new(Arc::new(MemoryStore::new()), EngineConfig::default());
//! engine.init()?;
//!
//! let admin = engine.group("admin");
//! admin.add_permission("cmd.*", None, None)?;
//! assert_eq!(admin.has_permission("cmd.ban", None, None)?, Some(true));
//! ```

pub mod cache;
pub mod config;
pub mod engine;
pub mod entities;
mod error;
pub mod expression;
pub mod permissions;
pub mod reader;
pub mod resolver;
pub mod writer;

pub use permrs_sdk as sdk;
pub use permrs_store as store;

pub use config::{ConfigError, ConfigResult, EngineConfig};
pub use engine::PermissionEngine;
pub use entities::{Group, PermissionEntity, Player};
pub use error::{PermsError, PermsResult};
pub use expression::ExpressionError;
pub use permissions::{SpecialContext, SpecialKey, SpecialPermissions};
pub use reader::{AffixKind, CachedBackendReader, CachedGroup, CachedPlayer};
pub use resolver::{AffixDebug, PermissionDebug, Resolution, StatsSnapshot, TraceNode};
pub use permrs_sdk::{EntityId, EntityType, ServerWorldKey};
