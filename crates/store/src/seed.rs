//! TOML dataset seeding
//!
//! A dataset describes groups and users in a human-editable form and
//! expands into the raw rows an [`EntityStore`](crate::EntityStore) holds.
//!
//! ```toml
//! [groups.admin]
//! permissions = ["cmd.*"]
//! prefix = "[Admin] "
//! inheritances = ["member"]
//!
//! [[groups.admin.scoped]]
//! server = "lobby"
//! permissions = ["-cmd.ban"]
//!
//! [groups.member]
//! default = true
//!
//! [users."8f14e45f-ceea-467f-a0e6-35b7e4a5e2b1"]
//! groups = ["admin"]
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use permrs_sdk::{DataKey, EntityId, EntityRow, EntityType, ServerWorldKey};
use serde::{Deserialize, Serialize};

use crate::error::StoreResult;

/// Permissions narrowed to a server or a world
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScopedEntry {
    pub server: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub world: Option<String>,
    #[serde(default)]
    pub permissions: Vec<String>,
}

/// Self data of one entity
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EntityEntry {
    pub permissions: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suffix: Option<String>,
    #[serde(alias = "groups")]
    pub inheritances: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<bool>,
    pub scoped: Vec<ScopedEntry>,
}

/// Groups and users keyed by name
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Dataset {
    pub groups: BTreeMap<String, EntityEntry>,
    pub users: BTreeMap<String, EntityEntry>,
}

impl Dataset {
    /// Parse a dataset from TOML text
    pub fn from_toml_str(content: &str) -> StoreResult<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Read and parse a dataset file
    pub fn load<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let dataset = Self::from_toml_str(&content)?;
        tracing::debug!(
            "Loaded dataset from {:?}: {} groups, {} users",
            path.as_ref(),
            dataset.groups.len(),
            dataset.users.len()
        );
        Ok(dataset)
    }

    /// Expand into raw rows, groups first
    ///
    /// Names, permission literals and scopes are lower-cased the same way
    /// the engine's writer does it.
    pub fn to_rows(&self) -> Vec<EntityRow> {
        let mut rows = Vec::new();
        for (name, entry) in &self.groups {
            entry.push_rows(&EntityId::new(name, EntityType::Group), &mut rows);
        }
        for (name, entry) in &self.users {
            entry.push_rows(&EntityId::new(name, EntityType::User), &mut rows);
        }
        rows
    }
}

impl EntityEntry {
    fn push_rows(&self, entity: &EntityId, rows: &mut Vec<EntityRow>) {
        for permission in &self.permissions {
            rows.push(EntityRow::new(
                entity,
                DataKey::Permissions,
                permission.to_lowercase(),
            ));
        }
        if let Some(prefix) = &self.prefix {
            rows.push(EntityRow::new(entity, DataKey::Prefix, prefix.clone()));
        }
        if let Some(suffix) = &self.suffix {
            rows.push(EntityRow::new(entity, DataKey::Suffix, suffix.clone()));
        }
        for group in &self.inheritances {
            rows.push(EntityRow::new(
                entity,
                DataKey::Inheritances,
                group.to_lowercase(),
            ));
        }
        if let Some(default) = self.default {
            rows.push(EntityRow::new(entity, DataKey::Default, default.to_string()));
        }
        for scoped in &self.scoped {
            let scope = match &scoped.world {
                Some(world) => ServerWorldKey::world(&scoped.server, world),
                None => ServerWorldKey::server(&scoped.server),
            };
            for permission in &scoped.permissions {
                rows.push(
                    EntityRow::new(entity, DataKey::Permissions, permission.to_lowercase())
                        .scoped(&scope),
                );
            }
        }
    }
}
