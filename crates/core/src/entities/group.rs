//! Group handle

use std::sync::Arc;

use permrs_sdk::EntityId;

use super::PermissionEntity;
use crate::engine::PermissionEngine;
use crate::error::PermsResult;
use crate::reader::{CachedGroup, EntityData};

/// A group, identified by its lower-cased name
#[derive(Clone)]
pub struct Group {
    engine: Arc<PermissionEngine>,
    entity: EntityId,
}

impl Group {
    pub(crate) fn new(engine: Arc<PermissionEngine>, name: &str) -> Self {
        Self {
            engine,
            entity: EntityId::group(name.trim()),
        }
    }

    pub fn name(&self) -> &str {
        self.entity.name()
    }

    fn cached(&self) -> PermsResult<Arc<CachedGroup>> {
        self.engine.reader().cached_group(self.entity.name())
    }

    /// Check if the group has any stored data
    pub fn exists(&self) -> PermsResult<bool> {
        Ok(!self.cached()?.placeholder)
    }

    pub fn is_default(&self) -> PermsResult<bool> {
        Ok(self.cached()?.is_default)
    }

    /// Names of the direct parents, in declaration order
    pub fn inheritances(&self) -> PermsResult<Vec<String>> {
        let snapshot = self.engine.reader().snapshot()?;
        let Some(group) = snapshot.get_by_name(self.entity.name()) else {
            return Ok(Vec::new());
        };
        Ok(snapshot
            .parents(group)
            .map(|parent| parent.name().to_string())
            .collect())
    }

    /// Stored self data, without inheritance
    pub fn self_data(&self) -> PermsResult<EntityData> {
        Ok(self.cached()?.data.clone())
    }

    pub fn add_inheritance(&self, group: &str) -> PermsResult<()> {
        self.engine.add_inheritance(&self.entity, group)
    }

    pub fn remove_inheritance(&self, group: &str) -> PermsResult<()> {
        self.engine.remove_inheritance(&self.entity, group)
    }

    pub fn set_inheritances<I, S>(&self, groups: I) -> PermsResult<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.engine.set_inheritances(&self.entity, groups)
    }

    pub fn set_default(&self, default: bool) -> PermsResult<()> {
        self.engine.set_group_default(self.entity.name(), default)
    }
}

impl PermissionEntity for Group {
    fn engine(&self) -> &PermissionEngine {
        &self.engine
    }

    fn entity(&self) -> &EntityId {
        &self.entity
    }
}

impl std::fmt::Debug for Group {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Group").field("name", &self.name()).finish()
    }
}
