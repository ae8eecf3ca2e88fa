//! Player handle

use std::sync::Arc;

use permrs_sdk::EntityId;
use uuid::Uuid;

use super::PermissionEntity;
use crate::engine::PermissionEngine;
use crate::error::PermsResult;
use crate::reader::{CachedPlayer, EntityData};

/// A player, identified by UUID
#[derive(Clone)]
pub struct Player {
    engine: Arc<PermissionEngine>,
    id: Uuid,
    entity: EntityId,
}

impl Player {
    pub(crate) fn new(engine: Arc<PermissionEngine>, id: Uuid) -> Self {
        Self {
            engine,
            id,
            entity: EntityId::user(id.to_string()),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    fn cached(&self) -> PermsResult<Arc<CachedPlayer>> {
        self.engine.reader().cached_player(self.id)
    }

    /// Names of the directly inherited groups
    ///
    /// These are the default groups when the player declares none.
    pub fn groups(&self) -> PermsResult<Vec<String>> {
        Ok(self.cached()?.group_names())
    }

    pub fn using_default_groups(&self) -> PermsResult<bool> {
        Ok(self.cached()?.using_default_groups)
    }

    /// Stored self data, without inheritance
    pub fn self_data(&self) -> PermsResult<EntityData> {
        Ok(self.cached()?.data.clone())
    }

    pub fn add_group(&self, group: &str) -> PermsResult<()> {
        self.engine.add_inheritance(&self.entity, group)
    }

    pub fn remove_group(&self, group: &str) -> PermsResult<()> {
        self.engine.remove_inheritance(&self.entity, group)
    }

    /// Replace every declared group; an empty list falls back to the defaults
    pub fn set_groups<I, S>(&self, groups: I) -> PermsResult<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.engine.set_inheritances(&self.entity, groups)
    }
}

impl PermissionEntity for Player {
    fn engine(&self) -> &PermissionEngine {
        &self.engine
    }

    fn entity(&self) -> &EntityId {
        &self.entity
    }
}

impl std::fmt::Debug for Player {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Player").field("id", &self.id).finish()
    }
}
