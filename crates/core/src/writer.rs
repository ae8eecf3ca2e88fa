//! Backend writer
//!
//! Mutations are read-modify-write operations against the entity store.
//! Names, permission literals and scopes are lower-cased before they are
//! compared or stored; prefix and suffix values are stored verbatim.
//! User names are stored as hyphenated lower-case UUIDs, the only form the
//! reader loads.
//! Cache invalidation after a write is the engine's job.

use std::sync::Arc;

use permrs_sdk::{DataKey, EntityId, EntityRow, EntityType, RowFilter, ServerWorldKey};
use permrs_store::EntityStore;
use tracing::debug;
use uuid::Uuid;

use crate::error::{PermsError, PermsResult};
use crate::permissions::normalize;

/// Build a scope, rejecting a world without a server
pub fn scope_key(server: Option<&str>, world: Option<&str>) -> PermsResult<ServerWorldKey> {
    ServerWorldKey::new(server, world).ok_or(PermsError::InvalidScope)
}

/// Rewrite a user name into its canonical UUID form
pub fn canonical_entity(entity: &EntityId) -> PermsResult<EntityId> {
    match entity.kind() {
        EntityType::User => Uuid::parse_str(entity.name())
            .map(|id| EntityId::user(id.to_string()))
            .map_err(|_| PermsError::InvalidPlayerId(entity.name().to_string())),
        EntityType::Group => Ok(entity.clone()),
    }
}

fn group_name(group: &str) -> PermsResult<String> {
    let name = group.trim().to_lowercase();
    if name.is_empty() {
        return Err(PermsError::InvalidGroup(group.to_string()));
    }
    Ok(name)
}

/// Write side of the engine
pub struct BackendWriter {
    store: Arc<dyn EntityStore>,
}

impl BackendWriter {
    pub fn new(store: Arc<dyn EntityStore>) -> Self {
        Self { store }
    }

    /// Add a permission literal at a scope
    pub fn add_self_permission(
        &self,
        entity: &EntityId,
        permission: &str,
        server: Option<&str>,
        world: Option<&str>,
    ) -> PermsResult<()> {
        let entity = &canonical_entity(entity)?;
        let permission = normalize(permission)?;
        let scope = scope_key(server, world)?;
        let filter = RowFilter::entity(entity)
            .with_key(DataKey::Permissions)
            .with_value(permission.clone())
            .with_scope(scope.clone());

        if !self.store.query_rows(&filter)?.is_empty() {
            return Err(PermsError::AlreadySet {
                what: format!("Permission '{}' for {} at {}", permission, entity, scope),
            });
        }
        self.store
            .insert_row(EntityRow::new(entity, DataKey::Permissions, permission.clone()).scoped(&scope))?;
        debug!("Added permission '{}' to {} at {}", permission, entity, scope);
        Ok(())
    }

    /// Remove a permission literal from a scope
    pub fn remove_self_permission(
        &self,
        entity: &EntityId,
        permission: &str,
        server: Option<&str>,
        world: Option<&str>,
    ) -> PermsResult<()> {
        let entity = &canonical_entity(entity)?;
        let permission = normalize(permission)?;
        let scope = scope_key(server, world)?;
        let filter = RowFilter::entity(entity)
            .with_key(DataKey::Permissions)
            .with_value(permission.clone())
            .with_scope(scope.clone());

        if self.store.delete_rows(&filter)? == 0 {
            return Err(PermsError::NotSet {
                what: format!("Permission '{}' for {} at {}", permission, entity, scope),
            });
        }
        debug!("Removed permission '{}' from {} at {}", permission, entity, scope);
        Ok(())
    }

    /// Replace the prefix, or clear it with `None`
    pub fn set_self_prefix(&self, entity: &EntityId, prefix: Option<&str>) -> PermsResult<()> {
        self.set_single(entity, DataKey::Prefix, prefix)
    }

    /// Replace the suffix, or clear it with `None`
    pub fn set_self_suffix(&self, entity: &EntityId, suffix: Option<&str>) -> PermsResult<()> {
        self.set_single(entity, DataKey::Suffix, suffix)
    }

    fn set_single(&self, entity: &EntityId, key: DataKey, value: Option<&str>) -> PermsResult<()> {
        let entity = &canonical_entity(entity)?;
        self.store
            .delete_rows(&RowFilter::entity(entity).with_key(key))?;
        if let Some(value) = value {
            self.store.insert_row(EntityRow::new(entity, key, value))?;
        }
        debug!("Set {} of {} to {:?}", key.as_str(), entity, value);
        Ok(())
    }

    /// Append a direct inheritance
    pub fn add_inheritance(&self, entity: &EntityId, group: &str) -> PermsResult<()> {
        let entity = &canonical_entity(entity)?;
        let group = group_name(group)?;
        let filter = RowFilter::entity(entity)
            .with_key(DataKey::Inheritances)
            .with_value(group.clone());

        if !self.store.query_rows(&filter)?.is_empty() {
            return Err(PermsError::AlreadySet {
                what: format!("Inheritance '{}' for {}", group, entity),
            });
        }
        self.store
            .insert_row(EntityRow::new(entity, DataKey::Inheritances, group.clone()))?;
        debug!("Added inheritance '{}' to {}", group, entity);
        Ok(())
    }

    /// Remove a direct inheritance
    pub fn remove_inheritance(&self, entity: &EntityId, group: &str) -> PermsResult<()> {
        let entity = &canonical_entity(entity)?;
        let group = group_name(group)?;
        let filter = RowFilter::entity(entity)
            .with_key(DataKey::Inheritances)
            .with_value(group.clone());

        if self.store.delete_rows(&filter)? == 0 {
            return Err(PermsError::NotSet {
                what: format!("Inheritance '{}' for {}", group, entity),
            });
        }
        debug!("Removed inheritance '{}' from {}", group, entity);
        Ok(())
    }

    /// Replace every direct inheritance
    ///
    /// Duplicates are collapsed and the first occurrence keeps its place.
    pub fn set_inheritance<I, S>(&self, entity: &EntityId, groups: I) -> PermsResult<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let entity = &canonical_entity(entity)?;
        let mut names: Vec<String> = Vec::new();
        for group in groups {
            let name = group_name(group.as_ref())?;
            if !names.contains(&name) {
                names.push(name);
            }
        }

        self.store
            .delete_rows(&RowFilter::entity(entity).with_key(DataKey::Inheritances))?;
        for name in &names {
            self.store
                .insert_row(EntityRow::new(entity, DataKey::Inheritances, name.clone()))?;
        }
        debug!("Set inheritances of {} to {:?}", entity, names);
        Ok(())
    }

    /// Flag or unflag a group as default
    pub fn set_group_default(&self, group: &str, default: bool) -> PermsResult<()> {
        let entity = EntityId::group(group_name(group)?);
        self.store
            .delete_rows(&RowFilter::entity(&entity).with_key(DataKey::Default))?;
        if default {
            self.store
                .insert_row(EntityRow::new(&entity, DataKey::Default, "true"))?;
        }
        debug!("Set default flag of {} to {}", entity, default);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use permrs_store::MemoryStore;

    fn writer() -> (Arc<MemoryStore>, BackendWriter) {
        let store = Arc::new(MemoryStore::new());
        (store.clone(), BackendWriter::new(store))
    }

    fn values(store: &MemoryStore, entity: &EntityId, key: DataKey) -> Vec<String> {
        store
            .query_rows(&RowFilter::entity(entity).with_key(key))
            .unwrap()
            .into_iter()
            .map(|row| row.value)
            .collect()
    }

    #[test]
    fn test_add_and_remove_permission() {
        let (store, writer) = writer();
        let admin = EntityId::group("admin");

        writer.add_self_permission(&admin, "Cmd.Ban", None, None).unwrap();
        assert!(matches!(
            writer.add_self_permission(&admin, "cmd.ban", None, None),
            Err(PermsError::AlreadySet { .. })
        ));
        // Same literal at another scope is a different row
        writer
            .add_self_permission(&admin, "cmd.ban", Some("Lobby"), None)
            .unwrap();
        assert_eq!(values(&store, &admin, DataKey::Permissions), vec!["cmd.ban", "cmd.ban"]);

        writer.remove_self_permission(&admin, "CMD.BAN", None, None).unwrap();
        assert!(matches!(
            writer.remove_self_permission(&admin, "cmd.ban", None, None),
            Err(PermsError::NotSet { .. })
        ));
        let rows = store.query_rows(&RowFilter::entity(&admin)).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].server.as_deref(), Some("lobby"));
    }

    #[test]
    fn test_invalid_input() {
        let (_, writer) = writer();
        let admin = EntityId::group("admin");

        assert!(matches!(
            writer.add_self_permission(&admin, "cmd.ban", None, Some("spawn")),
            Err(PermsError::InvalidScope)
        ));
        assert!(matches!(
            writer.add_self_permission(&admin, "  ", None, None),
            Err(PermsError::InvalidPermission(_))
        ));
    }

    #[test]
    fn test_prefix_replace_and_clear() {
        let (store, writer) = writer();
        let admin = EntityId::group("admin");

        writer.set_self_prefix(&admin, Some("[A] ")).unwrap();
        writer.set_self_prefix(&admin, Some("[Admin] ")).unwrap();
        assert_eq!(values(&store, &admin, DataKey::Prefix), vec!["[Admin] "]);

        writer.set_self_suffix(&admin, Some("!")).unwrap();
        writer.set_self_prefix(&admin, None).unwrap();
        assert!(values(&store, &admin, DataKey::Prefix).is_empty());
        assert_eq!(values(&store, &admin, DataKey::Suffix), vec!["!"]);
    }

    #[test]
    fn test_inheritance_mutations() {
        let (store, writer) = writer();
        let alice = EntityId::user("8f14e45f-ceea-467f-a0e6-35b7e4a5e2b1");

        writer.add_inheritance(&alice, "Admin").unwrap();
        assert!(matches!(
            writer.add_inheritance(&alice, "admin"),
            Err(PermsError::AlreadySet { .. })
        ));
        assert!(matches!(
            writer.remove_inheritance(&alice, "member"),
            Err(PermsError::NotSet { .. })
        ));

        writer
            .set_inheritance(&alice, ["vip", "Member", "vip", "admin"])
            .unwrap();
        assert_eq!(
            values(&store, &alice, DataKey::Inheritances),
            vec!["vip", "member", "admin"]
        );

        writer.remove_inheritance(&alice, "member").unwrap();
        assert_eq!(values(&store, &alice, DataKey::Inheritances), vec!["vip", "admin"]);
    }

    #[test]
    fn test_group_default_single_row() {
        let (store, writer) = writer();
        let member = EntityId::group("member");

        writer.set_group_default("Member", true).unwrap();
        writer.set_group_default("member", true).unwrap();
        assert_eq!(values(&store, &member, DataKey::Default), vec!["true"]);

        writer.set_group_default("member", false).unwrap();
        assert!(values(&store, &member, DataKey::Default).is_empty());
    }

    #[test]
    fn test_user_names_are_canonical() {
        let (store, writer) = writer();
        let simple = EntityId::user("8F14E45FCEEA467FA0E635B7E4A5E2B1");
        let hyphenated = EntityId::user("8f14e45f-ceea-467f-a0e6-35b7e4a5e2b1");

        writer.add_self_permission(&simple, "fly", None, None).unwrap();
        writer.set_self_prefix(&simple, Some("[A] ")).unwrap();
        assert_eq!(values(&store, &hyphenated, DataKey::Permissions), vec!["fly"]);
        assert_eq!(values(&store, &hyphenated, DataKey::Prefix), vec!["[A] "]);
        assert!(matches!(
            writer.add_self_permission(&hyphenated, "fly", None, None),
            Err(PermsError::AlreadySet { .. })
        ));

        assert!(matches!(
            writer.add_inheritance(&EntityId::user("alice"), "admin"),
            Err(PermsError::InvalidPlayerId(_))
        ));
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_empty_group_name() {
        let (_, writer) = writer();
        let admin = EntityId::group("admin");

        assert!(matches!(
            writer.add_inheritance(&admin, "  "),
            Err(PermsError::InvalidGroup(_))
        ));
        assert!(matches!(
            writer.set_group_default("", true),
            Err(PermsError::InvalidGroup(_))
        ));
    }

    #[test]
    fn test_storage_fault_propagates() {
        let (store, writer) = writer();
        store.set_available(false);
        assert!(matches!(
            writer.add_inheritance(&EntityId::group("a"), "b"),
            Err(PermsError::Storage(_))
        ));
    }
}
