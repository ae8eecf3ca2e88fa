//! Raw data rows
//!
//! A row is the unit of persistence: one value for one data key of one
//! entity, optionally narrowed to a server or a world.

use std::fmt;
use std::str::FromStr;

use crate::entity::{EntityId, EntityType};
use crate::scope::ServerWorldKey;

/// Identifier assigned to a row by the store on insert
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RowId(pub u64);

/// Data key of a row
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DataKey {
    /// One permission literal (many rows form an ordered list)
    Permissions,
    /// Chat prefix
    Prefix,
    /// Chat suffix
    Suffix,
    /// One inherited group name (many rows form an ordered list)
    Inheritances,
    /// Group default flag
    Default,
}

impl DataKey {
    /// Storage representation
    pub const fn as_str(self) -> &'static str {
        match self {
            DataKey::Permissions => "permissions",
            DataKey::Prefix => "prefix",
            DataKey::Suffix => "suffix",
            DataKey::Inheritances => "groups",
            DataKey::Default => "default",
        }
    }
}

impl fmt::Display for DataKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "permissions" => Ok(DataKey::Permissions),
            "prefix" => Ok(DataKey::Prefix),
            "suffix" => Ok(DataKey::Suffix),
            "groups" | "inheritances" => Ok(DataKey::Inheritances),
            "default" => Ok(DataKey::Default),
            other => Err(format!("unknown data key: {}", other)),
        }
    }
}

/// One persisted `(name, type, key, value, server?, world?)` row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityRow {
    pub name: String,
    pub kind: EntityType,
    pub key: DataKey,
    pub value: String,
    pub server: Option<String>,
    pub world: Option<String>,
}

impl EntityRow {
    /// Create an unscoped row for an entity
    pub fn new(entity: &EntityId, key: DataKey, value: impl Into<String>) -> Self {
        Self {
            name: entity.name().to_string(),
            kind: entity.kind(),
            key,
            value: value.into(),
            server: None,
            world: None,
        }
    }

    /// Narrow this row to a scope
    pub fn scoped(mut self, scope: &ServerWorldKey) -> Self {
        self.server = scope.server_name().map(str::to_string);
        self.world = scope.world_name().map(str::to_string);
        self
    }

    /// Scope of this row
    ///
    /// A row with a world but no server is treated as unscoped;
    /// [`EntityRow::validate`] rejects such rows before they are stored.
    pub fn scope(&self) -> ServerWorldKey {
        ServerWorldKey::new(self.server.as_deref(), self.world.as_deref()).unwrap_or_default()
    }

    /// Check the world-implies-server invariant
    pub fn validate(&self) -> Result<(), String> {
        if self.world.is_some() && self.server.is_none() {
            return Err(format!(
                "row {} '{}' has world {:?} without a server",
                self.kind, self.name, self.world
            ));
        }
        Ok(())
    }

    /// Identity of the entity this row belongs to
    pub fn entity(&self) -> EntityId {
        EntityId::new(&self.name, self.kind)
    }
}

/// How a filter matches entity names
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum NameMatch {
    /// Any name
    #[default]
    Any,
    /// Exactly this name
    Exact(String),
    /// Names starting with this prefix
    Prefix(String),
}

impl NameMatch {
    /// Check a name against this matcher
    pub fn matches(&self, name: &str) -> bool {
        match self {
            NameMatch::Any => true,
            NameMatch::Exact(exact) => name == exact,
            NameMatch::Prefix(prefix) => name.starts_with(prefix.as_str()),
        }
    }
}

/// Row selection used for queries and deletes
///
/// Unset fields match everything. `scope` matches the exact
/// `(server, world)` pair, so `Some(ServerWorldKey::global())` only
/// selects unscoped rows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RowFilter {
    pub kind: Option<EntityType>,
    pub name: NameMatch,
    pub key: Option<DataKey>,
    pub value: Option<String>,
    pub scope: Option<ServerWorldKey>,
}

impl RowFilter {
    /// Filter matching every row
    pub fn all() -> Self {
        Self::default()
    }

    /// Filter matching every row of one entity type
    pub fn of_kind(kind: EntityType) -> Self {
        Self {
            kind: Some(kind),
            ..Self::default()
        }
    }

    /// Filter matching every row of one entity
    pub fn entity(entity: &EntityId) -> Self {
        Self {
            kind: Some(entity.kind()),
            name: NameMatch::Exact(entity.name().to_string()),
            ..Self::default()
        }
    }

    /// Restrict to a data key
    pub fn with_key(mut self, key: DataKey) -> Self {
        self.key = Some(key);
        self
    }

    /// Restrict to a value
    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    /// Restrict to an exact scope
    pub fn with_scope(mut self, scope: ServerWorldKey) -> Self {
        self.scope = Some(scope);
        self
    }

    /// Check a row against this filter
    pub fn matches(&self, row: &EntityRow) -> bool {
        if self.kind.is_some_and(|kind| kind != row.kind) {
            return false;
        }
        if !self.name.matches(&row.name) {
            return false;
        }
        if self.key.is_some_and(|key| key != row.key) {
            return false;
        }
        if self.value.as_ref().is_some_and(|value| *value != row.value) {
            return false;
        }
        if let Some(scope) = &self.scope {
            if scope.server_name() != row.server.as_deref()
                || scope.world_name() != row.world.as_deref()
            {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_key_aliases() {
        assert_eq!("groups".parse::<DataKey>(), Ok(DataKey::Inheritances));
        assert_eq!("inheritances".parse::<DataKey>(), Ok(DataKey::Inheritances));
        assert_eq!(DataKey::Inheritances.as_str(), "groups");
        assert!("color".parse::<DataKey>().is_err());
    }

    #[test]
    fn test_validate_world_without_server() {
        let mut row = EntityRow::new(&EntityId::group("admin"), DataKey::Permissions, "a.b");
        assert!(row.validate().is_ok());

        row.world = Some("nether".to_string());
        assert!(row.validate().is_err());

        row.server = Some("lobby".to_string());
        assert!(row.validate().is_ok());
        assert_eq!(row.scope(), ServerWorldKey::world("lobby", "nether"));
    }

    #[test]
    fn test_filter_matching() {
        let admin = EntityId::group("admin");
        let row = EntityRow::new(&admin, DataKey::Permissions, "cmd.ban")
            .scoped(&ServerWorldKey::server("lobby"));

        assert!(RowFilter::all().matches(&row));
        assert!(RowFilter::entity(&admin).matches(&row));
        assert!(!RowFilter::entity(&EntityId::user("admin")).matches(&row));
        assert!(!RowFilter::of_kind(EntityType::User).matches(&row));

        let prefix = RowFilter {
            name: NameMatch::Prefix("ad".to_string()),
            ..RowFilter::all()
        };
        assert!(prefix.matches(&row));

        let scoped = RowFilter::entity(&admin)
            .with_key(DataKey::Permissions)
            .with_value("cmd.ban");
        assert!(scoped.clone().with_scope(ServerWorldKey::server("lobby")).matches(&row));
        assert!(!scoped.with_scope(ServerWorldKey::global()).matches(&row));
    }
}
