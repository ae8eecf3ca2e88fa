//! Cached entity snapshots
//!
//! Immutable read-models of one entity's self data. Groups live in a
//! [`GroupSnapshot`]'s flat table and reference their parents by
//! [`GroupKey`]; players hold the groups they inherit directly together
//! with the snapshot those groups came from.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use permrs_sdk::{DataKey, EntityRow, ServerWorldKey};
use uuid::Uuid;

use super::snapshot::{GroupKey, GroupSnapshot};

/// Prefix or suffix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AffixKind {
    Prefix,
    Suffix,
}

impl AffixKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            AffixKind::Prefix => "prefix",
            AffixKind::Suffix => "suffix",
        }
    }
}

/// Self data shared by players and groups
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntityData {
    pub name: String,
    pub prefix: Option<String>,
    pub suffix: Option<String>,
    /// Permission literals per scope, in insertion order
    pub permissions: BTreeMap<ServerWorldKey, Vec<String>>,
}

impl EntityData {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Permission literals stored at exactly this scope
    pub fn permissions_at(&self, scope: &ServerWorldKey) -> &[String] {
        self.permissions
            .get(scope)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Every permission literal at every scope
    pub fn all_permissions(&self) -> impl Iterator<Item = &String> {
        self.permissions.values().flatten()
    }

    pub fn affix(&self, kind: AffixKind) -> Option<&str> {
        match kind {
            AffixKind::Prefix => self.prefix.as_deref(),
            AffixKind::Suffix => self.suffix.as_deref(),
        }
    }

    /// Take a permission, prefix or suffix row into this snapshot
    ///
    /// Returns `false` for rows of any other key.
    pub(crate) fn absorb(&mut self, row: &EntityRow) -> bool {
        match row.key {
            DataKey::Permissions => {
                self.permissions
                    .entry(row.scope())
                    .or_default()
                    .push(row.value.clone());
                true
            }
            DataKey::Prefix => {
                self.prefix = Some(row.value.clone());
                true
            }
            DataKey::Suffix => {
                self.suffix = Some(row.value.clone());
                true
            }
            DataKey::Inheritances | DataKey::Default => false,
        }
    }
}

/// Snapshot of one group
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CachedGroup {
    pub data: EntityData,
    pub is_default: bool,
    /// Direct parents, in declaration order
    pub inheritances: Vec<GroupKey>,
    /// Materialized for a name without any stored data
    pub placeholder: bool,
}

impl CachedGroup {
    /// Empty group for a name with no data
    pub fn placeholder(name: &str) -> Self {
        Self {
            data: EntityData::new(name),
            placeholder: true,
            ..Self::default()
        }
    }

    pub fn name(&self) -> &str {
        &self.data.name
    }
}

/// Snapshot of one player
#[derive(Debug, Clone)]
pub struct CachedPlayer {
    pub id: Uuid,
    pub data: EntityData,
    /// Direct inheritances, in declaration order
    pub groups: Vec<Arc<CachedGroup>>,
    /// The player declared no groups and inherits the default groups
    pub using_default_groups: bool,
    snapshot: Arc<GroupSnapshot>,
}

impl CachedPlayer {
    pub(crate) fn new(
        id: Uuid,
        data: EntityData,
        groups: Vec<Arc<CachedGroup>>,
        using_default_groups: bool,
        snapshot: Arc<GroupSnapshot>,
    ) -> Self {
        Self {
            id,
            data,
            groups,
            using_default_groups,
            snapshot,
        }
    }

    /// Group graph this player was loaded against
    pub fn snapshot(&self) -> &GroupSnapshot {
        &self.snapshot
    }

    /// Names of the directly inherited groups
    pub fn group_names(&self) -> Vec<String> {
        self.groups.iter().map(|g| g.name().to_string()).collect()
    }

    /// Check if `group` is a direct or transitive inheritance
    pub fn inherits_group(&self, group: &str) -> bool {
        let group = group.to_lowercase();
        let mut visited: HashSet<&str> = HashSet::new();
        let mut pending: Vec<&CachedGroup> = self.groups.iter().map(|g| g.as_ref()).collect();

        while let Some(current) = pending.pop() {
            if !visited.insert(current.name()) {
                continue;
            }
            if current.name() == group {
                return true;
            }
            pending.extend(self.snapshot.parents(current).map(|g| g.as_ref()));
        }
        false
    }
}
