//! Permission and prefix/suffix resolution
//!
//! The resolver answers queries against the reader's snapshots and caches
//! every answer until the engine invalidates it. Debug entry points bypass
//! the caches and return the full [`TraceNode`] tree of the walk.

mod trace;
mod walk;

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use permrs_sdk::{EntityId, EntityType, ServerWorldKey};
use serde::Serialize;
use tracing::{trace, warn};
use uuid::Uuid;

use crate::cache::ExpiringCache;
use crate::error::{PermsError, PermsResult};
use crate::permissions::{normalize, split_negation, SpecialPermissions};
use crate::reader::{AffixKind, CachedBackendReader, CachedGroup, CachedPlayer, GroupSnapshot};

pub use trace::TraceNode;
pub use walk::{Outcome, Resolution};

use walk::{Node, Walk};

type PermissionKey = (EntityId, String, ServerWorldKey);
type ListKey = (EntityId, ServerWorldKey);
type AffixKey = (EntityId, AffixKind);

/// Result of a traced permission query
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PermissionDebug {
    /// Normalized literal as queried, negation included
    pub permission: String,
    pub result: Option<bool>,
    pub conflict: bool,
    pub tree: TraceNode,
}

/// Result of a traced prefix or suffix query
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AffixDebug {
    pub value: String,
    pub conflict: bool,
    pub tree: TraceNode,
}

/// Counts of answers computed instead of served from cache
#[derive(Debug, Default)]
pub struct ResolverStats {
    permissions: AtomicU64,
    lists: AtomicU64,
    affixes: AtomicU64,
    conflicts: AtomicU64,
}

/// Point-in-time copy of [`ResolverStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub permission_computations: u64,
    pub list_computations: u64,
    pub affix_computations: u64,
    pub conflicts: u64,
}

impl ResolverStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            permission_computations: self.permissions.load(Ordering::Relaxed),
            list_computations: self.lists.load(Ordering::Relaxed),
            affix_computations: self.affixes.load(Ordering::Relaxed),
            conflicts: self.conflicts.load(Ordering::Relaxed),
        }
    }
}

/// Loaded entity a query starts from
enum Subject {
    Player(Arc<CachedPlayer>),
    Group {
        snapshot: Arc<GroupSnapshot>,
        group: Arc<CachedGroup>,
    },
}

impl Subject {
    fn load(reader: &CachedBackendReader, entity: &EntityId) -> PermsResult<Self> {
        match entity.kind() {
            EntityType::User => {
                let id = Uuid::parse_str(entity.name())
                    .map_err(|_| PermsError::InvalidPlayerId(entity.name().to_string()))?;
                Ok(Subject::Player(reader.cached_player(id)?))
            }
            EntityType::Group => {
                let snapshot = reader.snapshot()?;
                let group = snapshot.group_or_placeholder(entity.name());
                Ok(Subject::Group { snapshot, group })
            }
        }
    }

    fn snapshot(&self) -> &GroupSnapshot {
        match self {
            Subject::Player(player) => player.snapshot(),
            Subject::Group { snapshot, .. } => snapshot,
        }
    }

    fn node(&self) -> Node<'_> {
        match self {
            Subject::Player(player) => Node::Player(player),
            Subject::Group { group, .. } => Node::Group(group),
        }
    }

    /// Literals stored on the subject itself
    fn own_permissions(&self) -> impl Iterator<Item = &String> {
        let data = match self {
            Subject::Player(player) => &player.data,
            Subject::Group { group, .. } => &group.data,
        };
        data.all_permissions()
    }
}

/// Cached permission and prefix/suffix resolver
pub struct Resolver {
    reader: Arc<CachedBackendReader>,
    specials: Arc<SpecialPermissions>,
    permissions: ExpiringCache<PermissionKey, Option<bool>>,
    lists: ExpiringCache<ListKey, Arc<BTreeMap<String, bool>>>,
    affixes: ExpiringCache<AffixKey, String>,
    stats: ResolverStats,
    log_conflicts: bool,
}

impl Resolver {
    pub fn new(
        reader: Arc<CachedBackendReader>,
        specials: Arc<SpecialPermissions>,
        idle: Duration,
        log_conflicts: bool,
    ) -> Self {
        Self {
            reader,
            specials,
            permissions: ExpiringCache::new(idle),
            lists: ExpiringCache::new(idle),
            affixes: ExpiringCache::new(idle),
            stats: ResolverStats::default(),
            log_conflicts,
        }
    }

    /// Resolve a permission literal
    ///
    /// A leading `-` inverts the answer. `None` means undefined.
    pub fn has_permission(
        &self,
        entity: &EntityId,
        permission: &str,
        scope: &ServerWorldKey,
    ) -> PermsResult<Option<bool>> {
        let literal = normalize(permission)?;
        let (negated, positive) = split_negation(&literal);

        let key = (entity.clone(), positive.to_string(), scope.clone());
        let answer = self.permissions.get_or_try_insert_with(key, || {
            self.stats.permissions.fetch_add(1, Ordering::Relaxed);
            let subject = Subject::load(&self.reader, entity)?;
            let outcome = self.resolve(&subject, positive, scope, None);
            self.report_conflict(outcome, entity, positive, scope);
            Ok::<_, PermsError>(outcome.resolution.as_bool())
        })?;

        trace!("Permission '{}' for {} at {}: {:?}", literal, entity, scope, answer);
        Ok(if negated { answer.map(|granted| !granted) } else { answer })
    }

    /// Resolve a permission literal and record the full walk
    pub fn debug_permission(
        &self,
        entity: &EntityId,
        permission: &str,
        scope: &ServerWorldKey,
    ) -> PermsResult<PermissionDebug> {
        let literal = normalize(permission)?;
        let (negated, positive) = split_negation(&literal);
        let subject = Subject::load(&self.reader, entity)?;

        let mut tree = TraceNode::new(format!(
            "{} checking '{}' at {}",
            subject.node().label(),
            positive,
            scope
        ));
        let outcome = self.resolve(&subject, positive, scope, Some(&mut tree));
        let mut result = outcome.resolution.as_bool();
        if negated {
            result = result.map(|granted| !granted);
            tree.push(TraceNode::new(format!(
                "queried negated literal '{}': answer inverted",
                literal
            )));
        }

        Ok(PermissionDebug {
            permission: literal,
            result,
            conflict: outcome.conflict,
            tree,
        })
    }

    fn resolve(
        &self,
        subject: &Subject,
        literal: &str,
        scope: &ServerWorldKey,
        trace: Option<&mut TraceNode>,
    ) -> Outcome {
        let node = subject.node();
        let mut walk = Walk::new(subject.snapshot(), &self.specials);
        walk.enter(node);
        walk.permission(node, literal, scope, true, trace)
    }

    fn report_conflict(&self, outcome: Outcome, entity: &EntityId, literal: &str, scope: &ServerWorldKey) {
        if !outcome.conflict {
            return;
        }
        self.stats.conflicts.fetch_add(1, Ordering::Relaxed);
        if self.log_conflicts {
            warn!(
                "Conflict resolving '{}' for {} at {} (result: {:?})",
                literal, entity, scope, outcome.resolution
            );
        }
    }

    /// Every known permission with a definite answer for this entity
    ///
    /// Keys are positive literals.
    pub fn effective_permissions(
        &self,
        entity: &EntityId,
        scope: &ServerWorldKey,
    ) -> PermsResult<Arc<BTreeMap<String, bool>>> {
        let key = (entity.clone(), scope.clone());
        self.lists.get_or_try_insert_with(key, || {
            self.stats.lists.fetch_add(1, Ordering::Relaxed);
            let subject = Subject::load(&self.reader, entity)?;

            let literals: BTreeSet<&str> = subject
                .snapshot()
                .permissions()
                .iter()
                .chain(subject.own_permissions())
                .map(|literal| split_negation(literal).1)
                .filter(|literal| !literal.is_empty())
                .collect();

            let mut resolved = BTreeMap::new();
            for literal in literals {
                if let Some(granted) = self.resolve(&subject, literal, scope, None).resolution.as_bool() {
                    resolved.insert(literal.to_string(), granted);
                }
            }
            Ok::<_, PermsError>(Arc::new(resolved))
        })
    }

    /// Effective prefix or suffix, empty when undefined
    pub fn affix(&self, entity: &EntityId, kind: AffixKind) -> PermsResult<String> {
        let key = (entity.clone(), kind);
        self.affixes.get_or_try_insert_with(key, || {
            self.stats.affixes.fetch_add(1, Ordering::Relaxed);
            let subject = Subject::load(&self.reader, entity)?;
            let (value, conflict) = self.resolve_affix(&subject, kind, None);
            if conflict {
                self.stats.conflicts.fetch_add(1, Ordering::Relaxed);
                if self.log_conflicts {
                    warn!("Conflicting inherited {}es for {}", kind.as_str(), entity);
                }
            }
            Ok::<_, PermsError>(value.unwrap_or_default())
        })
    }

    /// Resolve a prefix or suffix and record the full walk
    pub fn debug_affix(&self, entity: &EntityId, kind: AffixKind) -> PermsResult<AffixDebug> {
        let subject = Subject::load(&self.reader, entity)?;
        let mut tree = TraceNode::new(format!("{} {}", subject.node().label(), kind.as_str()));
        let (value, conflict) = self.resolve_affix(&subject, kind, Some(&mut tree));
        Ok(AffixDebug {
            value: value.unwrap_or_default(),
            conflict,
            tree,
        })
    }

    fn resolve_affix(
        &self,
        subject: &Subject,
        kind: AffixKind,
        trace: Option<&mut TraceNode>,
    ) -> (Option<String>, bool) {
        let node = subject.node();
        let mut walk = Walk::new(subject.snapshot(), &self.specials);
        walk.enter(node);
        walk.affix(node, kind, trace)
    }

    /// Drop every cached permission answer and permission list
    pub fn clear_permissions(&self) {
        self.permissions.clear();
        self.lists.clear();
    }

    /// Drop every cached answer
    pub fn clear_all(&self) {
        self.clear_permissions();
        self.affixes.clear();
    }

    /// Drop every cached answer for one entity
    pub fn clear_entity(&self, entity: &EntityId) {
        self.permissions.retain(|(cached, _, _)| cached != entity);
        self.lists.retain(|(cached, _)| cached != entity);
        self.affixes.retain(|(cached, _)| cached != entity);
    }

    /// Drop expired entries from every cache
    pub fn purge_expired(&self) -> usize {
        self.permissions.purge_expired() + self.lists.purge_expired() + self.affixes.purge_expired()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use permrs_store::{Dataset, MemoryStore};

    const ALICE: &str = "8f14e45f-ceea-467f-a0e6-35b7e4a5e2b1";

    fn resolver_with(dataset: &str) -> Resolver {
        let store = Arc::new(MemoryStore::from_dataset(&Dataset::from_toml_str(dataset).unwrap()).unwrap());
        let reader = Arc::new(CachedBackendReader::new(store, Duration::from_secs(60)));
        reader.clear_and_reset_cache().unwrap();
        Resolver::new(reader, Arc::new(SpecialPermissions::new()), Duration::from_secs(60), false)
    }

    fn alice() -> EntityId {
        EntityId::user(ALICE)
    }

    #[test]
    fn test_negated_query_inverts() {
        let resolver = resolver_with(&format!(
            r#"
            [users."{ALICE}"]
            permissions = ["cmd.kick"]
            "#
        ));
        let global = ServerWorldKey::global();

        assert_eq!(resolver.has_permission(&alice(), "cmd.kick", &global).unwrap(), Some(true));
        assert_eq!(resolver.has_permission(&alice(), "-cmd.kick", &global).unwrap(), Some(false));
        assert_eq!(resolver.has_permission(&alice(), "cmd.ban", &global).unwrap(), None);
        assert_eq!(resolver.has_permission(&alice(), "-cmd.ban", &global).unwrap(), None);
        // Both polarities share one cached answer
        assert_eq!(resolver.stats().permission_computations, 2);
    }

    #[test]
    fn test_invalid_inputs() {
        let resolver = resolver_with("");
        let global = ServerWorldKey::global();

        assert!(matches!(
            resolver.has_permission(&alice(), " ", &global),
            Err(PermsError::InvalidPermission(_))
        ));
        assert!(matches!(
            resolver.has_permission(&EntityId::user("not-a-uuid"), "a", &global),
            Err(PermsError::InvalidPlayerId(_))
        ));
    }

    #[test]
    fn test_scope_fallback_skips_to_global() {
        let resolver = resolver_with(
            r#"
            [groups.admin]
            permissions = ["cmd.ban"]
            [[groups.admin.scoped]]
            server = "lobby"
            permissions = ["-cmd.kick"]
            "#,
        );
        let admin = EntityId::group("admin");

        let spawn = ServerWorldKey::world("lobby", "spawn");
        assert_eq!(resolver.has_permission(&admin, "cmd.ban", &spawn).unwrap(), Some(true));
        assert_eq!(resolver.has_permission(&admin, "cmd.kick", &spawn).unwrap(), Some(false));
        assert_eq!(
            resolver.has_permission(&admin, "cmd.kick", &ServerWorldKey::global()).unwrap(),
            None
        );
    }

    #[test]
    fn test_fallback_does_not_consult_parents_early() {
        // The player's own global literal beats a group's scoped one
        let resolver = resolver_with(&format!(
            r#"
            [groups.member]
            [[groups.member.scoped]]
            server = "lobby"
            permissions = ["-chat.talk"]
            [users."{ALICE}"]
            groups = ["member"]
            permissions = ["chat.talk"]
            "#
        ));

        let lobby = ServerWorldKey::server("lobby");
        assert_eq!(resolver.has_permission(&alice(), "chat.talk", &lobby).unwrap(), Some(true));
    }

    #[test]
    fn test_inheritance_conflict_is_undefined() {
        let resolver = resolver_with(&format!(
            r#"
            [groups.a]
            permissions = ["fly"]
            [groups.b]
            permissions = ["-fly"]
            [users."{ALICE}"]
            groups = ["a", "b"]
            "#
        ));
        let global = ServerWorldKey::global();

        let debug = resolver.debug_permission(&alice(), "fly", &global).unwrap();
        assert_eq!(debug.result, None);
        assert!(debug.conflict);
        assert!(debug.tree.contains("both grant and revoke"));

        assert_eq!(resolver.has_permission(&alice(), "fly", &global).unwrap(), None);
        assert_eq!(resolver.stats().conflicts, 1);
    }

    #[test]
    fn test_cycle_terminates() {
        let resolver = resolver_with(
            r#"
            [groups.a]
            inheritances = ["b"]
            [groups.b]
            inheritances = ["a"]
            permissions = ["x.y"]
            "#,
        );
        let global = ServerWorldKey::global();

        assert_eq!(resolver.has_permission(&EntityId::group("a"), "x.y", &global).unwrap(), Some(true));
        let debug = resolver
            .debug_permission(&EntityId::group("a"), "z", &global)
            .unwrap();
        assert_eq!(debug.result, None);
        assert!(debug.tree.contains("inheritance cycle"));
    }

    #[test]
    fn test_effective_permissions() {
        let resolver = resolver_with(&format!(
            r#"
            [groups.admin]
            permissions = ["cmd.*", "-cmd.stop"]
            [users."{ALICE}"]
            groups = ["admin"]
            permissions = ["chat.color"]
            [users."00000000-0000-0000-0000-000000000001"]
            permissions = ["other.thing"]
            "#
        ));

        let list = resolver.effective_permissions(&alice(), &ServerWorldKey::global()).unwrap();
        let expected: BTreeMap<String, bool> = [
            ("chat.color", true),
            ("cmd.*", true),
            ("cmd.stop", false),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();
        assert_eq!(*list, expected);

        resolver.effective_permissions(&alice(), &ServerWorldKey::global()).unwrap();
        assert_eq!(resolver.stats().list_computations, 1);
    }

    #[test]
    fn test_affix_resolution() {
        let resolver = resolver_with(&format!(
            r#"
            [groups.admin]
            prefix = "[Admin] "
            inheritances = ["member"]
            [groups.member]
            prefix = "[Member] "
            suffix = "!"
            [groups.vip]
            suffix = "*"
            [groups.blank]
            suffix = ""
            [users."{ALICE}"]
            groups = ["admin", "vip", "blank"]
            "#
        ));

        assert_eq!(resolver.affix(&alice(), AffixKind::Prefix).unwrap(), "[Admin] ");
        // Two different inherited suffixes conflict
        let debug = resolver.debug_affix(&alice(), AffixKind::Suffix).unwrap();
        assert_eq!(debug.value, "");
        assert!(debug.conflict);
        assert!(debug.tree.contains("conflict"));

        // Self value wins even when empty
        assert_eq!(resolver.affix(&EntityId::group("blank"), AffixKind::Suffix).unwrap(), "");
        assert_eq!(resolver.affix(&EntityId::group("admin"), AffixKind::Suffix).unwrap(), "!");
    }

    #[test]
    fn test_clear_entity_only_drops_that_entity() {
        let resolver = resolver_with("[groups.admin]\npermissions = [\"a\"]\n");
        let global = ServerWorldKey::global();
        let admin = EntityId::group("admin");

        resolver.has_permission(&admin, "a", &global).unwrap();
        resolver.has_permission(&alice(), "a", &global).unwrap();
        resolver.clear_entity(&alice());

        resolver.has_permission(&admin, "a", &global).unwrap();
        resolver.has_permission(&alice(), "a", &global).unwrap();
        assert_eq!(resolver.stats().permission_computations, 3);
    }
}
