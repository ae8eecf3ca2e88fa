//! Permission engine
//!
//! [`PermissionEngine`] owns the reader, writer, resolver and special
//! permission registry for one entity store. Entity handles
//! ([`Player`], [`Group`]) are thin views over a shared engine.
//!
//! Every successful write invalidates what it can have changed:
//! - user rows: that player's snapshot and resolver answers
//! - group rows: a full group rebuild and a full resolver flush
//!
//! User entities are accepted in any UUID form and canonicalized on entry.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::thread::JoinHandle;

use permrs_sdk::{EntityId, EntityType, ServerWorldKey};
use permrs_store::EntityStore;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::entities::{Group, Player};
use crate::error::{PermsError, PermsResult};
use crate::expression;
use crate::permissions::{SpecialContext, SpecialKey, SpecialPermissions};
use crate::reader::{AffixKind, CachedBackendReader, CachedGroup, GroupSnapshot};
use crate::resolver::{AffixDebug, PermissionDebug, Resolver, StatsSnapshot};
use crate::writer::{canonical_entity, scope_key, BackendWriter};

/// Shared permission engine over one entity store
pub struct PermissionEngine {
    config: EngineConfig,
    reader: Arc<CachedBackendReader>,
    writer: BackendWriter,
    specials: Arc<SpecialPermissions>,
    resolver: Resolver,
}

impl PermissionEngine {
    /// Create an engine; call [`PermissionEngine::init`] before use
    pub fn new(store: Arc<dyn EntityStore>, config: EngineConfig) -> Arc<Self> {
        let idle = config.cache_idle();
        let reader = Arc::new(CachedBackendReader::new(Arc::clone(&store), idle));
        let specials = Arc::new(SpecialPermissions::new());
        if let Some(prefix) = &config.membership_prefix {
            specials.register_group_membership(prefix);
        }
        let resolver = Resolver::new(
            Arc::clone(&reader),
            Arc::clone(&specials),
            idle,
            config.log_conflicts,
        );

        Arc::new(Self {
            writer: BackendWriter::new(store),
            config,
            reader,
            specials,
            resolver,
        })
    }

    /// Build the group graph for the first time
    pub fn init(&self) -> PermsResult<()> {
        self.clear_and_reset_cache()?;
        let snapshot = self.reader.snapshot()?;
        info!(
            "Permission engine initialized: {} groups, {} special permissions",
            snapshot.len(),
            self.specials.len()
        );
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.reader.is_initialized()
    }

    fn ensure_initialized(&self) -> PermsResult<()> {
        if self.is_initialized() {
            Ok(())
        } else {
            Err(PermsError::NotInitialized)
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub(crate) fn reader(&self) -> &Arc<CachedBackendReader> {
        &self.reader
    }

    /// Current group graph
    pub fn snapshot(&self) -> PermsResult<Arc<GroupSnapshot>> {
        self.reader.snapshot()
    }

    /// Handle for a player
    pub fn player(self: &Arc<Self>, id: Uuid) -> Player {
        Player::new(Arc::clone(self), id)
    }

    /// Handle for a group
    pub fn group(self: &Arc<Self>, name: &str) -> Group {
        Group::new(Arc::clone(self), name)
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub fn has_permission(
        &self,
        entity: &EntityId,
        permission: &str,
        server: Option<&str>,
        world: Option<&str>,
    ) -> PermsResult<Option<bool>> {
        let entity = &canonical_entity(entity)?;
        let scope = scope_key(server, world)?;
        self.resolver.has_permission(entity, permission, &scope)
    }

    /// Evaluate a permission expression; undefined literals count as `false`
    pub fn has_permission_expression(
        &self,
        entity: &EntityId,
        expr: &str,
        server: Option<&str>,
        world: Option<&str>,
    ) -> PermsResult<bool> {
        let entity = &canonical_entity(entity)?;
        let scope = scope_key(server, world)?;
        let mut failure: Option<PermsError> = None;

        let result = expression::evaluate(expr, |literal| {
            if failure.is_some() {
                return false;
            }
            match self.resolver.has_permission(entity, literal, &scope) {
                Ok(answer) => answer.unwrap_or(false),
                Err(e) => {
                    failure = Some(e);
                    false
                }
            }
        });

        match failure {
            Some(e) => Err(e),
            None => Ok(result?),
        }
    }

    pub fn effective_permissions(
        &self,
        entity: &EntityId,
        server: Option<&str>,
        world: Option<&str>,
    ) -> PermsResult<Arc<BTreeMap<String, bool>>> {
        let entity = &canonical_entity(entity)?;
        let scope = scope_key(server, world)?;
        self.resolver.effective_permissions(entity, &scope)
    }

    pub fn affix(&self, entity: &EntityId, kind: AffixKind) -> PermsResult<String> {
        let entity = &canonical_entity(entity)?;
        self.resolver.affix(entity, kind)
    }

    pub fn debug_permission(
        &self,
        entity: &EntityId,
        permission: &str,
        server: Option<&str>,
        world: Option<&str>,
    ) -> PermsResult<PermissionDebug> {
        let entity = &canonical_entity(entity)?;
        let scope = scope_key(server, world)?;
        self.resolver.debug_permission(entity, permission, &scope)
    }

    pub fn debug_affix(&self, entity: &EntityId, kind: AffixKind) -> PermsResult<AffixDebug> {
        let entity = &canonical_entity(entity)?;
        self.resolver.debug_affix(entity, kind)
    }

    /// Groups with stored data
    pub fn groups(&self) -> PermsResult<Vec<Arc<CachedGroup>>> {
        self.reader.groups()
    }

    pub fn default_groups(&self) -> PermsResult<Vec<Arc<CachedGroup>>> {
        self.reader.default_groups()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.resolver.stats()
    }

    // ========================================================================
    // Mutations
    // ========================================================================

    pub fn add_permission(
        &self,
        entity: &EntityId,
        permission: &str,
        server: Option<&str>,
        world: Option<&str>,
    ) -> PermsResult<()> {
        let entity = &canonical_entity(entity)?;
        self.ensure_initialized()?;
        self.writer
            .add_self_permission(entity, permission, server, world)?;
        self.invalidate(entity)
    }

    pub fn remove_permission(
        &self,
        entity: &EntityId,
        permission: &str,
        server: Option<&str>,
        world: Option<&str>,
    ) -> PermsResult<()> {
        let entity = &canonical_entity(entity)?;
        self.ensure_initialized()?;
        self.writer
            .remove_self_permission(entity, permission, server, world)?;
        self.invalidate(entity)
    }

    /// Replace or clear a prefix or suffix
    pub fn set_affix(&self, entity: &EntityId, kind: AffixKind, value: Option<&str>) -> PermsResult<()> {
        let entity = &canonical_entity(entity)?;
        self.ensure_initialized()?;
        match kind {
            AffixKind::Prefix => self.writer.set_self_prefix(entity, value)?,
            AffixKind::Suffix => self.writer.set_self_suffix(entity, value)?,
        }
        self.invalidate(entity)
    }

    pub fn add_inheritance(&self, entity: &EntityId, group: &str) -> PermsResult<()> {
        let entity = &canonical_entity(entity)?;
        self.ensure_initialized()?;
        self.writer.add_inheritance(entity, group)?;
        self.invalidate(entity)
    }

    pub fn remove_inheritance(&self, entity: &EntityId, group: &str) -> PermsResult<()> {
        let entity = &canonical_entity(entity)?;
        self.ensure_initialized()?;
        self.writer.remove_inheritance(entity, group)?;
        self.invalidate(entity)
    }

    pub fn set_inheritances<I, S>(&self, entity: &EntityId, groups: I) -> PermsResult<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let entity = &canonical_entity(entity)?;
        self.ensure_initialized()?;
        self.writer.set_inheritance(entity, groups)?;
        self.invalidate(entity)
    }

    pub fn set_group_default(&self, group: &str, default: bool) -> PermsResult<()> {
        self.ensure_initialized()?;
        self.writer.set_group_default(group, default)?;
        self.invalidate(&EntityId::group(group.trim()))
    }

    fn invalidate(&self, entity: &EntityId) -> PermsResult<()> {
        match entity.kind() {
            EntityType::User => {
                if let Ok(id) = Uuid::parse_str(entity.name()) {
                    self.reader.clear_player_cache(id);
                }
                self.resolver.clear_entity(entity);
                Ok(())
            }
            EntityType::Group => {
                debug!("Group {} changed, rebuilding group cache", entity);
                self.clear_and_reset_cache().map(|_| ())
            }
        }
    }

    // ========================================================================
    // Cache control
    // ========================================================================

    /// Evict one player from every cache
    pub fn clear_player_cache(&self, id: Uuid) {
        self.reader.clear_player_cache(id);
        self.resolver.clear_entity(&EntityId::user(id.to_string()));
    }

    /// Rebuild the group graph and flush every resolver answer
    ///
    /// Returns `Ok(false)` if another rebuild was already running.
    pub fn clear_and_reset_cache(&self) -> PermsResult<bool> {
        let rebuilt = self.reader.clear_and_reset_cache()?;
        if rebuilt {
            self.resolver.clear_all();
        }
        Ok(rebuilt)
    }

    /// Rebuild on a background thread, then call `on_done` with the outcome
    pub fn clear_and_reset_cache_async<F>(self: &Arc<Self>, on_done: F) -> std::io::Result<JoinHandle<()>>
    where
        F: FnOnce(PermsResult<bool>) + Send + 'static,
    {
        let engine = Arc::clone(self);
        self.reader.clear_and_reset_cache_async(move |result| {
            if matches!(result, Ok(true)) {
                engine.resolver.clear_all();
            }
            on_done(result);
        })
    }

    /// Drop expired entries from every cache
    pub fn purge_expired(&self) -> usize {
        self.reader.purge_expired() + self.resolver.purge_expired()
    }

    // ========================================================================
    // Special permissions
    // ========================================================================

    /// Register a special permission after every existing one
    pub fn register_special<M, T>(&self, name: &str, matcher: M, tester: T) -> SpecialKey
    where
        M: Fn(&str) -> bool + Send + Sync + 'static,
        T: Fn(&SpecialContext<'_>, &str, &ServerWorldKey) -> bool + Send + Sync + 'static,
    {
        let key = self.specials.register(name, matcher, tester);
        self.resolver.clear_permissions();
        key
    }

    /// Remove a special permission; returns `true` if it was registered
    pub fn unregister_special(&self, key: SpecialKey) -> bool {
        let removed = self.specials.unregister(key);
        if removed {
            self.resolver.clear_permissions();
        }
        removed
    }

    pub fn specials(&self) -> &SpecialPermissions {
        &self.specials
    }
}
