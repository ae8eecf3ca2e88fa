//! Cached backend reader
//!
//! Materializes the entity store into an in-memory graph:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                 CachedBackendReader                        │
//! │  ┌──────────────────────────┐   ┌───────────────────────┐ │
//! │  │ GroupSnapshot (Arc)       │◄──│ CachedPlayer (lazy)    │ │
//! │  │ rebuilt in full, swapped  │   │ idle-expiring, per id  │ │
//! │  └──────────────────────────┘   └───────────────────────┘ │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! Groups are loaded in bulk by [`CachedBackendReader::clear_and_reset_cache`];
//! players are loaded on first use and keep a handle to the snapshot they
//! were built against. A rebuild swaps the snapshot and drops every player
//! in one step while holding the snapshot lock.

mod entity;
mod snapshot;

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::RwLock;
use permrs_sdk::{DataKey, EntityId, EntityType, RowFilter};
use permrs_store::EntityStore;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use crate::cache::ExpiringCache;
use crate::error::{PermsError, PermsResult};

pub use entity::{AffixKind, CachedGroup, CachedPlayer, EntityData};
pub use snapshot::{GroupKey, GroupSnapshot};

/// Resets the rebuild flag even if the rebuild panics
struct RebuildGuard<'a>(&'a AtomicBool);

impl Drop for RebuildGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Read side of the engine: group graph and player snapshots
pub struct CachedBackendReader {
    store: Arc<dyn EntityStore>,
    snapshot: RwLock<Option<Arc<GroupSnapshot>>>,
    players: ExpiringCache<Uuid, Arc<CachedPlayer>>,
    rebuilding: AtomicBool,
    generation: AtomicU64,
}

impl CachedBackendReader {
    pub fn new(store: Arc<dyn EntityStore>, idle: Duration) -> Self {
        Self {
            store,
            snapshot: RwLock::new(None),
            players: ExpiringCache::new(idle),
            rebuilding: AtomicBool::new(false),
            generation: AtomicU64::new(0),
        }
    }

    /// Check if a group snapshot has been built
    pub fn is_initialized(&self) -> bool {
        self.snapshot.read().is_some()
    }

    /// Current group snapshot
    pub fn snapshot(&self) -> PermsResult<Arc<GroupSnapshot>> {
        self.snapshot
            .read()
            .as_ref()
            .map(Arc::clone)
            .ok_or(PermsError::NotInitialized)
    }

    /// Snapshot of a group; unknown names yield an empty placeholder
    pub fn cached_group(&self, name: &str) -> PermsResult<Arc<CachedGroup>> {
        Ok(self.snapshot()?.group_or_placeholder(name))
    }

    /// Snapshot of a player, loading it on a miss
    pub fn cached_player(&self, id: Uuid) -> PermsResult<Arc<CachedPlayer>> {
        let snapshot = self.snapshot()?;

        if let Some(player) = self.players.get(&id) {
            if player.snapshot().generation() == snapshot.generation() {
                trace!("Player cache hit for {}", id);
                return Ok(player);
            }
        }

        let epoch = self.players.epoch();
        let player = Arc::new(self.load_player(id, snapshot)?);
        self.players.insert_if_current(epoch, id, Arc::clone(&player));
        Ok(player)
    }

    fn load_player(&self, id: Uuid, snapshot: Arc<GroupSnapshot>) -> PermsResult<CachedPlayer> {
        let entity = EntityId::user(id.to_string());
        let rows = self
            .store
            .query_rows(&RowFilter::entity(&entity))
            .map_err(|source| PermsError::PlayerLoad { id, source })?;

        let mut data = EntityData::new(entity.name());
        let mut declared: Vec<String> = Vec::new();
        for row in &rows {
            if row.key == DataKey::Inheritances {
                let group = row.value.to_lowercase();
                if !declared.contains(&group) {
                    declared.push(group);
                }
            } else {
                data.absorb(row);
            }
        }

        let using_default_groups = declared.is_empty();
        let groups = if using_default_groups {
            snapshot.default_groups().cloned().collect()
        } else {
            declared
                .iter()
                .map(|name| snapshot.group_or_placeholder(name))
                .collect()
        };

        debug!(
            "Loaded player {} ({} rows, {} groups{})",
            id,
            rows.len(),
            declared.len(),
            if using_default_groups { ", using defaults" } else { "" }
        );
        Ok(CachedPlayer::new(
            id,
            data,
            groups,
            using_default_groups,
            snapshot,
        ))
    }

    /// Groups with stored data
    pub fn groups(&self) -> PermsResult<Vec<Arc<CachedGroup>>> {
        Ok(self.snapshot()?.groups().cloned().collect())
    }

    /// Groups flagged as default
    pub fn default_groups(&self) -> PermsResult<Vec<Arc<CachedGroup>>> {
        Ok(self.snapshot()?.default_groups().cloned().collect())
    }

    /// Every permission literal stored on any entity, positive or negated
    pub fn full_permissions_list(&self) -> PermsResult<Arc<BTreeSet<String>>> {
        Ok(Arc::clone(self.snapshot()?.permissions()))
    }

    /// Evict one player
    pub fn clear_player_cache(&self, id: Uuid) -> bool {
        let evicted = self.players.invalidate(&id);
        if evicted {
            debug!("Evicted player {} from cache", id);
        }
        evicted
    }

    /// Drop players whose idle time has run out
    pub fn purge_expired(&self) -> usize {
        self.players.purge_expired()
    }

    /// Number of cached players
    pub fn cached_player_count(&self) -> usize {
        self.players.len()
    }

    /// Rebuild the whole group graph
    ///
    /// Returns `Ok(false)` without doing anything if another rebuild is in
    /// progress. On success the new snapshot, the player cache flush and
    /// the new permission list become visible together.
    pub fn clear_and_reset_cache(&self) -> PermsResult<bool> {
        if self
            .rebuilding
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Group cache rebuild already in progress, skipping");
            return Ok(false);
        }
        let _guard = RebuildGuard(&self.rebuilding);

        let group_rows = self.store.query_rows(&RowFilter::of_kind(EntityType::Group))?;
        let user_permissions = self
            .store
            .query_rows(&RowFilter::of_kind(EntityType::User).with_key(DataKey::Permissions))?
            .into_iter()
            .map(|row| row.value);

        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        let snapshot = Arc::new(GroupSnapshot::build(group_rows, user_permissions, generation));
        let (groups, defaults, known) = (
            snapshot.len(),
            snapshot.default_groups().count(),
            snapshot.permissions().len(),
        );

        {
            let mut slot = self.snapshot.write();
            *slot = Some(snapshot);
            self.players.clear();
        }

        info!(
            "Rebuilt group cache (generation {}): {} groups, {} default, {} known permissions",
            generation, groups, defaults, known
        );
        Ok(true)
    }

    /// Rebuild the group graph on a background thread
    ///
    /// `on_done` receives the rebuild outcome. Failures are also logged.
    pub fn clear_and_reset_cache_async<F>(self: &Arc<Self>, on_done: F) -> std::io::Result<JoinHandle<()>>
    where
        F: FnOnce(PermsResult<bool>) + Send + 'static,
    {
        let reader = Arc::clone(self);
        std::thread::Builder::new()
            .name("permrs-group-rebuild".to_string())
            .spawn(move || {
                let result = reader.clear_and_reset_cache();
                if let Err(e) = &result {
                    warn!("Background group cache rebuild failed: {}", e);
                }
                on_done(result);
            })
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use permrs_sdk::EntityRow;
    use permrs_store::{Dataset, MemoryStore};

    const ALICE: &str = "8f14e45f-ceea-467f-a0e6-35b7e4a5e2b1";

    fn reader_with(dataset: &str) -> (Arc<MemoryStore>, Arc<CachedBackendReader>) {
        let store = Arc::new(MemoryStore::from_dataset(&Dataset::from_toml_str(dataset).unwrap()).unwrap());
        let reader = Arc::new(CachedBackendReader::new(store.clone(), Duration::from_secs(60)));
        (store, reader)
    }

    fn alice() -> Uuid {
        Uuid::parse_str(ALICE).unwrap()
    }

    #[test]
    fn test_not_initialized() {
        let (_, reader) = reader_with("");
        assert!(!reader.is_initialized());
        assert!(matches!(reader.cached_group("admin"), Err(PermsError::NotInitialized)));
        assert!(matches!(reader.cached_player(alice()), Err(PermsError::NotInitialized)));
    }

    #[test]
    fn test_player_uses_default_groups() {
        let (_, reader) = reader_with(
            r#"
            [groups.member]
            default = true
            [groups.admin]
            "#,
        );
        assert!(reader.clear_and_reset_cache().unwrap());

        let player = reader.cached_player(alice()).unwrap();
        assert!(player.using_default_groups);
        assert_eq!(player.group_names(), vec!["member"]);
    }

    #[test]
    fn test_player_declared_groups() {
        let (_, reader) = reader_with(&format!(
            r#"
            [groups.member]
            default = true
            [users."{ALICE}"]
            groups = ["Admin", "ghost"]
            prefix = "[A] "
            "#
        ));
        reader.clear_and_reset_cache().unwrap();

        let player = reader.cached_player(alice()).unwrap();
        assert!(!player.using_default_groups);
        assert_eq!(player.group_names(), vec!["admin", "ghost"]);
        assert!(player.groups.iter().all(|g| g.placeholder));
        assert_eq!(player.data.prefix.as_deref(), Some("[A] "));
    }

    #[test]
    fn test_player_is_cached_until_cleared() {
        let (store, reader) = reader_with("");
        reader.clear_and_reset_cache().unwrap();
        let reads = store.read_count();

        let first = reader.cached_player(alice()).unwrap();
        let second = reader.cached_player(alice()).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(store.read_count(), reads + 1);

        assert!(reader.clear_player_cache(alice()));
        let third = reader.cached_player(alice()).unwrap();
        assert!(!Arc::ptr_eq(&first, &third));
    }

    #[test]
    fn test_rebuild_drops_players_and_sees_new_rows() {
        let (store, reader) = reader_with("[groups.member]\ndefault = true\n");
        reader.clear_and_reset_cache().unwrap();
        let before = reader.cached_player(alice()).unwrap();
        assert_eq!(reader.cached_player_count(), 1);

        store
            .insert_row(EntityRow::new(&EntityId::group("vip"), DataKey::Default, "true"))
            .unwrap();
        reader.clear_and_reset_cache().unwrap();
        assert_eq!(reader.cached_player_count(), 0);

        let after = reader.cached_player(alice()).unwrap();
        assert_eq!(before.group_names(), vec!["member"]);
        assert_eq!(after.group_names(), vec!["member", "vip"]);
        assert_eq!(reader.default_groups().unwrap().len(), 2);
    }

    #[test]
    fn test_overlapping_rebuild_is_skipped() {
        let (_, reader) = reader_with("");
        reader.rebuilding.store(true, Ordering::Release);
        assert!(!reader.clear_and_reset_cache().unwrap());
        assert!(!reader.is_initialized());

        reader.rebuilding.store(false, Ordering::Release);
        assert!(reader.clear_and_reset_cache().unwrap());
    }

    #[test]
    fn test_storage_fault_wrapped_on_player_load() {
        let (store, reader) = reader_with("");
        reader.clear_and_reset_cache().unwrap();

        store.set_available(false);
        assert!(matches!(
            reader.cached_player(alice()),
            Err(PermsError::PlayerLoad { .. })
        ));
        assert!(matches!(
            reader.clear_and_reset_cache(),
            Err(PermsError::Storage(_))
        ));
        // The failed rebuild released the guard
        store.set_available(true);
        assert!(reader.clear_and_reset_cache().unwrap());
    }

    #[test]
    fn test_async_rebuild_calls_back() {
        let (_, reader) = reader_with("[groups.admin]\npermissions = [\"a\"]\n");
        let (tx, rx) = std::sync::mpsc::channel();

        let handle = reader
            .clear_and_reset_cache_async(move |result| {
                tx.send(result.is_ok()).unwrap();
            })
            .unwrap();
        handle.join().unwrap();

        assert!(rx.recv().unwrap());
        assert_eq!(reader.groups().unwrap().len(), 1);
        assert!(reader.full_permissions_list().unwrap().contains("a"));
    }
}
