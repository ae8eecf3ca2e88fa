//! Special permission registry
//!
//! Special permissions are computed from player state instead of being
//! read from storage. Each registration is a `(matcher, tester)` pair:
//! the matcher decides whether a literal belongs to the special
//! permission, the tester decides the answer. Registrations are consulted
//! in registration order and the first matching one wins. Testers run
//! with the registry unlocked, so they may register or query freely.

use std::sync::Arc;

use parking_lot::RwLock;
use permrs_sdk::ServerWorldKey;
use slotmap::{new_key_type, SlotMap};

use crate::reader::{CachedPlayer, GroupSnapshot};

new_key_type! {
    /// Handle for a registered special permission
    pub struct SpecialKey;
}

/// Decides whether a literal is handled by a special permission
pub type Matcher = Box<dyn Fn(&str) -> bool + Send + Sync>;

/// Decides the answer for a matched literal
pub type Tester = Box<dyn Fn(&SpecialContext<'_>, &str, &ServerWorldKey) -> bool + Send + Sync>;

/// Player state visible to a tester
pub struct SpecialContext<'a> {
    player: &'a CachedPlayer,
}

impl<'a> SpecialContext<'a> {
    pub(crate) fn new(player: &'a CachedPlayer) -> Self {
        Self { player }
    }

    /// The player being resolved
    pub fn player(&self) -> &'a CachedPlayer {
        self.player
    }

    /// The group graph the player was loaded against
    pub fn groups(&self) -> &'a GroupSnapshot {
        self.player.snapshot()
    }

    /// Check if the player is anywhere in `group`'s inheritance tree
    pub fn inherits_group(&self, group: &str) -> bool {
        self.player.inherits_group(group)
    }
}

/// Result of a special permission match
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecialHit {
    /// Registration name of the special permission that matched
    pub name: String,
    pub granted: bool,
}

struct SpecialEntry {
    name: String,
    matcher: Matcher,
    tester: Tester,
}

#[derive(Default)]
struct Registry {
    entries: SlotMap<SpecialKey, Arc<SpecialEntry>>,
    /// Evaluation order
    order: Vec<SpecialKey>,
}

/// Ordered list of special permissions
#[derive(Default)]
pub struct SpecialPermissions {
    inner: RwLock<Registry>,
}

impl SpecialPermissions {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a special permission after every existing one
    ///
    /// # Arguments
    /// * `name` - Label shown in debug traces
    /// * `matcher` - Returns `true` for literals this special permission handles
    /// * `tester` - Decides grant (`true`) or revoke (`false`) for a matched literal
    pub fn register<M, T>(&self, name: &str, matcher: M, tester: T) -> SpecialKey
    where
        M: Fn(&str) -> bool + Send + Sync + 'static,
        T: Fn(&SpecialContext<'_>, &str, &ServerWorldKey) -> bool + Send + Sync + 'static,
    {
        let mut registry = self.inner.write();
        let key = registry.entries.insert(Arc::new(SpecialEntry {
            name: name.to_string(),
            matcher: Box::new(matcher),
            tester: Box::new(tester),
        }));
        registry.order.push(key);
        tracing::debug!("Registered special permission: {}", name);
        key
    }

    /// Register the group membership special permission
    ///
    /// `<prefix><group>` is granted when the player is anywhere in
    /// `<group>`'s inheritance tree and revoked otherwise.
    pub fn register_group_membership(&self, prefix: &str) -> SpecialKey {
        let prefix = prefix.to_lowercase();
        let matcher_prefix = prefix.clone();
        let tester_prefix = prefix.clone();

        self.register(
            &format!("group membership ({}*)", prefix),
            move |literal| {
                literal
                    .strip_prefix(matcher_prefix.as_str())
                    .is_some_and(|group| !group.is_empty())
            },
            move |ctx, literal, _scope| {
                literal
                    .strip_prefix(tester_prefix.as_str())
                    .is_some_and(|group| ctx.inherits_group(group))
            },
        )
    }

    /// Remove a special permission
    ///
    /// Returns `true` if it was registered.
    pub fn unregister(&self, key: SpecialKey) -> bool {
        let mut registry = self.inner.write();
        match registry.entries.remove(key) {
            Some(entry) => {
                registry.order.retain(|k| *k != key);
                tracing::debug!("Unregistered special permission: {}", entry.name);
                true
            }
            None => false,
        }
    }

    /// Evaluate the first special permission matching `literal`
    pub fn evaluate(
        &self,
        player: &CachedPlayer,
        literal: &str,
        scope: &ServerWorldKey,
    ) -> Option<SpecialHit> {
        let entry = {
            let registry = self.inner.read();
            registry
                .order
                .iter()
                .filter_map(|key| registry.entries.get(*key))
                .find(|entry| (entry.matcher)(literal))
                .map(Arc::clone)?
        };

        let ctx = SpecialContext::new(player);
        Some(SpecialHit {
            name: entry.name.clone(),
            granted: (entry.tester)(&ctx, literal, scope),
        })
    }

    /// Registration names in evaluation order
    pub fn names(&self) -> Vec<String> {
        let registry = self.inner.read();
        registry
            .order
            .iter()
            .filter_map(|key| registry.entries.get(*key))
            .map(|entry| entry.name.clone())
            .collect()
    }

    /// Number of registered special permissions
    pub fn len(&self) -> usize {
        self.inner.read().order.len()
    }

    /// Check if no special permission is registered
    pub fn is_empty(&self) -> bool {
        self.inner.read().order.is_empty()
    }
}
