//! Entity handles
//!
//! [`Player`] and [`Group`] are cheap handles over a shared
//! [`PermissionEngine`]. Everything common to both lives in the
//! [`PermissionEntity`] trait.
//!
//! # Example
//!
//! ```ignore
//! use permrs_core::{PermissionEngine, PermissionEntity};
//!
//! let player = engine.player(id);
//! if player.has_permission_or("cmd.ban", Some("lobby"), None, false)? {
//!     // ...
//! }
//! let prefix = player.prefix()?;
//! ```

mod group;
mod player;

use std::collections::BTreeMap;
use std::sync::Arc;

use permrs_sdk::EntityId;

use crate::engine::PermissionEngine;
use crate::error::PermsResult;
use crate::reader::AffixKind;
use crate::resolver::{AffixDebug, PermissionDebug};

pub use group::Group;
pub use player::Player;

/// Queries and self-data mutations shared by players and groups
pub trait PermissionEntity {
    fn engine(&self) -> &PermissionEngine;

    fn entity(&self) -> &EntityId;

    /// Resolve a permission; `None` means undefined
    fn has_permission(
        &self,
        permission: &str,
        server: Option<&str>,
        world: Option<&str>,
    ) -> PermsResult<Option<bool>> {
        self.engine()
            .has_permission(self.entity(), permission, server, world)
    }

    /// Resolve a permission, using `default` when undefined
    fn has_permission_or(
        &self,
        permission: &str,
        server: Option<&str>,
        world: Option<&str>,
        default: bool,
    ) -> PermsResult<bool> {
        Ok(self
            .has_permission(permission, server, world)?
            .unwrap_or(default))
    }

    /// Evaluate a permission expression such as `cmd.ban && !cmd.stop`
    fn has_permission_expression(
        &self,
        expr: &str,
        server: Option<&str>,
        world: Option<&str>,
    ) -> PermsResult<bool> {
        self.engine()
            .has_permission_expression(self.entity(), expr, server, world)
    }

    /// Effective prefix, empty when undefined
    fn prefix(&self) -> PermsResult<String> {
        self.engine().affix(self.entity(), AffixKind::Prefix)
    }

    /// Effective suffix, empty when undefined
    fn suffix(&self) -> PermsResult<String> {
        self.engine().affix(self.entity(), AffixKind::Suffix)
    }

    fn effective_permissions(
        &self,
        server: Option<&str>,
        world: Option<&str>,
    ) -> PermsResult<Arc<BTreeMap<String, bool>>> {
        self.engine()
            .effective_permissions(self.entity(), server, world)
    }

    fn debug_permission(
        &self,
        permission: &str,
        server: Option<&str>,
        world: Option<&str>,
    ) -> PermsResult<PermissionDebug> {
        self.engine()
            .debug_permission(self.entity(), permission, server, world)
    }

    fn debug_prefix(&self) -> PermsResult<AffixDebug> {
        self.engine().debug_affix(self.entity(), AffixKind::Prefix)
    }

    fn debug_suffix(&self) -> PermsResult<AffixDebug> {
        self.engine().debug_affix(self.entity(), AffixKind::Suffix)
    }

    fn add_permission(&self, permission: &str, server: Option<&str>, world: Option<&str>) -> PermsResult<()> {
        self.engine()
            .add_permission(self.entity(), permission, server, world)
    }

    fn remove_permission(
        &self,
        permission: &str,
        server: Option<&str>,
        world: Option<&str>,
    ) -> PermsResult<()> {
        self.engine()
            .remove_permission(self.entity(), permission, server, world)
    }

    fn set_prefix(&self, prefix: Option<&str>) -> PermsResult<()> {
        self.engine()
            .set_affix(self.entity(), AffixKind::Prefix, prefix)
    }

    fn set_suffix(&self, suffix: Option<&str>) -> PermsResult<()> {
        self.engine()
            .set_affix(self.entity(), AffixKind::Suffix, suffix)
    }
}
