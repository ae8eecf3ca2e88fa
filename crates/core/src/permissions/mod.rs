//! Permission literals and special permissions
//!
//! # Permission Format
//!
//! Permissions are dot-separated, case-insensitive literals:
//! - `cmd.ban` - grants exactly `cmd.ban`
//! - `-cmd.ban` - revokes exactly `cmd.ban`
//! - `cmd.*` - grants every literal starting with `cmd.`
//! - `-cmd.*` - revokes every literal starting with `cmd.`
//! - `*` - grants everything
//!
//! Explicit and wildcard literals are independent classes: an explicit
//! literal beats a wildcard one on the same node, but two contradictory
//! literals of the same class are a conflict.
//!
//! # Special Permissions
//!
//! ```ignore
//! use permrs_core::permissions::SpecialPermissions;
//!
//! let specials = SpecialPermissions::new();
//! specials.register(
//!     "staff on duty",
//!     |literal| literal == "staff.onduty",
//!     |ctx, _literal, _scope| ctx.inherits_group("staff"),
//! );
//! ```

mod registry;
mod types;

pub use registry::{Matcher, SpecialContext, SpecialHit, SpecialKey, SpecialPermissions, Tester};
pub use types::{
    classify, normalize, split_negation, wildcard_prefix, MatchFlags, Matches, NEGATION_PREFIX,
    WILDCARD_SUFFIX,
};
