//! Server/world scope key
//!
//! Self data can be narrowed to a server, or to a world on a server.
//! The key is totally ordered with unset components sorting first, so
//! the global scope is always the smallest key.

use std::fmt;

/// `(server?, world?)` pair used for scoping self data and as a cache key
///
/// Invariant: a world is only ever set together with a server.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ServerWorldKey {
    server: Option<String>,
    world: Option<String>,
}

impl ServerWorldKey {
    /// The unscoped ("anywhere") key
    pub const fn global() -> Self {
        Self {
            server: None,
            world: None,
        }
    }

    /// Build a key, lower-casing both components
    ///
    /// Returns `None` if a world is given without a server.
    pub fn new(server: Option<&str>, world: Option<&str>) -> Option<Self> {
        if world.is_some() && server.is_none() {
            return None;
        }
        Some(Self {
            server: server.map(str::to_lowercase),
            world: world.map(str::to_lowercase),
        })
    }

    /// Key scoped to a whole server
    pub fn server(server: &str) -> Self {
        Self {
            server: Some(server.to_lowercase()),
            world: None,
        }
    }

    /// Key scoped to one world on a server
    pub fn world(server: &str, world: &str) -> Self {
        Self {
            server: Some(server.to_lowercase()),
            world: Some(world.to_lowercase()),
        }
    }

    /// Server component
    pub fn server_name(&self) -> Option<&str> {
        self.server.as_deref()
    }

    /// World component
    pub fn world_name(&self) -> Option<&str> {
        self.world.as_deref()
    }

    /// Check if this is the unscoped key
    pub fn is_global(&self) -> bool {
        self.server.is_none()
    }

    /// The next wider scope
    ///
    /// `(server, world)` widens to `(server)`, `(server)` widens to the
    /// global key, and the global key has nothing wider.
    pub fn fallback(&self) -> Option<Self> {
        match (&self.server, &self.world) {
            (Some(server), Some(_)) => Some(Self {
                server: Some(server.clone()),
                world: None,
            }),
            (Some(_), None) => Some(Self::global()),
            (None, _) => None,
        }
    }
}

impl fmt::Display for ServerWorldKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.server, &self.world) {
            (Some(server), Some(world)) => write!(f, "server '{}', world '{}'", server, world),
            (Some(server), None) => write!(f, "server '{}'", server),
            _ => f.write_str("global"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_world_requires_server() {
        assert!(ServerWorldKey::new(None, Some("nether")).is_none());
        assert_eq!(
            ServerWorldKey::new(Some("Lobby"), Some("Spawn")),
            Some(ServerWorldKey::world("lobby", "spawn"))
        );
        assert_eq!(ServerWorldKey::new(None, None), Some(ServerWorldKey::global()));
    }

    #[test]
    fn test_null_first_ordering() {
        let global = ServerWorldKey::global();
        let server = ServerWorldKey::server("a");
        let world = ServerWorldKey::world("a", "w");
        let other = ServerWorldKey::server("b");

        assert!(global < server);
        assert!(server < world);
        assert!(world < other);
    }

    #[test]
    fn test_fallback_chain() {
        let world = ServerWorldKey::world("lobby", "spawn");
        let server = world.fallback().unwrap();
        assert_eq!(server, ServerWorldKey::server("lobby"));

        let global = server.fallback().unwrap();
        assert!(global.is_global());
        assert!(global.fallback().is_none());
    }
}
