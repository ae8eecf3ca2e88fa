//! Entity identity
//!
//! Every row in the store and every cached snapshot belongs to exactly one
//! entity, identified by its name and its type.

use std::fmt;
use std::str::FromStr;

/// Kind of entity a row belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EntityType {
    /// A player, named by its stringified unique id
    User,
    /// A permission group, named by its own name
    Group,
}

impl EntityType {
    /// Storage representation
    pub const fn as_str(self) -> &'static str {
        match self {
            EntityType::User => "user",
            EntityType::Group => "group",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "user" | "player" => Ok(EntityType::User),
            "group" => Ok(EntityType::Group),
            other => Err(format!("unknown entity type: {}", other)),
        }
    }
}

/// Immutable `(name, type)` identity of an entity
///
/// Names are case-folded to lower-case on construction, which makes the
/// whole system case-insensitive.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntityId {
    name: String,
    kind: EntityType,
}

impl EntityId {
    /// Create an identity, lower-casing the name
    pub fn new(name: impl AsRef<str>, kind: EntityType) -> Self {
        Self {
            name: name.as_ref().to_lowercase(),
            kind,
        }
    }

    /// Identity of a user by its stringified id
    pub fn user(name: impl AsRef<str>) -> Self {
        Self::new(name, EntityType::User)
    }

    /// Identity of a group
    pub fn group(name: impl AsRef<str>) -> Self {
        Self::new(name, EntityType::Group)
    }

    /// Lower-cased entity name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Entity type
    pub fn kind(&self) -> EntityType {
        self.kind
    }

    /// Check if this identity refers to a user
    pub fn is_user(&self) -> bool {
        self.kind == EntityType::User
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} '{}'", self.kind, self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_is_case_folded() {
        let id = EntityId::group("Admin");
        assert_eq!(id.name(), "admin");
        assert_eq!(id, EntityId::group("ADMIN"));
        assert_ne!(id, EntityId::user("admin"));
    }

    #[test]
    fn test_entity_type_parse() {
        assert_eq!("group".parse::<EntityType>(), Ok(EntityType::Group));
        assert_eq!("User".parse::<EntityType>(), Ok(EntityType::User));
        assert_eq!("player".parse::<EntityType>(), Ok(EntityType::User));
        assert!("world".parse::<EntityType>().is_err());
    }
}
