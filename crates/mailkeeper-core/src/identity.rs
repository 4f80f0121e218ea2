//! Identity lookup seam.
//!
//! ACL entries name users and groups by string identifiers. The engine
//! keys reconciliation by resolved [`Entity`] so that two spellings of the
//! same identity compare equal. Lookup failures never abort an operation;
//! the entry is treated as unknown and skipped.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// A resolved user or group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Entity {
    /// Numeric id in the user directory.
    pub id: i64,
    /// Whether the id names a group.
    pub group: bool,
}

impl Entity {
    /// A user entity.
    #[must_use]
    pub const fn user(id: i64) -> Self {
        Self { id, group: false }
    }

    /// A group entity.
    #[must_use]
    pub const fn group(id: i64) -> Self {
        Self { id, group: true }
    }
}

/// Why an identifier could not be resolved.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdentityError {
    /// The directory has no such identifier.
    #[error("Unknown identity: {0}")]
    Unknown(String),
    /// The directory lookup itself failed.
    #[error("Identity lookup failed: {0}")]
    Lookup(String),
}

/// User/group directory.
pub trait IdentityService: Send + Sync + std::fmt::Debug {
    /// Resolves an ACL identifier.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError`] when the identifier is unknown or the
    /// lookup failed.
    fn resolve_entity(&self, name: &str) -> Result<Entity, IdentityError>;

    /// Returns the ACL identifier for an entity.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError`] when the entity is unknown or the lookup
    /// failed.
    fn name_for(&self, entity: Entity) -> Result<String, IdentityError>;
}

/// In-memory directory.
#[derive(Debug, Clone, Default)]
pub struct StaticDirectory {
    by_name: HashMap<String, Entity>,
    by_entity: HashMap<Entity, String>,
}

impl StaticDirectory {
    /// Creates an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an identity. Aliases may map several names to one entity; the
    /// first name registered is the canonical one.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, entity: Entity) -> Self {
        let name = name.into();
        self.by_entity.entry(entity).or_insert_with(|| name.clone());
        self.by_name.insert(name, entity);
        self
    }
}

impl IdentityService for StaticDirectory {
    fn resolve_entity(&self, name: &str) -> Result<Entity, IdentityError> {
        self.by_name
            .get(name)
            .copied()
            .ok_or_else(|| IdentityError::Unknown(name.to_string()))
    }

    fn name_for(&self, entity: Entity) -> Result<String, IdentityError> {
        self.by_entity
            .get(&entity)
            .cloned()
            .ok_or_else(|| IdentityError::Unknown(format!("{entity:?}")))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn aliases_share_an_entity() {
        let dir = StaticDirectory::new()
            .with("alice", Entity::user(1))
            .with("alice@example.com", Entity::user(1));

        assert_eq!(
            dir.resolve_entity("alice@example.com").unwrap(),
            dir.resolve_entity("alice").unwrap()
        );
        assert_eq!(dir.name_for(Entity::user(1)).unwrap(), "alice");
    }

    #[test]
    fn unknown_identity() {
        let dir = StaticDirectory::new();
        assert!(matches!(
            dir.resolve_entity("ghost"),
            Err(IdentityError::Unknown(_))
        ));
    }
}
