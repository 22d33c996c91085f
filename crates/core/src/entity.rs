//! Entity collaborator: identity plus the capabilities an aggregate calls on.

use core::fmt::Debug;

use crate::id::Identifier;
use crate::value::{FieldValue, Prototype, Record};

/// Opaque cache invalidation key.
pub type CacheTag = String;

/// Entity collaborator interface.
///
/// Entities are shared through `Arc` handles between the mapper and every
/// aggregate that holds them, so all operations take `&self` and entities
/// manage their own interior mutability. Field access is by name and returns a
/// [`FieldValue`]; lazily resolved relations are named by the entity's own
/// closed [`Dependency`](Entity::Dependency) set.
pub trait Entity: Send + Sync {
    /// Strongly-typed entity identifier.
    type Id: Identifier;

    /// Failure type of entity-side operations (update, delete, precompute).
    type Error: std::error::Error + Send + Sync + 'static;

    /// Lazily resolved dependencies that can be preloaded in bulk.
    type Dependency: Copy + Debug;

    /// Returns the entity identifier.
    fn id(&self) -> &Self::Id;

    /// Tags whose invalidation must invalidate anything cached from this entity.
    fn cache_tags(&self) -> Vec<CacheTag>;

    /// Reconstructable form of the entity, used to seed derived aggregates.
    fn as_prototype(&self) -> Prototype<Self::Id>;

    /// Current value of a named field, `None` if the entity has no such field.
    fn field(&self, name: &str) -> Option<FieldValue>;

    /// Apply field updates.
    fn update(&self, params: &Record) -> Result<(), Self::Error>;

    /// Delete the entity, reporting whether anything was deleted.
    fn delete(&self) -> Result<bool, Self::Error>;

    /// Compute and cache the named computed fields.
    fn precompute(&self, fields: &[&str]) -> Result<(), Self::Error>;

    /// Resolve a lazily loaded dependency.
    fn load_dependency(&self, dependency: Self::Dependency) -> Result<(), Self::Error>;
}
