//! Lazily materialized, ordered collection of entities.
//!
//! An [`Aggregate`] tracks two id indices:
//!
//! - **full ids**: every member, in canonical order. Duplicates are allowed and
//!   preserved. This is the source of truth for [`Aggregate::total_count`].
//! - **loaded ids**: the members whose entities are materialized, each mapped
//!   to an entity handle. After partial loads this order follows fetch order,
//!   not full order, and consumers must not assume the two line up.
//!
//! The aggregate never talks to storage itself. Fetching, persisting membership,
//! building entities and resolving cache tags all go through its [`Mapper`].

mod cache;
mod cursor;
mod derive;
mod loader;
mod mutation;
mod persist;

#[cfg(test)]
pub(crate) mod test_support;

use std::collections::HashMap;
use std::sync::Arc;

use rand::Rng;
use rand::seq::SliceRandom;
use tracing::debug;
use uuid::Uuid;

use crate::entity::Entity;
use crate::error::AggregateError;
use crate::mapper::{IdOf, LoadPolicy, Mapper};
use crate::value::Prototype;

use mutation::SavedState;

pub use cursor::Iter;
pub use persist::PersistedAggregate;

/// Result of looking up a member by id.
#[derive(Debug)]
pub enum EntityLookup<'a, E> {
    /// The id is not a member of the aggregate.
    NotMember,
    /// The id is a member but its entity is not materialized.
    NotLoaded,
    /// The id is a member and its entity is loaded.
    Found(&'a Arc<E>),
}

impl<'a, E> EntityLookup<'a, E> {
    pub fn found(self) -> Option<&'a Arc<E>> {
        match self {
            EntityLookup::Found(entity) => Some(entity),
            _ => None,
        }
    }
}

/// Ordered, partially materializable collection of entities of one kind.
pub struct Aggregate<M: Mapper> {
    mapper: M,
    full_ids: Vec<IdOf<M>>,
    loaded_ids: Vec<IdOf<M>>,
    loaded: HashMap<IdOf<M>, Arc<M::Entity>>,
    cache_key: Option<String>,
    snapshot: Option<SavedState<IdOf<M>, M::Entity>>,
    cursor: usize,
    instance_token: String,
}

impl<M: Mapper> Aggregate<M> {
    /// Build an aggregate from prototypes.
    ///
    /// Structured prototypes (id plus other fields) are turned into entities
    /// right away through [`Mapper::create_entity`]. With [`LoadPolicy::Eager`]
    /// the remaining members are then fetched in a single bulk call.
    pub fn new<I>(
        prototypes: I,
        mapper: M,
        cache_key: Option<String>,
        load: LoadPolicy,
    ) -> Result<Self, M::Error>
    where
        I: IntoIterator<Item = Prototype<IdOf<M>>>,
    {
        let mut aggregate = Self::empty(mapper, cache_key);
        let id_field = aggregate.mapper.id_field().to_string();

        for prototype in prototypes {
            let id = prototype.identifier(&id_field)?;
            aggregate.full_ids.push(id.clone());

            if prototype.is_structured() {
                let entity = aggregate
                    .mapper
                    .create_entity(prototype.into_record(&id_field))?;
                if entity.id() != &id {
                    return Err(AggregateError::invalid_prototype(format!(
                        "mapper built entity {:?} for prototype {:?}",
                        entity.id(),
                        id
                    ))
                    .into());
                }
                aggregate.register(entity);
            }
        }

        if load == LoadPolicy::Eager && !aggregate.is_fully_loaded() {
            aggregate.load_entities()?;
        }

        debug!(
            kind = aggregate.mapper.kind(),
            total = aggregate.full_ids.len(),
            loaded = aggregate.loaded_ids.len(),
            cache_key = aggregate.cache_key.as_deref(),
            "aggregate constructed"
        );
        Ok(aggregate)
    }

    /// Build a lazy aggregate from bare ids.
    pub fn from_ids<I>(
        ids: I,
        mapper: M,
        cache_key: Option<String>,
        load: LoadPolicy,
    ) -> Result<Self, M::Error>
    where
        I: IntoIterator<Item = IdOf<M>>,
    {
        Self::new(ids.into_iter().map(Prototype::Id), mapper, cache_key, load)
    }

    fn empty(mapper: M, cache_key: Option<String>) -> Self {
        Self {
            mapper,
            full_ids: Vec::new(),
            loaded_ids: Vec::new(),
            loaded: HashMap::new(),
            cache_key,
            snapshot: None,
            cursor: 0,
            instance_token: Uuid::now_v7().to_string(),
        }
    }

    /// Put an entity into the loaded index, replacing any handle for the same id.
    fn register(&mut self, entity: Arc<M::Entity>) {
        let id = entity.id().clone();
        if self.loaded.insert(id.clone(), entity).is_none() {
            self.loaded_ids.push(id);
        }
    }

    pub fn mapper(&self) -> &M {
        &self.mapper
    }

    pub fn kind(&self) -> &str {
        self.mapper.kind()
    }

    /// Number of materialized entities.
    pub fn count(&self) -> usize {
        self.loaded_ids.len()
    }

    /// Number of members, loaded or not.
    pub fn total_count(&self) -> usize {
        self.full_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.full_ids.is_empty()
    }

    /// Whether every member has a materialized entity.
    pub fn is_fully_loaded(&self) -> bool {
        self.full_ids.iter().all(|id| self.loaded.contains_key(id))
    }

    pub fn full_ids(&self) -> &[IdOf<M>] {
        &self.full_ids
    }

    pub fn loaded_ids(&self) -> &[IdOf<M>] {
        &self.loaded_ids
    }

    /// Look up a member, distinguishing "not a member" from "not loaded".
    pub fn lookup(&self, id: &IdOf<M>) -> EntityLookup<'_, M::Entity> {
        if !self.full_ids.contains(id) {
            return EntityLookup::NotMember;
        }
        match self.loaded.get(id) {
            Some(entity) => EntityLookup::Found(entity),
            None => EntityLookup::NotLoaded,
        }
    }

    /// Loaded entity for `id`, or `None` if it is not a member or not loaded.
    pub fn get_entity_by_id(&self, id: &IdOf<M>) -> Option<&Arc<M::Entity>> {
        self.lookup(id).found()
    }

    /// Whether the entity's id is a member, optionally only if it is loaded.
    pub fn entity_exists(&self, entity: &M::Entity, only_loaded: bool) -> bool {
        self.get_entity_index(entity, only_loaded).is_some()
    }

    /// Position of the entity's id in the full membership.
    pub fn get_entity_index(&self, entity: &M::Entity, only_loaded: bool) -> Option<usize> {
        let id = entity.id();
        let index = self.full_ids.iter().position(|member| member == id)?;
        if only_loaded && !self.loaded.contains_key(id) {
            return None;
        }
        Some(index)
    }

    /// Uniformly chosen loaded entity.
    pub fn random_entity<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<&Arc<M::Entity>> {
        self.loaded_ids
            .choose(rng)
            .and_then(|id| self.loaded.get(id))
    }

    /// Drop every materialized entity, keeping membership.
    pub fn clear_loaded_entities(&mut self) {
        self.loaded.clear();
        self.loaded_ids.clear();
        self.cursor = 0;
    }
}

impl<M: Mapper> Clone for Aggregate<M> {
    fn clone(&self) -> Self {
        Self {
            mapper: self.mapper.clone(),
            full_ids: self.full_ids.clone(),
            loaded_ids: self.loaded_ids.clone(),
            loaded: self.loaded.clone(),
            cache_key: self.cache_key.clone(),
            snapshot: self.snapshot.clone(),
            cursor: self.cursor,
            // A clone is a distinct object and gets its own identity.
            instance_token: Uuid::now_v7().to_string(),
        }
    }
}

impl<M: Mapper> core::fmt::Debug for Aggregate<M> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Aggregate")
            .field("kind", &self.mapper.kind())
            .field("full_ids", &self.full_ids)
            .field("loaded_ids", &self.loaded_ids)
            .field("cache_key", &self.cache_key)
            .field("has_snapshot", &self.snapshot.is_some())
            .finish()
    }
}

impl<M: Mapper> core::fmt::Display for Aggregate<M> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{} of {} element(s)", self.mapper.kind(), self.count())
    }
}
