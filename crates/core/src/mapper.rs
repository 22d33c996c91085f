//! Mapper collaborator: entity construction, bulk fetch, persistence and cache
//! tag resolution for one aggregate kind.

use std::sync::Arc;

use crate::aggregate::Aggregate;
use crate::entity::{CacheTag, Entity};
use crate::error::AggregateError;
use crate::value::{Prototype, Record};

/// Default page size used by [`Aggregate::load_entities_for_current_page`].
pub const DEFAULT_ITEMS_PER_PAGE: usize = 10;

/// Identifier type of a mapper's entities.
pub type IdOf<M> = <<M as Mapper>::Entity as Entity>::Id;

/// Whether an aggregate should materialize its entities when it is built.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub enum LoadPolicy {
    /// Keep only ids; entities are fetched on demand.
    #[default]
    Lazy,
    /// Fetch every entity not already built from a prototype.
    Eager,
}

/// Data mapper for one aggregate kind.
///
/// Mappers are cheap handles (`Clone`): every aggregate keeps its own copy and
/// calls back into it synchronously. All I/O lives behind this trait; the
/// aggregate never wraps or retries a mapper failure.
pub trait Mapper: Clone + Send + Sync + Sized {
    type Entity: Entity;

    /// Mapper failure type.
    ///
    /// Must absorb the aggregate core's own errors and the entity's errors, so
    /// a single error type flows out of every aggregate operation.
    type Error: std::error::Error
        + From<AggregateError>
        + From<<Self::Entity as Entity>::Error>;

    /// Kind tag stored with persisted aggregates and used to find this mapper
    /// again on rehydration.
    fn kind(&self) -> &str;

    /// Name of the prototype field that holds the entity identifier.
    fn id_field(&self) -> &str;

    /// Page size used when a caller does not pass one.
    fn items_per_page(&self) -> usize {
        DEFAULT_ITEMS_PER_PAGE
    }

    /// Build an entity from a structured prototype, without any fetch.
    fn create_entity(&self, prototype: Record) -> Result<Arc<Self::Entity>, Self::Error>;

    /// Fetch entities in bulk.
    ///
    /// Result order is unspecified and missing ids are simply absent.
    fn fetch_multi_by_ids(
        &self,
        ids: &[IdOf<Self>],
    ) -> Result<Vec<Arc<Self::Entity>>, Self::Error>;

    /// Build an aggregate of this mapper's kind from prototypes.
    fn create_aggregate_from_prototypes(
        &self,
        prototypes: Vec<Prototype<IdOf<Self>>>,
        cache_key: Option<String>,
        load: LoadPolicy,
    ) -> Result<Aggregate<Self>, Self::Error> {
        Aggregate::new(prototypes, self.clone(), cache_key, load)
    }

    /// Build an aggregate of this mapper's kind from bare ids.
    fn create_aggregate(
        &self,
        ids: Vec<IdOf<Self>>,
        cache_key: Option<String>,
        load: LoadPolicy,
    ) -> Result<Aggregate<Self>, Self::Error> {
        let prototypes = ids.into_iter().map(Prototype::Id).collect();
        self.create_aggregate_from_prototypes(prototypes, cache_key, load)
    }

    /// Persist the aggregate's current membership.
    fn update_aggregate(&self, aggregate: &Aggregate<Self>) -> Result<(), Self::Error>;

    /// Cache tags for a list of ids, resolved without materializing entities.
    fn cache_tags_for_ids(&self, ids: &[IdOf<Self>]) -> Result<Vec<CacheTag>, Self::Error>;
}

/// Resolves a mapper from the kind tag of a persisted aggregate.
pub trait MapperRegistry<M: Mapper> {
    fn mapper_for(&self, kind: &str) -> Option<M>;
}

impl<M, R> MapperRegistry<M> for Arc<R>
where
    M: Mapper,
    R: MapperRegistry<M> + ?Sized,
{
    fn mapper_for(&self, kind: &str) -> Option<M> {
        (**self).mapper_for(kind)
    }
}
