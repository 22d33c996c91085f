//! Ordering, filtering, bulk entity calls and derived aggregates.

use std::borrow::Cow;

use tracing::debug;

use crate::entity::Entity;
use crate::mapper::{LoadPolicy, Mapper};
use crate::value::{FieldValue, Record};

use super::Aggregate;

impl<M: Mapper> Aggregate<M> {
    /// Reorder the loaded index by a field of each loaded entity.
    ///
    /// The sort is stable: entities with equal values keep their relative
    /// loaded order, in both directions. A missing field sorts as `Null`.
    /// Full membership order is untouched.
    pub fn sort(&mut self, field: &str, ascending: bool) {
        let mut keyed: Vec<_> = std::mem::take(&mut self.loaded_ids)
            .into_iter()
            .map(|id| {
                let value = self
                    .loaded
                    .get(&id)
                    .and_then(|entity| entity.field(field))
                    .unwrap_or_default();
                (value, id)
            })
            .collect();

        if ascending {
            keyed.sort_by(|a, b| a.0.cmp(&b.0));
        } else {
            keyed.sort_by(|a, b| b.0.cmp(&a.0));
        }
        self.loaded_ids = keyed.into_iter().map(|(_, id)| id).collect();
    }

    /// Derive an aggregate from the loaded entities that match every field in
    /// `matches` and none in `disagrees`.
    ///
    /// Only loaded entities are considered; nothing is fetched. With no
    /// criteria at all this aggregate itself is returned. Otherwise the
    /// survivors' prototypes are handed to the mapper to build a new aggregate
    /// of the same kind with no cache key.
    pub fn filter(&self, matches: &Record, disagrees: &Record) -> Result<Cow<'_, Self>, M::Error> {
        if matches.is_empty() && disagrees.is_empty() {
            return Ok(Cow::Borrowed(self));
        }

        let prototypes: Vec<_> = self
            .iter()
            .filter(|entity| {
                let value_of = |name: &str| entity.field(name).unwrap_or(FieldValue::Null);
                matches.iter().all(|(name, value)| value_of(name) == *value)
                    && disagrees.iter().all(|(name, value)| value_of(name) != *value)
            })
            .map(|entity| entity.as_prototype())
            .collect();

        debug!(
            kind = self.mapper.kind(),
            considered = self.loaded_ids.len(),
            kept = prototypes.len(),
            "aggregate filtered"
        );
        let derived = self
            .mapper
            .create_aggregate_from_prototypes(prototypes, None, LoadPolicy::Lazy)?;
        Ok(Cow::Owned(derived))
    }

    /// Apply an update to every loaded entity. Does not load anything.
    pub fn update(&self, params: &Record) -> Result<(), M::Error> {
        for entity in self.iter() {
            entity.update(params)?;
        }
        Ok(())
    }

    /// Load every member, then delete each entity.
    ///
    /// Returns the per-entity results in call order.
    pub fn delete(&mut self) -> Result<Vec<bool>, M::Error> {
        if !self.is_fully_loaded() {
            self.load_entities()?;
        }

        let mut results = Vec::with_capacity(self.loaded_ids.len());
        for entity in self.iter() {
            results.push(entity.delete()?);
        }
        debug!(kind = self.mapper.kind(), deleted = results.len(), "aggregate entities deleted");
        Ok(results)
    }

    /// Precompute the named computed fields on every loaded entity.
    pub fn preload_computed_for_entities(&self, fields: &[&str]) -> Result<(), M::Error> {
        for entity in self.iter() {
            entity.precompute(fields)?;
        }
        Ok(())
    }

    /// Resolve a lazily loaded dependency on every loaded entity.
    pub fn preload_dependency_by_callback(
        &self,
        dependency: <M::Entity as Entity>::Dependency,
    ) -> Result<(), M::Error> {
        for entity in self.iter() {
            entity.load_dependency(dependency)?;
        }
        Ok(())
    }

    /// Concatenate the memberships of several aggregates, duplicates included,
    /// into a new aggregate built by `mapper`.
    pub fn combine<'a, I>(mapper: &M, aggregates: I, cache_key: Option<String>) -> Result<Self, M::Error>
    where
        I: IntoIterator<Item = &'a Aggregate<M>>,
        M: 'a,
    {
        let ids: Vec<_> = aggregates
            .into_iter()
            .flat_map(|aggregate| aggregate.full_ids.iter().cloned())
            .collect();
        mapper.create_aggregate(ids, cache_key, LoadPolicy::Lazy)
    }

    /// New, fully loaded aggregate whose membership starts at the 1-based
    /// `offset` and wraps around: `[1,2,3,4,5]` recircled at 3 is `[3,4,5,1,2]`.
    ///
    /// Offset 0 behaves like 1, and offsets past the end wrap.
    pub fn recircle(&self, offset: usize) -> Result<Self, M::Error> {
        let mut ids = self.full_ids.clone();
        if !ids.is_empty() {
            let start = offset.saturating_sub(1) % ids.len();
            ids.rotate_left(start);
        }
        self.mapper.create_aggregate(ids, None, LoadPolicy::Eager)
    }
}
