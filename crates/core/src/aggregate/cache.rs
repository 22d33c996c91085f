//! Cache key and invalidation tags.

use std::collections::HashSet;

use crate::entity::{CacheTag, Entity};
use crate::mapper::Mapper;

use super::Aggregate;

impl<M: Mapper> Aggregate<M> {
    /// Key assigned by the mapper; `None` for derived aggregates.
    pub fn cache_key(&self) -> Option<&str> {
        self.cache_key.as_deref()
    }

    /// Tags whose invalidation must invalidate this aggregate.
    ///
    /// A partially loaded aggregate asks the mapper for the tags of its full
    /// membership rather than forcing a load. A fully loaded one unions the
    /// tags of its entities, keeping first-seen order.
    pub fn cache_tags(&self) -> Result<Vec<CacheTag>, M::Error> {
        if !self.is_fully_loaded() {
            return self.mapper.cache_tags_for_ids(&self.full_ids);
        }

        let mut seen = HashSet::new();
        let mut tags = Vec::new();
        for entity in self.iter() {
            for tag in entity.cache_tags() {
                if seen.insert(tag.clone()) {
                    tags.push(tag);
                }
            }
        }
        Ok(tags)
    }
}
