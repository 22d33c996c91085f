//! Compact stored form of an aggregate.
//!
//! Only the kind tag, the membership and the cache key are kept. Loaded
//! entities, the snapshot slot and the cursor are not: a rehydrated aggregate
//! starts lazy unless the caller asks for [`LoadPolicy::Eager`].

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::AggregateError;
use crate::mapper::{IdOf, LoadPolicy, Mapper, MapperRegistry};

use super::Aggregate;

/// Stored representation of an aggregate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedAggregate<Id> {
    /// Kind tag used to find the mapper again.
    pub kind: String,
    pub full_ids: Vec<Id>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_key: Option<String>,
}

impl<M: Mapper> Aggregate<M> {
    pub fn to_persisted(&self) -> PersistedAggregate<IdOf<M>> {
        PersistedAggregate {
            kind: self.mapper.kind().to_string(),
            full_ids: self.full_ids.clone(),
            cache_key: self.cache_key.clone(),
        }
    }

    /// Rebuild an aggregate, resolving its mapper through `registry` by kind.
    pub fn rehydrate<R>(
        persisted: PersistedAggregate<IdOf<M>>,
        registry: &R,
        load: LoadPolicy,
    ) -> Result<Self, M::Error>
    where
        R: MapperRegistry<M> + ?Sized,
    {
        let PersistedAggregate {
            kind,
            full_ids,
            cache_key,
        } = persisted;

        let mapper = registry
            .mapper_for(&kind)
            .ok_or_else(|| AggregateError::unknown_kind(kind.as_str()))?;

        debug!(kind = %kind, total = full_ids.len(), ?load, "rehydrating aggregate");
        Self::from_ids(full_ids, mapper, cache_key, load)
    }

    /// Encode the stored representation as JSON.
    pub fn to_json(&self) -> Result<String, AggregateError>
    where
        IdOf<M>: Serialize,
    {
        serde_json::to_string(&self.to_persisted())
            .map_err(|e| AggregateError::invalid_persisted_state(e.to_string()))
    }

    /// Decode JSON produced by [`Aggregate::to_json`] and rehydrate it.
    pub fn from_json<R>(json: &str, registry: &R, load: LoadPolicy) -> Result<Self, M::Error>
    where
        R: MapperRegistry<M> + ?Sized,
        IdOf<M>: DeserializeOwned,
    {
        let persisted: PersistedAggregate<IdOf<M>> = serde_json::from_str(json)
            .map_err(|e| AggregateError::invalid_persisted_state(e.to_string()))?;
        Self::rehydrate(persisted, registry, load)
    }
}
