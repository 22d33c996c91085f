//! In-memory mapper: documents in a shared table, aggregates stored as JSON.
//!
//! Intended for tests/dev. Not optimized for performance.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, trace};

use mapperkit_core::{
    Aggregate, AggregateError, CacheTag, Entity, FieldValue, Identifier, LoadPolicy, Mapper,
    PersistedAggregate, Record,
};

use crate::config::MapperConfig;
use crate::document::{ComputedField, Document, DocumentError, Schema, Table};

/// In-memory mapper operation error.
#[derive(Debug, Error)]
pub enum MapperError {
    #[error(transparent)]
    Aggregate(#[from] AggregateError),

    #[error(transparent)]
    Document(#[from] DocumentError),

    #[error("serialization failed: {0}")]
    Serialization(String),

    #[error("lock poisoned")]
    LockPoisoned,
}

/// Call counters, for tests and diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MapperStats {
    pub fetches: u64,
    pub fetched_ids: u64,
    pub aggregate_updates: u64,
    pub tag_lookups: u64,
}

/// Mapper over an in-memory document table.
///
/// Cloning is cheap: clones share the table, the stored aggregates and the
/// statistics.
pub struct InMemoryMapper<Id: Identifier> {
    config: MapperConfig,
    schema: Arc<Schema>,
    table: Arc<Table<Id>>,
    aggregates: Arc<RwLock<HashMap<String, String>>>,
    stats: Arc<Mutex<MapperStats>>,
}

impl<Id: Identifier> Clone for InMemoryMapper<Id> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            schema: self.schema.clone(),
            table: self.table.clone(),
            aggregates: self.aggregates.clone(),
            stats: self.stats.clone(),
        }
    }
}

impl<Id: Identifier> core::fmt::Debug for InMemoryMapper<Id> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("InMemoryMapper")
            .field("config", &self.config)
            .field("documents", &self.len())
            .finish()
    }
}

impl<Id: Identifier> InMemoryMapper<Id> {
    /// Number of stored documents.
    pub fn len(&self) -> usize {
        self.table.read().map(|t| t.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<Id> InMemoryMapper<Id>
where
    Id: Identifier + Serialize + DeserializeOwned,
{
    pub fn new(config: MapperConfig) -> Self {
        let schema = Schema {
            kind: config.kind.clone(),
            id_field: config.id_field.clone(),
            computed: HashMap::new(),
        };
        Self {
            config,
            schema: Arc::new(schema),
            table: Arc::new(RwLock::new(HashMap::new())),
            aggregates: Arc::new(RwLock::new(HashMap::new())),
            stats: Arc::new(Mutex::new(MapperStats::default())),
        }
    }

    /// Register a computed field.
    ///
    /// Documents created before the registration keep the previous set.
    pub fn with_computed<F>(mut self, name: impl Into<String>, compute: F) -> Self
    where
        F: Fn(&Record) -> FieldValue + Send + Sync + 'static,
    {
        let compute: ComputedField = Arc::new(compute);
        Arc::make_mut(&mut self.schema)
            .computed
            .insert(name.into(), compute);
        self
    }

    pub fn config(&self) -> &MapperConfig {
        &self.config
    }

    /// Store a document built from `fields`, replacing any with the same id.
    pub fn insert(&self, fields: Record) -> Result<Arc<Document<Id>>, MapperError> {
        let document = self.build(fields)?;
        self.table
            .write()
            .map_err(|_| MapperError::LockPoisoned)?
            .insert(document.id().clone(), document.clone());
        Ok(document)
    }

    pub fn get(&self, id: &Id) -> Option<Arc<Document<Id>>> {
        self.table.read().ok()?.get(id).cloned()
    }

    pub fn stats(&self) -> MapperStats {
        self.stats
            .lock()
            .map(|s| s.clone())
            .unwrap_or_default()
    }

    /// Cache key for an aggregate of this kind, derived from a query name.
    pub fn aggregate_cache_key(&self, discriminator: &str) -> String {
        format!("{}:aggregate:{}", self.config.kind, discriminator)
    }

    /// Stored representation of the aggregate saved under `cache_key`.
    pub fn stored_aggregate(
        &self,
        cache_key: &str,
    ) -> Result<Option<PersistedAggregate<Id>>, MapperError> {
        let stored = self
            .aggregates
            .read()
            .map_err(|_| MapperError::LockPoisoned)?;
        stored
            .get(cache_key)
            .map(|json| {
                serde_json::from_str(json).map_err(|e| MapperError::Serialization(e.to_string()))
            })
            .transpose()
    }

    /// Rebuild the aggregate saved under `cache_key`, if any.
    pub fn load_aggregate(
        &self,
        cache_key: &str,
        load: LoadPolicy,
    ) -> Result<Option<Aggregate<Self>>, MapperError> {
        let Some(persisted) = self.stored_aggregate(cache_key)? else {
            return Ok(None);
        };
        let ids = persisted.full_ids;
        self.create_aggregate(ids, persisted.cache_key, load).map(Some)
    }

    fn build(&self, fields: Record) -> Result<Arc<Document<Id>>, MapperError> {
        let id_field = &self.config.id_field;
        let raw = fields.get(id_field).ok_or_else(|| {
            AggregateError::invalid_prototype(format!("record has no '{id_field}' field"))
        })?;
        let id = Id::from_field_value(raw).ok_or_else(|| {
            AggregateError::invalid_prototype(format!("'{id_field}' holds an unusable id: {raw:?}"))
        })?;

        Ok(Arc::new(Document::new(
            id,
            fields,
            self.schema.clone(),
            Arc::downgrade(&self.table),
        )))
    }

    fn record_stats(&self, f: impl FnOnce(&mut MapperStats)) {
        if let Ok(mut stats) = self.stats.lock() {
            f(&mut stats);
        }
    }
}

impl<Id> Mapper for InMemoryMapper<Id>
where
    Id: Identifier + Serialize + DeserializeOwned,
{
    type Entity = Document<Id>;
    type Error = MapperError;

    fn kind(&self) -> &str {
        &self.config.kind
    }

    fn id_field(&self) -> &str {
        &self.config.id_field
    }

    fn items_per_page(&self) -> usize {
        self.config.items_per_page
    }

    fn create_entity(&self, prototype: Record) -> Result<Arc<Document<Id>>, MapperError> {
        self.build(prototype)
    }

    fn fetch_multi_by_ids(&self, ids: &[Id]) -> Result<Vec<Arc<Document<Id>>>, MapperError> {
        let table = self.table.read().map_err(|_| MapperError::LockPoisoned)?;
        let found: Vec<_> = ids.iter().filter_map(|id| table.get(id).cloned()).collect();

        self.record_stats(|s| {
            s.fetches += 1;
            s.fetched_ids += found.len() as u64;
        });
        trace!(kind = %self.config.kind, requested = ids.len(), found = found.len(), "fetch by ids");
        Ok(found)
    }

    /// Saves keyed aggregates as JSON; derived aggregates have no key and are
    /// not stored.
    fn update_aggregate(&self, aggregate: &Aggregate<Self>) -> Result<(), MapperError> {
        self.record_stats(|s| s.aggregate_updates += 1);

        let Some(cache_key) = aggregate.cache_key() else {
            trace!(kind = %self.config.kind, "uncached aggregate, nothing to store");
            return Ok(());
        };
        let json = aggregate.to_json()?;
        self.aggregates
            .write()
            .map_err(|_| MapperError::LockPoisoned)?
            .insert(cache_key.to_string(), json);

        debug!(kind = %self.config.kind, cache_key, total = aggregate.total_count(), "aggregate stored");
        Ok(())
    }

    fn cache_tags_for_ids(&self, ids: &[Id]) -> Result<Vec<CacheTag>, MapperError> {
        self.record_stats(|s| s.tag_lookups += 1);
        Ok(ids.iter().map(|id| self.schema.tag_for(id)).collect())
    }
}
