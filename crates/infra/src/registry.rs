//! Kind-tag registry used to rehydrate persisted aggregates.

use std::collections::HashMap;
use std::sync::RwLock;

use tracing::debug;

use mapperkit_core::{Mapper, MapperRegistry};

/// In-memory registry of mappers keyed by their kind tag.
#[derive(Debug)]
pub struct InMemoryMapperRegistry<M> {
    inner: RwLock<HashMap<String, M>>,
}

impl<M> InMemoryMapperRegistry<M> {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }
}

impl<M> Default for InMemoryMapperRegistry<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: Mapper> InMemoryMapperRegistry<M> {
    /// Register a mapper under its own kind, replacing any previous one.
    pub fn register(&self, mapper: M) {
        let kind = mapper.kind().to_string();
        if let Ok(mut map) = self.inner.write() {
            debug!(kind = %kind, "mapper registered");
            map.insert(kind, mapper);
        }
    }

    pub fn kinds(&self) -> Vec<String> {
        let map = match self.inner.read() {
            Ok(m) => m,
            Err(_) => return vec![],
        };
        let mut kinds: Vec<_> = map.keys().cloned().collect();
        kinds.sort();
        kinds
    }
}

impl<M: Mapper> MapperRegistry<M> for InMemoryMapperRegistry<M> {
    fn mapper_for(&self, kind: &str) -> Option<M> {
        self.inner.read().ok()?.get(kind).cloned()
    }
}
