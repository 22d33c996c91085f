//! In-memory mapper and entity used by the aggregate unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use thiserror::Error;

use crate::aggregate::Aggregate;
use crate::entity::{CacheTag, Entity};
use crate::error::AggregateError;
use crate::mapper::Mapper;
use crate::value::{FieldValue, Prototype, Record, record};

#[derive(Debug, Error)]
pub enum TestEntityError {
    #[error("entity {0} already deleted")]
    Deleted(i64),
}

#[derive(Debug, Error)]
pub enum TestError {
    #[error(transparent)]
    Aggregate(#[from] AggregateError),
    #[error(transparent)]
    Entity(#[from] TestEntityError),
    #[error("backend unavailable")]
    Unavailable,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TestDependency {
    Author,
}

#[derive(Debug)]
pub struct TestEntity {
    id: i64,
    fields: RwLock<Record>,
    deleted: AtomicBool,
    precomputed: Mutex<Vec<String>>,
    dependencies: Mutex<Vec<TestDependency>>,
}

impl TestEntity {
    pub fn new(id: i64, fields: Record) -> Self {
        Self {
            id,
            fields: RwLock::new(fields),
            deleted: AtomicBool::new(false),
            precomputed: Mutex::new(Vec::new()),
            dependencies: Mutex::new(Vec::new()),
        }
    }

    pub fn scored(id: i64, score: i64) -> Arc<Self> {
        Arc::new(Self::new(
            id,
            record([("id", FieldValue::Int(id)), ("score", FieldValue::Int(score))]),
        ))
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted.load(Ordering::SeqCst)
    }

    pub fn precomputed(&self) -> Vec<String> {
        self.precomputed.lock().unwrap().clone()
    }

    pub fn dependencies(&self) -> Vec<TestDependency> {
        self.dependencies.lock().unwrap().clone()
    }
}

impl Entity for TestEntity {
    type Id = i64;
    type Error = TestEntityError;
    type Dependency = TestDependency;

    fn id(&self) -> &i64 {
        &self.id
    }

    fn cache_tags(&self) -> Vec<CacheTag> {
        vec![format!("test:{}", self.id), "test:all".to_string()]
    }

    fn as_prototype(&self) -> Prototype<i64> {
        Prototype::Record(self.fields.read().unwrap().clone())
    }

    fn field(&self, name: &str) -> Option<FieldValue> {
        self.fields.read().unwrap().get(name).cloned()
    }

    fn update(&self, params: &Record) -> Result<(), TestEntityError> {
        let mut fields = self.fields.write().unwrap();
        for (k, v) in params {
            fields.insert(k.clone(), v.clone());
        }
        Ok(())
    }

    fn delete(&self) -> Result<bool, TestEntityError> {
        if self.deleted.swap(true, Ordering::SeqCst) {
            return Err(TestEntityError::Deleted(self.id));
        }
        Ok(true)
    }

    fn precompute(&self, fields: &[&str]) -> Result<(), TestEntityError> {
        let mut done = self.precomputed.lock().unwrap();
        done.extend(fields.iter().map(|f| f.to_string()));
        Ok(())
    }

    fn load_dependency(&self, dependency: TestDependency) -> Result<(), TestEntityError> {
        self.dependencies.lock().unwrap().push(dependency);
        Ok(())
    }
}

/// Mapper over a shared table of entities, recording every call.
///
/// Fetches return entities in reverse request order to exercise the
/// no-ordering contract.
#[derive(Debug, Clone, Default)]
pub struct TestMapper {
    table: Arc<RwLock<HashMap<i64, Arc<TestEntity>>>>,
    fetches: Arc<Mutex<Vec<Vec<i64>>>>,
    updates: Arc<AtomicUsize>,
    tag_lookups: Arc<AtomicUsize>,
    fail_updates: Arc<AtomicBool>,
}

impl TestMapper {
    pub fn with_entities(ids: impl IntoIterator<Item = i64>) -> Self {
        let mapper = Self::default();
        for id in ids {
            mapper.insert(TestEntity::scored(id, id * 10));
        }
        mapper
    }

    pub fn insert(&self, entity: Arc<TestEntity>) {
        self.table.write().unwrap().insert(*entity.id(), entity);
    }

    pub fn entity(&self, id: i64) -> Arc<TestEntity> {
        self.table.read().unwrap()[&id].clone()
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetches.lock().unwrap().len()
    }

    pub fn last_fetch(&self) -> Vec<i64> {
        self.fetches.lock().unwrap().last().cloned().unwrap_or_default()
    }

    pub fn update_calls(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }

    pub fn tag_lookups(&self) -> usize {
        self.tag_lookups.load(Ordering::SeqCst)
    }

    pub fn fail_updates(&self) {
        self.fail_updates.store(true, Ordering::SeqCst);
    }
}

impl Mapper for TestMapper {
    type Entity = TestEntity;
    type Error = TestError;

    fn kind(&self) -> &str {
        "test"
    }

    fn id_field(&self) -> &str {
        "id"
    }

    fn create_entity(&self, prototype: Record) -> Result<Arc<TestEntity>, TestError> {
        let id = prototype
            .get("id")
            .and_then(FieldValue::as_i64)
            .ok_or_else(|| AggregateError::invalid_prototype("missing id"))?;
        Ok(Arc::new(TestEntity::new(id, prototype)))
    }

    fn fetch_multi_by_ids(&self, ids: &[i64]) -> Result<Vec<Arc<TestEntity>>, TestError> {
        self.fetches.lock().unwrap().push(ids.to_vec());
        let table = self.table.read().unwrap();
        Ok(ids.iter().rev().filter_map(|id| table.get(id).cloned()).collect())
    }

    fn update_aggregate(&self, _aggregate: &Aggregate<Self>) -> Result<(), TestError> {
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(TestError::Unavailable);
        }
        self.updates.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn cache_tags_for_ids(&self, ids: &[i64]) -> Result<Vec<CacheTag>, TestError> {
        self.tag_lookups.fetch_add(1, Ordering::SeqCst);
        Ok(ids.iter().map(|id| format!("test:{id}")).collect())
    }
}
