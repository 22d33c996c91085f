//! Schemaless entity backed by a field record.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock, Weak};

use thiserror::Error;

use mapperkit_core::{CacheTag, Entity, FieldValue, Identifier, Prototype, Record};

/// Field holding the id of a document's parent.
pub const PARENT_FIELD: &str = "parent_id";

/// Function computing a derived field from a document's stored fields.
pub type ComputedField = Arc<dyn Fn(&Record) -> FieldValue + Send + Sync>;

/// Shared table of stored documents.
pub(crate) type Table<Id> = RwLock<HashMap<Id, Arc<Document<Id>>>>;

/// Document operation error.
#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("document {0} is deleted")]
    Deleted(String),

    #[error("field '{0}' holds the id and cannot be changed")]
    IdChange(String),

    #[error("unknown computed field '{0}'")]
    UnknownComputed(String),

    #[error("document {0} references missing parent {1}")]
    DanglingReference(String, String),

    #[error("document table is no longer available")]
    Detached,

    #[error("lock poisoned")]
    LockPoisoned,
}

/// Lazily resolved relations of a document.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum DocumentDependency {
    /// The document named by [`PARENT_FIELD`].
    Parent,
}

/// Per-kind settings shared by every document of a mapper.
#[derive(Clone)]
pub(crate) struct Schema {
    pub(crate) kind: String,
    pub(crate) id_field: String,
    pub(crate) computed: HashMap<String, ComputedField>,
}

impl Schema {
    pub(crate) fn tag_for<Id: Identifier>(&self, id: &Id) -> CacheTag {
        match id.to_field_value() {
            FieldValue::Text(s) => format!("{}:{}", self.kind, s),
            FieldValue::Int(i) => format!("{}:{}", self.kind, i),
            other => format!("{}:{:?}", self.kind, other),
        }
    }
}

/// A document: an id plus a record of fields.
///
/// Documents are shared between the mapper's table and any aggregate holding
/// them, so every operation works through `&self`.
pub struct Document<Id: Identifier> {
    id: Id,
    schema: Arc<Schema>,
    table: Weak<Table<Id>>,
    fields: RwLock<Record>,
    computed: RwLock<Record>,
    parent: RwLock<Weak<Document<Id>>>,
    deleted: AtomicBool,
}

impl<Id: Identifier> Document<Id> {
    pub(crate) fn new(id: Id, fields: Record, schema: Arc<Schema>, table: Weak<Table<Id>>) -> Self {
        Self {
            id,
            schema,
            table,
            fields: RwLock::new(fields),
            computed: RwLock::new(Record::new()),
            parent: RwLock::new(Weak::new()),
            deleted: AtomicBool::new(false),
        }
    }

    pub fn kind(&self) -> &str {
        &self.schema.kind
    }

    /// Copy of the stored fields.
    pub fn fields(&self) -> Record {
        self.fields
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Parent resolved by [`DocumentDependency::Parent`], if loaded and still
    /// alive. The link is weak, so documents referencing each other can drop.
    pub fn parent(&self) -> Option<Arc<Document<Id>>> {
        self.parent.read().ok()?.upgrade()
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted.load(Ordering::SeqCst)
    }

    fn ensure_live(&self) -> Result<(), DocumentError> {
        if self.is_deleted() {
            return Err(DocumentError::Deleted(format!("{:?}", self.id)));
        }
        Ok(())
    }

    fn load_parent(&self) -> Result<(), DocumentError> {
        let Some(raw) = self.field(PARENT_FIELD).filter(|v| !v.is_null()) else {
            return Ok(());
        };
        let dangling = || DocumentError::DanglingReference(format!("{:?}", self.id), format!("{raw:?}"));
        let parent_id = Id::from_field_value(&raw).ok_or_else(dangling)?;

        let table = self.table.upgrade().ok_or(DocumentError::Detached)?;
        let parent = table
            .read()
            .map_err(|_| DocumentError::LockPoisoned)?
            .get(&parent_id)
            .cloned()
            .ok_or_else(dangling)?;

        *self.parent.write().map_err(|_| DocumentError::LockPoisoned)? = Arc::downgrade(&parent);
        Ok(())
    }
}

impl<Id: Identifier> core::fmt::Debug for Document<Id> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Document")
            .field("kind", &self.schema.kind)
            .field("id", &self.id)
            .field("fields", &self.fields())
            .field("deleted", &self.is_deleted())
            .finish()
    }
}

impl<Id: Identifier> Entity for Document<Id> {
    type Id = Id;
    type Error = DocumentError;
    type Dependency = DocumentDependency;

    fn id(&self) -> &Id {
        &self.id
    }

    fn cache_tags(&self) -> Vec<CacheTag> {
        vec![self.schema.tag_for(&self.id)]
    }

    fn as_prototype(&self) -> Prototype<Id> {
        Prototype::Record(self.fields())
    }

    /// Stored fields first, then precomputed ones.
    fn field(&self, name: &str) -> Option<FieldValue> {
        if let Some(value) = self.fields.read().ok()?.get(name) {
            return Some(value.clone());
        }
        self.computed.read().ok()?.get(name).cloned()
    }

    fn update(&self, params: &Record) -> Result<(), DocumentError> {
        self.ensure_live()?;

        let id_field = &self.schema.id_field;
        if let Some(value) = params.get(id_field) {
            if Id::from_field_value(value).as_ref() != Some(&self.id) {
                return Err(DocumentError::IdChange(id_field.clone()));
            }
        }

        let mut fields = self.fields.write().map_err(|_| DocumentError::LockPoisoned)?;
        for (name, value) in params {
            fields.insert(name.clone(), value.clone());
        }
        drop(fields);

        // Stale once the inputs change.
        self.computed
            .write()
            .map_err(|_| DocumentError::LockPoisoned)?
            .clear();
        if params.contains_key(PARENT_FIELD) {
            *self.parent.write().map_err(|_| DocumentError::LockPoisoned)? = Weak::new();
        }
        Ok(())
    }

    /// Removes the document from its table. Deleting twice reports `false`.
    fn delete(&self) -> Result<bool, DocumentError> {
        if self.deleted.swap(true, Ordering::SeqCst) {
            return Ok(false);
        }
        if let Some(table) = self.table.upgrade() {
            table
                .write()
                .map_err(|_| DocumentError::LockPoisoned)?
                .remove(&self.id);
        }
        Ok(true)
    }

    fn precompute(&self, names: &[&str]) -> Result<(), DocumentError> {
        self.ensure_live()?;

        let fields = self.fields();
        let mut computed = self.computed.write().map_err(|_| DocumentError::LockPoisoned)?;
        for name in names {
            let compute = self
                .schema
                .computed
                .get(*name)
                .ok_or_else(|| DocumentError::UnknownComputed(name.to_string()))?;
            computed.insert(name.to_string(), compute(&fields));
        }
        Ok(())
    }

    fn load_dependency(&self, dependency: DocumentDependency) -> Result<(), DocumentError> {
        self.ensure_live()?;
        match dependency {
            DocumentDependency::Parent => self.load_parent(),
        }
    }
}
