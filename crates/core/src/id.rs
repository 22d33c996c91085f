//! Identifiers shared by aggregates, entities and mappers.

use core::fmt::Debug;
use core::hash::Hash;
use core::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AggregateError;
use crate::value::FieldValue;

/// Capability set of an entity identifier.
///
/// Identifiers are opaque keys: the aggregate only clones, compares and hashes
/// them. The field-value conversions let an identifier travel inside a
/// structured [`Prototype`](crate::value::Prototype) under the mapper's id field.
pub trait Identifier: Clone + Eq + Hash + Debug + Send + Sync + 'static {
    /// Extract an identifier from a prototype field value.
    ///
    /// Returns `None` when the value has the wrong shape for this identifier.
    fn from_field_value(value: &FieldValue) -> Option<Self>;

    /// Render the identifier as a prototype field value.
    fn to_field_value(&self) -> FieldValue;
}

impl Identifier for i64 {
    fn from_field_value(value: &FieldValue) -> Option<Self> {
        value.as_i64()
    }

    fn to_field_value(&self) -> FieldValue {
        FieldValue::Int(*self)
    }
}

impl Identifier for u64 {
    fn from_field_value(value: &FieldValue) -> Option<Self> {
        match value {
            FieldValue::Int(v) => u64::try_from(*v).ok(),
            FieldValue::Text(s) => s.parse().ok(),
            _ => None,
        }
    }

    fn to_field_value(&self) -> FieldValue {
        // Ids above i64::MAX are carried as text.
        match i64::try_from(*self) {
            Ok(v) => FieldValue::Int(v),
            Err(_) => FieldValue::Text(self.to_string()),
        }
    }
}

impl Identifier for String {
    fn from_field_value(value: &FieldValue) -> Option<Self> {
        match value {
            FieldValue::Text(s) => Some(s.clone()),
            FieldValue::Int(i) => Some(i.to_string()),
            _ => None,
        }
    }

    fn to_field_value(&self) -> FieldValue {
        FieldValue::Text(self.clone())
    }
}

/// Uuid-backed entity identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(Uuid);

impl EntityId {
    /// Create a new identifier.
    ///
    /// Uses UUIDv7 (time-ordered). Prefer passing IDs explicitly in tests
    /// for determinism.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Display for EntityId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl From<Uuid> for EntityId {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

impl From<EntityId> for Uuid {
    fn from(value: EntityId) -> Self {
        value.0
    }
}

impl FromStr for EntityId {
    type Err = AggregateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let uuid =
            Uuid::from_str(s).map_err(|e| AggregateError::invalid_id(format!("EntityId: {e}")))?;
        Ok(Self(uuid))
    }
}

impl Identifier for EntityId {
    fn from_field_value(value: &FieldValue) -> Option<Self> {
        value.as_str().and_then(|s| s.parse().ok())
    }

    fn to_field_value(&self) -> FieldValue {
        FieldValue::Text(self.0.to_string())
    }
}
