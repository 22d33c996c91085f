//! `mapperkit-core`: lazily materialized, cache-aware aggregates for a data
//! mapper persistence layer.
//!
//! This crate contains **pure domain** logic (no storage or network IO). All IO
//! is delegated to a [`Mapper`] collaborator.

pub mod aggregate;
pub mod entity;
pub mod error;
pub mod id;
pub mod mapper;
pub mod transaction;
pub mod value;

pub use aggregate::{Aggregate, EntityLookup, Iter, PersistedAggregate};
pub use entity::{CacheTag, Entity};
pub use error::{AggregateError, AggregateResult};
pub use id::{EntityId, Identifier};
pub use mapper::{DEFAULT_ITEMS_PER_PAGE, IdOf, LoadPolicy, Mapper, MapperRegistry};
pub use transaction::{IndexSnapshot, Restorable};
pub use value::{FieldValue, Prototype, Record, record};
