//! Infrastructure layer: reference mapper, document entity, registry, config.

pub mod config;
pub mod document;
pub mod mapper;
pub mod registry;

#[cfg(test)]
mod integration_tests;

pub use config::MapperConfig;
pub use document::{ComputedField, Document, DocumentDependency, DocumentError, PARENT_FIELD};
pub use mapper::{InMemoryMapper, MapperError, MapperStats};
pub use registry::InMemoryMapperRegistry;
