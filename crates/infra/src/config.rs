//! Mapper configuration.

use serde::{Deserialize, Serialize};
use tracing::warn;

use mapperkit_core::DEFAULT_ITEMS_PER_PAGE;

/// Environment variable overriding the id field name.
pub const ENV_ID_FIELD: &str = "MAPPERKIT_ID_FIELD";
/// Environment variable overriding the default page size.
pub const ENV_ITEMS_PER_PAGE: &str = "MAPPERKIT_ITEMS_PER_PAGE";

/// Configuration of one in-memory mapper (one aggregate kind).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MapperConfig {
    /// Kind tag stored with persisted aggregates and used in cache tags.
    pub kind: String,
    /// Prototype field holding the entity id.
    pub id_field: String,
    /// Page size used when callers do not pass one.
    pub items_per_page: usize,
}

impl Default for MapperConfig {
    fn default() -> Self {
        Self {
            kind: "document".to_string(),
            id_field: "id".to_string(),
            items_per_page: DEFAULT_ITEMS_PER_PAGE,
        }
    }
}

impl MapperConfig {
    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = kind.into();
        self
    }

    pub fn with_id_field(mut self, id_field: impl Into<String>) -> Self {
        self.id_field = id_field.into();
        self
    }

    pub fn with_items_per_page(mut self, items_per_page: usize) -> Self {
        self.items_per_page = items_per_page;
        self
    }

    /// Defaults overridden by `MAPPERKIT_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for the `MAPPERKIT_*`
    /// names. Empty or unparsable values keep the default.
    ///
    /// [`MapperConfig::from_env`] is this over `std::env::var`; tests pass a map.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(id_field) = lookup(ENV_ID_FIELD).filter(|v| !v.trim().is_empty()) {
            config.id_field = id_field.trim().to_string();
        }

        if let Some(raw) = lookup(ENV_ITEMS_PER_PAGE) {
            match raw.trim().parse::<usize>() {
                Ok(n) if n > 0 => config.items_per_page = n,
                _ => warn!(
                    variable = ENV_ITEMS_PER_PAGE,
                    value = %raw,
                    "ignoring invalid page size"
                ),
            }
        }

        config
    }
}
