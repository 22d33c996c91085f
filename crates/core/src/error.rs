//! Aggregate error model.

use thiserror::Error;

/// Result type used by the aggregate core itself.
pub type AggregateResult<T> = Result<T, AggregateError>;

/// Errors raised by the aggregate core.
///
/// Collaborator failures (mapper I/O, entity persistence) are not represented
/// here: they travel as the mapper's own error type. Mappers must be able to
/// absorb these variants via `From<AggregateError>`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AggregateError {
    /// A structured prototype did not carry a usable identifier.
    #[error("invalid prototype: {0}")]
    InvalidPrototype(String),

    /// An identifier could not be parsed.
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// No mapper is registered for a persisted aggregate kind.
    #[error("unknown aggregate kind: {0}")]
    UnknownKind(String),

    /// A persisted aggregate could not be decoded.
    #[error("invalid persisted state: {0}")]
    InvalidPersistedState(String),
}

impl AggregateError {
    pub fn invalid_prototype(msg: impl Into<String>) -> Self {
        Self::InvalidPrototype(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn unknown_kind(kind: impl Into<String>) -> Self {
        Self::UnknownKind(kind.into())
    }

    pub fn invalid_persisted_state(msg: impl Into<String>) -> Self {
        Self::InvalidPersistedState(msg.into())
    }
}
