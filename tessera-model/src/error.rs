//! Error types for the model layer.

use crate::schema::{EvolutionMode, ValueType};
use tessera_types::ContainerKind;
use thiserror::Error;

/// Result type for schema operations.
pub type SchemaResult<T> = Result<T, SchemaError>;

/// Result type for entity fold operations.
pub type ModelResult<T> = Result<T, ModelError>;

/// A change is incompatible with the current schema and cannot be evolved.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SchemaError {
    /// The change needs a schema evolution the schema does not allow.
    #[error("entity `{entity_type}` cannot evolve ({mode} is not allowed): {detail}")]
    EvolutionNotAllowed {
        entity_type: String,
        mode: EvolutionMode,
        detail: String,
    },

    /// The catalog does not allow creating a new entity type.
    #[error("catalog `{catalog}` does not allow adding entity type `{entity_type}`")]
    CatalogEvolutionNotAllowed { catalog: String, entity_type: String },

    /// A value does not match the declared type.
    #[error("{container} `{name}` of entity `{entity_type}` expects {expected:?}, got {actual:?}")]
    TypeMismatch {
        entity_type: String,
        container: ContainerKind,
        name: String,
        expected: ValueType,
        actual: ValueType,
    },

    /// A reference is used with a different target type than declared.
    #[error("reference `{name}` of entity `{entity_type}` targets `{expected}`, not `{actual}`")]
    ReferencedTypeMismatch {
        entity_type: String,
        name: String,
        expected: String,
        actual: String,
    },

    /// The reference is not declared and cannot be created.
    #[error("reference `{name}` is not defined in entity `{entity_type}` schema")]
    UnknownReference { entity_type: String, name: String },
}

/// The fold primitive was asked to do something impossible.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ModelError {
    /// A removal or nested update targets a value that is not live.
    #[error("{container} `{key}` does not exist in entity `{entity_type}`")]
    ValueNotFound {
        entity_type: String,
        container: ContainerKind,
        key: String,
    },
}
