//! Error types for the mutation layer.

use crate::entity_mutation::EntityExistence;
use tessera_model::{ModelError, SchemaError};
use tessera_types::PrimaryKey;
use thiserror::Error;

/// Result type for mutation operations.
pub type MutationResult<T> = Result<T, MutationError>;

/// Errors that can occur while applying entity mutations.
#[derive(Debug, Error)]
pub enum MutationError {
    /// The mutation conflicts with the schema and cannot be evolved.
    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// A change-unit could not be folded into the entity.
    #[error(transparent)]
    Model(#[from] ModelError),

    /// The entity exists (or not) contrary to the mutation's expectation.
    #[error("entity `{entity_type}` with primary key {primary_key:?} violates {expects:?}")]
    ExistenceViolation {
        entity_type: String,
        primary_key: Option<PrimaryKey>,
        expects: EntityExistence,
    },

    /// A primary key was supplied for a generated-key collection or vice versa.
    #[error("entity `{entity_type}`: {detail}")]
    PrimaryKeyAssignment { entity_type: String, detail: String },

    /// Remove was called for an entity that was never stored.
    #[error("cannot remove entity `{entity_type}` with primary key {primary_key}: not found")]
    RemovedEntityMissing {
        entity_type: String,
        primary_key: PrimaryKey,
    },

    /// The mutation targets an entity type the catalog does not know.
    #[error("entity collection `{0}` does not exist")]
    CollectionNotFound(String),

    /// A non-nullable attribute has no value.
    #[error("entity `{entity_type}` is missing mandatory attributes: {names:?}")]
    MandatoryAttributesMissing {
        entity_type: String,
        names: Vec<String>,
    },

    /// A non-nullable associated data value is missing.
    #[error("entity `{entity_type}` is missing mandatory associated data: {names:?}")]
    MandatoryAssociatedDataMissing {
        entity_type: String,
        names: Vec<String>,
    },

    /// A reference count falls outside its declared cardinality.
    #[error("entity `{entity_type}` has {count} `{reference}` references, expected {cardinality}")]
    CardinalityViolation {
        entity_type: String,
        reference: String,
        count: usize,
        cardinality: String,
    },

    /// External implicit mutations kept producing further mutations.
    #[error("implicit mutations exceeded the depth limit of {0}")]
    ImplicitDepthExceeded(usize),

    /// Configuration could not be read or parsed.
    #[error("configuration error: {0}")]
    Config(String),
}
