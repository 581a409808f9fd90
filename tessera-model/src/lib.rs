//! Core entity model for the Tessera write path.
//!
//! Defines the collaborator types the mutation core folds over:
//! - [`Entity`]: an immutable, versioned entity snapshot with tombstoned values
//! - [`EntityDraft`]: the working copy change-units are folded into
//! - [`EntitySchema`] / [`CatalogSchema`]: the shape of an entity type and of the catalog
//! - [`EntitySchemaMutation`]: a single schema change; [`ModifyEntitySchemaMutation`] a diff
//! - [`EntitySchemaBuilder`]: copy-on-write schema shadow that accumulates a diff
//! - [`SchemaError`]: the schema-violation error

mod builder;
mod draft;
mod entity;
mod error;
mod schema;
mod schema_mutation;

pub use builder::EntitySchemaBuilder;
pub use draft::EntityDraft;
pub use entity::{Entity, Price, PriceInnerRecordHandling, Reference, Versioned};
pub use error::{ModelError, ModelResult, SchemaError, SchemaResult};
pub use schema::{
    AssociatedDataSchema, AttributeSchema, Cardinality, CatalogEvolutionMode, CatalogSchema,
    EntitySchema, EvolutionMode, ReferenceSchema, ValueType,
};
pub use schema_mutation::{EntitySchemaMutation, ModifyEntitySchemaMutation};
