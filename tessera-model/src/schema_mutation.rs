//! Schema mutations: the diff produced by schema evolution.

use crate::error::{SchemaError, SchemaResult};
use crate::schema::{AssociatedDataSchema, AttributeSchema, EntitySchema, ReferenceSchema};
use serde::{Deserialize, Serialize};

/// A single change of an entity schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", content = "data", rename_all = "snake_case")]
pub enum EntitySchemaMutation {
    SetWithGeneratedPrimaryKey(bool),
    CreateAttributeSchema(AttributeSchema),
    /// Adopts the catalog-wide definition of an attribute.
    UseGlobalAttributeSchema(AttributeSchema),
    CreateAssociatedDataSchema(AssociatedDataSchema),
    CreateReferenceSchema(ReferenceSchema),
    CreateReferenceAttributeSchema {
        reference_name: String,
        attribute: AttributeSchema,
    },
    SetWithPrice(bool),
    AllowCurrency(String),
    SetWithHierarchy(bool),
}

impl EntitySchemaMutation {
    /// Applies the change to `schema` in place.
    pub fn mutate(&self, schema: &mut EntitySchema) -> SchemaResult<()> {
        match self {
            Self::SetWithGeneratedPrimaryKey(generated) => {
                schema.with_generated_primary_key = *generated;
            }
            Self::CreateAttributeSchema(attribute) | Self::UseGlobalAttributeSchema(attribute) => {
                schema
                    .attributes
                    .insert(attribute.name.clone(), attribute.clone());
            }
            Self::CreateAssociatedDataSchema(associated_data) => {
                schema
                    .associated_data
                    .insert(associated_data.name.clone(), associated_data.clone());
            }
            Self::CreateReferenceSchema(reference) => {
                schema
                    .references
                    .insert(reference.name.clone(), reference.clone());
            }
            Self::CreateReferenceAttributeSchema {
                reference_name,
                attribute,
            } => {
                let reference = schema.references.get_mut(reference_name).ok_or_else(|| {
                    SchemaError::UnknownReference {
                        entity_type: schema.name.clone(),
                        name: reference_name.clone(),
                    }
                })?;
                reference
                    .attributes
                    .insert(attribute.name.clone(), attribute.clone());
            }
            Self::SetWithPrice(with_price) => schema.with_price = *with_price,
            Self::AllowCurrency(currency) => {
                schema.currencies.insert(currency.clone());
            }
            Self::SetWithHierarchy(with_hierarchy) => schema.with_hierarchy = *with_hierarchy,
        }
        Ok(())
    }
}

/// All schema changes of one entity type produced by a single evolution pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModifyEntitySchemaMutation {
    pub entity_type: String,
    pub mutations: Vec<EntitySchemaMutation>,
}

impl ModifyEntitySchemaMutation {
    pub fn new(entity_type: impl Into<String>, mutations: Vec<EntitySchemaMutation>) -> Self {
        Self {
            entity_type: entity_type.into(),
            mutations,
        }
    }

    /// Returns a new schema with all changes applied and its version bumped.
    pub fn apply(&self, schema: &EntitySchema) -> SchemaResult<EntitySchema> {
        let mut evolved = schema.clone();
        for mutation in &self.mutations {
            mutation.mutate(&mut evolved)?;
        }
        evolved.version += 1;
        Ok(evolved)
    }

    /// Places `first` in front of the other changes.
    #[must_use]
    pub fn prepend(mut self, first: Vec<EntitySchemaMutation>) -> Self {
        self.mutations.splice(0..0, first);
        self
    }
}
