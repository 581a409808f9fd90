//! Schema evolution coordinator.
//!
//! Change-units that may require schema changes verify themselves against an
//! open copy-on-write schema builder, evolving it when the schema allows.
//! Within one pass every distinct skip token is checked only once, so a
//! batch of fifty prices in the same currency costs a single check.

use crate::local::{LocalChange, LocalMutation};
use std::collections::BTreeSet;
use tessera_model::{
    AssociatedDataSchema, AttributeSchema, CatalogSchema, EntitySchema, EntitySchemaBuilder,
    EntitySchemaMutation, EvolutionMode, ModifyEntitySchemaMutation, ReferenceSchema, SchemaError,
    SchemaResult, ValueType,
};
use tessera_types::ContainerKind;
use tracing::debug;

/// Deduplication key of a schema check. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SkipToken {
    Hierarchy,
    Attribute {
        name: String,
        value_type: ValueType,
    },
    AssociatedData {
        name: String,
        value_type: ValueType,
    },
    Price {
        currency: String,
    },
    Reference(String),
    ReferenceAttribute {
        reference: String,
        attribute: String,
        value_type: ValueType,
    },
}

/// A change that may require the entity schema to change.
pub trait SchemaEvolvingMutation {
    /// Returns the dedup key, or `None` if the change never affects schema.
    fn skip_token(&self, catalog: &CatalogSchema, schema: &EntitySchema) -> Option<SkipToken>;

    /// Verifies the change against the builder's schema, evolving it if allowed.
    fn verify_or_evolve(
        &self,
        catalog: &CatalogSchema,
        builder: &mut EntitySchemaBuilder<'_>,
    ) -> SchemaResult<()>;
}

/// Runs the verify-or-evolve pass over already sorted change-units.
///
/// Returns the accumulated schema diff, or `None` when the schema fits as is.
/// On failure the builder is dropped and nothing escapes.
pub fn evolve_schema<'m, M>(
    catalog: &CatalogSchema,
    schema: &EntitySchema,
    mutations: impl IntoIterator<Item = &'m M>,
) -> SchemaResult<Option<ModifyEntitySchemaMutation>>
where
    M: SchemaEvolvingMutation + 'm,
{
    let mut builder = EntitySchemaBuilder::new(schema);
    let mut seen = BTreeSet::new();
    let mut checks = 0usize;
    for mutation in mutations {
        let Some(token) = mutation.skip_token(catalog, builder.schema()) else {
            continue;
        };
        if seen.insert(token) {
            mutation.verify_or_evolve(catalog, &mut builder)?;
            checks += 1;
        }
    }
    let diff = builder.to_mutation();
    debug!(
        entity_type = %schema.name,
        checks,
        changes = diff.as_ref().map_or(0, |it| it.mutations.len()),
        "schema verified"
    );
    Ok(diff)
}

impl SchemaEvolvingMutation for LocalMutation {
    fn skip_token(&self, _catalog: &CatalogSchema, _schema: &EntitySchema) -> Option<SkipToken> {
        match self.change() {
            LocalChange::SetParent { .. } => Some(SkipToken::Hierarchy),
            LocalChange::UpsertAttribute { key, value } => Some(SkipToken::Attribute {
                name: key.name().to_string(),
                value_type: ValueType::of(value),
            }),
            LocalChange::UpsertAssociatedData { key, value } => Some(SkipToken::AssociatedData {
                name: key.name().to_string(),
                value_type: ValueType::of(value),
            }),
            LocalChange::UpsertPrice { key, .. } => Some(SkipToken::Price {
                currency: key.currency().to_string(),
            }),
            LocalChange::InsertReference { key, .. } => {
                Some(SkipToken::Reference(key.name().to_string()))
            }
            LocalChange::UpsertReferenceAttribute {
                reference,
                key,
                value,
            } => Some(SkipToken::ReferenceAttribute {
                reference: reference.name().to_string(),
                attribute: key.name().to_string(),
                value_type: ValueType::of(value),
            }),
            // removals never evolve schema
            LocalChange::RemoveParent
            | LocalChange::RemoveAttribute { .. }
            | LocalChange::RemoveAssociatedData { .. }
            | LocalChange::SetPriceInnerRecordHandling { .. }
            | LocalChange::RemovePrice { .. }
            | LocalChange::RemoveReference { .. }
            | LocalChange::RemoveReferenceAttribute { .. } => None,
        }
    }

    fn verify_or_evolve(
        &self,
        catalog: &CatalogSchema,
        builder: &mut EntitySchemaBuilder<'_>,
    ) -> SchemaResult<()> {
        match self.change() {
            LocalChange::SetParent { .. } => {
                if !builder.schema().with_hierarchy {
                    require(builder.schema(), EvolutionMode::AddingHierarchy, || {
                        "entity is not hierarchical".to_string()
                    })?;
                    builder.apply(EntitySchemaMutation::SetWithHierarchy(true))?;
                }
            }
            LocalChange::UpsertAttribute { key, value } => {
                let schema = builder.schema();
                let name = key.name();
                if let Some(existing) = schema.attribute(name) {
                    check_type(schema, ContainerKind::Attribute, name, existing.value_type, value)?;
                } else if let Some(global) = catalog.global_attribute(name) {
                    check_type(schema, ContainerKind::Attribute, name, global.value_type, value)?;
                    let global = global.clone();
                    builder.apply(EntitySchemaMutation::UseGlobalAttributeSchema(global))?;
                } else {
                    require(schema, EvolutionMode::AddingAttributes, || {
                        format!("attribute `{key}` is not defined")
                    })?;
                    builder.apply(EntitySchemaMutation::CreateAttributeSchema(
                        AttributeSchema::inferred(key.name(), value),
                    ))?;
                }
            }
            LocalChange::UpsertAssociatedData { key, value } => {
                let schema = builder.schema();
                if let Some(existing) = schema.associated_data(key.name()) {
                    check_type(
                        schema,
                        ContainerKind::AssociatedData,
                        key.name(),
                        existing.value_type,
                        value,
                    )?;
                } else {
                    require(schema, EvolutionMode::AddingAssociatedData, || {
                        format!("associated data `{key}` is not defined")
                    })?;
                    builder.apply(EntitySchemaMutation::CreateAssociatedDataSchema(
                        AssociatedDataSchema::inferred(key.name(), value),
                    ))?;
                }
            }
            LocalChange::UpsertPrice { key, .. } => {
                if !builder.schema().with_price {
                    require(builder.schema(), EvolutionMode::AddingPrices, || {
                        "entity has no prices".to_string()
                    })?;
                    builder.apply(EntitySchemaMutation::SetWithPrice(true))?;
                }
                if !builder.schema().currencies.contains(key.currency()) {
                    require(builder.schema(), EvolutionMode::AddingCurrencies, || {
                        format!("currency `{}` is not allowed", key.currency())
                    })?;
                    builder.apply(EntitySchemaMutation::AllowCurrency(key.currency().to_string()))?;
                }
            }
            LocalChange::InsertReference {
                key,
                referenced_entity_type,
                cardinality,
            } => {
                let schema = builder.schema();
                if let Some(existing) = schema.reference(key.name()) {
                    if existing.referenced_entity_type != *referenced_entity_type {
                        return Err(SchemaError::ReferencedTypeMismatch {
                            entity_type: schema.name.clone(),
                            name: key.name().to_string(),
                            expected: existing.referenced_entity_type.clone(),
                            actual: referenced_entity_type.clone(),
                        });
                    }
                } else {
                    require(schema, EvolutionMode::AddingReferences, || {
                        format!("reference `{}` is not defined", key.name())
                    })?;
                    builder.apply(EntitySchemaMutation::CreateReferenceSchema(ReferenceSchema::new(
                        key.name(),
                        referenced_entity_type.as_str(),
                        cardinality.unwrap_or_default(),
                    )))?;
                }
            }
            LocalChange::UpsertReferenceAttribute {
                reference,
                key,
                value,
            } => {
                let schema = builder.schema();
                let Some(reference_schema) = schema.reference(reference.name()) else {
                    return Err(SchemaError::UnknownReference {
                        entity_type: schema.name.clone(),
                        name: reference.name().to_string(),
                    });
                };
                if let Some(existing) = reference_schema.attributes.get(key.name()) {
                    check_type(
                        schema,
                        ContainerKind::Reference,
                        &format!("{}.{}", reference.name(), key.name()),
                        existing.value_type,
                        value,
                    )?;
                } else {
                    require(schema, EvolutionMode::AddingReferences, || {
                        let reference = reference.name();
                        format!("attribute `{key}` of reference `{reference}` is not defined")
                    })?;
                    builder.apply(EntitySchemaMutation::CreateReferenceAttributeSchema {
                        reference_name: reference.name().to_string(),
                        attribute: AttributeSchema::inferred(key.name(), value),
                    })?;
                }
            }
            LocalChange::RemoveParent
            | LocalChange::RemoveAttribute { .. }
            | LocalChange::RemoveAssociatedData { .. }
            | LocalChange::SetPriceInnerRecordHandling { .. }
            | LocalChange::RemovePrice { .. }
            | LocalChange::RemoveReference { .. }
            | LocalChange::RemoveReferenceAttribute { .. } => {}
        }
        Ok(())
    }
}

fn require(
    schema: &EntitySchema,
    mode: EvolutionMode,
    detail: impl FnOnce() -> String,
) -> SchemaResult<()> {
    if schema.allows(mode) {
        Ok(())
    } else {
        Err(SchemaError::EvolutionNotAllowed {
            entity_type: schema.name.clone(),
            mode,
            detail: detail(),
        })
    }
}

fn check_type(
    schema: &EntitySchema,
    container: ContainerKind,
    name: &str,
    expected: ValueType,
    value: &serde_json::Value,
) -> SchemaResult<()> {
    if expected.accepts(value) {
        Ok(())
    } else {
        Err(SchemaError::TypeMismatch {
            entity_type: schema.name.clone(),
            container,
            name: name.to_string(),
            expected,
            actual: ValueType::of(value),
        })
    }
}
