//! In-memory catalog: the layer that drives entity mutations end to end.
//!
//! For every entity mutation the catalog evolves the schema (creating the
//! collection when allowed), assigns generated primary keys, checks existence
//! expectations, runs the executor protocol and finally applies external
//! implicit mutations to the entities they target. A failure anywhere in
//! that chain restores every collection the mutation touched.

use crate::config::MutationConfig;
use crate::entity_mutation::EntityMutation;
use crate::error::{MutationError, MutationResult};
use crate::executor::{EntityStateExecutor, Executed, execute_with_consistency};
use crate::implicit::ImplicitBehaviors;
use crate::local::LocalChange;
use crate::ordering::sort_mutations;
use std::collections::BTreeMap;
use tessera_model::{
    CatalogEvolutionMode, CatalogSchema, Entity, EntitySchema, ModifyEntitySchemaMutation,
    SchemaError,
};
use tessera_types::PrimaryKey;
use tracing::{debug, info, warn};

/// Where a mutation comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MutationOrigin {
    /// A new write; consistency is verified.
    Client,
    /// Replay of an already verified write from the write-ahead log.
    WalReplay,
}

/// Entities of one type together with their schema.
#[derive(Debug, Clone)]
pub struct EntityCollection {
    schema: EntitySchema,
    entities: BTreeMap<PrimaryKey, Entity>,
    next_primary_key: PrimaryKey,
}

impl EntityCollection {
    #[must_use]
    pub fn new(schema: EntitySchema) -> Self {
        Self {
            schema,
            entities: BTreeMap::new(),
            next_primary_key: 1,
        }
    }

    #[must_use]
    pub fn schema(&self) -> &EntitySchema {
        &self.schema
    }

    #[must_use]
    pub fn entity_type(&self) -> &str {
        &self.schema.name
    }

    /// Returns the stored entity, including a removed one.
    #[must_use]
    pub fn get(&self, primary_key: PrimaryKey) -> Option<&Entity> {
        self.entities.get(&primary_key)
    }

    /// Returns true if nothing was ever stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Number of live entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.values().filter(|it| !it.is_dropped()).count()
    }

    fn allocate_primary_key(&mut self) -> MutationResult<PrimaryKey> {
        let primary_key = self.next_primary_key;
        if self.entities.contains_key(&primary_key) {
            return Err(MutationError::PrimaryKeyAssignment {
                entity_type: self.schema.name.clone(),
                detail: "primary key space exhausted".to_string(),
            });
        }
        self.next_primary_key = primary_key.saturating_add(1);
        Ok(primary_key)
    }

    fn store(&mut self, entity: Entity) {
        if let Some(primary_key) = entity.primary_key() {
            self.next_primary_key = self.next_primary_key.max(primary_key.saturating_add(1));
            self.entities.insert(primary_key, entity);
        }
    }
}

/// Outcome of one top-level entity mutation.
#[derive(Debug, Clone)]
pub struct AppliedMutation {
    /// The mutation as applied, carrying the assigned primary key.
    pub mutation: EntityMutation,
    /// The new snapshot of the target entity.
    pub entity: Entity,
    /// Schema diff applied before the entity was written.
    pub schema_mutation: Option<ModifyEntitySchemaMutation>,
    /// Snapshots of other entities changed by reflected references.
    pub reflected: Vec<Entity>,
}

/// Collections touched by one top-level mutation, as they were before it.
/// `None` marks a collection the mutation created.
type Journal = BTreeMap<String, Option<EntityCollection>>;

/// A set of entity collections sharing one catalog schema.
#[derive(Debug, Clone)]
pub struct Catalog {
    schema: CatalogSchema,
    collections: BTreeMap<String, EntityCollection>,
    config: MutationConfig,
}

impl Catalog {
    #[must_use]
    pub fn new(schema: CatalogSchema) -> Self {
        Self::with_config(schema, MutationConfig::default())
    }

    #[must_use]
    pub fn with_config(schema: CatalogSchema, config: MutationConfig) -> Self {
        Self {
            schema,
            collections: BTreeMap::new(),
            config,
        }
    }

    /// Registers a collection with an explicit schema.
    #[must_use]
    pub fn with_collection(mut self, schema: EntitySchema) -> Self {
        self.collections
            .insert(schema.name.clone(), EntityCollection::new(schema));
        self
    }

    #[must_use]
    pub fn schema(&self) -> &CatalogSchema {
        &self.schema
    }

    #[must_use]
    pub fn config(&self) -> &MutationConfig {
        &self.config
    }

    #[must_use]
    pub fn collection(&self, entity_type: &str) -> Option<&EntityCollection> {
        self.collections.get(entity_type)
    }

    #[must_use]
    pub fn entity(&self, entity_type: &str, primary_key: PrimaryKey) -> Option<&Entity> {
        self.collection(entity_type)?.get(primary_key)
    }

    /// Applies one entity mutation and everything it implies.
    ///
    /// Either the mutation and all of its external implicit mutations are
    /// stored, or none of them is.
    pub fn apply(
        &mut self,
        mutation: EntityMutation,
        origin: MutationOrigin,
    ) -> MutationResult<AppliedMutation> {
        let behaviors = mutation
            .implicit_behaviors()
            .intersection(&self.config.implicit_behaviors);
        let mut journal = Journal::new();
        let result = self.apply_at_depth(mutation, &behaviors, origin, 0, &mut journal);
        if result.is_err() {
            self.restore(journal);
        }
        result
    }

    fn restore(&mut self, journal: Journal) {
        for (entity_type, snapshot) in journal {
            debug!(entity_type = %entity_type, "restoring collection");
            match snapshot {
                Some(collection) => {
                    self.collections.insert(entity_type, collection);
                }
                None => {
                    self.collections.remove(&entity_type);
                }
            }
        }
    }

    fn apply_at_depth(
        &mut self,
        mutation: EntityMutation,
        behaviors: &ImplicitBehaviors,
        origin: MutationOrigin,
        depth: usize,
        journal: &mut Journal,
    ) -> MutationResult<AppliedMutation> {
        if depth > self.config.max_implicit_depth {
            return Err(MutationError::ImplicitDepthExceeded(self.config.max_implicit_depth));
        }
        journal
            .entry(mutation.entity_type().to_string())
            .or_insert_with_key(|entity_type| self.collections.get(entity_type).cloned());
        self.ensure_collection(&mutation)?;

        let Self {
            schema: catalog_schema,
            collections,
            config,
        } = self;
        let collection = collections
            .get_mut(mutation.entity_type())
            .ok_or_else(|| MutationError::CollectionNotFound(mutation.entity_type().to_string()))?;

        let schema_mutation = mutation.verify_or_evolve_schema(
            catalog_schema,
            &collection.schema,
            collection.is_empty(),
        )?;
        let schema = match &schema_mutation {
            Some(diff) => {
                info!(
                    entity_type = %diff.entity_type,
                    changes = diff.mutations.len(),
                    "entity schema evolved"
                );
                diff.apply(&collection.schema)?
            }
            None => collection.schema.clone(),
        };

        let mutation = assign_primary_key(mutation, &schema, collection, origin)?;
        let Some(primary_key) = mutation.primary_key() else {
            return Err(MutationError::PrimaryKeyAssignment {
                entity_type: schema.name.clone(),
                detail: "primary key must be supplied".to_string(),
            });
        };
        let existing = collection.get(primary_key).cloned();
        let exists = existing.as_ref().is_some_and(|it| !it.is_dropped());
        if !mutation.expects().is_satisfied_by(exists) {
            return Err(MutationError::ExistenceViolation {
                entity_type: schema.name.clone(),
                primary_key: Some(primary_key),
                expects: mutation.expects(),
            });
        }

        let verify = origin == MutationOrigin::Client && config.verify_consistency;
        let executed = match &mutation {
            EntityMutation::Upsert(upsert) => {
                let executor = EntityStateExecutor::upsert(
                    &schema,
                    existing.as_ref(),
                    upsert.entity_type(),
                    Some(primary_key),
                )
                .with_reflected_behaviors(config.reflected_behaviors.clone());
                execute_with_consistency(executor, &upsert.ordered_mutations(), behaviors, verify)?
            }
            EntityMutation::Remove(remove) => match existing.as_ref() {
                None => {
                    return Err(MutationError::RemovedEntityMissing {
                        entity_type: schema.name.clone(),
                        primary_key,
                    });
                }
                Some(entity) if entity.is_dropped() => {
                    debug!(entity_type = %schema.name, primary_key, "entity already removed");
                    Executed {
                        output: entity.clone(),
                        implicit_local: Vec::new(),
                        external: Vec::new(),
                    }
                }
                Some(entity) => {
                    let mut teardown = remove.local_mutations(entity);
                    sort_mutations(&mut teardown);
                    let executor = EntityStateExecutor::removal(&schema, entity)
                        .with_reflected_behaviors(config.reflected_behaviors.clone());
                    execute_with_consistency(executor, &teardown, behaviors, verify)?
                }
            },
        };

        collection.schema = schema;
        collection.store(executed.output.clone());

        let mut reflected = Vec::new();
        for external in executed.external {
            if let Some(applied) = self.apply_external(external, origin, depth + 1, journal)? {
                reflected.push(applied.entity);
                reflected.extend(applied.reflected);
            }
        }

        Ok(AppliedMutation {
            mutation,
            entity: executed.output,
            schema_mutation,
            reflected,
        })
    }

    fn ensure_collection(&mut self, mutation: &EntityMutation) -> MutationResult<()> {
        let entity_type = mutation.entity_type();
        if self.collections.contains_key(entity_type) {
            return Ok(());
        }
        if mutation.is_removal() {
            return Err(MutationError::CollectionNotFound(entity_type.to_string()));
        }
        if !self.schema.allows(CatalogEvolutionMode::AddingEntityTypes) {
            return Err(SchemaError::CatalogEvolutionNotAllowed {
                catalog: self.schema.name.clone(),
                entity_type: entity_type.to_string(),
            }
            .into());
        }
        info!(catalog = %self.schema.name, entity_type, "creating entity collection");
        self.collections.insert(
            entity_type.to_string(),
            EntityCollection::new(EntitySchema::new(entity_type)),
        );
        Ok(())
    }

    /// Applies a mutation generated for another entity.
    ///
    /// Reflected writes only touch entities that exist; removals of mirrored
    /// references that are already gone are dropped.
    fn apply_external(
        &mut self,
        mutation: EntityMutation,
        origin: MutationOrigin,
        depth: usize,
        journal: &mut Journal,
    ) -> MutationResult<Option<AppliedMutation>> {
        let target = mutation
            .primary_key()
            .and_then(|primary_key| self.entity(mutation.entity_type(), primary_key))
            .filter(|it| !it.is_dropped());
        let Some(target) = target else {
            debug!(
                entity_type = mutation.entity_type(),
                primary_key = ?mutation.primary_key(),
                "reflected target does not exist, skipping"
            );
            return Ok(None);
        };

        let mutation = match mutation {
            EntityMutation::Upsert(upsert) => {
                let upsert = upsert.retain(|it| match it.change() {
                    LocalChange::RemoveReference { key } => target.reference(key).is_some(),
                    _ => true,
                });
                if upsert.local_mutations().is_empty() {
                    return Ok(None);
                }
                EntityMutation::Upsert(upsert)
            }
            remove => remove,
        };

        let behaviors = mutation
            .implicit_behaviors()
            .intersection(&self.config.implicit_behaviors);
        debug!(
            entity_type = mutation.entity_type(),
            primary_key = ?mutation.primary_key(),
            depth,
            "applying external implicit mutation"
        );
        self.apply_at_depth(mutation, &behaviors, origin, depth, journal)
            .map(Some)
            .inspect_err(|err| warn!("external implicit mutation failed: {err}"))
    }
}

/// Keys an upsert for a collection with generated keys.
///
/// A replayed upsert carries the key it was assigned when first applied.
fn assign_primary_key(
    mutation: EntityMutation,
    schema: &EntitySchema,
    collection: &mut EntityCollection,
    origin: MutationOrigin,
) -> MutationResult<EntityMutation> {
    let EntityMutation::Upsert(upsert) = mutation else {
        return Ok(mutation);
    };
    match (upsert.primary_key(), schema.with_generated_primary_key) {
        (None, true) => {
            let primary_key = collection.allocate_primary_key()?;
            debug!(entity_type = %schema.name, primary_key, "primary key assigned");
            Ok(EntityMutation::Upsert(upsert.with_primary_key(primary_key)))
        }
        (None, false) => Err(MutationError::PrimaryKeyAssignment {
            entity_type: schema.name.clone(),
            detail: "primary key must be supplied".to_string(),
        }),
        (Some(primary_key), true)
            if origin == MutationOrigin::Client && collection.get(primary_key).is_none() =>
        {
            Err(MutationError::PrimaryKeyAssignment {
                entity_type: schema.name.clone(),
                detail: format!("primary keys are generated, {primary_key} was never assigned"),
            })
        }
        (Some(_), _) => Ok(EntityMutation::Upsert(upsert)),
    }
}
