//! Entity mutations: the atomic, top-level commands applied as one version step.

use crate::error::{MutationError, MutationResult};
use crate::evolution::evolve_schema;
use crate::executor::{EntityStateExecutor, execute};
use crate::implicit::ImplicitBehaviors;
use crate::local::LocalMutation;
use crate::ordering::sort_mutations;
use crate::removal::removal_mutations;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use tessera_model::{
    CatalogSchema, Entity, EntitySchema, EntitySchemaMutation, EvolutionMode,
    ModifyEntitySchemaMutation, SchemaError, SchemaResult,
};
use tessera_types::{DecisiveClock, PrimaryKey};
use tracing::debug;

/// What the caller expects about the entity's prior existence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityExistence {
    /// Create only.
    MustNotExist,
    /// Create or update.
    MayExist,
    /// Update only.
    MustExist,
}

impl EntityExistence {
    /// Returns true if an entity that does (or does not) exist satisfies the expectation.
    #[must_use]
    pub fn is_satisfied_by(self, exists: bool) -> bool {
        match self {
            Self::MustNotExist => !exists,
            Self::MayExist => true,
            Self::MustExist => exists,
        }
    }
}

/// Creates or updates an entity with an explicit list of change-units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityUpsertMutation {
    entity_type: String,
    primary_key: Option<PrimaryKey>,
    expects: EntityExistence,
    #[serde(default)]
    implicit_behaviors: ImplicitBehaviors,
    local_mutations: Vec<LocalMutation>,
}

impl EntityUpsertMutation {
    /// Accepts the change-units, stamping the ones without a decisive timestamp.
    pub fn new(
        entity_type: impl Into<String>,
        primary_key: Option<PrimaryKey>,
        expects: EntityExistence,
        local_mutations: impl IntoIterator<Item = LocalMutation>,
    ) -> Self {
        Self::with_clock(
            entity_type,
            primary_key,
            expects,
            local_mutations,
            &mut DecisiveClock::new(),
        )
    }

    /// Like [`new`](Self::new) with timestamps drawn from `clock`.
    ///
    /// Change-units are keyed by kind and comparable key, so two accepted
    /// units never tie on everything but their timestamp. Of two units with
    /// the same identity the one with the later decisive timestamp is kept;
    /// on equal timestamps the later one in input order is kept. The accepted
    /// units are kept in application order.
    pub fn with_clock(
        entity_type: impl Into<String>,
        primary_key: Option<PrimaryKey>,
        expects: EntityExistence,
        local_mutations: impl IntoIterator<Item = LocalMutation>,
        clock: &mut DecisiveClock,
    ) -> Self {
        let stamped = local_mutations
            .into_iter()
            .map(|mutation| match mutation.decisive_timestamp() {
                Some(_) => mutation,
                None => mutation.with_decisive_timestamp(clock.next_timestamp()),
            });
        Self {
            entity_type: entity_type.into(),
            primary_key,
            expects,
            implicit_behaviors: ImplicitBehaviors::default(),
            local_mutations: accept(stamped),
        }
    }

    #[must_use]
    pub fn with_implicit_behaviors(mut self, behaviors: ImplicitBehaviors) -> Self {
        self.implicit_behaviors = behaviors;
        self
    }

    /// Returns a copy targeting the given (generated) primary key.
    #[must_use]
    pub fn with_primary_key(mut self, primary_key: PrimaryKey) -> Self {
        self.primary_key = Some(primary_key);
        self
    }

    /// Keeps only the change-units matching `keep`.
    #[must_use]
    pub fn retain(mut self, keep: impl FnMut(&LocalMutation) -> bool) -> Self {
        self.local_mutations.retain(keep);
        self
    }

    #[must_use]
    pub fn entity_type(&self) -> &str {
        &self.entity_type
    }

    #[must_use]
    pub fn primary_key(&self) -> Option<PrimaryKey> {
        self.primary_key
    }

    #[must_use]
    pub fn expects(&self) -> EntityExistence {
        self.expects
    }

    #[must_use]
    pub fn implicit_behaviors(&self) -> &ImplicitBehaviors {
        &self.implicit_behaviors
    }

    /// The change-units as stored.
    ///
    /// Built through [`with_clock`](Self::with_clock) these are in application
    /// order; a deserialized mutation carries whatever order it was written in.
    #[must_use]
    pub fn local_mutations(&self) -> &[LocalMutation] {
        &self.local_mutations
    }

    /// The change-units deduplicated by identity and in application order.
    ///
    /// Borrows when the stored units already satisfy both.
    #[must_use]
    pub fn ordered_mutations(&self) -> Cow<'_, [LocalMutation]> {
        let in_order = self.local_mutations.windows(2).all(|pair| {
            pair[0].kind() != pair[1].kind() || pair[0].comparable_key() != pair[1].comparable_key()
        }) && self.local_mutations.is_sorted_by_key(LocalMutation::order_key);
        if in_order {
            Cow::Borrowed(&self.local_mutations)
        } else {
            Cow::Owned(accept(self.local_mutations.iter().cloned()))
        }
    }

    /// Verifies the mutation against the schema, returning the schema diff it needs.
    ///
    /// The primary-key generation mode is only evaluated while the collection
    /// is empty; its change (if any) precedes the per-change evolution.
    pub fn verify_or_evolve_schema(
        &self,
        catalog: &CatalogSchema,
        schema: &EntitySchema,
        collection_is_empty: bool,
    ) -> SchemaResult<Option<ModifyEntitySchemaMutation>> {
        let mut key_mutation = None;
        if collection_is_empty {
            let generated = self.primary_key.is_none();
            if generated != schema.with_generated_primary_key {
                if !schema.allows(EvolutionMode::AdaptPrimaryKeyGeneration) {
                    return Err(SchemaError::EvolutionNotAllowed {
                        entity_type: schema.name.clone(),
                        mode: EvolutionMode::AdaptPrimaryKeyGeneration,
                        detail: if generated {
                            "primary key must be supplied".to_string()
                        } else {
                            "primary keys are generated".to_string()
                        },
                    });
                }
                key_mutation = Some(EntitySchemaMutation::SetWithGeneratedPrimaryKey(generated));
            }
        }

        let evolved = evolve_schema(catalog, schema, self.ordered_mutations().iter())?;
        Ok(match (key_mutation, evolved) {
            (None, evolved) => evolved,
            (Some(key), None) => {
                Some(ModifyEntitySchemaMutation::new(schema.name.clone(), vec![key]))
            }
            (Some(key), Some(evolved)) => Some(evolved.prepend(vec![key])),
        })
    }

    /// Folds the change-units over `existing`, or over a fresh shell when absent.
    pub fn mutate(
        &self,
        schema: &EntitySchema,
        existing: Option<&Entity>,
    ) -> MutationResult<Entity> {
        let executor =
            EntityStateExecutor::upsert(schema, existing, &self.entity_type, self.primary_key);
        execute(executor, &self.ordered_mutations())
    }
}

/// Keeps one change-unit per identity and sorts the survivors into
/// application order.
fn accept(local_mutations: impl IntoIterator<Item = LocalMutation>) -> Vec<LocalMutation> {
    let mut by_identity: BTreeMap<_, LocalMutation> = BTreeMap::new();
    for mutation in local_mutations {
        match by_identity.entry((mutation.kind(), mutation.comparable_key())) {
            Entry::Vacant(slot) => {
                slot.insert(mutation);
            }
            Entry::Occupied(mut slot) => {
                if mutation.decisive_timestamp() >= slot.get().decisive_timestamp() {
                    slot.insert(mutation);
                }
            }
        }
    }
    let mut accepted: Vec<LocalMutation> = by_identity.into_values().collect();
    sort_mutations(&mut accepted);
    accepted
}

/// Removes an entity. The teardown is computed from the live entity on demand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRemoveMutation {
    entity_type: String,
    primary_key: PrimaryKey,
}

impl EntityRemoveMutation {
    pub fn new(entity_type: impl Into<String>, primary_key: PrimaryKey) -> Self {
        Self {
            entity_type: entity_type.into(),
            primary_key,
        }
    }

    #[must_use]
    pub fn entity_type(&self) -> &str {
        &self.entity_type
    }

    #[must_use]
    pub fn primary_key(&self) -> PrimaryKey {
        self.primary_key
    }

    /// Removal accepts both a live and an already removed entity.
    #[must_use]
    pub fn expects(&self) -> EntityExistence {
        EntityExistence::MayExist
    }

    /// The teardown of `existing`; empty for an already removed entity.
    #[must_use]
    pub fn local_mutations(&self, existing: &Entity) -> Vec<LocalMutation> {
        if existing.is_dropped() {
            Vec::new()
        } else {
            removal_mutations(existing)
        }
    }

    /// Removal never changes the schema.
    pub fn verify_or_evolve_schema(
        &self,
        _catalog: &CatalogSchema,
        _schema: &EntitySchema,
        _collection_is_empty: bool,
    ) -> SchemaResult<Option<ModifyEntitySchemaMutation>> {
        Ok(None)
    }

    /// Tombstones `existing`. An already removed entity is returned unchanged.
    pub fn mutate(
        &self,
        schema: &EntitySchema,
        existing: Option<&Entity>,
    ) -> MutationResult<Entity> {
        let Some(existing) = existing else {
            return Err(MutationError::RemovedEntityMissing {
                entity_type: self.entity_type.clone(),
                primary_key: self.primary_key,
            });
        };
        if existing.is_dropped() {
            debug!(
                entity_type = %self.entity_type,
                primary_key = self.primary_key,
                "entity already removed"
            );
            return Ok(existing.clone());
        }
        let mut teardown = removal_mutations(existing);
        sort_mutations(&mut teardown);
        execute(EntityStateExecutor::removal(schema, existing), &teardown)
    }
}

/// A top-level entity mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EntityMutation {
    Upsert(EntityUpsertMutation),
    Remove(EntityRemoveMutation),
}

impl EntityMutation {
    #[must_use]
    pub fn entity_type(&self) -> &str {
        match self {
            Self::Upsert(it) => it.entity_type(),
            Self::Remove(it) => it.entity_type(),
        }
    }

    #[must_use]
    pub fn primary_key(&self) -> Option<PrimaryKey> {
        match self {
            Self::Upsert(it) => it.primary_key(),
            Self::Remove(it) => Some(it.primary_key()),
        }
    }

    #[must_use]
    pub fn expects(&self) -> EntityExistence {
        match self {
            Self::Upsert(it) => it.expects(),
            Self::Remove(it) => it.expects(),
        }
    }

    #[must_use]
    pub fn is_removal(&self) -> bool {
        matches!(self, Self::Remove(_))
    }

    /// Implicit behaviours requested by the mutation.
    #[must_use]
    pub fn implicit_behaviors(&self) -> ImplicitBehaviors {
        match self {
            Self::Upsert(it) => it.implicit_behaviors().clone(),
            Self::Remove(_) => ImplicitBehaviors::all(),
        }
    }

    /// Stored change-units; a removal stores none.
    #[must_use]
    pub fn stored_local_mutations(&self) -> &[LocalMutation] {
        match self {
            Self::Upsert(it) => it.local_mutations(),
            Self::Remove(_) => &[],
        }
    }

    pub fn verify_or_evolve_schema(
        &self,
        catalog: &CatalogSchema,
        schema: &EntitySchema,
        collection_is_empty: bool,
    ) -> SchemaResult<Option<ModifyEntitySchemaMutation>> {
        match self {
            Self::Upsert(it) => it.verify_or_evolve_schema(catalog, schema, collection_is_empty),
            Self::Remove(it) => it.verify_or_evolve_schema(catalog, schema, collection_is_empty),
        }
    }

    pub fn mutate(
        &self,
        schema: &EntitySchema,
        existing: Option<&Entity>,
    ) -> MutationResult<Entity> {
        match self {
            Self::Upsert(it) => it.mutate(schema, existing),
            Self::Remove(it) => it.mutate(schema, existing),
        }
    }
}

impl From<EntityUpsertMutation> for EntityMutation {
    fn from(mutation: EntityUpsertMutation) -> Self {
        Self::Upsert(mutation)
    }
}

impl From<EntityRemoveMutation> for EntityMutation {
    fn from(mutation: EntityRemoveMutation) -> Self {
        Self::Remove(mutation)
    }
}
