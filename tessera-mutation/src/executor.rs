//! Local mutation executor contract and the in-memory entity executor.
//!
//! One executor instance serves exactly one entity-mutation application:
//! every change-unit is applied in final order, then exactly one of
//! [`commit`](LocalMutationExecutor::commit) or
//! [`rollback`](LocalMutationExecutor::rollback) consumes the executor.

use crate::entity_mutation::{EntityExistence, EntityMutation, EntityUpsertMutation};
use crate::error::{MutationError, MutationResult};
use crate::implicit::{ImplicitBehaviors, ImplicitMutationBehavior, ImplicitMutations};
use crate::local::{LocalChange, LocalMutation};
use crate::ordering::sort_mutations;
use tessera_model::{Entity, EntityDraft, EntitySchema};
use tessera_types::PrimaryKey;
use tracing::debug;

/// Applies change-units to some in-memory state.
pub trait LocalMutationExecutor {
    /// What a successful commit produces.
    type Output;

    /// Applies one change-unit.
    fn apply(&mut self, mutation: &LocalMutation) -> MutationResult<()>;

    /// Finalizes the accumulated state.
    fn commit(self) -> MutationResult<Self::Output>;

    /// Discards all partially applied state.
    fn rollback(self);
}

/// Executor that also verifies consistency and derives implicit mutations.
pub trait ConsistencyCheckingLocalMutationExecutor: LocalMutationExecutor {
    /// Checks the state after all changes are applied.
    fn verify_consistency(&self) -> MutationResult<()>;

    /// Derives implicit mutations for the applied `input` changes.
    ///
    /// Pure with respect to the executor state: calling it twice yields the
    /// same result.
    fn implicit_mutations(
        &self,
        input: &[LocalMutation],
        behaviors: &ImplicitBehaviors,
    ) -> ImplicitMutations;
}

/// Result of a consistency-checked application.
#[derive(Debug)]
pub struct Executed<T> {
    pub output: T,
    /// Implicit changes folded into the same entity.
    pub implicit_local: Vec<LocalMutation>,
    /// Mutations of other entities the caller has to apply.
    pub external: Vec<EntityMutation>,
}

/// Applies sorted change-units and commits, rolling back on the first error.
pub fn execute<E: LocalMutationExecutor>(
    mut executor: E,
    mutations: &[LocalMutation],
) -> MutationResult<E::Output> {
    for mutation in mutations {
        if let Err(err) = executor.apply(mutation) {
            executor.rollback();
            return Err(err);
        }
    }
    executor.commit()
}

/// Runs the full protocol: explicit changes, implicit local changes,
/// consistency check (when `verify` is set), then commit or rollback.
///
/// Implicit mutations of a failed attempt are never returned.
pub fn execute_with_consistency<E: ConsistencyCheckingLocalMutationExecutor>(
    mut executor: E,
    mutations: &[LocalMutation],
    behaviors: &ImplicitBehaviors,
    verify: bool,
) -> MutationResult<Executed<E::Output>> {
    match run_phases(&mut executor, mutations, behaviors, verify) {
        Ok(implicit) => Ok(Executed {
            output: executor.commit()?,
            implicit_local: implicit.local,
            external: implicit.external,
        }),
        Err(err) => {
            executor.rollback();
            Err(err)
        }
    }
}

fn run_phases<E: ConsistencyCheckingLocalMutationExecutor>(
    executor: &mut E,
    mutations: &[LocalMutation],
    behaviors: &ImplicitBehaviors,
    verify: bool,
) -> MutationResult<ImplicitMutations> {
    for mutation in mutations {
        executor.apply(mutation)?;
    }
    let mut implicit = executor.implicit_mutations(mutations, behaviors);
    sort_mutations(&mut implicit.local);
    for mutation in &implicit.local {
        executor.apply(mutation)?;
    }
    if verify {
        executor.verify_consistency()?;
    }
    debug!(
        local = implicit.local.len(),
        external = implicit.external.len(),
        "implicit mutations derived"
    );
    Ok(implicit)
}

/// Folds change-units into an [`EntityDraft`] and produces the new snapshot.
#[derive(Debug)]
pub struct EntityStateExecutor<'s> {
    schema: &'s EntitySchema,
    draft: EntityDraft,
    removal: bool,
    reflected_behaviors: ImplicitBehaviors,
}

impl<'s> EntityStateExecutor<'s> {
    /// Executor for an upsert over `existing`, or over a fresh shell.
    #[must_use]
    pub fn upsert(
        schema: &'s EntitySchema,
        existing: Option<&Entity>,
        entity_type: &str,
        primary_key: Option<PrimaryKey>,
    ) -> Self {
        let draft = match existing {
            Some(entity) => EntityDraft::from_entity(entity),
            None => EntityDraft::new(entity_type, primary_key),
        };
        Self {
            schema,
            draft,
            removal: false,
            reflected_behaviors: ImplicitBehaviors::reference_attributes_only(),
        }
    }

    /// Executor for the removal of `existing`. The committed entity is tombstoned.
    #[must_use]
    pub fn removal(schema: &'s EntitySchema, existing: &Entity) -> Self {
        Self {
            schema,
            draft: EntityDraft::from_entity(existing),
            removal: true,
            reflected_behaviors: ImplicitBehaviors::reference_attributes_only(),
        }
    }

    /// Sets the behaviours carried by generated reflected mutations.
    #[must_use]
    pub fn with_reflected_behaviors(mut self, behaviors: ImplicitBehaviors) -> Self {
        self.reflected_behaviors = behaviors;
        self
    }

    /// Returns the entity as it looks with the changes applied so far.
    #[must_use]
    pub fn entity(&self) -> &Entity {
        self.draft.entity()
    }

    fn default_attributes(&self, implicit: &mut ImplicitMutations) {
        if !self.draft.is_new() {
            return;
        }
        let entity = self.draft.entity();
        for attribute in self.schema.attributes.values() {
            if let Some(default) = &attribute.default_value {
                if entity.attribute(&attribute.name).is_none() {
                    let name = attribute.name.clone();
                    implicit
                        .local
                        .push(LocalMutation::upsert_attribute(name, default.clone()));
                }
            }
        }
    }

    fn default_reference_attributes(
        &self,
        input: &[LocalMutation],
        implicit: &mut ImplicitMutations,
    ) {
        let entity = self.draft.entity();
        for mutation in input {
            let LocalChange::InsertReference { key, .. } = mutation.change() else {
                continue;
            };
            let Some(reference_schema) = self.schema.reference(key.name()) else {
                continue;
            };
            let reference = entity.reference(key);
            for attribute in reference_schema.attributes.values() {
                let Some(default) = &attribute.default_value else {
                    continue;
                };
                if reference.and_then(|it| it.attribute(&attribute.name)).is_none() {
                    implicit.local.push(LocalMutation::upsert_reference_attribute(
                        key.clone(),
                        attribute.name.clone(),
                        default.clone(),
                    ));
                }
            }
        }
    }

    fn reflected_references(&self, input: &[LocalMutation], implicit: &mut ImplicitMutations) {
        let Some(own_primary_key) = self.draft.entity().primary_key() else {
            return;
        };
        for mutation in input {
            let (key, inserted) = match mutation.change() {
                LocalChange::InsertReference { key, .. } => (key, true),
                LocalChange::RemoveReference { key } => (key, false),
                _ => continue,
            };
            let Some(reference_schema) = self.schema.reference(key.name()) else {
                continue;
            };
            let Some(reflected_name) = &reference_schema.reflected_in else {
                continue;
            };
            let change = if inserted {
                LocalMutation::insert_reference(
                    reflected_name.clone(),
                    own_primary_key,
                    self.schema.name.clone(),
                )
            } else {
                LocalMutation::remove_reference(reflected_name.clone(), own_primary_key)
            };
            let reflected = EntityUpsertMutation::new(
                reference_schema.referenced_entity_type.clone(),
                Some(key.primary_key()),
                EntityExistence::MustExist,
                [change],
            )
            .with_implicit_behaviors(self.reflected_behaviors.clone());
            implicit.external.push(EntityMutation::Upsert(reflected));
        }
    }
}

impl LocalMutationExecutor for EntityStateExecutor<'_> {
    type Output = Entity;

    fn apply(&mut self, mutation: &LocalMutation) -> MutationResult<()> {
        mutation.apply_to(&mut self.draft)?;
        Ok(())
    }

    fn commit(mut self) -> MutationResult<Entity> {
        if self.removal {
            self.draft.mark_dropped();
        }
        let entity = self.draft.finish();
        debug!(
            entity_type = entity.entity_type(),
            primary_key = ?entity.primary_key(),
            version = entity.version(),
            dropped = entity.is_dropped(),
            "entity committed"
        );
        Ok(entity)
    }

    fn rollback(self) {
        debug!(
            entity_type = self.draft.entity().entity_type(),
            primary_key = ?self.draft.entity().primary_key(),
            "entity mutation rolled back"
        );
    }
}

impl ConsistencyCheckingLocalMutationExecutor for EntityStateExecutor<'_> {
    fn verify_consistency(&self) -> MutationResult<()> {
        if self.removal {
            return Ok(());
        }
        let entity = self.draft.entity();
        let entity_type = entity.entity_type().to_string();

        let missing: Vec<String> = self
            .schema
            .attributes
            .values()
            .filter(|it| !it.nullable && entity.attribute(&it.name).is_none())
            .map(|it| it.name.clone())
            .collect();
        if !missing.is_empty() {
            return Err(MutationError::MandatoryAttributesMissing {
                entity_type,
                names: missing,
            });
        }

        let missing: Vec<String> = self
            .schema
            .associated_data
            .values()
            .filter(|it| !it.nullable && entity.associated_data(&it.name).is_none())
            .map(|it| it.name.clone())
            .collect();
        if !missing.is_empty() {
            return Err(MutationError::MandatoryAssociatedDataMissing {
                entity_type,
                names: missing,
            });
        }

        for reference in self.schema.references.values() {
            let count = entity.references_named(&reference.name).count();
            let too_many = reference.cardinality.max().is_some_and(|max| count > max);
            if count < reference.cardinality.min() || too_many {
                return Err(MutationError::CardinalityViolation {
                    entity_type,
                    reference: reference.name.clone(),
                    count,
                    cardinality: format!("{:?}", reference.cardinality),
                });
            }
        }
        Ok(())
    }

    fn implicit_mutations(
        &self,
        input: &[LocalMutation],
        behaviors: &ImplicitBehaviors,
    ) -> ImplicitMutations {
        let mut implicit = ImplicitMutations::default();
        if !self.removal {
            if behaviors.contains(ImplicitMutationBehavior::DefaultAttributes) {
                self.default_attributes(&mut implicit);
            }
            if behaviors.contains(ImplicitMutationBehavior::DefaultReferenceAttributes) {
                self.default_reference_attributes(input, &mut implicit);
            }
        }
        if behaviors.contains(ImplicitMutationBehavior::ReflectedReferences) {
            self.reflected_references(input, &mut implicit);
        }
        implicit
    }
}
