//! Copy-on-write entity schema builder.
//!
//! The builder shadows an immutable schema. Nothing is cloned until the
//! first change is applied; every applied change is recorded so the builder
//! can hand out the accumulated diff at the end. A builder that is dropped
//! leaves the original schema untouched.

use crate::error::SchemaResult;
use crate::schema::EntitySchema;
use crate::schema_mutation::{EntitySchemaMutation, ModifyEntitySchemaMutation};
use std::borrow::Cow;

/// Accumulates schema changes on top of an immutable base schema.
#[derive(Debug, Clone)]
pub struct EntitySchemaBuilder<'a> {
    current: Cow<'a, EntitySchema>,
    mutations: Vec<EntitySchemaMutation>,
}

impl<'a> EntitySchemaBuilder<'a> {
    /// Opens a builder over `base`.
    #[must_use]
    pub fn new(base: &'a EntitySchema) -> Self {
        Self {
            current: Cow::Borrowed(base),
            mutations: Vec::new(),
        }
    }

    /// Returns the schema as it looks with all changes so far.
    #[must_use]
    pub fn schema(&self) -> &EntitySchema {
        &self.current
    }

    /// Returns true if at least one change was applied.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        !self.mutations.is_empty()
    }

    /// Applies and records a change.
    pub fn apply(&mut self, mutation: EntitySchemaMutation) -> SchemaResult<()> {
        mutation.mutate(self.current.to_mut())?;
        self.mutations.push(mutation);
        Ok(())
    }

    /// Returns the accumulated diff, or `None` when nothing changed.
    #[must_use]
    pub fn to_mutation(&self) -> Option<ModifyEntitySchemaMutation> {
        self.is_dirty().then(|| {
            ModifyEntitySchemaMutation::new(self.current.name.clone(), self.mutations.clone())
        })
    }
}
