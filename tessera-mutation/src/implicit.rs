//! Implicit mutations: changes the caller did not supply but consistency needs.

use crate::entity_mutation::EntityMutation;
use crate::local::LocalMutation;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A class of implicit mutations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImplicitMutationBehavior {
    /// Fill schema default values of attributes on new entities.
    DefaultAttributes,
    /// Fill schema default values of attributes on newly inserted references.
    DefaultReferenceAttributes,
    /// Mirror references on the referenced entity.
    ReflectedReferences,
}

/// The set of implicit mutation classes to generate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImplicitBehaviors(BTreeSet<ImplicitMutationBehavior>);

impl ImplicitBehaviors {
    #[must_use]
    pub fn all() -> Self {
        Self(BTreeSet::from([
            ImplicitMutationBehavior::DefaultAttributes,
            ImplicitMutationBehavior::DefaultReferenceAttributes,
            ImplicitMutationBehavior::ReflectedReferences,
        ]))
    }

    #[must_use]
    pub fn none() -> Self {
        Self(BTreeSet::new())
    }

    /// Used for mirrored writes: no further reflection.
    #[must_use]
    pub fn reference_attributes_only() -> Self {
        Self(BTreeSet::from([ImplicitMutationBehavior::DefaultReferenceAttributes]))
    }

    #[must_use]
    pub fn contains(&self, behavior: ImplicitMutationBehavior) -> bool {
        self.0.contains(&behavior)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the behaviours present in both sets.
    #[must_use]
    pub fn intersection(&self, other: &Self) -> Self {
        Self(self.0.intersection(&other.0).copied().collect())
    }
}

impl Default for ImplicitBehaviors {
    fn default() -> Self {
        Self::all()
    }
}

impl FromIterator<ImplicitMutationBehavior> for ImplicitBehaviors {
    fn from_iter<I: IntoIterator<Item = ImplicitMutationBehavior>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Output of one implicit-mutation pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImplicitMutations {
    /// Changes folded into the same entity after the explicit ones.
    pub local: Vec<LocalMutation>,
    /// Mutations of other entities, applied by the caller afterwards.
    pub external: Vec<EntityMutation>,
}

impl ImplicitMutations {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.local.is_empty() && self.external.is_empty()
    }
}
