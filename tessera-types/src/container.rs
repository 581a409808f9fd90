//! Container kinds and mutation priorities.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The logical part of an entity a change targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContainerKind {
    /// The entity as a whole (entity-level mutations).
    Entity,
    /// Placement in the entity hierarchy (parent pointer).
    Hierarchy,
    /// Entity attributes.
    Attribute,
    /// Associated data.
    AssociatedData,
    /// Prices and price inner record handling.
    Price,
    /// References and their attributes.
    Reference,
}

impl fmt::Display for ContainerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Entity => "entity",
            Self::Hierarchy => "hierarchy",
            Self::Attribute => "attribute",
            Self::AssociatedData => "associated_data",
            Self::Price => "price",
            Self::Reference => "reference",
        };
        f.write_str(label)
    }
}

/// Application priority of a change-unit. Higher priorities apply first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MutationPriority(i32);

impl MutationPriority {
    /// Priority of removal-class changes.
    pub const REMOVAL: Self = Self(10);
    /// Priority of additive changes.
    pub const UPSERT: Self = Self(0);

    /// Creates a custom priority.
    #[must_use]
    pub const fn new(value: i32) -> Self {
        Self(value)
    }

    /// Returns the raw priority value.
    #[must_use]
    pub const fn value(&self) -> i32 {
        self.0
    }
}
