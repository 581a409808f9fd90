//! Change-units: field-level modifications of a single entity.
//!
//! The family of change kinds is closed. Every kind carries a stable numeric
//! identifier used for ordering, a container kind, and a priority. Removal
//! kinds run before additive ones.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tessera_model::{Cardinality, EntityDraft, ModelResult, Price, PriceInnerRecordHandling};
use tessera_types::{
    AssociatedDataKey, AttributeKey, ContainerKind, DecisiveTimestamp, MutationPriority, PriceKey,
    PrimaryKey, ReferenceKey,
};

/// Stable identifier of a change kind.
///
/// The numeric values take part in ordering and must never be renumbered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u16)]
pub enum MutationKind {
    SetParent = 1,
    RemoveParent = 2,
    UpsertAttribute = 10,
    RemoveAttribute = 11,
    UpsertAssociatedData = 20,
    RemoveAssociatedData = 21,
    SetPriceInnerRecordHandling = 30,
    UpsertPrice = 31,
    RemovePrice = 32,
    InsertReference = 40,
    RemoveReference = 41,
    UpsertReferenceAttribute = 42,
    RemoveReferenceAttribute = 43,
}

impl MutationKind {
    #[must_use]
    pub const fn id(self) -> u16 {
        self as u16
    }

    #[must_use]
    pub const fn is_removal(self) -> bool {
        matches!(
            self,
            Self::RemoveParent
                | Self::RemoveAttribute
                | Self::RemoveAssociatedData
                | Self::RemovePrice
                | Self::RemoveReference
                | Self::RemoveReferenceAttribute
        )
    }

    #[must_use]
    pub const fn priority(self) -> MutationPriority {
        if self.is_removal() {
            MutationPriority::REMOVAL
        } else {
            MutationPriority::UPSERT
        }
    }

    #[must_use]
    pub const fn container_kind(self) -> ContainerKind {
        match self {
            Self::SetParent | Self::RemoveParent => ContainerKind::Hierarchy,
            Self::UpsertAttribute | Self::RemoveAttribute => ContainerKind::Attribute,
            Self::UpsertAssociatedData | Self::RemoveAssociatedData => {
                ContainerKind::AssociatedData
            }
            Self::SetPriceInnerRecordHandling | Self::UpsertPrice | Self::RemovePrice => {
                ContainerKind::Price
            }
            Self::InsertReference
            | Self::RemoveReference
            | Self::UpsertReferenceAttribute
            | Self::RemoveReferenceAttribute => ContainerKind::Reference,
        }
    }
}

/// Business key of a change-unit, ordered naturally within one kind.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ComparableKey {
    /// Entity-wide slots (parent, price inner record handling).
    Entity,
    Attribute(AttributeKey),
    AssociatedData(AssociatedDataKey),
    Price(PriceKey),
    Reference(ReferenceKey),
    ReferenceAttribute(ReferenceKey, AttributeKey),
}

/// The payload of a change-unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LocalChange {
    SetParent {
        parent: PrimaryKey,
    },
    RemoveParent,
    UpsertAttribute {
        key: AttributeKey,
        value: Value,
    },
    RemoveAttribute {
        key: AttributeKey,
    },
    UpsertAssociatedData {
        key: AssociatedDataKey,
        value: Value,
    },
    RemoveAssociatedData {
        key: AssociatedDataKey,
    },
    SetPriceInnerRecordHandling {
        handling: PriceInnerRecordHandling,
    },
    UpsertPrice {
        key: PriceKey,
        price: Price,
    },
    RemovePrice {
        key: PriceKey,
    },
    InsertReference {
        key: ReferenceKey,
        referenced_entity_type: String,
        /// Cardinality used when the reference schema has to be created.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cardinality: Option<Cardinality>,
    },
    RemoveReference {
        key: ReferenceKey,
    },
    UpsertReferenceAttribute {
        reference: ReferenceKey,
        key: AttributeKey,
        value: Value,
    },
    RemoveReferenceAttribute {
        reference: ReferenceKey,
        key: AttributeKey,
    },
}

impl LocalChange {
    #[must_use]
    pub fn kind(&self) -> MutationKind {
        match self {
            Self::SetParent { .. } => MutationKind::SetParent,
            Self::RemoveParent => MutationKind::RemoveParent,
            Self::UpsertAttribute { .. } => MutationKind::UpsertAttribute,
            Self::RemoveAttribute { .. } => MutationKind::RemoveAttribute,
            Self::UpsertAssociatedData { .. } => MutationKind::UpsertAssociatedData,
            Self::RemoveAssociatedData { .. } => MutationKind::RemoveAssociatedData,
            Self::SetPriceInnerRecordHandling { .. } => MutationKind::SetPriceInnerRecordHandling,
            Self::UpsertPrice { .. } => MutationKind::UpsertPrice,
            Self::RemovePrice { .. } => MutationKind::RemovePrice,
            Self::InsertReference { .. } => MutationKind::InsertReference,
            Self::RemoveReference { .. } => MutationKind::RemoveReference,
            Self::UpsertReferenceAttribute { .. } => MutationKind::UpsertReferenceAttribute,
            Self::RemoveReferenceAttribute { .. } => MutationKind::RemoveReferenceAttribute,
        }
    }

    #[must_use]
    pub fn comparable_key(&self) -> ComparableKey {
        match self {
            Self::SetParent { .. }
            | Self::RemoveParent
            | Self::SetPriceInnerRecordHandling { .. } => ComparableKey::Entity,
            Self::UpsertAttribute { key, .. } | Self::RemoveAttribute { key } => {
                ComparableKey::Attribute(key.clone())
            }
            Self::UpsertAssociatedData { key, .. } | Self::RemoveAssociatedData { key } => {
                ComparableKey::AssociatedData(key.clone())
            }
            Self::UpsertPrice { key, .. } | Self::RemovePrice { key } => {
                ComparableKey::Price(key.clone())
            }
            Self::InsertReference { key, .. } | Self::RemoveReference { key } => {
                ComparableKey::Reference(key.clone())
            }
            Self::UpsertReferenceAttribute { reference, key, .. }
            | Self::RemoveReferenceAttribute { reference, key } => {
                ComparableKey::ReferenceAttribute(reference.clone(), key.clone())
            }
        }
    }
}

/// A single change-unit targeting one part of an entity.
///
/// Immutable once accepted into an entity mutation; the decisive timestamp is
/// assigned at that moment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalMutation {
    change: LocalChange,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    decisive_timestamp: Option<DecisiveTimestamp>,
}

impl LocalMutation {
    #[must_use]
    pub fn new(change: LocalChange) -> Self {
        Self {
            change,
            decisive_timestamp: None,
        }
    }

    pub fn set_parent(parent: PrimaryKey) -> Self {
        Self::new(LocalChange::SetParent { parent })
    }

    pub fn remove_parent() -> Self {
        Self::new(LocalChange::RemoveParent)
    }

    pub fn upsert_attribute(name: impl Into<String>, value: Value) -> Self {
        Self::new(LocalChange::UpsertAttribute {
            key: AttributeKey::new(name),
            value,
        })
    }

    pub fn remove_attribute(name: impl Into<String>) -> Self {
        Self::new(LocalChange::RemoveAttribute {
            key: AttributeKey::new(name),
        })
    }

    pub fn upsert_associated_data(name: impl Into<String>, value: Value) -> Self {
        Self::new(LocalChange::UpsertAssociatedData {
            key: AssociatedDataKey::new(name),
            value,
        })
    }

    pub fn remove_associated_data(name: impl Into<String>) -> Self {
        Self::new(LocalChange::RemoveAssociatedData {
            key: AssociatedDataKey::new(name),
        })
    }

    pub fn set_price_inner_record_handling(handling: PriceInnerRecordHandling) -> Self {
        Self::new(LocalChange::SetPriceInnerRecordHandling { handling })
    }

    pub fn upsert_price(key: PriceKey, price: Price) -> Self {
        Self::new(LocalChange::UpsertPrice { key, price })
    }

    pub fn remove_price(key: PriceKey) -> Self {
        Self::new(LocalChange::RemovePrice { key })
    }

    pub fn insert_reference(
        name: impl Into<String>,
        primary_key: PrimaryKey,
        referenced_entity_type: impl Into<String>,
    ) -> Self {
        Self::new(LocalChange::InsertReference {
            key: ReferenceKey::new(name, primary_key),
            referenced_entity_type: referenced_entity_type.into(),
            cardinality: None,
        })
    }

    pub fn remove_reference(name: impl Into<String>, primary_key: PrimaryKey) -> Self {
        Self::new(LocalChange::RemoveReference {
            key: ReferenceKey::new(name, primary_key),
        })
    }

    pub fn upsert_reference_attribute(
        reference: ReferenceKey,
        name: impl Into<String>,
        value: Value,
    ) -> Self {
        Self::new(LocalChange::UpsertReferenceAttribute {
            reference,
            key: AttributeKey::new(name),
            value,
        })
    }

    pub fn remove_reference_attribute(reference: ReferenceKey, name: impl Into<String>) -> Self {
        Self::new(LocalChange::RemoveReferenceAttribute {
            reference,
            key: AttributeKey::new(name),
        })
    }

    /// Returns a copy stamped with the given decisive timestamp.
    #[must_use]
    pub fn with_decisive_timestamp(&self, timestamp: DecisiveTimestamp) -> Self {
        Self {
            change: self.change.clone(),
            decisive_timestamp: Some(timestamp),
        }
    }

    #[must_use]
    pub fn change(&self) -> &LocalChange {
        &self.change
    }

    #[must_use]
    pub fn kind(&self) -> MutationKind {
        self.change.kind()
    }

    #[must_use]
    pub fn container_kind(&self) -> ContainerKind {
        self.kind().container_kind()
    }

    #[must_use]
    pub fn priority(&self) -> MutationPriority {
        self.kind().priority()
    }

    /// Returns true if the change-unit only removes data.
    #[must_use]
    pub fn is_removal(&self) -> bool {
        self.kind().is_removal()
    }

    #[must_use]
    pub fn comparable_key(&self) -> ComparableKey {
        self.change.comparable_key()
    }

    #[must_use]
    pub fn decisive_timestamp(&self) -> Option<DecisiveTimestamp> {
        self.decisive_timestamp
    }

    /// Folds the change into `draft`.
    pub fn apply_to(&self, draft: &mut EntityDraft) -> ModelResult<()> {
        match &self.change {
            LocalChange::SetParent { parent } => draft.set_parent(*parent),
            LocalChange::RemoveParent => draft.remove_parent()?,
            LocalChange::UpsertAttribute { key, value } => {
                draft.upsert_attribute(key.clone(), value.clone());
            }
            LocalChange::RemoveAttribute { key } => draft.remove_attribute(key)?,
            LocalChange::UpsertAssociatedData { key, value } => {
                draft.upsert_associated_data(key.clone(), value.clone());
            }
            LocalChange::RemoveAssociatedData { key } => draft.remove_associated_data(key)?,
            LocalChange::SetPriceInnerRecordHandling { handling } => {
                draft.set_price_inner_record_handling(*handling);
            }
            LocalChange::UpsertPrice { key, price } => {
                draft.upsert_price(key.clone(), price.clone());
            }
            LocalChange::RemovePrice { key } => draft.remove_price(key)?,
            LocalChange::InsertReference {
                key,
                referenced_entity_type,
                ..
            } => draft.insert_reference(key.clone(), referenced_entity_type),
            LocalChange::RemoveReference { key } => draft.remove_reference(key)?,
            LocalChange::UpsertReferenceAttribute {
                reference,
                key,
                value,
            } => draft.upsert_reference_attribute(reference, key.clone(), value.clone())?,
            LocalChange::RemoveReferenceAttribute { reference, key } => {
                draft.remove_reference_attribute(reference, key)?;
            }
        }
        Ok(())
    }
}

impl From<LocalChange> for LocalMutation {
    fn from(change: LocalChange) -> Self {
        Self::new(change)
    }
}
