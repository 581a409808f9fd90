//! Working copy used to fold change-units into a new entity snapshot.
//!
//! A draft starts either from an existing snapshot or from an empty shell.
//! Every container operation records whether it changed anything; values
//! that would be set to what they already hold are left untouched so that
//! redundant writes never bump versions.

use crate::entity::{Entity, Price, PriceInnerRecordHandling, Reference, Versioned};
use crate::error::{ModelError, ModelResult};
use serde_json::Value;
use tessera_types::{
    AssociatedDataKey, AttributeKey, ContainerKind, PriceKey, PrimaryKey, ReferenceKey,
};

/// Mutable working copy of an entity.
#[derive(Debug, Clone)]
pub struct EntityDraft {
    entity: Entity,
    base_version: Option<u32>,
    changed: bool,
}

impl EntityDraft {
    /// Starts a draft for an entity that does not exist yet.
    #[must_use]
    pub fn new(entity_type: impl Into<String>, primary_key: Option<PrimaryKey>) -> Self {
        Self {
            entity: Entity::shell(entity_type, primary_key),
            base_version: None,
            changed: false,
        }
    }

    /// Starts a draft on top of an existing snapshot.
    #[must_use]
    pub fn from_entity(entity: &Entity) -> Self {
        Self {
            base_version: Some(entity.version),
            entity: entity.clone(),
            changed: false,
        }
    }

    /// Returns the current state of the draft.
    #[must_use]
    pub fn entity(&self) -> &Entity {
        &self.entity
    }

    /// Returns true if the draft was started from an empty shell.
    #[must_use]
    pub fn is_new(&self) -> bool {
        self.base_version.is_none()
    }

    /// Returns true if any operation changed the draft.
    #[must_use]
    pub fn is_changed(&self) -> bool {
        self.changed
    }

    fn mark_changed(&mut self) {
        self.changed = true;
        // writing into a removed entity revives it
        self.entity.dropped = false;
    }

    /// Assigns the primary key of a new entity.
    pub fn assign_primary_key(&mut self, primary_key: PrimaryKey) {
        self.entity.primary_key = Some(primary_key);
    }

    // ── Hierarchy ────────────────────────────────────────────────

    pub fn set_parent(&mut self, parent: PrimaryKey) {
        match self.entity.parent.as_mut() {
            Some(existing) if existing.exists() && *existing.value() == parent => {}
            Some(existing) => {
                existing.replace(parent);
                self.mark_changed();
            }
            None => {
                self.entity.parent = Some(Versioned::new(parent));
                self.mark_changed();
            }
        }
    }

    pub fn remove_parent(&mut self) -> ModelResult<()> {
        match self.entity.parent.as_mut().filter(|it| it.exists()) {
            Some(existing) => {
                existing.tombstone();
                self.mark_changed();
                Ok(())
            }
            None => Err(missing(&self.entity.entity_type, ContainerKind::Hierarchy, "parent")),
        }
    }

    // ── Attributes ───────────────────────────────────────────────

    pub fn upsert_attribute(&mut self, key: AttributeKey, value: Value) {
        if upsert_value(&mut self.entity.attributes, key, value) {
            self.mark_changed();
        }
    }

    pub fn remove_attribute(&mut self, key: &AttributeKey) -> ModelResult<()> {
        if tombstone_value(&mut self.entity.attributes, key) {
            self.mark_changed();
            Ok(())
        } else {
            Err(missing(&self.entity.entity_type, ContainerKind::Attribute, key))
        }
    }

    // ── Associated data ──────────────────────────────────────────

    pub fn upsert_associated_data(&mut self, key: AssociatedDataKey, value: Value) {
        if upsert_value(&mut self.entity.associated_data, key, value) {
            self.mark_changed();
        }
    }

    pub fn remove_associated_data(&mut self, key: &AssociatedDataKey) -> ModelResult<()> {
        if tombstone_value(&mut self.entity.associated_data, key) {
            self.mark_changed();
            Ok(())
        } else {
            Err(missing(&self.entity.entity_type, ContainerKind::AssociatedData, key))
        }
    }

    // ── References ───────────────────────────────────────────────

    /// Inserts a reference; inserting a live reference again is a no-op.
    pub fn insert_reference(&mut self, key: ReferenceKey, referenced_entity_type: &str) {
        match self.entity.references.get_mut(&key) {
            Some(existing) if existing.exists() => {}
            Some(existing) => {
                existing.replace(Reference::new(referenced_entity_type));
                self.mark_changed();
            }
            None => {
                self.entity
                    .references
                    .insert(key, Versioned::new(Reference::new(referenced_entity_type)));
                self.mark_changed();
            }
        }
    }

    /// Removes a reference together with all of its attributes.
    pub fn remove_reference(&mut self, key: &ReferenceKey) -> ModelResult<()> {
        match self.entity.references.get_mut(key).filter(|it| it.exists()) {
            Some(existing) => {
                for attribute in existing.value_mut().attributes_mut().values_mut() {
                    if attribute.exists() {
                        attribute.tombstone();
                    }
                }
                existing.tombstone();
                self.mark_changed();
                Ok(())
            }
            None => Err(missing(&self.entity.entity_type, ContainerKind::Reference, key)),
        }
    }

    pub fn upsert_reference_attribute(
        &mut self,
        reference: &ReferenceKey,
        key: AttributeKey,
        value: Value,
    ) -> ModelResult<()> {
        let Some(existing) = self
            .entity
            .references
            .get_mut(reference)
            .filter(|it| it.exists())
        else {
            return Err(missing(&self.entity.entity_type, ContainerKind::Reference, reference));
        };
        if upsert_value(existing.value_mut().attributes_mut(), key, value) {
            existing.touch();
            self.mark_changed();
        }
        Ok(())
    }

    pub fn remove_reference_attribute(
        &mut self,
        reference: &ReferenceKey,
        key: &AttributeKey,
    ) -> ModelResult<()> {
        let Some(existing) = self
            .entity
            .references
            .get_mut(reference)
            .filter(|it| it.exists())
        else {
            return Err(missing(&self.entity.entity_type, ContainerKind::Reference, reference));
        };
        if tombstone_value(existing.value_mut().attributes_mut(), key) {
            existing.touch();
            self.mark_changed();
            Ok(())
        } else {
            Err(missing(
                &self.entity.entity_type,
                ContainerKind::Reference,
                format!("{reference}/{key}"),
            ))
        }
    }

    // ── Prices ───────────────────────────────────────────────────

    pub fn upsert_price(&mut self, key: PriceKey, price: Price) {
        if upsert_value(&mut self.entity.prices, key, price) {
            self.mark_changed();
        }
    }

    pub fn remove_price(&mut self, key: &PriceKey) -> ModelResult<()> {
        if tombstone_value(&mut self.entity.prices, key) {
            self.mark_changed();
            Ok(())
        } else {
            Err(missing(&self.entity.entity_type, ContainerKind::Price, key))
        }
    }

    pub fn set_price_inner_record_handling(&mut self, handling: PriceInnerRecordHandling) {
        if self.entity.price_inner_record_handling != handling {
            self.entity.price_inner_record_handling = handling;
            self.mark_changed();
        }
    }

    // ── Entity ───────────────────────────────────────────────────

    /// Marks the entity itself as removed.
    pub fn mark_dropped(&mut self) {
        if !self.entity.dropped {
            self.entity.dropped = true;
            self.changed = true;
        }
    }

    /// Produces the new snapshot.
    ///
    /// The version grows by exactly one when anything changed (or the entity
    /// is new); an unchanged draft of an existing entity returns it as-is.
    #[must_use]
    pub fn finish(self) -> Entity {
        let mut entity = self.entity;
        match self.base_version {
            None => entity.version = 1,
            Some(base) if self.changed => entity.version = base + 1,
            Some(_) => {}
        }
        entity
    }
}

fn missing(entity_type: &str, container: ContainerKind, key: impl ToString) -> ModelError {
    ModelError::ValueNotFound {
        entity_type: entity_type.to_string(),
        container,
        key: key.to_string(),
    }
}

fn upsert_value<K: Ord, V: PartialEq>(
    values: &mut std::collections::BTreeMap<K, Versioned<V>>,
    key: K,
    value: V,
) -> bool {
    match values.get_mut(&key) {
        Some(existing) if existing.exists() && *existing.value() == value => false,
        Some(existing) => {
            existing.replace(value);
            true
        }
        None => {
            values.insert(key, Versioned::new(value));
            true
        }
    }
}

fn tombstone_value<K: Ord, V>(
    values: &mut std::collections::BTreeMap<K, Versioned<V>>,
    key: &K,
) -> bool {
    match values.get_mut(key).filter(|it| it.exists()) {
        Some(existing) => {
            existing.tombstone();
            true
        }
        None => false,
    }
}
