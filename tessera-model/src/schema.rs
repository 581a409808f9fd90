use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// The data type of an attribute or associated data value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    String,
    Integer,
    Decimal,
    Boolean,
    /// Arbitrary JSON (arrays, objects, null).
    Json,
}

impl ValueType {
    /// Infers the narrowest type describing a value.
    #[must_use]
    pub fn of(value: &Value) -> Self {
        match value {
            Value::String(_) => Self::String,
            Value::Number(number) if number.is_i64() || number.is_u64() => Self::Integer,
            Value::Number(_) => Self::Decimal,
            Value::Bool(_) => Self::Boolean,
            Value::Null | Value::Array(_) | Value::Object(_) => Self::Json,
        }
    }

    /// Returns true if a value of this type may be stored under `self`.
    #[must_use]
    pub fn accepts(&self, value: &Value) -> bool {
        match (self, Self::of(value)) {
            (Self::Json, _) => true,
            (Self::Decimal, Self::Integer) => true,
            (expected, actual) => *expected == actual,
        }
    }
}

/// Describes an attribute of an entity, a reference, or the whole catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeSchema {
    pub name: String,
    pub value_type: ValueType,
    pub nullable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<Value>,
}

impl AttributeSchema {
    /// A nullable attribute without default value.
    pub fn new(name: impl Into<String>, value_type: ValueType) -> Self {
        Self {
            name: name.into(),
            value_type,
            nullable: true,
            default_value: None,
        }
    }

    /// Infers the schema from the first value written (auto-evolution).
    pub fn inferred(name: impl Into<String>, value: &Value) -> Self {
        Self::new(name, ValueType::of(value))
    }

    /// Marks the attribute as mandatory.
    pub fn non_nullable(mut self) -> Self {
        self.nullable = false;
        self
    }

    /// Sets the value used when an entity does not provide one.
    pub fn with_default(mut self, value: Value) -> Self {
        self.default_value = Some(value);
        self
    }
}

/// Describes an associated data value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssociatedDataSchema {
    pub name: String,
    pub value_type: ValueType,
    pub nullable: bool,
}

impl AssociatedDataSchema {
    pub fn new(name: impl Into<String>, value_type: ValueType) -> Self {
        Self {
            name: name.into(),
            value_type,
            nullable: true,
        }
    }

    pub fn inferred(name: impl Into<String>, value: &Value) -> Self {
        Self::new(name, ValueType::of(value))
    }

    pub fn non_nullable(mut self) -> Self {
        self.nullable = false;
        self
    }
}

/// How many references of one name an entity may hold.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cardinality {
    ZeroOrOne,
    ExactlyOne,
    #[default]
    ZeroOrMore,
    OneOrMore,
}

impl Cardinality {
    /// Minimum number of live references required.
    #[must_use]
    pub fn min(&self) -> usize {
        match self {
            Self::ZeroOrOne | Self::ZeroOrMore => 0,
            Self::ExactlyOne | Self::OneOrMore => 1,
        }
    }

    /// Maximum number of live references allowed.
    #[must_use]
    pub fn max(&self) -> Option<usize> {
        match self {
            Self::ZeroOrOne | Self::ExactlyOne => Some(1),
            Self::ZeroOrMore | Self::OneOrMore => None,
        }
    }
}

/// Describes a named reference to another entity type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceSchema {
    pub name: String,
    pub referenced_entity_type: String,
    pub cardinality: Cardinality,
    #[serde(default)]
    pub attributes: BTreeMap<String, AttributeSchema>,
    /// Name of the reference on the referenced entity that mirrors this one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reflected_in: Option<String>,
}

impl ReferenceSchema {
    pub fn new(
        name: impl Into<String>,
        referenced_entity_type: impl Into<String>,
        cardinality: Cardinality,
    ) -> Self {
        Self {
            name: name.into(),
            referenced_entity_type: referenced_entity_type.into(),
            cardinality,
            attributes: BTreeMap::new(),
            reflected_in: None,
        }
    }

    pub fn with_attribute(mut self, attribute: AttributeSchema) -> Self {
        self.attributes.insert(attribute.name.clone(), attribute);
        self
    }

    /// Declares that the referenced entity mirrors this reference under `name`.
    pub fn reflected_in(mut self, name: impl Into<String>) -> Self {
        self.reflected_in = Some(name.into());
        self
    }
}

/// Schema changes an entity collection tolerates without explicit schema edits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvolutionMode {
    /// Switch between generated and externally assigned primary keys
    /// (only while the collection is empty).
    AdaptPrimaryKeyGeneration,
    AddingAttributes,
    AddingAssociatedData,
    AddingReferences,
    AddingPrices,
    AddingCurrencies,
    AddingHierarchy,
}

impl EvolutionMode {
    /// All evolution modes.
    pub const ALL: [Self; 7] = [
        Self::AdaptPrimaryKeyGeneration,
        Self::AddingAttributes,
        Self::AddingAssociatedData,
        Self::AddingReferences,
        Self::AddingPrices,
        Self::AddingCurrencies,
        Self::AddingHierarchy,
    ];
}

impl fmt::Display for EvolutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::AdaptPrimaryKeyGeneration => "adapt_primary_key_generation",
            Self::AddingAttributes => "adding_attributes",
            Self::AddingAssociatedData => "adding_associated_data",
            Self::AddingReferences => "adding_references",
            Self::AddingPrices => "adding_prices",
            Self::AddingCurrencies => "adding_currencies",
            Self::AddingHierarchy => "adding_hierarchy",
        };
        f.write_str(label)
    }
}

/// Describes the shape of one entity type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitySchema {
    pub name: String,
    pub version: u32,
    pub with_generated_primary_key: bool,
    pub with_hierarchy: bool,
    pub with_price: bool,
    #[serde(default)]
    pub currencies: BTreeSet<String>,
    #[serde(default)]
    pub attributes: BTreeMap<String, AttributeSchema>,
    #[serde(default)]
    pub associated_data: BTreeMap<String, AssociatedDataSchema>,
    #[serde(default)]
    pub references: BTreeMap<String, ReferenceSchema>,
    #[serde(default)]
    pub evolution_mode: BTreeSet<EvolutionMode>,
}

impl EntitySchema {
    /// A fresh schema: externally assigned keys, nothing declared, every
    /// evolution mode allowed.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: 1,
            with_generated_primary_key: false,
            with_hierarchy: false,
            with_price: false,
            currencies: BTreeSet::new(),
            attributes: BTreeMap::new(),
            associated_data: BTreeMap::new(),
            references: BTreeMap::new(),
            evolution_mode: EvolutionMode::ALL.into_iter().collect(),
        }
    }

    /// Returns true if the schema may evolve in the given way.
    #[must_use]
    pub fn allows(&self, mode: EvolutionMode) -> bool {
        self.evolution_mode.contains(&mode)
    }

    pub fn with_generated_primary_key(mut self, generated: bool) -> Self {
        self.with_generated_primary_key = generated;
        self
    }

    /// Replaces the allowed evolution modes.
    pub fn with_evolution(mut self, modes: impl IntoIterator<Item = EvolutionMode>) -> Self {
        self.evolution_mode = modes.into_iter().collect();
        self
    }

    /// Disallows every evolution mode.
    pub fn strict(self) -> Self {
        self.with_evolution([])
    }

    pub fn with_hierarchy(mut self) -> Self {
        self.with_hierarchy = true;
        self
    }

    pub fn with_price_in<S: Into<String>>(
        mut self,
        currencies: impl IntoIterator<Item = S>,
    ) -> Self {
        self.with_price = true;
        self.currencies.extend(currencies.into_iter().map(Into::into));
        self
    }

    pub fn with_attribute(mut self, attribute: AttributeSchema) -> Self {
        self.attributes.insert(attribute.name.clone(), attribute);
        self
    }

    pub fn with_associated_data(mut self, associated_data: AssociatedDataSchema) -> Self {
        self.associated_data
            .insert(associated_data.name.clone(), associated_data);
        self
    }

    pub fn with_reference(mut self, reference: ReferenceSchema) -> Self {
        self.references.insert(reference.name.clone(), reference);
        self
    }

    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&AttributeSchema> {
        self.attributes.get(name)
    }

    #[must_use]
    pub fn associated_data(&self, name: &str) -> Option<&AssociatedDataSchema> {
        self.associated_data.get(name)
    }

    #[must_use]
    pub fn reference(&self, name: &str) -> Option<&ReferenceSchema> {
        self.references.get(name)
    }
}

/// Schema changes a catalog tolerates without explicit schema edits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CatalogEvolutionMode {
    /// Create an entity collection on first write of an unknown type.
    AddingEntityTypes,
}

/// Catalog-wide schema: shared (global) attributes and catalog settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogSchema {
    pub name: String,
    pub version: u32,
    /// Attributes whose definition is shared by every entity type.
    #[serde(default)]
    pub attributes: BTreeMap<String, AttributeSchema>,
    #[serde(default)]
    pub evolution_mode: BTreeSet<CatalogEvolutionMode>,
}

impl CatalogSchema {
    /// A fresh catalog schema allowing new entity types.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: 1,
            attributes: BTreeMap::new(),
            evolution_mode: BTreeSet::from([CatalogEvolutionMode::AddingEntityTypes]),
        }
    }

    pub fn with_global_attribute(mut self, attribute: AttributeSchema) -> Self {
        self.attributes.insert(attribute.name.clone(), attribute);
        self
    }

    pub fn strict(mut self) -> Self {
        self.evolution_mode.clear();
        self
    }

    #[must_use]
    pub fn global_attribute(&self, name: &str) -> Option<&AttributeSchema> {
        self.attributes.get(name)
    }

    #[must_use]
    pub fn allows(&self, mode: CatalogEvolutionMode) -> bool {
        self.evolution_mode.contains(&mode)
    }
}
