use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use tessera_types::{AssociatedDataKey, AttributeKey, PriceKey, PrimaryKey, ReferenceKey};

/// A value inside an entity together with its own version and tombstone.
///
/// Values are never physically removed by a mutation; removal marks them
/// `dropped` and bumps their version so that readers and indexes can observe
/// the transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Versioned<T> {
    value: T,
    version: u32,
    dropped: bool,
}

impl<T> Versioned<T> {
    /// Wraps a freshly created value (version 1).
    #[must_use]
    pub fn new(value: T) -> Self {
        Self {
            value,
            version: 1,
            dropped: false,
        }
    }

    /// Returns the wrapped value.
    #[must_use]
    pub fn value(&self) -> &T {
        &self.value
    }

    /// Returns the value version.
    #[must_use]
    pub fn version(&self) -> u32 {
        self.version
    }

    /// Returns true if the value was removed (tombstoned).
    #[must_use]
    pub fn is_dropped(&self) -> bool {
        self.dropped
    }

    /// Returns true if the value is live.
    #[must_use]
    pub fn exists(&self) -> bool {
        !self.dropped
    }

    pub(crate) fn value_mut(&mut self) -> &mut T {
        &mut self.value
    }

    pub(crate) fn replace(&mut self, value: T) {
        self.value = value;
        self.version += 1;
        self.dropped = false;
    }

    pub(crate) fn touch(&mut self) {
        self.version += 1;
        self.dropped = false;
    }

    pub(crate) fn tombstone(&mut self) {
        self.version += 1;
        self.dropped = true;
    }
}

/// How prices with the same inner record id are combined into a selling price.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceInnerRecordHandling {
    #[default]
    None,
    LowestPrice,
    Sum,
    Unknown,
}

/// A single price of an entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Price {
    pub inner_record_id: Option<i32>,
    pub price_without_tax: f64,
    pub price_with_tax: f64,
    pub tax_rate: f64,
    /// Whether the price takes part in selling price computation.
    pub indexed: bool,
}

impl Price {
    /// Shorthand for an indexed price without inner record.
    pub fn indexed(price_without_tax: f64, tax_rate: f64) -> Self {
        Self {
            inner_record_id: None,
            price_without_tax,
            price_with_tax: price_without_tax * (1.0 + tax_rate / 100.0),
            tax_rate,
            indexed: true,
        }
    }
}

/// A reference from an entity to another (possibly unmanaged) entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reference {
    referenced_entity_type: String,
    attributes: BTreeMap<AttributeKey, Versioned<Value>>,
}

impl Reference {
    pub(crate) fn new(referenced_entity_type: impl Into<String>) -> Self {
        Self {
            referenced_entity_type: referenced_entity_type.into(),
            attributes: BTreeMap::new(),
        }
    }

    /// Returns the type of the referenced entity.
    #[must_use]
    pub fn referenced_entity_type(&self) -> &str {
        &self.referenced_entity_type
    }

    /// Returns the live value of a reference attribute.
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.attributes
            .get(&AttributeKey::new(name))
            .filter(|it| it.exists())
            .map(Versioned::value)
    }

    /// Iterates over live reference attributes.
    pub fn attributes(&self) -> impl Iterator<Item = (&AttributeKey, &Value)> {
        live(&self.attributes)
    }

    /// Iterates over all reference attributes including tombstones.
    pub fn attributes_including_dropped(
        &self,
    ) -> impl Iterator<Item = (&AttributeKey, &Versioned<Value>)> {
        self.attributes.iter()
    }

    pub(crate) fn attributes_mut(&mut self) -> &mut BTreeMap<AttributeKey, Versioned<Value>> {
        &mut self.attributes
    }
}

/// An immutable, versioned snapshot of one entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub(crate) entity_type: String,
    pub(crate) primary_key: Option<PrimaryKey>,
    pub(crate) version: u32,
    pub(crate) dropped: bool,
    pub(crate) parent: Option<Versioned<PrimaryKey>>,
    #[serde(with = "entries")]
    pub(crate) references: BTreeMap<ReferenceKey, Versioned<Reference>>,
    pub(crate) attributes: BTreeMap<AttributeKey, Versioned<Value>>,
    pub(crate) associated_data: BTreeMap<AssociatedDataKey, Versioned<Value>>,
    #[serde(with = "entries")]
    pub(crate) prices: BTreeMap<PriceKey, Versioned<Price>>,
    pub(crate) price_inner_record_handling: PriceInnerRecordHandling,
}

impl Entity {
    /// Creates an empty entity shell that has never been written (version 0).
    #[must_use]
    pub fn shell(entity_type: impl Into<String>, primary_key: Option<PrimaryKey>) -> Self {
        Self {
            entity_type: entity_type.into(),
            primary_key,
            version: 0,
            dropped: false,
            parent: None,
            references: BTreeMap::new(),
            attributes: BTreeMap::new(),
            associated_data: BTreeMap::new(),
            prices: BTreeMap::new(),
            price_inner_record_handling: PriceInnerRecordHandling::None,
        }
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
    pub fn version(&self) -> u32 {
        self.version
    }

    /// Returns true if the entity itself was removed (tombstoned).
    #[must_use]
    pub fn is_dropped(&self) -> bool {
        self.dropped
    }

    /// Returns the live parent primary key.
    #[must_use]
    pub fn parent(&self) -> Option<PrimaryKey> {
        self.parent
            .as_ref()
            .filter(|it| it.exists())
            .map(|it| *it.value())
    }

    /// Returns the parent placement including a tombstoned one.
    #[must_use]
    pub fn parent_including_dropped(&self) -> Option<&Versioned<PrimaryKey>> {
        self.parent.as_ref()
    }

    /// Returns the live value of an attribute.
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.attributes
            .get(&AttributeKey::new(name))
            .filter(|it| it.exists())
            .map(Versioned::value)
    }

    /// Returns an attribute including its version and tombstone.
    #[must_use]
    pub fn attribute_value(&self, key: &AttributeKey) -> Option<&Versioned<Value>> {
        self.attributes.get(key)
    }

    /// Iterates over live attributes.
    pub fn attributes(&self) -> impl Iterator<Item = (&AttributeKey, &Value)> {
        live(&self.attributes)
    }

    /// Returns the live value of associated data.
    #[must_use]
    pub fn associated_data(&self, name: &str) -> Option<&Value> {
        self.associated_data
            .get(&AssociatedDataKey::new(name))
            .filter(|it| it.exists())
            .map(Versioned::value)
    }

    /// Returns associated data including its version and tombstone.
    #[must_use]
    pub fn associated_data_value(&self, key: &AssociatedDataKey) -> Option<&Versioned<Value>> {
        self.associated_data.get(key)
    }

    /// Iterates over live associated data.
    pub fn associated_data_values(&self) -> impl Iterator<Item = (&AssociatedDataKey, &Value)> {
        live(&self.associated_data)
    }

    /// Returns a live reference.
    #[must_use]
    pub fn reference(&self, key: &ReferenceKey) -> Option<&Reference> {
        self.references
            .get(key)
            .filter(|it| it.exists())
            .map(Versioned::value)
    }

    /// Returns a reference including its version and tombstone.
    #[must_use]
    pub fn reference_value(&self, key: &ReferenceKey) -> Option<&Versioned<Reference>> {
        self.references.get(key)
    }

    /// Iterates over live references.
    pub fn references(&self) -> impl Iterator<Item = (&ReferenceKey, &Reference)> {
        live(&self.references)
    }

    /// Iterates over live references with the given reference name.
    pub fn references_named<'a>(
        &'a self,
        name: &'a str,
    ) -> impl Iterator<Item = (&'a ReferenceKey, &'a Reference)> + 'a {
        self.references().filter(move |(key, _)| key.name() == name)
    }

    /// Returns a live price.
    #[must_use]
    pub fn price(&self, key: &PriceKey) -> Option<&Price> {
        self.prices
            .get(key)
            .filter(|it| it.exists())
            .map(Versioned::value)
    }

    /// Returns a price including its version and tombstone.
    #[must_use]
    pub fn price_value(&self, key: &PriceKey) -> Option<&Versioned<Price>> {
        self.prices.get(key)
    }

    /// Iterates over live prices.
    pub fn prices(&self) -> impl Iterator<Item = (&PriceKey, &Price)> {
        live(&self.prices)
    }

    #[must_use]
    pub fn price_inner_record_handling(&self) -> PriceInnerRecordHandling {
        self.price_inner_record_handling
    }
}

fn live<K, V>(values: &BTreeMap<K, Versioned<V>>) -> impl Iterator<Item = (&K, &V)> {
    values
        .iter()
        .filter(|(_, it)| it.exists())
        .map(|(key, it)| (key, it.value()))
}

/// Serializes maps with composite keys as a list of entries (JSON object keys
/// must be strings).
mod entries {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::collections::BTreeMap;

    pub fn serialize<S, K, V>(map: &BTreeMap<K, V>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
        K: Serialize,
        V: Serialize,
    {
        serializer.collect_seq(map.iter())
    }

    pub fn deserialize<'de, D, K, V>(deserializer: D) -> Result<BTreeMap<K, V>, D::Error>
    where
        D: Deserializer<'de>,
        K: Deserialize<'de> + Ord,
        V: Deserialize<'de>,
    {
        let entries = Vec::<(K, V)>::deserialize(deserializer)?;
        Ok(entries.into_iter().collect())
    }
}
