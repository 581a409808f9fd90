//! Identifier and key types used throughout the write path.
//!
//! Keys are the business identity of a value inside an entity. They are
//! totally ordered so that change-units targeting the same container can be
//! sorted by the value they touch.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Primary key of an entity within its collection.
pub type PrimaryKey = i32;

/// Identifies an attribute of an entity (or of a reference).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttributeKey {
    name: String,
}

impl AttributeKey {
    /// Creates a key for the attribute with the given name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    /// Returns the attribute name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for AttributeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

impl From<&str> for AttributeKey {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// Identifies an associated data value of an entity.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssociatedDataKey {
    name: String,
}

impl AssociatedDataKey {
    /// Creates a key for the associated data with the given name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    /// Returns the associated data name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for AssociatedDataKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

impl From<&str> for AssociatedDataKey {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// Identifies a single reference: reference name plus referenced primary key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ReferenceKey {
    name: String,
    primary_key: PrimaryKey,
}

impl ReferenceKey {
    /// Creates a reference key.
    #[must_use]
    pub fn new(name: impl Into<String>, primary_key: PrimaryKey) -> Self {
        Self {
            name: name.into(),
            primary_key,
        }
    }

    /// Returns the reference name (as declared in the entity schema).
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the primary key of the referenced entity.
    #[must_use]
    pub const fn primary_key(&self) -> PrimaryKey {
        self.primary_key
    }
}

impl fmt::Display for ReferenceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.primary_key)
    }
}

/// Identifies a price: external price id within a price list and currency.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PriceKey {
    price_id: i32,
    price_list: String,
    currency: String,
}

impl PriceKey {
    /// Creates a price key.
    #[must_use]
    pub fn new(price_id: i32, price_list: impl Into<String>, currency: impl Into<String>) -> Self {
        Self {
            price_id,
            price_list: price_list.into(),
            currency: currency.into(),
        }
    }

    /// Returns the external price id.
    #[must_use]
    pub const fn price_id(&self) -> i32 {
        self.price_id
    }

    /// Returns the price list name.
    #[must_use]
    pub fn price_list(&self) -> &str {
        &self.price_list
    }

    /// Returns the ISO currency code.
    #[must_use]
    pub fn currency(&self) -> &str {
        &self.currency
    }
}

impl fmt::Display for PriceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.price_id, self.price_list, self.currency)
    }
}
