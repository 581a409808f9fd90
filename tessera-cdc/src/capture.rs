//! Capture records: the externally observable form of a mutation.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tessera_model::ModifyEntitySchemaMutation;
use tessera_mutation::{EntityMutation, LocalMutation};
use tessera_types::{ContainerKind, PrimaryKey};
use uuid::Uuid;

/// Unique identifier of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionId(Uuid);

impl TransactionId {
    /// Creates a new time-ordered transaction id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    #[must_use]
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for TransactionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TransactionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Header of one committed transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionMutation {
    pub transaction_id: TransactionId,
    /// Catalog version the transaction produced.
    pub version: u64,
    /// Number of entity-level mutations in the transaction.
    pub mutation_count: u32,
}

impl TransactionMutation {
    #[must_use]
    pub fn new(version: u64, mutation_count: u32) -> Self {
        Self {
            transaction_id: TransactionId::new(),
            version,
            mutation_count,
        }
    }
}

/// Which part of the catalog a capture belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureArea {
    Schema,
    Data,
    /// Transaction boundaries.
    Infrastructure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Upsert,
    Remove,
    Transaction,
}

/// How much of a mutation a capture carries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentMode {
    /// Metadata only.
    #[default]
    Header,
    /// Metadata plus the mutation itself.
    Body,
}

/// The mutation embedded in a capture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "mutation", rename_all = "snake_case")]
pub enum CaptureBody {
    Transaction(TransactionMutation),
    Schema(ModifyEntitySchemaMutation),
    Entity(EntityMutation),
    Local(LocalMutation),
}

/// One change-data-capture event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeCapture {
    pub version: u64,
    pub index: u32,
    pub area: CaptureArea,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_primary_key: Option<PrimaryKey>,
    pub operation: Operation,
    pub container_kind: ContainerKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<CaptureBody>,
}

impl ChangeCapture {
    /// Attaches `body` when the content mode asks for it.
    #[must_use]
    pub fn with_content(
        mut self,
        content: ContentMode,
        body: impl FnOnce() -> CaptureBody,
    ) -> Self {
        self.body = match content {
            ContentMode::Header => None,
            ContentMode::Body => Some(body()),
        };
        self
    }
}
