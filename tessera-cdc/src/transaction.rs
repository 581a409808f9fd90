//! Committed transactions and the capture stream over them.

use crate::capture::{ChangeCapture, ContentMode, TransactionId, TransactionMutation};
use crate::context::{StreamDirection, TraversalContext};
use crate::emit::ToCapture;
use crate::error::CdcResult;
use crate::predicate::{CapturePredicate, CaptureRequest};
use serde::{Deserialize, Serialize};
use tessera_model::ModifyEntitySchemaMutation;
use tessera_mutation::{AppliedMutation, EntityMutation};
use tracing::debug;

/// An entity-level mutation recorded in a transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "mutation", rename_all = "snake_case")]
pub enum CatalogMutation {
    Schema(ModifyEntitySchemaMutation),
    Entity(EntityMutation),
}

impl ToCapture for CatalogMutation {
    fn to_capture(
        &self,
        context: &mut TraversalContext,
        predicate: &dyn CapturePredicate,
        content: ContentMode,
    ) -> Vec<ChangeCapture> {
        match self {
            Self::Schema(it) => it.to_capture(context, predicate, content),
            Self::Entity(it) => it.to_capture(context, predicate, content),
        }
    }
}

/// The mutations one transaction committed, in commit order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommittedTransaction {
    transaction_id: TransactionId,
    version: u64,
    mutations: Vec<CatalogMutation>,
}

impl CommittedTransaction {
    #[must_use]
    pub fn new(version: u64) -> Self {
        Self {
            transaction_id: TransactionId::new(),
            version,
            mutations: Vec::new(),
        }
    }

    #[must_use]
    pub fn version(&self) -> u64 {
        self.version
    }

    #[must_use]
    pub fn mutations(&self) -> &[CatalogMutation] {
        &self.mutations
    }

    pub fn push(&mut self, mutation: impl Into<CatalogMutation>) {
        self.mutations.push(mutation.into());
    }

    /// Records an applied entity mutation, preceded by the schema change it caused.
    pub fn record(&mut self, applied: &AppliedMutation) {
        if let Some(schema_mutation) = &applied.schema_mutation {
            self.push(schema_mutation.clone());
        }
        self.push(applied.mutation.clone());
    }

    #[must_use]
    pub fn header(&self) -> TransactionMutation {
        TransactionMutation {
            transaction_id: self.transaction_id,
            version: self.version,
            mutation_count: u32::try_from(self.mutations.len()).unwrap_or(u32::MAX),
        }
    }

    /// Renders the transaction: header first when reading forward, last in reverse.
    pub fn to_captures(
        &self,
        context: &mut TraversalContext,
        predicate: &dyn CapturePredicate,
        content: ContentMode,
    ) -> Vec<ChangeCapture> {
        let header = self.header();
        context.set_version(self.version, header.mutation_count);

        let mut captures = Vec::new();
        match context.direction() {
            StreamDirection::Forward => {
                captures.extend(header.to_capture(context, predicate, content));
                for mutation in &self.mutations {
                    captures.extend(mutation.to_capture(context, predicate, content));
                }
            }
            StreamDirection::Reverse => {
                for mutation in self.mutations.iter().rev() {
                    captures.extend(mutation.to_capture(context, predicate, content));
                }
                context.advance();
                captures.extend(header.to_capture(context, predicate, content));
            }
        }
        debug!(
            version = self.version,
            transaction_id = %self.transaction_id,
            captures = captures.len(),
            "transaction rendered"
        );
        captures
    }
}

impl From<ModifyEntitySchemaMutation> for CatalogMutation {
    fn from(mutation: ModifyEntitySchemaMutation) -> Self {
        Self::Schema(mutation)
    }
}

impl From<EntityMutation> for CatalogMutation {
    fn from(mutation: EntityMutation) -> Self {
        Self::Entity(mutation)
    }
}

/// Renders `transactions` (oldest first) as the stream `request` asks for.
pub fn capture_stream(
    transactions: &[CommittedTransaction],
    request: &CaptureRequest,
    direction: StreamDirection,
) -> CdcResult<Vec<ChangeCapture>> {
    let filter = request.filter(direction)?;
    let mut context = TraversalContext::new(direction);
    let ordered: Box<dyn Iterator<Item = &CommittedTransaction>> = match direction {
        StreamDirection::Forward => Box::new(transactions.iter()),
        StreamDirection::Reverse => Box::new(transactions.iter().rev()),
    };
    Ok(ordered
        .flat_map(|transaction| transaction.to_captures(&mut context, &filter, request.content))
        .collect())
}
