//! Total order over change-units.
//!
//! Most significant first: priority (descending), kind id (ascending),
//! comparable key (ascending), decisive timestamp (ascending).

use crate::local::{ComparableKey, LocalMutation};
use std::cmp::{Ordering, Reverse};
use tessera_types::{DecisiveTimestamp, MutationPriority};

/// Sort key of a change-unit. Its derived order is the application order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct OrderKey {
    priority: Reverse<MutationPriority>,
    kind: u16,
    key: ComparableKey,
    timestamp: Option<DecisiveTimestamp>,
}

impl LocalMutation {
    #[must_use]
    pub fn order_key(&self) -> OrderKey {
        OrderKey {
            priority: Reverse(self.priority()),
            kind: self.kind().id(),
            key: self.comparable_key(),
            timestamp: self.decisive_timestamp(),
        }
    }
}

/// Compares two change-units by application order.
#[must_use]
pub fn compare_mutations(a: &LocalMutation, b: &LocalMutation) -> Ordering {
    a.order_key().cmp(&b.order_key())
}

/// Sorts change-units into application order.
pub fn sort_mutations(mutations: &mut [LocalMutation]) {
    mutations.sort_by_cached_key(LocalMutation::order_key);
}
