//! Traversal state shared by all captures rendered from one stream.

use serde::{Deserialize, Serialize};
use tessera_types::PrimaryKey;

/// Order in which the mutation log is read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamDirection {
    /// Oldest first.
    #[default]
    Forward,
    /// Newest first.
    Reverse,
}

/// Position of the renderer inside the mutation stream.
///
/// Within one transaction of `n` entity-level mutations the header sits at
/// index 0 and the i-th mutation at index i, in both directions. A forward
/// read starts at the header and counts up; a reverse read starts past the
/// last mutation and counts down to the header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraversalContext {
    direction: StreamDirection,
    version: u64,
    index: u32,
    entity_type: Option<String>,
    primary_key: Option<PrimaryKey>,
}

impl TraversalContext {
    #[must_use]
    pub fn new(direction: StreamDirection) -> Self {
        Self {
            direction,
            version: 0,
            index: 0,
            entity_type: None,
            primary_key: None,
        }
    }

    #[must_use]
    pub fn direction(&self) -> StreamDirection {
        self.direction
    }

    #[must_use]
    pub fn version(&self) -> u64 {
        self.version
    }

    #[must_use]
    pub fn index(&self) -> u32 {
        self.index
    }

    #[must_use]
    pub fn entity_type(&self) -> Option<&str> {
        self.entity_type.as_deref()
    }

    #[must_use]
    pub fn primary_key(&self) -> Option<PrimaryKey> {
        self.primary_key
    }

    /// Enters the transaction that produced catalog `version`.
    pub fn set_version(&mut self, version: u64, mutation_count: u32) {
        self.version = version;
        self.index = match self.direction {
            StreamDirection::Forward => 0,
            StreamDirection::Reverse => mutation_count.saturating_add(1),
        };
        self.entity_type = None;
        self.primary_key = None;
    }

    /// Moves to the next entity-level mutation in traversal order.
    pub fn advance(&mut self) {
        self.index = match self.direction {
            StreamDirection::Forward => self.index.saturating_add(1),
            StreamDirection::Reverse => self.index.saturating_sub(1),
        };
        self.entity_type = None;
        self.primary_key = None;
    }

    /// Records the entity the current mutation targets.
    pub fn set_entity(&mut self, entity_type: impl Into<String>, primary_key: Option<PrimaryKey>) {
        self.entity_type = Some(entity_type.into());
        self.primary_key = primary_key;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_counts_up_from_header() {
        let mut context = TraversalContext::new(StreamDirection::Forward);
        context.set_version(100, 3);
        assert_eq!(context.index(), 0);
        context.advance();
        context.advance();
        assert_eq!(context.index(), 2);
    }

    #[test]
    fn reverse_counts_down_to_header() {
        let mut context = TraversalContext::new(StreamDirection::Reverse);
        context.set_version(100, 3);
        for expected in [3, 2, 1, 0] {
            context.advance();
            assert_eq!(context.index(), expected);
        }
        context.advance();
        assert_eq!(context.index(), 0);
    }

    #[test]
    fn advancing_clears_entity() {
        let mut context = TraversalContext::new(StreamDirection::Forward);
        context.set_entity("product", Some(7));
        context.advance();
        assert_eq!(context.entity_type(), None);
        assert_eq!(context.primary_key(), None);
    }
}
