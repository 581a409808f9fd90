//! Core type definitions for the Tessera write path.
//!
//! This crate defines the fundamental types shared by the model, mutation
//! and change-capture crates:
//! - Primary keys and typed value keys (attribute, associated data, reference, price)
//! - Container kinds and mutation priorities
//! - Decisive timestamps used as the last ordering tie-breaker

mod container;
mod keys;
mod timestamp;

pub use container::{ContainerKind, MutationPriority};
pub use keys::{AssociatedDataKey, AttributeKey, PriceKey, PrimaryKey, ReferenceKey};
pub use timestamp::{DecisiveClock, DecisiveTimestamp};

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in type operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),
}
