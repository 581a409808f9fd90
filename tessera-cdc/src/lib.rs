//! Change-data-capture for the Tessera write path.
//!
//! Committed transactions are rendered as flat sequences of capture events:
//! a transaction header, one event per schema or entity mutation, and one
//! event per change-unit. The stream can be read forward or in reverse; the
//! enclosing event always brackets its children on the side the stream is
//! read from.
//!
//! # Example
//!
//! ```
//! use serde_json::json;
//! use tessera_cdc::{CaptureRequest, CommittedTransaction, StreamDirection, capture_stream};
//! use tessera_mutation::{EntityExistence, EntityMutation, EntityUpsertMutation, LocalMutation};
//!
//! let upsert: EntityMutation = EntityUpsertMutation::new(
//!     "product",
//!     Some(7),
//!     EntityExistence::MayExist,
//!     [LocalMutation::upsert_attribute("code", json!("A"))],
//! )
//! .into();
//! let mut transaction = CommittedTransaction::new(1);
//! transaction.push(upsert);
//!
//! let request = CaptureRequest::default();
//! let captures = capture_stream(&[transaction], &request, StreamDirection::Forward).unwrap();
//! assert_eq!(captures.len(), 3);
//! ```

mod capture;
mod context;
mod emit;
mod error;
mod predicate;
mod transaction;

pub use capture::{
    CaptureArea, CaptureBody, ChangeCapture, ContentMode, Operation, TransactionId,
    TransactionMutation,
};
pub use context::{StreamDirection, TraversalContext};
pub use emit::ToCapture;
pub use error::{CdcError, CdcResult};
pub use predicate::{AcceptAll, CaptureCriteria, CaptureFilter, CapturePredicate, CaptureRequest};
pub use transaction::{CatalogMutation, CommittedTransaction, capture_stream};
