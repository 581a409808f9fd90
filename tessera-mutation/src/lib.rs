//! Entity mutation core for Tessera.
//!
//! Takes an ordered set of field-level changes and folds them atomically into
//! a new, versioned entity snapshot while keeping the schema consistent.
//!
//! # Components
//!
//! - **Local mutations**: change-units targeting one part of an entity
//! - **Ordering**: the total order change-units are applied in
//! - **Evolution**: verify-or-evolve of the entity schema with skip-token dedup
//! - **Entity mutations**: upsert and remove, each folding into a new version
//! - **Executor**: the apply/commit/rollback contract plus implicit mutations
//! - **Catalog**: the in-memory layer driving all of the above end to end
//!
//! # Example
//!
//! ```
//! use serde_json::json;
//! use tessera_model::CatalogSchema;
//! use tessera_mutation::{
//!     Catalog, EntityExistence, EntityUpsertMutation, LocalMutation, MutationOrigin,
//! };
//!
//! let mut catalog = Catalog::new(CatalogSchema::new("shop"));
//! let upsert = EntityUpsertMutation::new(
//!     "product",
//!     Some(7),
//!     EntityExistence::MayExist,
//!     [LocalMutation::upsert_attribute("code", json!("A"))],
//! );
//! let applied = catalog.apply(upsert.into(), MutationOrigin::Client).unwrap();
//! assert_eq!(applied.entity.version(), 1);
//! ```

mod catalog;
mod config;
mod entity_mutation;
mod error;
pub mod evolution;
mod executor;
mod implicit;
mod local;
mod ordering;
mod removal;

pub use catalog::{AppliedMutation, Catalog, EntityCollection, MutationOrigin};
pub use config::MutationConfig;
pub use entity_mutation::{
    EntityExistence, EntityMutation, EntityRemoveMutation, EntityUpsertMutation,
};
pub use error::{MutationError, MutationResult};
pub use evolution::{SchemaEvolvingMutation, SkipToken, evolve_schema};
pub use executor::{
    ConsistencyCheckingLocalMutationExecutor, EntityStateExecutor, Executed,
    LocalMutationExecutor, execute, execute_with_consistency,
};
pub use implicit::{ImplicitBehaviors, ImplicitMutationBehavior, ImplicitMutations};
pub use local::{ComparableKey, LocalChange, LocalMutation, MutationKind};
pub use ordering::{OrderKey, compare_mutations, sort_mutations};
pub use removal::removal_mutations;
