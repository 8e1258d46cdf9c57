//! # wikifed - Federated Wikibase entity import
//!
//! wikifed copies entities between Wikibase knowledge stores. Importing an
//! entity finds (or creates) its local counterpart by label and description,
//! adds the claims the local copy lacks, and merges qualifiers and references
//! into the matching local claims. Entities referenced from claim values are
//! resolved the same way, so the import is closed over references.
//!
//! ## Core Concepts
//!
//! - **Entity**: an item, property or lexeme with terms and claims
//! - **Claim**: a property/value statement with qualifiers and reference groups
//! - **KnowledgeStore**: the seam every store implementation plugs into
//! - **EntityImporter**: the idempotent, re-runnable import driver
//!
//! ## Usage
//!
//! ```rust
//! use std::sync::Arc;
//! use wikifed::{Claim, Entity, EntityId, EntityImporter, ImportConfig, InMemoryStore, Value};
//!
//! let id = |s: &str| EntityId::parse(s).unwrap();
//! let source = InMemoryStore::from_entities(
//!     "wikidata",
//!     [
//!         Entity::new(id("Q5")).with_label("en", "human"),
//!         Entity::new(id("Q42"))
//!             .with_label("en", "Douglas Adams")
//!             .with_description("en", "English writer")
//!             .with_claim(Claim::new(id("P31"), Value::from(id("Q5")))),
//!     ],
//! )
//! .unwrap();
//! let target = Arc::new(InMemoryStore::new("local"));
//!
//! let importer = EntityImporter::new(Arc::new(source), target.clone(), ImportConfig::default());
//! let outcome = importer.import_entity(&id("Q42")).unwrap();
//! assert_eq!(outcome.label, "Douglas Adams");
//! assert_eq!(outcome.report.claims_added, 1);
//!
//! // Re-running writes nothing.
//! assert_eq!(importer.import_entity(&id("Q42")).unwrap().report.writes(), 0);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Data model
pub mod claim;
pub mod entity;
pub mod error;
pub mod source;
pub mod time;
pub mod value;

// Stores and configuration
pub mod config;
pub mod storage;

// Import pipeline
pub mod convert;
pub mod engine;
pub mod labels;
pub mod reconcile;

// Tooling on top of a store
pub mod display;
pub mod editing;

// Re-export primary types at crate root for convenience
pub use claim::{Claim, ClaimId};
pub use config::ImportConfig;
pub use convert::{EntityResolver, ValueConverter};
pub use display::{render, EntityView};
pub use engine::{
    EntityImporter, FailedEntity, ImportOutcome, ImportReport, ImportStage, Merged, WriteThrottle,
};
pub use entity::{
    Entity, EntityId, EntityKind, IdentityMatcher, MatchPolicy, NewEntity, SearchResult,
};
pub use error::{ImportError, ImportResult, ValidationError, WriteTarget};
pub use labels::{display_label, IdLabelTable};
pub use reconcile::{ReconcileReport, Reconciler, Skipped};
pub use source::ReferenceGroup;
pub use storage::{InMemoryStore, KnowledgeStore, StoreError};
pub use time::WbTime;
pub use value::{GlobeCoordinate, MonolingualText, Quantity, Value};
