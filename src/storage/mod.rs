//! Store interface and the bundled backends.
//!
//! [`KnowledgeStore`] is what the importer talks to. [`InMemoryStore`]
//! implements it for tests, entity dumps and local JSON snapshots, and
//! [`wbjson`] reads Wikibase entity JSON into it.

pub mod memory;
mod traits;
pub mod wbjson;

pub use memory::{InMemoryStore, StoreSnapshot, StoreStats};
pub use traits::{KnowledgeStore, StoreError, DEFAULT_LABEL_BATCH_LIMIT};
