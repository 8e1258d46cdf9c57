//! Abstract store interface.
//!
//! `KnowledgeStore` is the narrow surface the importer needs from a
//! Wikibase-like backend. The HTTP/SPARQL client for a live wiki implements
//! it outside this crate; [`InMemoryStore`](crate::storage::InMemoryStore)
//! implements it for tests, dumps and local snapshots.
//!
//! Every write primitive is a single additive unit that may fail on its
//! own. Callers decide whether a failure aborts anything.

use std::collections::BTreeMap;

use thiserror::Error;

use crate::claim::{Claim, ClaimId};
use crate::entity::{Entity, EntityId, NewEntity, SearchResult};
use crate::source::ReferenceGroup;
use crate::value::Value;

/// Largest number of ids a Wikibase `wbgetentities` call accepts.
pub const DEFAULT_LABEL_BATCH_LIMIT: usize = 50;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Entity not found.
    #[error("Entity not found: {0}")]
    EntityNotFound(EntityId),

    /// Claim not found.
    #[error("Claim not found: {0}")]
    ClaimNotFound(ClaimId),

    /// The store does not know some language codes.
    #[error("Unrecognized language codes: {}", .languages.join(", "))]
    UnrecognizedLanguage {
        languages: Vec<String>,
    },

    /// Another entity already has this label and description.
    #[error("{existing} already has label '{label}' and description '{description}' in {language}")]
    DuplicateLabelDescription {
        existing: EntityId,
        language: String,
        label: String,
        description: String,
    },

    /// Label and description are identical in one language.
    #[error("Label and description must differ ({language})")]
    LabelEqualsDescription {
        language: String,
    },

    /// A batch call carried more ids than the store accepts.
    #[error("Too many ids in one request: {requested} (limit {limit})")]
    TooManyIds {
        requested: usize,
        limit: usize,
    },

    /// The store refused a write.
    #[error("Write rejected: {0}")]
    WriteRejected(String),

    /// Backend error.
    #[error("Store backend error: {0}")]
    BackendError(String),

    /// Serialization failed.
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

/// Storage trait for a Wikibase-like knowledge base.
///
/// Implementations must be usable through `&self`; mutation happens behind
/// interior locking so one store can back several importers.
pub trait KnowledgeStore: Send + Sync {
    /// Stable identifier of this store, used to key imported entities.
    fn store_id(&self) -> &str;

    /// Keyword search over labels and aliases in `language`.
    fn search_entities(&self, label: &str, language: &str)
        -> Result<Vec<SearchResult>, StoreError>;

    /// Maximum number of ids one `fetch_labels` call may carry.
    fn label_batch_limit(&self) -> usize {
        DEFAULT_LABEL_BATCH_LIMIT
    }

    /// Labels for up to `label_batch_limit()` ids. Every requested id is
    /// present in the result, mapped to `""` when it has no label.
    fn fetch_labels(
        &self,
        ids: &[EntityId],
        language: &str,
    ) -> Result<BTreeMap<EntityId, String>, StoreError>;

    /// Creates an item from term data and returns the stored snapshot.
    fn create_entity(&self, data: NewEntity) -> Result<Entity, StoreError>;

    /// Full snapshot of an entity, qualifiers and references included.
    fn fetch_entity(&self, id: &EntityId) -> Result<Option<Entity>, StoreError>;

    /// Appends a claim to an entity.
    fn write_claim(
        &self,
        entity: &EntityId,
        property: &EntityId,
        value: &Value,
    ) -> Result<Claim, StoreError>;

    /// Appends a qualifier to a claim.
    fn write_qualifier(
        &self,
        claim: &ClaimId,
        property: &EntityId,
        value: &Value,
    ) -> Result<(), StoreError>;

    /// Appends a reference group to a claim.
    fn write_sources(&self, claim: &ClaimId, group: &ReferenceGroup) -> Result<(), StoreError>;

    /// Removes a claim. Manual editing only; import never removes.
    fn remove_claim(&self, claim: &ClaimId) -> Result<(), StoreError>;

    /// Removes every qualifier of `property` from a claim.
    fn remove_qualifiers(&self, claim: &ClaimId, property: &EntityId) -> Result<usize, StoreError>;

    /// Removes every source value of `property` from a claim's references,
    /// dropping groups left empty.
    fn remove_sources(&self, claim: &ClaimId, property: &EntityId) -> Result<usize, StoreError>;

    /// Sets the label in `language`; an empty label removes it.
    ///
    /// Fails like `create_entity` on unknown languages, a label equal to the
    /// description, or a label+description pair another entity already uses.
    fn set_label(&self, entity: &EntityId, language: &str, label: &str) -> Result<(), StoreError>;

    /// Sets the description in `language`; an empty description removes it.
    /// Same rejections as [`set_label`](Self::set_label).
    fn set_description(
        &self,
        entity: &EntityId,
        language: &str,
        description: &str,
    ) -> Result<(), StoreError>;

    /// Replaces the aliases in `language`; an empty list removes them.
    fn set_aliases(
        &self,
        entity: &EntityId,
        language: &str,
        aliases: &[String],
    ) -> Result<(), StoreError>;

    /// Sets the page title linked on `site`.
    fn set_sitelink(&self, entity: &EntityId, site: &str, title: &str) -> Result<(), StoreError>;

    /// Removes the link on `site`. Returns whether there was one.
    fn remove_sitelink(&self, entity: &EntityId, site: &str) -> Result<bool, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    // Compile-time test: ensure the trait is object-safe
    fn _assert_knowledge_store_object_safe(_: &dyn KnowledgeStore) {}

    #[test]
    fn test_store_error_display() {
        let err = StoreError::EntityNotFound(EntityId::parse("Q3").unwrap());
        assert!(err.to_string().contains("Entity not found: Q3"));

        let err = StoreError::TooManyIds { requested: 51, limit: 50 };
        assert!(err.to_string().contains("51"));

        let err = StoreError::UnrecognizedLanguage {
            languages: vec!["pwn".to_string()],
        };
        assert!(err.to_string().contains("pwn"));
    }
}
