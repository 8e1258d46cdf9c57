//! Error types for wikifed.
//!
//! All errors are strongly typed using thiserror. The importer inspects the
//! variant to decide whether a failure aborts the whole import or only the
//! claim, qualifier or reference being processed.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::entity::EntityId;
use crate::storage::StoreError;

/// Validation errors that occur during input validation.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Invalid entity id '{id}': expected Q, P or L followed by digits")]
    InvalidEntityId {
        id: String,
    },

    #[error("Invalid claim id '{id}'")]
    InvalidClaimId {
        id: String,
    },

    #[error("Required field '{field}' is missing")]
    MissingField {
        field: String,
    },

    #[error("Invalid configuration: {reason}")]
    InvalidConfig {
        reason: String,
    },
}

/// The kind of element a rejected write was trying to add.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteTarget {
    Entity,
    Claim,
    Qualifier,
    Source,
}

impl fmt::Display for WriteTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Entity => write!(f, "entity"),
            Self::Claim => write!(f, "claim"),
            Self::Qualifier => write!(f, "qualifier"),
            Self::Source => write!(f, "source"),
        }
    }
}

/// Top-level error type for import operations.
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("Entity not found: {id}")]
    NotFound {
        id: EntityId,
    },

    #[error("Entity {id} has no label in any language")]
    MissingLabel {
        id: EntityId,
    },

    #[error("Unrecognized language codes: {}", .languages.join(", "))]
    UnrecognizedLanguage {
        languages: Vec<String>,
    },

    #[error("Label '{label}' and description '{description}' already used by {existing}")]
    DuplicateLabelDescription {
        existing: EntityId,
        label: String,
        description: String,
    },

    #[error("Unsupported value kind: {kind}")]
    UnsupportedValueKind {
        kind: String,
    },

    #[error("Could not add {target}: {reason}")]
    WriteRejected {
        target: WriteTarget,
        reason: String,
    },

    #[error("No local claim on {entity} matches {property} '{value}'")]
    LocalClaimNotFound {
        entity: EntityId,
        property: EntityId,
        value: String,
    },

    #[error("Label '{label}' matches {} candidates", .candidates.len())]
    AmbiguousMatch {
        label: String,
        candidates: Vec<EntityId>,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl ImportError {
    /// Creates a rejected-write error.
    #[must_use]
    pub fn write_rejected(target: WriteTarget, reason: impl Into<String>) -> Self {
        Self::WriteRejected {
            target,
            reason: reason.into(),
        }
    }

    /// Returns true if this is a rejected write of any kind.
    #[must_use]
    pub const fn is_write_rejected(&self) -> bool {
        matches!(self, Self::WriteRejected { .. })
    }

    /// Returns true if this error aborts the import of an entity.
    ///
    /// Everything else is logged against the claim, qualifier or reference
    /// that caused it and the import moves on.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::NotFound { .. }
                | Self::MissingLabel { .. }
                | Self::AmbiguousMatch { .. }
                | Self::Config(_)
                | Self::Parse(_)
                | Self::Validation(_)
                | Self::Store(_)
        )
    }
}

/// Result type alias for import operations.
pub type ImportResult<T> = Result<T, ImportError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn qid(s: &str) -> EntityId {
        EntityId::parse(s).unwrap()
    }

    #[test]
    fn test_validation_error_entity_id() {
        let err = ValidationError::InvalidEntityId { id: "X1".to_string() };
        let msg = format!("{err}");
        assert!(msg.contains("X1"));
        assert!(msg.contains("Invalid entity id"));
    }

    #[test]
    fn test_unrecognized_language_lists_codes() {
        let err = ImportError::UnrecognizedLanguage {
            languages: vec!["pwn".to_string(), "mcn".to_string()],
        };
        assert_eq!(err.to_string(), "Unrecognized language codes: pwn, mcn");
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_write_rejected() {
        let err = ImportError::write_rejected(WriteTarget::Qualifier, "bad value");
        assert!(err.is_write_rejected());
        assert!(!err.is_fatal());
        assert_eq!(err.to_string(), "Could not add qualifier: bad value");
    }

    #[test]
    fn test_fatal_classification() {
        assert!(ImportError::NotFound { id: qid("Q1") }.is_fatal());
        assert!(ImportError::MissingLabel { id: qid("Q1") }.is_fatal());
        assert!(!ImportError::UnsupportedValueKind { kind: "geo-shape".into() }.is_fatal());
        assert!(!ImportError::LocalClaimNotFound {
            entity: qid("Q1"),
            property: qid("P31"),
            value: "human".into(),
        }
        .is_fatal());
    }

    #[test]
    fn test_from_store_error() {
        let err: ImportError = StoreError::BackendError("down".to_string()).into();
        assert!(err.is_fatal());
        assert!(err.to_string().contains("down"));
    }
}
