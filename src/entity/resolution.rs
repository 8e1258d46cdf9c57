//! Entity resolution: deciding whether a search hit is the entity we hold.
//!
//! Identity is fuzzy. Entities without a description are identified by
//! label alone; once a description exists, both label and description must
//! match exactly so two distinct entities sharing a name are never merged.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::entity::EntityId;
use crate::error::{ImportError, ImportResult};

/// Candidate returned by a keyword search against a store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    /// Id in the searched store.
    pub id: EntityId,

    /// Label in the searched language; absent when the entity has none.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,

    /// Description in the searched language.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Language the search ran in.
    pub language: String,

    /// Aliases that matched the search.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<String>,
}

impl SearchResult {
    /// Names this candidate can be identified by: its label, or its aliases
    /// when the store did not return a label.
    fn names(&self) -> Vec<&str> {
        match self.label.as_deref() {
            Some(label) => vec![label],
            None => self.aliases.iter().map(String::as_str).collect(),
        }
    }
}

/// What to do when several candidates match.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MatchPolicy {
    /// The first matching candidate in search order wins.
    FirstMatch,
    /// The last matching candidate wins.
    #[default]
    LastMatch,
    /// More than one match is an error.
    Reject,
}

/// Decides whether a candidate is the same entity as a (label, description) pair.
///
/// # Examples
///
/// ```
/// use wikifed::{EntityId, IdentityMatcher, MatchPolicy, SearchResult};
///
/// let hit = SearchResult {
///     id: EntityId::parse("Q9").unwrap(),
///     label: Some("tea".into()),
///     description: Some("drink".into()),
///     language: "en".into(),
///     aliases: vec![],
/// };
/// let matcher = IdentityMatcher::new(MatchPolicy::LastMatch);
/// let found = matcher.find_match(&[hit.clone()], "tea", Some("drink")).unwrap();
/// assert_eq!(found, Some(hit.id.clone()));
/// assert_eq!(matcher.find_match(&[hit], "tea", Some("plant")).unwrap(), None);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityMatcher {
    policy: MatchPolicy,
}

impl IdentityMatcher {
    /// Creates a matcher with the given tie-break policy.
    #[must_use]
    pub const fn new(policy: MatchPolicy) -> Self {
        Self { policy }
    }

    /// Returns the configured policy.
    #[must_use]
    pub const fn policy(&self) -> MatchPolicy {
        self.policy
    }

    /// True when `candidate` is the entity named by `label` / `description`.
    #[must_use]
    pub fn is_match(candidate: &SearchResult, label: &str, description: Option<&str>) -> bool {
        let description = description.filter(|d| !d.is_empty());
        candidate.names().into_iter().any(|name| match description {
            None => name == label,
            Some(description) => {
                name == label && candidate.description.as_deref() == Some(description)
            }
        })
    }

    /// Picks the candidate matching `label` / `description`.
    ///
    /// `Ok(None)` means nothing matched and the caller should create the entity.
    ///
    /// # Errors
    ///
    /// Returns `ImportError::AmbiguousMatch` under [`MatchPolicy::Reject`]
    /// when more than one candidate matches.
    pub fn find_match(
        &self,
        candidates: &[SearchResult],
        label: &str,
        description: Option<&str>,
    ) -> ImportResult<Option<EntityId>> {
        let matched: Vec<&EntityId> = candidates
            .iter()
            .filter(|c| Self::is_match(c, label, description))
            .map(|c| &c.id)
            .collect();

        if matched.len() > 1 {
            warn!(
                label,
                description = description.unwrap_or(""),
                candidates = ?matched,
                policy = ?self.policy,
                "several entities match"
            );
        }

        match (self.policy, matched.as_slice()) {
            (_, []) => Ok(None),
            (MatchPolicy::Reject, [_, _, ..]) => Err(ImportError::AmbiguousMatch {
                label: label.to_string(),
                candidates: matched.iter().map(|id| (*id).clone()).collect(),
            }),
            (MatchPolicy::FirstMatch, [first, ..]) => Ok(Some((*first).clone())),
            (_, [.., last]) => Ok(Some((*last).clone())),
        }
    }
}
