//! Entity types and identity.
//!
//! An entity is a Wikibase-style record: multilingual labels, descriptions
//! and aliases plus claims grouped by property. Ids are opaque strings
//! assigned by the store that owns the entity ("Q42" in one store may be a
//! completely different entity than "Q42" in another).

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::claim::{Claim, ClaimId};
use crate::error::ValidationError;

static ENTITY_ID_RE: OnceLock<Regex> = OnceLock::new();

fn entity_id_re() -> &'static Regex {
    ENTITY_ID_RE
        .get_or_init(|| Regex::new(r"^[QPL][1-9][0-9]*$").expect("entity id pattern compiles"))
}

/// Kind of entity, derived from the id prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    /// `Q` ids.
    Item,
    /// `P` ids.
    Property,
    /// `L` ids.
    Lexeme,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Item => write!(f, "item"),
            Self::Property => write!(f, "property"),
            Self::Lexeme => write!(f, "lexeme"),
        }
    }
}

/// Validated entity identifier such as `Q42`, `P31` or `L7`.
///
/// # Examples
///
/// ```
/// use wikifed::{EntityId, EntityKind};
///
/// let id = EntityId::parse("Q42").unwrap();
/// assert_eq!(id.kind(), EntityKind::Item);
/// assert!(EntityId::parse("X1").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EntityId(String);

impl EntityId {
    /// Parses and validates an entity id.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidEntityId` if the id is not a `Q`, `P`
    /// or `L` prefix followed by a number without leading zeros.
    pub fn parse(id: impl AsRef<str>) -> Result<Self, ValidationError> {
        let id = id.as_ref().trim();
        if entity_id_re().is_match(id) {
            Ok(Self(id.to_string()))
        } else {
            Err(ValidationError::InvalidEntityId { id: id.to_string() })
        }
    }

    /// Builds an id from a kind and a numeric part.
    #[must_use]
    pub fn from_parts(kind: EntityKind, number: u64) -> Self {
        let prefix = match kind {
            EntityKind::Item => 'Q',
            EntityKind::Property => 'P',
            EntityKind::Lexeme => 'L',
        };
        Self(format!("{prefix}{}", number.max(1)))
    }

    /// Parses the last path segment of a concept URI
    /// (`http://www.wikidata.org/entity/Q11573`).
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidEntityId` if the last segment is not an id.
    pub fn from_concept_uri(uri: &str) -> Result<Self, ValidationError> {
        let last = uri.rsplit('/').next().unwrap_or(uri);
        Self::parse(last)
    }

    /// Returns the kind encoded in the prefix.
    #[must_use]
    pub fn kind(&self) -> EntityKind {
        match self.0.as_bytes().first() {
            Some(b'P') => EntityKind::Property,
            Some(b'L') => EntityKind::Lexeme,
            _ => EntityKind::Item,
        }
    }

    /// Numeric part of the id.
    #[must_use]
    pub fn number(&self) -> u64 {
        self.0[1..].parse().unwrap_or(0)
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for EntityId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for EntityId {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<EntityId> for String {
    fn from(id: EntityId) -> Self {
        id.0
    }
}

impl AsRef<str> for EntityId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A full entity snapshot as read from a store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// Store-assigned identifier.
    pub id: EntityId,

    /// One label per language.
    #[serde(default)]
    pub labels: BTreeMap<String, String>,

    /// One description per language.
    #[serde(default)]
    pub descriptions: BTreeMap<String, String>,

    /// Ordered aliases per language.
    #[serde(default)]
    pub aliases: BTreeMap<String, Vec<String>>,

    /// Claims grouped by property, in insertion order within a property.
    #[serde(default)]
    pub claims: BTreeMap<EntityId, Vec<Claim>>,

    /// Site id to page title.
    #[serde(default)]
    pub sitelinks: BTreeMap<String, String>,
}

impl Entity {
    /// Creates an empty entity with the given id.
    #[must_use]
    pub fn new(id: EntityId) -> Self {
        Self {
            id,
            labels: BTreeMap::new(),
            descriptions: BTreeMap::new(),
            aliases: BTreeMap::new(),
            claims: BTreeMap::new(),
            sitelinks: BTreeMap::new(),
        }
    }

    /// Sets the label for a language.
    #[must_use]
    pub fn with_label(mut self, language: impl Into<String>, label: impl Into<String>) -> Self {
        self.labels.insert(language.into(), label.into());
        self
    }

    /// Sets the description for a language.
    #[must_use]
    pub fn with_description(
        mut self,
        language: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        self.descriptions.insert(language.into(), description.into());
        self
    }

    /// Appends an alias for a language.
    #[must_use]
    pub fn with_alias(mut self, language: impl Into<String>, alias: impl Into<String>) -> Self {
        self.aliases.entry(language.into()).or_default().push(alias.into());
        self
    }

    /// Appends a claim under its property.
    #[must_use]
    pub fn with_claim(mut self, claim: Claim) -> Self {
        self.push_claim(claim);
        self
    }

    /// Appends a claim under its property.
    pub fn push_claim(&mut self, claim: Claim) {
        self.claims.entry(claim.property.clone()).or_default().push(claim);
    }

    /// Label in a language, if any.
    #[must_use]
    pub fn label(&self, language: &str) -> Option<&str> {
        self.labels.get(language).map(String::as_str)
    }

    /// Description in a language, if any.
    #[must_use]
    pub fn description(&self, language: &str) -> Option<&str> {
        self.descriptions.get(language).map(String::as_str)
    }

    /// Picks the language used to identify this entity.
    ///
    /// `preferred` wins when the entity has a label in it and it is not
    /// `denied`; otherwise the lexicographically smallest labelled language
    /// outside `denied` is used, so the choice is stable across runs. `None`
    /// when no allowed language carries a label.
    #[must_use]
    pub fn canonical_language(&self, preferred: &str, denied: &BTreeSet<String>) -> Option<&str> {
        if let Some((lang, _)) = self.labels.get_key_value(preferred) {
            if !denied.contains(lang) {
                return Some(lang.as_str());
            }
        }
        self.labels
            .keys()
            .find(|lang| !denied.contains(*lang))
            .map(String::as_str)
    }

    /// Claims recorded for a property.
    #[must_use]
    pub fn claims_for(&self, property: &EntityId) -> &[Claim] {
        self.claims.get(property).map_or(&[], Vec::as_slice)
    }

    /// Iterates over every claim of every property.
    pub fn all_claims(&self) -> impl Iterator<Item = &Claim> {
        self.claims.values().flatten()
    }

    /// Number of claims across all properties.
    #[must_use]
    pub fn claim_count(&self) -> usize {
        self.claims.values().map(Vec::len).sum()
    }

    /// Finds a claim by its store id.
    #[must_use]
    pub fn claim(&self, id: &ClaimId) -> Option<&Claim> {
        self.all_claims().find(|c| c.id.as_ref() == Some(id))
    }

    /// Finds a claim by its store id, mutably.
    pub fn claim_mut(&mut self, id: &ClaimId) -> Option<&mut Claim> {
        self.claims
            .values_mut()
            .flatten()
            .find(|c| c.id.as_ref() == Some(id))
    }
}

/// Term data sent to a store to create an entity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewEntity {
    /// One label per language.
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    /// One description per language.
    #[serde(default)]
    pub descriptions: BTreeMap<String, String>,
    /// Ordered aliases per language.
    #[serde(default)]
    pub aliases: BTreeMap<String, Vec<String>>,
    /// Site id to page title.
    #[serde(default)]
    pub sitelinks: BTreeMap<String, String>,
}

impl NewEntity {
    /// Copies the terms of `entity`, skipping every language in `denied`.
    ///
    /// Claims are never copied; they are added one by one afterwards.
    #[must_use]
    pub fn from_entity(entity: &Entity, denied: &BTreeSet<String>, with_sitelinks: bool) -> Self {
        let allowed = |lang: &String| !denied.contains(lang);
        Self {
            labels: entity
                .labels
                .iter()
                .filter(|(lang, _)| allowed(lang))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            descriptions: entity
                .descriptions
                .iter()
                .filter(|(lang, _)| allowed(lang))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            aliases: entity
                .aliases
                .iter()
                .filter(|(lang, values)| allowed(lang) && !values.is_empty())
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            sitelinks: if with_sitelinks {
                entity.sitelinks.clone()
            } else {
                BTreeMap::new()
            },
        }
    }

    /// Drops every description equal to the label in the same language.
    ///
    /// Wikibase rejects a label and description with the same text. Returns
    /// the languages whose description was dropped.
    pub fn remove_identical_label_description(&mut self) -> Vec<String> {
        let labels = &self.labels;
        let mut dropped = Vec::new();
        self.descriptions.retain(|lang, description| {
            let same = labels.get(lang).is_some_and(|label| label == description);
            if same {
                dropped.push(lang.clone());
            }
            !same
        });
        dropped
    }

    /// Every language code used by any term.
    #[must_use]
    pub fn languages(&self) -> BTreeSet<String> {
        self.labels
            .keys()
            .chain(self.descriptions.keys())
            .chain(self.aliases.keys())
            .cloned()
            .collect()
    }

    /// Removes all terms in the given languages.
    pub fn strip_languages(&mut self, languages: &[String]) {
        for lang in languages {
            self.labels.remove(lang);
            self.descriptions.remove(lang);
            self.aliases.remove(lang);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    fn id(s: &str) -> EntityId {
        EntityId::parse(s).unwrap()
    }

    #[test]
    fn test_entity_id_parse_and_kind() {
        assert_eq!(id("Q42").kind(), EntityKind::Item);
        assert_eq!(id("P31").kind(), EntityKind::Property);
        assert_eq!(id("L7").kind(), EntityKind::Lexeme);
        assert_eq!(id(" Q5 ").as_str(), "Q5");
        assert_eq!(id("Q42").number(), 42);
    }

    #[test]
    fn test_entity_id_rejects_garbage() {
        assert!(EntityId::parse("").is_err());
        assert!(EntityId::parse("Q").is_err());
        assert!(EntityId::parse("Q01").is_err());
        assert!(EntityId::parse("X12").is_err());
        assert!(EntityId::parse("Item:Q12").is_err());
    }

    #[test]
    fn test_entity_id_from_concept_uri() {
        let unit = EntityId::from_concept_uri("http://www.wikidata.org/entity/Q11573").unwrap();
        assert_eq!(unit, id("Q11573"));
        assert!(EntityId::from_concept_uri("1").is_err());
    }

    #[test]
    fn test_entity_id_serde_validates() {
        let json = serde_json::to_string(&id("P31")).unwrap();
        assert_eq!(json, "\"P31\"");
        assert!(serde_json::from_str::<EntityId>("\"bogus\"").is_err());
    }

    #[test]
    fn test_canonical_language_prefers_default() {
        let none = BTreeSet::new();
        let e = Entity::new(id("Q1")).with_label("fr", "Paris").with_label("en", "Paris");
        assert_eq!(e.canonical_language("en", &none), Some("en"));

        let e = Entity::new(id("Q1")).with_label("fr", "Paris").with_label("de", "Paris");
        assert_eq!(e.canonical_language("en", &none), Some("de"));

        assert_eq!(Entity::new(id("Q1")).canonical_language("en", &none), None);
    }

    #[test]
    fn test_canonical_language_skips_denied() {
        let denied: BTreeSet<String> = ["en".to_string(), "de".to_string()].into();
        let e = Entity::new(id("Q1"))
            .with_label("en", "Paris")
            .with_label("de", "Paris")
            .with_label("fr", "Paris");
        assert_eq!(e.canonical_language("en", &denied), Some("fr"));

        let e = Entity::new(id("Q1")).with_label("de", "Paris");
        assert_eq!(e.canonical_language("en", &denied), None);
    }

    #[test]
    fn test_claim_lookup() {
        let e = Entity::new(id("Q1"))
            .with_claim(Claim::new(id("P31"), Value::EntityReference(id("Q5"))))
            .with_claim(Claim::new(id("P31"), Value::EntityReference(id("Q6"))))
            .with_claim(Claim::new(id("P1476"), Value::from("title")));
        assert_eq!(e.claims_for(&id("P31")).len(), 2);
        assert_eq!(e.claims_for(&id("P999")).len(), 0);
        assert_eq!(e.claim_count(), 3);
    }

    #[test]
    fn test_new_entity_filters_denied_languages() {
        let e = Entity::new(id("Q1"))
            .with_label("en", "Tea")
            .with_label("pwn", "Tea")
            .with_description("pwn", "drink")
            .with_alias("pwn", "cha");
        let denied: BTreeSet<String> = ["pwn".to_string()].into_iter().collect();
        let data = NewEntity::from_entity(&e, &denied, false);
        assert_eq!(data.languages(), ["en".to_string()].into_iter().collect());
    }

    #[test]
    fn test_new_entity_sitelinks_optional() {
        let mut e = Entity::new(id("Q1")).with_label("en", "Tea");
        e.sitelinks.insert("enwiki".into(), "Tea".into());
        assert!(NewEntity::from_entity(&e, &BTreeSet::new(), false).sitelinks.is_empty());
        assert_eq!(NewEntity::from_entity(&e, &BTreeSet::new(), true).sitelinks.len(), 1);
    }

    #[test]
    fn test_remove_identical_label_description() {
        let e = Entity::new(id("Q1"))
            .with_label("en", "Tea")
            .with_description("en", "Tea")
            .with_label("de", "Tee")
            .with_description("de", "Getränk");
        let mut data = NewEntity::from_entity(&e, &BTreeSet::new(), false);
        let dropped = data.remove_identical_label_description();
        assert_eq!(dropped, vec!["en".to_string()]);
        assert!(!data.descriptions.contains_key("en"));
        assert_eq!(data.descriptions.get("de").map(String::as_str), Some("Getränk"));
    }

    #[test]
    fn test_strip_languages() {
        let mut data = NewEntity::default();
        data.labels.insert("en".into(), "A".into());
        data.labels.insert("xx".into(), "A".into());
        data.aliases.insert("xx".into(), vec!["B".into()]);
        data.strip_languages(&["xx".to_string()]);
        assert_eq!(data.languages().len(), 1);
    }
}
