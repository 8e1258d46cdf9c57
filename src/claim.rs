//! Claims (statements) and their qualifiers.
//!
//! A claim asserts one value for one property on an entity. It may be
//! narrowed by qualifiers and backed by any number of reference groups.
//! Two claims are "the same" when their properties match and their values
//! are semantically equal; the store-assigned id plays no part in that.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entity::EntityId;
use crate::error::ValidationError;
use crate::source::ReferenceGroup;
use crate::value::Value;

/// Store-assigned claim identifier, `<entity id>$<guid>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ClaimId(String);

impl ClaimId {
    /// Generates a fresh claim id on `entity`.
    #[must_use]
    pub fn generate(entity: &EntityId) -> Self {
        Self(format!("{entity}${}", Uuid::new_v4()))
    }

    /// Parses a claim id, checking that it is anchored on a valid entity id.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidClaimId` when there is no `$`
    /// separator, the guid is empty, or the prefix is not an entity id.
    pub fn parse(id: impl AsRef<str>) -> Result<Self, ValidationError> {
        let id = id.as_ref();
        let invalid = || ValidationError::InvalidClaimId { id: id.to_string() };
        let (entity, guid) = id.split_once('$').ok_or_else(invalid)?;
        if guid.is_empty() || EntityId::parse(entity).is_err() {
            return Err(invalid());
        }
        Ok(Self(id.to_string()))
    }

    /// The entity this claim belongs to.
    #[must_use]
    pub fn entity(&self) -> Option<EntityId> {
        self.0.split_once('$').and_then(|(e, _)| EntityId::parse(e).ok())
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClaimId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ClaimId {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<ClaimId> for String {
    fn from(id: ClaimId) -> Self {
        id.0
    }
}

/// A (property, value) assertion with qualifiers and references.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claim {
    /// Id assigned by the owning store; `None` until written.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<ClaimId>,

    /// The asserted property.
    pub property: EntityId,

    /// The asserted value.
    pub value: Value,

    /// Qualifier property to values.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub qualifiers: BTreeMap<EntityId, Vec<Value>>,

    /// Independent reference groups.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub references: Vec<ReferenceGroup>,
}

impl Claim {
    /// Creates an unsaved claim without qualifiers or references.
    #[must_use]
    pub fn new(property: EntityId, value: Value) -> Self {
        Self {
            id: None,
            property,
            value,
            qualifiers: BTreeMap::new(),
            references: Vec::new(),
        }
    }

    /// Sets the store id.
    #[must_use]
    pub fn with_id(mut self, id: ClaimId) -> Self {
        self.id = Some(id);
        self
    }

    /// Appends a qualifier value.
    #[must_use]
    pub fn with_qualifier(mut self, property: EntityId, value: Value) -> Self {
        self.qualifiers.entry(property).or_default().push(value);
        self
    }

    /// Appends a reference group.
    #[must_use]
    pub fn with_reference(mut self, group: ReferenceGroup) -> Self {
        self.references.push(group);
        self
    }

    /// True when this claim asserts `value` for `property`.
    #[must_use]
    pub fn asserts(&self, property: &EntityId, value: &Value) -> bool {
        &self.property == property && self.value.semantically_eq(value)
    }

    /// True when a qualifier of `property` already carries `value`.
    #[must_use]
    pub fn has_qualifier(&self, property: &EntityId, value: &Value) -> bool {
        self.qualifiers
            .get(property)
            .is_some_and(|values| values.iter().any(|v| v.semantically_eq(value)))
    }

    /// True when any reference group cites `value` under `property`.
    #[must_use]
    pub fn has_source(&self, property: &EntityId, value: &Value) -> bool {
        self.references.iter().any(|group| group.contains(property, value))
    }

    /// Number of qualifier values across all qualifier properties.
    #[must_use]
    pub fn qualifier_count(&self) -> usize {
        self.qualifiers.values().map(Vec::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Quantity;

    fn id(s: &str) -> EntityId {
        EntityId::parse(s).unwrap()
    }

    #[test]
    fn test_claim_id_generate_and_parse() {
        let cid = ClaimId::generate(&id("Q7"));
        assert!(cid.as_str().starts_with("Q7$"));
        assert_eq!(cid.entity(), Some(id("Q7")));
        assert_eq!(ClaimId::parse(cid.as_str()).unwrap(), cid);
    }

    #[test]
    fn test_claim_id_rejects_malformed() {
        assert!(ClaimId::parse("Q7").is_err());
        assert!(ClaimId::parse("Q7$").is_err());
        assert!(ClaimId::parse("nope$abc").is_err());
    }

    #[test]
    fn test_asserts_uses_semantic_equality() {
        let claim = Claim::new(id("P2048"), Value::Quantity(Quantity::new("+1.50")));
        assert!(claim.asserts(&id("P2048"), &Value::Quantity(Quantity::new("1.5"))));
        assert!(!claim.asserts(&id("P2049"), &Value::Quantity(Quantity::new("1.5"))));
    }

    #[test]
    fn test_has_qualifier_and_source() {
        let claim = Claim::new(id("P39"), Value::EntityReference(id("Q11696")))
            .with_qualifier(id("P580"), Value::from("2009"))
            .with_reference(
                ReferenceGroup::new().with(id("P248"), Value::EntityReference(id("Q36578"))),
            );

        assert!(claim.has_qualifier(&id("P580"), &Value::from("2009")));
        assert!(!claim.has_qualifier(&id("P582"), &Value::from("2009")));
        assert!(claim.has_source(&id("P248"), &Value::EntityReference(id("Q36578"))));
        assert!(!claim.has_source(&id("P248"), &Value::EntityReference(id("Q1"))));
        assert_eq!(claim.qualifier_count(), 1);
    }

    #[test]
    fn test_claim_serialization_skips_empty_parts() {
        let claim = Claim::new(id("P1"), Value::from("x"));
        let json = serde_json::to_value(&claim).unwrap();
        assert!(json.get("qualifiers").is_none());
        assert!(json.get("references").is_none());
        assert!(json.get("id").is_none());
    }
}
