//! Reference groups (sources) attached to claims.
//!
//! A reference group is one citation: a set of source properties with their
//! values ("stated in", "retrieved", "reference URL", ...). A claim keeps its
//! groups independent; the importer never merges new sources into an
//! existing group, it always appends a new one.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::entity::EntityId;
use crate::value::Value;

/// Wikidata "Wikimedia import URL".
pub const IMPORT_URL_PROPERTY: &str = "P4656";

/// Wikidata "reference URL".
pub const REFERENCE_URL_PROPERTY: &str = "P854";

/// Wikidata "retrieved".
pub const RETRIEVED_PROPERTY: &str = "P813";

/// One citation backing a claim.
///
/// # Examples
///
/// ```
/// use wikifed::{EntityId, ReferenceGroup, Value};
///
/// let stated_in = EntityId::parse("P248").unwrap();
/// let group = ReferenceGroup::new().with(stated_in.clone(), Value::from("catalog"));
/// assert!(group.contains(&stated_in, &Value::from("catalog")));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReferenceGroup {
    snaks: BTreeMap<EntityId, Vec<Value>>,
}

impl ReferenceGroup {
    /// Creates an empty group.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a value and returns the group.
    #[must_use]
    pub fn with(mut self, property: EntityId, value: Value) -> Self {
        self.push(property, value);
        self
    }

    /// Appends a value.
    pub fn push(&mut self, property: EntityId, value: Value) {
        self.snaks.entry(property).or_default().push(value);
    }

    /// True when the group cites `value` under `property`.
    #[must_use]
    pub fn contains(&self, property: &EntityId, value: &Value) -> bool {
        self.snaks
            .get(property)
            .is_some_and(|values| values.iter().any(|v| v.semantically_eq(value)))
    }

    /// Values recorded for a property.
    #[must_use]
    pub fn values(&self, property: &EntityId) -> &[Value] {
        self.snaks.get(property).map_or(&[], Vec::as_slice)
    }

    /// Iterates over (property, values) pairs ordered by property.
    pub fn iter(&self) -> impl Iterator<Item = (&EntityId, &Vec<Value>)> {
        self.snaks.iter()
    }

    /// Removes every value of `property`; returns how many were removed.
    pub fn remove_property(&mut self, property: &EntityId) -> usize {
        self.snaks.remove(property).map_or(0, |v| v.len())
    }

    /// True when the group has no values.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.snaks.values().all(Vec::is_empty)
    }

    /// Total number of values.
    #[must_use]
    pub fn len(&self) -> usize {
        self.snaks.values().map(Vec::len).sum()
    }
}

impl FromIterator<(EntityId, Value)> for ReferenceGroup {
    fn from_iter<T: IntoIterator<Item = (EntityId, Value)>>(iter: T) -> Self {
        let mut group = Self::new();
        for (property, value) in iter {
            group.push(property, value);
        }
        group
    }
}
