//! Label resolution for ids referenced by an entity.
//!
//! Stores cap how many ids one label request may carry, so
//! [`resolve_labels`] splits the request into chunks. An [`IdLabelTable`]
//! holds the labels of every id an entity's claims mention and is rebuilt
//! for each operation; it is never persisted.

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use crate::claim::Claim;
use crate::entity::{Entity, EntityId, EntityKind};
use crate::storage::{KnowledgeStore, StoreError};
use crate::value::Value;

/// Fetches labels for `ids` in `language`, chunked to the store's limit.
///
/// Every requested id appears in the result; ids the store has no label for
/// map to `""`.
///
/// # Errors
///
/// Propagates the first store failure.
pub fn resolve_labels<'a, I>(
    store: &dyn KnowledgeStore,
    ids: I,
    language: &str,
) -> Result<BTreeMap<EntityId, String>, StoreError>
where
    I: IntoIterator<Item = &'a EntityId>,
{
    let unique: Vec<EntityId> = ids
        .into_iter()
        .cloned()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let limit = store.label_batch_limit().max(1);

    let mut labels = BTreeMap::new();
    for chunk in unique.chunks(limit) {
        let mut fetched = store.fetch_labels(chunk, language)?;
        for id in chunk {
            let label = fetched.remove(id).unwrap_or_default();
            labels.insert(id.clone(), label);
        }
    }
    debug!(
        store = store.store_id(),
        ids = unique.len(),
        requests = unique.len().div_ceil(limit),
        "resolved labels"
    );
    Ok(labels)
}

/// Ids mentioned anywhere in an entity's claims, split by where their label
/// must be looked up.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReferencedIds {
    /// Properties: claim, qualifier and reference properties plus property values.
    pub properties: BTreeSet<EntityId>,
    /// Items and lexemes: entity values and quantity units.
    pub items: BTreeSet<EntityId>,
}

impl ReferencedIds {
    /// Collects the ids of every claim of `entity`.
    #[must_use]
    pub fn of_entity(entity: &Entity) -> Self {
        let mut ids = Self::default();
        for claim in entity.all_claims() {
            ids.add_claim(claim);
        }
        ids
    }

    fn add_claim(&mut self, claim: &Claim) {
        self.properties.insert(claim.property.clone());
        self.add_value(&claim.value);
        for (property, values) in &claim.qualifiers {
            self.properties.insert(property.clone());
            values.iter().for_each(|v| self.add_value(v));
        }
        for group in &claim.references {
            for (property, values) in group.iter() {
                self.properties.insert(property.clone());
                values.iter().for_each(|v| self.add_value(v));
            }
        }
    }

    fn add_value(&mut self, value: &Value) {
        for id in value.referenced_ids() {
            match id.kind() {
                EntityKind::Property => self.properties.insert(id.clone()),
                EntityKind::Item | EntityKind::Lexeme => self.items.insert(id.clone()),
            };
        }
    }
}

/// Id to display label, in one language.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdLabelTable {
    language: String,
    labels: BTreeMap<EntityId, String>,
}

impl IdLabelTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new(language: impl Into<String>) -> Self {
        Self {
            language: language.into(),
            labels: BTreeMap::new(),
        }
    }

    /// Builds the table for `entity`.
    ///
    /// Item and unit labels come from `item_store`, property labels from
    /// `property_store`. For a remote entity both are the source store; for
    /// a local entity items live in the target while properties are shared
    /// with the source.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub fn build(
        entity: &Entity,
        item_store: &dyn KnowledgeStore,
        property_store: &dyn KnowledgeStore,
        language: &str,
    ) -> Result<Self, StoreError> {
        let ids = ReferencedIds::of_entity(entity);
        let mut table = Self::new(language);
        table.labels = resolve_labels(item_store, &ids.items, language)?;
        table
            .labels
            .extend(resolve_labels(property_store, &ids.properties, language)?);
        Ok(table)
    }

    /// Label of `id`, `""` when unknown.
    #[must_use]
    pub fn label(&self, id: &EntityId) -> &str {
        self.labels.get(id).map_or("", String::as_str)
    }

    pub fn insert(&mut self, id: EntityId, label: impl Into<String>) {
        self.labels.insert(id, label.into());
    }

    #[must_use]
    pub fn language(&self) -> &str {
        &self.language
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// The text a wiki page shows for a value.
///
/// Two values from different stores that render the same are considered the
/// same claim when locating a local claim after import.
#[must_use]
pub fn display_label(value: &Value, table: &IdLabelTable) -> String {
    match value {
        Value::String(v)
        | Value::ExternalId(v)
        | Value::Url(v)
        | Value::CommonsMedia(v)
        | Value::GeoShape(v)
        | Value::TabularData(v) => v.clone(),
        Value::MonolingualText(m) => m.text.clone(),
        Value::Time(t) => t.time.clone(),
        Value::Quantity(q) => {
            let mut text = q.display_amount().to_string();
            if let (Some(lower), Some(upper)) = (&q.lower_bound, &q.upper_bound) {
                text.push_str(&format!(
                    " [{}, {}]",
                    lower.trim_start_matches('+'),
                    upper.trim_start_matches('+')
                ));
            }
            if let Some(unit) = &q.unit {
                text.push(' ');
                text.push_str(table.label(unit));
            }
            text
        }
        Value::GlobeCoordinate(c) => format!("{}, {}", c.latitude, c.longitude),
        Value::EntityReference(id) | Value::PropertyReference(id) => table.label(id).to_string(),
        Value::SomeValue => "unknown value".to_string(),
        Value::NoValue => "no value".to_string(),
        Value::Unknown { raw, .. } => raw.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::ReferenceGroup;
    use crate::storage::InMemoryStore;
    use crate::value::{GlobeCoordinate, Quantity};

    fn id(s: &str) -> EntityId {
        EntityId::parse(s).unwrap()
    }

    fn labelled_store(n: u64, limit: usize) -> InMemoryStore {
        let store = InMemoryStore::new("remote").with_label_batch_limit(limit);
        for i in 1..=n {
            let item = Entity::new(EntityId::from_parts(EntityKind::Item, i));
            store.insert(item.with_label("en", format!("item {i}"))).unwrap();
        }
        store
    }

    #[test]
    fn resolve_labels_chunks_requests() {
        let store = labelled_store(120, 50);
        let ids: Vec<EntityId> =
            (1..=120).map(|i| EntityId::from_parts(EntityKind::Item, i)).collect();
        let labels = resolve_labels(&store, &ids, "en").unwrap();
        assert_eq!(labels.len(), 120);
        assert_eq!(labels[&id("Q120")], "item 120");
        assert_eq!(store.stats().label_requests, 3);
    }

    #[test]
    fn resolve_labels_keeps_unknown_ids() {
        let store = labelled_store(1, 50);
        let ids = [id("Q1"), id("Q77"), id("Q1")];
        let labels = resolve_labels(&store, &ids, "en").unwrap();
        assert_eq!(labels.len(), 2);
        assert_eq!(labels[&id("Q77")], "");
    }

    #[test]
    fn referenced_ids_cover_qualifiers_references_and_units() {
        let height = Value::from(Quantity::new("+2").with_unit(id("Q11573")));
        let claim = Claim::new(id("P2048"), height)
            .with_qualifier(id("P642"), Value::from(id("Q5")))
            .with_reference(ReferenceGroup::new().with(id("P248"), Value::from(id("Q36578"))));
        let entity = Entity::new(id("Q1"))
            .with_claim(claim)
            .with_claim(Claim::new(id("P1659"), Value::from(id("P31"))));

        let ids = ReferencedIds::of_entity(&entity);
        let props: Vec<&str> = ids.properties.iter().map(EntityId::as_str).collect();
        assert_eq!(props, vec!["P1659", "P2048", "P248", "P31", "P642"]);
        let items: Vec<&str> = ids.items.iter().map(EntityId::as_str).collect();
        assert_eq!(items, vec!["Q11573", "Q36578", "Q5"]);
    }

    #[test]
    fn table_takes_properties_from_property_store() {
        let local = InMemoryStore::new("local");
        local.insert(Entity::new(id("Q1")).with_label("en", "local human")).unwrap();
        let remote = InMemoryStore::new("remote");
        remote.insert(Entity::new(id("P31")).with_label("en", "instance of")).unwrap();
        remote.insert(Entity::new(id("Q1")).with_label("en", "remote universe")).unwrap();

        let entity = Entity::new(id("Q2")).with_claim(Claim::new(id("P31"), Value::from(id("Q1"))));
        let table = IdLabelTable::build(&entity, &local, &remote, "en").unwrap();
        assert_eq!(table.label(&id("P31")), "instance of");
        assert_eq!(table.label(&id("Q1")), "local human");
        assert_eq!(table.label(&id("Q404")), "");
    }

    #[test]
    fn display_labels() {
        let mut table = IdLabelTable::new("en");
        table.insert(id("Q5"), "human");
        table.insert(id("Q11573"), "metre");

        assert_eq!(display_label(&Value::from(id("Q5")), &table), "human");
        assert_eq!(display_label(&Value::from("abc"), &table), "abc");
        let q = Value::from(Quantity::new("+1.96").with_unit(id("Q11573")));
        assert_eq!(display_label(&q, &table), "1.96 metre");
        let q = Value::from(Quantity::new("+5").with_bounds("+4", "+6"));
        assert_eq!(display_label(&q, &table), "5 [4, 6]");
        let c = Value::from(GlobeCoordinate::new(1.5, 2.0, 0.1));
        assert_eq!(display_label(&c, &table), "1.5, 2");
    }
}
