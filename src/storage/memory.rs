//! In-memory storage backend.
//!
//! A thread-safe implementation of [`KnowledgeStore`] that enforces the same
//! rules a Wikibase backend does on writes: known languages only, label and
//! description must differ, a label+description pair is unique per
//! language, and label lookups are capped per request. It backs the tests,
//! serves entity dumps as a source, and persists a local target as a JSON
//! snapshot.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

use crate::claim::{Claim, ClaimId};
use crate::entity::{Entity, EntityId, EntityKind, NewEntity, SearchResult};
use crate::source::ReferenceGroup;
use crate::storage::traits::{KnowledgeStore, StoreError, DEFAULT_LABEL_BATCH_LIMIT};
use crate::value::Value;

const SEARCH_LIMIT: usize = 50;

fn lock_err(context: &'static str) -> StoreError {
    StoreError::BackendError(format!("poisoned lock: {context}"))
}

fn normalize_key(s: &str) -> String {
    s.trim().to_lowercase()
}

/// Counters of store calls, for tests and run summaries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    /// `search_entities` calls.
    pub searches: usize,
    /// `fetch_labels` calls.
    pub label_requests: usize,
    /// Entities created.
    pub entities_created: usize,
    /// Claims written.
    pub claims_written: usize,
    /// Qualifier values written.
    pub qualifiers_written: usize,
    /// Reference groups written.
    pub source_groups_written: usize,
}

impl StoreStats {
    /// Total number of successful writes of any kind.
    #[must_use]
    pub const fn writes(&self) -> usize {
        self.entities_created
            + self.claims_written
            + self.qualifiers_written
            + self.source_groups_written
    }
}

#[derive(Debug, Default)]
struct StoreState {
    entities: BTreeMap<EntityId, Entity>,
    next_item: u64,
    rejected_properties: BTreeSet<EntityId>,
    stats: StoreStats,
}

impl StoreState {
    fn allocate_item_id(&mut self) -> EntityId {
        loop {
            self.next_item += 1;
            let id = EntityId::from_parts(EntityKind::Item, self.next_item);
            if !self.entities.contains_key(&id) {
                return id;
            }
        }
    }

    fn claim_mut(&mut self, claim: &ClaimId) -> Result<&mut Claim, StoreError> {
        let entity_id = claim
            .entity()
            .ok_or_else(|| StoreError::ClaimNotFound(claim.clone()))?;
        self.entities
            .get_mut(&entity_id)
            .and_then(|e| e.claim_mut(claim))
            .ok_or_else(|| StoreError::ClaimNotFound(claim.clone()))
    }

    fn check_property(&self, property: &EntityId, what: &str) -> Result<(), StoreError> {
        if self.rejected_properties.contains(property) {
            return Err(StoreError::WriteRejected(format!(
                "{what} with property {property} refused"
            )));
        }
        Ok(())
    }

    fn find_duplicate_terms(&self, data: &NewEntity) -> Option<StoreError> {
        data.labels.iter().find_map(|(language, label)| {
            let description = data.descriptions.get(language)?;
            self.term_clash(None, language, label, description)
        })
    }

    /// Another entity than `except` with this label and description.
    fn term_clash(
        &self,
        except: Option<&EntityId>,
        language: &str,
        label: &str,
        description: &str,
    ) -> Option<StoreError> {
        let existing = self.entities.values().find(|e| {
            Some(&e.id) != except
                && e.label(language) == Some(label)
                && e.description(language) == Some(description)
        })?;
        Some(StoreError::DuplicateLabelDescription {
            existing: existing.id.clone(),
            language: language.to_string(),
            label: label.to_string(),
            description: description.to_string(),
        })
    }

    fn entity_mut(&mut self, id: &EntityId) -> Result<&mut Entity, StoreError> {
        self.entities
            .get_mut(id)
            .ok_or_else(|| StoreError::EntityNotFound(id.clone()))
    }

    /// Writes one term after checking it against the entity's other term
    /// and every other entity.
    fn set_term(
        &mut self,
        entity: &EntityId,
        language: &str,
        text: &str,
        term: Term,
    ) -> Result<(), StoreError> {
        let current = self
            .entities
            .get(entity)
            .ok_or_else(|| StoreError::EntityNotFound(entity.clone()))?;
        let (label, description) = match term {
            Term::Label => (text, current.description(language).unwrap_or_default()),
            Term::Description => (current.label(language).unwrap_or_default(), text),
        };
        if !text.is_empty() && !label.is_empty() && !description.is_empty() {
            if label == description {
                return Err(StoreError::LabelEqualsDescription {
                    language: language.to_string(),
                });
            }
            if let Some(err) = self.term_clash(Some(entity), language, label, description) {
                return Err(err);
            }
        }

        let target = self.entity_mut(entity)?;
        let terms = match term {
            Term::Label => &mut target.labels,
            Term::Description => &mut target.descriptions,
        };
        if text.is_empty() {
            terms.remove(language);
        } else {
            terms.insert(language.to_string(), text.to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
enum Term {
    Label,
    Description,
}

/// On-disk form of an [`InMemoryStore`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreSnapshot {
    /// Id of the saved store.
    pub store_id: String,
    /// Highest item number handed out so far.
    #[serde(default)]
    pub next_item: u64,
    /// Every entity, properties included.
    #[serde(default)]
    pub entities: Vec<Entity>,
}

/// Thread-safe in-memory knowledge store.
#[derive(Debug)]
pub struct InMemoryStore {
    store_id: String,
    label_batch_limit: usize,
    allowed_languages: Option<BTreeSet<String>>,
    state: RwLock<StoreState>,
}

impl InMemoryStore {
    /// Create a new empty store.
    #[must_use]
    pub fn new(store_id: impl Into<String>) -> Self {
        Self {
            store_id: store_id.into(),
            label_batch_limit: DEFAULT_LABEL_BATCH_LIMIT,
            allowed_languages: None,
            state: RwLock::new(StoreState::default()),
        }
    }

    /// Restrict term languages to this set; creating an entity with any
    /// other language fails with `UnrecognizedLanguage`.
    #[must_use]
    pub fn with_allowed_languages<I, S>(mut self, languages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_languages = Some(languages.into_iter().map(Into::into).collect());
        self
    }

    /// Override the per-request id cap of `fetch_labels`.
    #[must_use]
    pub fn with_label_batch_limit(mut self, limit: usize) -> Self {
        self.label_batch_limit = limit.max(1);
        self
    }

    /// Seed the store with an entity, keeping its id.
    ///
    /// # Errors
    ///
    /// Returns `BackendError` if the lock is poisoned.
    pub fn insert(&self, entity: Entity) -> Result<(), StoreError> {
        let mut state = self.state.write().map_err(|_| lock_err("store.insert"))?;
        if entity.id.kind() == EntityKind::Item {
            state.next_item = state.next_item.max(entity.id.number());
        }
        state.entities.insert(entity.id.clone(), entity);
        Ok(())
    }

    /// Builds a store from already-parsed entities.
    ///
    /// # Errors
    ///
    /// Returns `BackendError` if the lock is poisoned.
    pub fn from_entities(
        store_id: impl Into<String>,
        entities: impl IntoIterator<Item = Entity>,
    ) -> Result<Self, StoreError> {
        let store = Self::new(store_id);
        for entity in entities {
            store.insert(entity)?;
        }
        Ok(store)
    }

    /// Every entity in id order.
    ///
    /// # Errors
    ///
    /// Returns `BackendError` if the lock is poisoned.
    pub fn entities(&self) -> Result<Vec<Entity>, StoreError> {
        let state = self.state.read().map_err(|_| lock_err("store.entities"))?;
        Ok(state.entities.values().cloned().collect())
    }

    /// Number of stored entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.read().map(|s| s.entities.len()).unwrap_or(0)
    }

    /// True when the store holds no entities.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Call counters so far.
    #[must_use]
    pub fn stats(&self) -> StoreStats {
        self.state.read().map(|s| s.stats).unwrap_or_default()
    }

    /// Refuse every claim, qualifier and source write that uses `property`.
    ///
    /// # Errors
    ///
    /// Returns `BackendError` if the lock is poisoned.
    pub fn reject_writes_for(&self, property: EntityId) -> Result<(), StoreError> {
        let mut state = self.state.write().map_err(|_| lock_err("store.reject"))?;
        state.rejected_properties.insert(property);
        Ok(())
    }

    /// Captures the store contents.
    ///
    /// # Errors
    ///
    /// Returns `BackendError` if the lock is poisoned.
    pub fn snapshot(&self) -> Result<StoreSnapshot, StoreError> {
        let state = self.state.read().map_err(|_| lock_err("store.snapshot"))?;
        Ok(StoreSnapshot {
            store_id: self.store_id.clone(),
            next_item: state.next_item,
            entities: state.entities.values().cloned().collect(),
        })
    }

    /// Rebuilds a store from a snapshot.
    ///
    /// # Errors
    ///
    /// Returns `BackendError` if the lock is poisoned.
    pub fn from_snapshot(snapshot: StoreSnapshot) -> Result<Self, StoreError> {
        let store = Self::from_entities(snapshot.store_id, snapshot.entities)?;
        {
            let mut state = store.state.write().map_err(|_| lock_err("store.restore"))?;
            state.next_item = state.next_item.max(snapshot.next_item);
        }
        Ok(store)
    }

    /// Writes the snapshot as pretty JSON.
    ///
    /// # Errors
    ///
    /// Returns `SerializationError` or `BackendError` on I/O failure.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), StoreError> {
        let snapshot = self.snapshot()?;
        let json = serde_json::to_string_pretty(&snapshot)
            .map_err(|e| StoreError::SerializationError(e.to_string()))?;
        fs::write(path.as_ref(), json)
            .map_err(|e| StoreError::BackendError(format!("{}: {e}", path.as_ref().display())))
    }

    fn check_languages<'l>(
        &self,
        languages: impl IntoIterator<Item = &'l str>,
    ) -> Result<(), StoreError> {
        let Some(allowed) = &self.allowed_languages else {
            return Ok(());
        };
        let unknown: Vec<String> = languages
            .into_iter()
            .filter(|lang| !allowed.contains(*lang))
            .map(str::to_string)
            .collect();
        if unknown.is_empty() {
            Ok(())
        } else {
            Err(StoreError::UnrecognizedLanguage { languages: unknown })
        }
    }

    /// Loads a snapshot written by [`save`](Self::save).
    ///
    /// # Errors
    ///
    /// Returns `SerializationError` or `BackendError` on I/O failure.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let json = fs::read_to_string(path.as_ref())
            .map_err(|e| StoreError::BackendError(format!("{}: {e}", path.as_ref().display())))?;
        let snapshot: StoreSnapshot = serde_json::from_str(&json)
            .map_err(|e| StoreError::SerializationError(e.to_string()))?;
        Self::from_snapshot(snapshot)
    }
}

impl KnowledgeStore for InMemoryStore {
    fn store_id(&self) -> &str {
        &self.store_id
    }

    fn search_entities(
        &self,
        label: &str,
        language: &str,
    ) -> Result<Vec<SearchResult>, StoreError> {
        let mut state = self.state.write().map_err(|_| lock_err("store.search"))?;
        state.stats.searches += 1;

        let query = normalize_key(label);
        if query.is_empty() {
            return Ok(Vec::new());
        }

        // Exact hits are never cut off; the limit only applies to the prefix tail.
        let mut exact = Vec::new();
        let mut prefix = Vec::new();
        for entity in state.entities.values() {
            let label = entity.label(language).map(normalize_key);
            let aliases: Vec<(&String, String)> = entity
                .aliases
                .get(language)
                .into_iter()
                .flatten()
                .map(|a| (a, normalize_key(a)))
                .collect();

            let label_exact = label.as_deref() == Some(query.as_str());
            let alias_exact: Vec<String> = aliases
                .iter()
                .filter(|(_, key)| *key == query)
                .map(|(a, _)| (*a).clone())
                .collect();
            let is_exact = label_exact || !alias_exact.is_empty();

            let label_hit = label.as_deref().is_some_and(|l| l.starts_with(&query));
            let alias_hits: Vec<String> = if label_exact {
                Vec::new()
            } else if is_exact {
                alias_exact
            } else if label_hit {
                Vec::new()
            } else {
                aliases
                    .iter()
                    .filter(|(_, key)| key.starts_with(&query))
                    .map(|(a, _)| (*a).clone())
                    .collect()
            };
            if !label_hit && !is_exact && alias_hits.is_empty() {
                continue;
            }

            let hit = SearchResult {
                id: entity.id.clone(),
                label: entity.label(language).map(str::to_string),
                description: entity.description(language).map(str::to_string),
                language: language.to_string(),
                aliases: alias_hits,
            };
            if is_exact {
                exact.push(hit);
            } else if prefix.len() < SEARCH_LIMIT {
                prefix.push(hit);
            }
        }

        let tail = SEARCH_LIMIT.saturating_sub(exact.len());
        let mut results = exact;
        results.extend(prefix.into_iter().take(tail));
        Ok(results)
    }

    fn label_batch_limit(&self) -> usize {
        self.label_batch_limit
    }

    fn fetch_labels(
        &self,
        ids: &[EntityId],
        language: &str,
    ) -> Result<BTreeMap<EntityId, String>, StoreError> {
        if ids.len() > self.label_batch_limit {
            return Err(StoreError::TooManyIds {
                requested: ids.len(),
                limit: self.label_batch_limit,
            });
        }

        let mut state = self.state.write().map_err(|_| lock_err("store.labels"))?;
        state.stats.label_requests += 1;

        Ok(ids
            .iter()
            .map(|id| {
                let label = state
                    .entities
                    .get(id)
                    .and_then(|e| e.label(language))
                    .unwrap_or_default()
                    .to_string();
                (id.clone(), label)
            })
            .collect())
    }

    fn create_entity(&self, data: NewEntity) -> Result<Entity, StoreError> {
        self.check_languages(data.languages().iter().map(String::as_str))?;

        for (language, label) in &data.labels {
            if data.descriptions.get(language) == Some(label) {
                return Err(StoreError::LabelEqualsDescription {
                    language: language.clone(),
                });
            }
        }

        let mut state = self.state.write().map_err(|_| lock_err("store.create"))?;
        if let Some(err) = state.find_duplicate_terms(&data) {
            return Err(err);
        }

        let id = state.allocate_item_id();
        let entity = Entity {
            id: id.clone(),
            labels: data.labels,
            descriptions: data.descriptions,
            aliases: data.aliases,
            claims: BTreeMap::new(),
            sitelinks: data.sitelinks,
        };
        state.entities.insert(id, entity.clone());
        state.stats.entities_created += 1;
        Ok(entity)
    }

    fn fetch_entity(&self, id: &EntityId) -> Result<Option<Entity>, StoreError> {
        let state = self.state.read().map_err(|_| lock_err("store.fetch"))?;
        Ok(state.entities.get(id).cloned())
    }

    fn write_claim(
        &self,
        entity: &EntityId,
        property: &EntityId,
        value: &Value,
    ) -> Result<Claim, StoreError> {
        let mut state = self.state.write().map_err(|_| lock_err("store.claim"))?;
        state.check_property(property, "claim")?;

        let target = state
            .entities
            .get_mut(entity)
            .ok_or_else(|| StoreError::EntityNotFound(entity.clone()))?;
        let claim = Claim::new(property.clone(), value.clone()).with_id(ClaimId::generate(entity));
        target.push_claim(claim.clone());
        state.stats.claims_written += 1;
        Ok(claim)
    }

    fn write_qualifier(
        &self,
        claim: &ClaimId,
        property: &EntityId,
        value: &Value,
    ) -> Result<(), StoreError> {
        let mut state = self.state.write().map_err(|_| lock_err("store.qualifier"))?;
        state.check_property(property, "qualifier")?;

        let target = state.claim_mut(claim)?;
        target
            .qualifiers
            .entry(property.clone())
            .or_default()
            .push(value.clone());
        state.stats.qualifiers_written += 1;
        Ok(())
    }

    fn write_sources(&self, claim: &ClaimId, group: &ReferenceGroup) -> Result<(), StoreError> {
        if group.is_empty() {
            return Err(StoreError::WriteRejected("empty reference group".to_string()));
        }

        let mut state = self.state.write().map_err(|_| lock_err("store.sources"))?;
        for (property, _) in group.iter() {
            state.check_property(property, "source")?;
        }

        let target = state.claim_mut(claim)?;
        target.references.push(group.clone());
        state.stats.source_groups_written += 1;
        Ok(())
    }

    fn remove_claim(&self, claim: &ClaimId) -> Result<(), StoreError> {
        let mut state = self.state.write().map_err(|_| lock_err("store.remove_claim"))?;
        let entity_id = claim
            .entity()
            .ok_or_else(|| StoreError::ClaimNotFound(claim.clone()))?;
        let entity = state
            .entities
            .get_mut(&entity_id)
            .ok_or_else(|| StoreError::ClaimNotFound(claim.clone()))?;

        let mut removed = false;
        for claims in entity.claims.values_mut() {
            let before = claims.len();
            claims.retain(|c| c.id.as_ref() != Some(claim));
            removed |= claims.len() != before;
        }
        entity.claims.retain(|_, claims| !claims.is_empty());

        if removed {
            Ok(())
        } else {
            Err(StoreError::ClaimNotFound(claim.clone()))
        }
    }

    fn remove_qualifiers(&self, claim: &ClaimId, property: &EntityId) -> Result<usize, StoreError> {
        let mut state = self.state.write().map_err(|_| lock_err("store.remove_qualifiers"))?;
        let target = state.claim_mut(claim)?;
        Ok(target.qualifiers.remove(property).map_or(0, |v| v.len()))
    }

    fn remove_sources(&self, claim: &ClaimId, property: &EntityId) -> Result<usize, StoreError> {
        let mut state = self.state.write().map_err(|_| lock_err("store.remove_sources"))?;
        let target = state.claim_mut(claim)?;
        let removed = target
            .references
            .iter_mut()
            .map(|group| group.remove_property(property))
            .sum();
        target.references.retain(|group| !group.is_empty());
        Ok(removed)
    }

    fn set_label(&self, entity: &EntityId, language: &str, label: &str) -> Result<(), StoreError> {
        self.check_languages([language])?;
        let mut state = self.state.write().map_err(|_| lock_err("store.set_label"))?;
        state.set_term(entity, language, label.trim(), Term::Label)
    }

    fn set_description(
        &self,
        entity: &EntityId,
        language: &str,
        description: &str,
    ) -> Result<(), StoreError> {
        self.check_languages([language])?;
        let mut state = self.state.write().map_err(|_| lock_err("store.set_description"))?;
        state.set_term(entity, language, description.trim(), Term::Description)
    }

    fn set_aliases(
        &self,
        entity: &EntityId,
        language: &str,
        aliases: &[String],
    ) -> Result<(), StoreError> {
        self.check_languages([language])?;
        let mut state = self.state.write().map_err(|_| lock_err("store.set_aliases"))?;
        let target = state.entity_mut(entity)?;

        let mut cleaned: Vec<String> = Vec::new();
        for alias in aliases.iter().map(|a| a.trim()).filter(|a| !a.is_empty()) {
            if !cleaned.iter().any(|c| c == alias) {
                cleaned.push(alias.to_string());
            }
        }
        if cleaned.is_empty() {
            target.aliases.remove(language);
        } else {
            target.aliases.insert(language.to_string(), cleaned);
        }
        Ok(())
    }

    fn set_sitelink(&self, entity: &EntityId, site: &str, title: &str) -> Result<(), StoreError> {
        if site.trim().is_empty() || title.trim().is_empty() {
            return Err(StoreError::WriteRejected("sitelink needs a site and a title".to_string()));
        }
        let mut state = self.state.write().map_err(|_| lock_err("store.set_sitelink"))?;
        state
            .entity_mut(entity)?
            .sitelinks
            .insert(site.trim().to_string(), title.trim().to_string());
        Ok(())
    }

    fn remove_sitelink(&self, entity: &EntityId, site: &str) -> Result<bool, StoreError> {
        let mut state = self.state.write().map_err(|_| lock_err("store.remove_sitelink"))?;
        Ok(state.entity_mut(entity)?.sitelinks.remove(site).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> EntityId {
        EntityId::parse(s).unwrap()
    }

    fn terms(label: &str, description: Option<&str>) -> NewEntity {
        let mut data = NewEntity::default();
        data.labels.insert("en".into(), label.into());
        if let Some(d) = description {
            data.descriptions.insert("en".into(), d.into());
        }
        data
    }

    #[test]
    fn create_assigns_sequential_item_ids() {
        let store = InMemoryStore::new("local");
        let a = store.create_entity(terms("A", None)).unwrap();
        let b = store.create_entity(terms("B", None)).unwrap();
        assert_eq!(a.id, id("Q1"));
        assert_eq!(b.id, id("Q2"));
        assert_eq!(store.stats().entities_created, 2);
    }

    #[test]
    fn create_skips_ids_of_seeded_entities() {
        let store = InMemoryStore::new("local");
        store.insert(Entity::new(id("Q10")).with_label("en", "seed")).unwrap();
        let created = store.create_entity(terms("A", None)).unwrap();
        assert_eq!(created.id, id("Q11"));
    }

    #[test]
    fn create_rejects_unrecognized_languages() {
        let store = InMemoryStore::new("local").with_allowed_languages(["en", "de"]);
        let mut data = terms("A", None);
        data.labels.insert("pwn".into(), "A".into());
        data.aliases.insert("mcn".into(), vec!["a".into()]);
        match store.create_entity(data) {
            Err(StoreError::UnrecognizedLanguage { languages }) => {
                assert_eq!(languages, vec!["mcn".to_string(), "pwn".to_string()]);
            }
            other => panic!("expected UnrecognizedLanguage, got {other:?}"),
        }
        assert!(store.is_empty());
    }

    #[test]
    fn create_rejects_label_equal_to_description() {
        let store = InMemoryStore::new("local");
        let err = store.create_entity(terms("Tea", Some("Tea"))).unwrap_err();
        assert!(matches!(err, StoreError::LabelEqualsDescription { .. }));
    }

    #[test]
    fn create_rejects_duplicate_label_description() {
        let store = InMemoryStore::new("local");
        let first = store.create_entity(terms("Tea", Some("drink"))).unwrap();
        match store.create_entity(terms("Tea", Some("drink"))) {
            Err(StoreError::DuplicateLabelDescription { existing, .. }) => {
                assert_eq!(existing, first.id);
            }
            other => panic!("expected DuplicateLabelDescription, got {other:?}"),
        }
        // Same label, other description is fine.
        store.create_entity(terms("Tea", Some("plant"))).unwrap();
    }

    #[test]
    fn search_matches_label_prefix_and_aliases() {
        let store = InMemoryStore::new("local");
        store
            .insert(Entity::new(id("Q1")).with_label("en", "Metre").with_description("en", "unit"))
            .unwrap();
        store.insert(Entity::new(id("Q2")).with_alias("en", "metre stick")).unwrap();
        store.insert(Entity::new(id("Q3")).with_label("de", "Meter")).unwrap();

        let hits = store.search_entities("metre", "en").unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].label.as_deref(), Some("Metre"));
        assert_eq!(hits[0].description.as_deref(), Some("unit"));
        assert_eq!(hits[1].label, None);
        assert_eq!(hits[1].aliases, vec!["metre stick".to_string()]);
        assert!(store.search_entities("  ", "en").unwrap().is_empty());
    }

    #[test]
    fn term_edits_follow_create_rules() {
        let store = InMemoryStore::new("local").with_allowed_languages(["en", "de"]);
        let tea = store.create_entity(terms("tea", Some("drink"))).unwrap();
        let other = store.create_entity(terms("tisane", Some("drink"))).unwrap();

        store.set_label(&other.id, "de", "Kräutertee").unwrap();
        // Renaming onto tea's label+description pair is refused.
        let err = store.set_label(&other.id, "en", "tea").unwrap_err();
        assert!(matches!(
            err,
            StoreError::DuplicateLabelDescription { ref existing, .. } if *existing == tea.id
        ));
        let err = store.set_description(&tea.id, "en", "tea").unwrap_err();
        assert!(matches!(err, StoreError::LabelEqualsDescription { .. }));
        assert!(matches!(
            store.set_label(&tea.id, "tlh", "x").unwrap_err(),
            StoreError::UnrecognizedLanguage { .. }
        ));

        // Setting the same term on the same entity is not a clash.
        store.set_description(&tea.id, "en", "drink").unwrap();
        store.set_description(&tea.id, "en", "").unwrap();

        let e = store.fetch_entity(&tea.id).unwrap().unwrap();
        assert_eq!(e.description("en"), None);
        let other = store.fetch_entity(&other.id).unwrap().unwrap();
        assert_eq!(other.label("de"), Some("Kräutertee"));
        assert!(matches!(
            store.set_label(&id("Q99"), "en", "x").unwrap_err(),
            StoreError::EntityNotFound(_)
        ));
    }

    #[test]
    fn aliases_and_sitelinks() {
        let store = InMemoryStore::new("local");
        let tea = store.create_entity(terms("tea", None)).unwrap();

        let aliases: Vec<String> =
            [" cha ", "chai", "cha", ""].into_iter().map(String::from).collect();
        store.set_aliases(&tea.id, "en", &aliases).unwrap();
        store.set_sitelink(&tea.id, "enwiki", "Tea").unwrap();
        assert!(store.set_sitelink(&tea.id, "enwiki", " ").is_err());

        let e = store.fetch_entity(&tea.id).unwrap().unwrap();
        assert_eq!(e.aliases["en"], vec!["cha".to_string(), "chai".to_string()]);
        assert_eq!(e.sitelinks["enwiki"], "Tea");

        assert!(store.remove_sitelink(&tea.id, "enwiki").unwrap());
        assert!(!store.remove_sitelink(&tea.id, "enwiki").unwrap());
        store.set_aliases(&tea.id, "en", &[]).unwrap();
        assert!(store.fetch_entity(&tea.id).unwrap().unwrap().aliases.is_empty());
    }

    #[test]
    fn exact_hits_survive_the_result_limit() {
        let store = InMemoryStore::new("local");
        for n in 1..=60 {
            let item = Entity::new(EntityId::from_parts(EntityKind::Item, n));
            store.insert(item.with_label("en", format!("Tea {n}"))).unwrap();
        }
        store.insert(Entity::new(id("Q100")).with_label("en", "Tea")).unwrap();
        store
            .insert(Entity::new(id("Q101")).with_label("en", "Chai").with_alias("en", "tea"))
            .unwrap();

        let hits = store.search_entities("tea", "en").unwrap();
        assert_eq!(hits.len(), SEARCH_LIMIT);
        assert_eq!(hits[0].id, id("Q100"));
        assert_eq!(hits[1].id, id("Q101"));
        assert_eq!(hits[1].aliases, vec!["tea".to_string()]);
        assert!(hits[2..]
            .iter()
            .all(|h| h.label.as_deref().is_some_and(|l| l.starts_with("Tea "))));
    }

    #[test]
    fn fetch_labels_enforces_limit_and_keeps_missing_ids() {
        let store = InMemoryStore::new("local").with_label_batch_limit(2);
        store.insert(Entity::new(id("Q1")).with_label("en", "one")).unwrap();

        let labels = store.fetch_labels(&[id("Q1"), id("Q9")], "en").unwrap();
        assert_eq!(labels[&id("Q1")], "one");
        assert_eq!(labels[&id("Q9")], "");

        let err = store.fetch_labels(&[id("Q1"), id("Q2"), id("Q3")], "en").unwrap_err();
        assert!(matches!(err, StoreError::TooManyIds { requested: 3, limit: 2 }));
    }

    #[test]
    fn claim_qualifier_and_source_writes() {
        let store = InMemoryStore::new("local");
        let e = store.create_entity(terms("A", None)).unwrap();
        let claim = store.write_claim(&e.id, &id("P31"), &Value::from(id("Q5"))).unwrap();
        let cid = claim.id.clone().unwrap();

        store.write_qualifier(&cid, &id("P580"), &Value::from("2001")).unwrap();
        store
            .write_sources(&cid, &ReferenceGroup::new().with(id("P248"), Value::from(id("Q7"))))
            .unwrap();

        let stored = store.fetch_entity(&e.id).unwrap().unwrap();
        let stored_claim = stored.claim(&cid).unwrap();
        assert_eq!(stored_claim.qualifier_count(), 1);
        assert_eq!(stored_claim.references.len(), 1);
        assert_eq!(store.stats().writes(), 4);
    }

    #[test]
    fn rejected_property_fails_writes() {
        let store = InMemoryStore::new("local");
        let e = store.create_entity(terms("A", None)).unwrap();
        store.reject_writes_for(id("P18")).unwrap();
        let err = store.write_claim(&e.id, &id("P18"), &Value::from("x")).unwrap_err();
        assert!(matches!(err, StoreError::WriteRejected(_)));
        assert!(store.write_claim(&e.id, &id("P19"), &Value::from("x")).is_ok());
    }

    #[test]
    fn empty_source_group_is_rejected() {
        let store = InMemoryStore::new("local");
        let e = store.create_entity(terms("A", None)).unwrap();
        let claim = store.write_claim(&e.id, &id("P1"), &Value::from("x")).unwrap();
        let cid = claim.id.unwrap();
        let err = store.write_sources(&cid, &ReferenceGroup::new()).unwrap_err();
        assert!(matches!(err, StoreError::WriteRejected(_)));
    }

    #[test]
    fn removals() {
        let store = InMemoryStore::new("local");
        let e = store.create_entity(terms("A", None)).unwrap();
        let claim = store.write_claim(&e.id, &id("P1"), &Value::from("x")).unwrap();
        let cid = claim.id.unwrap();
        store.write_qualifier(&cid, &id("P2"), &Value::from("q")).unwrap();
        store
            .write_sources(
                &cid,
                &ReferenceGroup::new()
                    .with(id("P854"), Value::Url("http://a".into()))
                    .with(id("P813"), Value::from("2020")),
            )
            .unwrap();

        assert_eq!(store.remove_qualifiers(&cid, &id("P2")).unwrap(), 1);
        assert_eq!(store.remove_sources(&cid, &id("P854")).unwrap(), 1);
        let entity = store.fetch_entity(&e.id).unwrap().unwrap();
        let refs = entity.claim(&cid).unwrap().references.clone();
        assert_eq!(refs.len(), 1);

        store.remove_claim(&cid).unwrap();
        assert_eq!(store.fetch_entity(&e.id).unwrap().unwrap().claim_count(), 0);
        assert!(matches!(store.remove_claim(&cid), Err(StoreError::ClaimNotFound(_))));
    }

    #[test]
    fn snapshot_round_trip_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("local.json");

        let store = InMemoryStore::new("local");
        let e = store.create_entity(terms("A", Some("first"))).unwrap();
        store.write_claim(&e.id, &id("P1"), &Value::from("x")).unwrap();
        store.save(&path).unwrap();

        let restored = InMemoryStore::load(&path).unwrap();
        assert_eq!(restored.store_id(), "local");
        assert_eq!(restored.fetch_entity(&e.id).unwrap(), store.fetch_entity(&e.id).unwrap());
        let next = restored.create_entity(terms("B", None)).unwrap();
        assert_eq!(next.id, id("Q2"));
    }
}
