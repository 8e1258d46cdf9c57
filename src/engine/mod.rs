//! Federated import engine.
//!
//! [`EntityImporter`] copies an entity from a source store into a target
//! store: it finds or creates the local counterpart, adds the claims the
//! local entity lacks, then adds missing qualifiers and references to the
//! matched local claims. Entities referenced by claim values are resolved
//! the same way and created as label/description/alias shells when absent.

pub mod write_path;

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::claim::Claim;
use crate::config::ImportConfig;
use crate::convert::{EntityResolver, ValueConverter};
use crate::entity::{Entity, EntityId, EntityKind, IdentityMatcher, NewEntity};
use crate::error::{ImportError, ImportResult, WriteTarget};
use crate::labels::{display_label, IdLabelTable};
use crate::reconcile::{ReconcileReport, Reconciler, Skipped};
use crate::storage::{KnowledgeStore, StoreError};

pub use write_path::{add_claim, Merged, WriteThrottle};

/// Stages of one entity import, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ImportStage {
    ResolveRemote,
    FindOrCreateLocal,
    ImportClaims,
    RefreshLocal,
    ImportQualifiersAndReferences,
    Done,
}

impl fmt::Display for ImportStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ResolveRemote => write!(f, "resolve-remote"),
            Self::FindOrCreateLocal => write!(f, "find-or-create-local"),
            Self::ImportClaims => write!(f, "import-claims"),
            Self::RefreshLocal => write!(f, "refresh-local"),
            Self::ImportQualifiersAndReferences => write!(f, "import-qualifiers-and-references"),
            Self::Done => write!(f, "done"),
        }
    }
}

/// A referenced entity whose claims could not be backfilled.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailedEntity {
    /// Id in the source store.
    pub remote: EntityId,
    /// Error that stopped the backfill.
    pub reason: String,
}

/// Everything one `import_entity` call did.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ImportReport {
    /// Local ids of entities created, root and referenced.
    pub entities_created: Vec<EntityId>,
    /// Entities bound to an existing local entity.
    pub entities_matched: usize,
    /// Referenced entities whose claims were imported.
    pub entities_backfilled: Vec<EntityId>,
    /// Claims written to the target.
    pub claims_added: usize,
    /// Claims the target already had.
    pub claims_existing: usize,
    /// Claims with nothing to import (media files, unknown or no value).
    pub claims_ignored: usize,
    /// Qualifier values written.
    pub qualifiers_added: usize,
    /// Qualifier values already present.
    pub qualifiers_existing: usize,
    /// Reference groups written.
    pub source_groups_added: usize,
    /// Source values some local group already cites.
    pub sources_existing: usize,
    /// Source values dropped by the reference exclusion list.
    pub sources_excluded: usize,
    /// Claims, qualifiers and sources that could not be imported.
    pub skipped: Vec<Skipped>,
    /// Referenced entities whose claims could not be imported.
    pub failed_entities: Vec<FailedEntity>,
}

impl ImportReport {
    /// Number of writes to the target store.
    #[must_use]
    pub fn writes(&self) -> usize {
        self.entities_created.len()
            + self.claims_added
            + self.qualifiers_added
            + self.source_groups_added
    }

    /// True when nothing was skipped.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.skipped.is_empty() && self.failed_entities.is_empty()
    }

    fn absorb(&mut self, other: ReconcileReport) {
        self.qualifiers_added += other.qualifiers_added;
        self.qualifiers_existing += other.qualifiers_existing;
        self.source_groups_added += other.source_groups_added;
        self.sources_existing += other.sources_existing;
        self.sources_excluded += other.sources_excluded;
        self.skipped.extend(other.skipped);
    }
}

/// Result of a successful import.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImportOutcome {
    /// Local id of the imported entity.
    pub id: EntityId,
    /// Its label in the language used to identify it.
    pub label: String,
    /// What the import wrote and skipped.
    pub report: ImportReport,
}

/// Imports entities from a source store into a target store.
pub struct EntityImporter {
    source: Arc<dyn KnowledgeStore>,
    target: Arc<dyn KnowledgeStore>,
    config: ImportConfig,
    matcher: IdentityMatcher,
    converter: ValueConverter,
    throttle: WriteThrottle,
}

impl fmt::Debug for EntityImporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityImporter")
            .field("source", &self.source.store_id())
            .field("target", &self.target.store_id())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl EntityImporter {
    /// Create a new importer between two stores.
    #[must_use]
    pub fn new(
        source: Arc<dyn KnowledgeStore>,
        target: Arc<dyn KnowledgeStore>,
        config: ImportConfig,
    ) -> Self {
        Self {
            matcher: IdentityMatcher::new(config.match_policy),
            converter: ValueConverter::new(config.coordinate_precision),
            throttle: WriteThrottle::from_millis(config.write_throttle_ms),
            source,
            target,
            config,
        }
    }

    /// Store entities are read from.
    #[must_use]
    pub fn source(&self) -> &Arc<dyn KnowledgeStore> {
        &self.source
    }

    /// Store entities are written to.
    #[must_use]
    pub fn target(&self) -> &Arc<dyn KnowledgeStore> {
        &self.target
    }

    /// Configuration in effect.
    #[must_use]
    pub const fn config(&self) -> &ImportConfig {
        &self.config
    }

    /// Imports the source entity `remote` with its claims, qualifiers and
    /// references.
    ///
    /// # Errors
    ///
    /// Fails when the root entity cannot be fetched, identified or created.
    /// Failures on single claims, qualifiers and references are recorded in
    /// the report instead.
    pub fn import_entity(&self, remote: &EntityId) -> ImportResult<ImportOutcome> {
        let mut session = ImportSession::new(self);
        let (local, label) = session.import_full(remote)?;

        while let Some((next, depth)) = session.worklist.pop_front() {
            if session.backfilled.contains(&next) {
                continue;
            }
            session.depth = depth;
            match session.import_full(&next) {
                Ok((backfilled, _)) => session.report.entities_backfilled.push(backfilled),
                Err(err) => {
                    warn!(remote = %next, error = %err, "backfill failed");
                    session.report.failed_entities.push(FailedEntity {
                        remote: next,
                        reason: err.to_string(),
                    });
                }
            }
        }

        debug!(stage = %ImportStage::Done, remote = %remote, local = %local, "import stage");
        Ok(ImportOutcome {
            id: local,
            label,
            report: session.report,
        })
    }

    /// Looks for the local counterpart of a source entity without writing.
    ///
    /// # Errors
    ///
    /// `MissingLabel` when the entity has no usable label, `AmbiguousMatch`
    /// under the reject policy, or store failures.
    pub fn find_local(&self, remote: &Entity) -> ImportResult<Option<EntityId>> {
        let (language, label, description) = self.identity_terms(remote)?;
        let candidates = self.target.search_entities(label, language)?;
        self.matcher.find_match(&candidates, label, description)
    }

    /// Language, label and description identifying `entity`.
    fn identity_terms<'e>(
        &self,
        entity: &'e Entity,
    ) -> ImportResult<(&'e str, &'e str, Option<&'e str>)> {
        let language = entity
            .canonical_language(&self.config.default_language, &self.config.denied_languages)
            .ok_or_else(|| ImportError::MissingLabel {
                id: entity.id.clone(),
            })?;
        let label = entity.label(language).unwrap_or_default();
        // A description equal to the label is never written, so it cannot
        // identify the local copy either.
        let description = entity.description(language).filter(|d| *d != label);
        Ok((language, label, description))
    }
}

struct ImportSession<'a> {
    importer: &'a EntityImporter,
    /// (source store, remote id) to local id, filled before claims are imported.
    visited: BTreeMap<(String, EntityId), EntityId>,
    /// Remote entities whose claims have been imported.
    backfilled: BTreeSet<EntityId>,
    worklist: VecDeque<(EntityId, usize)>,
    /// Hops from the root of the entity currently being imported.
    depth: usize,
    report: ImportReport,
}

impl<'a> ImportSession<'a> {
    fn new(importer: &'a EntityImporter) -> Self {
        Self {
            importer,
            visited: BTreeMap::new(),
            backfilled: BTreeSet::new(),
            worklist: VecDeque::new(),
            depth: 0,
            report: ImportReport::default(),
        }
    }

    fn stage(remote: &EntityId, stage: ImportStage) {
        debug!(stage = %stage, remote = %remote, "import stage");
    }

    fn visit_key(&self, remote: &EntityId) -> (String, EntityId) {
        (self.importer.source.store_id().to_string(), remote.clone())
    }

    fn fetch_remote(&self, remote: &EntityId) -> ImportResult<Entity> {
        self.importer
            .source
            .fetch_entity(remote)?
            .ok_or_else(|| ImportError::NotFound { id: remote.clone() })
    }

    fn fetch_local(&self, local: &EntityId) -> ImportResult<Entity> {
        self.importer
            .target
            .fetch_entity(local)?
            .ok_or_else(|| ImportError::NotFound { id: local.clone() })
    }

    /// Runs every stage for one remote entity. Returns the local id and label.
    fn import_full(&mut self, remote_id: &EntityId) -> ImportResult<(EntityId, String)> {
        Self::stage(remote_id, ImportStage::ResolveRemote);
        let remote = self.fetch_remote(remote_id)?;

        Self::stage(remote_id, ImportStage::FindOrCreateLocal);
        let local_id = self.bind(&remote)?;
        self.backfilled.insert(remote_id.clone());
        let mut local = self.fetch_local(&local_id)?;

        Self::stage(remote_id, ImportStage::ImportClaims);
        self.import_claims(&remote, &mut local);

        Self::stage(remote_id, ImportStage::RefreshLocal);
        let mut local = self.fetch_local(&local_id)?;

        Self::stage(remote_id, ImportStage::ImportQualifiersAndReferences);
        self.import_qualifiers_and_references(&remote, &mut local)?;

        let (_, label, _) = self.importer.identity_terms(&remote)?;
        Ok((local_id, label.to_string()))
    }

    /// Finds or creates the local counterpart of `remote` and records it.
    fn bind(&mut self, remote: &Entity) -> ImportResult<EntityId> {
        let key = self.visit_key(&remote.id);
        if let Some(local) = self.visited.get(&key) {
            return Ok(local.clone());
        }

        let local = match self.importer.find_local(remote)? {
            Some(existing) => {
                info!(remote = %remote.id, local = %existing, "matched existing entity");
                self.report.entities_matched += 1;
                existing
            }
            None => self.create_local(remote)?,
        };
        self.visited.insert(key, local.clone());
        Ok(local)
    }

    fn create_local(&mut self, remote: &Entity) -> ImportResult<EntityId> {
        let config = &self.importer.config;
        let mut data =
            NewEntity::from_entity(remote, &config.denied_languages, config.import_sitelinks);
        for language in data.remove_identical_label_description() {
            warn!(remote = %remote.id, language = %language, "description dropped: same as label");
        }

        match self.create(data.clone()) {
            Err(StoreError::UnrecognizedLanguage { languages }) => {
                warn!(
                    remote = %remote.id,
                    languages = ?languages,
                    "retrying without unrecognized languages"
                );
                data.strip_languages(&languages);
                match self.create(data) {
                    Err(StoreError::UnrecognizedLanguage { languages }) => {
                        Err(ImportError::UnrecognizedLanguage { languages })
                    }
                    other => self.created(remote, other),
                }
            }
            other => self.created(remote, other),
        }
    }

    fn create(&self, data: NewEntity) -> Result<Entity, StoreError> {
        self.importer.throttle.wait();
        self.importer.target.create_entity(data)
    }

    fn created(
        &mut self,
        remote: &Entity,
        result: Result<Entity, StoreError>,
    ) -> ImportResult<EntityId> {
        match result {
            Ok(entity) => {
                info!(remote = %remote.id, local = %entity.id, "entity created");
                self.report.entities_created.push(entity.id.clone());
                Ok(entity.id)
            }
            Err(StoreError::DuplicateLabelDescription {
                existing,
                label,
                description,
                ..
            }) => {
                let err = ImportError::DuplicateLabelDescription {
                    existing: existing.clone(),
                    label,
                    description,
                };
                warn!(
                    remote = %remote.id,
                    local = %existing,
                    error = %err,
                    "binding to existing entity"
                );
                self.report.entities_matched += 1;
                Ok(existing)
            }
            Err(err) => Err(err.into()),
        }
    }

    fn import_claims(&mut self, remote: &Entity, local: &mut Entity) {
        let importer = self.importer;
        for claim in remote.all_claims() {
            let converted = match importer.converter.convert(&claim.value, self) {
                Ok(Some(value)) => value,
                Ok(None) => {
                    debug!(
                        remote = %remote.id,
                        property = %claim.property,
                        value = %claim.value,
                        "claim ignored"
                    );
                    self.report.claims_ignored += 1;
                    continue;
                }
                Err(err) => {
                    let skipped = Skipped::new(
                        &local.id,
                        WriteTarget::Claim,
                        &claim.property,
                        &claim.value,
                        &err,
                    );
                    self.report.skipped.push(skipped);
                    continue;
                }
            };

            let target = importer.target.as_ref();
            match add_claim(target, &importer.throttle, local, &claim.property, &converted) {
                Ok(Merged::Added(_)) => self.report.claims_added += 1,
                Ok(Merged::Existing(_)) => self.report.claims_existing += 1,
                Err(err) => {
                    let skipped = Skipped::new(
                        &local.id,
                        WriteTarget::Claim,
                        &claim.property,
                        &converted,
                        &err,
                    );
                    self.report.skipped.push(skipped);
                }
            }
        }
    }

    fn import_qualifiers_and_references(
        &mut self,
        remote: &Entity,
        local: &mut Entity,
    ) -> ImportResult<()> {
        let importer = self.importer;
        let source = importer.source.as_ref();
        let target = importer.target.as_ref();
        let language = importer.config.default_language.as_str();

        let remote_table = IdLabelTable::build(remote, source, source, language)?;
        let local_table = IdLabelTable::build(local, target, source, language)?;
        let reconciler = Reconciler::new(
            target,
            &importer.throttle,
            importer.converter,
            &importer.config.excluded_reference_properties,
        );

        let local_id = local.id.clone();
        for remote_claim in remote.all_claims() {
            if remote_claim.value.is_commons_media()
                || (remote_claim.qualifiers.is_empty() && remote_claim.references.is_empty())
            {
                continue;
            }

            let wanted = display_label(&remote_claim.value, &remote_table);
            let local_claim = local.claims.get_mut(&remote_claim.property).and_then(|claims| {
                let index = self.locate_local_claim(remote_claim, claims, &wanted, &local_table)?;
                claims.get_mut(index)
            });
            let Some(local_claim) = local_claim else {
                let err = ImportError::LocalClaimNotFound {
                    entity: local_id.clone(),
                    property: remote_claim.property.clone(),
                    value: wanted.clone(),
                };
                let skipped = Skipped::new(
                    &local_id,
                    WriteTarget::Claim,
                    &remote_claim.property,
                    wanted,
                    &err,
                );
                self.report.skipped.push(skipped);
                continue;
            };

            match reconciler.reconcile(remote_claim, local_claim, self) {
                Ok(report) => self.report.absorb(report),
                Err(err) => {
                    let skipped = Skipped::new(
                        &local_id,
                        WriteTarget::Claim,
                        &remote_claim.property,
                        &remote_claim.value,
                        &err,
                    );
                    self.report.skipped.push(skipped);
                }
            }
        }
        Ok(())
    }

    /// Index of the local claim `remote` maps to.
    ///
    /// A claim whose value equals the remote value converted through the
    /// entities bound so far wins. Otherwise the display label decides, and
    /// an empty label only identifies a claim when it is the only candidate.
    fn locate_local_claim(
        &self,
        remote: &Claim,
        claims: &[Claim],
        wanted: &str,
        local_table: &IdLabelTable,
    ) -> Option<usize> {
        let mut lookup = BoundEntities {
            store_id: self.importer.source.store_id(),
            visited: &self.visited,
        };
        if let Ok(Some(converted)) = self.importer.converter.convert(&remote.value, &mut lookup) {
            if let Some(index) = claims.iter().position(|c| c.value.semantically_eq(&converted)) {
                return Some(index);
            }
        }

        let mut same_label = claims
            .iter()
            .enumerate()
            .filter(|(_, c)| display_label(&c.value, local_table) == wanted)
            .map(|(index, _)| index);
        let first = same_label.next()?;
        if wanted.is_empty() && same_label.next().is_some() {
            return None;
        }
        Some(first)
    }
}

/// Resolver over entities already bound in a session. Never imports.
struct BoundEntities<'s> {
    store_id: &'s str,
    visited: &'s BTreeMap<(String, EntityId), EntityId>,
}

impl EntityResolver for BoundEntities<'_> {
    fn resolve_entity(&mut self, remote: &EntityId) -> ImportResult<EntityId> {
        if remote.kind() == EntityKind::Property {
            return Ok(remote.clone());
        }
        self.visited
            .get(&(self.store_id.to_string(), remote.clone()))
            .cloned()
            .ok_or_else(|| ImportError::NotFound { id: remote.clone() })
    }
}

impl EntityResolver for ImportSession<'_> {
    fn resolve_entity(&mut self, remote: &EntityId) -> ImportResult<EntityId> {
        if remote.kind() == EntityKind::Property {
            return Ok(remote.clone());
        }
        if let Some(local) = self.visited.get(&self.visit_key(remote)) {
            return Ok(local.clone());
        }

        let entity = self.fetch_remote(remote)?;
        let local = self.bind(&entity)?;
        if self.depth < self.importer.config.transitive_depth && !self.backfilled.contains(remote) {
            self.worklist.push_back((remote.clone(), self.depth + 1));
        }
        Ok(local)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::claim::Claim;
    use crate::storage::InMemoryStore;
    use crate::value::Value;

    fn id(s: &str) -> EntityId {
        EntityId::parse(s).unwrap()
    }

    fn stores() -> (Arc<InMemoryStore>, Arc<InMemoryStore>) {
        (Arc::new(InMemoryStore::new("remote")), Arc::new(InMemoryStore::new("local")))
    }

    fn importer(
        source: &Arc<InMemoryStore>,
        target: &Arc<InMemoryStore>,
        config: ImportConfig,
    ) -> EntityImporter {
        EntityImporter::new(source.clone(), target.clone(), config)
    }

    #[test]
    fn stage_names() {
        assert_eq!(ImportStage::FindOrCreateLocal.to_string(), "find-or-create-local");
        assert_eq!(ImportStage::Done.to_string(), "done");
    }

    #[test]
    fn identity_prefers_default_language_and_skips_denied() {
        let (source, target) = stores();
        let importer = importer(&source, &target, ImportConfig::default());

        let e = Entity::new(id("Q1"))
            .with_label("de", "Tee")
            .with_label("en", "tea")
            .with_description("en", "drink");
        assert_eq!(importer.identity_terms(&e).unwrap(), ("en", "tea", Some("drink")));

        let e = Entity::new(id("Q1")).with_label("pwn", "x").with_label("zu", "itiye");
        assert_eq!(importer.identity_terms(&e).unwrap().0, "zu");

        let e = Entity::new(id("Q1")).with_label("fa", "x");
        assert!(matches!(importer.identity_terms(&e), Err(ImportError::MissingLabel { .. })));
    }

    #[test]
    fn description_equal_to_label_does_not_identify() {
        let (source, target) = stores();
        let importer = importer(&source, &target, ImportConfig::default());
        let e = Entity::new(id("Q1")).with_label("en", "Tea").with_description("en", "Tea");
        assert_eq!(importer.identity_terms(&e).unwrap().2, None);
    }

    #[test]
    fn import_creates_then_matches() {
        let (source, target) = stores();
        source
            .insert(
                Entity::new(id("Q42"))
                    .with_label("en", "Douglas Adams")
                    .with_description("en", "writer")
                    .with_claim(Claim::new(id("P1477"), Value::from("Douglas Noel Adams"))),
            )
            .unwrap();
        let importer = importer(&source, &target, ImportConfig::default());

        let first = importer.import_entity(&id("Q42")).unwrap();
        assert_eq!(first.label, "Douglas Adams");
        assert_eq!(first.report.entities_created, vec![first.id.clone()]);
        assert_eq!(first.report.claims_added, 1);

        let second = importer.import_entity(&id("Q42")).unwrap();
        assert_eq!(second.id, first.id);
        assert_eq!(second.report.writes(), 0);
        assert_eq!(second.report.entities_matched, 1);
        assert_eq!(second.report.claims_existing, 1);
    }

    #[test]
    fn missing_root_is_not_found() {
        let (source, target) = stores();
        let importer = importer(&source, &target, ImportConfig::default());
        let err = importer.import_entity(&id("Q404")).unwrap_err();
        assert!(matches!(err, ImportError::NotFound { .. }));
        assert!(err.is_fatal());
    }

    #[test]
    fn property_references_are_not_resolved() {
        let (source, target) = stores();
        let importer = importer(&source, &target, ImportConfig::default());
        let mut session = ImportSession::new(&importer);
        assert_eq!(session.resolve_entity(&id("P31")).unwrap(), id("P31"));
        assert!(session.visited.is_empty());
    }
}
