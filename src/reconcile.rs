//! Qualifier and reference merge onto a matched local claim.
//!
//! Runs after the claim pass, once the local claim a remote claim maps to is
//! known. Only missing elements are written; nothing is ever removed or
//! rewritten.

use std::collections::BTreeSet;

use serde::Serialize;
use tracing::{info, warn};

use crate::claim::{Claim, ClaimId};
use crate::convert::{EntityResolver, ValueConverter};
use crate::engine::write_path::{rejected, WriteThrottle};
use crate::entity::EntityId;
use crate::error::{ImportError, ImportResult, ValidationError, WriteTarget};
use crate::source::ReferenceGroup;
use crate::storage::KnowledgeStore;

/// An element that was not imported, with the reason.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Skipped {
    /// Local entity the element belongs to.
    pub entity: EntityId,
    /// Kind of element.
    pub target: WriteTarget,
    /// Property of the claim, qualifier or source value.
    pub property: EntityId,
    /// Display form of the value.
    pub value: String,
    /// Error that stopped the write.
    pub reason: String,
}

impl Skipped {
    pub(crate) fn new(
        entity: &EntityId,
        target: WriteTarget,
        property: &EntityId,
        value: impl ToString,
        err: &ImportError,
    ) -> Self {
        let skipped = Self {
            entity: entity.clone(),
            target,
            property: property.clone(),
            value: value.to_string(),
            reason: err.to_string(),
        };
        warn!(
            entity = %skipped.entity,
            property = %skipped.property,
            value = %skipped.value,
            target = %target,
            error = %skipped.reason,
            "skipped"
        );
        skipped
    }
}

/// What one reconcile pass did.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReconcileReport {
    /// Qualifier values written.
    pub qualifiers_added: usize,
    /// Qualifier values already on the local claim.
    pub qualifiers_existing: usize,
    /// Reference groups written.
    pub source_groups_added: usize,
    /// Source values already present in some local group.
    pub sources_existing: usize,
    /// Source values dropped because their property is excluded.
    pub sources_excluded: usize,
    /// Qualifiers and sources the store refused.
    pub skipped: Vec<Skipped>,
}

impl ReconcileReport {
    /// Number of writes performed.
    #[must_use]
    pub fn writes(&self) -> usize {
        self.qualifiers_added + self.source_groups_added
    }
}

/// Adds the qualifiers and references of a remote claim that its local
/// counterpart lacks.
pub struct Reconciler<'a> {
    store: &'a dyn KnowledgeStore,
    throttle: &'a WriteThrottle,
    converter: ValueConverter,
    excluded_reference_properties: &'a BTreeSet<EntityId>,
}

impl<'a> Reconciler<'a> {
    #[must_use]
    pub fn new(
        store: &'a dyn KnowledgeStore,
        throttle: &'a WriteThrottle,
        converter: ValueConverter,
        excluded_reference_properties: &'a BTreeSet<EntityId>,
    ) -> Self {
        Self {
            store,
            throttle,
            converter,
            excluded_reference_properties,
        }
    }

    /// Merges `remote`'s qualifiers and references into `local`.
    ///
    /// `local` must be the stored claim judged equal to `remote`. Every
    /// addition is independent: a failure is recorded in the report and the
    /// rest still goes ahead. `local` is updated in place with what was
    /// written.
    ///
    /// # Errors
    ///
    /// `Validation` when `local` has no store id to attach elements to.
    pub fn reconcile(
        &self,
        remote: &Claim,
        local: &mut Claim,
        resolver: &mut dyn EntityResolver,
    ) -> ImportResult<ReconcileReport> {
        let claim_id = local.id.clone().ok_or_else(|| ValidationError::MissingField {
            field: "claim id".to_string(),
        })?;
        let entity = claim_id.entity().ok_or_else(|| ValidationError::InvalidClaimId {
            id: claim_id.to_string(),
        })?;

        let mut report = ReconcileReport::default();
        self.merge_qualifiers(&entity, &claim_id, remote, local, resolver, &mut report);
        for group in &remote.references {
            self.merge_reference_group(&entity, &claim_id, group, local, resolver, &mut report);
        }
        Ok(report)
    }

    fn merge_qualifiers(
        &self,
        entity: &EntityId,
        claim_id: &ClaimId,
        remote: &Claim,
        local: &mut Claim,
        resolver: &mut dyn EntityResolver,
        report: &mut ReconcileReport,
    ) {
        for (property, values) in &remote.qualifiers {
            for value in values {
                let converted = match self.converter.convert(value, resolver) {
                    Ok(Some(v)) => v,
                    Ok(None) => continue,
                    Err(err) => {
                        let skipped =
                            Skipped::new(entity, WriteTarget::Qualifier, property, value, &err);
                        report.skipped.push(skipped);
                        continue;
                    }
                };

                if local.has_qualifier(property, &converted) {
                    report.qualifiers_existing += 1;
                    continue;
                }

                self.throttle.wait();
                match self
                    .store
                    .write_qualifier(claim_id, property, &converted)
                    .map_err(rejected(WriteTarget::Qualifier))
                {
                    Ok(()) => {
                        info!(
                            entity = %entity,
                            property = %property,
                            value = %converted,
                            "qualifier added"
                        );
                        local.qualifiers.entry(property.clone()).or_default().push(converted);
                        report.qualifiers_added += 1;
                    }
                    Err(err) => {
                        let skipped = Skipped::new(
                            entity,
                            WriteTarget::Qualifier,
                            property,
                            &converted,
                            &err,
                        );
                        report.skipped.push(skipped);
                    }
                }
            }
        }
    }

    fn merge_reference_group(
        &self,
        entity: &EntityId,
        claim_id: &ClaimId,
        remote_group: &ReferenceGroup,
        local: &mut Claim,
        resolver: &mut dyn EntityResolver,
        report: &mut ReconcileReport,
    ) {
        let mut new_group = ReferenceGroup::new();
        for (property, values) in remote_group.iter() {
            if self.excluded_reference_properties.contains(property) {
                report.sources_excluded += values.len();
                continue;
            }
            for value in values {
                let converted = match self.converter.convert(value, resolver) {
                    Ok(Some(v)) => v,
                    Ok(None) => continue,
                    Err(err) => {
                        let skipped =
                            Skipped::new(entity, WriteTarget::Source, property, value, &err);
                        report.skipped.push(skipped);
                        continue;
                    }
                };
                if local.has_source(property, &converted)
                    || new_group.contains(property, &converted)
                {
                    report.sources_existing += 1;
                } else {
                    new_group.push(property.clone(), converted);
                }
            }
        }

        if new_group.is_empty() {
            return;
        }

        self.throttle.wait();
        match self
            .store
            .write_sources(claim_id, &new_group)
            .map_err(rejected(WriteTarget::Source))
        {
            Ok(()) => {
                info!(
                    entity = %entity,
                    claim = %claim_id,
                    sources = new_group.len(),
                    "reference added"
                );
                local.references.push(new_group);
                report.source_groups_added += 1;
            }
            Err(err) => {
                for (property, values) in new_group.iter() {
                    for value in values {
                        let skipped =
                            Skipped::new(entity, WriteTarget::Source, property, value, &err);
                        report.skipped.push(skipped);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::entity::NewEntity;
    use crate::storage::InMemoryStore;
    use crate::value::Value;

    fn id(s: &str) -> EntityId {
        EntityId::parse(s).unwrap()
    }

    struct MapResolver(BTreeMap<EntityId, EntityId>);

    impl EntityResolver for MapResolver {
        fn resolve_entity(&mut self, remote: &EntityId) -> ImportResult<EntityId> {
            self.0
                .get(remote)
                .cloned()
                .ok_or_else(|| ImportError::NotFound { id: remote.clone() })
        }
    }

    fn resolver() -> MapResolver {
        MapResolver([(id("Q36578"), id("Q9"))].into_iter().collect())
    }

    fn excluded() -> BTreeSet<EntityId> {
        [id("P4656"), id("P854")].into_iter().collect()
    }

    fn local_claim(store: &InMemoryStore) -> Claim {
        let mut data = NewEntity::default();
        data.labels.insert("en".into(), "A".into());
        let entity = store.create_entity(data).unwrap();
        store.write_claim(&entity.id, &id("P39"), &Value::from("x")).unwrap()
    }

    #[test]
    fn adds_missing_qualifiers_once() {
        let store = InMemoryStore::new("local");
        let throttle = WriteThrottle::default();
        let excluded = excluded();
        let reconciler = Reconciler::new(&store, &throttle, ValueConverter::default(), &excluded);

        let remote = Claim::new(id("P39"), Value::from("x"))
            .with_qualifier(id("P580"), Value::from("2009"))
            .with_qualifier(id("P580"), Value::from("2009"))
            .with_qualifier(id("P582"), Value::CommonsMedia("a.jpg".into()));
        let mut local = local_claim(&store);

        let report = reconciler.reconcile(&remote, &mut local, &mut resolver()).unwrap();
        assert_eq!(report.qualifiers_added, 1);
        assert_eq!(report.qualifiers_existing, 1);

        let again = reconciler.reconcile(&remote, &mut local, &mut resolver()).unwrap();
        assert_eq!(again.writes(), 0);
        assert_eq!(store.stats().qualifiers_written, 1);
    }

    #[test]
    fn new_sources_form_one_group_and_exclusions_are_dropped() {
        let store = InMemoryStore::new("local");
        let throttle = WriteThrottle::default();
        let excluded = excluded();
        let reconciler = Reconciler::new(&store, &throttle, ValueConverter::default(), &excluded);

        let remote = Claim::new(id("P39"), Value::from("x")).with_reference(
            ReferenceGroup::new()
                .with(id("P248"), Value::from(id("Q36578")))
                .with(id("P854"), Value::Url("http://example.org".into()))
                .with(id("P4656"), Value::Url("http://wiki.example".into()))
                .with(id("P813"), Value::from("2020-01-01")),
        );
        let mut local = local_claim(&store);

        let report = reconciler.reconcile(&remote, &mut local, &mut resolver()).unwrap();
        assert_eq!(report.source_groups_added, 1);
        assert_eq!(report.sources_excluded, 2);
        assert_eq!(local.references.len(), 1);
        assert_eq!(local.references[0].len(), 2);
        assert!(local.has_source(&id("P248"), &Value::from(id("Q9"))));
        assert!(!local.has_source(&id("P854"), &Value::Url("http://example.org".into())));

        let again = reconciler.reconcile(&remote, &mut local, &mut resolver()).unwrap();
        assert_eq!(again.source_groups_added, 0);
        assert_eq!(again.sources_existing, 2);
    }

    #[test]
    fn sources_are_checked_against_every_local_group() {
        let store = InMemoryStore::new("local");
        let throttle = WriteThrottle::default();
        let excluded = excluded();
        let reconciler = Reconciler::new(&store, &throttle, ValueConverter::default(), &excluded);
        let mut local = local_claim(&store);
        let cid = local.id.clone().unwrap();
        let existing = ReferenceGroup::new().with(id("P248"), Value::from(id("Q9")));
        store.write_sources(&cid, &existing).unwrap();
        local.references.push(existing);

        let remote = Claim::new(id("P39"), Value::from("x")).with_reference(
            ReferenceGroup::new()
                .with(id("P248"), Value::from(id("Q36578")))
                .with(id("P1545"), Value::from("3")),
        );
        let report = reconciler.reconcile(&remote, &mut local, &mut resolver()).unwrap();
        assert_eq!(report.sources_existing, 1);
        assert_eq!(report.source_groups_added, 1);
        assert_eq!(local.references[1].len(), 1);
        assert_eq!(local.references[1].values(&id("P1545")), &[Value::from("3")]);
    }

    #[test]
    fn failures_are_isolated() {
        let store = InMemoryStore::new("local");
        store.reject_writes_for(id("P580")).unwrap();
        let throttle = WriteThrottle::default();
        let excluded = excluded();
        let reconciler = Reconciler::new(&store, &throttle, ValueConverter::default(), &excluded);

        let remote = Claim::new(id("P39"), Value::from("x"))
            .with_qualifier(id("P580"), Value::from("2009"))
            .with_qualifier(id("P642"), Value::from(id("Q404")))
            .with_qualifier(id("P1545"), Value::from("1"))
            .with_reference(ReferenceGroup::new().with(id("P248"), Value::from(id("Q36578"))));
        let mut local = local_claim(&store);

        let report = reconciler.reconcile(&remote, &mut local, &mut resolver()).unwrap();
        assert_eq!(report.qualifiers_added, 1);
        assert_eq!(report.source_groups_added, 1);
        assert_eq!(report.skipped.len(), 2);
        assert!(report
            .skipped
            .iter()
            .all(|s| s.target == WriteTarget::Qualifier));
    }

    #[test]
    fn claim_without_id_is_skipped() {
        let store = InMemoryStore::new("local");
        let throttle = WriteThrottle::default();
        let excluded = excluded();
        let reconciler = Reconciler::new(&store, &throttle, ValueConverter::default(), &excluded);
        let remote =
            Claim::new(id("P39"), Value::from("x")).with_qualifier(id("P580"), Value::from("1"));
        let mut local = Claim::new(id("P39"), Value::from("x"));
        let err = reconciler.reconcile(&remote, &mut local, &mut resolver()).unwrap_err();
        assert!(matches!(err, ImportError::Validation(_)));
        assert_eq!(store.stats().writes(), 0);
    }
}
