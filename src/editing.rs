//! Manual edits on a store, outside any import.
//!
//! Removal and term edits only happen here. Each helper re-reads the entity
//! first so it works on current state, and additions are idempotent like the
//! importer's.

use chrono::NaiveDate;
use tracing::info;

use crate::claim::{Claim, ClaimId};
use crate::engine::write_path::{rejected, Merged};
use crate::entity::{Entity, EntityId};
use crate::error::{ImportError, ImportResult, ValidationError, WriteTarget};
use crate::source::{ReferenceGroup, RETRIEVED_PROPERTY};
use crate::storage::{KnowledgeStore, StoreError};
use crate::time::WbTime;
use crate::value::Value;

fn fetch_claim(store: &dyn KnowledgeStore, claim: &ClaimId) -> ImportResult<Claim> {
    let entity = claim.entity().ok_or_else(|| ValidationError::InvalidClaimId {
        id: claim.to_string(),
    })?;
    store
        .fetch_entity(&entity)?
        .and_then(|e| e.claim(claim).cloned())
        .ok_or_else(|| ImportError::NotFound { id: entity })
}

fn claim_ids(
    store: &dyn KnowledgeStore,
    entity: &EntityId,
    property: &EntityId,
) -> ImportResult<Vec<ClaimId>> {
    let entity = fetch_entity(store, entity)?;
    Ok(entity.claims_for(property).iter().filter_map(|c| c.id.clone()).collect())
}

fn fetch_entity(store: &dyn KnowledgeStore, entity: &EntityId) -> ImportResult<Entity> {
    store
        .fetch_entity(entity)?
        .ok_or_else(|| ImportError::NotFound { id: entity.clone() })
}

fn term_error(err: StoreError) -> ImportError {
    match err {
        StoreError::EntityNotFound(id) => ImportError::NotFound { id },
        StoreError::UnrecognizedLanguage { languages } => {
            ImportError::UnrecognizedLanguage { languages }
        }
        StoreError::DuplicateLabelDescription {
            existing,
            label,
            description,
            ..
        } => ImportError::DuplicateLabelDescription {
            existing,
            label,
            description,
        },
        other => other.into(),
    }
}

/// Sets the label of `entity` in `language`. An empty label removes it.
///
/// # Errors
///
/// `NotFound`, `UnrecognizedLanguage`, `DuplicateLabelDescription` when
/// another entity has the resulting label and description, or a store failure.
pub fn set_label(
    store: &dyn KnowledgeStore,
    entity: &EntityId,
    language: &str,
    label: &str,
) -> ImportResult<Merged<()>> {
    let label = label.trim();
    if fetch_entity(store, entity)?.label(language).unwrap_or_default() == label {
        return Ok(Merged::Existing(()));
    }
    store.set_label(entity, language, label).map_err(term_error)?;
    info!(entity = %entity, language, label, "label set");
    Ok(Merged::Added(()))
}

/// Sets the description of `entity` in `language`. Empty removes it.
///
/// # Errors
///
/// As [`set_label`].
pub fn set_description(
    store: &dyn KnowledgeStore,
    entity: &EntityId,
    language: &str,
    description: &str,
) -> ImportResult<Merged<()>> {
    let description = description.trim();
    if fetch_entity(store, entity)?.description(language).unwrap_or_default() == description {
        return Ok(Merged::Existing(()));
    }
    store
        .set_description(entity, language, description)
        .map_err(term_error)?;
    info!(entity = %entity, language, description, "description set");
    Ok(Merged::Added(()))
}

/// Replaces the aliases of `entity` in `language`.
///
/// # Errors
///
/// `NotFound`, `UnrecognizedLanguage` or a store failure.
pub fn set_aliases(
    store: &dyn KnowledgeStore,
    entity: &EntityId,
    language: &str,
    aliases: &[String],
) -> ImportResult<()> {
    store.set_aliases(entity, language, aliases).map_err(term_error)?;
    info!(entity = %entity, language, aliases = ?aliases, "aliases set");
    Ok(())
}

/// Links `entity` to `title` on `site`.
///
/// # Errors
///
/// `NotFound`, or `Store` when the site or title is empty.
pub fn set_sitelink(
    store: &dyn KnowledgeStore,
    entity: &EntityId,
    site: &str,
    title: &str,
) -> ImportResult<Merged<()>> {
    if fetch_entity(store, entity)?.sitelinks.get(site).map(String::as_str) == Some(title) {
        return Ok(Merged::Existing(()));
    }
    store.set_sitelink(entity, site, title).map_err(term_error)?;
    info!(entity = %entity, site, title, "sitelink set");
    Ok(Merged::Added(()))
}

/// Removes the link on `site`. Returns whether one existed.
///
/// # Errors
///
/// `NotFound` for an unknown entity, or a store failure.
pub fn remove_sitelink(
    store: &dyn KnowledgeStore,
    entity: &EntityId,
    site: &str,
) -> ImportResult<bool> {
    let removed = store.remove_sitelink(entity, site).map_err(term_error)?;
    if removed {
        info!(entity = %entity, site, "sitelink removed");
    }
    Ok(removed)
}

/// Removes every claim of `property` from `entity`. Returns how many.
///
/// # Errors
///
/// `NotFound` for an unknown entity, or the first store failure.
pub fn remove_claims(
    store: &dyn KnowledgeStore,
    entity: &EntityId,
    property: &EntityId,
) -> ImportResult<usize> {
    let ids = claim_ids(store, entity, property)?;
    for id in &ids {
        store.remove_claim(id)?;
        info!(entity = %entity, property = %property, claim = %id, "claim removed");
    }
    Ok(ids.len())
}

/// Removes qualifiers of `qualifier` from every claim of `property`.
///
/// # Errors
///
/// `NotFound` for an unknown entity, or the first store failure.
pub fn remove_qualifier(
    store: &dyn KnowledgeStore,
    entity: &EntityId,
    property: &EntityId,
    qualifier: &EntityId,
) -> ImportResult<usize> {
    let mut removed = 0;
    for id in claim_ids(store, entity, property)? {
        let n = store.remove_qualifiers(&id, qualifier)?;
        if n > 0 {
            info!(
                entity = %entity,
                claim = %id,
                qualifier = %qualifier,
                count = n,
                "qualifiers removed"
            );
        }
        removed += n;
    }
    Ok(removed)
}

/// Removes source values of `source` from every claim of `property`.
///
/// # Errors
///
/// `NotFound` for an unknown entity, or the first store failure.
pub fn remove_reference(
    store: &dyn KnowledgeStore,
    entity: &EntityId,
    property: &EntityId,
    source: &EntityId,
) -> ImportResult<usize> {
    let mut removed = 0;
    for id in claim_ids(store, entity, property)? {
        let n = store.remove_sources(&id, source)?;
        if n > 0 {
            info!(entity = %entity, claim = %id, source = %source, count = n, "sources removed");
        }
        removed += n;
    }
    Ok(removed)
}

/// Adds a qualifier unless the claim already has it.
///
/// # Errors
///
/// `NotFound` for an unknown claim, `WriteRejected` when the store refuses.
pub fn add_qualifier(
    store: &dyn KnowledgeStore,
    claim: &ClaimId,
    property: &EntityId,
    value: &Value,
) -> ImportResult<Merged<()>> {
    if fetch_claim(store, claim)?.has_qualifier(property, value) {
        return Ok(Merged::Existing(()));
    }
    store
        .write_qualifier(claim, property, value)
        .map_err(rejected(WriteTarget::Qualifier))?;
    info!(claim = %claim, property = %property, value = %value, "qualifier added");
    Ok(Merged::Added(()))
}

/// Adds a one-value reference unless some group already cites it.
///
/// # Errors
///
/// `NotFound` for an unknown claim, `WriteRejected` when the store refuses.
pub fn add_reference(
    store: &dyn KnowledgeStore,
    claim: &ClaimId,
    property: &EntityId,
    value: &Value,
) -> ImportResult<Merged<()>> {
    if fetch_claim(store, claim)?.has_source(property, value) {
        return Ok(Merged::Existing(()));
    }
    let group = ReferenceGroup::new().with(property.clone(), value.clone());
    store
        .write_sources(claim, &group)
        .map_err(rejected(WriteTarget::Source))?;
    info!(claim = %claim, property = %property, value = %value, "reference added");
    Ok(Merged::Added(()))
}

/// Adds a "retrieved" date reference, today when `date` is `None`.
///
/// # Errors
///
/// As [`add_reference`].
pub fn add_reference_date(
    store: &dyn KnowledgeStore,
    claim: &ClaimId,
    date: Option<NaiveDate>,
) -> ImportResult<Merged<()>> {
    let retrieved = EntityId::parse(RETRIEVED_PROPERTY)?;
    let time = date.map_or_else(WbTime::today, WbTime::from_date);
    add_reference(store, claim, &retrieved, &Value::Time(time))
}
