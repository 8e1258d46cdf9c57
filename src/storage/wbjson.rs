//! Reader for Wikibase entity JSON.
//!
//! Accepts the shapes `Special:EntityData`, `wbgetentities` and the JSON
//! dumps produce: an `{"entities": {...}}` envelope, an array of entities
//! (one dump file), or a single entity object. Snaks become typed
//! [`Value`]s according to their datatype.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::Deserialize;
use serde_json::Value as Json;
use tracing::debug;

use crate::claim::{Claim, ClaimId};
use crate::entity::{Entity, EntityId};
use crate::source::ReferenceGroup;
use crate::storage::traits::StoreError;
use crate::time::{WbTime, PRECISION_DAY};
use crate::value::{GlobeCoordinate, MonolingualText, Quantity, Value};

#[derive(Debug, Deserialize)]
struct RawTerm {
    value: String,
}

#[derive(Debug, Deserialize)]
struct RawSitelink {
    title: String,
}

#[derive(Debug, Deserialize)]
struct RawDataValue {
    #[serde(rename = "type")]
    kind: String,
    value: Json,
}

#[derive(Debug, Deserialize)]
struct RawSnak {
    snaktype: String,
    property: String,
    #[serde(default)]
    datatype: Option<String>,
    #[serde(default)]
    datavalue: Option<RawDataValue>,
}

#[derive(Debug, Deserialize)]
struct RawReference {
    #[serde(default)]
    snaks: BTreeMap<String, Vec<RawSnak>>,
}

#[derive(Debug, Deserialize)]
struct RawStatement {
    #[serde(default)]
    id: Option<String>,
    mainsnak: RawSnak,
    #[serde(default)]
    qualifiers: BTreeMap<String, Vec<RawSnak>>,
    #[serde(default)]
    references: Vec<RawReference>,
}

#[derive(Debug, Deserialize)]
struct RawEntity {
    id: String,
    #[serde(default)]
    labels: BTreeMap<String, RawTerm>,
    #[serde(default)]
    lemmas: BTreeMap<String, RawTerm>,
    #[serde(default)]
    descriptions: BTreeMap<String, RawTerm>,
    #[serde(default)]
    aliases: BTreeMap<String, Vec<RawTerm>>,
    #[serde(default, alias = "statements")]
    claims: BTreeMap<String, Vec<RawStatement>>,
    #[serde(default)]
    sitelinks: BTreeMap<String, RawSitelink>,
}

fn bad(msg: impl Into<String>) -> StoreError {
    StoreError::SerializationError(msg.into())
}

fn parse_id(raw: &str) -> Result<EntityId, StoreError> {
    EntityId::parse(raw).map_err(|e| bad(e.to_string()))
}

fn string_of(v: &Json) -> Option<String> {
    v.as_str().map(str::to_string)
}

fn unknown(datatype: &str, raw: &Json) -> Value {
    Value::Unknown {
        datatype: datatype.to_string(),
        raw: raw.clone(),
    }
}

fn entity_ref(raw: &Json) -> Option<EntityId> {
    if let Some(id) = raw.get("id").and_then(Json::as_str) {
        return EntityId::parse(id).ok();
    }
    let number = raw.get("numeric-id").and_then(Json::as_u64)?;
    let prefix = match raw.get("entity-type").and_then(Json::as_str)? {
        "item" => 'Q',
        "property" => 'P',
        "lexeme" => 'L',
        _ => return None,
    };
    EntityId::parse(format!("{prefix}{number}")).ok()
}

fn quantity(raw: &Json) -> Option<Quantity> {
    let amount = raw.get("amount").and_then(Json::as_str)?;
    let mut q = Quantity::new(amount);
    q.lower_bound = raw.get("lowerBound").and_then(string_of);
    q.upper_bound = raw.get("upperBound").and_then(string_of);
    q.unit = match raw.get("unit").and_then(Json::as_str) {
        None | Some("1") => None,
        Some(uri) => Some(EntityId::from_concept_uri(uri).ok()?),
    };
    Some(q)
}

fn datavalue_to_value(datatype: &str, dv: &RawDataValue) -> Value {
    let raw = &dv.value;
    let converted = match (datatype, dv.kind.as_str()) {
        ("string", _) => string_of(raw).map(Value::String),
        ("external-id", _) => string_of(raw).map(Value::ExternalId),
        ("url", _) => string_of(raw).map(Value::Url),
        ("commonsMedia", _) => string_of(raw).map(Value::CommonsMedia),
        ("geo-shape", _) => string_of(raw).map(Value::GeoShape),
        ("tabular-data", _) => string_of(raw).map(Value::TabularData),
        (_, "monolingualtext") => Some(Value::MonolingualText(MonolingualText {
            language: raw.get("language").and_then(string_of).unwrap_or_default(),
            text: raw.get("text").and_then(string_of).unwrap_or_default(),
        })),
        (_, "time") => raw.get("time").and_then(Json::as_str).map(|time| {
            let precision = raw
                .get("precision")
                .and_then(Json::as_u64)
                .and_then(|p| u8::try_from(p).ok())
                .unwrap_or(PRECISION_DAY);
            Value::Time(WbTime::new(time, precision))
        }),
        (_, "quantity") => quantity(raw).map(Value::Quantity),
        (_, "globecoordinate") => {
            let lat = raw.get("latitude").and_then(Json::as_f64);
            let lon = raw.get("longitude").and_then(Json::as_f64);
            let precision = raw.get("precision").and_then(Json::as_f64).unwrap_or(0.0);
            lat.zip(lon)
                .map(|(lat, lon)| Value::GlobeCoordinate(GlobeCoordinate::new(lat, lon, precision)))
        }
        ("wikibase-item" | "wikibase-property" | "wikibase-lexeme", _)
        | (_, "wikibase-entityid") => entity_ref(raw).map(Value::from),
        // Snaks in older dumps carry no datatype.
        ("", "string") => string_of(raw).map(Value::String),
        _ => None,
    };
    converted.unwrap_or_else(|| unknown(if datatype.is_empty() { &dv.kind } else { datatype }, raw))
}

fn snak_to_value(snak: &RawSnak) -> Value {
    match snak.snaktype.as_str() {
        "somevalue" => Value::SomeValue,
        "novalue" => Value::NoValue,
        _ => match &snak.datavalue {
            Some(dv) => datavalue_to_value(snak.datatype.as_deref().unwrap_or(""), dv),
            None => Value::SomeValue,
        },
    }
}

fn snak_map(
    raw: &BTreeMap<String, Vec<RawSnak>>,
) -> Result<BTreeMap<EntityId, Vec<Value>>, StoreError> {
    raw.iter()
        .map(|(property, snaks)| {
            Ok((parse_id(property)?, snaks.iter().map(snak_to_value).collect()))
        })
        .collect()
}

fn statement_to_claim(raw: &RawStatement) -> Result<Claim, StoreError> {
    let property = parse_id(&raw.mainsnak.property)?;
    let mut claim = Claim::new(property, snak_to_value(&raw.mainsnak));
    claim.id = raw.id.as_deref().and_then(|id| ClaimId::parse(id).ok());
    claim.qualifiers = snak_map(&raw.qualifiers)?;
    for reference in &raw.references {
        let mut group = ReferenceGroup::new();
        for (property, values) in snak_map(&reference.snaks)? {
            for value in values {
                group.push(property.clone(), value);
            }
        }
        if !group.is_empty() {
            claim.references.push(group);
        }
    }
    Ok(claim)
}

fn terms(raw: &BTreeMap<String, RawTerm>) -> BTreeMap<String, String> {
    raw.iter().map(|(lang, t)| (lang.clone(), t.value.clone())).collect()
}

fn raw_to_entity(raw: RawEntity) -> Result<Entity, StoreError> {
    let mut entity = Entity::new(parse_id(&raw.id)?);
    entity.labels = terms(&raw.labels);
    for (lang, lemma) in &raw.lemmas {
        entity.labels.entry(lang.clone()).or_insert_with(|| lemma.value.clone());
    }
    entity.descriptions = terms(&raw.descriptions);
    entity.aliases = raw
        .aliases
        .iter()
        .map(|(lang, list)| (lang.clone(), list.iter().map(|t| t.value.clone()).collect()))
        .collect();
    entity.sitelinks = raw
        .sitelinks
        .into_iter()
        .map(|(site, link)| (site, link.title))
        .collect();
    for statements in raw.claims.values() {
        for statement in statements {
            entity.push_claim(statement_to_claim(statement)?);
        }
    }
    Ok(entity)
}

/// Parses one entity object.
///
/// # Errors
///
/// Returns `SerializationError` when the object is not a Wikibase entity.
pub fn entity_from_json(json: Json) -> Result<Entity, StoreError> {
    let raw: RawEntity = serde_json::from_value(json).map_err(|e| bad(e.to_string()))?;
    raw_to_entity(raw)
}

/// Parses every entity in a Wikibase JSON document.
///
/// # Errors
///
/// Returns `SerializationError` on malformed JSON or entities.
pub fn parse_entities(text: &str) -> Result<Vec<Entity>, StoreError> {
    let doc: Json = serde_json::from_str(text).map_err(|e| bad(e.to_string()))?;
    let objects: Vec<Json> = match doc {
        Json::Object(mut map) if map.contains_key("entities") => match map.remove("entities") {
            Some(Json::Object(entities)) => entities.into_iter().map(|(_, v)| v).collect(),
            Some(Json::Array(entities)) => entities,
            _ => return Err(bad("'entities' must be an object or array")),
        },
        Json::Array(entities) => entities,
        single @ Json::Object(_) => vec![single],
        _ => return Err(bad("expected an entity object or array")),
    };

    let entities = objects
        .into_iter()
        // wbgetentities marks unknown ids as {"id": .., "missing": ""}
        .filter(|obj| obj.get("missing").is_none())
        .map(entity_from_json)
        .collect::<Result<Vec<_>, _>>()?;
    debug!(count = entities.len(), "parsed wikibase entities");
    Ok(entities)
}

/// Reads a Wikibase JSON file from disk.
///
/// # Errors
///
/// Returns `BackendError` when the file cannot be read and
/// `SerializationError` when it cannot be parsed.
pub fn read_entities(path: impl AsRef<Path>) -> Result<Vec<Entity>, StoreError> {
    let path = path.as_ref();
    let text = fs::read_to_string(path)
        .map_err(|e| StoreError::BackendError(format!("{}: {e}", path.display())))?;
    parse_entities(&text)
}
