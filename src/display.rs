//! Labelled, serializable view of an entity.
//!
//! Ids are replaced by labels from an [`IdLabelTable`], and claims are split
//! into statements and identifiers (external-id claims) the way an entity
//! page shows them.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use serde::Serialize;

use crate::claim::{Claim, ClaimId};
use crate::entity::{Entity, EntityId};
use crate::labels::{display_label, IdLabelTable};
use crate::value::Value;

const COMMONS_FILE_URL: &str = "https://commons.wikimedia.org/wiki/File:";

/// A rendered value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValueView {
    /// Wikibase datatype name.
    pub datatype: &'static str,
    /// Human-readable value.
    pub label: String,
    /// Referenced entity, for entity values.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<EntityId>,
    /// Link target for URLs and media files.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl ValueView {
    fn new(value: &Value, table: &IdLabelTable) -> Self {
        let url = match value {
            Value::Url(url) => Some(url.clone()),
            Value::CommonsMedia(file) => {
                Some(format!("{COMMONS_FILE_URL}{}", file.replace(' ', "_")))
            }
            _ => None,
        };
        Self {
            datatype: value.type_name(),
            label: display_label(value, table),
            id: value.as_entity().cloned(),
            url,
        }
    }
}

/// One property/value pair of a qualifier or reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SnakView {
    /// Property id.
    pub property: EntityId,
    /// Property label.
    pub property_label: String,
    /// Rendered value.
    pub value: ValueView,
}

/// A rendered claim with its qualifiers and reference groups.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClaimView {
    /// Claim GUID.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<ClaimId>,
    /// Main value.
    pub value: ValueView,
    /// Qualifiers, flattened.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub qualifiers: Vec<SnakView>,
    /// One entry per reference group.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub references: Vec<Vec<SnakView>>,
}

/// All claims of one property.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PropertyView {
    /// Property id.
    pub property: EntityId,
    /// Property label.
    pub label: String,
    /// Claims in entity order.
    pub claims: Vec<ClaimView>,
}

/// An entity as a reader sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntityView {
    /// Entity id.
    pub id: EntityId,
    /// Language of every label in the view.
    pub language: String,
    /// Entity label, empty when missing.
    pub label: String,
    /// Entity description, empty when missing.
    pub description: String,
    /// Aliases in `language`.
    pub aliases: Vec<String>,
    /// Non-identifier properties.
    pub statements: Vec<PropertyView>,
    /// External-id properties.
    pub identifiers: Vec<PropertyView>,
    /// Site links by site id.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub sitelinks: BTreeMap<String, String>,
}

fn snaks<'a>(
    map: impl IntoIterator<Item = (&'a EntityId, &'a Vec<Value>)>,
    table: &IdLabelTable,
) -> Vec<SnakView> {
    map.into_iter()
        .flat_map(|(property, values)| {
            values.iter().map(move |value| SnakView {
                property: property.clone(),
                property_label: table.label(property).to_string(),
                value: ValueView::new(value, table),
            })
        })
        .collect()
}

fn claim_view(claim: &Claim, table: &IdLabelTable) -> ClaimView {
    ClaimView {
        id: claim.id.clone(),
        value: ValueView::new(&claim.value, table),
        qualifiers: snaks(&claim.qualifiers, table),
        references: claim.references.iter().map(|group| snaks(group.iter(), table)).collect(),
    }
}

/// Renders `entity` with labels from `table`, in the table's language.
#[must_use]
pub fn render(entity: &Entity, table: &IdLabelTable) -> EntityView {
    let language = table.language();
    let mut statements = Vec::new();
    let mut identifiers = Vec::new();

    for (property, claims) in &entity.claims {
        let Some(first) = claims.first() else {
            continue;
        };
        let view = PropertyView {
            property: property.clone(),
            label: table.label(property).to_string(),
            claims: claims.iter().map(|c| claim_view(c, table)).collect(),
        };
        if matches!(first.value, Value::ExternalId(_)) {
            identifiers.push(view);
        } else {
            statements.push(view);
        }
    }

    EntityView {
        id: entity.id.clone(),
        language: language.to_string(),
        label: entity.label(language).unwrap_or_default().to_string(),
        description: entity.description(language).unwrap_or_default().to_string(),
        aliases: entity.aliases.get(language).cloned().unwrap_or_default(),
        statements,
        identifiers,
        sitelinks: entity.sitelinks.clone(),
    }
}

impl EntityView {
    /// Plain-text rendering for terminals.
    #[must_use]
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "{} {}", self.id, self.label);
        if !self.description.is_empty() {
            let _ = writeln!(out, "  {}", self.description);
        }
        if !self.aliases.is_empty() {
            let _ = writeln!(out, "  also known as: {}", self.aliases.join(", "));
        }
        let sections = [("Statements", &self.statements), ("Identifiers", &self.identifiers)];
        for (title, section) in sections {
            if section.is_empty() {
                continue;
            }
            let _ = writeln!(out, "\n{title}");
            for property in section {
                for claim in &property.claims {
                    let _ = writeln!(
                        out,
                        "  {} ({}): {}",
                        property.label, property.property, claim.value.label
                    );
                    for q in &claim.qualifiers {
                        let _ = writeln!(out, "      {}: {}", q.property_label, q.value.label);
                    }
                    for (i, group) in claim.references.iter().enumerate() {
                        let _ = writeln!(out, "      reference {}:", i + 1);
                        for s in group {
                            let _ =
                                writeln!(out, "        {}: {}", s.property_label, s.value.label);
                        }
                    }
                }
            }
        }
        out
    }
}
