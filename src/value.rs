//! Typed claim values.
//!
//! `Value` is a closed tagged union over every Wikibase datatype the crate
//! understands. Conversion between stores matches on it exhaustively, so a
//! new kind shows up as a compile error in the converter rather than as a
//! silent passthrough.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::entity::{EntityId, EntityKind};
use crate::time::WbTime;

/// Tolerance used when comparing coordinates.
const COORDINATE_EPSILON: f64 = 1e-9;

/// Text in a specific language.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MonolingualText {
    /// Language code.
    pub language: String,
    /// The text.
    pub text: String,
}

/// An amount with optional bounds and unit.
///
/// Amounts are kept as Wikibase decimal strings (`"+12.5"`) so no precision
/// is lost in transit. `unit == None` is the dimensionless unit `"1"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quantity {
    /// Signed decimal amount.
    pub amount: String,
    /// Lower uncertainty bound.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lower_bound: Option<String>,
    /// Upper uncertainty bound.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upper_bound: Option<String>,
    /// Unit item, in the store holding the claim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<EntityId>,
}

impl Quantity {
    /// A dimensionless amount without bounds.
    #[must_use]
    pub fn new(amount: impl Into<String>) -> Self {
        Self {
            amount: amount.into(),
            lower_bound: None,
            upper_bound: None,
            unit: None,
        }
    }

    /// Sets the unit entity.
    #[must_use]
    pub fn with_unit(mut self, unit: EntityId) -> Self {
        self.unit = Some(unit);
        self
    }

    /// Sets both bounds.
    #[must_use]
    pub fn with_bounds(mut self, lower: impl Into<String>, upper: impl Into<String>) -> Self {
        self.lower_bound = Some(lower.into());
        self.upper_bound = Some(upper.into());
        self
    }

    /// True for the dimensionless unit.
    #[must_use]
    pub const fn is_dimensionless(&self) -> bool {
        self.unit.is_none()
    }

    /// Amount without the leading `+`, as shown to users.
    #[must_use]
    pub fn display_amount(&self) -> &str {
        self.amount.strip_prefix('+').unwrap_or(&self.amount)
    }

    fn same_amounts(&self, other: &Self) -> bool {
        decimal_eq(&self.amount, &other.amount)
            && optional_decimal_eq(self.lower_bound.as_deref(), other.lower_bound.as_deref())
            && optional_decimal_eq(self.upper_bound.as_deref(), other.upper_bound.as_deref())
    }
}

fn decimal_eq(a: &str, b: &str) -> bool {
    let parse = |s: &str| s.trim().trim_start_matches('+').parse::<f64>().ok();
    match (parse(a), parse(b)) {
        (Some(x), Some(y)) => x == y,
        _ => a.trim() == b.trim(),
    }
}

fn optional_decimal_eq(a: Option<&str>, b: Option<&str>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => decimal_eq(a, b),
        (None, None) => true,
        _ => false,
    }
}

/// A point on a globe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobeCoordinate {
    /// Degrees north.
    pub latitude: f64,
    /// Degrees east.
    pub longitude: f64,
    /// Precision in degrees.
    pub precision: f64,
}

impl GlobeCoordinate {
    /// Creates a coordinate.
    #[must_use]
    pub const fn new(latitude: f64, longitude: f64, precision: f64) -> Self {
        Self {
            latitude,
            longitude,
            precision,
        }
    }

    fn same_point(&self, other: &Self) -> bool {
        (self.latitude - other.latitude).abs() < COORDINATE_EPSILON
            && (self.longitude - other.longitude).abs() < COORDINATE_EPSILON
    }
}

/// A claim, qualifier or source value.
///
/// # Examples
///
/// ```
/// use wikifed::{EntityId, Value};
///
/// let name = Value::from("Douglas Adams");
/// assert_eq!(name.type_name(), "string");
///
/// let human = Value::from(EntityId::parse("Q5").unwrap());
/// assert_eq!(human.type_name(), "wikibase-item");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "kebab-case")]
pub enum Value {
    /// Plain string.
    String(String),
    /// Identifier in an external database.
    ExternalId(String),
    /// URL.
    Url(String),
    /// Text in one language.
    MonolingualText(MonolingualText),
    /// Point in time.
    Time(WbTime),
    /// Amount with optional unit.
    Quantity(Quantity),
    /// Point on a globe.
    GlobeCoordinate(GlobeCoordinate),
    /// File on Wikimedia Commons.
    CommonsMedia(String),
    /// Item or lexeme in the same store as the claim.
    EntityReference(EntityId),
    /// Property; properties are shared between stores.
    PropertyReference(EntityId),
    /// Map data page on Commons.
    GeoShape(String),
    /// Tabular data page on Commons.
    TabularData(String),
    /// "Unknown value" snak.
    SomeValue,
    /// "No value" snak.
    NoValue,
    /// Datatype this crate does not model.
    Unknown {
        /// Wikibase datatype name.
        datatype: String,
        /// The datavalue as read.
        raw: serde_json::Value,
    },
}

impl Value {
    /// True for a Commons file.
    #[must_use]
    pub const fn is_commons_media(&self) -> bool {
        matches!(self, Self::CommonsMedia(_))
    }

    /// The referenced item, lexeme or property.
    #[must_use]
    pub const fn as_entity(&self) -> Option<&EntityId> {
        match self {
            Self::EntityReference(id) | Self::PropertyReference(id) => Some(id),
            _ => None,
        }
    }

    /// The quantity, if this is one.
    #[must_use]
    pub const fn as_quantity(&self) -> Option<&Quantity> {
        match self {
            Self::Quantity(q) => Some(q),
            _ => None,
        }
    }

    /// Wikibase datatype name of this value.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::String(_) => "string",
            Self::ExternalId(_) => "external-id",
            Self::Url(_) => "url",
            Self::MonolingualText(_) => "monolingualtext",
            Self::Time(_) => "time",
            Self::Quantity(_) => "quantity",
            Self::GlobeCoordinate(_) => "globe-coordinate",
            Self::CommonsMedia(_) => "commonsMedia",
            Self::EntityReference(id) => match id.kind() {
                EntityKind::Lexeme => "wikibase-lexeme",
                _ => "wikibase-item",
            },
            Self::PropertyReference(_) => "wikibase-property",
            Self::GeoShape(_) => "geo-shape",
            Self::TabularData(_) => "tabular-data",
            Self::SomeValue => "somevalue",
            Self::NoValue => "novalue",
            Self::Unknown { .. } => "unknown",
        }
    }

    /// Equality used for every merge decision.
    ///
    /// Quantities compare numerically and coordinates ignore precision;
    /// everything else compares structurally.
    #[must_use]
    pub fn semantically_eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Quantity(a), Self::Quantity(b)) => a.unit == b.unit && a.same_amounts(b),
            (Self::GlobeCoordinate(a), Self::GlobeCoordinate(b)) => a.same_point(b),
            _ => self == other,
        }
    }

    /// Every entity id this value points at, units included.
    #[must_use]
    pub fn referenced_ids(&self) -> Vec<&EntityId> {
        match self {
            Self::EntityReference(id) | Self::PropertyReference(id) => vec![id],
            Self::Quantity(Quantity { unit: Some(unit), .. }) => vec![unit],
            _ => Vec::new(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(v) | Self::ExternalId(v) | Self::Url(v) => write!(f, "{v:?}"),
            Self::MonolingualText(m) => write!(f, "{:?}@{}", m.text, m.language),
            Self::Time(t) => write!(f, "{t}"),
            Self::Quantity(q) => match &q.unit {
                Some(unit) => write!(f, "{} {unit}", q.amount),
                None => write!(f, "{}", q.amount),
            },
            Self::GlobeCoordinate(c) => write!(f, "{},{}", c.latitude, c.longitude),
            Self::CommonsMedia(v) => write!(f, "File:{v}"),
            Self::EntityReference(id) | Self::PropertyReference(id) => write!(f, "{id}"),
            Self::GeoShape(v) | Self::TabularData(v) => write!(f, "Data:{v}"),
            Self::SomeValue => write!(f, "somevalue"),
            Self::NoValue => write!(f, "novalue"),
            Self::Unknown { datatype, .. } => write!(f, "<{datatype}>"),
        }
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<EntityId> for Value {
    fn from(id: EntityId) -> Self {
        match id.kind() {
            EntityKind::Property => Self::PropertyReference(id),
            _ => Self::EntityReference(id),
        }
    }
}

impl From<WbTime> for Value {
    fn from(v: WbTime) -> Self {
        Self::Time(v)
    }
}

impl From<Quantity> for Value {
    fn from(v: Quantity) -> Self {
        Self::Quantity(v)
    }
}

impl From<GlobeCoordinate> for Value {
    fn from(v: GlobeCoordinate) -> Self {
        Self::GlobeCoordinate(v)
    }
}
