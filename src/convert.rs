//! Conversion of remote values into values insertable into the target store.
//!
//! Item ids and quantity units are only meaningful in the store that
//! assigned them, so they are mapped through an [`EntityResolver`], which
//! finds or imports the local counterpart. Property ids are shared between
//! stores and pass through unchanged.

use crate::entity::{EntityId, EntityKind};
use crate::error::{ImportError, ImportResult};
use crate::value::{GlobeCoordinate, Value};

/// Maps a remote entity id to a local one, importing when needed.
pub trait EntityResolver {
    /// Returns the local id of `remote`.
    ///
    /// # Errors
    ///
    /// Returns the failure that prevented finding or creating the entity.
    fn resolve_entity(&mut self, remote: &EntityId) -> ImportResult<EntityId>;
}

/// Stateless value converter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValueConverter {
    coordinate_precision: f64,
}

impl Default for ValueConverter {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_COORDINATE_PRECISION)
    }
}

impl ValueConverter {
    /// A converter writing every coordinate with `coordinate_precision`.
    #[must_use]
    pub const fn new(coordinate_precision: f64) -> Self {
        Self {
            coordinate_precision,
        }
    }

    /// Converts `value` for the target store.
    ///
    /// `Ok(None)` means the value is never imported (media files, and snaks
    /// without a concrete value).
    ///
    /// # Errors
    ///
    /// `UnsupportedValueKind` for kinds that cannot be carried across
    /// stores, or whatever the resolver fails with.
    pub fn convert(
        &self,
        value: &Value,
        resolver: &mut dyn EntityResolver,
    ) -> ImportResult<Option<Value>> {
        let converted = match value {
            Value::CommonsMedia(_) | Value::SomeValue | Value::NoValue => return Ok(None),

            Value::String(_)
            | Value::ExternalId(_)
            | Value::Url(_)
            | Value::MonolingualText(_)
            | Value::Time(_)
            | Value::PropertyReference(_) => value.clone(),

            Value::GlobeCoordinate(c) => Value::GlobeCoordinate(GlobeCoordinate::new(
                c.latitude,
                c.longitude,
                self.coordinate_precision,
            )),

            Value::Quantity(q) => {
                let mut local = q.clone();
                if let Some(unit) = &q.unit {
                    local.unit = Some(resolver.resolve_entity(unit)?);
                }
                Value::Quantity(local)
            }

            Value::EntityReference(id) => match id.kind() {
                EntityKind::Lexeme => return Err(unsupported(value.type_name())),
                EntityKind::Item | EntityKind::Property => {
                    Value::from(resolver.resolve_entity(id)?)
                }
            },

            Value::GeoShape(_) | Value::TabularData(_) => {
                return Err(unsupported(value.type_name()))
            }
            Value::Unknown { datatype, .. } => return Err(unsupported(datatype)),
        };
        Ok(Some(converted))
    }
}

fn unsupported(kind: &str) -> ImportError {
    ImportError::UnsupportedValueKind {
        kind: kind.to_string(),
    }
}
