//! Entity layer modules.
//!
//! This module groups the entity data model and identity resolution.

#[allow(clippy::module_inception)]
pub mod entity;
pub mod resolution;

pub use entity::{Entity, EntityId, EntityKind, NewEntity};
pub use resolution::{IdentityMatcher, MatchPolicy, SearchResult};
