//! Import configuration.
//!
//! Every knob of an import lives in [`ImportConfig`]. Missing keys fall back
//! to the defaults below, so a TOML file only needs the values it changes:
//!
//! ```toml
//! default_language = "en"
//! write_throttle_ms = 1000
//! match_policy = "first-match"
//! transitive_depth = 1
//! ```

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::entity::{EntityId, MatchPolicy};
use crate::error::{ImportError, ImportResult, ValidationError};
use crate::source::{IMPORT_URL_PROPERTY, REFERENCE_URL_PROPERTY};

/// Language codes Wikibase installations commonly reject on entity creation.
pub const DEFAULT_DENIED_LANGUAGES: [&str; 8] =
    ["ms-arab", "pwn", "fa", "guw", "rmc", "en-us", "mcn", "pcm"];

/// Precision applied to every imported globe coordinate.
pub const DEFAULT_COORDINATE_PRECISION: f64 = 0.0001;

fn default_language() -> String {
    "en".to_string()
}

fn default_denied_languages() -> BTreeSet<String> {
    DEFAULT_DENIED_LANGUAGES.iter().map(|l| (*l).to_string()).collect()
}

fn default_excluded_reference_properties() -> BTreeSet<EntityId> {
    [IMPORT_URL_PROPERTY, REFERENCE_URL_PROPERTY]
        .iter()
        .filter_map(|p| EntityId::parse(p).ok())
        .collect()
}

const fn default_coordinate_precision() -> f64 {
    DEFAULT_COORDINATE_PRECISION
}

/// Settings for one [`EntityImporter`](crate::EntityImporter).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportConfig {
    /// Preferred language for identity matching and labels.
    #[serde(default = "default_language")]
    pub default_language: String,

    /// Languages never copied onto a created entity.
    #[serde(default = "default_denied_languages")]
    pub denied_languages: BTreeSet<String>,

    /// Minimum spacing between two writes of one session.
    #[serde(default)]
    pub write_throttle_ms: u64,

    /// Source properties dropped from imported references.
    #[serde(default = "default_excluded_reference_properties")]
    pub excluded_reference_properties: BTreeSet<EntityId>,

    #[serde(default = "default_coordinate_precision")]
    pub coordinate_precision: f64,

    /// Tie-break when several local entities match.
    #[serde(default)]
    pub match_policy: MatchPolicy,

    /// Copy sitelinks onto created entities.
    #[serde(default)]
    pub import_sitelinks: bool,

    /// How many hops of referenced entities get their claims backfilled.
    /// At 0 referenced entities stay label/description/alias shells.
    #[serde(default)]
    pub transitive_depth: usize,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            default_language: default_language(),
            denied_languages: default_denied_languages(),
            write_throttle_ms: 0,
            excluded_reference_properties: default_excluded_reference_properties(),
            coordinate_precision: DEFAULT_COORDINATE_PRECISION,
            match_policy: MatchPolicy::default(),
            import_sitelinks: false,
            transitive_depth: 0,
        }
    }
}

impl ImportConfig {
    #[must_use]
    pub fn with_default_language(mut self, language: impl Into<String>) -> Self {
        self.default_language = language.into();
        self
    }

    #[must_use]
    pub const fn with_write_throttle_ms(mut self, ms: u64) -> Self {
        self.write_throttle_ms = ms;
        self
    }

    #[must_use]
    pub const fn with_match_policy(mut self, policy: MatchPolicy) -> Self {
        self.match_policy = policy;
        self
    }

    #[must_use]
    pub const fn with_transitive_depth(mut self, depth: usize) -> Self {
        self.transitive_depth = depth;
        self
    }

    #[must_use]
    pub const fn with_sitelinks(mut self, enabled: bool) -> Self {
        self.import_sitelinks = enabled;
        self
    }

    /// Replaces the denied language set.
    #[must_use]
    pub fn with_denied_languages<I, S>(mut self, languages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.denied_languages = languages.into_iter().map(Into::into).collect();
        self
    }

    /// Replaces the excluded reference properties.
    #[must_use]
    pub fn with_excluded_reference_properties(
        mut self,
        properties: impl IntoIterator<Item = EntityId>,
    ) -> Self {
        self.excluded_reference_properties = properties.into_iter().collect();
        self
    }

    /// Checks values serde cannot.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidConfig` for an empty default language
    /// or a non-positive coordinate precision.
    pub fn validate(self) -> Result<Self, ValidationError> {
        if self.default_language.trim().is_empty() {
            return Err(ValidationError::InvalidConfig {
                reason: "default_language must not be empty".to_string(),
            });
        }
        if !(self.coordinate_precision.is_finite() && self.coordinate_precision > 0.0) {
            return Err(ValidationError::InvalidConfig {
                reason: format!(
                    "coordinate_precision must be positive (got {})",
                    self.coordinate_precision
                ),
            });
        }
        Ok(self)
    }

    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// Returns `ImportError::Parse` for malformed TOML and
    /// `ImportError::Validation` for out-of-range values.
    pub fn from_toml_str(text: &str) -> ImportResult<Self> {
        let config: Self = toml::from_str(text).map_err(|e| ImportError::Parse(e.to_string()))?;
        Ok(config.validate()?)
    }

    /// Reads a TOML config file.
    ///
    /// # Errors
    ///
    /// Returns `ImportError::Config` when the file cannot be read, otherwise
    /// as [`from_toml_str`](Self::from_toml_str).
    pub fn from_file(path: impl AsRef<Path>) -> ImportResult<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .map_err(|e| ImportError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = ImportConfig::default();
        assert_eq!(config.default_language, "en");
        assert_eq!(config.denied_languages.len(), 8);
        assert!(config.denied_languages.contains("en-us"));
        assert_eq!(config.write_throttle_ms, 0);
        assert!(config
            .excluded_reference_properties
            .contains(&EntityId::parse("P854").unwrap()));
        assert_eq!(config.match_policy, MatchPolicy::LastMatch);
        assert_eq!(config.transitive_depth, 0);
    }

    #[test]
    fn empty_toml_is_default() {
        assert_eq!(ImportConfig::from_toml_str("").unwrap(), ImportConfig::default());
    }

    #[test]
    fn parse_toml_overrides() {
        let toml_str = r#"
            default_language = "de"
            write_throttle_ms = 1000
            match_policy = "reject"
            excluded_reference_properties = ["P4656"]
            denied_languages = []
            transitive_depth = 2
        "#;
        let config = ImportConfig::from_toml_str(toml_str).unwrap();
        assert_eq!(config.default_language, "de");
        assert_eq!(config.write_throttle_ms, 1000);
        assert_eq!(config.match_policy, MatchPolicy::Reject);
        assert_eq!(config.excluded_reference_properties.len(), 1);
        assert!(config.denied_languages.is_empty());
        assert_eq!(config.transitive_depth, 2);
        assert!((config.coordinate_precision - DEFAULT_COORDINATE_PRECISION).abs() < f64::EPSILON);
    }

    #[test]
    fn rejects_bad_values() {
        assert!(matches!(
            ImportConfig::from_toml_str("coordinate_precision = 0.0"),
            Err(ImportError::Validation(_))
        ));
        assert!(matches!(
            ImportConfig::from_toml_str("excluded_reference_properties = [\"bogus\"]"),
            Err(ImportError::Parse(_))
        ));
        assert!(matches!(
            ImportConfig::from_toml_str("write_throttle_ms = \"soon\""),
            Err(ImportError::Parse(_))
        ));
    }

    #[test]
    fn from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wikifed.toml");
        fs::write(&path, "import_sitelinks = true\n").unwrap();
        assert!(ImportConfig::from_file(&path).unwrap().import_sitelinks);
        assert!(matches!(
            ImportConfig::from_file(dir.path().join("nope.toml")),
            Err(ImportError::Config(_))
        ));
    }
}
