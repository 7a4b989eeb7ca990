//! Feature name mapping: external CSV headers to model feature names.
//!
//! The table is loaded once at startup and shared read-only by every
//! request. Several external names may feed the same internal feature.

use crate::error::MlError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Reference table shipped with the exoplanet model.
const EXOPLANET_COLUMNS: &[(&str, &str)] = &[
    ("object_of_interest_name", "koi_score"),
    ("disposition_score", "koi_score"),
    ("false_positive_not_transit", "koi_fpflag_nt"),
    ("false_positive_stellar_eclipse", "koi_fpflag_ss"),
    ("false_positive_contamination", "koi_fpflag_co"),
    ("false_positive_ephemeris_match", "koi_fpflag_ec"),
    ("orbital_perod", "koi_period"),
    ("impact_parameter", "koi_impact"),
    ("transit_duration", "koi_duration"),
    ("transit_depth", "koi_depth"),
    ("planet_radius", "koi_prad"),
    ("equilibrium_temperature", "koi_teq"),
    ("incident_flux", "koi_insol"),
    ("model_signal_to_radio", "koi_model_snr"),
    ("effective_temperature", "koi_steff"),
    ("surface_gravity", "koi_slogg"),
    ("stellar_radius", "koi_srad"),
];

/// One external → internal rename rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnRule {
    pub external: String,
    pub internal: String,
}

/// Ordered, validated rename table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeatureMapping {
    version: String,
    rules: Vec<ColumnRule>,
}

/// On-disk layout of a mapping file.
#[derive(Debug, Deserialize)]
struct MappingFile {
    #[serde(default = "default_version")]
    version: String,
    columns: Vec<ColumnRule>,
}

fn default_version() -> String {
    "unversioned".to_string()
}

impl FeatureMapping {
    /// Build a mapping, rejecting empty names and repeated external keys.
    pub fn new(version: impl Into<String>, rules: Vec<ColumnRule>) -> Result<Self, MlError> {
        for (i, rule) in rules.iter().enumerate() {
            if rule.external.trim().is_empty() || rule.internal.trim().is_empty() {
                return Err(MlError::mapping(format!(
                    "rule #{} has an empty column name",
                    i + 1
                )));
            }
            if rules[..i].iter().any(|r| r.external == rule.external) {
                return Err(MlError::mapping(format!(
                    "external column '{}' is mapped more than once",
                    rule.external
                )));
            }
        }
        Ok(Self {
            version: version.into(),
            rules,
        })
    }

    /// The 17-entry table the exoplanet model was trained against.
    pub fn exoplanet_default() -> Self {
        Self {
            version: "koi-2025.1".to_string(),
            rules: EXOPLANET_COLUMNS
                .iter()
                .map(|(external, internal)| ColumnRule {
                    external: (*external).to_string(),
                    internal: (*internal).to_string(),
                })
                .collect(),
        }
    }

    /// Parse a TOML mapping table.
    ///
    /// ```toml
    /// version = "koi-2025.1"
    ///
    /// [[columns]]
    /// external = "orbital_perod"
    /// internal = "koi_period"
    /// ```
    pub fn from_toml_str(content: &str) -> Result<Self, MlError> {
        let file: MappingFile = toml::from_str(content)?;
        if file.columns.is_empty() {
            return Err(MlError::mapping("mapping file defines no columns"));
        }
        Self::new(file.version, file.columns)
    }

    /// Load a TOML mapping table from disk.
    pub fn from_toml_file(path: &Path) -> Result<Self, MlError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            MlError::mapping(format!("cannot read {}: {e}", path.display()))
        })?;
        let mapping = Self::from_toml_str(&content)?;
        tracing::info!(
            path = %path.display(),
            version = %mapping.version,
            rules = mapping.len(),
            "Loaded feature mapping"
        );
        Ok(mapping)
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Internal feature name for an external header, if mapped.
    pub fn internal_for(&self, external: &str) -> Option<&str> {
        self.rules
            .iter()
            .find(|r| r.external == external)
            .map(|r| r.internal.as_str())
    }

    /// Every external header that maps onto `internal`, in table order.
    pub fn externals_for(&self, internal: &str) -> Vec<&str> {
        self.rules
            .iter()
            .filter(|r| r.internal == internal)
            .map(|r| r.external.as_str())
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ColumnRule> {
        self.rules.iter()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl Default for FeatureMapping {
    fn default() -> Self {
        Self::exoplanet_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_table() {
        let mapping = FeatureMapping::exoplanet_default();
        assert_eq!(mapping.len(), 17);
        assert_eq!(mapping.internal_for("orbital_perod"), Some("koi_period"));
        assert_eq!(mapping.internal_for("effective_temperature"), Some("koi_steff"));
        assert_eq!(mapping.internal_for("koi_period"), None);
    }

    #[test]
    fn test_shared_internal_name() {
        let mapping = FeatureMapping::exoplanet_default();
        assert_eq!(
            mapping.externals_for("koi_score"),
            vec!["object_of_interest_name", "disposition_score"]
        );
    }

    #[test]
    fn test_rejects_empty_names() {
        let err = FeatureMapping::new(
            "v1",
            vec![ColumnRule {
                external: "a".into(),
                internal: " ".into(),
            }],
        )
        .unwrap_err();
        assert!(err.to_string().contains("empty column name"));
    }

    #[test]
    fn test_rejects_duplicate_external() {
        let rules = vec![
            ColumnRule {
                external: "a".into(),
                internal: "x".into(),
            },
            ColumnRule {
                external: "a".into(),
                internal: "y".into(),
            },
        ];
        let err = FeatureMapping::new("v1", rules).unwrap_err();
        assert!(err.to_string().contains("more than once"));
    }

    #[test]
    fn test_from_toml_str() {
        let toml = r#"
            version = "test-1"

            [[columns]]
            external = "orbital_perod"
            internal = "koi_period"

            [[columns]]
            external = "stellar_radius"
            internal = "koi_srad"
        "#;
        let mapping = FeatureMapping::from_toml_str(toml).unwrap();
        assert_eq!(mapping.version(), "test-1");
        assert_eq!(mapping.len(), 2);
        assert_eq!(mapping.internal_for("stellar_radius"), Some("koi_srad"));
    }

    #[test]
    fn test_from_toml_str_without_columns() {
        let err = FeatureMapping::from_toml_str("version = \"x\"\ncolumns = []").unwrap_err();
        assert!(matches!(err, MlError::Mapping(_)));
    }

    #[test]
    fn test_from_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mapping.toml");
        std::fs::write(
            &path,
            "[[columns]]\nexternal = \"planet_radius\"\ninternal = \"koi_prad\"\n",
        )
        .unwrap();
        let mapping = FeatureMapping::from_toml_file(&path).unwrap();
        assert_eq!(mapping.version(), "unversioned");
        assert_eq!(mapping.internal_for("planet_radius"), Some("koi_prad"));
    }

    #[test]
    fn test_from_missing_file() {
        let err = FeatureMapping::from_toml_file(Path::new("/nonexistent/mapping.toml"))
            .unwrap_err();
        assert!(err.to_string().contains("cannot read"));
    }
}
