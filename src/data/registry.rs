//! Flat source registry keyed by `(provider, dataset, variant, geography)`.
//!
//! The built-in registry covers the public Zillow research CSVs. A JSON file
//! can replace it:
//!
//! ```json
//! {
//!   "introspect": true,
//!   "critical_columns": { "zip": ["RegionID", "RegionName", "StateName", "SizeRank"] },
//!   "child_relations": { "county": "CountyName" },
//!   "sources": [
//!     { "provider": "zillow", "dataset": "zhvi", "variant": "all_homes",
//!       "geography": "zip", "url": "https://…", "periodicity": "monthly" }
//!   ]
//! }
//! ```

use std::collections::BTreeMap;
use std::fs::File;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::domain::{GeoLevel, Geography, Periodicity, SourceKey};
use crate::error::AppError;

const ZILLOW_BASE: &str = "https://files.zillowstatic.com/research/public_csvs";

pub const DEFAULT_PROVIDER: &str = "zillow";
pub const DEFAULT_DATASET: &str = "zhvi";
pub const DEFAULT_VARIANT: &str = "all_homes_smoothed_seasonally_adjusted";

/// Everything the registry knows about one source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceEntry {
    pub url: String,
    #[serde(default)]
    pub periodicity: Periodicity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SourceRecord {
    provider: String,
    dataset: String,
    variant: String,
    geography: Geography,
    #[serde(flatten)]
    entry: SourceEntry,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct RegistryFile {
    #[serde(default)]
    introspect: bool,
    #[serde(default)]
    critical_columns: BTreeMap<Geography, Vec<String>>,
    #[serde(default)]
    child_relations: BTreeMap<GeoLevel, String>,
    #[serde(default)]
    sources: Vec<SourceRecord>,
}

#[derive(Debug, Clone, Default)]
pub struct SourceRegistry {
    entries: BTreeMap<SourceKey, SourceEntry>,
    introspect: bool,
    critical_columns: BTreeMap<Geography, Vec<String>>,
    child_relations: BTreeMap<GeoLevel, String>,
}

impl SourceRegistry {
    /// Public Zillow home-value and rent indices.
    pub fn builtin() -> Self {
        let mut entries = BTreeMap::new();

        for geography in Geography::ALL {
            let prefix = zillow_prefix(geography);
            entries.insert(
                SourceKey::new(DEFAULT_PROVIDER, "zhvi", DEFAULT_VARIANT, geography),
                SourceEntry {
                    url: format!("{ZILLOW_BASE}/zhvi/{prefix}_zhvi_uc_sfrcondo_tier_0.33_0.67_sm_sa_month.csv"),
                    periodicity: Periodicity::Monthly,
                    description: Some("Typical home value, mid tier, smoothed and seasonally adjusted".into()),
                },
            );
            entries.insert(
                SourceKey::new(DEFAULT_PROVIDER, "zhvi", "all_homes_raw", geography),
                SourceEntry {
                    url: format!("{ZILLOW_BASE}/zhvi/{prefix}_zhvi_uc_sfrcondo_tier_0.33_0.67_month.csv"),
                    periodicity: Periodicity::Monthly,
                    description: Some("Typical home value, mid tier, raw".into()),
                },
            );
        }

        for geography in [Geography::Zip, Geography::City, Geography::County, Geography::Metro] {
            let prefix = zillow_prefix(geography);
            entries.insert(
                SourceKey::new(DEFAULT_PROVIDER, "zori", "all_homes_smoothed", geography),
                SourceEntry {
                    url: format!("{ZILLOW_BASE}/zori/{prefix}_zori_uc_sfrcondomfr_sm_month.csv"),
                    periodicity: Periodicity::Monthly,
                    description: Some("Observed rent index, all homes plus multifamily, smoothed".into()),
                },
            );
        }

        Self {
            entries,
            introspect: true,
            critical_columns: BTreeMap::new(),
            child_relations: BTreeMap::new(),
        }
    }

    /// Load a registry from JSON; it replaces the built-in table.
    pub fn from_json_file(path: &Path) -> Result<Self, AppError> {
        let file = File::open(path)
            .map_err(|e| AppError::config(format!("Failed to open registry '{}': {e}", path.display())))?;
        let parsed: RegistryFile = serde_json::from_reader(file)
            .map_err(|e| AppError::config(format!("Failed to parse registry '{}': {e}", path.display())))?;
        Self::from_file(parsed)
    }

    pub fn from_json_str(text: &str) -> Result<Self, AppError> {
        let parsed: RegistryFile = serde_json::from_str(text)
            .map_err(|e| AppError::config(format!("Failed to parse registry: {e}")))?;
        Self::from_file(parsed)
    }

    fn from_file(parsed: RegistryFile) -> Result<Self, AppError> {
        let mut entries = BTreeMap::new();
        for record in parsed.sources {
            let key = SourceKey::new(record.provider, record.dataset, record.variant, record.geography);
            if record.entry.url.trim().is_empty() {
                return Err(AppError::config(format!("Registry entry {key} has an empty url.")));
            }
            if entries.insert(key.clone(), record.entry).is_some() {
                return Err(AppError::config(format!("Registry lists {key} more than once.")));
            }
        }
        Ok(Self {
            entries,
            introspect: parsed.introspect,
            critical_columns: parsed.critical_columns,
            child_relations: parsed.child_relations,
        })
    }

    pub fn entry(&self, key: &SourceKey) -> Option<&SourceEntry> {
        self.entries.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &SourceKey> {
        self.entries.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&SourceKey, &SourceEntry)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn introspects(&self) -> bool {
        self.introspect
    }

    pub fn declared_critical_columns(&self, geography: Geography) -> Option<&[String]> {
        self.critical_columns.get(&geography).map(Vec::as_slice)
    }

    pub fn child_relation(&self, level: GeoLevel) -> Option<&str> {
        self.child_relations.get(&level).map(String::as_str)
    }
}

fn zillow_prefix(geography: Geography) -> &'static str {
    match geography {
        Geography::Zip => "Zip",
        Geography::City => "City",
        Geography::County => "County",
        Geography::State => "State",
        Geography::Metro => "Metro",
        Geography::Neighborhood => "Neighborhood",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_covers_default_key() {
        let reg = SourceRegistry::builtin();
        let key = SourceKey::new(DEFAULT_PROVIDER, DEFAULT_DATASET, DEFAULT_VARIANT, Geography::Zip);
        let entry = reg.entry(&key).unwrap();
        assert!(entry.url.ends_with("Zip_zhvi_uc_sfrcondo_tier_0.33_0.67_sm_sa_month.csv"));
        assert!(reg.introspects());
        assert!(reg.declared_critical_columns(Geography::Zip).is_none());
    }

    #[test]
    fn json_registry_parses_and_rejects_duplicates() {
        let text = r#"{
            "introspect": false,
            "critical_columns": { "zip": ["RegionID", "RegionName"] },
            "child_relations": { "county": "County" },
            "sources": [
                { "provider": "acme", "dataset": "rent", "variant": "raw",
                  "geography": "zip", "url": "https://example.test/rent.csv",
                  "periodicity": "quarterly" }
            ]
        }"#;
        let reg = SourceRegistry::from_json_str(text).unwrap();
        assert_eq!(reg.len(), 1);
        let key = SourceKey::new("acme", "rent", "raw", Geography::Zip);
        assert_eq!(reg.entry(&key).unwrap().periodicity, Periodicity::Quarterly);
        assert_eq!(reg.declared_critical_columns(Geography::Zip).unwrap().len(), 2);
        assert_eq!(reg.child_relation(GeoLevel::County), Some("County"));

        let dup = r#"{ "sources": [
            { "provider": "a", "dataset": "b", "variant": "c", "geography": "zip", "url": "u" },
            { "provider": "a", "dataset": "b", "variant": "c", "geography": "zip", "url": "v" }
        ] }"#;
        assert_eq!(SourceRegistry::from_json_str(dup).unwrap_err().exit_code(), 2);
    }
}
