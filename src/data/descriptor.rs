//! Source descriptors: the seam between the pipeline and a data provider.

use std::path::Path;
use std::time::Duration;

use crate::data::fetch::SnapshotClient;
use crate::data::registry::SourceRegistry;
use crate::domain::{GeoLevel, Geography, Periodicity, SourceKey};
use crate::error::{AppError, FetchError};
use crate::io::RawSnapshot;

/// What the pipeline needs to know about a source.
pub trait SourceDescriptor {
    /// Fetch the current raw snapshot for `key`.
    fn fetch_raw(&self, key: &SourceKey) -> Result<RawSnapshot, FetchError>;

    /// Columns this source declares critical for `geography`, if it declares any.
    fn critical_columns(&self, geography: Geography) -> Option<Vec<String>>;

    /// Column naming the parent entity at `level`, if the source overrides the default.
    fn child_relation(&self, _level: GeoLevel) -> Option<String> {
        None
    }

    /// Whether critical columns may be discovered from a snapshot's headers.
    fn introspects(&self) -> bool {
        false
    }

    fn periodicity(&self, _key: &SourceKey) -> Periodicity {
        Periodicity::Monthly
    }
}

/// Descriptor backed by the source registry and an HTTP client.
pub struct RegistryDescriptor {
    registry: SourceRegistry,
    client: SnapshotClient,
}

impl RegistryDescriptor {
    pub fn new(registry: SourceRegistry, timeout: Duration) -> Result<Self, AppError> {
        let client = SnapshotClient::new(timeout)?;
        Ok(Self { registry, client })
    }
}

impl SourceDescriptor for RegistryDescriptor {
    fn fetch_raw(&self, key: &SourceKey) -> Result<RawSnapshot, FetchError> {
        let entry = self
            .registry
            .entry(key)
            .ok_or_else(|| FetchError::UnknownSource(key.to_string()))?;
        self.client.fetch_csv(&entry.url)
    }

    fn critical_columns(&self, geography: Geography) -> Option<Vec<String>> {
        self.registry.declared_critical_columns(geography).map(<[String]>::to_vec)
    }

    fn child_relation(&self, level: GeoLevel) -> Option<String> {
        self.registry.child_relation(level).map(str::to_string)
    }

    fn introspects(&self) -> bool {
        self.registry.introspects()
    }

    fn periodicity(&self, key: &SourceKey) -> Periodicity {
        self.registry.entry(key).map(|e| e.periodicity).unwrap_or_default()
    }
}

/// Descriptor serving a snapshot that is already in hand.
///
/// Backs `--input` runs against a local CSV and stands in for the network in tests.
#[derive(Debug, Clone, Default)]
pub struct StaticDescriptor {
    snapshot: Option<RawSnapshot>,
    critical: Option<Vec<String>>,
    relations: Vec<(GeoLevel, String)>,
    introspect: bool,
    periodicity: Periodicity,
}

impl StaticDescriptor {
    pub fn new(snapshot: RawSnapshot) -> Self {
        Self {
            snapshot: Some(snapshot),
            ..Self::default()
        }
    }

    /// A descriptor whose every fetch fails.
    pub fn failing() -> Self {
        Self::default()
    }

    pub fn from_csv_path(path: &Path) -> Result<Self, FetchError> {
        Ok(Self::new(RawSnapshot::from_csv_path(path)?))
    }

    pub fn with_critical_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.critical = Some(columns.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_child_relation(mut self, level: GeoLevel, column: impl Into<String>) -> Self {
        self.relations.push((level, column.into()));
        self
    }

    pub fn introspecting(mut self, introspect: bool) -> Self {
        self.introspect = introspect;
        self
    }

    pub fn with_periodicity(mut self, periodicity: Periodicity) -> Self {
        self.periodicity = periodicity;
        self
    }
}

impl SourceDescriptor for StaticDescriptor {
    fn fetch_raw(&self, key: &SourceKey) -> Result<RawSnapshot, FetchError> {
        match &self.snapshot {
            Some(snapshot) if !snapshot.is_empty() => Ok(snapshot.clone()),
            Some(_) => Err(FetchError::EmptyPayload(key.to_string())),
            None => Err(FetchError::Http {
                url: key.to_string(),
                message: "no snapshot available".to_string(),
            }),
        }
    }

    fn critical_columns(&self, _geography: Geography) -> Option<Vec<String>> {
        self.critical.clone()
    }

    fn child_relation(&self, level: GeoLevel) -> Option<String> {
        self.relations
            .iter()
            .find(|(l, _)| *l == level)
            .map(|(_, c)| c.clone())
    }

    fn introspects(&self) -> bool {
        self.introspect
    }

    fn periodicity(&self, _key: &SourceKey) -> Periodicity {
        self.periodicity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_descriptor_rejects_unknown_keys() {
        let desc = RegistryDescriptor::new(SourceRegistry::default(), Duration::from_secs(1)).unwrap();
        let key = SourceKey::new("nobody", "x", "y", Geography::Zip);
        assert!(matches!(desc.fetch_raw(&key), Err(FetchError::UnknownSource(_))));
        assert_eq!(desc.periodicity(&key), Periodicity::Monthly);
    }

    #[test]
    fn static_descriptor_serves_snapshot_and_overrides() {
        let snap = RawSnapshot::from_csv_str("RegionID,2024-01-31\n1,100\n").unwrap();
        let desc = StaticDescriptor::new(snap.clone())
            .with_child_relation(GeoLevel::County, "County")
            .introspecting(true);
        let key = SourceKey::new("local", "x", "y", Geography::Zip);
        assert_eq!(desc.fetch_raw(&key).unwrap(), snap);
        assert_eq!(desc.child_relation(GeoLevel::County).as_deref(), Some("County"));
        assert_eq!(desc.child_relation(GeoLevel::City), None);
        assert!(desc.introspects());
        assert!(StaticDescriptor::failing().fetch_raw(&key).is_err());
    }
}
