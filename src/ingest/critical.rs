//! Critical-column resolution.
//!
//! Resolution order:
//! 1. the list the source descriptor declares for the geography
//! 2. header discovery, when the descriptor allows introspection and the
//!    snapshot has at least one period header and one identifier-like header
//! 3. the static per-geography table below

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::data::SourceDescriptor;
use crate::domain::Geography;
use crate::io::RawSnapshot;

/// Where a critical-column set came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnOrigin {
    Descriptor,
    Discovered,
    Static,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CriticalColumnSet {
    pub columns: Vec<String>,
    pub origin: ColumnOrigin,
}

impl CriticalColumnSet {
    /// Critical columns absent from the snapshot's headers.
    pub fn missing_from(&self, raw: &RawSnapshot) -> Vec<String> {
        self.columns
            .iter()
            .filter(|c| !raw.has_column(c))
            .cloned()
            .collect()
    }
}

/// Built-in critical columns per geography.
pub fn static_critical_columns(geography: Geography) -> &'static [&'static str] {
    match geography {
        Geography::Metro => &["RegionID", "RegionName", "StateName", "Metro", "CountyName", "SizeRank"],
        Geography::State => &["RegionID", "RegionName", "StateName", "SizeRank"],
        Geography::County => &["RegionID", "RegionName", "StateName", "CountyName", "SizeRank"],
        Geography::City => &["RegionID", "RegionName", "StateName", "CityName", "SizeRank"],
        Geography::Zip => &["RegionID", "RegionName", "StateName", "SizeRank"],
        Geography::Neighborhood => &[
            "RegionID",
            "RegionName",
            "StateName",
            "NeighborhoodName",
            "CityName",
            "SizeRank",
        ],
    }
}

/// Whether a header names an identifier (`RegionID`, `SizeRank`, or `…Name`).
pub fn is_identifier_header(header: &str) -> bool {
    header.eq_ignore_ascii_case("RegionID")
        || header.eq_ignore_ascii_case("SizeRank")
        || (header.len() > 4 && header.ends_with("Name"))
}

/// Identifier-like headers of `raw`, or `None` if discovery is not possible.
pub fn discover(raw: &RawSnapshot) -> Option<Vec<String>> {
    let has_period = !raw.period_columns().is_empty();
    let identifiers: Vec<String> = raw
        .non_period_columns()
        .into_iter()
        .filter(|h| is_identifier_header(h))
        .map(str::to_string)
        .collect();
    (has_period && !identifiers.is_empty()).then_some(identifiers)
}

/// Resolve the critical columns for `geography`.
///
/// `raw` is `None` when no snapshot is available (fetch failed); discovery is
/// skipped in that case.
pub fn resolve<D: SourceDescriptor + ?Sized>(
    descriptor: &D,
    geography: Geography,
    raw: Option<&RawSnapshot>,
) -> CriticalColumnSet {
    if let Some(columns) = descriptor.critical_columns(geography).filter(|c| !c.is_empty()) {
        debug!(?columns, "critical columns declared by descriptor");
        return CriticalColumnSet {
            columns,
            origin: ColumnOrigin::Descriptor,
        };
    }

    if descriptor.introspects() {
        if let Some(columns) = raw.and_then(discover) {
            debug!(?columns, "critical columns discovered from headers");
            return CriticalColumnSet {
                columns,
                origin: ColumnOrigin::Discovered,
            };
        }
    }

    CriticalColumnSet {
        columns: static_critical_columns(geography)
            .iter()
            .map(|c| c.to_string())
            .collect(),
        origin: ColumnOrigin::Static,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::StaticDescriptor;

    fn snapshot(headers: &str) -> RawSnapshot {
        RawSnapshot::from_csv_str(&format!("{headers}\n")).unwrap()
    }

    #[test]
    fn descriptor_declaration_wins() {
        let raw = snapshot("RegionID,RegionName,SizeRank,2024-01-31");
        let desc = StaticDescriptor::new(raw.clone())
            .with_critical_columns(["RegionID", "Foo"])
            .introspecting(true);
        let set = resolve(&desc, Geography::Zip, Some(&raw));
        assert_eq!(set.origin, ColumnOrigin::Descriptor);
        assert_eq!(set.missing_from(&raw), vec!["Foo".to_string()]);
    }

    #[test]
    fn discovery_requires_period_and_identifier_headers() {
        let raw = snapshot("RegionID,RegionName,RegionType,StateName,Metro,2024-01-31,2024-02-29");
        let desc = StaticDescriptor::new(raw.clone()).introspecting(true);
        let set = resolve(&desc, Geography::Zip, Some(&raw));
        assert_eq!(set.origin, ColumnOrigin::Discovered);
        assert_eq!(set.columns, vec!["RegionID", "RegionName", "StateName"]);

        let no_periods = snapshot("RegionID,RegionName");
        assert_eq!(discover(&no_periods), None);
        let set = resolve(&desc, Geography::Zip, Some(&no_periods));
        assert_eq!(set.origin, ColumnOrigin::Static);
    }

    #[test]
    fn static_table_used_without_introspection() {
        let raw = snapshot("RegionID,RegionName,2024-01-31");
        let desc = StaticDescriptor::new(raw.clone());
        let set = resolve(&desc, Geography::Neighborhood, Some(&raw));
        assert_eq!(set.origin, ColumnOrigin::Static);
        assert!(set.columns.contains(&"NeighborhoodName".to_string()));
        assert_eq!(set.missing_from(&raw).len(), 4);
    }
}
