//! Bottom-up rollup of the ZIP table into every requested level.
//!
//! Each level is reduced straight from the leaf values it covers, so a
//! state's mean is the mean over its ZIPs, not a mean of county means.
//! Levels are independent and run in parallel.

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::aggregate::{HierarchyMap, Reduction, reduce};
use crate::domain::{CleanRow, CleanTable, GeoLevel};
use crate::error::AggregateError;

/// One node's time series of reductions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSeries {
    pub id: String,
    pub name: String,
    pub parent: Option<String>,
    /// Immediate members at the next-finer level.
    pub children: BTreeSet<String>,
    /// Number of leaf rows under this node.
    pub leaf_count: usize,
    /// Periods with at least one leaf value; others are absent.
    pub periods: BTreeMap<NaiveDate, Reduction>,
}

impl NodeSeries {
    pub fn mean_series(&self) -> BTreeMap<NaiveDate, f64> {
        self.periods.iter().map(|(d, r)| (*d, r.mean)).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedLevel {
    pub level: GeoLevel,
    pub periods: Vec<NaiveDate>,
    pub nodes: BTreeMap<String, NodeSeries>,
    /// Leaf rows that could not be placed at this level.
    pub unmapped: usize,
    /// Nodes whose leaves disagreed about the parent; the first one seen wins.
    pub conflicting_parents: usize,
    /// Node periods dropped because the reduction overflowed.
    #[serde(default)]
    pub non_finite: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Aggregation {
    pub levels: BTreeMap<GeoLevel, AggregatedLevel>,
}

impl Aggregation {
    pub fn level(&self, level: GeoLevel) -> Option<&AggregatedLevel> {
        self.levels.get(&level)
    }
}

pub fn aggregate(
    table: &CleanTable,
    hierarchy: &HierarchyMap,
    levels: &[GeoLevel],
) -> Result<Aggregation, AggregateError> {
    if table.rows.is_empty() {
        return Err(AggregateError::EmptyInput);
    }
    if table.periods.is_empty() {
        return Err(AggregateError::NoPeriods);
    }

    let mut wanted: Vec<GeoLevel> = levels.to_vec();
    wanted.sort();
    wanted.dedup();

    let levels: BTreeMap<GeoLevel, AggregatedLevel> = wanted
        .par_iter()
        .map(|&level| (level, aggregate_level(table, hierarchy, level)))
        .collect();

    for agg in levels.values() {
        info!(
            level = %agg.level,
            nodes = agg.nodes.len(),
            unmapped = agg.unmapped,
            "aggregated level"
        );
        if agg.unmapped > 0 {
            warn!(level = %agg.level, count = agg.unmapped, "rows without a node at this level");
        }
        if agg.non_finite > 0 {
            warn!(level = %agg.level, count = agg.non_finite, "node periods dropped on non-finite reduction");
        }
    }

    Ok(Aggregation { levels })
}

struct Group<'t> {
    name: String,
    parent: Option<String>,
    children: BTreeSet<String>,
    rows: Vec<&'t CleanRow>,
}

fn aggregate_level(table: &CleanTable, hierarchy: &HierarchyMap, level: GeoLevel) -> AggregatedLevel {
    let mut groups: BTreeMap<String, Group<'_>> = BTreeMap::new();
    let mut unmapped = 0;
    let mut conflicting: BTreeSet<String> = BTreeSet::new();
    let mut non_finite = 0;

    for row in &table.rows {
        let Some(node) = hierarchy.node(row, level) else {
            unmapped += 1;
            continue;
        };
        let parent = level.parent().and_then(|p| hierarchy.node(row, p)).map(|n| n.id);
        let child = level.child().and_then(|c| hierarchy.node(row, c)).map(|n| n.id);

        let group = groups.entry(node.id.clone()).or_insert_with(|| Group {
            name: node.name,
            parent: None,
            children: BTreeSet::new(),
            rows: Vec::new(),
        });
        if let Some(p) = parent {
            if group.parent.is_none() {
                group.parent = Some(p);
            } else if group.parent.as_deref() != Some(p.as_str()) {
                conflicting.insert(node.id);
            }
        }
        if let Some(child) = child {
            group.children.insert(child);
        }
        group.rows.push(row);
    }

    let nodes = groups
        .into_iter()
        .map(|(id, group)| {
            let mut periods = BTreeMap::new();
            let mut buf = Vec::with_capacity(group.rows.len());
            for period in &table.periods {
                buf.clear();
                buf.extend(group.rows.iter().filter_map(|r| r.values.get(period).copied()));
                if buf.is_empty() {
                    continue;
                }
                match reduce(&buf) {
                    Some(reduction) => {
                        periods.insert(*period, reduction);
                    }
                    None => non_finite += 1,
                }
            }
            let series = NodeSeries {
                id: id.clone(),
                name: group.name,
                parent: group.parent,
                children: group.children,
                leaf_count: group.rows.len(),
                periods,
            };
            (id, series)
        })
        .collect::<BTreeMap<_, _>>();

    if !conflicting.is_empty() {
        debug!(level = %level, count = conflicting.len(), "nodes with conflicting parents");
    }

    AggregatedLevel {
        level,
        periods: table.periods.clone(),
        nodes,
        unmapped,
        conflicting_parents: conflicting.len(),
        non_finite,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn month(m: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, m, 1).unwrap()
    }

    fn zip(id: &str, city: &str, county: &str, state: &str, values: &[(u32, f64)]) -> CleanRow {
        CleanRow {
            entity_id: id.to_string(),
            meta: [
                ("RegionName", id),
                ("City", city),
                ("CountyName", county),
                ("StateName", state),
            ]
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
            values: values.iter().map(|(m, v)| (month(*m), *v)).collect(),
        }
    }

    fn table() -> CleanTable {
        CleanTable {
            id_columns: vec!["RegionID".into()],
            periods: vec![month(1), month(2), month(3)],
            rows: vec![
                zip("90001", "Los Angeles", "Los Angeles County", "CA", &[(1, 100.0), (2, 110.0)]),
                zip("90002", "Los Angeles", "Los Angeles County", "CA", &[(1, 300.0), (2, 330.0)]),
                zip("94101", "San Francisco", "San Francisco County", "CA", &[(1, 800.0)]),
                zip("97201", "Portland", "Multnomah County", "OR", &[(1, 400.0), (2, 420.0)]),
                zip("10001", "New York", "New York County", "NY", &[(1, 900.0), (2, 910.0)]),
            ],
        }
    }

    #[test]
    fn state_mean_is_mean_of_leaf_values() {
        let agg = aggregate(&table(), &HierarchyMap::default(), &GeoLevel::ALL).unwrap();
        let ca = &agg.level(GeoLevel::State).unwrap().nodes["CA"];
        let jan = &ca.periods[&month(1)];
        assert_eq!(jan.count, 3);
        assert_eq!(jan.mean, 400.0);
        assert_eq!(jan.median, 300.0);
        assert_eq!((jan.min, jan.max), (100.0, 800.0));
        assert_eq!(ca.periods[&month(2)].count, 2);
        // No ZIP under CA reports March.
        assert!(!ca.periods.contains_key(&month(3)));
        assert_eq!(ca.parent.as_deref(), Some("Pacific"));
        assert_eq!(
            ca.children.iter().cloned().collect::<Vec<_>>(),
            vec!["CA/Los Angeles County", "CA/San Francisco County"]
        );
    }

    #[test]
    fn regions_roll_up_from_zips() {
        let agg = aggregate(&table(), &HierarchyMap::default(), &[GeoLevel::Region, GeoLevel::StateRegion]).unwrap();
        let west = &agg.level(GeoLevel::Region).unwrap().nodes["West"];
        assert_eq!(west.leaf_count, 4);
        assert_eq!(west.periods[&month(1)].mean, 400.0);
        assert!(west.parent.is_none());
        assert_eq!(west.children.len(), 1);
        assert!(agg.level(GeoLevel::State).is_none());

        let pacific = &agg.level(GeoLevel::StateRegion).unwrap().nodes["Pacific"];
        assert_eq!(pacific.children.iter().cloned().collect::<Vec<_>>(), vec!["CA", "OR"]);
    }

    #[test]
    fn city_nodes_list_their_zips() {
        let agg = aggregate(&table(), &HierarchyMap::default(), &[GeoLevel::City, GeoLevel::Zip]).unwrap();
        let la = &agg.level(GeoLevel::City).unwrap().nodes["CA/Los Angeles"];
        assert_eq!(la.children.len(), 2);
        assert_eq!(la.parent.as_deref(), Some("CA/Los Angeles County"));
        assert_eq!(la.periods[&month(2)].mean, 220.0);

        let leaf = &agg.level(GeoLevel::Zip).unwrap().nodes["90001"];
        assert_eq!(leaf.periods[&month(1)].count, 1);
        assert_eq!(leaf.parent.as_deref(), Some("CA/Los Angeles"));
    }

    #[test]
    fn rerun_is_identical() {
        let t = table();
        let a = aggregate(&t, &HierarchyMap::default(), &GeoLevel::ALL).unwrap();
        let b = aggregate(&t, &HierarchyMap::default(), &GeoLevel::ALL).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn empty_inputs_are_stage_errors() {
        let mut t = table();
        t.periods.clear();
        assert_eq!(aggregate(&t, &HierarchyMap::default(), &GeoLevel::ALL), Err(AggregateError::NoPeriods));
        t.rows.clear();
        assert_eq!(aggregate(&t, &HierarchyMap::default(), &GeoLevel::ALL), Err(AggregateError::EmptyInput));
    }

    #[test]
    fn unplaceable_rows_are_counted() {
        let mut t = table();
        t.rows.push(zip("00901", "San Juan", "San Juan Municipio", "PR", &[(1, 50.0)]));
        let agg = aggregate(&t, &HierarchyMap::default(), &[GeoLevel::State]).unwrap();
        assert_eq!(agg.level(GeoLevel::State).unwrap().unmapped, 1);
    }

    #[test]
    fn overflowing_periods_are_dropped_and_counted() {
        let t = CleanTable {
            id_columns: vec!["RegionID".into()],
            periods: vec![month(1), month(2)],
            rows: vec![
                zip("90001", "Los Angeles", "Los Angeles County", "CA", &[(1, 1.5e308), (2, 100.0)]),
                zip("90002", "Los Angeles", "Los Angeles County", "CA", &[(1, 1.6e308), (2, 300.0)]),
            ],
        };
        let agg = aggregate(&t, &HierarchyMap::default(), &[GeoLevel::State]).unwrap();
        let state = agg.level(GeoLevel::State).unwrap();
        let ca = &state.nodes["CA"];
        assert!(!ca.periods.contains_key(&month(1)));
        assert_eq!(ca.periods[&month(2)].mean, 200.0);
        assert_eq!(state.non_finite, 1);

        let json = serde_json::to_string(state).unwrap();
        assert!(!json.contains("null"));
    }
}
