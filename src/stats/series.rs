//! Per-entity time series fed to the statistics engine.

use std::collections::BTreeMap;

use chrono::NaiveDate;

use crate::aggregate::AggregatedLevel;
use crate::domain::CleanTable;

#[derive(Debug, Clone, PartialEq)]
pub struct EntitySeries {
    pub entity_id: String,
    pub name: String,
    pub points: BTreeMap<NaiveDate, f64>,
}

impl EntitySeries {
    /// Non-missing values, oldest first.
    pub fn values(&self) -> Vec<f64> {
        self.points.values().copied().collect()
    }

    pub fn latest(&self) -> Option<(NaiveDate, f64)> {
        self.points.iter().next_back().map(|(d, v)| (*d, *v))
    }
}

/// One series per node, using the node's mean reduction.
pub fn series_for_level(level: &AggregatedLevel) -> Vec<EntitySeries> {
    level
        .nodes
        .values()
        .map(|node| EntitySeries {
            entity_id: node.id.clone(),
            name: node.name.clone(),
            points: node.mean_series(),
        })
        .collect()
}

/// One series per row of a cleaned table.
pub fn series_from_table(table: &CleanTable) -> Vec<EntitySeries> {
    table
        .rows
        .iter()
        .map(|row| EntitySeries {
            entity_id: row.entity_id.clone(),
            name: row.display_name().to_string(),
            points: row.values.clone(),
        })
        .collect()
}
