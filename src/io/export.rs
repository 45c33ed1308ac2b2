//! Run output files.
//!
//! JSON for anything structured (run result, statistics, quality report) and
//! flat CSVs of aggregated means and statistics for spreadsheets.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::path::Path;

use chrono::NaiveDate;
use serde::Serialize;

use crate::aggregate::AggregatedLevel;
use crate::error::AppError;
use crate::stats::LevelStatistics;

fn ensure_parent(path: &Path) -> Result<(), AppError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .map_err(|e| AppError::new(2, format!("Failed to create directory '{}': {e}", parent.display())))?;
    }
    Ok(())
}

/// Pretty-printed JSON, creating parent directories as needed.
pub fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), AppError> {
    ensure_parent(path)?;
    let file = File::create(path)
        .map_err(|e| AppError::new(2, format!("Failed to create JSON '{}': {e}", path.display())))?;
    serde_json::to_writer_pretty(file, value)
        .map_err(|e| AppError::new(2, format!("Failed to write JSON '{}': {e}", path.display())))
}

/// One row per node: `id,name,parent,<period>...` with the node mean per period.
///
/// Periods without a value are left blank.
pub fn write_level_csv(path: &Path, level: &AggregatedLevel) -> Result<(), AppError> {
    ensure_parent(path)?;
    let write_err = |e: csv::Error| AppError::new(2, format!("Failed to write CSV '{}': {e}", path.display()));

    let mut writer = csv::Writer::from_path(path).map_err(write_err)?;

    let mut header = vec!["id".to_string(), "name".to_string(), "parent".to_string()];
    header.extend(level.periods.iter().map(|p| p.format("%Y-%m-%d").to_string()));
    writer.write_record(&header).map_err(write_err)?;

    for node in level.nodes.values() {
        let mut record = vec![
            node.id.clone(),
            node.name.clone(),
            node.parent.clone().unwrap_or_default(),
        ];
        record.extend(
            level
                .periods
                .iter()
                .map(|p| node.periods.get(p).map(|r| format!("{:.4}", r.mean)).unwrap_or_default()),
        );
        writer.write_record(&record).map_err(write_err)?;
    }

    writer
        .flush()
        .map_err(|e| AppError::new(2, format!("Failed to flush CSV '{}': {e}", path.display())))
}

/// One row per entity and observed period: `entity_id,name,period,<statistic>...`.
///
/// Earlier periods carry only their point-in-time statistics; the latest
/// period carries the full record. Skipped statistics are blank.
pub fn write_statistics_csv(path: &Path, stats: &LevelStatistics) -> Result<(), AppError> {
    ensure_parent(path)?;
    let write_err = |e: csv::Error| AppError::new(2, format!("Failed to write CSV '{}': {e}", path.display()));

    let mut writer = csv::Writer::from_path(path).map_err(write_err)?;

    let mut header = vec!["entity_id".to_string(), "name".to_string(), "period".to_string()];
    header.extend(stats.requested.iter().cloned());
    writer.write_record(&header).map_err(write_err)?;

    let cells = |values: &BTreeMap<String, f64>| -> Vec<String> {
        stats
            .requested
            .iter()
            .map(|s| values.get(s).map(|v| format!("{v:.6}")).unwrap_or_default())
            .collect()
    };

    for entity in &stats.entities {
        let period = |d: Option<NaiveDate>| d.map(|d| d.format("%Y-%m-%d").to_string()).unwrap_or_default();
        for past in entity.history.iter().filter(|h| Some(h.period) != entity.as_of) {
            let mut record = vec![entity.entity_id.clone(), entity.name.clone(), period(Some(past.period))];
            record.extend(cells(&past.values));
            writer.write_record(&record).map_err(write_err)?;
        }
        let mut record = vec![entity.entity_id.clone(), entity.name.clone(), period(entity.as_of)];
        record.extend(cells(&entity.record.values));
        writer.write_record(&record).map_err(write_err)?;
    }

    writer
        .flush()
        .map_err(|e| AppError::new(2, format!("Failed to flush CSV '{}': {e}", path.display())))
}
