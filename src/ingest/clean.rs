//! Snapshot cleaning: raw CSV records → `CleanTable`.
//!
//! Rows are keyed by `RegionID`, falling back to `RegionName`. Rows with
//! neither are dropped, as are repeated ids (first occurrence wins).
//! Non-numeric period cells are coerced to missing and counted.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use serde::{Deserialize, Serialize};

use crate::domain::{CleanRow, CleanTable};
use crate::io::{RawSnapshot, is_missing_marker, parse_value};
use crate::ingest::CriticalColumnSet;

/// Identifier columns, in preference order.
pub const ENTITY_KEY_COLUMNS: [&str; 2] = ["RegionID", "RegionName"];

/// Row-level counters collected while cleaning.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanStats {
    pub rows_read: usize,
    pub rows_kept: usize,
    pub dropped_missing_id: usize,
    pub dropped_duplicate: usize,
    /// Non-empty period cells that were not numeric.
    pub coerced_missing: usize,
    pub duplicate_period_headers: usize,
}

pub fn clean(raw: &RawSnapshot, critical: &CriticalColumnSet) -> (CleanTable, CleanStats) {
    let mut stats = CleanStats {
        rows_read: raw.records.len(),
        ..CleanStats::default()
    };

    let mut seen_periods = BTreeSet::new();
    let mut period_columns = Vec::new();
    for (idx, date) in raw.period_columns() {
        if seen_periods.insert(date) {
            period_columns.push((idx, date));
        } else {
            stats.duplicate_period_headers += 1;
        }
    }
    let period_idx: HashSet<usize> = raw.period_columns().into_iter().map(|(i, _)| i).collect();

    let id_columns: Vec<String> = ENTITY_KEY_COLUMNS
        .iter()
        .filter_map(|c| raw.column_index(c).map(|i| raw.headers[i].clone()))
        .collect();

    let mut rows = Vec::with_capacity(raw.records.len());
    let mut seen_ids = HashSet::new();

    for record in &raw.records {
        let Some(entity_id) = id_columns
            .iter()
            .find_map(|c| raw.cell(record, c))
            .map(str::to_string)
        else {
            stats.dropped_missing_id += 1;
            continue;
        };

        if !seen_ids.insert(entity_id.clone()) {
            stats.dropped_duplicate += 1;
            continue;
        }

        let meta: BTreeMap<String, String> = raw
            .headers
            .iter()
            .enumerate()
            .filter(|(i, _)| !period_idx.contains(i))
            .map(|(i, h)| {
                let v = record.get(i).map(|s| s.trim().to_string()).unwrap_or_default();
                (h.clone(), v)
            })
            .collect();

        let mut values = BTreeMap::new();
        for &(idx, date) in &period_columns {
            let Some(cell) = record.get(idx).map(|s| s.trim()).filter(|s| !is_missing_marker(s)) else {
                continue;
            };
            match parse_value(cell) {
                Some(v) => {
                    values.insert(date, v);
                }
                None => stats.coerced_missing += 1,
            }
        }

        rows.push(CleanRow { entity_id, meta, values });
    }

    stats.rows_kept = rows.len();

    // Critical columns are always carried, even if every cell was blank.
    for row in &mut rows {
        for col in &critical.columns {
            if !row.meta.keys().any(|k| k.eq_ignore_ascii_case(col)) {
                row.meta.insert(col.clone(), String::new());
            }
        }
    }

    let periods = seen_periods.into_iter().collect();
    (CleanTable { id_columns, periods, rows }, stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::ColumnOrigin;
    use chrono::NaiveDate;

    fn critical() -> CriticalColumnSet {
        CriticalColumnSet {
            columns: vec!["RegionID".into(), "RegionName".into()],
            origin: ColumnOrigin::Static,
        }
    }

    #[test]
    fn drops_unkeyed_and_duplicate_rows() {
        let raw = RawSnapshot::from_csv_str(
            "RegionID,RegionName,StateName,2024-02-29,2024-01-31\n\
             1,90001,CA,101,100\n\
             ,,CA,5,5\n\
             ,90003,CA,7,\n\
             1,90001,CA,1,1\n",
        )
        .unwrap();
        let (table, stats) = clean(&raw, &critical());

        assert_eq!(stats.rows_read, 4);
        assert_eq!(stats.rows_kept, 2);
        assert_eq!(stats.dropped_missing_id, 1);
        assert_eq!(stats.dropped_duplicate, 1);

        let jan = NaiveDate::from_ymd_opt(2024, 1, 31).unwrap();
        let feb = NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();
        assert_eq!(table.periods, vec![jan, feb]);
        assert_eq!(table.rows[0].values.get(&jan), Some(&100.0));
        // Falls back to RegionName when RegionID is blank.
        assert_eq!(table.rows[1].entity_id, "90003");
        assert_eq!(table.rows[1].values.len(), 1);
        assert_eq!(table.rows[1].meta("StateName"), Some("CA"));
    }

    #[test]
    fn non_numeric_cells_become_missing() {
        let raw = RawSnapshot::from_csv_str("RegionID,2024-01-31,2024-01-31,2024-02-29\n1,abc,3,NA\n").unwrap();
        let (table, stats) = clean(&raw, &critical());
        assert_eq!(stats.coerced_missing, 1);
        assert_eq!(stats.duplicate_period_headers, 1);
        assert!(table.rows[0].values.is_empty());
        assert!(table.rows[0].meta.contains_key("RegionName"));
    }
}
