//! Continuity check between the master copy and a freshly cleaned table.
//!
//! Only the most recent `window` periods present in both are compared; older
//! history may be revised freely. Periods or entities that appear only in
//! the new table are never violations.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::domain::{CleanTable, ContinuityPolicy};
use crate::io::MasterCopy;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContinuityViolation {
    pub entity_id: String,
    pub period: NaiveDate,
    pub old: f64,
    pub new: f64,
    pub relative_delta: f64,
}

impl std::fmt::Display for ContinuityViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} @ {}: {} -> {} ({:+.2}%)",
            self.entity_id,
            self.period,
            self.old,
            self.new,
            self.relative_delta * 100.0
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContinuityReport {
    /// Periods that were compared, ascending.
    pub window: Vec<NaiveDate>,
    /// Number of (entity, period) pairs compared.
    pub compared: usize,
    pub violations: Vec<ContinuityViolation>,
}

impl ContinuityReport {
    pub fn is_clean(&self) -> bool {
        self.violations.is_empty()
    }
}

/// `|new - old| / max(|old|, epsilon)`.
pub fn relative_change(old: f64, new: f64, epsilon: f64) -> f64 {
    (new - old).abs() / old.abs().max(epsilon)
}

pub fn check_continuity(master: &MasterCopy, table: &CleanTable, policy: &ContinuityPolicy) -> ContinuityReport {
    let mut shared: Vec<NaiveDate> = table
        .periods
        .iter()
        .copied()
        .filter(|p| master.periods.binary_search(p).is_ok())
        .collect();
    shared.sort();
    let start = shared.len().saturating_sub(policy.window);
    let window = shared.split_off(start);

    let mut report = ContinuityReport {
        window,
        ..ContinuityReport::default()
    };

    for row in &table.rows {
        let Some(old_row) = master.rows.get(&row.entity_id) else {
            continue;
        };
        for period in &report.window {
            let (Some(&old), Some(&new)) = (old_row.values.get(period), row.values.get(period)) else {
                continue;
            };
            report.compared += 1;
            let delta = relative_change(old, new, policy.epsilon);
            if delta > policy.tolerance {
                report.violations.push(ContinuityViolation {
                    entity_id: row.entity_id.clone(),
                    period: *period,
                    old,
                    new,
                    relative_delta: delta,
                });
            }
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CleanRow, Geography, SourceKey};
    use chrono::Utc;
    use std::collections::BTreeMap;

    fn month(y: i32, m: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, 1).unwrap()
    }

    fn table(rows: &[(&str, Vec<(NaiveDate, f64)>)]) -> CleanTable {
        let mut periods: Vec<NaiveDate> = rows.iter().flat_map(|(_, v)| v.iter().map(|(d, _)| *d)).collect();
        periods.sort();
        periods.dedup();
        CleanTable {
            id_columns: vec!["RegionID".into()],
            periods,
            rows: rows
                .iter()
                .map(|(id, v)| CleanRow {
                    entity_id: id.to_string(),
                    meta: BTreeMap::new(),
                    values: v.iter().copied().collect(),
                })
                .collect(),
        }
    }

    fn master(t: &CleanTable) -> MasterCopy {
        let key = SourceKey::new("zillow", "zhvi", "all_homes", Geography::Zip);
        MasterCopy::from_table(&key, t, Utc::now())
    }

    fn months(y: i32, from: u32, to: u32, value: f64) -> Vec<(NaiveDate, f64)> {
        (from..=to).map(|m| (month(y, m), value)).collect()
    }

    #[test]
    fn change_inside_window_beyond_tolerance_is_violation() {
        let old = master(&table(&[("12345", months(2024, 1, 6, 500_000.0))]));
        let mut values = months(2024, 1, 6, 500_000.0);
        values[0].1 = 510_000.0;
        let new = table(&[("12345", values)]);

        let report = check_continuity(&old, &new, &ContinuityPolicy::default());
        assert_eq!(report.violations.len(), 1);
        let v = &report.violations[0];
        assert_eq!(v.entity_id, "12345");
        assert_eq!(v.period, month(2024, 1));
        assert!((v.relative_delta - 0.02).abs() < 1e-12);
    }

    #[test]
    fn new_periods_and_old_history_are_not_checked() {
        // 24 months of history; window covers the last 12 shared periods.
        let mut history = months(2022, 1, 12, 100.0);
        history.extend(months(2023, 1, 12, 100.0));
        let old = master(&table(&[("1", history.clone())]));

        let mut revised = history;
        revised[0].1 = 150.0; // 2022-01, outside the window
        revised.push((month(2024, 1), 900.0)); // new period
        let new = table(&[("1", revised), ("2", months(2023, 1, 12, 5.0))]);

        let report = check_continuity(&old, &new, &ContinuityPolicy::default());
        assert!(report.is_clean());
        assert_eq!(report.window.first(), Some(&month(2023, 1)));
        assert_eq!(report.window.len(), 12);
        assert_eq!(report.compared, 12);
    }

    #[test]
    fn change_at_tolerance_is_accepted() {
        let old = master(&table(&[("1", vec![(month(2024, 1), 100.0)])]));
        let new = table(&[("1", vec![(month(2024, 1), 101.0)])]);
        assert!(check_continuity(&old, &new, &ContinuityPolicy::default()).is_clean());

        let zero = master(&table(&[("1", vec![(month(2024, 1), 0.0)])]));
        let moved = table(&[("1", vec![(month(2024, 1), 0.001)])]);
        assert_eq!(check_continuity(&zero, &moved, &ContinuityPolicy::default()).violations.len(), 1);
    }
}
