//! Reporting utilities: movers rankings and formatted terminal output.

pub mod format;

pub use format::*;

use crate::stats::LevelStatistics;

/// Top and bottom entities of a level by one statistic.
#[derive(Debug, Clone, PartialEq)]
pub struct Movers {
    pub statistic: String,
    /// `(name, value)`, largest first.
    pub gainers: Vec<(String, f64)>,
    /// `(name, value)`, smallest first.
    pub decliners: Vec<(String, f64)>,
}

impl Movers {
    pub fn is_empty(&self) -> bool {
        self.gainers.is_empty() && self.decliners.is_empty()
    }
}

/// Rank entities by `statistic`, skipping entities where it was not calculated.
pub fn rank_movers(stats: &LevelStatistics, statistic: &str, top_n: usize) -> Movers {
    let mut values: Vec<(String, f64)> = stats
        .entities
        .iter()
        .filter_map(|e| e.record.values.get(statistic).map(|v| (e.name.clone(), *v)))
        .collect();
    values.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

    let gainers: Vec<(String, f64)> = values.iter().take(top_n).cloned().collect();
    let decliners: Vec<(String, f64)> = values.iter().rev().take(top_n).cloned().collect();

    Movers {
        statistic: statistic.to_string(),
        gainers,
        decliners,
    }
}
