//! Statistic catalog: every statistic name, grouped into families.

use serde::{Deserialize, Serialize};

use crate::domain::Capability;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatFamily {
    Basic,
    Percentiles,
    Shape,
    Volatility,
    Trend,
    Momentum,
    PeriodChange,
    MarketHealth,
    /// Needs every entity of the level; computed in a second pass.
    Comparative,
}

impl StatFamily {
    pub const ALL: [StatFamily; 9] = [
        StatFamily::Basic,
        StatFamily::Percentiles,
        StatFamily::Shape,
        StatFamily::Volatility,
        StatFamily::Trend,
        StatFamily::Momentum,
        StatFamily::PeriodChange,
        StatFamily::MarketHealth,
        StatFamily::Comparative,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            StatFamily::Basic => "basic",
            StatFamily::Percentiles => "percentiles",
            StatFamily::Shape => "shape",
            StatFamily::Volatility => "volatility",
            StatFamily::Trend => "trend",
            StatFamily::Momentum => "momentum",
            StatFamily::PeriodChange => "period_change",
            StatFamily::MarketHealth => "market_health",
            StatFamily::Comparative => "comparative",
        }
    }

    /// Numeric capability the whole family depends on.
    pub fn requires(self) -> Option<Capability> {
        match self {
            StatFamily::Shape => Some(Capability::Moments),
            StatFamily::Trend => Some(Capability::Regression),
            StatFamily::Percentiles | StatFamily::Volatility => Some(Capability::Quantiles),
            _ => None,
        }
    }

    pub fn statistics(self) -> &'static [&'static str] {
        match self {
            StatFamily::Basic => &["count", "mean", "median", "min", "max", "std"],
            StatFamily::Percentiles => &["p10", "p25", "p75", "p90", "p95", "p99"],
            StatFamily::Shape => &["skewness", "kurtosis"],
            StatFamily::Volatility => &[
                "coefficient_of_variation",
                "range",
                "interquartile_range",
                "mad",
                "var_95",
                "var_99",
            ],
            StatFamily::Trend => &["linear_trend", "trend_strength", "price_efficiency"],
            StatFamily::Momentum => &["momentum_3", "momentum_6", "momentum_12"],
            StatFamily::PeriodChange => &["pop", "yoy", "mom", "qoq"],
            StatFamily::MarketHealth => &[
                "positive_change_pct",
                "above_median_pct",
                "volatility_trend",
                "relative_strength",
            ],
            StatFamily::Comparative => &["percentile_rank", "z_score"],
        }
    }

    /// Families evaluated at a single period; they also get a per-period history.
    pub fn is_point_in_time(self) -> bool {
        matches!(self, StatFamily::Momentum | StatFamily::PeriodChange)
    }

    pub fn parse(name: &str) -> Option<StatFamily> {
        StatFamily::ALL.into_iter().find(|f| f.as_str() == name)
    }
}

pub fn family_of(statistic: &str) -> Option<StatFamily> {
    StatFamily::ALL
        .into_iter()
        .find(|f| f.statistics().contains(&statistic))
}

/// One-line description of a statistic, for run metadata.
pub fn description(statistic: &str) -> Option<&'static str> {
    let text = match statistic {
        "count" => "Number of non-missing values",
        "mean" => "Arithmetic mean",
        "median" => "Median value",
        "min" => "Minimum value",
        "max" => "Maximum value",
        "std" => "Population standard deviation",
        "p10" => "10th percentile",
        "p25" => "25th percentile",
        "p75" => "75th percentile",
        "p90" => "90th percentile",
        "p95" => "95th percentile",
        "p99" => "99th percentile",
        "skewness" => "Sample skewness",
        "kurtosis" => "Excess kurtosis",
        "coefficient_of_variation" => "Standard deviation over mean",
        "range" => "Maximum minus minimum",
        "interquartile_range" => "75th minus 25th percentile",
        "mad" => "Median absolute deviation",
        "var_95" => "5th percentile of period returns (value at risk, 95%)",
        "var_99" => "1st percentile of period returns (value at risk, 99%)",
        "linear_trend" => "Least-squares slope per period",
        "trend_strength" => "R-squared of the linear trend",
        "price_efficiency" => "One minus trend residual MSE over variance",
        "momentum_3" => "Percent change over 3 periods",
        "momentum_6" => "Percent change over 6 periods",
        "momentum_12" => "Percent change over 12 periods",
        "pop" => "Percent change from the previous period",
        "yoy" => "Percent change from the same period a year earlier",
        "mom" => "Percent change from the previous month",
        "qoq" => "Percent change from the previous quarter",
        "positive_change_pct" => "Share of period-over-period increases",
        "above_median_pct" => "Share of values above the series median",
        "volatility_trend" => "Relative change in volatility between halves",
        "relative_strength" => "Latest value over the series mean",
        "percentile_rank" => "Percentile of the latest value within the level",
        "z_score" => "Standard score of the latest value within the level",
        _ => return None,
    };
    Some(text)
}

/// Every statistic, in catalog order.
pub fn all_statistics() -> Vec<&'static str> {
    StatFamily::ALL
        .iter()
        .flat_map(|f| f.statistics().iter().copied())
        .collect()
}

/// Expand requested statistic and family names into catalog order.
///
/// An empty request means everything; unknown names are an error.
pub fn resolve_requested(names: &[String]) -> Result<Vec<&'static str>, String> {
    if names.is_empty() {
        return Ok(all_statistics());
    }

    let mut wanted = Vec::new();
    for raw in names {
        let name = raw.trim().to_ascii_lowercase();
        if let Some(family) = StatFamily::parse(&name) {
            wanted.extend_from_slice(family.statistics());
            continue;
        }
        match all_statistics().into_iter().find(|s| *s == name) {
            Some(stat) => wanted.push(stat),
            None => return Err(format!("Unknown statistic or family '{raw}'.")),
        }
    }

    Ok(all_statistics()
        .into_iter()
        .filter(|s| wanted.contains(s))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_unique_and_mapped() {
        let all = all_statistics();
        for s in &all {
            assert_eq!(all.iter().filter(|x| *x == s).count(), 1, "{s}");
            assert!(family_of(s).is_some());
        }
        assert_eq!(family_of("kurtosis"), Some(StatFamily::Shape));
        assert_eq!(StatFamily::Shape.requires(), Some(Capability::Moments));
        assert_eq!(family_of("price_efficiency"), Some(StatFamily::Trend));
    }

    #[test]
    fn every_statistic_is_described() {
        for s in all_statistics() {
            assert!(description(s).is_some_and(|d| !d.is_empty()), "{s}");
        }
        assert_eq!(description("sharpe"), None);
    }

    #[test]
    fn resolves_families_and_names_in_catalog_order() {
        let got = resolve_requested(&["pop".into(), "Basic".into(), "count".into()]).unwrap();
        assert_eq!(got, vec!["count", "mean", "median", "min", "max", "std", "pop"]);
        assert!(resolve_requested(&["sharpe".into()]).is_err());
        assert_eq!(resolve_requested(&[]).unwrap().len(), all_statistics().len());
    }
}
