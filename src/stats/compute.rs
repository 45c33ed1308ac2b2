//! Per-entity statistic families.
//!
//! Each function returns an outcome for every statistic of its family, in
//! catalog order. Capability checks happen in the engine; these functions
//! only decide data sufficiency and definedness.

use chrono::{Months, NaiveDate, TimeDelta};

use crate::domain::Periodicity;
use crate::math::{
    LinearFit, excess_kurtosis, linear_fit, mean, median, median_abs_deviation, percentile, percentile_sorted,
    simple_returns, skewness, sorted, std_dev, variance,
};
use crate::stats::{EntitySeries, Outcome, SkipReason, StatFamily};

/// Minimum non-missing values for anything beyond count/min/max.
pub const MIN_VALUES: usize = 2;

/// One entity's series positioned on its level's period axis.
pub struct SeriesView<'a> {
    pub series: &'a EntitySeries,
    pub axis: &'a [NaiveDate],
    pub periodicity: Periodicity,
    values: Vec<f64>,
}

impl<'a> SeriesView<'a> {
    pub fn new(series: &'a EntitySeries, axis: &'a [NaiveDate], periodicity: Periodicity) -> Self {
        Self {
            series,
            axis,
            periodicity,
            values: series.values(),
        }
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    fn enough(&self) -> Result<(), SkipReason> {
        if self.values.len() < MIN_VALUES {
            Err(SkipReason::InsufficientData)
        } else {
            Ok(())
        }
    }

    fn axis_index(&self, date: NaiveDate) -> Option<usize> {
        self.axis.binary_search(&date).ok()
    }

    fn value_at(&self, date: NaiveDate) -> Option<f64> {
        self.series.points.get(&date).copied()
    }
}

type Named = Vec<(&'static str, Outcome)>;

fn fill(family: StatFamily, reason: SkipReason) -> Named {
    family.statistics().iter().map(|s| (*s, Err(reason))).collect()
}

fn ratio(num: f64, den: f64) -> Outcome {
    if den == 0.0 { Err(SkipReason::Undefined) } else { Ok(num / den) }
}

fn pct_change(current: f64, reference: f64) -> Outcome {
    ratio(current - reference, reference).map(|r| r * 100.0)
}

/// Outcomes for a non-comparative family.
pub fn compute_family(family: StatFamily, view: &SeriesView<'_>) -> Named {
    match family {
        StatFamily::Basic => basic(view),
        StatFamily::Percentiles => percentiles(view),
        StatFamily::Shape => shape(view),
        StatFamily::Volatility => volatility(view),
        StatFamily::Trend => trend(view),
        StatFamily::Momentum => momentum(view),
        StatFamily::PeriodChange => period_change(view),
        StatFamily::MarketHealth => market_health(view),
        StatFamily::Comparative => fill(family, SkipReason::InsufficientData),
    }
}

fn basic(view: &SeriesView<'_>) -> Named {
    let v = view.values();
    let n = v.len();
    let extreme = |pick: fn(f64, f64) -> f64| -> Outcome {
        v.iter().copied().reduce(pick).ok_or(SkipReason::InsufficientData)
    };
    let higher = |x: Option<f64>| -> Outcome {
        view.enough()?;
        x.ok_or(SkipReason::Undefined)
    };
    vec![
        ("count", Ok(n as f64)),
        ("mean", higher(mean(v))),
        ("median", higher(median(v))),
        ("min", extreme(f64::min)),
        ("max", extreme(f64::max)),
        ("std", higher(std_dev(v))),
    ]
}

fn percentiles(view: &SeriesView<'_>) -> Named {
    if view.enough().is_err() {
        return fill(StatFamily::Percentiles, SkipReason::InsufficientData);
    }
    let s = sorted(view.values());
    [("p10", 10.0), ("p25", 25.0), ("p75", 75.0), ("p90", 90.0), ("p95", 95.0), ("p99", 99.0)]
        .into_iter()
        .map(|(name, p)| (name, percentile_sorted(&s, p).ok_or(SkipReason::Undefined)))
        .collect()
}

fn shape(view: &SeriesView<'_>) -> Named {
    if view.enough().is_err() {
        return fill(StatFamily::Shape, SkipReason::InsufficientData);
    }
    let v = view.values();
    vec![
        ("skewness", skewness(v).ok_or(SkipReason::Undefined)),
        ("kurtosis", excess_kurtosis(v).ok_or(SkipReason::Undefined)),
    ]
}

fn volatility(view: &SeriesView<'_>) -> Named {
    if view.enough().is_err() {
        return fill(StatFamily::Volatility, SkipReason::InsufficientData);
    }
    let v = view.values();
    let s = sorted(v);
    let (lo, hi) = (s[0], s[s.len() - 1]);
    let iqr = match (percentile_sorted(&s, 75.0), percentile_sorted(&s, 25.0)) {
        (Some(p75), Some(p25)) => Ok(p75 - p25),
        _ => Err(SkipReason::Undefined),
    };
    let cv = match (std_dev(v), mean(v)) {
        (Some(sd), Some(m)) => ratio(sd, m),
        _ => Err(SkipReason::Undefined),
    };

    let returns = simple_returns(v);
    let var = |p: f64| -> Outcome {
        if returns.is_empty() {
            return Err(SkipReason::InsufficientData);
        }
        percentile(&returns, p).ok_or(SkipReason::Undefined)
    };

    vec![
        ("coefficient_of_variation", cv),
        ("range", Ok(hi - lo)),
        ("interquartile_range", iqr),
        ("mad", median_abs_deviation(v).ok_or(SkipReason::Undefined)),
        ("var_95", var(5.0)),
        ("var_99", var(1.0)),
    ]
}

fn trend(view: &SeriesView<'_>) -> Named {
    if view.enough().is_err() {
        return fill(StatFamily::Trend, SkipReason::InsufficientData);
    }
    let (xs, ys): (Vec<f64>, Vec<f64>) = view
        .series
        .points
        .iter()
        .filter_map(|(d, v)| view.axis_index(*d).map(|i| (i as f64, *v)))
        .unzip();
    match linear_fit(&xs, &ys) {
        Some(fit) => vec![
            ("linear_trend", Ok(fit.slope)),
            ("trend_strength", fit.r_squared.ok_or(SkipReason::Undefined)),
            ("price_efficiency", price_efficiency(&xs, &ys, &fit)),
        ],
        None => fill(StatFamily::Trend, SkipReason::Undefined),
    }
}

/// `1 - mse / var`: how closely the series tracks its own linear trend.
fn price_efficiency(xs: &[f64], ys: &[f64], fit: &LinearFit) -> Outcome {
    if ys.len() < 3 {
        return Err(SkipReason::InsufficientData);
    }
    let var = variance(ys).ok_or(SkipReason::Undefined)?;
    let mse = xs
        .iter()
        .zip(ys)
        .map(|(x, y)| (y - (fit.intercept + fit.slope * x)).powi(2))
        .sum::<f64>()
        / ys.len() as f64;
    ratio(mse, var).map(|r| 1.0 - r)
}

/// Outcomes of a point-in-time family as of `date`, seeing only the
/// observations up to and including it.
///
/// Families that summarise the whole series are `not_meaningful` here.
pub fn compute_family_at(family: StatFamily, view: &SeriesView<'_>, date: NaiveDate) -> Named {
    if !family.is_point_in_time() {
        return fill(family, SkipReason::NotMeaningful);
    }
    let Some(current) = view.value_at(date) else {
        return fill(family, SkipReason::InsufficientData);
    };
    if view.series.points.range(..=date).count() < MIN_VALUES {
        return fill(family, SkipReason::InsufficientData);
    }
    match family {
        StatFamily::Momentum => momentum_at(view, date, current),
        _ => period_change_at(view, date, current),
    }
}

fn at_latest(family: StatFamily, view: &SeriesView<'_>) -> Named {
    match view.series.latest() {
        Some((date, _)) => compute_family_at(family, view, date),
        None => fill(family, SkipReason::InsufficientData),
    }
}

fn momentum(view: &SeriesView<'_>) -> Named {
    at_latest(StatFamily::Momentum, view)
}

fn momentum_at(view: &SeriesView<'_>, date: NaiveDate, current: f64) -> Named {
    [("momentum_3", 3), ("momentum_6", 6), ("momentum_12", 12)]
        .into_iter()
        .map(|(name, k)| (name, lookback_change(view, date, current, k)))
        .collect()
}

/// Percent change from `k` axis periods before `date`.
fn lookback_change(view: &SeriesView<'_>, date: NaiveDate, current: f64, k: usize) -> Outcome {
    let idx = view.axis_index(date).ok_or(SkipReason::InsufficientData)?;
    if idx < k {
        return Err(SkipReason::InsufficientData);
    }
    let reference = view.value_at(view.axis[idx - k]).ok_or(SkipReason::ReferenceMissing)?;
    pct_change(current, reference)
}

fn period_change(view: &SeriesView<'_>) -> Named {
    at_latest(StatFamily::PeriodChange, view)
}

fn period_change_at(view: &SeriesView<'_>, date: NaiveDate, current: f64) -> Named {
    let mom = if view.periodicity.supports_month_over_month() {
        offset_change(view, date, current, 1, 15)
    } else {
        Err(SkipReason::NotMeaningful)
    };
    let qoq = if view.periodicity.supports_quarter_over_quarter() {
        offset_change(view, date, current, 3, 45)
    } else {
        Err(SkipReason::NotMeaningful)
    };
    vec![
        ("pop", lookback_change(view, date, current, 1)),
        ("yoy", offset_change(view, date, current, 12, 45)),
        ("mom", mom),
        ("qoq", qoq),
    ]
}

/// Percent change against the axis period closest to `date - months`,
/// accepted only within `tolerance_days`.
fn offset_change(view: &SeriesView<'_>, date: NaiveDate, current: f64, months: u32, tolerance_days: i64) -> Outcome {
    let target = date
        .checked_sub_months(Months::new(months))
        .ok_or(SkipReason::ReferenceMissing)?;
    let earliest = target
        .checked_sub_signed(TimeDelta::days(tolerance_days))
        .unwrap_or(NaiveDate::MIN);
    let before = &view.axis[..view.axis.partition_point(|d| *d < date)];
    let from = before.partition_point(|d| *d < earliest);
    let reference_date = before[from..]
        .iter()
        .copied()
        .map(|d| (d, (d - target).num_days().abs()))
        .filter(|(_, gap)| *gap <= tolerance_days)
        .min_by_key(|(_, gap)| *gap)
        .map(|(d, _)| d)
        .ok_or(SkipReason::ReferenceMissing)?;
    let reference = view.value_at(reference_date).ok_or(SkipReason::ReferenceMissing)?;
    pct_change(current, reference)
}

fn market_health(view: &SeriesView<'_>) -> Named {
    if view.enough().is_err() {
        return fill(StatFamily::MarketHealth, SkipReason::InsufficientData);
    }
    let v = view.values();
    let n = v.len() as f64;

    let rises = v.windows(2).filter(|w| w[1] > w[0]).count() as f64;
    let positive_change_pct = Ok(rises / (n - 1.0) * 100.0);

    let above_median_pct = median(v)
        .map(|med| v.iter().filter(|x| **x > med).count() as f64 / n * 100.0)
        .ok_or(SkipReason::Undefined);

    let volatility_trend = if v.len() < 4 {
        Err(SkipReason::InsufficientData)
    } else {
        let half = v.len() / 2;
        match (std_dev(&v[..half]), std_dev(&v[half..])) {
            (Some(first), Some(second)) => ratio(second - first, first),
            _ => Err(SkipReason::Undefined),
        }
    };

    let relative_strength = match (view.series.latest(), mean(v)) {
        (Some((_, last)), Some(m)) => ratio(last, m),
        _ => Err(SkipReason::Undefined),
    };

    vec![
        ("positive_change_pct", positive_change_pct),
        ("above_median_pct", above_median_pct),
        ("volatility_trend", volatility_trend),
        ("relative_strength", relative_strength),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn month(y: i32, m: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, 1).unwrap()
    }

    fn axis(n: u32) -> Vec<NaiveDate> {
        (0..n).map(|i| month(2023 + (i / 12) as i32, i % 12 + 1)).collect()
    }

    fn series(points: &[(NaiveDate, f64)]) -> EntitySeries {
        EntitySeries {
            entity_id: "e".into(),
            name: "e".into(),
            points: points.iter().copied().collect::<BTreeMap<_, _>>(),
        }
    }

    fn get(out: &Named, name: &str) -> Outcome {
        out.iter().find(|(n, _)| *n == name).map(|(_, o)| *o).unwrap()
    }

    fn approx(o: Outcome, expected: f64) {
        let v = o.unwrap();
        assert!((v - expected).abs() < 1e-9, "{v} != {expected}");
    }

    #[test]
    fn four_period_scenario() {
        let ax = axis(4);
        let s = series(&[(ax[0], 100.0), (ax[1], 105.0), (ax[2], 110.0), (ax[3], 95.0)]);
        let view = SeriesView::new(&s, &ax, Periodicity::Monthly);

        let b = compute_family(StatFamily::Basic, &view);
        approx(get(&b, "count"), 4.0);
        approx(get(&b, "mean"), 102.5);
        approx(get(&b, "median"), 102.5);
        approx(get(&b, "min"), 95.0);
        approx(get(&b, "max"), 110.0);

        let pc = compute_family(StatFamily::PeriodChange, &view);
        approx(get(&pc, "pop"), (95.0 - 110.0) / 110.0 * 100.0);
        approx(get(&pc, "mom"), (95.0 - 110.0) / 110.0 * 100.0);
        approx(get(&pc, "qoq"), -5.0);
        assert_eq!(get(&pc, "yoy"), Err(SkipReason::ReferenceMissing));

        let t = compute_family(StatFamily::Trend, &view);
        approx(get(&t, "linear_trend"), -1.0);
        approx(get(&t, "price_efficiency"), get(&t, "trend_strength").unwrap());

        let m = compute_family(StatFamily::Momentum, &view);
        approx(get(&m, "momentum_3"), -5.0);
        assert_eq!(get(&m, "momentum_6"), Err(SkipReason::InsufficientData));
    }

    #[test]
    fn single_value_only_gets_count_min_max() {
        let ax = axis(3);
        let s = series(&[(ax[2], 42.0)]);
        let view = SeriesView::new(&s, &ax, Periodicity::Monthly);

        let b = compute_family(StatFamily::Basic, &view);
        approx(get(&b, "count"), 1.0);
        approx(get(&b, "min"), 42.0);
        approx(get(&b, "max"), 42.0);
        assert_eq!(get(&b, "mean"), Err(SkipReason::InsufficientData));
        assert_eq!(get(&b, "std"), Err(SkipReason::InsufficientData));

        for family in [StatFamily::Shape, StatFamily::Volatility, StatFamily::PeriodChange] {
            for (_, outcome) in compute_family(family, &view) {
                assert_eq!(outcome, Err(SkipReason::InsufficientData));
            }
        }
    }

    #[test]
    fn empty_series_has_zero_count_and_no_extremes() {
        let ax = axis(3);
        let s = series(&[]);
        let b = compute_family(StatFamily::Basic, &SeriesView::new(&s, &ax, Periodicity::Monthly));
        approx(get(&b, "count"), 0.0);
        assert_eq!(get(&b, "min"), Err(SkipReason::InsufficientData));
    }

    #[test]
    fn missing_reference_period_is_skipped_not_zero() {
        let ax = axis(13);
        // No value at the year-ago period.
        let s = series(&[(ax[1], 100.0), (ax[11], 110.0), (ax[12], 120.0)]);
        let view = SeriesView::new(&s, &ax, Periodicity::Monthly);
        let pc = compute_family(StatFamily::PeriodChange, &view);
        assert_eq!(get(&pc, "yoy"), Err(SkipReason::ReferenceMissing));
        assert_eq!(get(&pc, "qoq"), Err(SkipReason::ReferenceMissing));
        approx(get(&pc, "pop"), (120.0 - 110.0) / 110.0 * 100.0);

        let with_year_ago = series(&[(ax[0], 100.0), (ax[12], 120.0)]);
        let pc = compute_family(
            StatFamily::PeriodChange,
            &SeriesView::new(&with_year_ago, &ax, Periodicity::Monthly),
        );
        approx(get(&pc, "yoy"), 20.0);
    }

    #[test]
    fn quarterly_data_skips_month_over_month() {
        let ax = vec![month(2023, 1), month(2023, 4), month(2023, 7), month(2023, 10), month(2024, 1)];
        let s = series(&ax.iter().map(|d| (*d, 100.0)).collect::<Vec<_>>());
        let pc = compute_family(StatFamily::PeriodChange, &SeriesView::new(&s, &ax, Periodicity::Quarterly));
        assert_eq!(get(&pc, "mom"), Err(SkipReason::NotMeaningful));
        approx(get(&pc, "qoq"), 0.0);
        approx(get(&pc, "yoy"), 0.0);

        let annual = compute_family(StatFamily::PeriodChange, &SeriesView::new(&s, &ax, Periodicity::Annual));
        assert_eq!(get(&annual, "qoq"), Err(SkipReason::NotMeaningful));
    }

    #[test]
    fn flat_series_has_undefined_shape_and_trend_strength() {
        let ax = axis(4);
        let s = series(&ax.iter().map(|d| (*d, 7.0)).collect::<Vec<_>>());
        let view = SeriesView::new(&s, &ax, Periodicity::Monthly);
        for (_, outcome) in compute_family(StatFamily::Shape, &view) {
            assert_eq!(outcome, Err(SkipReason::Undefined));
        }
        let t = compute_family(StatFamily::Trend, &view);
        assert_eq!(get(&t, "trend_strength"), Err(SkipReason::Undefined));
        assert_eq!(get(&t, "price_efficiency"), Err(SkipReason::Undefined));
        let mh = compute_family(StatFamily::MarketHealth, &view);
        assert_eq!(get(&mh, "volatility_trend"), Err(SkipReason::Undefined));
        approx(get(&mh, "relative_strength"), 1.0);
        approx(get(&mh, "positive_change_pct"), 0.0);
    }

    #[test]
    fn volatility_family_values() {
        let ax = axis(4);
        let s = series(&[(ax[0], 100.0), (ax[1], 110.0), (ax[2], 99.0), (ax[3], 108.9)]);
        let v = compute_family(StatFamily::Volatility, &SeriesView::new(&s, &ax, Periodicity::Monthly));
        approx(get(&v, "range"), 11.0);
        // Returns sorted: -10%, +10%, +10%; interpolated at ranks 0.1 and 0.02.
        approx(get(&v, "var_95"), -0.08);
        approx(get(&v, "var_99"), -0.096);
    }

    #[test]
    fn price_efficiency_needs_three_values() {
        let ax = axis(4);
        let linear = series(&[(ax[0], 100.0), (ax[1], 102.0), (ax[2], 104.0), (ax[3], 106.0)]);
        let t = compute_family(StatFamily::Trend, &SeriesView::new(&linear, &ax, Periodicity::Monthly));
        approx(get(&t, "price_efficiency"), 1.0);

        let two = series(&[(ax[0], 100.0), (ax[1], 102.0)]);
        let t = compute_family(StatFamily::Trend, &SeriesView::new(&two, &ax, Periodicity::Monthly));
        assert_eq!(get(&t, "price_efficiency"), Err(SkipReason::InsufficientData));
        assert!(get(&t, "linear_trend").is_ok());
    }

    #[test]
    fn point_in_time_families_see_only_earlier_periods() {
        let ax = axis(4);
        let s = series(&[(ax[0], 100.0), (ax[1], 105.0), (ax[2], 110.0), (ax[3], 95.0)]);
        let view = SeriesView::new(&s, &ax, Periodicity::Monthly);

        let first = compute_family_at(StatFamily::PeriodChange, &view, ax[0]);
        assert_eq!(get(&first, "pop"), Err(SkipReason::InsufficientData));

        let second = compute_family_at(StatFamily::PeriodChange, &view, ax[1]);
        approx(get(&second, "pop"), 5.0);
        approx(get(&second, "mom"), 5.0);
        assert_eq!(get(&second, "qoq"), Err(SkipReason::ReferenceMissing));

        let third = compute_family_at(StatFamily::Momentum, &view, ax[2]);
        assert_eq!(get(&third, "momentum_3"), Err(SkipReason::InsufficientData));

        // The latest period matches the headline family.
        assert_eq!(
            compute_family_at(StatFamily::PeriodChange, &view, ax[3]),
            compute_family(StatFamily::PeriodChange, &view)
        );
        for (_, outcome) in compute_family_at(StatFamily::Basic, &view, ax[3]) {
            assert_eq!(outcome, Err(SkipReason::NotMeaningful));
        }
    }
}
