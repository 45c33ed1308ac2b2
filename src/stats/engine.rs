//! Statistics engine: per-entity families in parallel, then the
//! level-wide comparative pass.

use chrono::NaiveDate;
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::domain::{GeoLevel, Periodicity};
use crate::math::std_dev;
use crate::stats::{
    AvailabilityReport, CapabilitySet, EntitySeries, EntityStatistics, LevelStatistics, MIN_VALUES, Outcome,
    PeriodStatistics, SeriesView, SkipReason, StatFamily, StatisticsRecord, compute_family, compute_family_at,
    family_of,
};

pub struct StatisticsEngine {
    capabilities: CapabilitySet,
    requested: Vec<&'static str>,
    periodicity: Periodicity,
}

impl StatisticsEngine {
    pub fn new(capabilities: CapabilitySet, requested: Vec<&'static str>, periodicity: Periodicity) -> Self {
        Self {
            capabilities,
            requested,
            periodicity,
        }
    }

    /// Requested families whose capability is unavailable.
    pub fn unavailable_families(&self) -> Vec<StatFamily> {
        self.requested_families()
            .into_iter()
            .filter(|f| !self.family_available(*f))
            .collect()
    }

    fn family_available(&self, family: StatFamily) -> bool {
        family.requires().is_none_or(|cap| self.capabilities.is_available(cap))
    }

    fn requested_families(&self) -> Vec<StatFamily> {
        StatFamily::ALL
            .into_iter()
            .filter(|f| f.statistics().iter().any(|s| self.requested.contains(s)))
            .collect()
    }

    /// Everything except the comparative family for one entity.
    ///
    /// Comparative statistics need the whole level; `calculate_level` fills
    /// them in. Here they are left skipped as insufficient data.
    pub fn calculate(&self, series: &EntitySeries, axis: &[NaiveDate], level: GeoLevel) -> EntityStatistics {
        let view = SeriesView::new(series, axis, self.periodicity);
        let mut record = StatisticsRecord {
            entity_id: series.entity_id.clone(),
            level,
            values: Default::default(),
        };
        let mut availability = AvailabilityReport::new(&self.requested);

        for family in self.requested_families() {
            let outcomes = if self.family_available(family) {
                compute_family(family, &view)
            } else {
                family
                    .statistics()
                    .iter()
                    .map(|s| (*s, Err(SkipReason::DependencyUnavailable)))
                    .collect()
            };
            for (name, outcome) in outcomes {
                if self.requested.contains(&name) {
                    availability.settle(&mut record, name, outcome);
                }
            }
        }

        EntityStatistics {
            entity_id: series.entity_id.clone(),
            name: series.name.clone(),
            as_of: series.latest().map(|(d, _)| d),
            record,
            availability,
            history: self.history(&view),
        }
    }

    /// Point-in-time families evaluated at each observed period.
    fn history(&self, view: &SeriesView<'_>) -> Vec<PeriodStatistics> {
        let families: Vec<StatFamily> = self
            .requested_families()
            .into_iter()
            .filter(|f| f.is_point_in_time() && self.family_available(*f))
            .collect();
        if families.is_empty() {
            return Vec::new();
        }

        view.series
            .points
            .keys()
            .map(|&date| {
                let mut period = PeriodStatistics::new(date);
                for family in &families {
                    for (name, outcome) in compute_family_at(*family, view, date) {
                        if self.requested.contains(&name) {
                            period.settle(name, outcome);
                        }
                    }
                }
                period
            })
            .collect()
    }

    pub fn calculate_level(&self, level: GeoLevel, axis: &[NaiveDate], series: &[EntitySeries]) -> LevelStatistics {
        let unavailable = self.unavailable_families();
        for family in &unavailable {
            warn!(
                level = level.as_str(),
                family = family.as_str(),
                "statistic family unavailable; its statistics are skipped"
            );
        }

        let mut entities: Vec<EntityStatistics> = series
            .par_iter()
            .map(|s| self.calculate(s, axis, level))
            .collect();

        if self.wants(StatFamily::Comparative) {
            comparative_pass(series, &mut entities, &self.requested);
        }

        let mut out = LevelStatistics {
            level,
            requested: self.requested.iter().map(|s| s.to_string()).collect(),
            unavailable_families: unavailable,
            skip_counts: Default::default(),
            entities,
        };
        out.tally_skips();

        let calculated: usize = out.entities.iter().map(|e| e.availability.calculated.len()).sum();
        info!(
            level = level.as_str(),
            entities = out.entities.len(),
            calculated,
            "statistics complete"
        );
        for (name, reasons) in &out.skip_counts {
            debug!(level = level.as_str(), statistic = %name, ?reasons, "statistic skipped");
        }
        out
    }

    fn wants(&self, family: StatFamily) -> bool {
        self.requested.iter().any(|s| family_of(s) == Some(family))
    }
}

/// Percentile rank and z-score of each entity's latest value among the
/// latest values of every entity on the level.
fn comparative_pass(series: &[EntitySeries], entities: &mut [EntityStatistics], requested: &[&'static str]) {
    let population: Vec<f64> = series.iter().filter_map(|s| s.latest().map(|(_, v)| v)).collect();
    let spread = std_dev(&population);
    let mean = crate::math::mean(&population);

    for (s, entity) in series.iter().zip(entities.iter_mut()) {
        let latest = s.latest().map(|(_, v)| v);
        let sufficient = s.points.len() >= MIN_VALUES && population.len() >= MIN_VALUES;

        let rank: Outcome = match latest {
            Some(x) if sufficient => {
                let below = population.iter().filter(|v| **v <= x).count();
                Ok(100.0 * below as f64 / population.len() as f64)
            }
            _ => Err(SkipReason::InsufficientData),
        };
        let z: Outcome = match (latest, mean, spread) {
            (Some(x), Some(m), Some(sd)) if sufficient => {
                if sd == 0.0 {
                    Err(SkipReason::Undefined)
                } else {
                    Ok((x - m) / sd)
                }
            }
            _ => Err(SkipReason::InsufficientData),
        };

        for (name, outcome) in [("percentile_rank", rank), ("z_score", z)] {
            if requested.contains(&name) {
                entity.availability.settle(&mut entity.record, name, outcome);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::domain::Capability;
    use crate::stats::all_statistics;

    fn axis(n: u32) -> Vec<NaiveDate> {
        (1..=n).map(|m| NaiveDate::from_ymd_opt(2024, m, 1).unwrap()).collect()
    }

    fn series(id: &str, axis: &[NaiveDate], values: &[f64]) -> EntitySeries {
        EntitySeries {
            entity_id: id.into(),
            name: id.into(),
            points: axis.iter().copied().zip(values.iter().copied()).collect::<BTreeMap<_, _>>(),
        }
    }

    fn engine(disabled: &[Capability]) -> StatisticsEngine {
        StatisticsEngine::new(CapabilitySet::detect(disabled), all_statistics(), Periodicity::Monthly)
    }

    #[test]
    fn every_entity_accounts_for_every_requested_statistic() {
        let ax = axis(4);
        let level = engine(&[]).calculate_level(
            GeoLevel::State,
            &ax,
            &[
                series("CA", &ax, &[100.0, 105.0, 110.0, 95.0]),
                series("NY", &ax, &[200.0, 210.0, 190.0, 220.0]),
                series("TX", &ax[3..], &[50.0]),
            ],
        );
        for e in &level.entities {
            assert!(e.availability.is_consistent_with(&e.record), "{}", e.entity_id);
            assert_eq!(e.availability.requested.len(), all_statistics().len());
        }

        let ca = level.entity("CA").unwrap();
        assert_eq!(ca.record.values["count"], 4.0);
        assert_eq!(ca.record.values["mean"], 102.5);
        assert_eq!(ca.record.values["max"], 110.0);

        let tx = level.entity("TX").unwrap();
        assert_eq!(tx.record.values["count"], 1.0);
        assert_eq!(tx.availability.skipped["mean"], SkipReason::InsufficientData);
        assert_eq!(tx.availability.skipped["z_score"], SkipReason::InsufficientData);
        assert_eq!(level.skip_counts["mean"][&SkipReason::InsufficientData], 1);
    }

    #[test]
    fn unavailable_capability_only_skips_its_family() {
        let ax = axis(6);
        let level = engine(&[Capability::Moments]).calculate_level(
            GeoLevel::Zip,
            &ax,
            &[series("90210", &ax, &[1.0, 2.0, 4.0, 3.0, 5.0, 8.0])],
        );
        assert_eq!(level.unavailable_families, vec![StatFamily::Shape]);
        let e = &level.entities[0];
        assert_eq!(e.availability.skipped["skewness"], SkipReason::DependencyUnavailable);
        assert_eq!(e.availability.skipped["kurtosis"], SkipReason::DependencyUnavailable);
        for name in ["mean", "p90", "linear_trend", "pop", "momentum_3"] {
            assert!(e.availability.calculated.contains(name), "{name}");
        }
    }

    #[test]
    fn dependency_check_precedes_data_check() {
        let ax = axis(1);
        let level = engine(&[Capability::Regression]).calculate_level(GeoLevel::Zip, &ax, &[series("1", &ax, &[3.0])]);
        let e = &level.entities[0];
        assert_eq!(e.availability.skipped["linear_trend"], SkipReason::DependencyUnavailable);
        assert_eq!(e.availability.skipped["std"], SkipReason::InsufficientData);
    }

    #[test]
    fn highest_latest_value_ranks_at_one_hundred() {
        let ax = axis(3);
        let level = engine(&[]).calculate_level(
            GeoLevel::County,
            &ax,
            &[
                series("a", &ax, &[1.0, 2.0, 3.0]),
                series("b", &ax, &[4.0, 5.0, 6.0]),
                series("c", &ax, &[7.0, 8.0, 9.0]),
            ],
        );
        assert_eq!(level.entity("c").unwrap().record.values["percentile_rank"], 100.0);
        assert!((level.entity("a").unwrap().record.values["percentile_rank"] - 100.0 / 3.0).abs() < 1e-9);
        assert!(level.entity("b").unwrap().record.values["z_score"].abs() < 1e-12);
    }

    #[test]
    fn only_requested_statistics_are_reported() {
        let ax = axis(3);
        let e = StatisticsEngine::new(CapabilitySet::detect(&[]), vec!["mean", "z_score"], Periodicity::Monthly);
        let level = e.calculate_level(
            GeoLevel::County,
            &ax,
            &[series("m1", &ax, &[1.0, 2.0, 3.0]), series("m2", &ax, &[2.0, 2.0, 2.0])],
        );
        for ent in &level.entities {
            let mut names: Vec<_> = ent.record.values.keys().cloned().collect();
            names.sort();
            assert_eq!(names, vec!["mean".to_string(), "z_score".to_string()]);
        }
    }

    #[test]
    fn history_tracks_point_in_time_statistics() {
        let ax = axis(4);
        let level = engine(&[]).calculate_level(
            GeoLevel::State,
            &ax,
            &[series("CA", &ax, &[100.0, 105.0, 110.0, 95.0])],
        );
        let ca = level.entity("CA").unwrap();
        assert_eq!(ca.as_of, Some(ax[3]));
        assert_eq!(ca.history.len(), 4);
        assert_eq!(ca.history[0].skipped["pop"], SkipReason::InsufficientData);
        assert!((ca.history[1].values["pop"] - 5.0).abs() < 1e-9);
        assert!(!ca.history[1].values.contains_key("mean"));

        let last = ca.history.last().unwrap();
        assert_eq!(last.period, ax[3]);
        assert_eq!(last.values["pop"], ca.record.values["pop"]);
        assert_eq!(last.skipped["yoy"], ca.availability.skipped["yoy"]);

        let only_mean = StatisticsEngine::new(CapabilitySet::detect(&[]), vec!["mean"], Periodicity::Monthly);
        let e = only_mean.calculate(&series("CA", &ax, &[1.0, 2.0, 3.0, 4.0]), &ax, GeoLevel::State);
        assert!(e.history.is_empty());
    }
}
