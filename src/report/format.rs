//! Formatted terminal output.
//!
//! Formatting lives in one place so the stage engines stay free of
//! presentation concerns and output changes stay localized.

use crate::app::pipeline::PipelineOutput;
use crate::data::SourceRegistry;
use crate::stats::{CapabilitySet, CapabilityStatus, LevelStatistics};

use super::{Movers, rank_movers};

/// Statistic used for the movers table.
const MOVER_STATISTIC: &str = "yoy";
const MOVER_COUNT: usize = 5;

/// Format the run summary: stage statuses, ingest quality, and per-level counts.
pub fn format_run_summary(output: &PipelineOutput) -> String {
    let run = &output.run;
    let summary = &output.ingest.summary;
    let mut out = String::new();

    out.push_str("=== rollup - Market Data Rollup ===\n");
    out.push_str(&format!("Source: {}\n", run.source));
    out.push_str(&format!("Started: {}\n", run.started_at.format("%Y-%m-%d %H:%M:%S UTC")));
    out.push_str(&format!("Overall: {:?} (exit {})\n", run.overall, run.exit_code()));

    out.push_str("\nStages:\n");
    for stage in &run.stages {
        out.push_str(&format!(
            "- {:<10} {:<20} {:>6}ms  {}\n",
            format!("{:?}", stage.stage).to_lowercase(),
            format!("{:?}", stage.status),
            stage.duration_ms,
            stage.details
        ));
    }

    out.push_str("\nIngest:\n");
    out.push_str(&format!(
        "- entities={} periods={} observations={} completeness={:.1}%\n",
        summary.entities, summary.periods, summary.observations, summary.completeness_pct
    ));
    if let (Some(first), Some(last)) = (summary.first_period, summary.last_period) {
        out.push_str(&format!("- periods: {first} .. {last}\n"));
    }
    out.push_str(&format!(
        "- rows: read={} kept={} missing_id={} duplicate={} coerced_missing={}\n",
        summary.clean.rows_read,
        summary.clean.rows_kept,
        summary.clean.dropped_missing_id,
        summary.clean.dropped_duplicate,
        summary.clean.coerced_missing
    ));
    if let Some(set) = &summary.critical_columns {
        out.push_str(&format!(
            "- critical columns ({:?}): {}\n",
            set.origin,
            set.columns.join(", ")
        ));
    }
    if let Some(master) = &summary.master_copy {
        let state = if summary.committed { "committed" } else { "unchanged" };
        out.push_str(&format!("- master copy: {master} ({state})\n"));
    }
    if summary.used_fallback {
        out.push_str("- NOTE: synthetic fallback data, not authoritative\n");
    }
    for warning in &output.ingest.warnings {
        out.push_str(&format!("  ! {warning}\n"));
    }

    if let Some(agg) = &output.aggregation {
        out.push_str("\nAggregation:\n");
        for level in agg.levels.values() {
            out.push_str(&format!(
                "- {:<14} nodes={:<6} unmapped={:<6} conflicting_parents={}\n",
                level.level.display_name(),
                level.nodes.len(),
                level.unmapped,
                level.conflicting_parents
            ));
            if level.non_finite > 0 {
                out.push_str(&format!("  ! {} node periods dropped (non-finite)\n", level.non_finite));
            }
        }
    }

    if !output.statistics.is_empty() {
        out.push_str("\nStatistics:\n");
        for stats in &output.statistics {
            out.push_str(&format_level_statistics(stats));
        }
    }

    out
}

fn format_level_statistics(stats: &LevelStatistics) -> String {
    let mut out = String::new();
    let calculated: usize = stats.entities.iter().map(|e| e.availability.calculated.len()).sum();
    let skipped: usize = stats.entities.iter().map(|e| e.availability.skipped.len()).sum();
    out.push_str(&format!(
        "- {:<14} entities={:<6} calculated={:<8} skipped={}\n",
        stats.level.display_name(),
        stats.entities.len(),
        calculated,
        skipped
    ));
    if !stats.unavailable_families.is_empty() {
        let names: Vec<&str> = stats.unavailable_families.iter().map(|f| f.as_str()).collect();
        out.push_str(&format!("  unavailable: {}\n", names.join(", ")));
    }

    let movers = rank_movers(stats, MOVER_STATISTIC, MOVER_COUNT);
    if !movers.is_empty() {
        out.push_str(&format_movers(&movers));
    }
    out
}

fn format_movers(movers: &Movers) -> String {
    let mut out = String::new();
    for (label, rows) in [("gainers", &movers.gainers), ("decliners", &movers.decliners)] {
        let parts: Vec<String> = rows
            .iter()
            .map(|(name, v)| format!("{} {v:+.2}%", truncate(name, 24)))
            .collect();
        out.push_str(&format!("  {} {label}: {}\n", movers.statistic, parts.join(" | ")));
    }
    out
}

/// Format the registry as one line per source key.
pub fn format_sources(registry: &SourceRegistry) -> String {
    let mut out = String::new();
    out.push_str(&format!("=== Sources ({}) ===\n", registry.len()));
    out.push_str(&format!("{:<56} {:<10} {}\n", "key", "periodic.", "url"));
    out.push_str(&format!("{:-<56} {:-<10} {:-<3}\n", "", "", ""));
    for (key, entry) in registry.iter() {
        out.push_str(
            format!(
                "{:<56} {:<10} {}\n",
                key.to_string(),
                format!("{:?}", entry.periodicity).to_lowercase(),
                entry.url
            )
            .trim_end(),
        );
        out.push('\n');
    }
    out
}

pub fn format_capabilities(capabilities: &CapabilitySet) -> String {
    let mut out = String::new();
    out.push_str("=== Numeric capabilities ===\n");
    for (cap, status) in capabilities.iter() {
        let line = match status {
            CapabilityStatus::Available => "available".to_string(),
            CapabilityStatus::Disabled => "disabled".to_string(),
            CapabilityStatus::FailedSelfCheck { detail } => format!("failed self-check: {detail}"),
        };
        out.push_str(&format!("{:<12} {line}\n", cap.as_str()));
    }
    out
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
    out.push('.');
    out
}
