//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - loads `.env` and parses CLI arguments
//! - initialises logging
//! - dispatches to the pipeline, ingest-only, or inspection commands
//! - prints the terminal summary and maps a failed run to its exit code

use chrono::Local;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Command, IngestArgs, RunArgs};
use crate::domain::StageStatus;
use crate::error::AppError;
use crate::stats::CapabilitySet;

pub mod pipeline;

/// Entry point for the `rollup` binary.
pub fn run() -> Result<(), AppError> {
    dotenvy::dotenv().ok();

    // `rollup` and `rollup --geography county` behave like `rollup run ...`.
    let argv = rewrite_args(std::env::args().collect());
    let cli = Cli::parse_from(argv);
    init_logging(cli.verbose, cli.quiet);

    match cli.command {
        Command::Run(args) => handle_run(&args),
        Command::Ingest(args) => handle_ingest(&args),
        Command::Sources { registry } => {
            let registry = pipeline::load_registry(registry.as_deref())?;
            println!("{}", crate::report::format_sources(&registry));
            Ok(())
        }
        Command::Capabilities { disable } => {
            println!("{}", crate::report::format_capabilities(&CapabilitySet::detect(&disable)));
            Ok(())
        }
    }
}

fn init_logging(verbose: u8, quiet: bool) {
    let default = match verbose {
        0 if quiet => "error",
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    // Explicit verbosity flags win over the environment.
    let filter = if verbose == 0 && !quiet {
        std::env::var("ROLLUP_LOG")
            .ok()
            .and_then(|v| EnvFilter::try_new(v).ok())
            .or_else(|| EnvFilter::try_from_default_env().ok())
            .unwrap_or_else(|| EnvFilter::new(default))
    } else {
        EnvFilter::new(default)
    };

    // `try_init` so a second call (tests, embedding) is a no-op.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

fn handle_run(args: &RunArgs) -> Result<(), AppError> {
    let config = args.to_config(Local::now().date_naive());
    let output = pipeline::run_from_config(&config)?;
    println!("{}", crate::report::format_run_summary(&output));
    println!(
        "Outputs: {}",
        config.output_dir.join(config.source.slug()).display()
    );
    pipeline::ensure_success(&output.run)
}

fn handle_ingest(args: &IngestArgs) -> Result<(), AppError> {
    let config = args.to_config(Local::now().date_naive());
    let result = pipeline::ingest_from_config(&config)?;
    let summary = &result.summary;

    println!("=== rollup - Ingest ===");
    println!("Source: {}", summary.source);
    println!("Status: {:?}", result.status);
    println!(
        "Entities: {} | periods: {} | completeness: {:.1}%",
        summary.entities, summary.periods, summary.completeness_pct
    );
    if let Some(path) = &result.master_copy_path {
        let note = if config.validate_only { " (validate only, not written)" } else { "" };
        println!("Master copy: {path}{note}");
    }
    if let Some(report) = &summary.continuity {
        println!(
            "Continuity: {} compared over {} periods, {} violation(s)",
            report.compared,
            report.window.len(),
            report.violations.len()
        );
    }
    for warning in &result.warnings {
        println!("  ! {warning}");
    }

    let status = StageStatus::from(result.status);
    if status.is_ok() {
        Ok(())
    } else {
        Err(AppError::new(
            status.exit_code(),
            format!(
                "Ingest finished with status {:?}: {}",
                result.status,
                result.error.as_deref().unwrap_or("")
            ),
        ))
    }
}

/// Rewrite argv so `rollup` defaults to `rollup run`.
///
/// Rules:
/// - `rollup`                     -> `rollup run`
/// - `rollup --geography zip ...` -> `rollup run --geography zip ...`
/// - `rollup --help/--version/-h` -> unchanged (show top-level help/version)
fn rewrite_args(mut argv: Vec<String>) -> Vec<String> {
    let Some(arg1) = argv.get(1).cloned() else {
        argv.push("run".to_string());
        return argv;
    };

    let is_top_level_help_or_version = matches!(arg1.as_str(), "-h" | "--help" | "-V" | "--version" | "help");
    if is_top_level_help_or_version {
        return argv;
    }

    // Global flags may precede an explicit subcommand.
    let leading_globals = argv[1..]
        .iter()
        .take_while(|a| matches!(a.as_str(), "-v" | "-vv" | "-vvv" | "--verbose" | "-q" | "--quiet"))
        .count();
    let is_subcommand = argv
        .get(1 + leading_globals)
        .is_some_and(|a| matches!(a.as_str(), "run" | "ingest" | "sources" | "capabilities"));
    if is_subcommand {
        return argv;
    }

    // If the first token is a flag, treat it as "run flags".
    if arg1.starts_with('-') {
        argv.insert(1, "run".to_string());
    }
    argv
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(args: &[&str]) -> Vec<String> {
        args.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn bare_invocation_runs_the_pipeline() {
        assert_eq!(rewrite_args(argv(&["rollup"])), argv(&["rollup", "run"]));
        assert_eq!(
            rewrite_args(argv(&["rollup", "--geography", "county"])),
            argv(&["rollup", "run", "--geography", "county"])
        );
    }

    #[test]
    fn explicit_subcommands_and_help_are_untouched() {
        for args in [
            &["rollup", "sources"][..],
            &["rollup", "--help"][..],
            &["rollup", "-v", "ingest"][..],
            &["rollup", "ingest", "--no-fallback"][..],
        ] {
            assert_eq!(rewrite_args(argv(args)), argv(args));
        }
        assert_eq!(rewrite_args(argv(&["rollup", "-v"])), argv(&["rollup", "run", "-v"]));
    }
}
