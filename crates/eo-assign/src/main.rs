//! eo-assign - Element Occurrence assignment for bulk loads
//!
//! Usage:
//!   eo-assign assign --observations obs.csv --policy lu_separation.csv --output out.csv
//!   eo-assign summary --input out.csv

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use eo_assign::{
    default_config_path, load_config, read_assignments, read_observations, read_policy,
    read_references, write_assignments, write_errors, Config,
};
use eo_core::{
    summarize, summarize_rows, Assigner, Footprint, PlanarEngine, ReferenceRecord, SpeciesSummary,
};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "eo-assign")]
#[command(about = "Assign Element Occurrence and Source Feature identities to observations")]
#[command(version)]
struct Cli {
    /// Show debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Cluster observations into EOs and SFs and write the assignment table
    Assign {
        /// Observation CSV (row_key,species,geometry[,EO_ID,EO_NEW,SF_ID,SF_NEW])
        #[arg(long)]
        observations: PathBuf,
        /// Authoritative EO records (id,species,geometry)
        #[arg(long)]
        eo_references: Option<PathBuf>,
        /// Authoritative SF records (id,species,geometry)
        #[arg(long)]
        sf_references: Option<PathBuf>,
        /// Species separation table
        #[arg(long)]
        policy: PathBuf,
        /// Config file (defaults to the user config directory)
        #[arg(long)]
        config: Option<PathBuf>,
        /// Output CSV of assigned observations
        #[arg(short, long)]
        output: PathBuf,
        /// CSV report of observations that could not be assigned
        #[arg(long)]
        errors: Option<PathBuf>,
        /// Print per-species counts after assigning
        #[arg(long)]
        summary: bool,
        /// Print the run summary as JSON
        #[arg(long)]
        json: bool,
    },
    /// Per-species EO/SF counts of an assigned output file
    Summary {
        /// Output CSV written by `assign`
        #[arg(long)]
        input: PathBuf,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

struct AssignArgs {
    observations: PathBuf,
    eo_references: Option<PathBuf>,
    sf_references: Option<PathBuf>,
    policy: PathBuf,
    config: Option<PathBuf>,
    output: PathBuf,
    errors: Option<PathBuf>,
    summary: bool,
    json: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()),
        )
        .init();

    match cli.command {
        Commands::Assign {
            observations,
            eo_references,
            sf_references,
            policy,
            config,
            output,
            errors,
            summary,
            json,
        } => cmd_assign(AssignArgs {
            observations,
            eo_references,
            sf_references,
            policy,
            config,
            output,
            errors,
            summary,
            json,
        }),
        Commands::Summary { input, json } => cmd_summary(&input, json),
    }
}

fn resolve_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => {
            if !path.exists() {
                anyhow::bail!("Config file not found: {}", path.display());
            }
            load_config(path)
        }
        None => load_config(&default_config_path()?),
    }
}

fn read_optional_references(path: Option<&Path>) -> Result<Vec<ReferenceRecord<Footprint>>> {
    match path {
        Some(path) => read_references(path),
        None => Ok(Vec::new()),
    }
}

fn cmd_assign(args: AssignArgs) -> Result<()> {
    let config = resolve_config(args.config.as_deref())?;
    let settings = config.engine_settings();

    let observations = read_observations(&args.observations)?;
    let eo_references = read_optional_references(args.eo_references.as_deref())?;
    let sf_references = read_optional_references(args.sf_references.as_deref())?;
    let policy = read_policy(
        &args.policy,
        &config.policy_columns(),
        settings.units_per_km,
        settings.sf_distance,
    )?;
    let mut tokens = config.token_source()?;

    let engine = PlanarEngine::new();
    let assigner = Assigner::new(&engine, settings);
    let report = assigner
        .run(
            &observations,
            &eo_references,
            &sf_references,
            &policy,
            tokens.as_mut(),
        )
        .context("Assignment run failed")?;

    let written = write_assignments(&args.output, &observations, &report)?;
    if let Some(path) = &args.errors {
        write_errors(path, &report)?;
    }

    let summaries = summarize(&report);
    if args.json {
        let out = serde_json::json!({
            "observations": observations.len(),
            "assigned": report.observations.len(),
            "rows_written": written,
            "errors": report.error_count(),
            "eo_clusters": report.eo.clusters,
            "sf_clusters": report.sf.clusters,
            "skipped": report.eo.skipped(),
            "tokens_issued": tokens.issued(),
            "species": summaries,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!("{}", "Assignment complete!".green().bold());
    println!("  Observations:  {}", observations.len());
    println!(
        "  Assigned:      {}",
        report.observations.len().to_string().green()
    );
    println!(
        "  EO clusters:   {} ({} already assigned)",
        report.eo.clusters.to_string().cyan(),
        report.eo.skipped()
    );
    println!("  SF clusters:   {}", report.sf.clusters.to_string().cyan());
    if report.error_count() > 0 {
        println!("  Errors:        {}", report.error_count().to_string().red());
        match &args.errors {
            Some(path) => println!("  {}", format!("See {}", path.display()).dimmed()),
            None => {
                for err in report.errors().take(10) {
                    println!("    {} {}", "-".red(), err);
                }
                println!("  {}", "Use --errors <file> for the full report".dimmed());
            }
        }
    }
    println!("  Output:        {} ({} rows)", args.output.display(), written);

    if args.summary {
        println!();
        print_summaries(&summaries);
    }
    Ok(())
}

fn cmd_summary(input: &Path, json: bool) -> Result<()> {
    let rows = read_assignments(input)?;
    let summaries = summarize_rows(
        rows.iter().filter_map(|r| match (&r.eo, &r.sf) {
            (Some(eo), Some(sf)) => Some((r.species.as_str(), eo, sf)),
            _ => None,
        }),
        rows.iter()
            .filter(|r| !r.is_assigned())
            .map(|r| (r.species.as_str(), r.row_key)),
    );

    if json {
        println!("{}", serde_json::to_string_pretty(&summaries)?);
        return Ok(());
    }
    print_summaries(&summaries);
    Ok(())
}

fn print_summaries(summaries: &[SpeciesSummary]) {
    println!("{}", "Species Summary".cyan().bold());
    println!("{}", "─".repeat(72).dimmed());
    println!(
        "{:<36} {:>8} {:>6} {:>6} {:>6} {:>6}",
        "Species".white().bold(),
        "Obs",
        "EOs",
        "New",
        "SFs",
        "Failed"
    );
    for s in summaries {
        let failed = if s.failed > 0 {
            s.failed.to_string().red()
        } else {
            s.failed.to_string().normal()
        };
        println!(
            "{:<36} {:>8} {:>6} {:>6} {:>6} {:>6}",
            s.species, s.observations, s.occurrences, s.new_occurrences, s.source_features, failed
        );
    }
}
