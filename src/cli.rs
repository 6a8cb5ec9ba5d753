//! Command-line interface components.

use crate::catalog::{CatalogMerger, inspect};
use crate::config::{CompressionAlgorithm, PipelineConfig};
use crate::models::ProcessingStats;
use crate::processor::{StandardizePipeline, TagPipeline};
use anyhow::{Context, Result};
use clap::{Args as ClapArgs, Parser, Subcommand};
use colored::*;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Parser, Debug)]
#[command(name = "ctd")]
#[command(about = "Tag CTD profiles with unique IDs, maintain the catalog and standardize observations")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    #[command(flatten)]
    pub common: CommonArgs,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct CommonArgs {
    /// Increase logging verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only log errors and hide progress bars
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Parquet compression algorithm (snappy, zstd, lz4, none)
    #[arg(long, default_value = "snappy", global = true)]
    pub compression: String,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Assign profile IDs to raw stores and merge them into the catalog
    Tag {
        /// Root directory with one subdirectory per data source
        #[arg(value_name = "ROOT")]
        root: PathBuf,

        /// Catalog store path (created on first run)
        #[arg(value_name = "CATALOG")]
        catalog: PathBuf,

        /// Give up on an ID after this many consecutive collisions
        #[arg(long, value_name = "N")]
        max_id_attempts: Option<u64>,
    },

    /// Reconcile timezones, depth/pressure and salinity of tagged stores
    Standardize {
        /// Root directory with one subdirectory per data source
        #[arg(value_name = "ROOT")]
        root: PathBuf,
    },

    /// Report duplicate and malformed IDs in the catalog
    Check {
        /// Catalog store path
        #[arg(value_name = "CATALOG")]
        catalog: PathBuf,
    },
}

/// How a command finished
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    /// Ran to completion but found problems worth a non-zero exit
    IssuesFound,
}

impl CommonArgs {
    pub fn get_log_level(&self) -> &'static str {
        if self.quiet {
            "error"
        } else {
            match self.verbose {
                0 => "warn",
                1 => "info",
                2 => "debug",
                _ => "trace",
            }
        }
    }

    pub fn show_progress(&self) -> bool {
        !self.quiet
    }
}

impl Args {
    /// Pipeline configuration with the command-line overrides applied
    pub fn to_config(&self) -> Result<PipelineConfig> {
        let compression: CompressionAlgorithm = self
            .common
            .compression
            .parse()
            .context("Invalid --compression value")?;
        let mut config = PipelineConfig::default().with_compression(compression);
        if let Command::Tag {
            max_id_attempts, ..
        } = &self.command
        {
            config = config.with_max_id_attempts(*max_id_attempts);
        }
        config.validate().context("Invalid configuration")?;
        Ok(config)
    }
}

/// Set up structured logging to stderr
pub fn setup_logging(args: &CommonArgs) -> Result<()> {
    use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

    let log_level = args.get_log_level();
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("ctd_processor={}", log_level)));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(false)
                .with_level(true)
                .with_writer(std::io::stderr)
                .compact(),
        )
        .try_init()
        .context("Failed to initialize logging")?;

    debug!("Logging initialized at level: {}", log_level);
    Ok(())
}

/// Run the selected command
pub fn run(args: Args) -> Result<Outcome> {
    setup_logging(&args.common)?;
    let config = args.to_config()?;
    let show_progress = args.common.show_progress();

    match &args.command {
        Command::Tag { root, catalog, .. } => {
            println!("{}", "Tagging raw profile datasets".bright_green().bold());
            println!("  {} {}", "Root:".bright_cyan(), root.display());
            println!("  {} {}", "Catalog:".bright_cyan(), catalog.display());

            let stats = TagPipeline::new(root, catalog, config)
                .with_context(|| format!("Cannot tag datasets under {}", root.display()))?
                .with_progress(show_progress)
                .run()?;
            print_summary("Tagging Summary", &stats, true);
            Ok(outcome(&stats))
        }
        Command::Standardize { root } => {
            println!("{}", "Standardizing tagged datasets".bright_green().bold());
            println!("  {} {}", "Root:".bright_cyan(), root.display());

            let stats = StandardizePipeline::new(root, config)
                .with_context(|| format!("Cannot standardize datasets under {}", root.display()))?
                .with_progress(show_progress)
                .run()?;
            print_summary("Standardization Summary", &stats, false);
            Ok(outcome(&stats))
        }
        Command::Check { catalog } => check_catalog(catalog),
    }
}

fn outcome(stats: &ProcessingStats) -> Outcome {
    if stats.datasets_failed > 0 || stats.sources_aborted > 0 {
        Outcome::IssuesFound
    } else {
        Outcome::Success
    }
}

fn check_catalog(path: &Path) -> Result<Outcome> {
    let catalog = CatalogMerger::new(path)
        .load()?
        .with_context(|| format!("No catalog found at {}", path.display()))?;
    let report = inspect(&catalog)?;

    println!("{}", "Catalog Check".bright_green().bold());
    println!(
        "  {} {}",
        "Profiles:".bright_cyan(),
        report.profiles.to_string().bright_white().bold()
    );
    if report.missing > 0 {
        println!(
            "  {} {}",
            "Missing IDs:".bright_red(),
            report.missing.to_string().bright_red().bold()
        );
    }
    for (id, count) in &report.duplicates {
        println!("  {} {} ({}x)", "Duplicate:".bright_red(), id, count);
    }
    for id in &report.malformed {
        println!("  {} {}", "Malformed:".bright_red(), id);
    }

    if report.is_clean() {
        println!("  {}", "All profile IDs are unique and well formed".bright_green());
        Ok(Outcome::Success)
    } else {
        Ok(Outcome::IssuesFound)
    }
}

fn print_summary(title: &str, stats: &ProcessingStats, tagging: bool) {
    println!("\n{}", title.bright_green().bold());
    println!(
        "  {} {}ms",
        "Time elapsed:".bright_cyan(),
        stats.processing_time_ms.to_string().bright_white()
    );
    println!(
        "  {} {}",
        "Sources processed:".bright_cyan(),
        stats.sources_processed.to_string().bright_white()
    );
    if stats.sources_aborted > 0 {
        println!(
            "  {} {}",
            "Sources aborted:".bright_red(),
            stats.sources_aborted.to_string().bright_red().bold()
        );
    }
    println!(
        "  {} {}",
        "Datasets processed:".bright_cyan(),
        stats.datasets_processed.to_string().bright_white()
    );
    if stats.datasets_failed > 0 {
        println!(
            "  {} {}",
            "Datasets failed:".bright_red(),
            stats.datasets_failed.to_string().bright_red().bold()
        );
    }
    if tagging {
        println!(
            "  {} {}",
            "Profiles tagged:".bright_cyan(),
            stats.profiles_tagged.to_string().bright_white().bold()
        );
        println!(
            "  {} {}",
            "Catalog rows:".bright_cyan(),
            stats.catalog_rows.to_string().bright_white().bold()
        );
    }
}
