//! Doc-Harvester main entry point
//!
//! This is the command-line interface for the Doc-Harvester document crawler.

use anyhow::Context;
use clap::Parser;
use doc_harvester::config::{load_config_with_hash, validate, Config, Overrides};
use doc_harvester::crawler::run_crawl;
use doc_harvester::input::load_seeds;
use doc_harvester::output::{load_statistics, print_statistics};
use doc_harvester::storage::open_store;
use doc_harvester::HarvestError;
use std::path::PathBuf;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
use url::Url;

/// Exit code for fatal errors (configuration, snapshot corruption, storage)
const EXIT_FATAL: u8 = 1;

/// Doc-Harvester: a document crawl-and-download engine
///
/// Crawls outward from seed URLs up to a bounded depth, downloads the
/// documents it finds (PDF, Office, OpenDocument, text and more), and files
/// them by domain and category. Interrupted crawls can be resumed.
///
/// Exit status: 0 all done, 3 done with per-URL failures, 4 interrupted
/// (resumable), 1 fatal error.
#[derive(Parser, Debug)]
#[command(name = "doc-harvester")]
#[command(version)]
#[command(about = "Crawl seed URLs and download the documents they lead to", long_about = None)]
struct Cli {
    /// Seed URLs: a .txt, .json or .csv file, or a directory of them
    #[arg(value_name = "INPUT")]
    input: PathBuf,

    /// Path to TOML configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Maximum link-following depth from the seeds
    #[arg(short, long, value_name = "N")]
    depth: Option<u32>,

    /// Delay between requests to the same host, in seconds
    #[arg(short = 'w', long, value_name = "SECS")]
    delay: Option<f64>,

    /// Continue from the saved progress snapshot
    #[arg(long)]
    resume: bool,

    /// Stop after this many pages (the run ends interrupted and can be resumed)
    #[arg(long, value_name = "N")]
    max_pages: Option<u64>,

    /// Validate config and seeds and show what would be crawled
    #[arg(long, conflicts_with = "stats")]
    dry_run: bool,

    /// Show statistics from the progress snapshot and exit
    #[arg(long, conflicts_with = "dry_run")]
    stats: bool,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    match run(cli).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            tracing::error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            let code = e
                .downcast_ref::<HarvestError>()
                .map_or(EXIT_FATAL, HarvestError::exit_code);
            ExitCode::from(code)
        }
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("doc_harvester=info,warn"),
            1 => EnvFilter::new("doc_harvester=debug,info"),
            2 => EnvFilter::new("doc_harvester=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

async fn run(cli: Cli) -> anyhow::Result<u8> {
    let config = load_configuration(&cli)?;

    if cli.stats {
        return handle_stats(&config);
    }

    let seeds = load_seeds(&cli.input)
        .with_context(|| format!("Failed to load seeds from {}", cli.input.display()))?;

    if cli.dry_run {
        handle_dry_run(&config, &seeds);
        return Ok(0);
    }

    handle_crawl(config, seeds, cli.resume).await
}

/// Loads the configuration file (if any) and applies command-line overrides
fn load_configuration(cli: &Cli) -> anyhow::Result<Config> {
    let config = match &cli.config {
        Some(path) => {
            tracing::info!("Loading configuration from: {}", path.display());
            let (config, hash) = load_config_with_hash(path)
                .with_context(|| format!("Invalid configuration {}", path.display()))?;
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            config
        }
        None => {
            let config = Config::default();
            validate(&config).context("Invalid default configuration")?;
            config
        }
    };

    let overrides = Overrides {
        max_depth: cli.depth,
        delay_secs: cli.delay,
        max_pages: cli.max_pages,
    };
    config
        .with_overrides(&overrides)
        .context("Invalid command-line option")
}

/// Handles the --dry-run mode: validates config and shows what would be crawled
fn handle_dry_run(config: &Config, seeds: &[Url]) {
    println!("=== Doc-Harvester Dry Run ===\n");

    println!("Crawler Configuration:");
    println!("  Max depth: {}", config.crawler.max_depth);
    println!("  Delay: {}s", config.crawler.delay_secs);
    println!("  Checkpoint interval: {}", config.crawler.checkpoint_interval);
    if let Some(max_pages) = config.crawler.max_pages {
        println!("  Max pages: {}", max_pages);
    }

    println!("\nFetch chain:");
    if let Some(primary) = &config.browser.primary {
        println!("  - primary: WebDriver {} ({:?})", primary.url, primary.flavor);
    }
    if let Some(fallback) = &config.browser.fallback {
        println!("  - fallback_1: WebDriver {} ({:?})", fallback.url, fallback.flavor);
    }
    if config.fetch.browser_profile_http {
        println!("  - fallback_2: HTTP with browser headers");
    }
    println!("  - static: HTTP as {}", config.user_agent.header_value());

    println!("\nClassifier:");
    if config.classifier.enabled {
        println!("  {} at {}", config.classifier.model, config.classifier.base_url);
    } else {
        println!("  disabled (rules only)");
    }

    println!("\nOutput:");
    println!("  Data directory: {}", config.output.data_dir.display());
    println!("  Snapshot: {}", config.output.snapshot_path().display());
    println!("  Report: {}", config.output.report_path().display());

    println!("\nSeeds ({}):", seeds.len());
    for seed in seeds {
        println!("  - {}", seed);
    }

    println!("\n✓ Configuration is valid");
    println!("✓ Would start crawling with {} seed URLs", seeds.len());
}

/// Handles the --stats mode: shows statistics from the progress snapshot
fn handle_stats(config: &Config) -> anyhow::Result<u8> {
    let path = config.output.snapshot_path();
    println!("Snapshot: {}\n", path.display());

    let store = open_store(&path);
    match load_statistics(&store).context("Failed to read progress snapshot")? {
        Some(stats) => print_statistics(&stats),
        None => println!("No progress snapshot yet."),
    }
    Ok(0)
}

/// Handles the main crawl operation
async fn handle_crawl(config: Config, seeds: Vec<Url>, resume: bool) -> anyhow::Result<u8> {
    if resume {
        tracing::info!("Resuming crawl from {}", config.output.snapshot_path().display());
    } else {
        tracing::info!("Starting fresh crawl with {} seed URLs", seeds.len());
    }

    let cancel = CancellationToken::new();
    let signal_token = cancel.clone();
    let grace = config.crawler.cancel_grace();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!(
                "Interrupt received; stopping within {:?} and saving progress",
                grace
            );
            signal_token.cancel();
        }
    });

    let report_path = config.output.report_path();
    let report = run_crawl(config, seeds, resume, cancel)
        .await
        .context("Crawl failed")?;

    println!(
        "{}: {} pages, {} documents stored ({} duplicates), {} failures",
        report.status,
        report.totals.pages_processed,
        report.totals.documents_stored,
        report.totals.documents_duplicate,
        report.totals.failures
    );
    println!("Report: {}", report_path.display());

    Ok(report.status.exit_code())
}
