//! Story-Harvest main entry point
//!
//! This is the command-line interface for the Story-Harvest listing harvester.

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use story_harvest::archive::{write_credentials, Credentials};
use story_harvest::config::{load_config_with_hash, Config};
use story_harvest::crawler::{
    ArchiveOutcome, Coordinator, CrawlOutcome, JobOptions, JobOutcome,
};
use story_harvest::output::print_runs;
use story_harvest::storage::{SqliteStorage, Storage};
use story_harvest::url::parse_search_url;
use story_harvest::{HarvestError, JobId};
use tracing_subscriber::EnvFilter;

/// Story-Harvest: a polite paginated listing harvester
///
/// Story-Harvest walks every page of a job's search-results listing, writes one
/// row per story to a gzip CSV artifact in checkpointed batches, and uploads
/// the finished artifact to the archive bucket.
#[derive(Parser, Debug)]
#[command(name = "story-harvest")]
#[command(version = "1.0.0")]
#[command(about = "A polite paginated listing harvester", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Job id; names the URL file and the uploaded artifact
    #[arg(long)]
    id: String,

    /// Opening search URL, bypassing the bucket lookup
    #[arg(long)]
    url: Option<String>,

    /// OAuth client id for the archive credentials file
    #[arg(long)]
    client_id: Option<String>,

    /// OAuth client secret for the archive credentials file
    #[arg(long)]
    client_secret: Option<String>,

    /// Quota project id for the archive credentials file
    #[arg(long)]
    quota_project_id: Option<String>,

    /// OAuth refresh token for the archive credentials file
    #[arg(long)]
    refresh_token: Option<String>,

    /// Credential type, e.g. authorized_user
    #[arg(long = "type", value_name = "TYPE")]
    credential_type: Option<String>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Delete the local artifact and start a new run
    #[arg(long)]
    fresh: bool,

    /// Keep the artifact local instead of uploading it
    #[arg(long)]
    no_upload: bool,

    /// Validate config and show what would be done without doing it
    #[arg(long, conflicts_with = "stats")]
    dry_run: bool,

    /// Show the job's recorded runs and exit
    #[arg(long, conflicts_with = "dry_run")]
    stats: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    let job_id = JobId::parse(&cli.id).context("invalid --id")?;
    let url_override = cli
        .url
        .as_deref()
        .map(parse_search_url)
        .transpose()
        .context("invalid --url")?;

    // Load and validate configuration
    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = match load_config_with_hash(&cli.config) {
        Ok((cfg, hash)) => {
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            (cfg, hash)
        }
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    let credentials = Credentials::from_parts(
        cli.client_id,
        cli.client_secret,
        cli.quota_project_id,
        cli.refresh_token,
        cli.credential_type,
    )?;

    let options = JobOptions {
        fresh: cli.fresh,
        upload: !cli.no_upload,
        url_override,
    };

    // Handle different modes
    if cli.stats {
        handle_stats(&config, &job_id)?;
    } else if cli.dry_run {
        handle_dry_run(config, config_hash, job_id, &options, credentials.is_some())?;
    } else {
        if let Some(credentials) = &credentials {
            write_credentials(&config.archive.credentials_path, credentials)?;
        }
        handle_harvest(config, config_hash, job_id, &options).await?;
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("story_harvest=info,warn"),
            1 => EnvFilter::new("story_harvest=debug,info"),
            2 => EnvFilter::new("story_harvest=trace,debug"),
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

/// Handles the --dry-run mode: shows the configuration and the planned action
fn handle_dry_run(
    config: Config,
    config_hash: String,
    job_id: JobId,
    options: &JobOptions,
    has_credentials: bool,
) -> anyhow::Result<()> {
    println!("=== Story-Harvest Dry Run ===\n");

    println!("Job: {}", job_id);
    match &options.url_override {
        Some(url) => println!("  URL: {} (from --url)", url),
        None => println!(
            "  URL file: {}/{}/{}",
            config.archive.bucket,
            config.archive.url_prefix,
            job_id.url_file_name()
        ),
    }

    println!("\nCrawler Configuration:");
    println!("  Page delay: {}ms", config.crawler.page_delay_ms);
    println!("  Batch size: {}", config.crawler.batch_size);
    println!(
        "  Timeouts: {}s request, {}s connect",
        config.crawler.request_timeout_secs, config.crawler.connect_timeout_secs
    );

    println!("\nBackoff:");
    println!("  Damping: {}", config.backoff.damping);
    println!("  Safety margin: {}s", config.backoff.safety_margin_secs);
    println!(
        "  Default retry-after: {}s",
        config.backoff.default_retry_after_secs
    );
    println!(
        "  Consecutive 429 limit: {}",
        config.backoff.max_consecutive_rate_limits
    );

    println!("\nUser Agent: {}", config.user_agent.header_value());

    println!("\nOutput:");
    println!("  Artifact: {}", config.output.artifact_path.display());
    println!("  State: {}", config.output.state_path.display());
    println!("  Compression level: {}", config.output.compression_level);

    println!("\nArchive:");
    println!("  Bucket: {}", config.archive.bucket);
    println!("  Store root: {}", config.archive.store_root.display());
    println!(
        "  Upload as: {}",
        if options.upload {
            job_id.expand(&config.archive.artifact_name)
        } else {
            "(disabled)".to_string()
        }
    );
    if has_credentials {
        println!(
            "  Would write credentials to {}",
            config.archive.credentials_path.display()
        );
    }

    let coordinator = Coordinator::new(config, config_hash, job_id)?;
    let decision = coordinator.decision(options.fresh)?;

    println!("\n✓ Configuration is valid");
    println!("✓ Would {}", decision);

    Ok(())
}

/// Handles the --stats mode: shows the job's runs from the ledger
fn handle_stats(config: &Config, job_id: &JobId) -> anyhow::Result<()> {
    println!("Ledger: {}\n", config.output.state_path.display());

    let storage = SqliteStorage::new(&config.output.state_path)?;
    let runs = storage.list_runs(job_id.as_str())?;
    print_runs(job_id.as_str(), &runs);

    Ok(())
}

/// Handles the main harvest operation
async fn handle_harvest(
    config: Config,
    config_hash: String,
    job_id: JobId,
    options: &JobOptions,
) -> anyhow::Result<()> {
    if options.fresh {
        tracing::info!("Starting fresh harvest of job {}", job_id);
    } else {
        tracing::info!("Starting harvest of job {} (will resume if possible)", job_id);
    }

    let mut coordinator = Coordinator::new(config, config_hash, job_id)?;

    let stop = coordinator.stop_signal();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, stopping after the current page");
            stop.request_stop();
        }
    });

    match coordinator.run(options).await {
        Ok(outcome) => {
            report(&outcome);
            Ok(())
        }
        Err(HarvestError::Cancelled { next_page }) => {
            tracing::warn!("Harvest interrupted; rerun to resume at page {}", next_page);
            Err(HarvestError::Cancelled { next_page }.into())
        }
        Err(e) => {
            tracing::error!("Harvest failed: {}", e);
            Err(e.into())
        }
    }
}

fn report(outcome: &JobOutcome) {
    match &outcome.crawl {
        CrawlOutcome::Harvested(stats) => tracing::info!(
            "Run {} harvested {} records over {} pages",
            outcome.run_id,
            stats.records_extracted,
            stats.pages_processed
        ),
        CrawlOutcome::AlreadyHarvested => {
            tracing::info!("Run {} was already harvested", outcome.run_id)
        }
    }

    match &outcome.archive {
        ArchiveOutcome::Uploaded { remote_path } => {
            tracing::info!("Artifact archived as {}", remote_path)
        }
        ArchiveOutcome::Skipped => tracing::info!("Artifact not uploaded"),
        ArchiveOutcome::AlreadyArchived => tracing::info!("Artifact was already archived"),
    }
}
