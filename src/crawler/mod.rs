//! Crawler module for listing harvests
//!
//! This module contains the core harvesting logic, including:
//! - HTTP fetching that waits out rate limiting
//! - Extraction of pagination metadata and story records
//! - The sequential pagination driver
//! - Overall job coordination (resume, archival)

mod coordinator;
mod extractor;
mod fetcher;
mod paginator;

pub use coordinator::{
    ArchiveOutcome, Coordinator, CrawlOutcome, JobOptions, JobOutcome, RunDecision,
};
pub use extractor::{parse_result_count, ListingPage, MalformedBoundary, PageExtractor, Pagination};
pub use fetcher::{build_http_client, parse_retry_after, BackoffPolicy, PageContent, RateLimitedFetcher};
pub use paginator::{
    Checkpoint, NoProgress, PagePlan, PaginationSettings, Paginator, ProgressObserver,
};

use crate::config::Config;
use crate::url::JobId;
use crate::HarvestError;

/// Runs a complete job
///
/// This is the main entry point for harvesting a job. It will:
/// 1. Open the run ledger and decide whether to start, resume or skip
/// 2. Resolve the job's opening search URL
/// 3. Walk every listing page into the checkpointed artifact
/// 4. Upload the artifact to the archive bucket
///
/// # Example
///
/// ```no_run
/// use story_harvest::config::load_config_with_hash;
/// use story_harvest::crawler::{harvest, JobOptions};
/// use story_harvest::JobId;
/// use std::path::Path;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let (config, hash) = load_config_with_hash(Path::new("harvest.toml"))?;
/// let job_id = JobId::parse("42")?;
/// harvest(config, hash, job_id, &JobOptions::default()).await?;
/// # Ok(())
/// # }
/// ```
pub async fn harvest(
    config: Config,
    config_hash: String,
    job_id: JobId,
    options: &JobOptions,
) -> Result<JobOutcome, HarvestError> {
    let mut coordinator = Coordinator::new(config, config_hash, job_id)?;
    coordinator.run(options).await
}
