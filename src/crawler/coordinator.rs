//! Job coordinator - run planning, crawling and archival
//!
//! This module ties one job together:
//! - Deciding from the run ledger whether to start, resume, archive or skip
//! - Resolving the job's opening search URL
//! - Driving the paginator with a checkpoint writer and ledger observer
//! - Uploading the finished artifact to the archive bucket

use crate::archive::{load_credentials, resolve_job_url, ArchiveError, BlobStore, LocalBlobStore};
use crate::config::Config;
use crate::crawler::extractor::PageExtractor;
use crate::crawler::fetcher::RateLimitedFetcher;
use crate::crawler::paginator::{Checkpoint, PagePlan, PaginationSettings, Paginator, ProgressObserver};
use crate::output::{truncate_artifact, CheckpointWriter, HarvestStats};
use crate::state::StopSignal;
use crate::storage::{RunRecord, RunStatus, SqliteStorage, Storage};
use crate::url::{parse_search_url, JobId};
use crate::HarvestError;
use std::fmt;
use std::fs;
use url::Url;

/// Per-invocation switches
#[derive(Debug, Clone)]
pub struct JobOptions {
    /// Discard the local artifact and start a new run
    pub fresh: bool,
    /// Upload the artifact once the crawl is complete
    pub upload: bool,
    /// Opening URL to use instead of resolving the job id
    pub url_override: Option<Url>,
}

impl Default for JobOptions {
    fn default() -> Self {
        Self {
            fresh: false,
            upload: true,
            url_override: None,
        }
    }
}

/// What an invocation does, given the job's latest run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunDecision {
    /// Create a run and crawl from page 1
    StartNew,
    /// Continue an unfinished run
    Resume { run_id: i64, start_page: u32 },
    /// Crawling is done; only archival remains
    ArchiveOnly { run_id: i64, mark_completed: bool },
    /// The job's artifact is already archived
    NothingToDo { run_id: i64 },
}

impl RunDecision {
    /// Decides from the latest run of a job
    pub fn from_latest(latest: Option<&RunRecord>, fresh: bool) -> Self {
        let run = match latest {
            Some(run) if !fresh => run,
            _ => return Self::StartNew,
        };

        match run.status {
            RunStatus::Archived => Self::NothingToDo { run_id: run.id },
            RunStatus::Completed => Self::ArchiveOnly {
                run_id: run.id,
                mark_completed: false,
            },
            RunStatus::Running | RunStatus::Interrupted | RunStatus::Failed => {
                if let Some(start_page) = run.resume_page() {
                    return Self::Resume {
                        run_id: run.id,
                        start_page,
                    };
                }
                match (run.last_flushed_page, run.total_pages) {
                    (Some(flushed), Some(total)) if flushed >= total => Self::ArchiveOnly {
                        run_id: run.id,
                        mark_completed: true,
                    },
                    _ => Self::Resume {
                        run_id: run.id,
                        start_page: 1,
                    },
                }
            }
        }
    }
}

impl fmt::Display for RunDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StartNew => write!(f, "start a new run from page 1"),
            Self::Resume { run_id, start_page } => {
                write!(f, "resume run {} from page {}", run_id, start_page)
            }
            Self::ArchiveOnly { run_id, .. } => {
                write!(f, "archive the artifact of completed run {}", run_id)
            }
            Self::NothingToDo { run_id } => write!(f, "nothing to do, run {} is archived", run_id),
        }
    }
}

/// How the crawl part of a job ended
#[derive(Debug, Clone)]
pub enum CrawlOutcome {
    Harvested(HarvestStats),
    /// An earlier run already finished crawling
    AlreadyHarvested,
}

/// How the archival part of a job ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArchiveOutcome {
    Uploaded { remote_path: String },
    Skipped,
    AlreadyArchived,
}

/// Result of a job that ran to completion
#[derive(Debug, Clone)]
pub struct JobOutcome {
    pub run_id: i64,
    pub crawl: CrawlOutcome,
    pub archive: ArchiveOutcome,
}

/// Persists driver progress to the run ledger
///
/// Counts reported by the sink cover this invocation only; the offsets carry
/// what earlier invocations of the same run already wrote.
struct LedgerProgress<'a> {
    storage: &'a mut SqliteStorage,
    run_id: i64,
    rows_offset: u64,
    flush_offset: u64,
}

impl ProgressObserver for LedgerProgress<'_> {
    fn on_plan(&mut self, plan: &PagePlan) -> Result<(), HarvestError> {
        self.storage.record_plan(
            self.run_id,
            plan.base_url.as_str(),
            plan.total_pages,
            plan.total_results,
        )?;
        Ok(())
    }

    fn on_checkpoint(&mut self, checkpoint: &Checkpoint) -> Result<(), HarvestError> {
        self.storage.record_checkpoint(
            self.run_id,
            checkpoint.page,
            self.rows_offset + checkpoint.rows_written,
            self.flush_offset + checkpoint.flushes,
            checkpoint.artifact_bytes,
        )?;
        tracing::debug!(
            "Checkpoint: page {} durable ({} rows)",
            checkpoint.page,
            self.rows_offset + checkpoint.rows_written
        );
        Ok(())
    }
}

/// Main job coordinator structure
pub struct Coordinator {
    config: Config,
    config_hash: String,
    job_id: JobId,
    storage: SqliteStorage,
    blob_store: Box<dyn BlobStore>,
    stop: StopSignal,
}

impl Coordinator {
    /// Creates a coordinator for one job
    ///
    /// Opens the run ledger at the configured state path and a blob store
    /// rooted at the configured store root.
    pub fn new(config: Config, config_hash: String, job_id: JobId) -> Result<Self, HarvestError> {
        let storage = SqliteStorage::new(&config.output.state_path)?;
        let blob_store = Box::new(LocalBlobStore::new(&config.archive.store_root));

        Ok(Self {
            config,
            config_hash,
            job_id,
            storage,
            blob_store,
            stop: StopSignal::new(),
        })
    }

    /// Replaces the blob store used for URL resolution and upload
    pub fn with_blob_store(mut self, store: Box<dyn BlobStore>) -> Self {
        self.blob_store = store;
        self
    }

    /// Handle for requesting a cooperative stop
    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    pub fn storage(&self) -> &SqliteStorage {
        &self.storage
    }

    /// Reports what `run` would do without changing anything
    pub fn decision(&self, fresh: bool) -> Result<RunDecision, HarvestError> {
        let latest = self.storage.get_latest_run(self.job_id.as_str())?;
        Ok(RunDecision::from_latest(latest.as_ref(), fresh))
    }

    /// Runs the job
    ///
    /// # Errors
    ///
    /// Crawl failures end the run as `failed` (or `interrupted` when
    /// cancelled) with its checkpoint intact. An upload conflict leaves the run
    /// `completed` and the local artifact in place.
    pub async fn run(&mut self, options: &JobOptions) -> Result<JobOutcome, HarvestError> {
        let decision = self.decision(options.fresh)?;
        tracing::info!("Job {}: {}", self.job_id, decision);

        let (run_id, crawl) = match decision {
            RunDecision::NothingToDo { run_id } => {
                return Ok(JobOutcome {
                    run_id,
                    crawl: CrawlOutcome::AlreadyHarvested,
                    archive: ArchiveOutcome::AlreadyArchived,
                });
            }
            RunDecision::ArchiveOnly {
                run_id,
                mark_completed,
            } => {
                if mark_completed {
                    self.storage.complete_run(run_id)?;
                }
                (run_id, CrawlOutcome::AlreadyHarvested)
            }
            RunDecision::StartNew => {
                if options.fresh {
                    self.discard_artifact()?;
                }
                let run_id = self
                    .storage
                    .create_run(self.job_id.as_str(), &self.config_hash)?;
                let stats = self.crawl(run_id, 1, options).await?;
                (run_id, CrawlOutcome::Harvested(stats))
            }
            RunDecision::Resume { run_id, start_page } => {
                // Drop anything written after the last checkpoint
                if let Some(bytes) = self.storage.get_run(run_id)?.artifact_bytes {
                    truncate_artifact(&self.config.output.artifact_path, bytes)?;
                }
                self.storage.update_run_status(run_id, RunStatus::Running)?;
                let stats = self.crawl(run_id, start_page, options).await?;
                (run_id, CrawlOutcome::Harvested(stats))
            }
        };

        let archive = if options.upload {
            let remote_path = self.archive(run_id)?;
            ArchiveOutcome::Uploaded { remote_path }
        } else {
            tracing::info!(
                "Upload disabled, artifact left at {}",
                self.config.output.artifact_path.display()
            );
            ArchiveOutcome::Skipped
        };

        Ok(JobOutcome {
            run_id,
            crawl,
            archive,
        })
    }

    fn discard_artifact(&self) -> Result<(), HarvestError> {
        let path = &self.config.output.artifact_path;
        if path.exists() {
            tracing::info!("Removing existing artifact {}", path.display());
            fs::remove_file(path)?;
        }
        Ok(())
    }

    fn base_url(&self, run: &RunRecord, options: &JobOptions) -> Result<Url, HarvestError> {
        if let Some(url) = &options.url_override {
            return Ok(url.clone());
        }
        if let Some(stored) = &run.base_url {
            tracing::debug!("Reusing base URL {} from run {}", stored, run.id);
            return Ok(parse_search_url(stored)?);
        }
        resolve_job_url(self.blob_store.as_ref(), &self.config.archive, &self.job_id)
    }

    async fn crawl(
        &mut self,
        run_id: i64,
        start_page: u32,
        options: &JobOptions,
    ) -> Result<HarvestStats, HarvestError> {
        let run = self.storage.get_run(run_id)?;
        if run.config_hash != self.config_hash {
            tracing::warn!("Configuration changed since run {} started", run_id);
        }

        let result = self.drive(&run, start_page, options).await;

        match result {
            Ok(stats) => {
                self.storage.complete_run(run_id)?;
                tracing::info!("Run {} completed", run_id);
                Ok(stats)
            }
            Err(e) => {
                let status = match e {
                    HarvestError::Cancelled { .. } => RunStatus::Interrupted,
                    _ => RunStatus::Failed,
                };
                tracing::error!("Run {} ended as {}: {}", run_id, status.to_db_string(), e);
                if let Err(ledger_error) = self.storage.end_run(run_id, status, &e.to_string()) {
                    tracing::error!("Failed to record end of run {}: {}", run_id, ledger_error);
                }
                Err(e)
            }
        }
    }

    async fn drive(
        &mut self,
        run: &RunRecord,
        start_page: u32,
        options: &JobOptions,
    ) -> Result<HarvestStats, HarvestError> {
        let base_url = self.base_url(run, options)?;

        let fetcher = RateLimitedFetcher::from_config(
            &self.config.crawler,
            &self.config.backoff,
            &self.config.user_agent,
        )?;
        let extractor = PageExtractor::new()?;
        let settings = PaginationSettings {
            page_delay: self.config.crawler.page_delay(),
            start_page,
        };

        let mut sink = CheckpointWriter::new(
            &self.config.output.artifact_path,
            self.config.crawler.batch_size,
            self.config.output.compression_level,
        )
        .with_header(self.config.output.write_header);

        let mut progress = LedgerProgress {
            storage: &mut self.storage,
            run_id: run.id,
            rows_offset: run.rows_written,
            flush_offset: run.flushes,
        };

        let mut paginator =
            Paginator::new(&fetcher, &extractor, settings).with_stop_signal(self.stop.clone());
        paginator.run(&base_url, &mut sink, &mut progress).await
    }

    /// Uploads the artifact and marks the run archived
    fn archive(&mut self, run_id: i64) -> Result<String, HarvestError> {
        let archive = &self.config.archive;

        if archive.credentials_path.exists() {
            let credentials = load_credentials(&archive.credentials_path)?;
            tracing::debug!(
                "Using {} credentials for project {}",
                credentials.kind,
                credentials.quota_project_id
            );
        } else {
            tracing::debug!(
                "No credentials file at {}",
                archive.credentials_path.display()
            );
        }

        let artifact = &self.config.output.artifact_path;
        let remote_path = self.job_id.expand(&archive.artifact_name);
        tracing::info!(
            "Uploading {} to {}/{}",
            artifact.display(),
            archive.bucket,
            remote_path
        );

        match self.blob_store.upload(&archive.bucket, artifact, &remote_path) {
            Ok(()) => {}
            Err(e @ ArchiveError::UploadConflict { .. }) => {
                tracing::error!("{}; local artifact kept at {}", e, artifact.display());
                return Err(e.into());
            }
            Err(e) => return Err(e.into()),
        }

        self.storage.update_run_status(run_id, RunStatus::Archived)?;
        tracing::info!("Archived run {} as {}/{}", run_id, archive.bucket, remote_path);
        Ok(remote_path)
    }
}
