//! Pagination driver
//!
//! Walks one job's listing page by page:
//! - Fetches page 1 and plans the run from its pagination metadata
//! - Fetches pages 2..=total with a fixed delay between requests
//! - Hands each page's records to a [`RecordSink`] in page order
//! - Reports every durable checkpoint to a [`ProgressObserver`]
//!
//! Execution is strictly sequential. A page is fetched, parsed and handed to
//! the sink before the next fetch starts.

use crate::crawler::extractor::{ListingPage, PageExtractor};
use crate::crawler::fetcher::{PageContent, RateLimitedFetcher};
use crate::output::{HarvestStats, RecordSink};
use crate::state::{DriverState, StopSignal};
use crate::url::page_url;
use crate::HarvestError;
use std::time::Duration;
use url::Url;

/// Knobs for a single pagination run
#[derive(Debug, Clone, Copy)]
pub struct PaginationSettings {
    /// Sleep before every fetch after the first
    pub page_delay: Duration,
    /// First page whose records are extracted; page 1 is always fetched
    pub start_page: u32,
}

impl Default for PaginationSettings {
    fn default() -> Self {
        Self {
            page_delay: Duration::from_millis(2100),
            start_page: 1,
        }
    }
}

/// What page 1 announced about the listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PagePlan {
    pub base_url: Url,
    pub total_pages: u32,
    pub total_results: u64,
}

/// Durable progress of the sink
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Checkpoint {
    /// Last page whose records are all in the artifact
    pub page: u32,
    pub rows_written: u64,
    pub flushes: u64,
    /// Artifact length in bytes once the flush landed
    pub artifact_bytes: u64,
}

/// Receives planning and checkpoint events from the driver
///
/// Returning an error aborts the run.
pub trait ProgressObserver {
    fn on_plan(&mut self, _plan: &PagePlan) -> Result<(), HarvestError> {
        Ok(())
    }

    fn on_checkpoint(&mut self, _checkpoint: &Checkpoint) -> Result<(), HarvestError> {
        Ok(())
    }
}

/// Observer that ignores every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressObserver for NoProgress {}

/// Drives the `Init -> FetchingFirst -> Iterating -> Done` lifecycle
pub struct Paginator<'a> {
    fetcher: &'a RateLimitedFetcher,
    extractor: &'a PageExtractor,
    settings: PaginationSettings,
    stop: StopSignal,
    state: DriverState,
    stats: HarvestStats,
}

impl<'a> Paginator<'a> {
    pub fn new(
        fetcher: &'a RateLimitedFetcher,
        extractor: &'a PageExtractor,
        settings: PaginationSettings,
    ) -> Self {
        Self {
            fetcher,
            extractor,
            settings: PaginationSettings {
                start_page: settings.start_page.max(1),
                ..settings
            },
            stop: StopSignal::new(),
            state: DriverState::Init,
            stats: HarvestStats::default(),
        }
    }

    /// Shares a stop flag with the caller
    pub fn with_stop_signal(mut self, stop: StopSignal) -> Self {
        self.stop = stop;
        self
    }

    pub fn state(&self) -> DriverState {
        self.state
    }

    pub fn stats(&self) -> &HarvestStats {
        &self.stats
    }

    fn transition(&mut self, next: DriverState) -> Result<(), HarvestError> {
        if !self.state.can_transition_to(next) {
            return Err(HarvestError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        tracing::debug!("Driver state {} -> {}", self.state, next);
        self.state = next;
        Ok(())
    }

    /// Harvests the listing rooted at `base_url` into `sink`
    ///
    /// On success the sink is finished, so the artifact exists even when the
    /// listing is empty. Any error leaves the driver in `Error`.
    ///
    /// # Errors
    ///
    /// * `HarvestError::Cancelled` - the stop signal was raised; buffered
    ///   records were flushed first
    /// * `HarvestError::HttpStatus` - a page answered with a non-success status
    /// * `HarvestError::Parse` - page 1 lacks the expected structure
    pub async fn run<S, O>(
        &mut self,
        base_url: &Url,
        sink: &mut S,
        observer: &mut O,
    ) -> Result<HarvestStats, HarvestError>
    where
        S: RecordSink,
        O: ProgressObserver,
    {
        match self.drive(base_url, sink, observer).await {
            Ok(()) => Ok(self.stats.clone()),
            Err(e) => {
                if !self.state.is_terminal() {
                    self.state = DriverState::Error;
                }
                Err(e)
            }
        }
    }

    async fn drive<S, O>(
        &mut self,
        base_url: &Url,
        sink: &mut S,
        observer: &mut O,
    ) -> Result<(), HarvestError>
    where
        S: RecordSink,
        O: ProgressObserver,
    {
        self.transition(DriverState::FetchingFirst)?;
        self.check_stop(self.settings.start_page, sink, observer)?;

        let first = self.fetch(base_url).await?;
        let (pagination, first_listing) = self.extractor.extract_page(&first.body, &first.url)?;

        self.stats.total_pages = pagination.total_pages;
        self.stats.reported_results = pagination.total_results;
        self.stats.start_page = self.settings.start_page;

        let plan = PagePlan {
            base_url: base_url.clone(),
            total_pages: pagination.total_pages,
            total_results: pagination.total_results,
        };
        tracing::info!(
            "Listing has {} pages and {} results",
            plan.total_pages,
            plan.total_results
        );
        observer.on_plan(&plan)?;

        if plan.total_pages == 0 || plan.total_results == 0 {
            tracing::info!("Nothing to harvest at {}", base_url);
            self.finish(sink, observer)?;
            return self.transition(DriverState::Done);
        }

        self.transition(DriverState::Iterating)?;

        if self.settings.start_page == 1 {
            self.process(1, first_listing, sink, observer)?;
        } else {
            tracing::info!("Resuming at page {}/{}", self.settings.start_page, plan.total_pages);
        }

        for page in self.settings.start_page.max(2)..=plan.total_pages {
            if !self.settings.page_delay.is_zero() {
                tokio::time::sleep(self.settings.page_delay).await;
            }
            self.check_stop(page, sink, observer)?;

            let url = page_url(base_url, page)?;
            let content = self.fetch(&url).await?;
            let listing = self.extractor.extract_listing(&content.body);
            self.process(page, listing, sink, observer)?;
        }

        self.finish(sink, observer)?;
        self.stats.log_summary();
        self.transition(DriverState::Done)
    }

    async fn fetch(&mut self, url: &Url) -> Result<PageContent, HarvestError> {
        let content = self.fetcher.fetch(url).await?;
        self.stats.pages_fetched += 1;
        self.stats.rate_limit_waits += content.rate_limit_waits;

        if !content.is_success() {
            tracing::error!("HTTP {} for {}", content.status, content.url);
            return Err(HarvestError::HttpStatus {
                url: content.url,
                status: content.status,
            });
        }
        Ok(content)
    }

    fn process<S, O>(
        &mut self,
        page: u32,
        listing: ListingPage,
        sink: &mut S,
        observer: &mut O,
    ) -> Result<(), HarvestError>
    where
        S: RecordSink,
        O: ProgressObserver,
    {
        if let Some(boundary) = listing.boundary {
            tracing::debug!(
                "Page {} truncated at element {} ({} link(s))",
                page,
                boundary.element_index,
                boundary.links_found
            );
            self.stats.truncated_pages += 1;
        }
        self.stats.skipped_elements += listing.skipped as u64;
        self.stats.records_extracted += listing.records.len() as u64;
        self.stats.pages_processed += 1;

        let found = listing.records.len();
        let flushes = sink.append(page, listing.records)?;

        tracing::info!(
            "Page {}/{}: {} records ({} of {} reported)",
            page,
            self.stats.total_pages,
            found,
            self.stats.records_extracted,
            self.stats.reported_results
        );

        if flushes > 0 {
            self.report_checkpoint(sink, observer)?;
        }
        Ok(())
    }

    fn finish<S, O>(&mut self, sink: &mut S, observer: &mut O) -> Result<(), HarvestError>
    where
        S: RecordSink,
        O: ProgressObserver,
    {
        let before = sink.flush_count();
        sink.finish()?;
        if sink.flush_count() > before {
            self.report_checkpoint(sink, observer)?;
        }
        self.stats.rows_written = sink.rows_written();
        self.stats.flushes = sink.flush_count();
        Ok(())
    }

    fn check_stop<S, O>(
        &mut self,
        next_page: u32,
        sink: &mut S,
        observer: &mut O,
    ) -> Result<(), HarvestError>
    where
        S: RecordSink,
        O: ProgressObserver,
    {
        if !self.stop.is_requested() {
            return Ok(());
        }

        tracing::warn!("Stop requested, halting before page {}", next_page);
        if sink.flush()? {
            self.report_checkpoint(sink, observer)?;
        }
        self.stats.rows_written = sink.rows_written();
        self.stats.flushes = sink.flush_count();
        Err(HarvestError::Cancelled { next_page })
    }

    fn report_checkpoint<S, O>(&self, sink: &S, observer: &mut O) -> Result<(), HarvestError>
    where
        S: RecordSink,
        O: ProgressObserver,
    {
        if let Some(page) = sink.durable_page() {
            observer.on_checkpoint(&Checkpoint {
                page,
                rows_written: sink.rows_written(),
                flushes: sink.flush_count(),
                artifact_bytes: sink.artifact_bytes(),
            })?;
        }
        Ok(())
    }
}
