//! Per-job harvest statistics and reporting

use crate::storage::RunRecord;

/// Counters accumulated while a job runs
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HarvestStats {
    /// Page count announced by the listing's navigation
    pub total_pages: u32,

    /// Result count announced by the listing's heading
    pub reported_results: u64,

    /// First page whose records were extracted in this run
    pub start_page: u32,

    /// Pages fetched, including page 1 when only its metadata was needed
    pub pages_fetched: u32,

    /// Pages whose records were handed to the sink
    pub pages_processed: u32,

    /// Records extracted in this run
    pub records_extracted: u64,

    /// Listing elements skipped for lacking a title or link
    pub skipped_elements: u64,

    /// Pages whose extraction stopped at a malformed trailing element
    pub truncated_pages: u32,

    /// Times a 429 response was waited out
    pub rate_limit_waits: u32,

    /// Records persisted by the sink in this run
    pub rows_written: u64,

    /// Flushes performed by the sink in this run
    pub flushes: u64,
}

impl HarvestStats {
    /// Difference between records extracted and results the listing reported
    ///
    /// Only meaningful for a run that started at page 1. Positive means more
    /// records than reported.
    pub fn drift(&self) -> i64 {
        self.records_extracted as i64 - self.reported_results as i64
    }

    /// Logs the end-of-job summary, warning when counts drifted
    pub fn log_summary(&self) {
        tracing::info!(
            "Harvested {} records from pages {}..={} ({} rows in {} flushes, {} rate-limit waits)",
            self.records_extracted,
            self.start_page,
            self.total_pages,
            self.rows_written,
            self.flushes,
            self.rate_limit_waits
        );

        if self.truncated_pages > 0 || self.skipped_elements > 0 {
            tracing::info!(
                "{} pages truncated at a malformed element, {} elements skipped",
                self.truncated_pages,
                self.skipped_elements
            );
        }

        if self.start_page <= 1 && self.drift() != 0 {
            tracing::warn!(
                "Listing reported {} results but {} records were extracted (drift {:+})",
                self.reported_results,
                self.records_extracted,
                self.drift()
            );
        }
    }
}

/// Prints a job's ledger runs to stdout
pub fn print_runs(job_id: &str, runs: &[RunRecord]) {
    println!("=== Harvest Runs for job {} ===\n", job_id);

    if runs.is_empty() {
        println!("No runs recorded.");
        return;
    }

    for run in runs {
        println!("Run {} [{}]", run.id, run.status.to_db_string());
        println!("  Started:  {}", run.started_at);
        println!(
            "  Finished: {}",
            run.finished_at.as_deref().unwrap_or("-")
        );
        if let Some(url) = &run.base_url {
            println!("  URL:      {}", url);
        }
        println!(
            "  Pages:    {}/{}",
            run.last_flushed_page.unwrap_or(0),
            run.total_pages
                .map(|p| p.to_string())
                .unwrap_or_else(|| "?".to_string())
        );
        println!(
            "  Rows:     {} in {} flushes (reported results: {})",
            run.rows_written,
            run.flushes,
            run.total_results
                .map(|r| r.to_string())
                .unwrap_or_else(|| "?".to_string())
        );
        if let Some(message) = &run.error_message {
            println!("  Error:    {}", message);
        }
        println!();
    }
}
