//! Storage traits and error types
//!
//! This module defines the trait interface for the run ledger and its
//! error type.

use crate::storage::{RunRecord, RunStatus};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Run not found: {0}")]
    RunNotFound(i64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for run ledger implementations
///
/// The ledger remembers, per job, how far a harvest got so that an aborted
/// job restarts from its last durable page instead of page 1.
pub trait Storage {
    // ===== Run Management =====

    /// Creates a new run for a job in the `running` state
    ///
    /// # Returns
    ///
    /// The ID of the newly created run
    fn create_run(&mut self, job_id: &str, config_hash: &str) -> StorageResult<i64>;

    /// Gets a run by ID
    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord>;

    /// Gets the most recent run of a job
    fn get_latest_run(&self, job_id: &str) -> StorageResult<Option<RunRecord>>;

    /// Lists all runs of a job, oldest first
    fn list_runs(&self, job_id: &str) -> StorageResult<Vec<RunRecord>>;

    /// Updates the status of a run
    fn update_run_status(&mut self, run_id: i64, status: RunStatus) -> StorageResult<()>;

    /// Marks a run as completed with a finish timestamp
    fn complete_run(&mut self, run_id: i64) -> StorageResult<()>;

    /// Ends a run as `failed` or `interrupted`, keeping its checkpoint
    fn end_run(&mut self, run_id: i64, status: RunStatus, message: &str) -> StorageResult<()>;

    // ===== Progress =====

    /// Records the listing's base URL and announced totals
    fn record_plan(
        &mut self,
        run_id: i64,
        base_url: &str,
        total_pages: u32,
        total_results: u64,
    ) -> StorageResult<()>;

    /// Records the last page whose records are all in the artifact
    fn record_checkpoint(
        &mut self,
        run_id: i64,
        last_flushed_page: u32,
        rows_written: u64,
        flushes: u64,
        artifact_bytes: u64,
    ) -> StorageResult<()>;
}
