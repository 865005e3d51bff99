//! Storage module for the run ledger
//!
//! This module persists, per job, the state needed to resume an interrupted
//! harvest:
//! - Run lifecycle (running, completed, archived, interrupted, failed)
//! - The listing plan (base URL, announced page and result totals)
//! - The last page whose records are durably in the artifact

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteStorage;
pub use traits::{Storage, StorageError, StorageResult};

use crate::HarvestError;
use std::path::Path;

/// Opens or creates the run ledger at `path`
pub fn open_storage(path: &Path) -> Result<SqliteStorage, HarvestError> {
    SqliteStorage::new(path)
}

/// Represents one harvest run of a job
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub id: i64,
    pub job_id: String,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub config_hash: String,
    pub status: RunStatus,
    pub base_url: Option<String>,
    pub total_pages: Option<u32>,
    pub total_results: Option<u64>,
    pub last_flushed_page: Option<u32>,
    pub rows_written: u64,
    pub flushes: u64,
    pub error_message: Option<String>,
    /// Artifact length in bytes at the last checkpoint
    pub artifact_bytes: Option<u64>,
}

impl RunRecord {
    /// Page a resumed harvest should start from, if this run can be resumed
    ///
    /// Only unfinished runs with a durable checkpoint short of the last page
    /// qualify.
    pub fn resume_page(&self) -> Option<u32> {
        if !self.status.is_resumable() {
            return None;
        }
        let flushed = self.last_flushed_page?;
        match self.total_pages {
            Some(total) if flushed >= total => None,
            _ => Some(flushed + 1),
        }
    }
}

/// Status of a harvest run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    Completed,
    Archived,
    Interrupted,
    Failed,
}

impl RunStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Archived => "archived",
            Self::Interrupted => "interrupted",
            Self::Failed => "failed",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "archived" => Some(Self::Archived),
            "interrupted" => Some(Self::Interrupted),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Returns true if a later invocation may continue this run
    pub fn is_resumable(&self) -> bool {
        matches!(self, Self::Running | Self::Interrupted | Self::Failed)
    }
}
