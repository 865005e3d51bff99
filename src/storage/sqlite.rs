//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the Storage trait.

use crate::storage::schema::initialize_schema;
use crate::storage::traits::{Storage, StorageError, StorageResult};
use crate::storage::{RunRecord, RunStatus};
use crate::HarvestError;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;

const RUN_COLUMNS: &str = "id, job_id, started_at, finished_at, config_hash, status, base_url,
     total_pages, total_results, last_flushed_page, rows_written, flushes, error_message,
     artifact_bytes";

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Opens or creates the ledger at `path`
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStorage)` - Successfully opened/created database
    /// * `Err(HarvestError)` - Failed to open database
    pub fn new(path: &Path) -> Result<Self, HarvestError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path).map_err(StorageError::from)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
        ",
        )
        .map_err(StorageError::from)?;

        initialize_schema(&conn).map_err(StorageError::from)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database (for testing)
    pub fn new_in_memory() -> Result<Self, HarvestError> {
        let conn = Connection::open_in_memory().map_err(StorageError::from)?;
        initialize_schema(&conn).map_err(StorageError::from)?;
        Ok(Self { conn })
    }
}

fn run_from_row(row: &Row<'_>) -> rusqlite::Result<RunRecord> {
    Ok(RunRecord {
        id: row.get(0)?,
        job_id: row.get(1)?,
        started_at: row.get(2)?,
        finished_at: row.get(3)?,
        config_hash: row.get(4)?,
        status: RunStatus::from_db_string(&row.get::<_, String>(5)?).unwrap_or(RunStatus::Failed),
        base_url: row.get(6)?,
        total_pages: row.get(7)?,
        total_results: row.get::<_, Option<i64>>(8)?.map(|n| n as u64),
        last_flushed_page: row.get(9)?,
        rows_written: row.get::<_, i64>(10)? as u64,
        flushes: row.get::<_, i64>(11)? as u64,
        error_message: row.get(12)?,
        artifact_bytes: row.get::<_, Option<i64>>(13)?.map(|n| n as u64),
    })
}

impl Storage for SqliteStorage {
    // ===== Run Management =====

    fn create_run(&mut self, job_id: &str, config_hash: &str) -> StorageResult<i64> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO runs (job_id, started_at, config_hash, status) VALUES (?1, ?2, ?3, ?4)",
            params![job_id, now, config_hash, RunStatus::Running.to_db_string()],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord> {
        let sql = format!("SELECT {} FROM runs WHERE id = ?1", RUN_COLUMNS);
        self.conn
            .query_row(&sql, params![run_id], run_from_row)
            .optional()?
            .ok_or(StorageError::RunNotFound(run_id))
    }

    fn get_latest_run(&self, job_id: &str) -> StorageResult<Option<RunRecord>> {
        let sql = format!(
            "SELECT {} FROM runs WHERE job_id = ?1 ORDER BY id DESC LIMIT 1",
            RUN_COLUMNS
        );
        let run = self
            .conn
            .query_row(&sql, params![job_id], run_from_row)
            .optional()?;
        Ok(run)
    }

    fn list_runs(&self, job_id: &str) -> StorageResult<Vec<RunRecord>> {
        let sql = format!(
            "SELECT {} FROM runs WHERE job_id = ?1 ORDER BY id ASC",
            RUN_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![job_id], run_from_row)?;

        let mut runs = Vec::new();
        for row in rows {
            runs.push(row?);
        }
        Ok(runs)
    }

    fn update_run_status(&mut self, run_id: i64, status: RunStatus) -> StorageResult<()> {
        let updated = self.conn.execute(
            "UPDATE runs SET status = ?1 WHERE id = ?2",
            params![status.to_db_string(), run_id],
        )?;
        if updated == 0 {
            return Err(StorageError::RunNotFound(run_id));
        }
        Ok(())
    }

    fn complete_run(&mut self, run_id: i64) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        let updated = self.conn.execute(
            "UPDATE runs SET status = ?1, finished_at = ?2, error_message = NULL WHERE id = ?3",
            params![RunStatus::Completed.to_db_string(), now, run_id],
        )?;
        if updated == 0 {
            return Err(StorageError::RunNotFound(run_id));
        }
        Ok(())
    }

    fn end_run(&mut self, run_id: i64, status: RunStatus, message: &str) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        let updated = self.conn.execute(
            "UPDATE runs SET status = ?1, finished_at = ?2, error_message = ?3 WHERE id = ?4",
            params![status.to_db_string(), now, message, run_id],
        )?;
        if updated == 0 {
            return Err(StorageError::RunNotFound(run_id));
        }
        Ok(())
    }

    // ===== Progress =====

    fn record_plan(
        &mut self,
        run_id: i64,
        base_url: &str,
        total_pages: u32,
        total_results: u64,
    ) -> StorageResult<()> {
        self.conn.execute(
            "UPDATE runs SET base_url = ?1, total_pages = ?2, total_results = ?3 WHERE id = ?4",
            params![base_url, total_pages, total_results as i64, run_id],
        )?;
        Ok(())
    }

    fn record_checkpoint(
        &mut self,
        run_id: i64,
        last_flushed_page: u32,
        rows_written: u64,
        flushes: u64,
        artifact_bytes: u64,
    ) -> StorageResult<()> {
        self.conn.execute(
            "UPDATE runs SET last_flushed_page = ?1, rows_written = ?2, flushes = ?3,
                 artifact_bytes = ?4 WHERE id = ?5",
            params![
                last_flushed_page,
                rows_written as i64,
                flushes as i64,
                artifact_bytes as i64,
                run_id
            ],
        )?;
        Ok(())
    }
}
