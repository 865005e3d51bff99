//! Database schema definitions
//!
//! This module contains the SQL schema for the Story-Harvest run ledger.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- One row per attempt at a job; resumed attempts reuse their row
CREATE TABLE IF NOT EXISTS runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    job_id TEXT NOT NULL,
    started_at TEXT NOT NULL,
    finished_at TEXT,
    config_hash TEXT NOT NULL,
    status TEXT NOT NULL,
    base_url TEXT,
    total_pages INTEGER,
    total_results INTEGER,
    last_flushed_page INTEGER,
    rows_written INTEGER NOT NULL DEFAULT 0,
    flushes INTEGER NOT NULL DEFAULT 0,
    error_message TEXT,
    artifact_bytes INTEGER
);

CREATE INDEX IF NOT EXISTS idx_runs_job ON runs(job_id);
"#;

/// Initializes the database schema
///
/// # Arguments
///
/// * `conn` - The database connection
///
/// # Returns
///
/// * `Ok(())` - Schema initialized successfully
/// * `Err(rusqlite::Error)` - Failed to initialize schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
