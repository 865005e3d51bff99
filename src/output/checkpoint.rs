//! Append-only gzip CSV checkpoint writer
//!
//! Every flush opens the artifact in append mode and writes one complete gzip
//! member, so a crash after a flush returns loses at most the batch still in
//! memory. A flush that fails part way is cut back to the length the file had
//! before it started. Re-running a job against the same path accumulates rows;
//! only a resumed run rewinds the artifact, to the length recorded at its last
//! checkpoint. Readers must use a multi-member gzip decoder such as
//! `flate2::read::MultiGzDecoder`.

use crate::output::record::{StoryRecord, COLUMNS};
use crate::output::traits::RecordSink;
use crate::HarvestError;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::collections::VecDeque;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Buffers records and flushes them in fixed-size batches to the artifact
#[derive(Debug)]
pub struct CheckpointWriter {
    path: PathBuf,
    compression: Compression,
    write_header: bool,
    batch_size: usize,
    buffer: Vec<StoryRecord>,
    /// (page, records of that page still buffered), oldest first
    pending_pages: VecDeque<(u32, usize)>,
    last_page: Option<u32>,
    rows_written: u64,
    flushes: u64,
    artifact_bytes: u64,
}

impl CheckpointWriter {
    /// Creates a writer for the artifact at `path`
    ///
    /// Nothing is written until the first flush. A `batch_size` of 0 is
    /// treated as 1.
    pub fn new(path: impl Into<PathBuf>, batch_size: usize, compression_level: u32) -> Self {
        Self {
            path: path.into(),
            compression: Compression::new(compression_level.min(9)),
            write_header: true,
            batch_size: batch_size.max(1),
            buffer: Vec::new(),
            pending_pages: VecDeque::new(),
            last_page: None,
            rows_written: 0,
            flushes: 0,
            artifact_bytes: 0,
        }
    }

    /// Controls whether a header row starts an empty artifact
    pub fn with_header(mut self, write_header: bool) -> Self {
        self.write_header = write_header;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Writes the first `count` buffered records and drops them from the buffer
    ///
    /// Records leave the buffer only after the write succeeded.
    fn flush_front(&mut self, count: usize) -> Result<(), HarvestError> {
        self.artifact_bytes = self.write_rows(&self.buffer[..count])?;
        self.buffer.drain(..count);

        let mut remaining = count;
        while remaining > 0 {
            let Some(front) = self.pending_pages.front_mut() else {
                break;
            };
            if front.1 <= remaining {
                remaining -= front.1;
                self.pending_pages.pop_front();
            } else {
                front.1 -= remaining;
                remaining = 0;
            }
        }

        self.rows_written += count as u64;
        self.flushes += 1;

        tracing::info!(
            "Flushed {} records to {} (flush #{}, {} rows total)",
            count,
            self.path.display(),
            self.flushes,
            self.rows_written
        );

        Ok(())
    }

    /// Appends one gzip member holding `rows` and returns the new file length
    fn write_rows(&self, rows: &[StoryRecord]) -> Result<u64, HarvestError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let is_empty = file.metadata()?.len() == 0;

        append_member(&file, |mut out| {
            let encoder = GzEncoder::new(&mut out, self.compression);
            let mut writer = csv::WriterBuilder::new()
                .has_headers(false)
                .from_writer(encoder);

            if is_empty && self.write_header {
                writer.write_record(COLUMNS)?;
            }
            for record in rows {
                writer.write_record(record.to_row())?;
            }

            let encoder = writer.into_inner().map_err(|e| e.into_error())?;
            encoder.finish()?.flush()?;
            Ok(())
        })
    }
}

/// Runs `write` against `file` and syncs it, cutting the file back to its
/// starting length if anything fails
///
/// Returns the file length after a successful write.
fn append_member<F>(file: &File, write: F) -> Result<u64, HarvestError>
where
    F: FnOnce(&File) -> Result<(), HarvestError>,
{
    let start_len = file.metadata()?.len();

    let result = write(file).and_then(|()| {
        file.sync_data()?;
        Ok(file.metadata()?.len())
    });

    if result.is_err() {
        match file.set_len(start_len).and_then(|()| file.sync_data()) {
            Ok(()) => tracing::warn!("Rolled back partial flush to {} bytes", start_len),
            Err(e) => tracing::error!("Failed to roll back partial flush: {}", e),
        }
    }

    result
}

/// Cuts the artifact at `path` back to `len` bytes
///
/// Used when resuming a run so that bytes written after its last checkpoint
/// (possibly a torn gzip member) do not precede the resumed rows. Returns
/// `true` when bytes were removed. A missing file or one already shorter than
/// `len` is left alone.
pub fn truncate_artifact(path: &Path, len: u64) -> Result<bool, HarvestError> {
    let current = match fs::metadata(path) {
        Ok(meta) => meta.len(),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e.into()),
    };

    if current < len {
        tracing::warn!(
            "Artifact {} is {} bytes, shorter than the {} recorded at the last checkpoint",
            path.display(),
            current,
            len
        );
        return Ok(false);
    }
    if current == len {
        return Ok(false);
    }

    let file = OpenOptions::new().write(true).open(path)?;
    file.set_len(len)?;
    file.sync_data()?;

    tracing::warn!(
        "Truncated {} from {} to {} bytes (last checkpoint)",
        path.display(),
        current,
        len
    );
    Ok(true)
}

impl RecordSink for CheckpointWriter {
    fn append(&mut self, page: u32, records: Vec<StoryRecord>) -> Result<usize, HarvestError> {
        self.last_page = Some(self.last_page.map_or(page, |last| last.max(page)));

        if !records.is_empty() {
            self.pending_pages.push_back((page, records.len()));
            self.buffer.extend(records);
        }

        let mut flushes = 0;
        while self.buffer.len() >= self.batch_size {
            self.flush_front(self.batch_size)?;
            flushes += 1;
        }

        Ok(flushes)
    }

    fn flush(&mut self) -> Result<bool, HarvestError> {
        if self.buffer.is_empty() {
            return Ok(false);
        }
        self.flush_front(self.buffer.len())?;
        Ok(true)
    }

    fn finish(&mut self) -> Result<(), HarvestError> {
        self.flush()?;
        if !self.path.exists() {
            self.artifact_bytes = self.write_rows(&[])?;
            tracing::info!("Created empty artifact {}", self.path.display());
        }
        Ok(())
    }

    fn durable_page(&self) -> Option<u32> {
        match self.pending_pages.front() {
            Some(&(page, _)) => page.checked_sub(1).filter(|p| *p > 0),
            None => self.last_page,
        }
    }

    fn rows_written(&self) -> u64 {
        self.rows_written
    }

    fn flush_count(&self) -> u64 {
        self.flushes
    }

    fn artifact_bytes(&self) -> u64 {
        self.artifact_bytes
    }
}

/// Reads every data row of an artifact, skipping header rows
///
/// Handles artifacts made of several gzip members.
pub fn read_artifact(path: &Path) -> Result<Vec<Vec<String>>, HarvestError> {
    let file = fs::File::open(path)?;
    let decoder = flate2::read::MultiGzDecoder::new(file);
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(decoder);

    let mut rows = Vec::new();
    for result in reader.records() {
        let record = result?;
        if record.iter().eq(COLUMNS.iter().copied()) {
            continue;
        }
        rows.push(record.iter().map(str::to_string).collect());
    }
    Ok(rows)
}
