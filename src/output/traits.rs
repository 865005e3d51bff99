//! Record sink trait
//!
//! The pagination driver hands every page's records to a sink and never
//! touches the artifact directly.

use crate::output::StoryRecord;
use crate::HarvestError;

/// Trait for record sinks
///
/// A sink buffers records and persists them in batches. Page numbers passed to
/// `append` must be non-decreasing.
pub trait RecordSink {
    /// Buffers one page's records, flushing every full batch
    ///
    /// # Returns
    ///
    /// The number of flushes this call performed
    fn append(&mut self, page: u32, records: Vec<StoryRecord>) -> Result<usize, HarvestError>;

    /// Persists whatever is buffered
    ///
    /// Returns `false` without touching storage when the buffer is empty.
    fn flush(&mut self) -> Result<bool, HarvestError>;

    /// Flushes the final partial batch and makes sure the artifact exists
    fn finish(&mut self) -> Result<(), HarvestError>;

    /// Highest page whose records are all persisted
    fn durable_page(&self) -> Option<u32>;

    /// Number of records persisted so far
    fn rows_written(&self) -> u64;

    /// Number of flushes that wrote at least one record
    fn flush_count(&self) -> u64;

    /// Artifact length in bytes after the most recent flush
    fn artifact_bytes(&self) -> u64;
}
