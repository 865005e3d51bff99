//! Output module for persisting harvested records
//!
//! This module handles:
//! - The story record type and its fixed column schema
//! - Buffering records and flushing them to the gzip CSV artifact
//! - Harvest statistics and run reports

mod checkpoint;
pub mod record;
pub mod stats;
mod traits;

pub use checkpoint::{read_artifact, truncate_artifact, CheckpointWriter};
pub use record::{StoryRecord, COLUMNS};
pub use stats::{print_runs, HarvestStats};
pub use traits::RecordSink;
