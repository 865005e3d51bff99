//! Story-Harvest: a paginated listing harvester
//!
//! This crate walks the pages of a search-results listing, extracts one record per
//! story entry, and checkpoints the records into an append-only gzip CSV artifact
//! that is handed to an archival blob store once the job finishes.

pub mod archive;
pub mod config;
pub mod crawler;
pub mod output;
pub mod state;
pub mod storage;
pub mod url;

use thiserror::Error;

/// Main error type for Story-Harvest operations
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("HTTP error for {url}: {source}")]
    Http { url: String, source: reqwest::Error },

    #[error("Server kept rate limiting {url} after {attempts} attempts")]
    TransientServer { url: String, attempts: u32 },

    #[error("HTTP {status} for {url}")]
    HttpStatus { url: String, status: u16 },

    #[error("Invalid CSS selector: {0}")]
    Selector(String),

    #[error("Page structure error for {url}: {message}")]
    Parse { url: String, message: String },

    #[error("Invalid driver transition: {from:?} -> {to:?}")]
    InvalidTransition {
        from: state::DriverState,
        to: state::DriverState,
    },

    #[error("Harvest stopped before page {next_page}")]
    Cancelled { next_page: u32 },

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Archive error: {0}")]
    Archive(#[from] archive::ArchiveError),

    #[error("URL error: {0}")]
    Url(#[from] UrlError),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// URL and job id errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Invalid job id: {0:?}")]
    InvalidJobId(String),

    #[error("Invalid page number: {0}")]
    InvalidPage(u32),
}

/// Result type alias for Story-Harvest operations
pub type Result<T> = std::result::Result<T, HarvestError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use config::Config;
pub use output::{CheckpointWriter, StoryRecord};
pub use state::{DriverState, StopSignal};
pub use url::{page_url, JobId};
