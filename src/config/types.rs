use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration structure for Story-Harvest
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub crawler: CrawlerConfig,
    #[serde(default)]
    pub backoff: BackoffConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub archive: ArchiveConfig,
}

/// Pagination and batching behavior
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CrawlerConfig {
    /// Fixed delay inserted before every page fetch after the first (milliseconds)
    #[serde(rename = "page-delay-ms")]
    pub page_delay_ms: u64,

    /// Number of records buffered before a flush to the artifact
    #[serde(rename = "batch-size")]
    pub batch_size: usize,

    /// Total request timeout (seconds)
    #[serde(rename = "request-timeout-secs")]
    pub request_timeout_secs: u64,

    /// Connection establishment timeout (seconds)
    #[serde(rename = "connect-timeout-secs")]
    pub connect_timeout_secs: u64,
}

impl CrawlerConfig {
    pub fn page_delay(&self) -> Duration {
        Duration::from_millis(self.page_delay_ms)
    }
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            page_delay_ms: 2100,
            batch_size: 100,
            request_timeout_secs: 30,
            connect_timeout_secs: 10,
        }
    }
}

/// Handling of HTTP 429 responses
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    /// Multiplier applied to the server's `retry-after` value
    pub damping: f64,

    /// Seconds added on top of the damped wait
    #[serde(rename = "safety-margin-secs")]
    pub safety_margin_secs: u64,

    /// Wait assumed when a 429 carries no usable `retry-after` header (seconds)
    #[serde(rename = "default-retry-after-secs")]
    pub default_retry_after_secs: u64,

    /// Consecutive 429s tolerated for one URL before giving up (0 = unlimited)
    #[serde(rename = "max-consecutive-rate-limits")]
    pub max_consecutive_rate_limits: u32,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            damping: 0.8,
            safety_margin_secs: 5,
            default_retry_after_secs: 60,
            max_consecutive_rate_limits: 20,
        }
    }
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentConfig {
    /// Name of the crawler
    #[serde(rename = "crawler-name")]
    pub crawler_name: String,

    /// Version of the crawler
    #[serde(rename = "crawler-version")]
    pub crawler_version: String,

    /// URL with information about the crawler
    #[serde(rename = "contact-url")]
    pub contact_url: String,

    /// Email address for crawler-related contact
    #[serde(rename = "contact-email")]
    pub contact_email: String,
}

impl UserAgentConfig {
    /// Formats the header value: `CrawlerName/Version (+ContactURL; ContactEmail)`
    pub fn header_value(&self) -> String {
        format!(
            "{}/{} (+{}; {})",
            self.crawler_name, self.crawler_version, self.contact_url, self.contact_email
        )
    }
}

/// Local output configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Path of the gzip CSV artifact
    #[serde(rename = "artifact-path")]
    pub artifact_path: PathBuf,

    /// Path of the SQLite run ledger
    #[serde(rename = "state-path")]
    pub state_path: PathBuf,

    /// Gzip level used for every flush (0-9)
    #[serde(rename = "compression-level")]
    pub compression_level: u32,

    /// Whether a header row starts a new artifact
    #[serde(rename = "write-header")]
    pub write_header: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            artifact_path: PathBuf::from("./story_metas.gz"),
            state_path: PathBuf::from("./harvest_state.db"),
            compression_level: 8,
            write_header: true,
        }
    }
}

/// Archival blob store configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ArchiveConfig {
    /// Bucket holding URL files and finished artifacts
    pub bucket: String,

    /// Directory under which each bucket is a subdirectory
    #[serde(rename = "store-root")]
    pub store_root: PathBuf,

    /// Remote folder holding one `<id>.txt` URL file per job
    #[serde(rename = "url-prefix")]
    pub url_prefix: String,

    /// Remote name of the uploaded artifact; `{id}` expands to the job id
    #[serde(rename = "artifact-name")]
    pub artifact_name: String,

    /// Local path of the credentials file
    #[serde(rename = "credentials-path")]
    pub credentials_path: PathBuf,

    /// Local directory receiving downloaded URL files
    #[serde(rename = "work-dir")]
    pub work_dir: PathBuf,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            bucket: "ao3_data_repository".to_string(),
            store_root: PathBuf::from("./bucket"),
            url_prefix: "urldir".to_string(),
            artifact_name: "story_metas_{id}.gz".to_string(),
            credentials_path: PathBuf::from("./client_secrets.json"),
            work_dir: PathBuf::from("."),
        }
    }
}
