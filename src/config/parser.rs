use crate::config::types::Config;
use crate::config::validation::validate;
use crate::ConfigError;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Loads and parses a configuration file from the given path
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Returns
///
/// * `Ok(Config)` - Successfully loaded and validated configuration
/// * `Err(ConfigError)` - Failed to load, parse, or validate the configuration
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let config: Config = toml::from_str(&content)?;
    validate(&config)?;
    Ok(config)
}

/// Computes a SHA-256 hash of the configuration file content
///
/// The hash is stored on every ledger run so that a resumed job can be told
/// apart from one started under different settings.
pub fn compute_config_hash(path: &Path) -> Result<String, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}

/// Loads a configuration and returns both the config and its hash
pub fn load_config_with_hash(path: &Path) -> Result<(Config, String), ConfigError> {
    let config = load_config(path)?;
    let hash = compute_config_hash(path)?;
    Ok((config, hash))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::path::PathBuf;
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    const USER_AGENT: &str = r#"
[user-agent]
crawler-name = "TestHarvester"
crawler-version = "1.0"
contact-url = "https://example.com/about"
contact-email = "admin@example.com"
"#;

    #[test]
    fn test_load_minimal_config_uses_defaults() {
        let file = create_temp_config(USER_AGENT);
        let config = load_config(file.path()).unwrap();

        assert_eq!(config.crawler.page_delay_ms, 2100);
        assert_eq!(config.crawler.batch_size, 100);
        assert!((config.backoff.damping - 0.8).abs() < f64::EPSILON);
        assert_eq!(config.backoff.safety_margin_secs, 5);
        assert_eq!(config.output.compression_level, 8);
        assert_eq!(config.output.artifact_path, PathBuf::from("./story_metas.gz"));
        assert_eq!(config.archive.bucket, "ao3_data_repository");
        assert_eq!(config.archive.artifact_name, "story_metas_{id}.gz");
        assert_eq!(config.user_agent.crawler_name, "TestHarvester");
    }

    #[test]
    fn test_load_full_config() {
        let content = format!(
            r#"
[crawler]
page-delay-ms = 500
batch-size = 25

[backoff]
damping = 0.5
safety-margin-secs = 1
max-consecutive-rate-limits = 3

[output]
artifact-path = "/tmp/out.gz"
state-path = "/tmp/state.db"
compression-level = 6
write-header = false

[archive]
bucket = "archive-bucket"
store-root = "/mnt/buckets"
artifact-name = "metas/{{id}}.gz"
{}
"#,
            USER_AGENT
        );

        let file = create_temp_config(&content);
        let config = load_config(file.path()).unwrap();

        assert_eq!(config.crawler.page_delay_ms, 500);
        assert_eq!(config.crawler.batch_size, 25);
        assert_eq!(config.crawler.request_timeout_secs, 30);
        assert_eq!(config.backoff.max_consecutive_rate_limits, 3);
        assert_eq!(config.backoff.default_retry_after_secs, 60);
        assert!(!config.output.write_header);
        assert_eq!(config.output.compression_level, 6);
        assert_eq!(config.archive.bucket, "archive-bucket");
        assert_eq!(config.archive.artifact_name, "metas/{id}.gz");
        assert_eq!(config.archive.url_prefix, "urldir");
    }

    #[test]
    fn test_load_config_with_invalid_path() {
        let result = load_config(Path::new("/nonexistent/harvest.toml"));
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[test]
    fn test_load_config_with_invalid_toml() {
        let file = create_temp_config("this is not valid TOML {{{");
        let result = load_config(file.path());
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_missing_user_agent_is_parse_error() {
        let file = create_temp_config("[crawler]\nbatch-size = 10\n");
        assert!(matches!(
            load_config(file.path()),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_load_config_with_validation_error() {
        let content = format!("[crawler]\nbatch-size = 0\n{}", USER_AGENT);
        let file = create_temp_config(&content);
        let result = load_config(file.path());
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_compute_config_hash() {
        let file = create_temp_config("test content");

        let hash1 = compute_config_hash(file.path()).unwrap();
        let hash2 = compute_config_hash(file.path()).unwrap();

        assert_eq!(hash1, hash2);
        assert_eq!(hash1.len(), 64);
    }

    #[test]
    fn test_different_content_different_hash() {
        let file1 = create_temp_config("content 1");
        let file2 = create_temp_config("content 2");

        let hash1 = compute_config_hash(file1.path()).unwrap();
        let hash2 = compute_config_hash(file2.path()).unwrap();

        assert_ne!(hash1, hash2);
    }
}
