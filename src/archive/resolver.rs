use crate::archive::{ArchiveError, BlobStore};
use crate::config::ArchiveConfig;
use crate::url::{parse_search_url, JobId};
use crate::HarvestError;
use std::fs;
use url::Url;

/// Resolves a job id to its opening search URL
///
/// Downloads `<url-prefix>/<id>.txt` from the archive bucket into the work
/// directory and parses its trimmed content as an HTTP(S) URL.
pub fn resolve_job_url(
    store: &dyn BlobStore,
    config: &ArchiveConfig,
    job_id: &JobId,
) -> Result<Url, HarvestError> {
    let file_name = job_id.url_file_name();
    let remote_path = if config.url_prefix.is_empty() {
        file_name.clone()
    } else {
        format!("{}/{}", config.url_prefix.trim_end_matches('/'), file_name)
    };
    let local_path = config.work_dir.join(&file_name);

    tracing::info!("Downloading URL file {}/{}", config.bucket, remote_path);
    store.download(&config.bucket, &remote_path, &local_path)?;

    let content = fs::read_to_string(&local_path)?;
    let url = parse_search_url(&content).map_err(|e| ArchiveError::InvalidJobUrl {
        path: local_path.clone(),
        message: e.to_string(),
    })?;

    tracing::info!("Job {} resolves to {}", job_id, url);
    Ok(url)
}
