use crate::archive::{ArchiveError, ArchiveResult};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::Path;

/// Authorized-user credentials for the archival blob store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub client_id: String,
    pub client_secret: String,
    pub quota_project_id: String,
    pub refresh_token: String,
    #[serde(rename = "type")]
    pub kind: String,
}

impl Credentials {
    /// Assembles credentials from optional command-line fields
    ///
    /// # Returns
    ///
    /// * `Ok(Some(_))` - every field was supplied
    /// * `Ok(None)` - no field was supplied
    /// * `Err(_)` - only some fields were supplied
    pub fn from_parts(
        client_id: Option<String>,
        client_secret: Option<String>,
        quota_project_id: Option<String>,
        refresh_token: Option<String>,
        kind: Option<String>,
    ) -> ArchiveResult<Option<Self>> {
        match (client_id, client_secret, quota_project_id, refresh_token, kind) {
            (None, None, None, None, None) => Ok(None),
            (
                Some(client_id),
                Some(client_secret),
                Some(quota_project_id),
                Some(refresh_token),
                Some(kind),
            ) => {
                let credentials = Self {
                    client_id,
                    client_secret,
                    quota_project_id,
                    refresh_token,
                    kind,
                };
                credentials.validate()?;
                Ok(Some(credentials))
            }
            _ => Err(ArchiveError::Credentials(
                "client id, client secret, quota project id, refresh token and type must be given together"
                    .to_string(),
            )),
        }
    }

    fn validate(&self) -> ArchiveResult<()> {
        let fields = [
            ("client_id", &self.client_id),
            ("client_secret", &self.client_secret),
            ("quota_project_id", &self.quota_project_id),
            ("refresh_token", &self.refresh_token),
            ("type", &self.kind),
        ];
        for (name, value) in fields {
            if value.trim().is_empty() {
                return Err(ArchiveError::Credentials(format!("{} is empty", name)));
            }
        }
        Ok(())
    }
}

/// Writes the credentials file, readable by the owner only on Unix
pub fn write_credentials(path: &Path, credentials: &Credentials) -> ArchiveResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let json = serde_json::to_string_pretty(credentials)?;
    let mut file = fs::File::create(path)?;
    file.write_all(json.as_bytes())?;
    file.sync_all()?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
    }

    tracing::info!("Wrote credentials file {}", path.display());
    Ok(())
}

/// Loads and validates a credentials file
pub fn load_credentials(path: &Path) -> ArchiveResult<Credentials> {
    let content = fs::read_to_string(path)?;
    let credentials: Credentials = serde_json::from_str(&content)?;
    credentials.validate()?;
    Ok(credentials)
}
