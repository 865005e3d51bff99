use crate::UrlError;
use std::fmt;
use std::str::FromStr;

/// Opaque identifier of one harvest job
///
/// The id names the job's URL file in the archive bucket and the uploaded
/// artifact, so it is restricted to characters that are safe in object names
/// and local file names.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JobId(String);

impl JobId {
    /// Parses and validates a job id
    ///
    /// Surrounding whitespace is ignored. The id must be non-empty and consist of
    /// ASCII alphanumerics, `-` or `_`.
    pub fn parse(raw: &str) -> Result<Self, UrlError> {
        let id = raw.trim();
        if id.is_empty()
            || !id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(UrlError::InvalidJobId(raw.to_string()));
        }
        Ok(Self(id.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Name of the text file holding this job's opening search URL
    pub fn url_file_name(&self) -> String {
        format!("{}.txt", self.0)
    }

    /// Expands a name template, replacing every `{id}` with this id
    pub fn expand(&self, template: &str) -> String {
        template.replace("{id}", &self.0)
    }
}

impl FromStr for JobId {
    type Err = UrlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
