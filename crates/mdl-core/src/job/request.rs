//! Download request parameters (the immutable `source` of a job).

use serde::{Deserialize, Serialize};
use std::path::{Component, Path};

use crate::error::JobError;

/// Parameters of a download request, as sent by clients.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadRequest {
    /// Target URL or tool-specific URI (e.g. `ytsearch:...`).
    #[serde(alias = "URL", alias = "Url")]
    pub url: String,
    /// Extra tool arguments, passed verbatim after the generated ones.
    #[serde(alias = "Params")]
    pub params: Vec<String>,
    /// Format selector (`-f`).
    #[serde(alias = "Format", skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    /// Sub-directory of the download directory.
    #[serde(alias = "Path", skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Output filename template.
    #[serde(alias = "Rename", skip_serializing_if = "Option::is_none")]
    pub rename: Option<String>,
}

impl DownloadRequest {
    pub fn for_url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// Reject requests that cannot be turned into a tool invocation.
    pub fn validate(&self) -> Result<(), JobError> {
        let url = self.url.trim();
        if url.is_empty() {
            return Err(JobError::InvalidRequest("missing url".to_string()));
        }
        url::Url::parse(url)
            .map_err(|e| JobError::InvalidRequest(format!("malformed url {url:?}: {e}")))?;

        let all_args = std::iter::once(&self.url)
            .chain(self.params.iter())
            .chain(self.format.iter())
            .chain(self.path.iter())
            .chain(self.rename.iter());
        for arg in all_args {
            if arg.contains('\0') {
                return Err(JobError::InvalidRequest(
                    "arguments must not contain NUL bytes".to_string(),
                ));
            }
        }
        if self.params.iter().any(|p| p.is_empty()) {
            return Err(JobError::InvalidRequest("empty tool argument".to_string()));
        }
        if let Some(path) = &self.path {
            if !is_contained(path) {
                return Err(JobError::InvalidRequest(format!(
                    "path {path:?} must stay inside the download directory"
                )));
            }
        }
        if let Some(rename) = &self.rename {
            if rename.trim().is_empty() || !is_contained(rename) {
                return Err(JobError::InvalidRequest(format!(
                    "invalid output template {rename:?}"
                )));
            }
        }
        Ok(())
    }
}

/// Relative path with no `..`, root or prefix components.
fn is_contained(p: &str) -> bool {
    Path::new(p)
        .components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}
