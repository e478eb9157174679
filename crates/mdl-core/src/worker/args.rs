//! Deterministic argument list for the external tool.
//!
//! Arguments are passed to the process as a literal list; nothing is ever
//! interpreted by a shell. The URL goes after `--` so it cannot be read as
//! an option.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::job::{DownloadRequest, JobKind};

/// Output template used when the request has no `rename`.
pub const DEFAULT_TEMPLATE: &str = "%(title)s.%(ext)s";

/// Directory the job writes into: `download_dir[/path]`.
pub fn output_dir(download_dir: &Path, source: &DownloadRequest) -> PathBuf {
    match source.path.as_deref().filter(|p| !p.is_empty()) {
        Some(sub) => download_dir.join(sub),
        None => download_dir.to_path_buf(),
    }
}

/// Build the tool's argument list for a job.
pub fn build_args(kind: JobKind, source: &DownloadRequest, download_dir: &Path) -> Vec<OsString> {
    let template = source
        .rename
        .as_deref()
        .filter(|r| !r.trim().is_empty())
        .unwrap_or(DEFAULT_TEMPLATE);
    let output = output_dir(download_dir, source).join(template);

    let mut args: Vec<OsString> = vec![
        "--newline".into(),
        "--no-colors".into(),
        "-o".into(),
        output.into_os_string(),
    ];
    match kind {
        JobKind::Single => args.push("--no-playlist".into()),
        JobKind::Playlist => args.push("--yes-playlist".into()),
        JobKind::Livestream => {
            args.extend(["--wait-for-video".into(), "10".into(), "--no-part".into()]);
        }
    }
    if let Some(format) = source.format.as_deref().filter(|f| !f.is_empty()) {
        args.push("-f".into());
        args.push(format.into());
    }
    args.extend(source.params.iter().map(OsString::from));
    args.push("--".into());
    args.push(source.url.trim().into());
    args
}
