//! Progress extraction from the tool's output stream.
//!
//! `parse` holds the line grammar; `ProgressTracker` folds recognized lines
//! into a `Progress` snapshot and keeps the last unrecognized lines as
//! diagnostic context for error messages.

mod parse;

pub use parse::{parse_clock, parse_line, parse_size, parse_speed, ProgressEvent};

use std::collections::VecDeque;

use crate::job::Progress;

/// Unrecognized lines kept for error reporting.
const DIAGNOSTIC_LINES: usize = 16;

/// Per-job progress state, owned by the worker running the job.
#[derive(Debug, Default)]
pub struct ProgressTracker {
    progress: Progress,
    output_path: Option<String>,
    diagnostics: VecDeque<String>,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume one output line. Returns the refined snapshot when the line
    /// changed progress, `None` otherwise.
    pub fn feed(&mut self, line: &str) -> Option<&Progress> {
        let Some(event) = parse_line(line) else {
            let line = line.trim();
            if !line.is_empty() {
                if self.diagnostics.len() == DIAGNOSTIC_LINES {
                    self.diagnostics.pop_front();
                }
                self.diagnostics.push_back(line.to_string());
            }
            return None;
        };
        self.apply(event).then_some(&self.progress)
    }

    fn apply(&mut self, event: ProgressEvent) -> bool {
        match event {
            ProgressEvent::Download {
                percent,
                total_bytes,
                speed_bps,
                eta_secs,
            } => {
                if let Some(pct) = percent {
                    let overall = match (self.progress.playlist_index, self.progress.playlist_count)
                    {
                        (Some(i), Some(n)) if n > 0 => {
                            (f64::from(i.saturating_sub(1)) + pct / 100.0) / f64::from(n) * 100.0
                        }
                        _ => pct,
                    };
                    self.progress.percentage = self.progress.percentage.max(overall.min(100.0));
                }
                if total_bytes.is_some() {
                    self.progress.total_bytes = total_bytes;
                }
                self.progress.speed_bps = speed_bps;
                self.progress.eta_secs = eta_secs;
                true
            }
            ProgressEvent::Destination(path) => {
                self.progress.filename = Some(file_name(&path));
                self.output_path = Some(path);
                true
            }
            ProgressEvent::Output(path) => {
                self.progress.filename = Some(file_name(&path));
                self.output_path = Some(path);
                true
            }
            ProgressEvent::PlaylistItem { index, count } => {
                self.progress.playlist_index = Some(index);
                self.progress.playlist_count = Some(count);
                true
            }
        }
    }

    pub fn progress(&self) -> &Progress {
        &self.progress
    }

    /// Best known path of the final artifact.
    pub fn output_path(&self) -> Option<&str> {
        self.output_path.as_deref()
    }

    pub fn last_diagnostic(&self) -> Option<&str> {
        self.diagnostics.back().map(String::as_str)
    }

    pub fn diagnostics(&self) -> impl Iterator<Item = &str> {
        self.diagnostics.iter().map(String::as_str)
    }
}

fn file_name(path: &str) -> String {
    std::path::Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string())
}
