//! Line grammar of the tool's progress output (subset).
//!
//! Recognized lines:
//!
//! ```text
//! [download]  42.0% of ~ 10.00MiB at  1.50MiB/s ETA 00:05 (frag 1/9)
//! [download] 100% of 10.00MiB in 00:00:03 at 3.10MiB/s
//! [download]   12.50MiB at  1.02MiB/s (00:00:12)
//! [download] Destination: /dl/Title.f137.mp4
//! [download] Downloading item 3 of 10
//! [download] /dl/Title.mp4 has already been downloaded
//! [Merger] Merging formats into "/dl/Title.mp4"
//! [ExtractAudio] Destination: /dl/Title.mp3
//! [MoveFiles] Moving file "/tmp/Title.mp4" to "/dl/Title.mp4"
//! ```
//!
//! Anything else is not progress.

use regex::Regex;
use std::sync::OnceLock;

/// One recognized output line.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    /// Transfer status. `percent` is absent for livestreams.
    Download {
        percent: Option<f64>,
        total_bytes: Option<u64>,
        speed_bps: Option<f64>,
        eta_secs: Option<u64>,
    },
    /// The tool started writing a (possibly intermediate) file.
    Destination(String),
    /// The final artifact path (merge, post-processing, move, or already present).
    Output(String),
    PlaylistItem { index: u32, count: u32 },
}

struct Grammar {
    percent: Regex,
    live: Regex,
    destination: Regex,
    item: Regex,
    already: Regex,
    merger: Regex,
    extract_audio: Regex,
    move_files: Regex,
}

fn grammar() -> &'static Grammar {
    static GRAMMAR: OnceLock<Grammar> = OnceLock::new();
    GRAMMAR.get_or_init(|| {
        let re = |s: &str| Regex::new(s).expect("progress grammar regex");
        Grammar {
            percent: re(r"^\[download\]\s+(\d+(?:\.\d+)?)%(.*)$"),
            live: re(r"^\[download\]\s+(\d+(?:\.\d+)?\s?[KMGT]?i?B)\s+at\s+(\S+)"),
            destination: re(r"^\[download\] Destination: (.+)$"),
            item: re(r"^\[download\] Downloading (?:item|video) (\d+) of (\d+)"),
            already: re(r"^\[download\] (.+) has already been downloaded"),
            merger: re(r#"^\[Merger\] Merging formats into "(.+)"$"#),
            extract_audio: re(r"^\[ExtractAudio\] Destination: (.+)$"),
            move_files: re(r#"^\[MoveFiles\] Moving file ".+" to "(.+)"$"#),
        }
    })
}

/// Parse one output line. Returns `None` for lines outside the grammar.
pub fn parse_line(line: &str) -> Option<ProgressEvent> {
    let line = line.trim_end_matches(['\r', '\n']);
    let g = grammar();

    if let Some(c) = g.percent.captures(line) {
        let percent = c[1].parse::<f64>().ok()?;
        let mut event = parse_transfer_tail(&c[2]);
        if let ProgressEvent::Download { percent: p, .. } = &mut event {
            *p = Some(percent.clamp(0.0, 100.0));
        }
        return Some(event);
    }
    if let Some(c) = g.destination.captures(line) {
        return Some(ProgressEvent::Destination(c[1].trim().to_string()));
    }
    if let Some(c) = g.item.captures(line) {
        let index = c[1].parse().ok()?;
        let count = c[2].parse().ok()?;
        return Some(ProgressEvent::PlaylistItem { index, count });
    }
    if let Some(c) = g.already.captures(line) {
        return Some(ProgressEvent::Output(c[1].trim().to_string()));
    }
    if let Some(c) = g
        .merger
        .captures(line)
        .or_else(|| g.extract_audio.captures(line))
        .or_else(|| g.move_files.captures(line))
    {
        return Some(ProgressEvent::Output(c[1].trim().to_string()));
    }
    if let Some(c) = g.live.captures(line) {
        return Some(ProgressEvent::Download {
            percent: None,
            total_bytes: parse_size(&c[1]),
            speed_bps: parse_speed(&c[2]),
            eta_secs: None,
        });
    }
    None
}

/// Scan the keyword/value tail after the percentage: `of`, `at`, `ETA`, `in`.
fn parse_transfer_tail(rest: &str) -> ProgressEvent {
    let mut total_bytes = None;
    let mut speed_bps = None;
    let mut eta_secs = None;
    let mut tokens = rest.split_whitespace().peekable();
    while let Some(tok) = tokens.next() {
        match tok {
            "of" => {
                let mut value = tokens.next();
                if value == Some("~") {
                    value = tokens.next();
                }
                total_bytes = value.and_then(|v| parse_size(v.trim_start_matches('~')));
            }
            "at" => speed_bps = tokens.next().and_then(parse_speed),
            "ETA" => eta_secs = tokens.next().and_then(parse_clock),
            _ => {}
        }
    }
    ProgressEvent::Download {
        percent: None,
        total_bytes,
        speed_bps,
        eta_secs,
    }
}

/// `10.00MiB`, `512KiB`, `1.2 GB`, `300B` -> bytes. `Unknown`/`N/A` -> None.
pub fn parse_size(s: &str) -> Option<u64> {
    let s = s.trim();
    let split = s
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(s.len());
    let (num, unit) = s.split_at(split);
    let value: f64 = num.parse().ok()?;
    let factor: f64 = match unit.trim() {
        "B" | "" => 1.0,
        "KiB" => 1024.0,
        "MiB" => 1024.0 * 1024.0,
        "GiB" => 1024.0 * 1024.0 * 1024.0,
        "TiB" => 1024.0 * 1024.0 * 1024.0 * 1024.0,
        "KB" | "kB" => 1e3,
        "MB" => 1e6,
        "GB" => 1e9,
        "TB" => 1e12,
        _ => return None,
    };
    Some((value * factor).round() as u64)
}

/// `1.50MiB/s` -> bytes per second.
pub fn parse_speed(s: &str) -> Option<f64> {
    let size = s.trim().strip_suffix("/s")?;
    parse_size(size).map(|b| b as f64)
}

/// `05`, `00:05`, `01:02:03` -> seconds.
pub fn parse_clock(s: &str) -> Option<u64> {
    let mut secs = 0u64;
    for part in s.trim().split(':') {
        let n: u64 = part.parse().ok()?;
        secs = secs.checked_mul(60)?.checked_add(n)?;
    }
    Some(secs)
}
