//! `mdl status` – show the jobs in the snapshot.

use anyhow::Result;
use mdl_core::store::load_jobs;
use mdl_core::Job;
use std::path::Path;

pub fn run_status(snapshot: &Path) -> Result<()> {
    let jobs = load_jobs(snapshot)?;
    if jobs.is_empty() {
        println!("No jobs in {}.", snapshot.display());
    } else {
        println!(
            "{:<36} {:<10} {:<10} {:>6} {}",
            "ID", "KIND", "STATUS", "PCT", "URL"
        );
        for j in &jobs {
            println!("{}", format_row(j));
        }
    }
    Ok(())
}

fn format_row(j: &Job) -> String {
    let mut row = format!(
        "{:<36} {:<10} {:<10} {:>5.1}% {}",
        j.id,
        j.kind.as_str(),
        j.status.as_str(),
        j.progress.percentage,
        j.source.url
    );
    if let Some(err) = &j.error {
        row.push_str(&format!("  ({err})"));
    } else if let Some(path) = &j.output_path {
        row.push_str(&format!("  -> {path}"));
    }
    row
}
