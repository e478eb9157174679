//! Helpers for integration tests: fake tool scripts and polling.

#![allow(dead_code)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use mdl_core::{Job, JobStore};

/// Shell prelude that sets `$dir` to the directory of the `-o` template.
const PRELUDE: &str = r#"#!/bin/sh
out=""
prev=""
for a in "$@"; do
  if [ "$prev" = "-o" ]; then out="$a"; fi
  prev="$a"
done
dir=$(dirname "$out")
"#;

/// Write an executable fake tool named `name` into `dir` running `body`.
pub fn write_tool(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, format!("{PRELUDE}{body}\n")).expect("write tool script");
    let mut perms = std::fs::metadata(&path).expect("stat tool").permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).expect("chmod tool");
    path
}

/// Tool that reports progress, writes `clip.mp4` and exits 0.
pub fn succeeding_tool(dir: &Path) -> PathBuf {
    write_tool(
        dir,
        "ok-tool",
        r#"echo "[download] Destination: $dir/clip.mp4"
echo "[download]  50.0% of 10.00MiB at  1.00MiB/s ETA 00:05"
echo "[download] 100% of 10.00MiB in 00:00:03 at 3.10MiB/s"
: > "$dir/clip.mp4"
exit 0"#,
    )
}

/// Tool that prints an error and exits 2.
pub fn failing_tool(dir: &Path) -> PathBuf {
    write_tool(
        dir,
        "bad-tool",
        r#"echo "WARNING: something odd" >&2
echo "ERROR: Unsupported URL: $1" >&2
exit 2"#,
    )
}

/// Tool that reports 42% and then runs until killed.
pub fn hanging_tool(dir: &Path) -> PathBuf {
    write_tool(
        dir,
        "hang-tool",
        r#"echo "[download]  42.0% of 10.00MiB at  1.00MiB/s ETA 00:05"
sleep 30
exit 0"#,
    )
}

/// Tool that starts a background helper, records its pid in `pid_file`
/// and waits on it.
pub fn forking_tool(dir: &Path, pid_file: &Path) -> PathBuf {
    write_tool(
        dir,
        "fork-tool",
        &format!(
            r#"sleep 300 &
echo $! > "{}.tmp" && mv "{}.tmp" "{}"
wait"#,
            pid_file.display(),
            pid_file.display(),
            pid_file.display()
        ),
    )
}

/// Whether `pid` names a live, non-zombie process.
#[cfg(target_os = "linux")]
pub fn process_alive(pid: u32) -> bool {
    match std::fs::read_to_string(format!("/proc/{pid}/stat")) {
        // Third field is the state; the name in parens may contain spaces.
        Ok(stat) => stat
            .rsplit(')')
            .next()
            .and_then(|rest| rest.split_whitespace().next())
            .is_some_and(|state| state != "Z"),
        Err(_) => false,
    }
}

/// Tool that waits until `gate` exists, then succeeds.
pub fn gated_tool(dir: &Path, gate: &Path) -> PathBuf {
    write_tool(
        dir,
        "gated-tool",
        &format!(
            r#"while [ ! -f "{}" ]; do sleep 0.05; done
exit 0"#,
            gate.display()
        ),
    )
}

/// Poll `store` until job `id` satisfies `pred`; panics after 10s.
pub async fn wait_for(store: &JobStore, id: &str, pred: impl Fn(&Job) -> bool) -> Job {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        if let Some(job) = store.get(id) {
            if pred(&job) {
                return job;
            }
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting on job {id}: {:?}",
            store.get(id)
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}
