//! Find running processes by command name via `/proc`.

use anyhow::{bail, Context, Result};
use std::fs;
use std::path::Path;

/// PIDs of every process whose command name is exactly `name`.
///
/// Processes that vanish or cannot be inspected while scanning are skipped.
///
/// # Errors
/// Returns an error if `proc_root` cannot be listed.
pub fn find_pids_by_name(proc_root: &Path, name: &str) -> Result<Vec<i32>> {
    let proc_dir =
        fs::read_dir(proc_root).with_context(|| format!("Failed to read {}", proc_root.display()))?;

    let mut pids = Vec::new();
    for entry in proc_dir.flatten() {
        let file_name = entry.file_name();
        let Ok(pid) = file_name.to_string_lossy().parse::<i32>() else {
            continue;
        };

        let Ok(stat_content) = fs::read_to_string(entry.path().join("stat")) else {
            continue;
        };
        let Ok(command) = extract_comm(&stat_content) else {
            continue;
        };

        if command == name {
            pids.push(pid);
        }
    }

    pids.sort_unstable();
    Ok(pids)
}

/// Extract command name from `/proc/<pid>/stat`.
/// Format: "pid (comm) state ..."
fn extract_comm(stat_line: &str) -> Result<String> {
    let open = stat_line.find('(').context("Invalid stat format")?;
    let close = stat_line.rfind(')').context("Invalid stat format")?;
    if open >= close {
        bail!("Invalid stat format");
    }
    Ok(stat_line[open + 1..close].to_string())
}
