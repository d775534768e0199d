//! Docker daemon registration of `dkrunc` as the default runtime

#![allow(unsafe_code)] // kill() requires unsafe

use std::fs;
use std::io;
use std::path::Path;
use std::process::Command;

use anyhow::{bail, Context, Result};
use apm_inject_common::DKRUNC_NAME;
use log::{info, warn};
use serde_json::{Map, Value};

use crate::fs_util::write_atomic;
use crate::process_lookup::find_pids_by_name;

/// Docker daemon configuration file
pub const DAEMON_JSON: &str = "/etc/docker/daemon.json";

/// Per-container state written by dockerd
pub const CONTAINERS_DIR: &str = "/var/lib/docker/containers";

pub const RUNTIME_RUNC: &str = "runc";

const FIELD_DEFAULT_RUNTIME: &str = "default-runtime";
const FIELD_RUNTIMES: &str = "runtimes";

/// Default runtime reported by the running daemon
///
/// # Errors
/// Fails if docker is missing, the daemon does not answer, or the runtime is
/// neither `runc` nor `dkrunc`.
pub fn daemon_default_runtime() -> Result<String> {
    let docker = which::which("docker").context("docker not found in PATH")?;
    let output = Command::new(&docker)
        .args(["system", "info", "--format", "{{.DefaultRuntime}}"])
        .output()
        .with_context(|| format!("Failed to run {}", docker.display()))?;
    if !output.status.success() {
        bail!(
            "docker system info failed: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }

    let runtime = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if runtime != RUNTIME_RUNC && runtime != DKRUNC_NAME {
        bail!("unknown docker runtime: {runtime}");
    }
    Ok(runtime)
}

fn load_daemon_config(path: &Path) -> Result<Option<Map<String, Value>>> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e).with_context(|| format!("Failed to read {}", path.display())),
    };
    if text.trim().is_empty() {
        return Ok(Some(Map::new()));
    }
    serde_json::from_str(&text).map(Some).with_context(|| format!("Failed to parse {}", path.display()))
}

fn store_daemon_config(path: &Path, config: &Map<String, Value>) -> Result<()> {
    let mut data = serde_json::to_vec_pretty(config)?;
    data.push(b'\n');
    write_atomic(path, &data, 0o644).with_context(|| format!("Failed to write {}", path.display()))
}

/// Make `dkrunc` the daemon's default runtime
///
/// `current` is the default runtime the daemon reports. Returns whether
/// `daemon_json` changed, in which case dockerd needs a reload.
///
/// # Errors
/// Fails if `dkrunc` is missing, the daemon uses some other runtime, or
/// `daemon_json` is malformed or disagrees with the daemon.
pub fn set_runtime(daemon_json: &Path, dkrunc: &Path, current: &str) -> Result<bool> {
    if !dkrunc.is_file() {
        bail!("{} not found", dkrunc.display());
    }
    if current == DKRUNC_NAME {
        return Ok(false);
    }
    if current != RUNTIME_RUNC {
        bail!("docker default runtime is not runc, but: {current}");
    }

    let mut config = load_daemon_config(daemon_json)?.unwrap_or_default();

    if let Some(configured) = config.get(FIELD_DEFAULT_RUNTIME).and_then(Value::as_str) {
        if !configured.is_empty() && configured != current {
            bail!("{FIELD_DEFAULT_RUNTIME} {configured:?} in {} does not match the daemon's {current:?}", daemon_json.display());
        }
    }

    let runtimes = config
        .entry(FIELD_RUNTIMES)
        .or_insert_with(|| Value::Object(Map::new()))
        .as_object_mut()
        .with_context(|| format!("{FIELD_RUNTIMES} in {} is not an object", daemon_json.display()))?;
    runtimes.insert(DKRUNC_NAME.to_string(), serde_json::json!({ "path": dkrunc.to_string_lossy() }));
    config.insert(FIELD_DEFAULT_RUNTIME.to_string(), Value::String(DKRUNC_NAME.to_string()));

    store_daemon_config(daemon_json, &config)?;
    info!("set {DKRUNC_NAME} as docker default runtime in {}", daemon_json.display());
    Ok(true)
}

/// Drop `default-runtime` from `daemon_json` when it names `dkrunc`
///
/// The `runtimes` entry stays so existing containers created with `dkrunc`
/// can still be started. Returns whether the file changed.
///
/// # Errors
/// Fails if the file is unreadable or malformed.
pub fn unset_runtime(daemon_json: &Path) -> Result<bool> {
    let Some(mut config) = load_daemon_config(daemon_json)? else {
        return Ok(false);
    };

    match config.get(FIELD_DEFAULT_RUNTIME) {
        None => return Ok(false),
        Some(Value::String(name)) if name == DKRUNC_NAME => {}
        Some(Value::String(_)) => return Ok(false),
        Some(_) => bail!("{FIELD_DEFAULT_RUNTIME} in {} is not a string", daemon_json.display()),
    }
    config.remove(FIELD_DEFAULT_RUNTIME);

    store_daemon_config(daemon_json, &config)?;
    info!("removed {DKRUNC_NAME} as docker default runtime from {}", daemon_json.display());
    Ok(true)
}

/// Send SIGHUP to every `dockerd` so it rereads `daemon.json`
///
/// # Errors
/// Fails if `proc_root` cannot be scanned or a signal cannot be delivered.
pub fn reload_dockerd(proc_root: &Path) -> Result<usize> {
    let pids = find_pids_by_name(proc_root, "dockerd")?;
    if pids.is_empty() {
        warn!("no dockerd process found to reload");
    }
    for &pid in &pids {
        // SAFETY: kill() has no memory-safety preconditions
        if unsafe { libc::kill(pid, libc::SIGHUP) } != 0 {
            return Err(io::Error::last_os_error()).with_context(|| format!("Failed to signal dockerd {pid}"));
        }
    }
    Ok(pids.len())
}

/// Point existing containers created with runtime `from` at runtime `to`
///
/// Edits each container's `hostconfig.json`; dockerd must be stopped while
/// this runs or it will overwrite the change. Returns how many containers
/// were switched.
///
/// # Errors
/// Fails if `containers_dir` cannot be listed, or a `hostconfig.json` is
/// malformed or cannot be rewritten.
pub fn switch_container_runtime(containers_dir: &Path, from: &str, to: &str) -> Result<usize> {
    let entries =
        fs::read_dir(containers_dir).with_context(|| format!("Failed to read {}", containers_dir.display()))?;

    let mut switched = 0;
    for entry in entries.flatten() {
        if !entry.file_type().is_ok_and(|t| t.is_dir()) {
            continue;
        }
        let path = entry.path().join("hostconfig.json");
        let Ok(text) = fs::read_to_string(&path) else {
            continue;
        };
        let mut hostconfig: Map<String, Value> =
            serde_json::from_str(&text).with_context(|| format!("Failed to parse {}", path.display()))?;

        if hostconfig.get("Runtime").and_then(Value::as_str) != Some(from) {
            continue;
        }
        hostconfig.insert("Runtime".to_string(), Value::String(to.to_string()));
        let data = serde_json::to_vec(&hostconfig)?;
        write_atomic(&path, &data, 0o644).with_context(|| format!("Failed to write {}", path.display()))?;
        switched += 1;
    }
    Ok(switched)
}
