//! # Host Installation
//!
//! Wires the unpacked inject directory into the host:
//!
//! ```text
//! install ──┬─ host   ──▶ ldd --version ──▶ compatible launcher ──▶ /etc/ld.so.preload
//!           ├─ docker ──▶ <inject>/ld.so.preload + daemon.json default-runtime ──▶ SIGHUP dockerd
//!           └─ inject.json (mode + agent endpoints)
//! ```
//!
//! A failing step is reported and rolled back (the preload entry is removed)
//! without aborting the remaining steps, so a host never ends up preloading a
//! launcher it cannot load.

pub mod docker;
pub mod preflight;
pub mod preload;

use std::fmt;
use std::path::PathBuf;

use anyhow::Result;
use apm_inject_common::DKRUNC_NAME;
use log::{error, info};

use crate::abi::{compatible_launcher, detect_libc};
use crate::config::{InjectConfig, InjectMode};
use self::docker::{daemon_default_runtime, reload_dockerd, set_runtime, unset_runtime};
use self::preload::{ensure_container_preload, launcher_prefix, set_preload, unset_preload};

/// System files touched by the installer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemPaths {
    pub preload: PathBuf,
    pub daemon_json: PathBuf,
    /// Scanned for `dockerd` processes to reload
    pub proc_root: PathBuf,
}

impl Default for SystemPaths {
    fn default() -> Self {
        Self {
            preload: PathBuf::from(preload::SYSTEM_PRELOAD),
            daemon_json: PathBuf::from(docker::DAEMON_JSON),
            proc_root: PathBuf::from("/proc"),
        }
    }
}

/// What an install or uninstall run changed
#[derive(Debug, Default)]
pub struct InstallReport {
    /// Launcher registered in the host preload list
    pub launcher: Option<PathBuf>,
    pub docker_registered: bool,
    pub dockerd_reloaded: usize,
    pub errors: Vec<String>,
}

impl InstallReport {
    fn failed(&mut self, step: &str, err: &anyhow::Error) {
        error!("{step}: {err:#}");
        self.errors.push(format!("{step}: {err:#}"));
    }
}

impl fmt::Display for InstallReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.launcher {
            Some(launcher) => writeln!(f, "host:   preloading {}", launcher.display())?,
            None => writeln!(f, "host:   not injected")?,
        }
        if self.docker_registered {
            writeln!(f, "docker: default runtime {DKRUNC_NAME}")?;
        } else {
            writeln!(f, "docker: not injected")?;
        }
        for err in &self.errors {
            writeln!(f, "error:  {err}")?;
        }
        Ok(())
    }
}

/// Apply `config.mode` to the host and persist `config`
///
/// # Errors
/// Only a failure to write the config file is returned; step failures are
/// collected in the report.
pub fn install(config: &InjectConfig, paths: &SystemPaths) -> Result<InstallReport> {
    let mut report = InstallReport::default();

    if config.mode.host_enabled() {
        match enable_host(config, paths) {
            Ok(launcher) => report.launcher = Some(launcher),
            Err(e) => {
                report.failed("host injection", &e);
                disable_host(config, paths, &mut report);
            }
        }
    } else {
        disable_host(config, paths, &mut report);
    }

    if config.mode.container_enabled() {
        match enable_docker(config, paths) {
            Ok(changed) => {
                report.docker_registered = true;
                if changed {
                    reload(paths, &mut report);
                }
            }
            Err(e) => report.failed("docker injection", &e),
        }
    } else {
        disable_docker(paths, &mut report);
    }

    config.save()?;
    info!("saved {} (mode {})", config.config_path().display(), config.mode);
    Ok(report)
}

/// Remove every host registration and switch injection off
///
/// # Errors
/// Returns an error if the config file exists but cannot be rewritten.
pub fn uninstall(config: &InjectConfig, paths: &SystemPaths) -> Result<InstallReport> {
    let mut report = InstallReport::default();
    disable_docker(paths, &mut report);
    disable_host(config, paths, &mut report);

    if config.config_path().exists() {
        let disabled = InjectConfig { mode: InjectMode::Disabled, ..config.clone() };
        disabled.save()?;
    }
    Ok(report)
}

fn enable_host(config: &InjectConfig, paths: &SystemPaths) -> Result<PathBuf> {
    let profile = detect_libc(config.subprocess_timeout())?;
    info!("host libc: {} {}", profile.flavor, profile.version);

    let launcher = compatible_launcher(&config.inject_dir(), &profile)?;
    set_preload(&paths.preload, &launcher_prefix(config), &launcher)?;
    Ok(launcher)
}

fn disable_host(config: &InjectConfig, paths: &SystemPaths, report: &mut InstallReport) {
    if let Err(e) = unset_preload(&paths.preload, &launcher_prefix(config)) {
        report.failed("preload cleanup", &e);
    }
}

fn enable_docker(config: &InjectConfig, paths: &SystemPaths) -> Result<bool> {
    ensure_container_preload(config)?;
    let current = daemon_default_runtime()?;
    set_runtime(&paths.daemon_json, &config.dkrunc_path(), &current)
}

fn disable_docker(paths: &SystemPaths, report: &mut InstallReport) {
    match unset_runtime(&paths.daemon_json) {
        Ok(true) => reload(paths, report),
        Ok(false) => {}
        Err(e) => report.failed("docker cleanup", &e),
    }
}

fn reload(paths: &SystemPaths, report: &mut InstallReport) {
    match reload_dockerd(&paths.proc_root) {
        Ok(count) => report.dockerd_reloaded = count,
        Err(e) => report.failed("dockerd reload", &e),
    }
}

/// Outcome of one read-only compatibility check
#[derive(Debug)]
pub struct CheckItem {
    pub name: &'static str,
    pub outcome: Result<String>,
}

/// Report what `install` would find, without changing anything
#[must_use]
pub fn check(config: &InjectConfig) -> Vec<CheckItem> {
    let mut items = Vec::new();

    let profile = detect_libc(config.subprocess_timeout());
    let launcher: Result<String> = match &profile {
        Ok(profile) => compatible_launcher(&config.inject_dir(), profile)
            .map(|p| p.display().to_string())
            .map_err(Into::into),
        Err(e) => Err(anyhow::anyhow!("needs libc: {e}")),
    };
    items.push(CheckItem {
        name: "libc",
        outcome: profile.map(|p| format!("{} {}", p.flavor, p.version)).map_err(Into::into),
    });
    items.push(CheckItem { name: "launcher", outcome: launcher });
    items.push(CheckItem { name: "docker runtime", outcome: daemon_default_runtime() });

    items
}
