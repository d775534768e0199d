//! Pre-flight checks for apm-inject install/uninstall
//!
//! Validates the host before touching system-wide configuration.
//! Provides clear, actionable error messages when requirements aren't met.

#![allow(unsafe_code)] // geteuid() requires unsafe

use anyhow::{bail, Result};
use std::path::Path;

use crate::config::InjectConfig;

/// Run all pre-flight checks before changing host configuration
///
/// # Errors
/// Returns the first failed requirement.
pub fn run_preflight_checks(config: &InjectConfig, docker: bool) -> Result<()> {
    check_privileges()?;
    check_install_dir(&config.inject_dir())?;
    if docker {
        check_dkrunc(&config.dkrunc_path())?;
    }
    Ok(())
}

/// `/etc/ld.so.preload` and the docker daemon config are root-owned
fn check_privileges() -> Result<()> {
    if unsafe { libc::geteuid() } == 0 {
        return Ok(());
    }

    bail!(
        "Permission denied: apm-inject requires root privileges to edit \
         /etc/ld.so.preload and /etc/docker/daemon.json.\n\n\
         Run with: sudo apm-inject ..."
    );
}

/// Check that the inject directory was unpacked
fn check_install_dir(inject_dir: &Path) -> Result<()> {
    if !inject_dir.is_dir() {
        bail!(
            "Inject directory not found: {}\n\n\
             Unpack the apm-inject bundle first, or point DK_APM_INSTALL_DIR \
             at the agent's install root.",
            inject_dir.display()
        );
    }
    Ok(())
}

/// Check that the runtime wrapper is present before registering it
fn check_dkrunc(dkrunc: &Path) -> Result<()> {
    if !dkrunc.is_file() {
        bail!(
            "Runtime wrapper not found: {}\n\n\
             Docker injection needs dkrunc next to the launcher.",
            dkrunc.display()
        );
    }
    Ok(())
}
