//! Running the real container runtime

#![allow(unsafe_code)] // prctl() in the child requires unsafe

use std::ffi::OsStr;
use std::io;
use std::os::unix::process::{CommandExt, ExitStatusExt};
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};

use anyhow::{bail, Context, Result};
use log::debug;

use crate::config::InjectConfig;

const RUNC: &str = "runc";

/// Exit code reported when the runtime could not be started
pub const SPAWN_FAILED: i32 = -1;

/// Locate the real runtime: the configured path, else `runc` on `PATH`
///
/// # Errors
/// Fails if no runtime is found or it resolves to this wrapper itself.
pub fn resolve_runtime(config: &InjectConfig) -> Result<PathBuf> {
    let runtime = match &config.runc_path {
        Some(path) => path.clone(),
        None => which::which(RUNC).context("runc not found in PATH")?,
    };

    // dkrunc may itself be installed as `runc` somewhere on PATH
    if let (Ok(target), Ok(own)) = (runtime.canonicalize(), std::env::current_exe().and_then(|p| p.canonicalize())) {
        if target == own {
            bail!("runtime {} resolves to this wrapper", runtime.display());
        }
    }

    debug!("real runtime: {}", runtime.display());
    Ok(runtime)
}

/// Run `runtime args...` to completion with inherited stdio
///
/// The child gets its own process group and is killed if the wrapper dies.
///
/// # Errors
/// Returns an error if the runtime cannot be spawned.
pub fn run_runtime<S: AsRef<OsStr>>(runtime: &Path, args: &[S]) -> io::Result<i32> {
    let mut cmd = Command::new(runtime);
    cmd.args(args).process_group(0);

    // SAFETY: pre_exec runs after fork() in the child; prctl is async-signal-safe
    // and touches no parent state.
    unsafe {
        cmd.pre_exec(|| {
            if libc::prctl(libc::PR_SET_PDEATHSIG, libc::SIGKILL) == -1 {
                return Err(io::Error::last_os_error());
            }
            Ok(())
        });
    }

    let status = cmd.status()?;
    Ok(exit_code(status))
}

/// Child exit code, or 128 + signal for signal deaths
#[must_use]
pub fn exit_code(status: ExitStatus) -> i32 {
    status.code().or_else(|| status.signal().map(|sig| 128 + sig)).unwrap_or(SPAWN_FAILED)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_code_mirrors_child() {
        let sh = which::which("sh").unwrap();
        let args = |s: &str| vec!["-c".to_string(), s.to_string()];

        assert_eq!(run_runtime(&sh, &args("exit 0")).unwrap(), 0);
        assert_eq!(run_runtime(&sh, &args("exit 3")).unwrap(), 3);
        assert_eq!(run_runtime(&sh, &args("kill -TERM $$")).unwrap(), 128 + libc::SIGTERM);
    }

    #[test]
    fn test_spawn_failure() {
        assert!(run_runtime(Path::new("/nonexistent/runc"), &["--version"]).is_err());
    }

    #[test]
    fn test_configured_runtime_wins() {
        let config = InjectConfig { runc_path: Some(PathBuf::from("/opt/runc")), ..Default::default() };
        assert_eq!(resolve_runtime(&config).unwrap(), PathBuf::from("/opt/runc"));
    }

    #[test]
    fn test_refuses_own_executable() {
        let own = std::env::current_exe().unwrap();
        let config = InjectConfig { runc_path: Some(own), ..Default::default() };
        assert!(resolve_runtime(&config).is_err());
    }
}
