//! Python: re-exec the program under `ddtrace-run`

use std::fs;
use std::path::{Path, PathBuf};

use log::debug;

use super::endpoint::{endpoint_vars, Runtime};
use super::RewriteContext;
use crate::agent::AgentAddress;
use crate::domain::{ExecRequest, ExecResult, RewriteError};
use crate::fs_util::owner_has;
use crate::subprocess::run_bounded;

const RUNNER: &str = "ddtrace-run";

const TRACER_IMPORT_CHECK: &str = "import ddtrace; print(ddtrace.__version__)";

/// Wrap `req` with `ddtrace-run`
///
/// # Errors
/// - [`RewriteError::UnsupportedArgs`] when the program is started with `-m`
/// - [`RewriteError::TracerNotInstalled`] when `interpreter` cannot import ddtrace
/// - [`RewriteError::RunnerNotFound`] / [`RewriteError::RunnerNotExecutable`]
///   when `ddtrace-run` is not usable from the request's `PATH`
pub fn rewrite(
    req: &ExecRequest,
    interpreter: &Path,
    ctx: &RewriteContext,
    agent: &AgentAddress,
) -> Result<ExecResult, RewriteError> {
    check_args(&req.argv)?;

    let check = run_bounded(interpreter, &["-c", TRACER_IMPORT_CHECK], ctx.subprocess_timeout)?;
    if !check.success() {
        return Err(RewriteError::TracerNotInstalled(interpreter.to_path_buf()));
    }
    debug!("ddtrace {} found for {}", check.output.trim(), interpreter.display());

    let runner = find_runner(req, &ctx.cwd)?;
    let runner = runner.to_string_lossy().into_owned();

    let mut args = vec![RUNNER.to_string()];
    if req.argv.is_empty() {
        args.push(req.path.clone());
    } else {
        args.extend(req.argv.iter().cloned());
    }

    let mut env = endpoint_vars(agent, Runtime::Python);
    env.extend(req.env.iter().cloned());

    Ok(ExecResult { path: runner, args, env })
}

// ddtrace-run cannot wrap `python -m module`
fn check_args(argv: &[String]) -> Result<(), RewriteError> {
    match argv.iter().find(|a| a.trim().eq_ignore_ascii_case("-m")) {
        Some(arg) => Err(RewriteError::UnsupportedArgs(arg.clone())),
        None => Ok(()),
    }
}

/// First `ddtrace-run` on the request's `PATH`, which must then be an
/// owner-executable regular file
///
/// Relative `PATH` entries resolve against `cwd`. A non-executable match
/// shadows any later entry, as it would for the shell.
fn find_runner(req: &ExecRequest, cwd: &Path) -> Result<PathBuf, RewriteError> {
    let search_path = req.env_var("PATH").ok_or(RewriteError::RunnerNotFound)?;
    let (runner, meta) = std::env::split_paths(search_path)
        .map(|dir| cwd.join(dir).join(RUNNER))
        .find_map(|candidate| fs::metadata(&candidate).ok().map(|meta| (candidate, meta)))
        .ok_or(RewriteError::RunnerNotFound)?;

    if meta.is_file() && owner_has(&meta, 0o100) {
        Ok(runner)
    } else {
        Err(RewriteError::RunnerNotExecutable(runner))
    }
}
