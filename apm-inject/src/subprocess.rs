//! Bounded subprocess runs
//!
//! Interpreter version checks, tracer presence checks and `ldd --version` all
//! run a short-lived child and inspect its output. A wedged interpreter must
//! never stall the exec it is checking, so every run has a deadline after
//! which the child is killed and reaped.

use std::io::Read;
use std::path::Path;
use std::process::{Command, ExitStatus, Stdio};
use std::thread;
use std::time::Duration;

use apm_inject_common::ENV_INJECT;
use log::debug;
use wait_timeout::ChildExt;

use crate::domain::SubprocessError;

/// Default deadline for a bounded run
pub const DEFAULT_SUBPROCESS_TIMEOUT: Duration = Duration::from_secs(5);

/// Exit status plus stdout followed by stderr
#[derive(Debug)]
pub struct SubprocessOutput {
    pub status: ExitStatus,
    pub output: String,
}

impl SubprocessOutput {
    #[must_use]
    pub fn success(&self) -> bool {
        self.status.success()
    }
}

/// Run `program args...` and collect its combined output
///
/// The child sees `DK_APM_INJECT=disable` so the preload launcher leaves the
/// child itself alone.
///
/// # Errors
/// Returns [`SubprocessError::Spawn`] if the program cannot be started and
/// [`SubprocessError::Timeout`] if it outlives `timeout`.
pub fn run_bounded(program: &Path, args: &[&str], timeout: Duration) -> Result<SubprocessOutput, SubprocessError> {
    let program_name = program.display().to_string();
    debug!("run: {program_name} {}", args.join(" "));

    let mut child = Command::new(program)
        .args(args)
        .env(ENV_INJECT, "disable")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|source| SubprocessError::Spawn { program: program_name.clone(), source })?;

    // Drain both pipes concurrently so a chatty child cannot block on a full pipe
    let stdout = child.stdout.take().map(|pipe| thread::spawn(move || read_pipe(pipe)));
    let stderr = child.stderr.take().map(|pipe| thread::spawn(move || read_pipe(pipe)));

    let status = match child.wait_timeout(timeout) {
        Ok(Some(status)) => status,
        Ok(None) => {
            let _ = child.kill();
            let _ = child.wait();
            return Err(SubprocessError::Timeout { program: program_name, timeout_ms: timeout.as_millis() });
        }
        Err(e) => {
            let _ = child.kill();
            let _ = child.wait();
            return Err(SubprocessError::Io(e));
        }
    };

    let mut output = String::new();
    for handle in [stdout, stderr].into_iter().flatten() {
        if let Ok(bytes) = handle.join() {
            output.push_str(&String::from_utf8_lossy(&bytes));
        }
    }

    debug!("run: {program_name} exited with {status}");
    Ok(SubprocessOutput { status, output })
}

fn read_pipe(mut pipe: impl Read) -> Vec<u8> {
    let mut buf = Vec::new();
    let _ = pipe.read_to_end(&mut buf);
    buf
}
