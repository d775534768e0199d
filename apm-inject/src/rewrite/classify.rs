//! Interpreter classification of an exec request

use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;

use crate::domain::ExecRequest;

/// Bytes read from the start of a script when looking for a shebang
const SHEBANG_PEEK: usize = 512;

const TRACER_RUNNER: &str = "ddtrace-run";

static PYTHON_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^python(3(\.\d+)*)?$").expect("valid regex"));

static PYTHON_SHEBANG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^#!(/.*/python(3(\.\d+)*)?)\n$").expect("valid regex"));

/// What the exec'd program runs on
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Interpreter {
    /// `interpreter` is the python binary itself, or the one named by the
    /// script's shebang
    Python { interpreter: PathBuf },
    Java,
    Unrecognized,
}

/// Classify `req`; the first matching rule wins
#[must_use]
pub fn classify(req: &ExecRequest) -> Interpreter {
    let name = req.file_name();
    if is_tracer_runner(Path::new(&req.path)) {
        return Interpreter::Unrecognized;
    }

    if PYTHON_NAME_RE.is_match(name) {
        return Interpreter::Python { interpreter: PathBuf::from(&req.path) };
    }
    if name == "java" {
        return Interpreter::Java;
    }
    match python_shebang(Path::new(&req.path)) {
        Some(interpreter) if !is_tracer_runner(&interpreter) => Interpreter::Python { interpreter },
        _ => Interpreter::Unrecognized,
    }
}

// Running ddtrace-run under ddtrace-run would recurse
fn is_tracer_runner(path: &Path) -> bool {
    let named = |p: &Path| p.file_name().is_some_and(|n| n == TRACER_RUNNER);
    named(path) || fs::canonicalize(path).is_ok_and(|p| named(&p))
}

/// Interpreter named by a python shebang line, if the file has one
fn python_shebang(path: &Path) -> Option<PathBuf> {
    let mut head = Vec::with_capacity(SHEBANG_PEEK);
    File::open(path).ok()?.take(SHEBANG_PEEK as u64).read_to_end(&mut head).ok()?;

    let end = head.iter().position(|&b| b == b'\n')?;
    let line = std::str::from_utf8(&head[..=end]).ok()?;
    PYTHON_SHEBANG_RE.captures(line).map(|c| PathBuf::from(&c[1]))
}
