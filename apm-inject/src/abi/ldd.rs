//! Installed C library detection via `ldd --version`

use std::fmt;
use std::sync::LazyLock;
use std::time::Duration;

use log::debug;
use regex::Regex;

use super::Version;
use crate::domain::AbiError;
use crate::subprocess::run_bounded;

/// glibc's ldd: `ldd (GNU libc) 2.35` / `ldd (Ubuntu GLIBC 2.35-0ubuntu3) 2.35`
static GLIBC_LDD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"ldd \(.*\) ([0-9.]+)").expect("glibc regex is valid"));

/// musl's loader: `musl libc (x86_64)\nVersion 1.2.4`
static MUSL_LDD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"musl libc \(.*\)\nVersion ([0-9.]+)").expect("musl regex is valid"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LibcFlavor {
    Glibc,
    Musl,
}

impl fmt::Display for LibcFlavor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Glibc => "glibc",
            Self::Musl => "musl",
        })
    }
}

/// Flavor and version of the host's C library
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LibcProfile {
    pub flavor: LibcFlavor,
    pub version: Version,
}

/// Parse the output of `ldd --version`
///
/// # Errors
/// Returns [`AbiError::UnknownLibc`] if neither glibc nor musl is recognised.
pub fn parse_ldd_output(text: &str) -> Result<LibcProfile, AbiError> {
    let (flavor, captures) = if let Some(c) = GLIBC_LDD.captures(text) {
        (LibcFlavor::Glibc, c)
    } else if let Some(c) = MUSL_LDD.captures(text) {
        (LibcFlavor::Musl, c)
    } else {
        let first_line = text.lines().next().unwrap_or("").to_string();
        return Err(AbiError::UnknownLibc(first_line));
    };

    let version = captures[1].parse()?;
    Ok(LibcProfile { flavor, version })
}

/// Detect the host's C library
///
/// musl's `ldd` exits non-zero for `--version` while still printing the
/// banner, so the exit status is ignored and only the output is parsed.
///
/// # Errors
/// Returns an error if `ldd` is missing, cannot be run, or prints something
/// unrecognised.
pub fn detect_libc(timeout: Duration) -> Result<LibcProfile, AbiError> {
    let ldd = which::which("ldd")?;
    let out = run_bounded(&ldd, &["--version"], timeout)?;
    let profile = parse_ldd_output(&out.output)?;
    debug!("host libc: {} {}", profile.flavor, profile.version);
    Ok(profile)
}
