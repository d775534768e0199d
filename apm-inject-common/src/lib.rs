//! # Shared Definitions (Rewriter ↔ Native Launcher)
//!
//! Defines the names, paths and wire format shared between the Rust drivers and
//! the native preload launcher (`apm_launcher.so`). The launcher calls the
//! exec rewriter on every relevant `execve`, then reads the rewritten exec
//! descriptor back from a file, so the layout here is a compatibility contract.
//!
//! ## Key Types
//!
//! - [`ExecDescriptor`] - program path, argument vector and environment to exec
//! - [`WireError`] - descriptor decoding/encoding failures
//!
//! ## Wire Format
//!
//! ```text
//! "1" RS path RS GS RS <argc> RS (arg RS)* GS RS <envc> RS (KEY=VALUE RS)* GS RS
//! ```
//!
//! `RS` is ASCII record separator (0x1E), `GS` is ASCII group separator (0x1D).

#![no_std]

extern crate alloc;

use alloc::string::{String, ToString};
use alloc::vec::Vec;
use core::fmt;

// ============================================================================
// Layout Constants
// ============================================================================

/// Default installation root of the agent
pub const DEFAULT_INSTALL_DIR: &str = "/usr/local/datakit";

/// Directory under the install root holding everything injection related
pub const DIR_APM_INJECT: &str = "apm_inject";

/// Launcher binaries, rewriter and `dkrunc` (mounted into containers)
pub const DIR_INJECT: &str = "inject";

/// Language tracer libraries (mounted into containers)
pub const DIR_LIB: &str = "lib";

/// Audit logs of the runtime wrapper
pub const DIR_LOG: &str = "log";

/// Launcher name stem; the glibc build is `apm_launcher.so`
pub const LAUNCHER_NAME: &str = "apm_launcher";

/// Launcher built against musl libc
pub const LAUNCHER_MUSL_SO: &str = "apm_launcher_musl.so";

/// Launcher built against glibc
pub const LAUNCHER_GLIBC_SO: &str = "apm_launcher.so";

/// Runtime wrapper binary name (also its docker runtime name)
pub const DKRUNC_NAME: &str = "dkrunc";

/// Java tracer jar, relative to the lib dir
pub const JAVA_AGENT_JAR: &str = "java/dd-java-agent.jar";

/// The rewriter writes its descriptor to this prefix followed by the
/// correlation id chosen by the launcher
pub const REWRITE_OUTPUT_PREFIX: &str = "/tmp/apm_inject_rewrite_";

// ============================================================================
// Environment Variable Names
// ============================================================================

/// Injection switch: `host`, `docker`, `host,docker` or `disable`
pub const ENV_INJECT: &str = "DK_APM_INJECT";

/// Override of [`DEFAULT_INSTALL_DIR`]
pub const ENV_INSTALL_DIR: &str = "DK_APM_INSTALL_DIR";

/// Primary agent Unix socket path
pub const ENV_AGENT_UDS: &str = "DK_APM_AGENT_UDS";

/// Primary agent host
pub const ENV_AGENT_HOST: &str = "DK_APM_AGENT_HOST";

/// Primary agent port
pub const ENV_AGENT_PORT: &str = "DK_APM_AGENT_PORT";

/// Secondary (statsd) Unix socket path
pub const ENV_STATSD_UDS: &str = "DK_APM_STATSD_UDS";

/// Secondary (statsd) host
pub const ENV_STATSD_HOST: &str = "DK_APM_STATSD_HOST";

/// Secondary (statsd) port
pub const ENV_STATSD_PORT: &str = "DK_APM_STATSD_PORT";

/// Path of the real container runtime wrapped by `dkrunc`
pub const ENV_RUNC_PATH: &str = "DK_APM_RUNC_PATH";

/// Upper bound for interpreter checks, in milliseconds
pub const ENV_SUBPROCESS_TIMEOUT_MS: &str = "DK_APM_SUBPROCESS_TIMEOUT_MS";

/// `env_logger` filter for the drivers (logging is off when unset)
pub const ENV_LOG: &str = "DK_APM_LOG";

// ============================================================================
// Exec Descriptor
// ============================================================================

/// Record separator (0x1E)
pub const RS: char = '\u{1e}';

/// Group separator (0x1D)
pub const GS: char = '\u{1d}';

/// Leading format version of the descriptor
pub const WIRE_FORMAT_VERSION: &str = "1";

/// Exec parameters handed to the launcher
///
/// `args[0]` is by convention the program name, exactly as it would be passed
/// to `execve`. `env` entries are `KEY=VALUE` strings.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExecDescriptor {
    pub path: String,
    pub args: Vec<String>,
    pub env: Vec<String>,
}

/// Descriptor encoding/decoding failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireError {
    /// A field contains RS or GS and cannot be framed
    ReservedByte,
    /// Leading version is not [`WIRE_FORMAT_VERSION`]
    UnsupportedVersion(String),
    /// Input ended before the layout was complete
    Truncated,
    /// A group separator was expected at this record
    MissingGroupSeparator,
    /// A count record is not a decimal number
    InvalidCount(String),
    /// Records follow the final group
    TrailingData,
}

impl fmt::Display for WireError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReservedByte => f.write_str("field contains a record or group separator"),
            Self::UnsupportedVersion(v) => write!(f, "unsupported descriptor version: {v}"),
            Self::Truncated => f.write_str("descriptor is truncated"),
            Self::MissingGroupSeparator => f.write_str("expected group separator"),
            Self::InvalidCount(c) => write!(f, "invalid record count: {c}"),
            Self::TrailingData => f.write_str("unexpected data after last group"),
        }
    }
}

impl core::error::Error for WireError {}

impl ExecDescriptor {
    /// Serialize into the launcher's wire format
    ///
    /// # Errors
    /// Returns [`WireError::ReservedByte`] if any field contains a separator.
    pub fn encode(&self) -> Result<String, WireError> {
        let mut fields = core::iter::once(&self.path).chain(&self.args).chain(&self.env);
        if fields.any(|f| f.contains(RS) || f.contains(GS)) {
            return Err(WireError::ReservedByte);
        }

        let mut out = String::new();
        push_record(&mut out, WIRE_FORMAT_VERSION);
        push_record(&mut out, &self.path);
        push_group_end(&mut out);
        push_list(&mut out, &self.args);
        push_group_end(&mut out);
        push_list(&mut out, &self.env);
        push_group_end(&mut out);
        Ok(out)
    }

    /// Parse a descriptor produced by [`ExecDescriptor::encode`]
    ///
    /// # Errors
    /// Returns a [`WireError`] describing the first layout violation.
    pub fn decode(data: &str) -> Result<Self, WireError> {
        let body = data.strip_suffix(RS).ok_or(WireError::Truncated)?;
        let mut records = body.split(RS);

        let version = records.next().ok_or(WireError::Truncated)?;
        if version != WIRE_FORMAT_VERSION {
            return Err(WireError::UnsupportedVersion(version.to_string()));
        }
        let path = records.next().ok_or(WireError::Truncated)?.to_string();
        expect_group_end(&mut records)?;
        let args = read_list(&mut records)?;
        expect_group_end(&mut records)?;
        let env = read_list(&mut records)?;
        expect_group_end(&mut records)?;

        if records.next().is_some() {
            return Err(WireError::TrailingData);
        }
        Ok(Self { path, args, env })
    }
}

fn push_record(out: &mut String, record: &str) {
    out.push_str(record);
    out.push(RS);
}

fn push_group_end(out: &mut String) {
    out.push(GS);
    out.push(RS);
}

fn push_list(out: &mut String, items: &[String]) {
    push_record(out, &items.len().to_string());
    for item in items {
        push_record(out, item);
    }
}

fn expect_group_end<'a>(records: &mut impl Iterator<Item = &'a str>) -> Result<(), WireError> {
    let mut gs = [0u8; 1];
    let gs: &str = GS.encode_utf8(&mut gs);
    match records.next() {
        Some(r) if r == gs => Ok(()),
        Some(_) => Err(WireError::MissingGroupSeparator),
        None => Err(WireError::Truncated),
    }
}

fn read_list<'a>(records: &mut impl Iterator<Item = &'a str>) -> Result<Vec<String>, WireError> {
    let count = records.next().ok_or(WireError::Truncated)?;
    let count: usize = count.parse().map_err(|_| WireError::InvalidCount(count.to_string()))?;
    let mut items = Vec::new();
    for _ in 0..count {
        items.push(records.next().ok_or(WireError::Truncated)?.to_string());
    }
    Ok(items)
}
