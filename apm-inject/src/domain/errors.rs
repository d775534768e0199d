//! Structured error types for apm-inject
//!
//! Using thiserror for automatic Display implementation and error chaining.
//! Every error produced by the mutator or the rewriter is recoverable: the
//! drivers log it and let the container or process start unmodified.

use std::path::PathBuf;
use thiserror::Error;

use crate::abi::Version;

/// Failures while mutating an OCI runtime spec
#[derive(Error, Debug)]
pub enum MutateError {
    #[error("environment conflict: {reason}")]
    EnvConflict { reason: String },

    #[error("mount destination {} already present in spec", .0.display())]
    MountConflict(PathBuf),

    #[error("host path {} does not exist", .0.display())]
    HostPathMissing(PathBuf),

    #[error("container path {} is not empty", .0.display())]
    ContainerPathNotEmpty(PathBuf),
}

/// Failures while loading or storing an OCI runtime spec
#[derive(Error, Debug)]
pub enum SpecError {
    #[error("Failed to read {}: {source}", path.display())]
    Read { path: PathBuf, source: std::io::Error },

    #[error("Failed to write {}: {source}", path.display())]
    Write { path: PathBuf, source: std::io::Error },

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Failures while rewriting exec parameters
#[derive(Error, Debug)]
pub enum RewriteError {
    #[error("ddtrace is not installed for {}", .0.display())]
    TracerNotInstalled(PathBuf),

    #[error("ddtrace-run not found in PATH")]
    RunnerNotFound,

    #[error("ddtrace-run at {} is not executable", .0.display())]
    RunnerNotExecutable(PathBuf),

    #[error("unsupported python arguments: {0}")]
    UnsupportedArgs(String),

    #[error("unsupported java major version {0}, need 8 or newer")]
    UnsupportedJavaVersion(u32),

    #[error("cannot parse java version from: {0:?}")]
    JavaVersionUnparsable(String),

    #[error("java tracer already attached")]
    AlreadyInjected,

    #[error("java agent jar {} missing or unreadable", .0.display())]
    AgentJarMissing(PathBuf),

    #[error(transparent)]
    Subprocess(#[from] SubprocessError),

    #[error(transparent)]
    Agent(#[from] ResolveError),
}

/// Failures of a bounded subprocess run
#[derive(Error, Debug)]
pub enum SubprocessError {
    #[error("Failed to start {program}: {source}")]
    Spawn { program: String, source: std::io::Error },

    #[error("{program} did not finish within {timeout_ms} ms")]
    Timeout { program: String, timeout_ms: u128 },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Agent address resolution failure
#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("no agent address configured (need a unix socket or host and port)")]
    NoAgentAddress,
}

/// Failures while probing libc or reading ELF symbol versions
#[derive(Error, Debug)]
pub enum AbiError {
    #[error("ldd not found: {0}")]
    LddNotFound(#[from] which::Error),

    #[error("unknown libc in ldd output: {0:?}")]
    UnknownLibc(String),

    #[error("invalid version: {0}")]
    InvalidVersion(String),

    #[error("{0} is not an ELF file")]
    NotElf(String),

    #[error("launcher {} not found", .0.display())]
    LauncherMissing(PathBuf),

    #[error("host libc version {host} is less than required {required}")]
    Incompatible { host: Version, required: Version },

    #[error(transparent)]
    Elf(#[from] object::read::Error),

    #[error(transparent)]
    Subprocess(#[from] SubprocessError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Failures while loading or saving the injection configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid inject mode: {0:?}")]
    InvalidMode(String),

    #[error("invalid value for {var}: {value:?}")]
    InvalidValue { var: &'static str, value: String },

    #[error("Failed to read config {}: {source}", path.display())]
    Read { path: PathBuf, source: std::io::Error },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mutate_error_display() {
        let err = MutateError::MountConflict(PathBuf::from("/opt/inject"));
        assert_eq!(err.to_string(), "mount destination /opt/inject already present in spec");
    }

    #[test]
    fn test_incompatible_libc_display() {
        let err = AbiError::Incompatible {
            host: "2.17".parse().unwrap(),
            required: "2.34".parse().unwrap(),
        };
        assert!(err.to_string().contains("2.17.0"));
        assert!(err.to_string().contains("2.34.0"));
    }

    #[test]
    fn test_subprocess_error_converts_into_rewrite_error() {
        let err: RewriteError =
            SubprocessError::Timeout { program: "java".to_string(), timeout_ms: 5000 }.into();
        assert!(matches!(err, RewriteError::Subprocess(_)));
        assert!(err.to_string().contains("5000 ms"));
    }
}
