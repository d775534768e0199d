//! Core value types passed between the drivers and the injection components

use std::path::{Path, PathBuf};

pub use apm_inject_common::ExecDescriptor as ExecResult;

/// One host directory to bind-mount into a container at the same path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountSpec {
    pub host_path: PathBuf,
    pub read_only: bool,
    /// Mount even if the container already has entries at this path
    pub skip_empty_check: bool,
}

impl MountSpec {
    /// Read-only mount that requires an empty (or absent) container path
    pub fn read_only(host_path: impl Into<PathBuf>) -> Self {
        Self { host_path: host_path.into(), read_only: true, skip_empty_check: false }
    }

    /// Writable mount of the agent socket directory
    ///
    /// Sockets live in shared directories such as `/var/run`, which are
    /// expected to be populated inside the container.
    pub fn socket_dir(host_path: impl Into<PathBuf>) -> Self {
        Self { host_path: host_path.into(), read_only: false, skip_empty_check: true }
    }

    /// Destination inside the container
    #[must_use]
    pub fn destination(&self) -> &Path {
        &self.host_path
    }
}

/// Ordered environment additions for the container process
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InjectionEnv(Vec<(String, String)>);

impl InjectionEnv {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.push((key.into(), value.into()));
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(k, _)| k.as_str())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// `KEY=VALUE` strings in insertion order
    #[must_use]
    pub fn to_env_strings(&self) -> Vec<String> {
        self.iter().map(|(k, v)| format!("{k}={v}")).collect()
    }
}

/// Exec parameters as observed by the preload launcher
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecRequest {
    /// Path passed to `execve`
    pub path: String,
    /// Argument vector passed to `execve` (`argv[0]` included)
    pub argv: Vec<String>,
    /// `KEY=VALUE` entries
    pub env: Vec<String>,
}

impl ExecRequest {
    /// Final path component of the executable
    #[must_use]
    pub fn file_name(&self) -> &str {
        Path::new(&self.path).file_name().and_then(|n| n.to_str()).unwrap_or("")
    }

    /// Value of the first `key=` entry, like `getenv`
    #[must_use]
    pub fn env_var(&self, key: &str) -> Option<&str> {
        self.env.iter().find_map(|entry| match entry.split_once('=') {
            Some((k, v)) if k == key => Some(v),
            _ => None,
        })
    }
}

/// Key part of a `KEY=VALUE` string
#[must_use]
pub fn env_key(entry: &str) -> &str {
    entry.split_once('=').map_or(entry, |(k, _)| k)
}
