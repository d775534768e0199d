//! OCI runtime spec (`config.json`) model
//!
//! Only the fields the mutator reads or writes are modelled. Everything else
//! is kept in `extra` maps so a load/store cycle never drops configuration the
//! real runtime depends on (namespaces, hooks, seccomp, annotations, ...).

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::domain::SpecError;

/// Name of the runtime spec inside a bundle
pub const CONFIG_JSON: &str = "config.json";

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RuntimeSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root: Option<Root>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mounts: Option<Vec<Mount>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub process: Option<Process>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Root {
    #[serde(default)]
    pub path: String,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Mount {
    pub destination: String,

    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub mount_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<String>>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Mount {
    /// Bind mount of `path` onto the same path in the container
    #[must_use]
    pub fn bind(path: &str, read_only: bool) -> Self {
        let mut options = vec!["bind".to_string()];
        if read_only {
            options.push("ro".to_string());
        }
        Self {
            destination: path.to_string(),
            mount_type: Some("none".to_string()),
            source: Some(path.to_string()),
            options: Some(options),
            extra: Map::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Process {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env: Option<Vec<String>>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Parse `config.json` contents
///
/// # Errors
/// Returns an error if the text is not a JSON object of the expected shape.
pub fn parse(text: &str) -> Result<RuntimeSpec, SpecError> {
    Ok(serde_json::from_str(text)?)
}

/// Read and parse a runtime spec file
///
/// # Errors
/// Returns an error if the file cannot be read or parsed.
pub fn load(path: &Path) -> Result<RuntimeSpec, SpecError> {
    let text = fs::read_to_string(path).map_err(|source| SpecError::Read { path: path.to_path_buf(), source })?;
    parse(&text)
}

/// Serialize `spec` over `path` (truncate and rewrite in place)
///
/// # Errors
/// Returns an error if serialization or the write fails.
pub fn store(path: &Path, spec: &RuntimeSpec) -> Result<(), SpecError> {
    let data = serde_json::to_vec(spec)?;
    fs::write(path, data).map_err(|source| SpecError::Write { path: path.to_path_buf(), source })
}
