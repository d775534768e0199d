//! Handing the rewritten exec back to the launcher

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use apm_inject_common::REWRITE_OUTPUT_PREFIX;

use crate::domain::ExecResult;
use crate::fs_util::write_atomic;

/// Descriptor file for correlation `id`
///
/// # Errors
/// Fails if `id` is empty or contains a path separator.
pub fn output_path(id: &str) -> Result<PathBuf> {
    if id.is_empty() || id.contains('/') {
        bail!("invalid rewrite id: {id:?}");
    }
    Ok(PathBuf::from(format!("{REWRITE_OUTPUT_PREFIX}{id}")))
}

/// Encode `result` and move it into place at `path` in one rename
///
/// # Errors
/// Fails if a field cannot be framed or the file cannot be written.
pub fn write_result(path: &Path, result: &ExecResult) -> Result<()> {
    let encoded = result.encode().context("Failed to encode exec descriptor")?;
    write_atomic(path, encoded.as_bytes(), 0o644)
        .with_context(|| format!("Failed to write {}", path.display()))
}
