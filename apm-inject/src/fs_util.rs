//! Small filesystem helpers shared by the drivers and the installer

use std::fs::{self, Permissions};
use std::io::{self, Write};
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use tempfile::NamedTempFile;

/// Replace `path` with `data` so readers see either the old or the new file
///
/// The data is written to a temporary file in the same directory, which is
/// then renamed over `path`.
///
/// # Errors
/// Returns an error if the directory is not writable or the rename fails.
pub fn write_atomic(path: &Path, data: &[u8], mode: u32) -> io::Result<()> {
    let dir = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(data)?;
    tmp.as_file().set_permissions(Permissions::from_mode(mode))?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Permission bits in `metadata` include `bits` (`0o100` is owner execute)
#[must_use]
pub fn owner_has(metadata: &fs::Metadata, bits: u32) -> bool {
    metadata.permissions().mode() & bits == bits
}
