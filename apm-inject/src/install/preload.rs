//! `/etc/ld.so.preload` registration of the host launcher

use std::fs;
use std::io;
use std::path::Path;

use anyhow::{Context, Result};
use apm_inject_common::LAUNCHER_NAME;
use log::info;

use crate::config::InjectConfig;
use crate::fs_util::write_atomic;

/// Host-wide preload list
pub const SYSTEM_PRELOAD: &str = "/etc/ld.so.preload";

/// Preload list shipped into containers next to the launcher
pub const CONTAINER_PRELOAD: &str = "ld.so.preload";

/// Line prefix shared by every launcher build of this install
#[must_use]
pub fn launcher_prefix(config: &InjectConfig) -> String {
    config.inject_dir().join(LAUNCHER_NAME).to_string_lossy().into_owned()
}

/// Drop our launcher lines and any blank lines before the first kept line
#[must_use]
pub fn strip_launcher(contents: &str, prefix: &str) -> String {
    let mut kept: Vec<&str> = Vec::new();
    for line in contents.lines() {
        if line.starts_with(prefix) || (line.is_empty() && kept.is_empty()) {
            continue;
        }
        kept.push(line);
    }

    if kept.is_empty() {
        String::new()
    } else {
        kept.join("\n") + "\n"
    }
}

fn read_optional(path: &Path) -> Result<Option<String>> {
    match fs::read_to_string(path) {
        Ok(text) => Ok(Some(text)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e).with_context(|| format!("Failed to read {}", path.display())),
    }
}

/// Register `launcher` in `preload_path`, replacing any earlier registration
///
/// # Errors
/// Returns an error if the file cannot be read or replaced.
pub fn set_preload(preload_path: &Path, prefix: &str, launcher: &Path) -> Result<()> {
    let current = read_optional(preload_path)?.unwrap_or_default();
    let mut contents = strip_launcher(&current, prefix);
    contents.push_str(&launcher.to_string_lossy());
    contents.push('\n');

    write_atomic(preload_path, contents.as_bytes(), 0o644)
        .with_context(|| format!("Failed to write {}", preload_path.display()))?;
    info!("registered {} in {}", launcher.display(), preload_path.display());
    Ok(())
}

/// Remove our launcher from `preload_path`; a missing file is fine
///
/// # Errors
/// Returns an error if the file cannot be read or replaced.
pub fn unset_preload(preload_path: &Path, prefix: &str) -> Result<()> {
    let Some(current) = read_optional(preload_path)? else {
        return Ok(());
    };
    let contents = strip_launcher(&current, prefix);
    if contents == current {
        return Ok(());
    }

    write_atomic(preload_path, contents.as_bytes(), 0o644)
        .with_context(|| format!("Failed to clean {}", preload_path.display()))?;
    info!("removed launcher from {}", preload_path.display());
    Ok(())
}

/// Create `<inject>/ld.so.preload` naming the glibc launcher, if absent
///
/// # Errors
/// Returns an error if the file cannot be written.
pub fn ensure_container_preload(config: &InjectConfig) -> Result<()> {
    let path = config.inject_dir().join(CONTAINER_PRELOAD);
    if path.exists() {
        return Ok(());
    }
    let contents = format!("{}\n", config.preload_library().display());
    write_atomic(&path, contents.as_bytes(), 0o644).with_context(|| format!("Failed to write {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    const PREFIX: &str = "/usr/local/datakit/apm_inject/inject/apm_launcher";

    #[test]
    fn test_strip_launcher() {
        let contents = "\n\n/usr/local/datakit/apm_inject/inject/apm_launcher.so\n/usr/lib/libjemalloc.so\n\n/opt/other.so\n";
        assert_eq!(strip_launcher(contents, PREFIX), "/usr/lib/libjemalloc.so\n\n/opt/other.so\n");
        assert_eq!(strip_launcher("/usr/local/datakit/apm_inject/inject/apm_launcher_musl.so\n", PREFIX), "");
        assert_eq!(strip_launcher("", PREFIX), "");
    }

    #[test]
    fn test_set_then_unset() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ld.so.preload");
        fs::write(&path, "/usr/lib/libjemalloc.so\n").unwrap();
        let launcher = PathBuf::from(format!("{PREFIX}.so"));

        set_preload(&path, PREFIX, &launcher).unwrap();
        set_preload(&path, PREFIX, &launcher).unwrap();
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            format!("/usr/lib/libjemalloc.so\n{PREFIX}.so\n")
        );

        unset_preload(&path, PREFIX).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "/usr/lib/libjemalloc.so\n");
    }

    #[test]
    fn test_set_creates_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ld.so.preload");
        set_preload(&path, PREFIX, Path::new("/x/apm_launcher.so")).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "/x/apm_launcher.so\n");
    }

    #[test]
    fn test_unset_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ld.so.preload");
        unset_preload(&path, PREFIX).unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_container_preload_written_once() {
        let dir = tempfile::tempdir().unwrap();
        let config = InjectConfig { install_dir: dir.path().to_path_buf(), ..Default::default() };
        fs::create_dir_all(config.inject_dir()).unwrap();

        ensure_container_preload(&config).unwrap();
        let path = config.inject_dir().join(CONTAINER_PRELOAD);
        assert_eq!(fs::read_to_string(&path).unwrap(), format!("{}\n", config.preload_library().display()));

        fs::write(&path, "custom\n").unwrap();
        ensure_container_preload(&config).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "custom\n");
    }
}
