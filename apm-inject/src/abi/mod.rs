//! # Version and ABI Resolution
//!
//! The preload launcher is a native shared object, shipped in two builds:
//! one linked against glibc and one against musl. Before registering it with
//! the dynamic loader, the installer must make sure the host can actually load
//! it, because a launcher that fails to load breaks *every* process start on
//! the host.
//!
//! ```text
//! ldd --version ──▶ LibcProfile { flavor, version }
//!                        │
//!                        ▼
//!              apm_launcher.so / apm_launcher_musl.so
//!                        │ (glibc only)
//!                        ▼
//!   .dynsym + .gnu.version ──▶ max GLIBC_x.y ──▶ host >= required ?
//! ```
//!
//! ## Module Structure
//!
//! - **`version`**: three-component numeric versions and their ordering
//! - **`ldd`**: `ldd --version` probing and parsing
//! - **`elf`**: versioned dynamic symbols via the `object` crate

pub mod elf;
pub mod ldd;
pub mod version;

use std::path::{Path, PathBuf};

use apm_inject_common::{LAUNCHER_GLIBC_SO, LAUNCHER_MUSL_SO};
use log::info;

pub use self::elf::{max_glibc_version, required_glibc_version};
pub use self::ldd::{parse_ldd_output, detect_libc, LibcFlavor, LibcProfile};
pub use self::version::Version;
use crate::domain::AbiError;

/// Launcher build matching `flavor`, inside `inject_dir`
#[must_use]
pub fn launcher_path(inject_dir: &Path, flavor: LibcFlavor) -> PathBuf {
    match flavor {
        LibcFlavor::Glibc => inject_dir.join(LAUNCHER_GLIBC_SO),
        LibcFlavor::Musl => inject_dir.join(LAUNCHER_MUSL_SO),
    }
}

/// Pick the launcher for `host` and verify it can be loaded there
///
/// # Errors
/// Returns [`AbiError::LauncherMissing`] if the build is absent and
/// [`AbiError::Incompatible`] if it needs a newer glibc than the host has.
pub fn compatible_launcher(inject_dir: &Path, host: &LibcProfile) -> Result<PathBuf, AbiError> {
    let launcher = launcher_path(inject_dir, host.flavor);
    if !launcher.is_file() {
        return Err(AbiError::LauncherMissing(launcher));
    }

    if host.flavor == LibcFlavor::Glibc {
        if let Some(required) = required_glibc_version(&launcher)? {
            if host.version < required {
                return Err(AbiError::Incompatible { host: host.version, required });
            }
            info!("launcher requires glibc {required}, host has {}", host.version);
        }
    }

    Ok(launcher)
}
