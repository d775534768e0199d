//! Runtime spec mutation: bind-mount the injection directories and extend the
//! container process environment.

use std::fs;
use std::path::{Path, PathBuf};

use log::debug;

use super::spec::{Mount, RuntimeSpec};
use crate::domain::{env_key, InjectionEnv, MountSpec, MutateError};

/// Return a copy of `spec` with `mounts` and `env` added
///
/// All checks run against the input before anything is copied, so `spec` is
/// the same whether or not this succeeds.
///
/// # Errors
/// - [`MutateError::EnvConflict`] if the spec has no process or already sets
///   one of the injected keys
/// - [`MutateError::MountConflict`] if a destination is already mounted
/// - [`MutateError::HostPathMissing`] if a host directory does not exist
/// - [`MutateError::ContainerPathNotEmpty`] if the container already has
///   content at a destination that must be empty
pub fn mutate(
    bundle: &Path,
    spec: &RuntimeSpec,
    mounts: &[MountSpec],
    env: &InjectionEnv,
) -> Result<RuntimeSpec, MutateError> {
    let rootfs = effective_root(bundle, spec);

    check_env(spec, env)?;

    let existing: Vec<&str> =
        spec.mounts.iter().flatten().map(|m| m.destination.as_str()).collect();
    for mount in mounts {
        check_mount(&rootfs, &existing, mount)?;
    }

    let mut mutated = spec.clone();
    let spec_mounts = mutated.mounts.get_or_insert_with(Vec::new);
    for mount in mounts {
        let path = mount.host_path.to_string_lossy();
        spec_mounts.push(Mount::bind(&path, mount.read_only));
    }
    if let Some(process) = mutated.process.as_mut() {
        process.env.get_or_insert_with(Vec::new).extend(env.to_env_strings());
    }

    debug!("added {} mounts and {} env entries", mounts.len(), env.len());
    Ok(mutated)
}

/// `root.path` if absolute, otherwise relative to the bundle
fn effective_root(bundle: &Path, spec: &RuntimeSpec) -> PathBuf {
    let root = spec.root.as_ref().map_or("", |r| r.path.as_str());
    let root = Path::new(root);
    if root.is_absolute() {
        root.to_path_buf()
    } else {
        bundle.join(root)
    }
}

fn check_env(spec: &RuntimeSpec, env: &InjectionEnv) -> Result<(), MutateError> {
    let Some(process) = spec.process.as_ref() else {
        return Err(MutateError::EnvConflict { reason: "spec has no process".to_string() });
    };

    let present: Vec<&str> = process.env.iter().flatten().map(|e| env_key(e)).collect();
    if let Some(key) = env.keys().find(|k| present.contains(k)) {
        return Err(MutateError::EnvConflict { reason: format!("{key} is already set") });
    }
    Ok(())
}

fn check_mount(rootfs: &Path, existing: &[&str], mount: &MountSpec) -> Result<(), MutateError> {
    let dest = mount.destination();
    if existing.iter().any(|d| Path::new(d) == dest) {
        return Err(MutateError::MountConflict(dest.to_path_buf()));
    }
    if !mount.host_path.is_dir() {
        return Err(MutateError::HostPathMissing(mount.host_path.clone()));
    }
    if !mount.skip_empty_check {
        let in_container = rootfs.join(dest.strip_prefix("/").unwrap_or(dest));
        if has_entries(&in_container) {
            return Err(MutateError::ContainerPathNotEmpty(dest.to_path_buf()));
        }
    }
    Ok(())
}

// Unreadable or missing directories count as empty
fn has_entries(dir: &Path) -> bool {
    fs::read_dir(dir).is_ok_and(|mut entries| entries.next().is_some())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oci::spec::{parse, Process, Root};
    use tempfile::TempDir;

    struct Fixture {
        _tmp: TempDir,
        bundle: PathBuf,
        inject: PathBuf,
        lib: PathBuf,
    }

    fn fixture() -> Fixture {
        let tmp = tempfile::tempdir().unwrap();
        let bundle = tmp.path().join("bundle");
        let inject = tmp.path().join("datakit/apm_inject/inject");
        let lib = tmp.path().join("datakit/apm_inject/lib");
        fs::create_dir_all(bundle.join("rootfs")).unwrap();
        fs::create_dir_all(&inject).unwrap();
        fs::create_dir_all(&lib).unwrap();
        Fixture { _tmp: tmp, bundle, inject, lib }
    }

    fn spec_with(mounts: &[&str], env: &[&str]) -> RuntimeSpec {
        RuntimeSpec {
            root: Some(Root { path: "rootfs".to_string(), ..Default::default() }),
            mounts: Some(
                mounts
                    .iter()
                    .map(|d| Mount { destination: (*d).to_string(), ..Default::default() })
                    .collect(),
            ),
            process: Some(Process {
                env: Some(env.iter().map(|e| (*e).to_string()).collect()),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn preload_env(fx: &Fixture) -> InjectionEnv {
        let mut env = InjectionEnv::new();
        env.push("LD_PRELOAD", fx.inject.join("apm_launcher.so").to_string_lossy());
        env
    }

    #[test]
    fn test_mounts_and_env_appended_in_order() {
        let fx = fixture();
        let spec = spec_with(&["/proc", "/dev"], &["PATH=/usr/bin", "HOME=/root"]);
        let mounts = [MountSpec::read_only(&fx.inject), MountSpec::read_only(&fx.lib)];
        let mut env = preload_env(&fx);
        env.push("DK_APM_AGENT_UDS", "/var/run/datakit/apm.sock");

        let out = mutate(&fx.bundle, &spec, &mounts, &env).unwrap();

        let out_mounts = out.mounts.as_ref().unwrap();
        assert_eq!(out_mounts.len(), 4);
        assert_eq!(out_mounts[0].destination, "/proc");
        assert_eq!(out_mounts[1].destination, "/dev");
        assert_eq!(out_mounts[2].destination, fx.inject.to_string_lossy());
        assert_eq!(out_mounts[2].source.as_deref(), Some(&*fx.inject.to_string_lossy()));
        assert_eq!(out_mounts[2].mount_type.as_deref(), Some("none"));
        assert_eq!(out_mounts[3].options.as_ref().unwrap(), &vec!["bind", "ro"]);

        let out_env = out.process.as_ref().unwrap().env.as_ref().unwrap();
        assert_eq!(out_env.len(), 4);
        assert_eq!(&out_env[..2], &["PATH=/usr/bin", "HOME=/root"]);
        assert!(out_env[2].starts_with("LD_PRELOAD="));
        assert_eq!(out_env[3], "DK_APM_AGENT_UDS=/var/run/datakit/apm.sock");
    }

    #[test]
    fn test_writable_socket_mount_skips_empty_check() {
        let fx = fixture();
        let sock_dir = fx.bundle.parent().unwrap().join("run/datakit");
        fs::create_dir_all(&sock_dir).unwrap();
        let in_rootfs = fx.bundle.join("rootfs").join(sock_dir.strip_prefix("/").unwrap());
        fs::create_dir_all(&in_rootfs).unwrap();
        fs::write(in_rootfs.join("other.pid"), "1").unwrap();

        let spec = spec_with(&[], &[]);
        let out = mutate(&fx.bundle, &spec, &[MountSpec::socket_dir(&sock_dir)], &InjectionEnv::new())
            .unwrap();
        assert_eq!(out.mounts.unwrap()[0].options.as_ref().unwrap(), &vec!["bind"]);
    }

    #[test]
    fn test_mount_conflict_leaves_input_unchanged() {
        let fx = fixture();
        let inject = fx.inject.to_string_lossy().into_owned();
        let spec = spec_with(&["/proc", inject.as_str()], &["PATH=/usr/bin"]);
        let before = spec.clone();

        let err = mutate(&fx.bundle, &spec, &[MountSpec::read_only(&fx.inject)], &preload_env(&fx))
            .unwrap_err();

        assert!(matches!(err, MutateError::MountConflict(p) if p == fx.inject));
        assert_eq!(spec, before);
    }

    #[test]
    fn test_env_conflict_leaves_input_unchanged() {
        let fx = fixture();
        let spec = spec_with(&["/proc"], &["PATH=/usr/bin", "LD_PRELOAD=/usr/lib/libjemalloc.so"]);
        let before = spec.clone();

        let err = mutate(&fx.bundle, &spec, &[MountSpec::read_only(&fx.inject)], &preload_env(&fx))
            .unwrap_err();

        assert!(matches!(err, MutateError::EnvConflict { .. }));
        assert_eq!(spec, before);
    }

    #[test]
    fn test_missing_process_is_env_conflict() {
        let fx = fixture();
        let spec = RuntimeSpec { process: None, ..spec_with(&[], &[]) };
        let err = mutate(&fx.bundle, &spec, &[], &preload_env(&fx)).unwrap_err();
        assert!(matches!(err, MutateError::EnvConflict { .. }));
    }

    #[test]
    fn test_host_path_missing() {
        let fx = fixture();
        let missing = fx.bundle.join("no-such-dir");
        let err = mutate(&fx.bundle, &spec_with(&[], &[]), &[MountSpec::read_only(&missing)], &InjectionEnv::new())
            .unwrap_err();
        assert!(matches!(err, MutateError::HostPathMissing(p) if p == missing));
    }

    #[test]
    fn test_container_path_not_empty() {
        let fx = fixture();
        let in_rootfs = fx.bundle.join("rootfs").join(fx.inject.strip_prefix("/").unwrap());
        fs::create_dir_all(&in_rootfs).unwrap();
        fs::write(in_rootfs.join("stale"), "").unwrap();

        let err = mutate(&fx.bundle, &spec_with(&[], &[]), &[MountSpec::read_only(&fx.inject)], &InjectionEnv::new())
            .unwrap_err();
        assert!(matches!(err, MutateError::ContainerPathNotEmpty(_)));
    }

    #[test]
    fn test_empty_container_path_is_fine() {
        let fx = fixture();
        let in_rootfs = fx.bundle.join("rootfs").join(fx.inject.strip_prefix("/").unwrap());
        fs::create_dir_all(&in_rootfs).unwrap();

        let out = mutate(&fx.bundle, &spec_with(&[], &[]), &[MountSpec::read_only(&fx.inject)], &InjectionEnv::new());
        assert!(out.is_ok());
    }

    #[test]
    fn test_absolute_root_path() {
        let fx = fixture();
        let rootfs = fx.bundle.join("rootfs");
        let in_rootfs = rootfs.join(fx.lib.strip_prefix("/").unwrap());
        fs::create_dir_all(&in_rootfs).unwrap();
        fs::write(in_rootfs.join("x"), "").unwrap();

        let mut spec = spec_with(&[], &[]);
        spec.root = Some(Root { path: rootfs.to_string_lossy().into_owned(), ..Default::default() });

        // Bundle argument is irrelevant once root.path is absolute
        let err = mutate(Path::new("/nonexistent"), &spec, &[MountSpec::read_only(&fx.lib)], &InjectionEnv::new())
            .unwrap_err();
        assert!(matches!(err, MutateError::ContainerPathNotEmpty(_)));
    }

    #[test]
    fn test_unknown_fields_carried_through() {
        let fx = fixture();
        let spec = parse(
            r#"{"ociVersion":"1.0.2","root":{"path":"rootfs"},
                "process":{"args":["sh"],"env":["A=1"]},
                "linux":{"namespaces":[{"type":"pid"}]}}"#,
        )
        .unwrap();

        let out = mutate(&fx.bundle, &spec, &[MountSpec::read_only(&fx.inject)], &preload_env(&fx)).unwrap();

        let value = serde_json::to_value(&out).unwrap();
        assert_eq!(value["ociVersion"], "1.0.2");
        assert_eq!(value["linux"]["namespaces"][0]["type"], "pid");
        assert_eq!(value["process"]["args"][0], "sh");
        assert_eq!(value["mounts"].as_array().unwrap().len(), 1);
    }
}
