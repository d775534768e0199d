//! The few runtime arguments the wrapper cares about
//!
//! Everything is forwarded to the real runtime untouched; this only peeks at
//! the bundle location and whether the container is being created.

use std::ffi::OsStr;
use std::os::unix::ffi::OsStrExt;
use std::path::PathBuf;

/// What the wrapper learned from its command line
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuntimeArgs {
    pub bundle: Option<PathBuf>,
    pub is_create: bool,
}

/// Scan `args` (without argv[0]) in one pass
///
/// Arguments are raw OS strings; a bundle path need not be UTF-8.
#[must_use]
pub fn parse_args<S: AsRef<OsStr>>(args: &[S]) -> RuntimeArgs {
    let mut parsed = RuntimeArgs::default();
    let mut iter = args.iter().map(AsRef::as_ref);

    while let Some(arg) = iter.next() {
        match arg.as_bytes() {
            b"--bundle" | b"-b" => parsed.bundle = iter.next().map(PathBuf::from),
            b"create" => parsed.is_create = true,
            other => {
                if let Some(path) = other.strip_prefix(b"--bundle=") {
                    parsed.bundle = Some(PathBuf::from(OsStr::from_bytes(path)));
                }
            }
        }
    }

    parsed
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(s: &str) -> Vec<String> {
        s.split_whitespace().map(str::to_string).collect()
    }

    #[test]
    fn test_docker_create() {
        let parsed = parse_args(&args(
            "--root /var/run/docker/runtime-runc/moby --log /run/log.json --log-format json \
             create --bundle /run/containerd/io.containerd.runtime.v2.task/moby/abc \
             --pid-file /run/abc/init.pid abc",
        ));
        assert!(parsed.is_create);
        assert_eq!(parsed.bundle, Some(PathBuf::from("/run/containerd/io.containerd.runtime.v2.task/moby/abc")));
    }

    #[test]
    fn test_bundle_forms() {
        assert_eq!(parse_args(&args("create --bundle=/b id")).bundle, Some(PathBuf::from("/b")));
        assert_eq!(parse_args(&args("create -b /b id")).bundle, Some(PathBuf::from("/b")));
        assert_eq!(parse_args(&args("create -b")).bundle, None);
    }

    #[test]
    fn test_other_subcommands() {
        let parsed = parse_args(&args("--root /run/runc start abc"));
        assert_eq!(parsed, RuntimeArgs::default());
        assert!(!parse_args(&args("delete --force abc")).is_create);
    }

    #[test]
    fn test_non_utf8_bundle() {
        use std::ffi::OsString;
        use std::os::unix::ffi::OsStringExt;

        let bundle = OsString::from_vec(b"/run/b\xff".to_vec());
        let mut flag = OsString::from("--bundle=");
        flag.push(&bundle);

        let parsed = parse_args(&[OsString::from("create"), flag]);
        assert!(parsed.is_create);
        assert_eq!(parsed.bundle, Some(PathBuf::from(&bundle)));

        let parsed = parse_args(&[OsString::from("create"), OsString::from("-b"), bundle.clone()]);
        assert_eq!(parsed.bundle, Some(PathBuf::from(bundle)));
    }
}
