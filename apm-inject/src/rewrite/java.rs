//! Java: attach the tracer through `JAVA_TOOL_OPTIONS`

use std::fs;
use std::path::Path;

use log::debug;

use super::endpoint::{endpoint_vars, Runtime};
use super::RewriteContext;
use crate::agent::AgentAddress;
use crate::domain::{ExecRequest, ExecResult, RewriteError};
use crate::fs_util::owner_has;
use crate::subprocess::run_bounded;

/// Oldest Java release the tracer supports
pub const MIN_JAVA_MAJOR: u32 = 8;

const TOOL_OPTIONS: &str = "JAVA_TOOL_OPTIONS";

const AGENT_JAR_NAME: &str = "dd-java-agent";

/// Prepend the `-javaagent` option to the JVM's tool options
///
/// # Errors
/// - [`RewriteError::AlreadyInjected`] when the tracer is already attached
/// - [`RewriteError::UnsupportedJavaVersion`] /
///   [`RewriteError::JavaVersionUnparsable`] from the `-version` output
/// - [`RewriteError::AgentJarMissing`] when the jar cannot be read
pub fn rewrite(req: &ExecRequest, ctx: &RewriteContext, agent: &AgentAddress) -> Result<ExecResult, RewriteError> {
    if already_injected(req) {
        return Err(RewriteError::AlreadyInjected);
    }

    let version = run_bounded(Path::new(&req.path), &["-version"], ctx.subprocess_timeout)?;
    let major = parse_java_major(&version.output)?;
    if major < MIN_JAVA_MAJOR {
        return Err(RewriteError::UnsupportedJavaVersion(major));
    }
    debug!("java major version {major}");

    let jar = &ctx.java_agent_jar;
    match fs::metadata(jar) {
        Ok(meta) if meta.is_file() && owner_has(&meta, 0o400) => {}
        _ => return Err(RewriteError::AgentJarMissing(jar.clone())),
    }

    let mut options = format!("-javaagent:{}", jar.display());
    if let Some(prior) = req.env_var(TOOL_OPTIONS).filter(|p| !p.is_empty()) {
        options.push(' ');
        options.push_str(prior);
    }

    let mut env = vec![format!("{TOOL_OPTIONS}={options}")];
    env.extend(endpoint_vars(agent, Runtime::Java));
    env.extend(req.env.iter().cloned());

    Ok(ExecResult { path: req.path.clone(), args: req.argv.clone(), env })
}

fn already_injected(req: &ExecRequest) -> bool {
    req.argv.iter().any(|a| a.starts_with("-javaagent:") && a.contains(AGENT_JAR_NAME))
        || req.env_var(TOOL_OPTIONS).is_some_and(|v| v.contains(AGENT_JAR_NAME))
}

/// Major version from `java -version` output
///
/// The version is the quoted token on the first line; legacy `1.x` versions
/// report `x` as the major.
///
/// # Errors
/// Returns [`RewriteError::JavaVersionUnparsable`] if there is no quoted
/// token or it does not start with a number.
pub fn parse_java_major(output: &str) -> Result<u32, RewriteError> {
    // The JVM announces JAVA_TOOL_OPTIONS and friends before the version
    let line = output.lines().find(|l| !l.starts_with("Picked up ")).unwrap_or_default();
    let unparsable = || RewriteError::JavaVersionUnparsable(line.to_string());

    let (Some(start), Some(end)) = (line.find('"'), line.rfind('"')) else {
        return Err(unparsable());
    };
    if end <= start {
        return Err(unparsable());
    }

    let mut parts = line[start + 1..end].split('.').map(leading_number);
    let first = parts.next().flatten().ok_or_else(unparsable)?;
    if first == 1 {
        parts.next().flatten().ok_or_else(unparsable)
    } else {
        Ok(first)
    }
}

fn leading_number(part: &str) -> Option<u32> {
    let end = part.find(|c: char| !c.is_ascii_digit()).unwrap_or(part.len());
    part[..end].parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::AgentSettings;
    use std::os::unix::fs::PermissionsExt;
    use std::path::PathBuf;
    use std::time::Duration;

    #[test]
    fn test_parse_modern_version() {
        let out = "openjdk version \"17.0.12\" 2024-07-16\nOpenJDK Runtime Environment (build 17.0.12+7)\n";
        assert_eq!(parse_java_major(out).unwrap(), 17);
        assert_eq!(parse_java_major("openjdk version \"21\" 2023-09-19").unwrap(), 21);
        assert_eq!(parse_java_major("openjdk version \"22-ea\" 2024-03-19").unwrap(), 22);
    }

    #[test]
    fn test_parse_legacy_version() {
        assert_eq!(parse_java_major("java version \"1.8.12_xx\"\nJava(TM) SE Runtime").unwrap(), 8);
        assert_eq!(parse_java_major("java version \"1.7.0_80\"").unwrap(), 7);
    }

    #[test]
    fn test_parse_skips_tool_options_notice() {
        let out = "Picked up JAVA_TOOL_OPTIONS: -Xmx1g\nopenjdk version \"11.0.20\" 2023-07-18\n";
        assert_eq!(parse_java_major(out).unwrap(), 11);
    }

    #[test]
    fn test_parse_unparsable() {
        for out in ["", "\n", "java: command not found", "openjdk version \"", "version \"x.y\"", "\nopenjdk version \"17\""] {
            assert!(
                matches!(parse_java_major(out), Err(RewriteError::JavaVersionUnparsable(_))),
                "{out:?}"
            );
        }
    }

    #[test]
    fn test_already_injected() {
        let req = |argv: &[&str], env: &[&str]| ExecRequest {
            path: "/usr/bin/java".to_string(),
            argv: argv.iter().map(|a| (*a).to_string()).collect(),
            env: env.iter().map(|e| (*e).to_string()).collect(),
        };

        assert!(already_injected(&req(&["java", "-javaagent:/opt/dd-java-agent.jar", "-jar", "app.jar"], &[])));
        assert!(already_injected(&req(
            &["java", "-jar", "app.jar"],
            &["JAVA_TOOL_OPTIONS=-javaagent:/opt/dd-java-agent-1.2.jar"]
        )));
        assert!(!already_injected(&req(&["java", "-javaagent:/opt/otel.jar", "-jar", "app.jar"], &[])));
        assert!(!already_injected(&req(&["java", "-Ddd-java-agent=1"], &["JAVA_TOOL_OPTIONS=-Xmx1g"])));

        let ctx = RewriteContext {
            agent: AgentSettings::default(),
            java_agent_jar: PathBuf::from("/nonexistent.jar"),
            subprocess_timeout: Duration::from_secs(1),
            cwd: PathBuf::from("/"),
        };
        let agent = AgentAddress::resolve(&ctx.agent).unwrap();
        let err = rewrite(&req(&["java", "-javaagent:/x/dd-java-agent.jar"], &[]), &ctx, &agent).unwrap_err();
        assert!(matches!(err, RewriteError::AlreadyInjected));
    }

    struct Jvm {
        dir: tempfile::TempDir,
        java: PathBuf,
        jar: PathBuf,
    }

    /// Fake `java` printing `version_line` to stderr, plus a tracer jar
    fn jvm(version_line: &str) -> Jvm {
        let dir = tempfile::tempdir().unwrap();
        let bin = dir.path().join("bin");
        fs::create_dir(&bin).unwrap();
        let java = bin.join("java");
        fs::write(&java, format!("#!/bin/sh\necho '{version_line}' >&2\n")).unwrap();
        fs::set_permissions(&java, fs::Permissions::from_mode(0o755)).unwrap();

        let jar = dir.path().join("lib/java/dd-java-agent.jar");
        fs::create_dir_all(jar.parent().unwrap()).unwrap();
        fs::write(&jar, b"PK").unwrap();
        Jvm { dir, java, jar }
    }

    fn run(jvm: &Jvm, env: &[&str]) -> Result<ExecResult, RewriteError> {
        let ctx = RewriteContext {
            agent: AgentSettings::default(),
            java_agent_jar: jvm.jar.clone(),
            subprocess_timeout: Duration::from_secs(5),
            cwd: jvm.dir.path().to_path_buf(),
        };
        let agent = AgentAddress::resolve(&ctx.agent).unwrap();
        let req = ExecRequest {
            path: jvm.java.to_string_lossy().into_owned(),
            argv: vec!["java".to_string(), "-jar".to_string(), "app.jar".to_string()],
            env: env.iter().map(|e| (*e).to_string()).collect(),
        };
        rewrite(&req, &ctx, &agent)
    }

    #[test]
    fn test_injects_tool_options() {
        let jvm = jvm("openjdk version \"17.0.12\" 2024-07-16");
        let result = run(&jvm, &["JAVA_TOOL_OPTIONS=-Xmx512m", "HOME=/root"]).unwrap();

        assert_eq!(result.path, jvm.java.to_string_lossy());
        assert_eq!(result.args, vec!["java", "-jar", "app.jar"]);
        assert_eq!(result.env[0], format!("JAVA_TOOL_OPTIONS=-javaagent:{} -Xmx512m", jvm.jar.display()));
        assert_eq!(
            &result.env[1..5],
            &[
                "DD_AGENT_HOST=localhost",
                "DD_TRACE_AGENT_PORT=9529",
                "DD_JMXFETCH_STATSD_HOST=localhost",
                "DD_JMXFETCH_STATSD_PORT=8125",
            ]
        );
        assert_eq!(&result.env[5..], &["JAVA_TOOL_OPTIONS=-Xmx512m", "HOME=/root"]);
    }

    #[test]
    fn test_legacy_java_accepted() {
        let jvm = jvm("java version \"1.8.12_xx\"");
        let result = run(&jvm, &[]).unwrap();
        assert_eq!(result.env[0], format!("JAVA_TOOL_OPTIONS=-javaagent:{}", jvm.jar.display()));
    }

    #[test]
    fn test_old_java_rejected() {
        let jvm = jvm("java version \"1.7.0_80\"");
        assert!(matches!(run(&jvm, &[]), Err(RewriteError::UnsupportedJavaVersion(7))));
    }

    #[test]
    fn test_jar_missing_or_unreadable() {
        let jvm = jvm("openjdk version \"17.0.12\"");
        fs::set_permissions(&jvm.jar, fs::Permissions::from_mode(0o000)).unwrap();
        assert!(matches!(run(&jvm, &[]), Err(RewriteError::AgentJarMissing(_))));

        fs::remove_file(&jvm.jar).unwrap();
        fs::create_dir(&jvm.jar).unwrap();
        assert!(matches!(run(&jvm, &[]), Err(RewriteError::AgentJarMissing(_))));
    }
}
