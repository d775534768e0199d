//! Injection configuration
//!
//! Resolved once per invocation, in three layers:
//!
//! 1. built-in defaults
//! 2. `<install>/apm_inject/inject/inject.json`, written by `apm-inject install`
//! 3. `DK_APM_*` environment variables
//!
//! The file lives inside the inject directory, which is bind-mounted into
//! containers, so the rewriter resolves the same agent endpoints on the host
//! and inside a container. Environment lookup is passed in as a closure so
//! callers decide which environment counts (the rewriter uses the observed
//! exec environment).

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use apm_inject_common::{
    DEFAULT_INSTALL_DIR, DIR_APM_INJECT, DIR_INJECT, DIR_LIB, DIR_LOG, DKRUNC_NAME, ENV_AGENT_HOST,
    ENV_AGENT_PORT, ENV_AGENT_UDS, ENV_INJECT, ENV_INSTALL_DIR, ENV_SUBPROCESS_TIMEOUT_MS, ENV_RUNC_PATH,
    ENV_STATSD_HOST, ENV_STATSD_PORT, ENV_STATSD_UDS, JAVA_AGENT_JAR, LAUNCHER_GLIBC_SO,
};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::agent::AgentSettings;
use crate::domain::ConfigError;
use crate::fs_util::write_atomic;
use crate::subprocess::DEFAULT_SUBPROCESS_TIMEOUT;

/// Config file name inside the inject directory
pub const CONFIG_FILE_NAME: &str = "inject.json";

/// Audit log of the runtime wrapper, inside the log directory
pub const AUDIT_LOG_NAME: &str = "dkrunc.log";

/// Where injection is enabled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum InjectMode {
    Disabled,
    Host,
    Container,
    #[default]
    All,
}

impl InjectMode {
    #[must_use]
    pub fn host_enabled(self) -> bool {
        matches!(self, Self::Host | Self::All)
    }

    #[must_use]
    pub fn container_enabled(self) -> bool {
        matches!(self, Self::Container | Self::All)
    }

    /// Whether a `DK_APM_INJECT` value switches injection off
    ///
    /// Unrecognised values do not.
    #[must_use]
    pub fn is_disabling(value: &str) -> bool {
        matches!(value.parse::<Self>(), Ok(Self::Disabled))
    }
}

impl FromStr for InjectMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (mut host, mut container) = (false, false);
        for token in s.split(',').map(|t| t.trim().to_ascii_lowercase()) {
            match token.as_str() {
                "disable" | "disabled" | "off" | "false" | "0" | "none" => return Ok(Self::Disabled),
                "host" => host = true,
                "docker" | "container" => container = true,
                "all" | "both" => (host, container) = (true, true),
                "" => {}
                _ => return Err(ConfigError::InvalidMode(s.to_string())),
            }
        }
        Ok(match (host, container) {
            (true, true) => Self::All,
            (true, false) => Self::Host,
            (false, true) => Self::Container,
            (false, false) => return Err(ConfigError::InvalidMode(s.to_string())),
        })
    }
}

impl fmt::Display for InjectMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Disabled => "disable",
            Self::Host => "host",
            Self::Container => "docker",
            Self::All => "host,docker",
        })
    }
}

impl TryFrom<String> for InjectMode {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<InjectMode> for String {
    fn from(mode: InjectMode) -> Self {
        mode.to_string()
    }
}

/// Everything the drivers need to know about the installation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InjectConfig {
    /// Derived from where the config was found, never stored in it
    #[serde(skip)]
    pub install_dir: PathBuf,
    pub mode: InjectMode,
    pub agent: AgentSettings,
    /// Real container runtime; looked up as `runc` on `PATH` when unset
    pub runc_path: Option<PathBuf>,
    pub subprocess_timeout_ms: u64,
}

impl Default for InjectConfig {
    fn default() -> Self {
        Self {
            install_dir: PathBuf::from(DEFAULT_INSTALL_DIR),
            mode: InjectMode::default(),
            agent: AgentSettings::default(),
            runc_path: None,
            subprocess_timeout_ms: u64::try_from(DEFAULT_SUBPROCESS_TIMEOUT.as_millis()).unwrap_or(u64::MAX),
        }
    }
}

impl InjectConfig {
    /// Load using the process environment
    ///
    /// # Errors
    /// See [`InjectConfig::load_with`].
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load_with(|key| std::env::var(key).ok())
    }

    /// Load defaults, then the config file, then environment overrides
    ///
    /// Empty environment values count as unset.
    ///
    /// # Errors
    /// Returns an error if the config file exists but cannot be read or
    /// parsed, or if an environment override is malformed.
    pub fn load_with(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let install_dir = get(ENV_INSTALL_DIR).map_or_else(|| PathBuf::from(DEFAULT_INSTALL_DIR), PathBuf::from);
        let mut config = Self::load_file(&install_dir)?;
        config.apply_env(&get)?;
        Ok(config)
    }

    fn load_file(install_dir: &Path) -> Result<Self, ConfigError> {
        let path = config_path_in(install_dir);
        let mut config = match std::fs::read_to_string(&path) {
            Ok(text) => {
                debug!("loaded config from {}", path.display());
                serde_json::from_str(&text)?
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Self::default(),
            Err(source) => return Err(ConfigError::Read { path, source }),
        };
        config.install_dir = install_dir.to_path_buf();
        Ok(config)
    }

    fn apply_env(&mut self, get: &impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if let Some(v) = get(ENV_INJECT) {
            self.mode = v.parse()?;
        }
        if let Some(v) = get(ENV_AGENT_UDS) {
            self.agent.uds = Some(PathBuf::from(v));
        }
        if let Some(v) = get(ENV_AGENT_HOST) {
            self.agent.host = v;
        }
        if let Some(v) = get(ENV_AGENT_PORT) {
            self.agent.port = parse_number(ENV_AGENT_PORT, &v)?;
        }
        if let Some(v) = get(ENV_STATSD_UDS) {
            self.agent.statsd_uds = Some(PathBuf::from(v));
        }
        if let Some(v) = get(ENV_STATSD_HOST) {
            self.agent.statsd_host = Some(v);
        }
        if let Some(v) = get(ENV_STATSD_PORT) {
            self.agent.statsd_port = parse_number(ENV_STATSD_PORT, &v)?;
        }
        if let Some(v) = get(ENV_RUNC_PATH) {
            self.runc_path = Some(PathBuf::from(v));
        }
        if let Some(v) = get(ENV_SUBPROCESS_TIMEOUT_MS) {
            self.subprocess_timeout_ms = parse_number(ENV_SUBPROCESS_TIMEOUT_MS, &v)?;
        }
        Ok(())
    }

    /// Write the config file (readable by every user, since the rewriter runs
    /// as the application's user)
    ///
    /// # Errors
    /// Returns an error if serialization or the write fails.
    pub fn save(&self) -> Result<(), ConfigError> {
        let data = serde_json::to_vec_pretty(self)?;
        write_atomic(&self.config_path(), &data, 0o644)?;
        Ok(())
    }

    /// `<install>/apm_inject`
    #[must_use]
    pub fn apm_dir(&self) -> PathBuf {
        self.install_dir.join(DIR_APM_INJECT)
    }

    /// Launcher builds, drivers and the config file; mounted into containers
    #[must_use]
    pub fn inject_dir(&self) -> PathBuf {
        self.apm_dir().join(DIR_INJECT)
    }

    /// Tracer libraries; mounted into containers
    #[must_use]
    pub fn lib_dir(&self) -> PathBuf {
        self.apm_dir().join(DIR_LIB)
    }

    #[must_use]
    pub fn config_path(&self) -> PathBuf {
        config_path_in(&self.install_dir)
    }

    #[must_use]
    pub fn audit_log_path(&self) -> PathBuf {
        self.apm_dir().join(DIR_LOG).join(AUDIT_LOG_NAME)
    }

    #[must_use]
    pub fn java_agent_jar(&self) -> PathBuf {
        self.lib_dir().join(JAVA_AGENT_JAR)
    }

    /// Library preloaded into container processes
    #[must_use]
    pub fn preload_library(&self) -> PathBuf {
        self.inject_dir().join(LAUNCHER_GLIBC_SO)
    }

    #[must_use]
    pub fn dkrunc_path(&self) -> PathBuf {
        self.inject_dir().join(DKRUNC_NAME)
    }

    #[must_use]
    pub fn subprocess_timeout(&self) -> Duration {
        Duration::from_millis(self.subprocess_timeout_ms)
    }
}

fn config_path_in(install_dir: &Path) -> PathBuf {
    install_dir.join(DIR_APM_INJECT).join(DIR_INJECT).join(CONFIG_FILE_NAME)
}

fn parse_number<T: FromStr>(var: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue { var, value: value.to_string() })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> =
            vars.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!("host".parse::<InjectMode>().unwrap(), InjectMode::Host);
        assert_eq!("docker".parse::<InjectMode>().unwrap(), InjectMode::Container);
        assert_eq!("host,docker".parse::<InjectMode>().unwrap(), InjectMode::All);
        assert_eq!(" Docker , HOST ".parse::<InjectMode>().unwrap(), InjectMode::All);
        assert_eq!("disable".parse::<InjectMode>().unwrap(), InjectMode::Disabled);
        assert!("sometimes".parse::<InjectMode>().is_err());
    }

    #[test]
    fn test_mode_display_round_trips() {
        for mode in [InjectMode::Disabled, InjectMode::Host, InjectMode::Container, InjectMode::All] {
            assert_eq!(mode.to_string().parse::<InjectMode>().unwrap(), mode);
        }
    }

    #[test]
    fn test_is_disabling() {
        assert!(InjectMode::is_disabling("disable"));
        assert!(InjectMode::is_disabling("FALSE"));
        assert!(!InjectMode::is_disabling("host"));
        assert!(!InjectMode::is_disabling("garbage"));
    }

    #[test]
    fn test_defaults_without_file() {
        let dir = tempfile::tempdir().unwrap();
        let install = dir.path().to_str().unwrap();
        let config = InjectConfig::load_with(lookup(&[(ENV_INSTALL_DIR, install)])).unwrap();

        assert_eq!(config.install_dir, dir.path());
        assert_eq!(config.mode, InjectMode::All);
        assert_eq!(config.agent, AgentSettings::default());
        assert_eq!(config.inject_dir(), dir.path().join("apm_inject/inject"));
        assert_eq!(config.audit_log_path(), dir.path().join("apm_inject/log/dkrunc.log"));
        assert_eq!(config.java_agent_jar(), dir.path().join("apm_inject/lib/java/dd-java-agent.jar"));
    }

    #[test]
    fn test_file_then_env_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let mut saved = InjectConfig { install_dir: dir.path().to_path_buf(), ..Default::default() };
        saved.mode = InjectMode::Host;
        saved.agent.host = "10.1.1.1".to_string();
        saved.agent.port = 9000;
        std::fs::create_dir_all(saved.inject_dir()).unwrap();
        saved.save().unwrap();

        let install = dir.path().to_str().unwrap();
        let loaded = InjectConfig::load_with(lookup(&[(ENV_INSTALL_DIR, install)])).unwrap();
        assert_eq!(loaded, saved);

        let overridden = InjectConfig::load_with(lookup(&[
            (ENV_INSTALL_DIR, install),
            (ENV_AGENT_PORT, "9530"),
            (ENV_AGENT_UDS, "/var/run/datakit/apm.sock"),
            (ENV_INJECT, "disable"),
            (ENV_AGENT_HOST, ""),
        ]))
        .unwrap();
        assert_eq!(overridden.agent.host, "10.1.1.1");
        assert_eq!(overridden.agent.port, 9530);
        assert_eq!(overridden.agent.uds, Some(PathBuf::from("/var/run/datakit/apm.sock")));
        assert_eq!(overridden.mode, InjectMode::Disabled);
    }

    #[test]
    fn test_invalid_port_override() {
        let dir = tempfile::tempdir().unwrap();
        let err = InjectConfig::load_with(lookup(&[
            (ENV_INSTALL_DIR, dir.path().to_str().unwrap()),
            (ENV_AGENT_PORT, "http"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { var: ENV_AGENT_PORT, .. }));
    }

    #[test]
    fn test_malformed_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = InjectConfig { install_dir: dir.path().to_path_buf(), ..Default::default() };
        std::fs::create_dir_all(config.inject_dir()).unwrap();
        std::fs::write(config.config_path(), "{not json").unwrap();

        let err =
            InjectConfig::load_with(lookup(&[(ENV_INSTALL_DIR, dir.path().to_str().unwrap())])).unwrap_err();
        assert!(matches!(err, ConfigError::Json(_)));
    }
}
