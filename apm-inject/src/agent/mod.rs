//! Agent address resolution
//!
//! The tracer needs two endpoints: the trace intake (primary) and the statsd
//! intake (secondary, "side"). Each is either a Unix domain socket or a
//! host/port pair. Settings come from [`crate::config::InjectConfig`]; this
//! module turns them into a validated [`AgentAddress`] once per invocation.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::domain::ResolveError;

/// Default trace intake port of the agent's HTTP server
pub const DEFAULT_AGENT_PORT: u16 = 9529;

/// Default statsd intake port
pub const DEFAULT_STATSD_PORT: u16 = 8125;

/// Raw agent endpoint settings, as configured
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentSettings {
    pub uds: Option<PathBuf>,
    pub host: String,
    pub port: u16,
    pub statsd_uds: Option<PathBuf>,
    /// Falls back to `host`
    pub statsd_host: Option<String>,
    pub statsd_port: u16,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            uds: None,
            host: "localhost".to_string(),
            port: DEFAULT_AGENT_PORT,
            statsd_uds: None,
            statsd_host: None,
            statsd_port: DEFAULT_STATSD_PORT,
        }
    }
}

/// Resolved, reachable agent endpoints
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentAddress {
    pub uds: Option<PathBuf>,
    pub host: String,
    pub port: u16,
    pub side_uds: Option<PathBuf>,
    pub side_host: String,
    pub side_port: u16,
}

impl AgentAddress {
    /// Resolve endpoints from settings
    ///
    /// Empty socket paths count as unset.
    ///
    /// # Errors
    /// Returns [`ResolveError::NoAgentAddress`] if there is neither a primary
    /// socket nor a usable primary host and port.
    pub fn resolve(settings: &AgentSettings) -> Result<Self, ResolveError> {
        let uds = non_empty_path(settings.uds.as_deref());
        let host = settings.host.trim().to_string();

        if uds.is_none() && (host.is_empty() || settings.port == 0) {
            return Err(ResolveError::NoAgentAddress);
        }

        let side_host = settings
            .statsd_host
            .as_deref()
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .map_or_else(|| host.clone(), str::to_string);

        Ok(Self {
            uds,
            host,
            port: settings.port,
            side_uds: non_empty_path(settings.statsd_uds.as_deref()),
            side_host,
            side_port: settings.statsd_port,
        })
    }

    /// `unix://` URL of the primary socket, if the agent listens on one
    #[must_use]
    pub fn trace_agent_url(&self) -> Option<String> {
        self.uds.as_ref().map(|p| format!("unix://{}", p.display()))
    }

    /// Directory holding the primary socket (mounted into containers)
    #[must_use]
    pub fn uds_dir(&self) -> Option<&Path> {
        self.uds.as_deref().and_then(Path::parent).filter(|p| !p.as_os_str().is_empty())
    }
}

fn non_empty_path(path: Option<&Path>) -> Option<PathBuf> {
    path.filter(|p| !p.as_os_str().is_empty()).map(Path::to_path_buf)
}
