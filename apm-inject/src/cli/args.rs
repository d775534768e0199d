//! CLI argument definitions

use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;

use crate::agent::AgentSettings;
use crate::config::InjectMode;

#[derive(Parser)]
#[command(
    name = "apm-inject",
    about = "Install and check APM auto-injection on this host",
    after_help = "\
EXAMPLES:
    apm-inject check                                  Check libc and launcher compatibility
    sudo apm-inject install --host --docker           Inject into host processes and containers
    sudo apm-inject install --docker --agent-uds /var/run/datakit/apm.sock
    sudo apm-inject uninstall                         Remove all registrations"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Agent install root (default: $DK_APM_INSTALL_DIR or /usr/local/datakit)
    #[arg(long, global = true, value_name = "DIR")]
    pub install_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Report libc, launcher and docker runtime compatibility
    Check,

    /// Register the launcher and/or the docker runtime wrapper
    Install(InstallArgs),

    /// Remove the launcher and runtime wrapper registrations
    Uninstall,

    /// Move existing containers from one runtime to another (stop dockerd first)
    SwitchRuntime {
        #[arg(long, default_value = "runc")]
        from: String,

        #[arg(long, default_value = "dkrunc")]
        to: String,

        #[arg(long, value_name = "DIR", default_value = "/var/lib/docker/containers")]
        containers_dir: PathBuf,
    },
}

#[derive(ClapArgs)]
pub struct InstallArgs {
    /// Inject into processes started on the host
    #[arg(long)]
    pub host: bool,

    /// Inject into docker containers
    #[arg(long)]
    pub docker: bool,

    /// Agent Unix socket for traces
    #[arg(long, value_name = "PATH")]
    pub agent_uds: Option<PathBuf>,

    /// Agent host for traces
    #[arg(long)]
    pub agent_host: Option<String>,

    /// Agent port for traces
    #[arg(long)]
    pub agent_port: Option<u16>,

    /// Agent Unix socket for statsd
    #[arg(long, value_name = "PATH")]
    pub statsd_uds: Option<PathBuf>,

    /// Agent host for statsd (default: the trace host)
    #[arg(long)]
    pub statsd_host: Option<String>,

    /// Agent port for statsd
    #[arg(long)]
    pub statsd_port: Option<u16>,
}

impl InstallArgs {
    /// Mode selected by `--host` / `--docker`
    #[must_use]
    pub fn mode(&self) -> InjectMode {
        match (self.host, self.docker) {
            (true, true) => InjectMode::All,
            (true, false) => InjectMode::Host,
            (false, true) => InjectMode::Container,
            (false, false) => InjectMode::Disabled,
        }
    }

    /// Overlay the given flags on `agent`
    pub fn apply_agent(&self, agent: &mut AgentSettings) {
        if let Some(uds) = &self.agent_uds {
            agent.uds = Some(uds.clone());
        }
        if let Some(host) = &self.agent_host {
            agent.host.clone_from(host);
        }
        if let Some(port) = self.agent_port {
            agent.port = port;
        }
        if let Some(uds) = &self.statsd_uds {
            agent.statsd_uds = Some(uds.clone());
        }
        if let Some(host) = &self.statsd_host {
            agent.statsd_host = Some(host.clone());
        }
        if let Some(port) = self.statsd_port {
            agent.statsd_port = port;
        }
    }
}
