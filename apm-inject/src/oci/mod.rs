//! # OCI Spec Mutation
//!
//! `dkrunc` sits between the container engine and `runc`. On `create` it
//! rewrites the bundle's `config.json` so the container sees the injection
//! directories and preloads the launcher:
//!
//! ```text
//! bundle/config.json ──▶ RuntimeSpec ──▶ mutate(mounts, env) ──▶ config.json
//!                                             ▲
//!                          InjectConfig ──▶ injection_plan
//! ```
//!
//! ## Module Structure
//!
//! - **`spec`**: lossless serde model of the runtime spec
//! - **`mutator`**: validation and the actual mount/env additions

pub mod mutator;
pub mod spec;

use apm_inject_common::ENV_AGENT_UDS;

pub use self::mutator::mutate;
pub use self::spec::{Mount, Process, Root, RuntimeSpec, CONFIG_JSON};
use crate::agent::AgentAddress;
use crate::config::InjectConfig;
use crate::domain::{InjectionEnv, MountSpec};

/// Mounts and environment added to every container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InjectionPlan {
    pub mounts: Vec<MountSpec>,
    pub env: InjectionEnv,
}

/// Build the plan for `config`
///
/// The agent socket directory is mounted (and advertised to the launcher)
/// only when the agent listens on a Unix socket.
#[must_use]
pub fn injection_plan(config: &InjectConfig, agent: &AgentAddress) -> InjectionPlan {
    let mut mounts = vec![MountSpec::read_only(config.inject_dir()), MountSpec::read_only(config.lib_dir())];

    let mut env = InjectionEnv::new();
    env.push("LD_PRELOAD", config.preload_library().to_string_lossy());

    if let Some(uds) = agent.uds.as_deref() {
        if let Some(dir) = agent.uds_dir() {
            mounts.push(MountSpec::socket_dir(dir));
        }
        env.push(ENV_AGENT_UDS, uds.to_string_lossy());
    }

    InjectionPlan { mounts, env }
}
