//! Tracer environment variables pointing at the agent

use crate::agent::AgentAddress;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Runtime {
    Python,
    /// Also gets JMX metrics (statsd) endpoints
    Java,
}

/// `KEY=VALUE` entries telling the tracer where the agent is
#[must_use]
pub fn endpoint_vars(agent: &AgentAddress, runtime: Runtime) -> Vec<String> {
    let mut vars = Vec::new();

    if let Some(url) = agent.trace_agent_url() {
        vars.push(format!("DD_TRACE_AGENT_URL={url}"));
        if runtime == Runtime::Java {
            if let Some(side) = &agent.side_uds {
                vars.push(format!("DD_JMXFETCH_STATSD_HOST={}", side.display()));
                vars.push("DD_JMXFETCH_STATSD_PORT=0".to_string());
            }
        }
    } else {
        vars.push(format!("DD_AGENT_HOST={}", agent.host));
        vars.push(format!("DD_TRACE_AGENT_PORT={}", agent.port));
        if runtime == Runtime::Java {
            vars.push(format!("DD_JMXFETCH_STATSD_HOST={}", agent.side_host));
            vars.push(format!("DD_JMXFETCH_STATSD_PORT={}", agent.side_port));
        }
    }

    vars
}
