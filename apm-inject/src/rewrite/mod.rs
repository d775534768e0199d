//! # Exec Parameter Rewriting
//!
//! The preload launcher asks the rewriter about every exec it intercepts. The
//! answer is either "run this instead" or "leave it alone":
//!
//! ```text
//! ExecRequest ──▶ classify ──┬─ Python ──▶ ddtrace-run <argv...>
//!                            ├─ Java   ──▶ JAVA_TOOL_OPTIONS=-javaagent:...
//!                            └─ other  ──▶ NoAction
//! ```
//!
//! Every validation failure is an error and the caller execs the original
//! program, so a half-applied rewrite can never reach the launcher.

pub mod classify;
pub mod endpoint;
pub mod java;
pub mod output;
pub mod python;

use std::path::PathBuf;
use std::time::Duration;

use apm_inject_common::ENV_INJECT;
use log::debug;

pub use self::classify::{classify, Interpreter};
pub use self::java::parse_java_major;
use crate::agent::{AgentAddress, AgentSettings};
use crate::config::{InjectConfig, InjectMode};
use crate::domain::{ExecRequest, ExecResult, RewriteError};

/// Outcome of a successful rewrite pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rewrite {
    Injected(ExecResult),
    NoAction,
}

/// What the rewriter needs beyond the request itself
#[derive(Debug, Clone)]
pub struct RewriteContext {
    pub agent: AgentSettings,
    pub java_agent_jar: PathBuf,
    pub subprocess_timeout: Duration,
    /// Base for relative `PATH` entries
    pub cwd: PathBuf,
}

impl RewriteContext {
    #[must_use]
    pub fn from_config(config: &InjectConfig) -> Self {
        Self {
            agent: config.agent.clone(),
            java_agent_jar: config.java_agent_jar(),
            subprocess_timeout: config.subprocess_timeout(),
            cwd: std::env::current_dir().unwrap_or_else(|_| PathBuf::from("/")),
        }
    }
}

/// Decide how `req` should be exec'd
///
/// # Errors
/// Returns the first validation failure for a recognised interpreter; see
/// [`RewriteError`].
pub fn rewrite(req: &ExecRequest, ctx: &RewriteContext) -> Result<Rewrite, RewriteError> {
    if req.env_var(ENV_INJECT).is_some_and(InjectMode::is_disabling) {
        debug!("injection disabled by {ENV_INJECT}");
        return Ok(Rewrite::NoAction);
    }

    let result = match classify(req) {
        Interpreter::Unrecognized => return Ok(Rewrite::NoAction),
        Interpreter::Python { interpreter } => {
            let agent = AgentAddress::resolve(&ctx.agent)?;
            python::rewrite(req, &interpreter, ctx, &agent)?
        }
        Interpreter::Java => {
            let agent = AgentAddress::resolve(&ctx.agent)?;
            java::rewrite(req, ctx, &agent)?
        }
    };

    debug!("rewrote exec of {} to {}", req.path, result.path);
    Ok(Rewrite::Injected(result))
}
