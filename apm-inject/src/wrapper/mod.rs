//! # Runtime Wrapper (`dkrunc`)
//!
//! Registered with docker as the default runtime. Every invocation is passed
//! through to the real `runc`; on `create` the bundle's spec is mutated first
//! so the container starts with the launcher preloaded.
//!
//! ```text
//! argv ──▶ parse_args ──▶ [create] load config.json ──▶ mutate ──▶ store
//!                                                                   │
//!                 audit log ◀── exit code ◀── runc argv[1..] ◀──────┘
//! ```
//!
//! Nothing in the injection path can fail the container: errors are recorded
//! in the audit line and the unmodified spec is handed to `runc`.

pub mod args;
pub mod audit;
pub mod runtime;

use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::{debug, warn};

pub use self::args::{parse_args, RuntimeArgs};
pub use self::audit::{list_entries, AuditRecord};
pub use self::runtime::{exit_code, resolve_runtime, run_runtime, SPAWN_FAILED};
use crate::agent::AgentAddress;
use crate::config::{InjectConfig, InjectMode};
use crate::oci::{self, injection_plan, CONFIG_JSON};

/// Full wrapper run over the complete `argv`; returns the exit code to mirror
///
/// `argv[1..]` is forwarded byte for byte. The audit record keeps a lossy
/// UTF-8 copy of the whole vector.
#[must_use]
pub fn run(argv: &[OsString]) -> i32 {
    let mut record = AuditRecord::new(argv.iter().map(|a| a.to_string_lossy().into_owned()).collect());

    let config = InjectConfig::from_env().unwrap_or_else(|e| {
        warn!("config: {e}");
        record.error(format!("config: {e}"));
        InjectConfig { mode: InjectMode::Disabled, ..Default::default() }
    });

    let args = argv.get(1..).unwrap_or_default();
    record.exit_code = invoke(args, &config, &mut record);

    if let Err(e) = record.append_to(&config.audit_log_path()) {
        debug!("audit log not written: {e}");
    }
    record.exit_code
}

/// Mutate the bundle if this is a `create`, then run the real runtime
pub fn invoke<S: AsRef<OsStr>>(args: &[S], config: &InjectConfig, record: &mut AuditRecord) -> i32 {
    let parsed = parse_args(args);

    let bundle = match (&parsed.bundle, parsed.is_create) {
        (Some(bundle), _) => Some(bundle.clone()),
        // runc defaults the bundle to the working directory
        (None, true) => Some(PathBuf::from(".")),
        (None, false) => None,
    };
    if let Some(bundle) = &bundle {
        record.bundle_entries = list_entries(bundle);
    }

    if let Some(bundle) = bundle.as_deref().filter(|_| parsed.is_create) {
        match prepare_bundle(bundle, config) {
            Ok(true) => debug!("injected into {}", bundle.display()),
            Ok(false) => {}
            Err(e) => {
                warn!("injection skipped: {e:#}");
                record.error(format!("{e:#}"));
            }
        }
    }

    let outcome = resolve_runtime(config).and_then(|runtime| {
        run_runtime(&runtime, args).with_context(|| format!("Failed to start {}", runtime.display()))
    });
    outcome.unwrap_or_else(|e| {
        record.error(format!("{e:#}"));
        SPAWN_FAILED
    })
}

/// Rewrite `bundle/config.json`; `Ok(false)` when nothing was to be done
fn prepare_bundle(bundle: &Path, config: &InjectConfig) -> Result<bool> {
    if !config.mode.container_enabled() {
        debug!("container injection disabled (mode {})", config.mode);
        return Ok(false);
    }

    let spec_path = bundle.join(CONFIG_JSON);
    if !spec_path.is_file() {
        return Ok(false);
    }
    let spec = oci::spec::load(&spec_path)?;

    let agent = AgentAddress::resolve(&config.agent)?;
    let plan = injection_plan(config, &agent);
    let mutated = oci::mutate(bundle, &spec, &plan.mounts, &plan.env)?;

    oci::spec::store(&spec_path, &mutated)?;
    Ok(true)
}
