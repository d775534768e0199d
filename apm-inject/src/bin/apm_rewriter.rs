//! Exec rewriter called by the preload launcher
//!
//! Usage: `apm-rewriter <id> <path> [argv...]`, with the candidate
//! environment as this process's environment. On a rewrite the descriptor is
//! written to `/tmp/apm_inject_rewrite_<id>`; otherwise nothing is written.
//! The exit status is always 0 so the launcher falls back to the original
//! exec on any failure.

use std::ffi::OsString;

use apm_inject::config::{InjectConfig, InjectMode};
use apm_inject::domain::ExecRequest;
use apm_inject::rewrite::output::{output_path, write_result};
use apm_inject::rewrite::{rewrite, Rewrite, RewriteContext};
use apm_inject_common::ENV_LOG;
use log::{debug, warn};

fn main() {
    env_logger::Builder::from_env(env_logger::Env::new().filter_or(ENV_LOG, "off")).init();
    run(std::env::args_os().skip(1), std::env::vars_os());
}

/// `Some` only if every item is valid UTF-8
///
/// The descriptor carries text, and a lossy copy would hand the program a
/// different argv or environment than it was started with.
fn all_utf8(items: impl IntoIterator<Item = OsString>) -> Option<Vec<String>> {
    items.into_iter().map(|item| item.into_string().ok()).collect()
}

fn run(args: impl IntoIterator<Item = OsString>, vars: impl IntoIterator<Item = (OsString, OsString)>) {
    let Some(args) = all_utf8(args) else {
        debug!("non UTF-8 argument, leaving exec alone");
        return;
    };
    let env = vars.into_iter().map(|(key, value)| {
        let mut entry = key;
        entry.push("=");
        entry.push(value);
        entry
    });
    let Some(env) = all_utf8(env) else {
        debug!("non UTF-8 environment, leaving exec alone");
        return;
    };

    let mut args = args.into_iter();
    let (Some(id), Some(path)) = (args.next(), args.next()) else {
        warn!("usage: apm-rewriter <id> <path> [argv...]");
        return;
    };
    let Ok(output) = output_path(&id) else {
        warn!("invalid rewrite id {id:?}");
        return;
    };

    let config = match InjectConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            warn!("config: {e}");
            return;
        }
    };
    if config.mode == InjectMode::Disabled {
        debug!("injection disabled in config");
        return;
    }

    let req = ExecRequest { path, argv: args.collect(), env };

    match rewrite(&req, &RewriteContext::from_config(&config)) {
        Ok(Rewrite::Injected(result)) => {
            if let Err(e) = write_result(&output, &result) {
                warn!("{e:#}");
            }
        }
        Ok(Rewrite::NoAction) => debug!("no rewrite for {}", req.path),
        Err(e) => debug!("not injecting into {}: {e}", req.path),
    }
}
