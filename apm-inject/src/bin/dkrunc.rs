//! Container runtime wrapper registered with docker in place of `runc`
//!
//! Logging is off unless `DK_APM_LOG` is set: docker relays runc's stderr
//! to the user on failures.

use apm_inject_common::ENV_LOG;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::new().filter_or(ENV_LOG, "off")).init();
    let argv: Vec<_> = std::env::args_os().collect();
    std::process::exit(apm_inject::wrapper::run(&argv));
}
