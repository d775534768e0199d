//! # apm-inject - Installer Entry Point
//!
//! - `check`: read-only compatibility report
//! - `install` / `uninstall`: edit `/etc/ld.so.preload` and docker's `daemon.json`
//! - `switch-runtime`: repoint existing containers' `hostconfig.json`

use anyhow::{Context, Result};
use clap::Parser;
use log::info;

use apm_inject::cli::{Args, Command, InstallArgs};
use apm_inject::config::InjectConfig;
use apm_inject::install::docker::switch_container_runtime;
use apm_inject::install::preflight::run_preflight_checks;
use apm_inject::install::{check, install, uninstall, SystemPaths};

// Exit codes
const EXIT_SUCCESS: i32 = 0;
const EXIT_ERROR: i32 = 1;
const EXIT_USAGE: i32 = 2;
const EXIT_NOPERM: i32 = 77;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    std::process::exit(match run() {
        Ok(code) => code,
        Err(e) => {
            let code = exit_code_for(&e);
            eprintln!("error: {e:#}");
            code
        }
    });
}

fn exit_code_for(err: &anyhow::Error) -> i32 {
    let msg = format!("{err:#}").to_lowercase();
    if msg.contains("permission denied") || msg.contains("requires root") {
        EXIT_NOPERM
    } else if msg.contains("invalid value") {
        EXIT_USAGE
    } else {
        EXIT_ERROR
    }
}

fn load_config(args: &Args) -> Result<InjectConfig> {
    let install_dir = args.install_dir.as_ref().map(|p| p.display().to_string());
    InjectConfig::load_with(|key| {
        if key == apm_inject_common::ENV_INSTALL_DIR && install_dir.is_some() {
            return install_dir.clone();
        }
        std::env::var(key).ok()
    })
    .context("Failed to load inject config")
}

fn install_config(mut config: InjectConfig, flags: &InstallArgs) -> InjectConfig {
    config.mode = flags.mode();
    flags.apply_agent(&mut config.agent);
    config
}

fn run() -> Result<i32> {
    let args = Args::parse();
    let config = load_config(&args)?;
    let paths = SystemPaths::default();

    match &args.command {
        Command::Check => {
            let mut failed = false;
            for item in check(&config) {
                match item.outcome {
                    Ok(detail) => println!("{:<15} ok    {detail}", item.name),
                    Err(e) => {
                        failed = true;
                        println!("{:<15} fail  {e:#}", item.name);
                    }
                }
            }
            Ok(if failed { EXIT_ERROR } else { EXIT_SUCCESS })
        }
        Command::Install(flags) => {
            let config = install_config(config, flags);
            run_preflight_checks(&config, config.mode.container_enabled())?;
            info!("installing with mode {}", config.mode);

            let report = install(&config, &paths)?;
            print!("{report}");
            Ok(if report.errors.is_empty() { EXIT_SUCCESS } else { EXIT_ERROR })
        }
        Command::Uninstall => {
            run_preflight_checks(&config, false)?;
            let report = uninstall(&config, &paths)?;
            print!("{report}");
            Ok(if report.errors.is_empty() { EXIT_SUCCESS } else { EXIT_ERROR })
        }
        Command::SwitchRuntime { from, to, containers_dir } => {
            run_preflight_checks(&config, false)?;
            let switched = switch_container_runtime(containers_dir, from, to)?;
            println!("switched {switched} container(s) from {from} to {to}");
            Ok(EXIT_SUCCESS)
        }
    }
}
