//! # apm-inject - APM Auto-Injection for Linux Hosts and Containers
//!
//! apm-inject makes Python and Java processes start with an APM tracer
//! attached, without changing how they are launched. A preload launcher
//! intercepts `execve`, asks the rewriter how the exec should look, and runs
//! the rewritten command instead. For docker, a runtime wrapper (`dkrunc`)
//! arranges the same preload inside every new container.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                   apm-inject (installer)                        │
//! │  check ─ install ─ uninstall ─ switch-runtime                   │
//! │     │                    │                                      │
//! │     ▼                    ▼                                      │
//! │  ┌──────────┐    /etc/ld.so.preload   /etc/docker/daemon.json   │
//! │  │   abi    │    (host launcher)      (dkrunc default runtime)  │
//! │  └──────────┘                                                   │
//! └─────────────────────────────────────────────────────────────────┘
//!                                │
//!           ┌────────────────────┴────────────────────┐
//!           ▼                                         ▼
//! ┌───────────────────────────┐        ┌────────────────────────────┐
//! │  dkrunc (runtime wrapper) │        │  apm-rewriter              │
//! │                           │        │                            │
//! │  create ──▶ oci::mutate   │        │  execve ──▶ classify       │
//! │  (mounts + LD_PRELOAD)    │        │     ├─ python ──▶ ddtrace  │
//! │        │                  │        │     └─ java   ──▶ -javaagent│
//! │        ▼                  │        │          │                 │
//! │      runc                 │        │          ▼                 │
//! └───────────────────────────┘        │  /tmp/apm_inject_rewrite_* │
//!                                      └────────────────────────────┘
//! ```
//!
//! ## Module Structure
//!
//! - [`abi`]: host libc detection and launcher compatibility
//!   (`ldd --version`, glibc symbol versions of the launcher ELF)
//! - [`agent`]: resolution of the trace and statsd endpoints
//! - [`oci`]: runtime spec model and the injection mutator used by `dkrunc`
//! - [`rewrite`]: interpreter classification and the Python/Java rewrites
//! - [`wrapper`]: the `dkrunc` pass-through to the real runtime, with audit log
//! - [`install`]: host and docker registration, preflight checks
//! - [`config`]: the persisted `inject.json` plus environment overrides
//! - [`subprocess`]: bounded child process runs (interpreter and libc checks)
//! - [`domain`]: shared request/result types and error enums
//! - [`cli`]: installer command-line parsing
//!
//! ## Failure Policy
//!
//! Injection is best-effort. The wrapper always hands control to the real
//! runtime, and the rewriter always exits 0; an injection failure leaves the
//! application running without a tracer rather than not running at all.

pub mod abi;
pub mod agent;
pub mod cli;
pub mod config;
pub mod domain;
pub mod fs_util;
pub mod install;
pub mod oci;
pub mod subprocess;
pub mod process_lookup;
pub mod rewrite;
pub mod wrapper;
