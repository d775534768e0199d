//! Domain model for apm-inject
//!
//! This module contains core domain types and errors that provide:
//! - Value types shared by the mutator, the rewriter and the drivers
//! - Structured error handling, one enum per concern

pub mod errors;
pub mod types;

// Re-export common types for convenience
pub use types::{env_key, ExecRequest, ExecResult, InjectionEnv, MountSpec};

pub use errors::{
    AbiError, ConfigError, MutateError, SubprocessError, ResolveError, RewriteError, SpecError,
};
