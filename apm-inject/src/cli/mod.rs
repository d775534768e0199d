//! Command-line interface of the `apm-inject` installer

mod args;

pub use args::{Args, Command, InstallArgs};
