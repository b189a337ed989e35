//! Command-line interface for the `keel` binary.

mod commands;
mod output;

pub use commands::{BackendKind, Cli, Commands, LogFormat, OutputFormat, ReleaseCommands};
pub use output::OutputFormatter;
