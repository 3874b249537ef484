//! Tooling Layer
//!
//! Command-line front end and the text rendering it uses.

pub mod cli;
pub mod format;

pub use cli::{Cli, CliContext, Commands, OutputFormat};
