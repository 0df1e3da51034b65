//! Command-line interface for depwatch.
//!
//! # Architecture
//!
//! - [`args`] - Argument definitions using clap derive macros
//! - [`commands`] - Command implementations

pub mod args;
pub mod commands;

pub use args::{Cli, Commands, FilterArgs, ReplayArgs};
pub use commands::{Command, CommandDispatcher, CommandResult};
