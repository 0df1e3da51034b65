//! CLI command implementations.
//!
//! Each command implements the [`Command`] trait and writes its output to
//! the writer it is given, so commands can be exercised without a terminal.

pub mod dispatcher;
pub mod filter;
pub mod replay;

pub use dispatcher::{Command, CommandDispatcher, CommandResult};
