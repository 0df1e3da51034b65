//! Filter command implementation.
//!
//! `depwatch filter` parses an expression, prints its normalized form and
//! tests it against the given attributes.

use std::io::Write;
use tracing::debug;

use crate::cli::args::FilterArgs;
use crate::error::{DepwatchError, Result};
use crate::filter::Filter;
use crate::provider::Attributes;

use super::dispatcher::{Command, CommandResult};

/// Exit code when the filter parses but does not match.
pub const NO_MATCH_EXIT_CODE: i32 = 2;

/// The filter command implementation.
pub struct FilterCommand {
    args: FilterArgs,
}

impl FilterCommand {
    pub fn new(args: FilterArgs) -> Self {
        Self { args }
    }

    pub fn args(&self) -> &FilterArgs {
        &self.args
    }
}

impl Command for FilterCommand {
    fn execute(&self, out: &mut dyn Write) -> Result<CommandResult> {
        let filter =
            Filter::parse(&self.args.expression).map_err(|e| DepwatchError::InvalidFilter {
                expression: self.args.expression.clone(),
                message: e.to_string(),
            })?;
        let attributes: Attributes = self.args.attributes.iter().cloned().collect();
        debug!(filter = %filter, attributes = attributes.len(), "Evaluating filter");

        writeln!(out, "{}", filter)?;
        if filter.matches(&attributes) {
            writeln!(out, "match")?;
            Ok(CommandResult::success())
        } else {
            writeln!(out, "no match")?;
            Ok(CommandResult::failure(NO_MATCH_EXIT_CODE))
        }
    }
}
