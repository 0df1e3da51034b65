//! Replay command implementation.
//!
//! `depwatch replay` runs a scenario file and prints the trace, either as
//! human-readable lines or as JSON.

use std::io::Write;
use std::path::Path;

use crate::cli::args::ReplayArgs;
use crate::config::load_scenario;
use crate::error::Result;
use crate::replay::{replay, ReplayReport};

use super::dispatcher::{Command, CommandResult};

/// The replay command implementation.
pub struct ReplayCommand {
    args: ReplayArgs,
}

impl ReplayCommand {
    pub fn new(args: ReplayArgs) -> Self {
        Self { args }
    }

    pub fn scenario(&self) -> &Path {
        &self.args.scenario
    }

    fn write_human(&self, report: &ReplayReport, out: &mut dyn Write) -> Result<()> {
        for entry in &report.trace {
            writeln!(out, "{}", entry)?;
        }
        writeln!(out)?;
        let status = if report.registered {
            "registered"
        } else {
            "not registered"
        };
        writeln!(out, "component {}: {}", report.component, status)?;
        for dep in &report.dependencies {
            writeln!(
                out,
                "  {} [{}]: {}, {} match(es)",
                dep.name, dep.description, dep.state, dep.matches
            )?;
        }
        Ok(())
    }

    fn write_json(&self, report: &ReplayReport, out: &mut dyn Write) -> Result<()> {
        serde_json::to_writer_pretty(&mut *out, report).map_err(anyhow::Error::from)?;
        writeln!(out)?;
        Ok(())
    }
}

impl Command for ReplayCommand {
    fn execute(&self, out: &mut dyn Write) -> Result<CommandResult> {
        let scenario = load_scenario(&self.args.scenario)?;
        let report = replay(&scenario)?;

        if self.args.json {
            self.write_json(&report, out)?;
        } else {
            self.write_human(&report, out)?;
        }
        Ok(CommandResult::success())
    }
}
