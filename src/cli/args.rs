//! CLI argument definitions.
//!
//! This module defines all CLI arguments using clap's derive macros.
//! The main entry point is the [`Cli`] struct.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// depwatch - Dynamic module dependency tracking.
#[derive(Debug, Parser)]
#[command(name = "depwatch")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable debug logging
    #[arg(long, global = true, env = "DEPWATCH_DEBUG")]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Replay a scenario file and print the notification trace
    Replay(ReplayArgs),

    /// Parse a filter expression and test it against attributes
    Filter(FilterArgs),
}

/// Arguments for `depwatch replay`.
#[derive(Debug, Clone, Args)]
pub struct ReplayArgs {
    /// Scenario file (YAML)
    pub scenario: PathBuf,

    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for `depwatch filter`.
#[derive(Debug, Clone, Args)]
pub struct FilterArgs {
    /// Filter expression, e.g. "(&(Module-SymbolicName=api)(Module-Version>=2))"
    pub expression: String,

    /// Attribute to match against, as key=value (repeatable)
    #[arg(short, long = "attribute", value_parser = parse_key_value)]
    pub attributes: Vec<(String, String)>,
}

/// Parse a `key=value` pair.
fn parse_key_value(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{}'", s))?;
    if key.trim().is_empty() {
        return Err(format!("missing key in '{}'", s));
    }
    Ok((key.trim().to_string(), value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_replay_args() {
        let cli = Cli::parse_from(["depwatch", "replay", "s.yml", "--json"]);
        match cli.command {
            Commands::Replay(args) => {
                assert_eq!(args.scenario, PathBuf::from("s.yml"));
                assert!(args.json);
            }
            other => panic!("expected replay, got {:?}", other),
        }
    }

    #[test]
    fn parses_filter_attributes() {
        let cli = Cli::parse_from([
            "depwatch", "--debug", "filter", "(a=1)", "-a", "a=1", "--attribute", "b=x=y",
        ]);
        assert!(cli.debug);
        match cli.command {
            Commands::Filter(args) => {
                assert_eq!(
                    args.attributes,
                    vec![
                        ("a".to_string(), "1".to_string()),
                        ("b".to_string(), "x=y".to_string())
                    ]
                );
            }
            other => panic!("expected filter, got {:?}", other),
        }
    }

    #[test]
    fn rejects_attribute_without_equals() {
        assert!(Cli::try_parse_from(["depwatch", "filter", "(a=1)", "-a", "oops"]).is_err());
        assert!(parse_key_value("=v").is_err());
    }
}
