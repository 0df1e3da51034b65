//! Scenario file loading.

use crate::config::schema::ScenarioConfig;
use crate::error::{DepwatchError, Result};
use std::fs;
use std::path::Path;

/// Load and parse a scenario file.
///
/// # Errors
///
/// Returns `ConfigNotFound` when the file does not exist and
/// `ConfigParseError` when it is not a valid scenario.
pub fn load_scenario(path: &Path) -> Result<ScenarioConfig> {
    let content = fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            DepwatchError::ConfigNotFound {
                path: path.to_path_buf(),
            }
        } else {
            DepwatchError::Io(e)
        }
    })?;

    parse_scenario(&content, path)
}

/// Parse YAML content into a scenario.
///
/// `source_path` is only used for error reporting.
pub fn parse_scenario(content: &str, source_path: &Path) -> Result<ScenarioConfig> {
    serde_yaml::from_str(content).map_err(|e| DepwatchError::ConfigParseError {
        path: source_path.to_path_buf(),
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StepAction;
    use tempfile::TempDir;

    const SCENARIO: &str = r#"
component:
  name: client
  instances: [impl]
  dependencies:
    api:
      required: true
      callbacks:
        added: bind
        removed: unbind
steps:
  - action: install
    provider: p1
  - action: uninstall
    provider: p1
"#;

    #[test]
    fn load_scenario_parses_valid_yaml() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("scenario.yml");
        fs::write(&path, SCENARIO).unwrap();

        let scenario = load_scenario(&path).unwrap();
        assert_eq!(scenario.component.name, "client");
        assert_eq!(scenario.component.instances, vec!["impl"]);
        assert!(scenario.component.dependencies["api"].required);
        assert_eq!(scenario.steps.len(), 2);
        assert_eq!(scenario.steps[1].action, StepAction::Uninstall);
    }

    #[test]
    fn load_scenario_returns_not_found_error() {
        let result = load_scenario(Path::new("/nonexistent/scenario.yml"));
        assert!(matches!(result, Err(DepwatchError::ConfigNotFound { .. })));
    }

    #[test]
    fn parse_scenario_returns_parse_error_for_invalid_yaml() {
        let result = parse_scenario("component: [", Path::new("test.yml"));
        assert!(matches!(result, Err(DepwatchError::ConfigParseError { .. })));
    }

    #[test]
    fn parse_scenario_rejects_unknown_step_action() {
        let yaml = "component: {name: c}\nsteps:\n  - action: explode\n    provider: p\n";
        let err = parse_scenario(yaml, Path::new("bad.yml")).unwrap_err();
        assert!(err.to_string().contains("bad.yml"));
    }

    #[test]
    fn steps_default_to_empty() {
        let scenario = parse_scenario("component: {name: c}", Path::new("s.yml")).unwrap();
        assert!(scenario.steps.is_empty());
        assert!(scenario.component.dependencies.is_empty());
    }
}
