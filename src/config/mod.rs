//! Scenario and dependency configuration.
//!
//! - Schema definitions in [`schema`]
//! - File loading in [`loader`]
//!
//! # Example
//!
//! ```
//! use depwatch::config::load_scenario;
//! use tempfile::TempDir;
//! use std::fs;
//!
//! let temp = TempDir::new().unwrap();
//! let path = temp.path().join("scenario.yml");
//! fs::write(&path, "component:\n  name: client\n").unwrap();
//!
//! let scenario = load_scenario(&path).unwrap();
//! assert_eq!(scenario.component.name, "client");
//! ```

pub mod loader;
pub mod schema;

pub use loader::{load_scenario, parse_scenario};
pub use schema::{
    CallbacksConfig, ComponentConfig, DependencyConfig, ScenarioConfig, StepAction, StepConfig,
};
