//! Module dependencies and the consumer contract.
//!
//! A [`ModuleDependency`] watches a provider container, decides whether a
//! required capability is currently satisfied, and reports transitions to
//! the [`DependencyService`] that owns it.
//!
//! # Notification rules
//!
//! | Event                         | Consumer                  | User hook                    |
//! |-------------------------------|---------------------------|------------------------------|
//! | first match added             | `dependency_available`    | `added` unless required      |
//! | further match added           | `dependency_changed`      | `added`                      |
//! | match modified                | `dependency_changed`      | `changed` if registered      |
//! | match removed, others remain  | `dependency_changed`      | `removed`                    |
//! | last match removed            | `dependency_unavailable`  | `removed` unless required    |
//!
//! For required dependencies the consumer performs the initial injection
//! itself when it activates (see [`ModuleDependency::invoke_added`]) and the
//! final removal when it deactivates.
//!
//! # Modules
//!
//! - [`callbacks`] - Hook names and explicit callback target
//! - [`module`] - The dependency tracker

pub mod callbacks;
pub mod module;

pub use callbacks::Callbacks;
pub use module::ModuleDependency;

use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::warn;

use crate::callback::CallbackTarget;
use crate::error::CallbackError;

/// Owner of one or more dependencies.
pub trait DependencyService: Send + Sync {
    /// The dependency became available.
    fn dependency_available(&self, dependency: &ModuleDependency);

    /// The set of matching providers changed while the dependency stayed available.
    fn dependency_changed(&self, dependency: &ModuleDependency);

    /// The last matching provider went away.
    fn dependency_unavailable(&self, dependency: &ModuleDependency);

    /// Whether the consumer is currently active.
    fn is_registered(&self) -> bool;

    /// Objects onto which callbacks are dispatched, in order.
    fn composition_instances(&self) -> Vec<Arc<CallbackTarget>>;

    /// A user callback could not be dispatched. Never fatal.
    fn callback_failed(&self, dependency: &ModuleDependency, error: &CallbackError) {
        warn!(
            dependency = %dependency.name(),
            callback = error.method(),
            "Callback dispatch failed: {}",
            error
        );
    }
}

/// Management view of a dependency.
pub trait DependencyInfo {
    /// Human-readable name: the filter, the fixed provider, or "any module".
    fn name(&self) -> String;

    /// Kind of dependency.
    fn kind(&self) -> &'static str;

    /// Combined required/available state.
    fn state(&self) -> DependencyState;
}

/// Combined required/available state of a dependency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DependencyState {
    OptionalUnavailable,
    OptionalAvailable,
    RequiredUnavailable,
    RequiredAvailable,
}

impl DependencyState {
    /// Build from the two flags.
    pub fn from_flags(required: bool, available: bool) -> Self {
        match (required, available) {
            (false, false) => DependencyState::OptionalUnavailable,
            (false, true) => DependencyState::OptionalAvailable,
            (true, false) => DependencyState::RequiredUnavailable,
            (true, true) => DependencyState::RequiredAvailable,
        }
    }

    pub fn is_available(self) -> bool {
        matches!(
            self,
            DependencyState::OptionalAvailable | DependencyState::RequiredAvailable
        )
    }
}

impl fmt::Display for DependencyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DependencyState::OptionalUnavailable => "optional (unavailable)",
            DependencyState::OptionalAvailable => "optional (available)",
            DependencyState::RequiredUnavailable => "required (unavailable)",
            DependencyState::RequiredAvailable => "required (available)",
        };
        f.write_str(s)
    }
}
