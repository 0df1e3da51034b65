//! Error types for depwatch operations.
//!
//! This module defines [`DepwatchError`], the error type surfaced to callers,
//! and a [`Result`] type alias for convenience.
//!
//! # Error Handling Strategy
//!
//! - Configuration and lifecycle mistakes fail synchronously with a
//!   `DepwatchError` and leave the tracker untouched
//! - Callback failures are described by [`CallbackError`] and are never
//!   returned from event handling; they are reported to the owning consumer
//! - Use `anyhow::Error` (via `DepwatchError::Other`) for unexpected errors

use std::path::PathBuf;
use thiserror::Error;

use crate::provider::ProviderId;

/// Core error type for depwatch operations.
#[derive(Debug, Error)]
pub enum DepwatchError {
    /// `start` was called on a dependency that is already started.
    #[error("Dependency '{name}' was already started")]
    AlreadyStarted { name: String },

    /// `stop` was called on a dependency that is not started.
    #[error("Dependency '{name}' was not started")]
    NotStarted { name: String },

    /// A configuration setter was called while the dependency is started.
    #[error("Cannot modify {setting} while the dependency is active")]
    ModifiedWhileActive { setting: &'static str },

    /// A filter expression could not be parsed.
    #[error("Invalid filter '{expression}': {message}")]
    InvalidFilter { expression: String, message: String },

    /// A different provider identity is already fixed on this dependency.
    #[error("Dependency is already bound to provider {current}, cannot bind to {requested}")]
    FixedProviderConflict {
        current: ProviderId,
        requested: ProviderId,
    },

    /// Callbacks name an instance that was never declared.
    #[error("Unknown callback instance '{name}'")]
    UnknownCallbackInstance { name: String },

    /// A container operation referenced a provider that does not exist.
    #[error("Unknown provider: {id}")]
    UnknownProvider { id: ProviderId },

    /// Configuration or scenario file not found.
    #[error("Configuration not found: {path}")]
    ConfigNotFound { path: PathBuf },

    /// Failed to parse a configuration or scenario file.
    #[error("Failed to parse config at {path}: {message}")]
    ConfigParseError { path: PathBuf, message: String },

    /// IO error wrapper.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic wrapped error for anyhow interop.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl DepwatchError {
    /// Whether this error stems from misconfiguration rather than lifecycle misuse.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            DepwatchError::ModifiedWhileActive { .. }
                | DepwatchError::InvalidFilter { .. }
                | DepwatchError::FixedProviderConflict { .. }
                | DepwatchError::UnknownCallbackInstance { .. }
        )
    }

    /// Whether this error stems from calling `start`/`stop` out of order.
    pub fn is_lifecycle(&self) -> bool {
        matches!(
            self,
            DepwatchError::AlreadyStarted { .. } | DepwatchError::NotStarted { .. }
        )
    }
}

/// Failure while dispatching a user callback.
///
/// These are absorbed at the dispatch boundary and handed to the consumer as
/// diagnostics. They never change tracker state.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CallbackError {
    /// No target in the dispatch list declares the callback.
    #[error("No callback target declares '{method}'")]
    NotFound { method: String },

    /// The callback returned an error.
    #[error("Callback '{method}' on '{target}' failed: {message}")]
    Failed {
        method: String,
        target: String,
        message: String,
    },

    /// The callback panicked.
    #[error("Callback '{method}' on '{target}' panicked: {message}")]
    Panicked {
        method: String,
        target: String,
        message: String,
    },
}

impl CallbackError {
    /// Name of the callback that failed.
    pub fn method(&self) -> &str {
        match self {
            CallbackError::NotFound { method }
            | CallbackError::Failed { method, .. }
            | CallbackError::Panicked { method, .. } => method,
        }
    }
}

/// Result type alias for depwatch operations.
pub type Result<T> = std::result::Result<T, DepwatchError>;
