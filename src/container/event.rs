//! Container events and listeners.

use serde::Serialize;
use std::fmt;

use super::Revision;
use crate::provider::Provider;

/// What happened to a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Installed,
    Resolved,
    Started,
    Stopped,
    Updated,
    Uninstalled,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EventKind::Installed => "installed",
            EventKind::Resolved => "resolved",
            EventKind::Started => "started",
            EventKind::Stopped => "stopped",
            EventKind::Updated => "updated",
            EventKind::Uninstalled => "uninstalled",
        };
        f.write_str(name)
    }
}

/// A provider change emitted by the container.
///
/// The provider snapshot reflects its state after the change.
#[derive(Debug, Clone)]
pub struct ContainerEvent {
    pub kind: EventKind,
    pub revision: Revision,
    pub provider: Provider,
}

/// Receives every container event on the thread that caused it.
pub trait ContainerListener: Send + Sync {
    fn provider_event(&self, event: &ContainerEvent);
}
