//! Provider model.
//!
//! Providers are modules installed in a container. The tracker never owns
//! them; it only sees [`Provider`] snapshots carried by container events.
//!
//! # Modules
//!
//! - [`attributes`] - Declared module headers with case-insensitive keys
//! - [`state`] - Lifecycle states and state masks

pub mod attributes;
pub mod state;

pub use attributes::{Attributes, SYMBOLIC_NAME, VERSION};
pub use state::{ProviderState, StateMask};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of a provider within its container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProviderId(pub u64);

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Snapshot of a provider as seen at the moment an event was emitted.
#[derive(Debug, Clone, PartialEq)]
pub struct Provider {
    id: ProviderId,
    state: ProviderState,
    attributes: Attributes,
}

impl Provider {
    /// Create a provider snapshot.
    pub fn new(id: ProviderId, state: ProviderState, attributes: Attributes) -> Self {
        Self {
            id,
            state,
            attributes,
        }
    }

    /// Provider identity.
    pub fn id(&self) -> ProviderId {
        self.id
    }

    /// Lifecycle state at snapshot time.
    pub fn state(&self) -> ProviderState {
        self.state
    }

    /// Declared headers.
    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    /// Symbolic name header, if declared.
    pub fn symbolic_name(&self) -> Option<&str> {
        self.attributes.get(SYMBOLIC_NAME)
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.symbolic_name() {
            Some(name) => write!(f, "{} [{}]", name, self.id),
            None => write!(f, "module [{}]", self.id),
        }
    }
}
