//! Provider lifecycle states and masks.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::BitOr;

/// Lifecycle state of a provider.
///
/// Each state owns one bit so states can be combined into a [`StateMask`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderState {
    Uninstalled,
    Installed,
    Resolved,
    Starting,
    Stopping,
    Active,
}

impl ProviderState {
    /// All states in bit order.
    pub const ALL: [ProviderState; 6] = [
        ProviderState::Uninstalled,
        ProviderState::Installed,
        ProviderState::Resolved,
        ProviderState::Starting,
        ProviderState::Stopping,
        ProviderState::Active,
    ];

    /// Bit value of this state.
    pub fn bit(self) -> u32 {
        match self {
            ProviderState::Uninstalled => 0x01,
            ProviderState::Installed => 0x02,
            ProviderState::Resolved => 0x04,
            ProviderState::Starting => 0x08,
            ProviderState::Stopping => 0x10,
            ProviderState::Active => 0x20,
        }
    }

    /// Lowercase name as used in configuration files.
    pub fn as_str(self) -> &'static str {
        match self {
            ProviderState::Uninstalled => "uninstalled",
            ProviderState::Installed => "installed",
            ProviderState::Resolved => "resolved",
            ProviderState::Starting => "starting",
            ProviderState::Stopping => "stopping",
            ProviderState::Active => "active",
        }
    }
}

impl fmt::Display for ProviderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Set of lifecycle states considered "present" by a tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StateMask(u32);

impl StateMask {
    /// Mask matching no state.
    pub const NONE: StateMask = StateMask(0);

    /// Create a mask from raw bits. Unknown bits are dropped.
    pub fn from_bits(bits: u32) -> Self {
        let known = ProviderState::ALL.iter().fold(0, |acc, s| acc | s.bit());
        Self(bits & known)
    }

    /// Raw bit value.
    pub fn bits(self) -> u32 {
        self.0
    }

    /// Whether `state` is part of this mask.
    pub fn contains(self, state: ProviderState) -> bool {
        self.0 & state.bit() != 0
    }

    /// Whether the mask is empty.
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// States contained in this mask, in bit order.
    pub fn states(self) -> Vec<ProviderState> {
        ProviderState::ALL
            .iter()
            .copied()
            .filter(|s| self.contains(*s))
            .collect()
    }
}

impl Default for StateMask {
    /// Installed, resolved or active: the module exists in the container.
    fn default() -> Self {
        ProviderState::Installed | ProviderState::Resolved | ProviderState::Active
    }
}

impl From<ProviderState> for StateMask {
    fn from(state: ProviderState) -> Self {
        StateMask(state.bit())
    }
}

impl FromIterator<ProviderState> for StateMask {
    fn from_iter<I: IntoIterator<Item = ProviderState>>(iter: I) -> Self {
        iter.into_iter()
            .fold(StateMask::NONE, |mask, state| mask | state)
    }
}

impl BitOr for ProviderState {
    type Output = StateMask;

    fn bitor(self, rhs: ProviderState) -> StateMask {
        StateMask(self.bit() | rhs.bit())
    }
}

impl BitOr<ProviderState> for StateMask {
    type Output = StateMask;

    fn bitor(self, rhs: ProviderState) -> StateMask {
        StateMask(self.0 | rhs.bit())
    }
}

impl BitOr for StateMask {
    type Output = StateMask;

    fn bitor(self, rhs: StateMask) -> StateMask {
        StateMask(self.0 | rhs.0)
    }
}

impl fmt::Display for StateMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<_> = self.states().iter().map(|s| s.as_str()).collect();
        write!(f, "{}", names.join("|"))
    }
}
