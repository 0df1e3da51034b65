//! Callback bindings of a dependency.

use std::fmt;
use std::sync::Arc;

use crate::callback::CallbackTarget;

/// Names of the user hooks to call, and an optional explicit target.
///
/// Method names are looked up on the explicit target first, then on the
/// consumer's composition instances.
#[derive(Clone, Default)]
pub struct Callbacks {
    pub(crate) instance: Option<Arc<CallbackTarget>>,
    pub(crate) added: Option<String>,
    pub(crate) changed: Option<String>,
    pub(crate) removed: Option<String>,
}

impl Callbacks {
    /// No callbacks.
    pub fn new() -> Self {
        Self::default()
    }

    /// Added and removed hooks.
    pub fn of(added: Option<&str>, removed: Option<&str>) -> Self {
        Self::with_changed(added, None, removed)
    }

    /// Added, changed and removed hooks.
    pub fn with_changed(added: Option<&str>, changed: Option<&str>, removed: Option<&str>) -> Self {
        Self {
            instance: None,
            added: added.map(str::to_string),
            changed: changed.map(str::to_string),
            removed: removed.map(str::to_string),
        }
    }

    /// Set the added hook.
    pub fn added(mut self, method: impl Into<String>) -> Self {
        self.added = Some(method.into());
        self
    }

    /// Set the changed hook.
    pub fn changed(mut self, method: impl Into<String>) -> Self {
        self.changed = Some(method.into());
        self
    }

    /// Set the removed hook.
    pub fn removed(mut self, method: impl Into<String>) -> Self {
        self.removed = Some(method.into());
        self
    }

    /// Dispatch onto `instance` before the composition instances.
    pub fn on(mut self, instance: Arc<CallbackTarget>) -> Self {
        self.instance = Some(instance);
        self
    }

    /// Whether at least one hook name is set.
    pub fn any_named(&self) -> bool {
        self.added.is_some() || self.changed.is_some() || self.removed.is_some()
    }

    pub fn added_name(&self) -> Option<&str> {
        self.added.as_deref()
    }

    pub fn changed_name(&self) -> Option<&str> {
        self.changed.as_deref()
    }

    pub fn removed_name(&self) -> Option<&str> {
        self.removed.as_deref()
    }

    pub fn instance(&self) -> Option<&Arc<CallbackTarget>> {
        self.instance.as_ref()
    }
}

impl fmt::Debug for Callbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callbacks")
            .field("instance", &self.instance.as_ref().map(|i| i.name()))
            .field("added", &self.added)
            .field("changed", &self.changed)
            .field("removed", &self.removed)
            .finish()
    }
}
