//! Configuration schema definitions.
//!
//! These structs map to the YAML scenario file format.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::callback::CallbackTarget;
use crate::dependency::{Callbacks, ModuleDependency};
use crate::error::{DepwatchError, Result};
use crate::provider::{Attributes, ProviderId, ProviderState, StateMask};

/// Root of a scenario file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScenarioConfig {
    /// The consumer under test
    pub component: ComponentConfig,

    /// Container operations, in order
    #[serde(default)]
    pub steps: Vec<StepConfig>,
}

/// The consumer and the dependencies it owns.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ComponentConfig {
    pub name: String,

    /// Composition instance names, in dispatch order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub instances: Vec<String>,

    /// Dependencies keyed by name
    #[serde(default)]
    pub dependencies: BTreeMap<String, DependencyConfig>,
}

/// Settings of one dependency.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DependencyConfig {
    /// Whether the component needs this dependency to be registered
    pub required: bool,

    /// Overrides the auto configuration flag after callbacks are applied
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_config: Option<bool>,

    /// Filter expression over module headers
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,

    /// Lifecycle states a module must be in to be tracked
    #[serde(skip_serializing_if = "Option::is_none")]
    pub states: Option<Vec<ProviderState>>,

    /// Only track this provider identity
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<ProviderId>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub callbacks: Option<CallbacksConfig>,
}

/// Hook names, optionally dispatched onto a named instance first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CallbacksConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub added: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub changed: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub removed: Option<String>,
}

impl CallbacksConfig {
    /// Hook names that are set.
    pub fn method_names(&self) -> impl Iterator<Item = &str> {
        [&self.added, &self.changed, &self.removed]
            .into_iter()
            .filter_map(|m| m.as_deref())
    }
}

/// Container operation performed by a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepAction {
    Install,
    Resolve,
    Start,
    Stop,
    Update,
    Uninstall,
}

impl StepAction {
    pub fn as_str(self) -> &'static str {
        match self {
            StepAction::Install => "install",
            StepAction::Resolve => "resolve",
            StepAction::Start => "start",
            StepAction::Stop => "stop",
            StepAction::Update => "update",
            StepAction::Uninstall => "uninstall",
        }
    }
}

/// One container operation on a provider referred to by alias.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StepConfig {
    pub action: StepAction,

    /// Alias of the provider; `install` introduces it
    pub provider: String,

    /// Headers for `install` and `update`
    #[serde(default, skip_serializing_if = "Attributes::is_empty")]
    pub attributes: Attributes,
}

impl DependencyConfig {
    /// Configure an idle dependency through its guarded setters.
    ///
    /// `instances` resolves `callbacks.instance` by name.
    pub fn apply(
        &self,
        dependency: &ModuleDependency,
        instances: &HashMap<String, Arc<CallbackTarget>>,
    ) -> Result<()> {
        dependency.set_required(self.required)?;
        if self.filter.is_some() {
            dependency.set_filter(self.filter.as_deref())?;
        }
        if let Some(states) = &self.states {
            dependency.set_state_mask(states.iter().copied().collect::<StateMask>())?;
        }
        if let Some(id) = self.provider {
            dependency.set_fixed_provider(id)?;
        }
        if let Some(callbacks) = &self.callbacks {
            let mut bindings = Callbacks::with_changed(
                callbacks.added.as_deref(),
                callbacks.changed.as_deref(),
                callbacks.removed.as_deref(),
            );
            if let Some(name) = &callbacks.instance {
                let instance = instances
                    .get(name)
                    .ok_or_else(|| DepwatchError::UnknownCallbackInstance { name: name.clone() })?;
                bindings = bindings.on(Arc::clone(instance));
            }
            dependency.set_callbacks(bindings)?;
        }
        if let Some(auto_config) = self.auto_config {
            dependency.set_auto_config(auto_config)?;
        }
        Ok(())
    }
}
