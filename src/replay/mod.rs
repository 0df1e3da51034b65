//! Scenario replay.
//!
//! Builds a [`Container`] and a [`Component`] from a [`ScenarioConfig`],
//! performs each step against the container and records everything the
//! component and its callbacks observed, in order.
//!
//! # Example
//!
//! ```
//! use std::path::Path;
//! use depwatch::config::parse_scenario;
//! use depwatch::replay::replay;
//!
//! let yaml = r#"
//! component:
//!   name: client
//!   dependencies:
//!     api:
//!       required: true
//! steps:
//!   - action: install
//!     provider: p1
//! "#;
//! let scenario = parse_scenario(yaml, Path::new("inline.yml")).unwrap();
//! let report = replay(&scenario).unwrap();
//! assert!(report.registered);
//! ```

use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

use crate::callback::CallbackTarget;
use crate::component::{Component, ComponentEvent, NotificationCounts};
use crate::config::{ScenarioConfig, StepAction, StepConfig};
use crate::container::Container;
use crate::dependency::{DependencyInfo, DependencyService, DependencyState, ModuleDependency};
use crate::error::{DepwatchError, Result};
use crate::provider::ProviderId;
use crate::sync::lock;

/// One line of the replay trace.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TraceEntry {
    /// A container operation about to take effect.
    Step {
        index: usize,
        action: StepAction,
        provider: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<ProviderId>,
    },
    /// A notification seen by the component.
    Component(ComponentEvent),
    /// A user callback invoked on a composition instance.
    Callback {
        instance: String,
        method: String,
        provider: ProviderId,
    },
}

impl fmt::Display for TraceEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TraceEntry::Step {
                index,
                action,
                provider,
                id,
            } => {
                write!(f, "step {}: {} {}", index, action.as_str(), provider)?;
                if let Some(id) = id {
                    write!(f, " (#{})", id)?;
                }
                Ok(())
            }
            TraceEntry::Component(event) => match event {
                ComponentEvent::Available { dependency } => {
                    write!(f, "  available {}", dependency)
                }
                ComponentEvent::Changed { dependency } => write!(f, "  changed {}", dependency),
                ComponentEvent::Unavailable { dependency } => {
                    write!(f, "  unavailable {}", dependency)
                }
                ComponentEvent::Registered => f.write_str("  component registered"),
                ComponentEvent::Unregistered => f.write_str("  component unregistered"),
                ComponentEvent::CallbackFailed { dependency, error } => {
                    write!(f, "  callback failed on {}: {}", dependency, error)
                }
            },
            TraceEntry::Callback {
                instance,
                method,
                provider,
            } => write!(f, "  {}.{}(#{})", instance, method, provider),
        }
    }
}

/// Final state of one dependency.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DependencyReport {
    pub name: String,
    pub description: String,
    pub state: DependencyState,
    pub matches: usize,
}

/// Outcome of a replay.
#[derive(Debug, Clone, Serialize)]
pub struct ReplayReport {
    pub component: String,
    pub registered: bool,
    pub counts: NotificationCounts,
    pub dependencies: Vec<DependencyReport>,
    pub trace: Vec<TraceEntry>,
}

type Trace = Arc<Mutex<Vec<TraceEntry>>>;

/// Run a scenario to completion and report what happened.
///
/// The component is stopped afterwards; its shutdown is not part of the trace.
pub fn replay(scenario: &ScenarioConfig) -> Result<ReplayReport> {
    let trace: Trace = Arc::new(Mutex::new(Vec::new()));
    let container = Container::new();
    let component = build_component(scenario, &container, &trace)?;

    component.start()?;
    info!(component = %component.name(), steps = scenario.steps.len(), "Replaying scenario");

    let mut aliases: HashMap<String, ProviderId> = HashMap::new();
    for (index, step) in scenario.steps.iter().enumerate() {
        run_step(&container, &trace, &mut aliases, index + 1, step)?;
    }

    let report = ReplayReport {
        component: component.name().to_string(),
        registered: component.is_registered(),
        counts: component.counts(),
        dependencies: component
            .dependencies()
            .into_iter()
            .map(|(name, dep)| DependencyReport {
                description: dep.name(),
                state: dep.state(),
                matches: dep.providers().len(),
                name,
            })
            .collect(),
        trace: lock(&trace).clone(),
    };

    component.stop()?;
    Ok(report)
}

fn build_component(
    scenario: &ScenarioConfig,
    container: &Container,
    trace: &Trace,
) -> Result<Arc<Component>> {
    let config = &scenario.component;
    let component = Component::new(config.name.clone());

    let methods: BTreeSet<&str> = config
        .dependencies
        .values()
        .filter_map(|d| d.callbacks.as_ref())
        .flat_map(|c| c.method_names())
        .collect();

    let mut instances = HashMap::new();
    for name in &config.instances {
        let target = Arc::new(recording_target(name, &methods, trace));
        component.add_instance(Arc::clone(&target));
        instances.insert(name.clone(), target);
    }

    for (name, dep_config) in &config.dependencies {
        let dependency = ModuleDependency::new(container.clone());
        dep_config.apply(&dependency, &instances)?;
        debug!(dependency = %name, filter = ?dependency.filter(), "Dependency configured");
        component.add_dependency(name.clone(), dependency);
    }

    let sink = Arc::clone(trace);
    component.set_observer(Arc::new(move |event: &ComponentEvent| {
        lock(&sink).push(TraceEntry::Component(event.clone()));
    }));
    Ok(component)
}

/// A composition instance declaring every hook name and recording each call.
fn recording_target(name: &str, methods: &BTreeSet<&str>, trace: &Trace) -> CallbackTarget {
    methods
        .iter()
        .fold(CallbackTarget::new(name), |target, method| {
            let sink = Arc::clone(trace);
            let instance = name.to_string();
            let method_name = method.to_string();
            target.on_provider(*method, move |provider| {
                lock(&sink).push(TraceEntry::Callback {
                    instance: instance.clone(),
                    method: method_name.clone(),
                    provider: provider.id(),
                });
                Ok(())
            })
        })
}

fn run_step(
    container: &Container,
    trace: &Trace,
    aliases: &mut HashMap<String, ProviderId>,
    index: usize,
    step: &StepConfig,
) -> Result<()> {
    if step.action == StepAction::Install {
        if aliases.contains_key(&step.provider) {
            return Err(step_error(
                index,
                format!("provider '{}' is already installed", step.provider),
            ));
        }
        let slot = {
            let mut entries = lock(trace);
            entries.push(TraceEntry::Step {
                index,
                action: step.action,
                provider: step.provider.clone(),
                id: None,
            });
            entries.len() - 1
        };
        let id = container.install(step.attributes.clone());
        if let Some(TraceEntry::Step { id: slot_id, .. }) = lock(trace).get_mut(slot) {
            *slot_id = Some(id);
        }
        aliases.insert(step.provider.clone(), id);
        return Ok(());
    }

    let id = *aliases
        .get(&step.provider)
        .ok_or_else(|| step_error(index, format!("unknown provider '{}'", step.provider)))?;
    lock(trace).push(TraceEntry::Step {
        index,
        action: step.action,
        provider: step.provider.clone(),
        id: Some(id),
    });

    match step.action {
        StepAction::Install => Ok(()),
        StepAction::Resolve => container.resolve(id),
        StepAction::Start => container.start(id),
        StepAction::Stop => container.stop(id),
        StepAction::Update => container.update(id, step.attributes.clone()),
        StepAction::Uninstall => {
            container.uninstall(id)?;
            aliases.remove(&step.provider);
            Ok(())
        }
    }
}

fn step_error(index: usize, message: String) -> DepwatchError {
    DepwatchError::Other(anyhow::anyhow!("step {}: {}", index, message))
}
