//! Reference consumer owning a set of dependencies.
//!
//! A [`Component`] becomes registered once every required dependency is
//! available and unregisters as soon as one of them goes away. On
//! registration it performs the initial injection that required
//! dependencies hold back, and on unregistration the matching removal.
//!
//! Every notification it receives is recorded as a [`ComponentEvent`] and
//! handed to an optional observer.

use serde::Serialize;
use std::sync::{Arc, Mutex, Weak};
use tracing::{debug, info, warn};

use crate::callback::CallbackTarget;
use crate::dependency::{DependencyInfo, DependencyService, ModuleDependency};
use crate::error::{CallbackError, DepwatchError, Result};
use crate::sync::lock;

/// Something a component observed.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ComponentEvent {
    Available { dependency: String },
    Changed { dependency: String },
    Unavailable { dependency: String },
    Registered,
    Unregistered,
    CallbackFailed { dependency: String, error: String },
}

/// Count of notifications per kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct NotificationCounts {
    pub available: usize,
    pub changed: usize,
    pub unavailable: usize,
    pub callback_failures: usize,
}

/// Receives each event as it is recorded.
pub type ComponentObserver = Arc<dyn Fn(&ComponentEvent) + Send + Sync>;

#[derive(Default)]
struct ComponentState {
    started: bool,
    registered: bool,
    dependencies: Vec<(String, Arc<ModuleDependency>)>,
    instances: Vec<Arc<CallbackTarget>>,
    events: Vec<ComponentEvent>,
    counts: NotificationCounts,
    observer: Option<ComponentObserver>,
}

/// A consumer that activates when its required dependencies are met.
pub struct Component {
    name: String,
    state: Mutex<ComponentState>,
    self_ref: Weak<Component>,
}

impl Component {
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Arc::new_cyclic(|self_ref| Self {
            name: name.into(),
            state: Mutex::new(ComponentState::default()),
            self_ref: self_ref.clone(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Add a dependency under `name`. Takes effect on the next start.
    pub fn add_dependency(&self, name: impl Into<String>, dependency: Arc<ModuleDependency>) {
        lock(&self.state).dependencies.push((name.into(), dependency));
    }

    /// Append a composition instance that receives dependency callbacks.
    pub fn add_instance(&self, instance: Arc<CallbackTarget>) {
        lock(&self.state).instances.push(instance);
    }

    /// Install a callback run for every recorded event, outside any lock.
    pub fn set_observer(&self, observer: ComponentObserver) {
        lock(&self.state).observer = Some(observer);
    }

    pub fn dependency(&self, name: &str) -> Option<Arc<ModuleDependency>> {
        lock(&self.state)
            .dependencies
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, d)| Arc::clone(d))
    }

    pub fn dependencies(&self) -> Vec<(String, Arc<ModuleDependency>)> {
        lock(&self.state).dependencies.clone()
    }

    pub fn is_started(&self) -> bool {
        lock(&self.state).started
    }

    pub fn counts(&self) -> NotificationCounts {
        lock(&self.state).counts
    }

    /// Recorded events since the last call.
    pub fn take_events(&self) -> Vec<ComponentEvent> {
        std::mem::take(&mut lock(&self.state).events)
    }

    /// Start every dependency, then register if nothing required is missing.
    pub fn start(&self) -> Result<()> {
        let me: Arc<dyn DependencyService> = self.self_ref.upgrade().ok_or_else(|| {
            DepwatchError::Other(anyhow::anyhow!("component '{}' is being dropped", self.name))
        })?;
        let dependencies = {
            let mut state = lock(&self.state);
            if state.started {
                return Err(DepwatchError::AlreadyStarted {
                    name: self.name.clone(),
                });
            }
            state.started = true;
            state.dependencies.clone()
        };
        info!(component = %self.name, dependencies = dependencies.len(), "Starting component");

        for (index, (name, dependency)) in dependencies.iter().enumerate() {
            if let Err(e) = dependency.start(Arc::clone(&me)) {
                warn!(component = %self.name, dependency = %name, "Failed to start dependency: {}", e);
                for (started_name, started) in &dependencies[..index] {
                    if let Err(e) = started.stop() {
                        warn!(component = %self.name, dependency = %started_name, "Rollback stop failed: {}", e);
                    }
                }
                lock(&self.state).started = false;
                return Err(e);
            }
        }

        self.try_register();
        Ok(())
    }

    /// Unregister if needed and stop every dependency.
    pub fn stop(&self) -> Result<()> {
        let (dependencies, was_registered) = {
            let mut state = lock(&self.state);
            if !state.started {
                return Err(DepwatchError::NotStarted {
                    name: self.name.clone(),
                });
            }
            state.started = false;
            let was_registered = std::mem::replace(&mut state.registered, false);
            (state.dependencies.clone(), was_registered)
        };

        if was_registered {
            self.record(ComponentEvent::Unregistered);
            info!(component = %self.name, "Component unregistered");
            for (_, dependency) in dependencies.iter().filter(|(_, d)| d.is_required()) {
                dependency.invoke_removed();
            }
        }
        for (_, dependency) in &dependencies {
            if dependency.is_started() {
                dependency.stop()?;
            }
        }
        info!(component = %self.name, "Component stopped");
        Ok(())
    }

    fn dependency_name(&self, dependency: &ModuleDependency) -> String {
        lock(&self.state)
            .dependencies
            .iter()
            .find(|(_, d)| std::ptr::eq(Arc::as_ptr(d), dependency))
            .map(|(n, _)| n.clone())
            .unwrap_or_else(|| dependency.name())
    }

    fn record(&self, event: ComponentEvent) {
        let observer = {
            let mut state = lock(&self.state);
            match &event {
                ComponentEvent::Available { .. } => state.counts.available += 1,
                ComponentEvent::Changed { .. } => state.counts.changed += 1,
                ComponentEvent::Unavailable { .. } => state.counts.unavailable += 1,
                ComponentEvent::CallbackFailed { .. } => state.counts.callback_failures += 1,
                ComponentEvent::Registered | ComponentEvent::Unregistered => {}
            }
            state.events.push(event.clone());
            state.observer.clone()
        };
        if let Some(observer) = observer {
            observer(&event);
        }
    }

    fn try_register(&self) {
        let required = {
            let mut state = lock(&self.state);
            if !state.started || state.registered {
                return;
            }
            let required: Vec<_> = state
                .dependencies
                .iter()
                .filter(|(_, d)| d.is_required())
                .map(|(_, d)| Arc::clone(d))
                .collect();
            if !required.iter().all(|d| d.is_available()) {
                debug!(component = %self.name, "Required dependencies missing, not registering");
                return;
            }
            state.registered = true;
            required
        };

        self.record(ComponentEvent::Registered);
        info!(component = %self.name, "Component registered");
        for dependency in required {
            dependency.invoke_added();
        }
    }

    fn unregister_for(&self, dependency: &ModuleDependency) {
        {
            let mut state = lock(&self.state);
            if !state.registered {
                return;
            }
            state.registered = false;
        }
        self.record(ComponentEvent::Unregistered);
        info!(component = %self.name, dependency = %dependency.name(), "Component unregistered");
        dependency.invoke_removed();
    }
}

impl DependencyService for Component {
    fn dependency_available(&self, dependency: &ModuleDependency) {
        self.record(ComponentEvent::Available {
            dependency: self.dependency_name(dependency),
        });
        if dependency.is_required() {
            self.try_register();
        }
    }

    fn dependency_changed(&self, dependency: &ModuleDependency) {
        self.record(ComponentEvent::Changed {
            dependency: self.dependency_name(dependency),
        });
    }

    fn dependency_unavailable(&self, dependency: &ModuleDependency) {
        self.record(ComponentEvent::Unavailable {
            dependency: self.dependency_name(dependency),
        });
        if dependency.is_required() {
            self.unregister_for(dependency);
        }
    }

    fn is_registered(&self) -> bool {
        lock(&self.state).registered
    }

    fn composition_instances(&self) -> Vec<Arc<CallbackTarget>> {
        lock(&self.state).instances.clone()
    }

    fn callback_failed(&self, dependency: &ModuleDependency, error: &CallbackError) {
        let name = self.dependency_name(dependency);
        warn!(
            component = %self.name,
            dependency = %name,
            callback = error.method(),
            "Callback dispatch failed: {}",
            error
        );
        self.record(ComponentEvent::CallbackFailed {
            dependency: name,
            error: error.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::Container;
    use crate::provider::{Attributes, ProviderId};

    fn recording_target(log: Arc<Mutex<Vec<String>>>) -> Arc<CallbackTarget> {
        let (a, r) = (log.clone(), log);
        Arc::new(
            CallbackTarget::new("impl")
                .on_provider("bind", move |p| {
                    a.lock().unwrap().push(format!("bind {}", p.id()));
                    Ok(())
                })
                .on_provider("unbind", move |p| {
                    r.lock().unwrap().push(format!("unbind {}", p.id()));
                    Ok(())
                }),
        )
    }

    fn required(container: &Container) -> Arc<ModuleDependency> {
        let dep = ModuleDependency::new(container.clone());
        dep.set_required(true)
            .unwrap()
            .set_callback_names(Some("bind"), None, Some("unbind"))
            .unwrap();
        dep
    }

    #[test]
    fn registers_without_required_dependencies() {
        let component = Component::new("empty");
        component.start().unwrap();
        assert!(component.is_registered());
        assert_eq!(component.take_events(), vec![ComponentEvent::Registered]);
        component.stop().unwrap();
        assert!(!component.is_registered());
    }

    #[test]
    fn injects_on_activation_and_removes_on_deactivation() {
        let container = Container::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let component = Component::new("client");
        component.add_instance(recording_target(log.clone()));
        component.add_dependency("api", required(&container));
        component.start().unwrap();
        assert!(!component.is_registered());

        let id = container.install(Attributes::new());
        assert!(component.is_registered());
        assert_eq!(*log.lock().unwrap(), vec![format!("bind {}", id)]);

        container.uninstall(id).unwrap();
        assert!(!component.is_registered());
        assert_eq!(
            *log.lock().unwrap(),
            vec![format!("bind {}", id), format!("unbind {}", id)]
        );
        assert_eq!(
            component.take_events(),
            vec![
                ComponentEvent::Available {
                    dependency: "api".into()
                },
                ComponentEvent::Registered,
                ComponentEvent::Unavailable {
                    dependency: "api".into()
                },
                ComponentEvent::Unregistered,
            ]
        );
    }

    #[test]
    fn waits_for_every_required_dependency() {
        let container = Container::new();
        let component = Component::new("client");
        let first = required(&container);
        first
            .set_fixed_provider(ProviderId(1))
            .unwrap();
        let second = required(&container);
        second
            .set_fixed_provider(ProviderId(2))
            .unwrap();
        component.add_dependency("first", first);
        component.add_dependency("second", second);
        component.start().unwrap();

        container.install(Attributes::new());
        assert!(!component.is_registered());
        container.install(Attributes::new());
        assert!(component.is_registered());
    }

    #[test]
    fn stop_releases_dependencies() {
        let container = Container::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let component = Component::new("client");
        component.add_instance(recording_target(log.clone()));
        let dep = required(&container);
        component.add_dependency("api", dep.clone());
        let id = container.install(Attributes::new());
        component.start().unwrap();

        component.stop().unwrap();
        assert!(!dep.is_started());
        assert_eq!(
            *log.lock().unwrap(),
            vec![format!("bind {}", id), format!("unbind {}", id)]
        );
        assert!(component.stop().unwrap_err().is_lifecycle());
    }

    #[test]
    fn failed_callbacks_are_counted() {
        let container = Container::new();
        let component = Component::new("client");
        let dep = ModuleDependency::new(container.clone());
        dep.set_callback_names(Some("missing"), None, None).unwrap();
        component.add_dependency("opt", dep);
        component.start().unwrap();

        container.install(Attributes::new());
        let counts = component.counts();
        assert_eq!(counts.available, 1);
        assert_eq!(counts.callback_failures, 1);
    }

    #[test]
    fn observer_sees_events_in_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let component = Component::new("observed");
        component.set_observer(Arc::new(move |e: &ComponentEvent| {
            sink.lock().unwrap().push(e.clone());
        }));
        component.start().unwrap();
        component.stop().unwrap();
        assert_eq!(
            *seen.lock().unwrap(),
            vec![ComponentEvent::Registered, ComponentEvent::Unregistered]
        );
    }

    #[test]
    fn dependency_lookup_by_name() {
        let component = Component::new("client");
        let dep = ModuleDependency::new(Container::new());
        component.add_dependency("api", dep.clone());
        assert!(component.dependency("api").is_some());
        assert!(component.dependency("other").is_none());
        assert_eq!(component.dependencies().len(), 1);
        assert_eq!(component.name(), "client");
    }

    #[test]
    fn failed_start_rolls_back_started_dependencies() {
        let container = Container::new();
        container.install(Attributes::new());
        let shared = ModuleDependency::new(container.clone());
        let component = Component::new("client");
        component.add_dependency("first", shared.clone());
        component.add_dependency("again", shared.clone());

        let err = component.start().unwrap_err();
        assert!(err.is_lifecycle());
        assert!(!component.is_started());
        assert!(!shared.is_started());
    }

    #[test]
    fn rollback_tolerates_dependencies_that_already_stopped() {
        let container = Container::new();
        container.install(Attributes::new());

        let quitter = ModuleDependency::new(container.clone());
        let weak = Arc::downgrade(&quitter);
        let stopper = Arc::new(CallbackTarget::new("stopper").on_call("quit", move || {
            if let Some(dep) = weak.upgrade() {
                dep.stop()?;
            }
            Ok(())
        }));
        quitter
            .set_instance_callbacks(stopper, Some("quit"), None, None)
            .unwrap();

        let busy = ModuleDependency::new(container.clone());
        busy.start(Component::new("other")).unwrap();

        let component = Component::new("client");
        component.add_dependency("quitter", quitter.clone());
        component.add_dependency("busy", busy.clone());

        let err = component.start().unwrap_err();
        assert!(err.is_lifecycle());
        assert!(!component.is_started());
        assert!(!quitter.is_started());
        assert!(busy.is_started());
    }
}
