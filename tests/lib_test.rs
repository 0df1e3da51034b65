//! Integration tests for the public library API.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use depwatch::callback::CallbackTarget;
use depwatch::container::Container;
use depwatch::dependency::{DependencyInfo, DependencyState};
use depwatch::provider::{Attributes, SYMBOLIC_NAME};
use depwatch::{
    CallbackError, Component, DependencyService, DepwatchError, ModuleDependency, ProviderId,
    ProviderState,
};

#[derive(Debug, Clone, PartialEq)]
enum Seen {
    Available,
    Changed,
    Unavailable,
    Added(ProviderId),
    Removed(ProviderId),
    Failed(String),
}

/// Consumer recording notifications and hook calls in one ordered log.
struct Recorder {
    log: Arc<Mutex<Vec<Seen>>>,
    target: Arc<CallbackTarget>,
}

impl Recorder {
    fn new() -> Arc<Self> {
        let log = Arc::new(Mutex::new(Vec::new()));
        let (a, r) = (log.clone(), log.clone());
        let target = Arc::new(
            CallbackTarget::new("recorder")
                .on_provider("onAdded", move |p| {
                    a.lock().unwrap().push(Seen::Added(p.id()));
                    Ok(())
                })
                .on_provider("onRemoved", move |p| {
                    r.lock().unwrap().push(Seen::Removed(p.id()));
                    Ok(())
                }),
        );
        Arc::new(Self { log, target })
    }

    fn take(&self) -> Vec<Seen> {
        std::mem::take(&mut *self.log.lock().unwrap())
    }

    fn count(&self, wanted: &Seen) -> usize {
        self.log.lock().unwrap().iter().filter(|s| *s == wanted).count()
    }
}

impl DependencyService for Recorder {
    fn dependency_available(&self, _: &ModuleDependency) {
        self.log.lock().unwrap().push(Seen::Available);
    }

    fn dependency_changed(&self, _: &ModuleDependency) {
        self.log.lock().unwrap().push(Seen::Changed);
    }

    fn dependency_unavailable(&self, _: &ModuleDependency) {
        self.log.lock().unwrap().push(Seen::Unavailable);
    }

    fn is_registered(&self) -> bool {
        true
    }

    fn composition_instances(&self) -> Vec<Arc<CallbackTarget>> {
        vec![self.target.clone()]
    }

    fn callback_failed(&self, _: &ModuleDependency, error: &CallbackError) {
        self.log
            .lock()
            .unwrap()
            .push(Seen::Failed(error.method().to_string()));
    }
}

fn tracker(container: &Container, required: bool) -> Arc<ModuleDependency> {
    let dependency = ModuleDependency::new(container.clone());
    dependency
        .set_required(required)
        .unwrap()
        .set_callback_names(Some("onAdded"), None, Some("onRemoved"))
        .unwrap();
    dependency
}

fn named(name: &str) -> Attributes {
    [(SYMBOLIC_NAME, name)].into_iter().collect()
}

/// `available` agrees with the tracked match count.
fn assert_consistent(dependency: &ModuleDependency) {
    assert_eq!(dependency.is_available(), !dependency.providers().is_empty());
}

#[test]
fn error_types_are_public() {
    let err = DepwatchError::NotStarted {
        name: "any module".into(),
    };
    assert_eq!(err.to_string(), "Dependency 'any module' was not started");
    assert!(err.is_lifecycle());
}

#[test]
fn result_type_alias_is_public() {
    fn test_fn() -> depwatch::Result<()> {
        Ok(())
    }
    assert!(test_fn().is_ok());
}

#[test]
fn cli_types_are_public() {
    use clap::Parser;
    use depwatch::cli::{Cli, Commands};

    let cli = Cli::parse_from(["depwatch", "filter", "(a=1)"]);
    assert!(matches!(cli.command, Commands::Filter(_)));
}

#[test]
fn scenario_a_required_tracker() {
    let container = Container::new();
    let dependency = tracker(&container, true);
    let consumer = Recorder::new();
    dependency.start(consumer.clone()).unwrap();

    let p1 = container.install(named("p1"));
    assert_eq!(consumer.take(), vec![Seen::Available]);

    let p2 = container.install(named("p2"));
    assert_eq!(consumer.take(), vec![Seen::Changed, Seen::Added(p2)]);

    container.uninstall(p1).unwrap();
    assert_eq!(consumer.take(), vec![Seen::Changed, Seen::Removed(p1)]);
    assert!(dependency.is_available());

    container.uninstall(p2).unwrap();
    assert_eq!(consumer.take(), vec![Seen::Unavailable]);
    assert!(!dependency.is_available());
    assert_eq!(dependency.state(), DependencyState::RequiredUnavailable);
}

#[test]
fn scenario_b_optional_tracker() {
    let container = Container::new();
    let dependency = tracker(&container, false);
    let consumer = Recorder::new();
    dependency.start(consumer.clone()).unwrap();

    let p1 = container.install(named("p1"));
    assert_eq!(consumer.take(), vec![Seen::Available, Seen::Added(p1)]);

    let p2 = container.install(named("p2"));
    assert_eq!(consumer.take(), vec![Seen::Changed, Seen::Added(p2)]);

    container.uninstall(p1).unwrap();
    assert_eq!(consumer.take(), vec![Seen::Changed, Seen::Removed(p1)]);

    container.uninstall(p2).unwrap();
    assert_eq!(consumer.take(), vec![Seen::Unavailable, Seen::Removed(p2)]);
}

#[test]
fn scenario_c_fixed_identity_rejects_others() {
    let container = Container::new();
    let dependency = tracker(&container, true);
    dependency.set_fixed_provider(ProviderId(99)).unwrap();
    let consumer = Recorder::new();
    dependency.start(consumer.clone()).unwrap();

    container.install(named("y"));
    assert!(consumer.take().is_empty());
    assert!(!dependency.is_available());
    assert_eq!(dependency.name(), "provider #99");
}

#[test]
fn p1_available_tracks_match_count() {
    let container = Container::new();
    let dependency = tracker(&container, false);
    dependency
        .set_state_mask(ProviderState::Active.into())
        .unwrap();
    dependency.start(Recorder::new()).unwrap();
    assert_consistent(&dependency);

    let a = container.install(named("a"));
    assert_consistent(&dependency);
    container.start(a).unwrap();
    assert_consistent(&dependency);
    assert!(dependency.is_available());

    let b = container.install(named("b"));
    container.start(b).unwrap();
    container.stop(a).unwrap();
    assert_consistent(&dependency);
    assert!(dependency.is_available());

    container.uninstall(b).unwrap();
    assert_consistent(&dependency);
    assert!(!dependency.is_available());
}

#[test]
fn p2_required_suppression() {
    let container = Container::new();
    let dependency = tracker(&container, true);
    let consumer = Recorder::new();
    dependency.start(consumer.clone()).unwrap();

    container.install(named("first"));
    assert_eq!(consumer.count(&Seen::Available), 1);
    assert!(!consumer.take().iter().any(|s| matches!(s, Seen::Added(_))));

    let second = container.install(named("second"));
    assert_eq!(consumer.take(), vec![Seen::Changed, Seen::Added(second)]);
}

#[test]
fn p3_optional_immediacy() {
    let container = Container::new();
    let dependency = tracker(&container, false);
    let consumer = Recorder::new();
    dependency.start(consumer.clone()).unwrap();

    let first = container.install(named("first"));
    assert_eq!(consumer.take(), vec![Seen::Available, Seen::Added(first)]);
}

#[test]
fn p4_no_premature_unavailable() {
    let container = Container::new();
    let dependency = tracker(&container, true);
    let consumer = Recorder::new();
    let a = container.install(named("a"));
    let b = container.install(named("b"));
    dependency.start(consumer.clone()).unwrap();

    container.uninstall(a).unwrap();
    assert_eq!(consumer.count(&Seen::Unavailable), 0);
    container.uninstall(b).unwrap();
    assert_eq!(consumer.count(&Seen::Unavailable), 1);
}

#[test]
fn p5_callbacks_disable_auto_config() {
    let dependency = ModuleDependency::new(Container::new());
    assert!(dependency.is_auto_config());
    let instance = Arc::new(CallbackTarget::new("instance"));
    dependency
        .set_instance_callbacks(instance, Some("onAdd"), None, None)
        .unwrap();
    assert!(!dependency.is_auto_config());
}

#[test]
fn p6_filter_frozen_after_start() {
    let dependency = ModuleDependency::new(Container::new());
    dependency
        .set_filter(Some("(Module-SymbolicName=a)"))
        .unwrap();
    dependency.start(Recorder::new()).unwrap();

    let err = dependency
        .set_filter(Some("(Module-SymbolicName=b)"))
        .unwrap_err();
    assert!(matches!(
        err,
        DepwatchError::ModifiedWhileActive { setting: "filter" }
    ));
    assert_eq!(
        dependency.filter().as_deref(),
        Some("(Module-SymbolicName=a)")
    );
}

#[test]
fn filtered_tracker_ignores_non_matching_modules() {
    let container = Container::new();
    let dependency = tracker(&container, false);
    dependency
        .set_filter(Some("(&(Module-SymbolicName=org.example.*)(Module-Version>=2))"))
        .unwrap();
    let consumer = Recorder::new();
    dependency.start(consumer.clone()).unwrap();

    let mut old = named("org.example.api");
    old.insert("Module-Version", "1");
    container.install(old);
    assert!(consumer.take().is_empty());

    let mut new = named("org.example.api");
    new.insert("Module-Version", "3");
    let id = container.install(new);
    assert_eq!(consumer.take(), vec![Seen::Available, Seen::Added(id)]);
}

#[test]
fn callback_failures_do_not_change_state() {
    let container = Container::new();
    let failing = Arc::new(
        CallbackTarget::new("failing").on_call("onAdded", || anyhow::bail!("boom")),
    );
    let dependency = ModuleDependency::new(container.clone());
    dependency
        .set_instance_callbacks(failing, Some("onAdded"), None, None)
        .unwrap();
    let consumer = Recorder::new();
    dependency.start(consumer.clone()).unwrap();

    let id = container.install(named("a"));
    assert_eq!(
        consumer.take(),
        vec![
            Seen::Available,
            Seen::Added(id),
            Seen::Failed("onAdded".into())
        ]
    );
    assert!(dependency.is_available());
}

#[test]
fn component_activation_drives_injection() {
    let container = Container::new();
    let calls = Arc::new(Mutex::new(Vec::new()));
    let (bind, unbind) = (calls.clone(), calls.clone());
    let instance = Arc::new(
        CallbackTarget::new("impl")
            .on_provider("bind", move |p| {
                bind.lock().unwrap().push(format!("bind {}", p.id()));
                Ok(())
            })
            .on_provider("unbind", move |p| {
                unbind.lock().unwrap().push(format!("unbind {}", p.id()));
                Ok(())
            }),
    );

    let dependency = ModuleDependency::new(container.clone());
    dependency
        .set_required(true)
        .unwrap()
        .set_callback_names(Some("bind"), None, Some("unbind"))
        .unwrap();

    let component = Component::new("client");
    component.add_instance(instance);
    component.add_dependency("api", dependency);
    component.start().unwrap();

    let id = container.install(named("api"));
    assert!(component.is_registered());
    container.uninstall(id).unwrap();
    assert!(!component.is_registered());
    assert_eq!(
        *calls.lock().unwrap(),
        vec![format!("bind {}", id), format!("unbind {}", id)]
    );
    component.stop().unwrap();
}

#[test]
fn concurrent_churn_leaves_consistent_state() {
    const THREADS: usize = 8;
    const ROUNDS: usize = 50;

    let container = Container::new();
    let dependency = tracker(&container, true);
    let consumer = Recorder::new();
    dependency.start(consumer.clone()).unwrap();

    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let container = container.clone();
            thread::spawn(move || {
                let mut kept = None;
                for round in 0..ROUNDS {
                    let id = container.install(named(&format!("t{}-{}", t, round)));
                    container.start(id).unwrap();
                    if t % 2 == 0 && round == ROUNDS - 1 {
                        kept = Some(id);
                    } else {
                        container.uninstall(id).unwrap();
                    }
                }
                kept
            })
        })
        .collect();

    let kept: Vec<ProviderId> = handles
        .into_iter()
        .filter_map(|h| h.join().unwrap())
        .collect();

    assert_eq!(kept.len(), THREADS / 2);
    assert_eq!(dependency.providers().len(), kept.len());
    assert!(dependency.is_available());
    assert_consistent(&dependency);

    let available = consumer.count(&Seen::Available);
    let unavailable = consumer.count(&Seen::Unavailable);
    assert_eq!(available, unavailable + 1);

    for id in kept {
        container.uninstall(id).unwrap();
    }
    assert!(!dependency.is_available());
    assert_consistent(&dependency);
    assert_eq!(
        consumer.count(&Seen::Available),
        consumer.count(&Seen::Unavailable)
    );
}

#[test]
fn stop_from_another_thread_halts_delivery() {
    let container = Container::new();
    let dependency = tracker(&container, false);
    let consumer = Recorder::new();
    dependency.start(consumer.clone()).unwrap();

    let worker = {
        let container = container.clone();
        thread::spawn(move || {
            for i in 0..200 {
                container.install(named(&format!("m{}", i)));
            }
        })
    };
    dependency.stop().unwrap();
    consumer.take();
    worker.join().unwrap();

    // At most one in-flight delivery may complete after stop returns.
    assert!(consumer.take().len() <= 2);
    assert!(!dependency.is_available());
}

/// Consumer whose first availability notification panics.
struct FlakyConsumer {
    armed: AtomicBool,
    available_calls: AtomicUsize,
}

impl DependencyService for FlakyConsumer {
    fn dependency_available(&self, _: &ModuleDependency) {
        self.available_calls.fetch_add(1, Ordering::SeqCst);
        if self.armed.swap(false, Ordering::SeqCst) {
            panic!("consumer blew up");
        }
    }

    fn dependency_changed(&self, _: &ModuleDependency) {}

    fn dependency_unavailable(&self, _: &ModuleDependency) {}

    fn is_registered(&self) -> bool {
        false
    }

    fn composition_instances(&self) -> Vec<Arc<CallbackTarget>> {
        Vec::new()
    }
}

#[test]
fn consumer_panic_is_absorbed() {
    let container = Container::new();
    let dependency = ModuleDependency::new(container.clone());
    let consumer = Arc::new(FlakyConsumer {
        armed: AtomicBool::new(true),
        available_calls: AtomicUsize::new(0),
    });
    dependency.start(consumer.clone()).unwrap();

    let p1 = container.install(named("a"));
    assert!(dependency.is_available());
    assert_consistent(&dependency);

    container.uninstall(p1).unwrap();
    assert!(!dependency.is_available());
    assert_consistent(&dependency);

    let p2 = container.install(named("b"));
    let ids: Vec<_> = dependency.providers().iter().map(|p| p.id()).collect();
    assert_eq!(ids, vec![p2]);
    assert!(dependency.is_available());
    assert_consistent(&dependency);
    assert_eq!(consumer.available_calls.load(Ordering::SeqCst), 2);

    dependency.stop().unwrap();
}
