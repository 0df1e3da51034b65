//! The module dependency tracker.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, Weak};
use tracing::{debug, info, warn};

use super::callbacks::Callbacks;
use super::{DependencyInfo, DependencyService, DependencyState};
use crate::callback::dispatcher::panic_message;
use crate::callback::{invoke_callback, CallbackTarget};
use crate::container::{EventSource, ProviderCustomizer, Subscription};
use crate::error::{DepwatchError, Result};
use crate::filter::{CapabilityPredicate, Filter};
use crate::provider::{Provider, ProviderId, StateMask};
use crate::sync::lock;

/// What a notification needs, captured under the lock.
struct Notify {
    consumer: Arc<dyn DependencyService>,
    required: bool,
    callbacks: Callbacks,
}

struct Inner {
    started: bool,
    available: bool,
    required: bool,
    auto_config: bool,
    state_mask: StateMask,
    predicate: Option<Arc<dyn CapabilityPredicate>>,
    fixed_provider: Option<ProviderId>,
    callbacks: Callbacks,
    bound_provider: Option<Provider>,
    consumer: Option<Arc<dyn DependencyService>>,
    subscription: Option<Arc<dyn Subscription>>,
}

impl Inner {
    fn name(&self) -> String {
        match (self.fixed_provider, &self.predicate) {
            (Some(id), Some(p)) => format!("provider #{} {}", id, p.describe()),
            (Some(id), None) => format!("provider #{}", id),
            (None, Some(p)) => p.describe(),
            (None, None) => "any module".to_string(),
        }
    }

    fn notify(&self) -> Option<Notify> {
        if !self.started {
            return None;
        }
        Some(Notify {
            consumer: Arc::clone(self.consumer.as_ref()?),
            required: self.required,
            callbacks: self.callbacks.clone(),
        })
    }
}

/// Tracks whether any module in a container satisfies a capability.
///
/// Created idle; configure it, then [`start`](Self::start) it with its
/// consumer. Configuration is rejected while started.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use depwatch::component::Component;
/// use depwatch::container::Container;
/// use depwatch::dependency::{DependencyService, ModuleDependency};
/// use depwatch::provider::Attributes;
///
/// let container = Container::new();
/// let dependency = ModuleDependency::new(container.clone());
/// dependency
///     .set_required(true)
///     .unwrap()
///     .set_filter(Some("(Module-SymbolicName=org.example.api)"))
///     .unwrap();
///
/// let component = Component::new("client");
/// component.add_dependency("api", dependency.clone());
/// component.start().unwrap();
/// assert!(!dependency.is_available());
///
/// let attrs: Attributes = [("Module-SymbolicName", "org.example.api")].into_iter().collect();
/// container.install(attrs);
/// assert!(dependency.is_available());
/// assert!(component.is_registered());
/// ```
pub struct ModuleDependency {
    source: Arc<dyn EventSource>,
    inner: Mutex<Inner>,
    self_ref: Weak<ModuleDependency>,
}

impl std::fmt::Debug for ModuleDependency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleDependency").finish_non_exhaustive()
    }
}

impl ModuleDependency {
    /// Create an idle dependency observing `source`.
    pub fn new(source: impl EventSource + 'static) -> Arc<Self> {
        Self::with_source(Arc::new(source))
    }

    /// Create an idle dependency observing a shared `source`.
    pub fn with_source(source: Arc<dyn EventSource>) -> Arc<Self> {
        Arc::new_cyclic(|self_ref| Self {
            source,
            inner: Mutex::new(Inner {
                started: false,
                available: false,
                required: false,
                auto_config: true,
                state_mask: StateMask::default(),
                predicate: None,
                fixed_provider: None,
                callbacks: Callbacks::default(),
                bound_provider: None,
                consumer: None,
                subscription: None,
            }),
            self_ref: self_ref.clone(),
        })
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Bind `consumer` and start observing providers.
    ///
    /// Providers already present are reported before this returns.
    pub fn start(&self, consumer: Arc<dyn DependencyService>) -> Result<()> {
        let subscription = {
            let mut inner = lock(&self.inner);
            if inner.started {
                return Err(DepwatchError::AlreadyStarted { name: inner.name() });
            }
            let customizer: Arc<dyn ProviderCustomizer> = Arc::new(WeakCustomizer {
                dependency: self.self_ref.clone(),
            });
            let hint = inner.predicate.as_ref().map(|p| p.describe());
            let subscription = self
                .source
                .subscribe(inner.state_mask, hint.as_deref(), customizer);

            inner.consumer = Some(consumer);
            inner.subscription = Some(Arc::clone(&subscription));
            inner.available = false;
            inner.bound_provider = None;
            inner.started = true;
            info!(dependency = %inner.name(), mask = %inner.state_mask, "Dependency started");
            subscription
        };
        subscription.open();
        Ok(())
    }

    /// Stop observing providers and return to idle.
    ///
    /// No new event is processed after this returns; a callback already
    /// running on another thread completes.
    pub fn stop(&self) -> Result<()> {
        let subscription = {
            let mut inner = lock(&self.inner);
            if !inner.started {
                return Err(DepwatchError::NotStarted { name: inner.name() });
            }
            inner.started = false;
            inner.available = false;
            info!(dependency = %inner.name(), "Dependency stopped");
            inner.subscription.take()
        };
        if let Some(subscription) = subscription {
            subscription.close();
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Configuration
    // ------------------------------------------------------------------

    fn configure(&self, setting: &'static str, apply: impl FnOnce(&mut Inner)) -> Result<&Self> {
        let mut inner = lock(&self.inner);
        if inner.started {
            return Err(DepwatchError::ModifiedWhileActive { setting });
        }
        apply(&mut inner);
        Ok(self)
    }

    /// Set the hooks. Naming any hook turns auto configuration off.
    pub fn set_callbacks(&self, callbacks: Callbacks) -> Result<&Self> {
        self.configure("callbacks", |inner| {
            if callbacks.any_named() {
                inner.auto_config = false;
            }
            inner.callbacks = callbacks;
        })
    }

    /// Set hook names dispatched onto the composition instances.
    pub fn set_callback_names(
        &self,
        added: Option<&str>,
        changed: Option<&str>,
        removed: Option<&str>,
    ) -> Result<&Self> {
        self.set_callbacks(Callbacks::with_changed(added, changed, removed))
    }

    /// Set hook names dispatched onto `instance` first.
    pub fn set_instance_callbacks(
        &self,
        instance: Arc<CallbackTarget>,
        added: Option<&str>,
        changed: Option<&str>,
        removed: Option<&str>,
    ) -> Result<&Self> {
        self.set_callbacks(Callbacks::with_changed(added, changed, removed).on(instance))
    }

    pub fn set_auto_config(&self, auto_config: bool) -> Result<&Self> {
        self.configure("auto_config", |inner| inner.auto_config = auto_config)
    }

    pub fn set_required(&self, required: bool) -> Result<&Self> {
        self.configure("required", |inner| inner.required = required)
    }

    /// Parse and install a filter; `None` matches every module.
    pub fn set_filter(&self, expression: Option<&str>) -> Result<&Self> {
        self.configure("filter", |_| {})?;
        let predicate = match expression {
            Some(expr) => {
                let filter = Filter::parse(expr).map_err(|e| DepwatchError::InvalidFilter {
                    expression: expr.to_string(),
                    message: e.to_string(),
                })?;
                Some(Arc::new(filter) as Arc<dyn CapabilityPredicate>)
            }
            None => None,
        };
        self.configure("filter", |inner| inner.predicate = predicate)
    }

    /// Install a custom predicate in place of a filter expression.
    pub fn set_predicate(&self, predicate: Arc<dyn CapabilityPredicate>) -> Result<&Self> {
        self.configure("filter", |inner| inner.predicate = Some(predicate))
    }

    pub fn set_state_mask(&self, mask: StateMask) -> Result<&Self> {
        self.configure("state_mask", |inner| inner.state_mask = mask)
    }

    /// Only ever track the provider with this identity.
    pub fn set_fixed_provider(&self, id: ProviderId) -> Result<&Self> {
        let mut inner = lock(&self.inner);
        if inner.started {
            return Err(DepwatchError::ModifiedWhileActive {
                setting: "fixed_provider",
            });
        }
        match inner.fixed_provider {
            Some(current) if current != id => Err(DepwatchError::FixedProviderConflict {
                current,
                requested: id,
            }),
            _ => {
                inner.fixed_provider = Some(id);
                Ok(self)
            }
        }
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn is_started(&self) -> bool {
        lock(&self.inner).started
    }

    pub fn is_available(&self) -> bool {
        lock(&self.inner).available
    }

    pub fn is_required(&self) -> bool {
        lock(&self.inner).required
    }

    pub fn is_auto_config(&self) -> bool {
        lock(&self.inner).auto_config
    }

    /// Dependencies of this kind are never bound to the consumer instance.
    pub fn is_instance_bound(&self) -> bool {
        false
    }

    pub fn state_mask(&self) -> StateMask {
        lock(&self.inner).state_mask
    }

    pub fn fixed_provider(&self) -> Option<ProviderId> {
        lock(&self.inner).fixed_provider
    }

    /// Description of the installed predicate, if any.
    pub fn filter(&self) -> Option<String> {
        lock(&self.inner).predicate.as_ref().map(|p| p.describe())
    }

    pub fn callbacks(&self) -> Callbacks {
        lock(&self.inner).callbacks.clone()
    }

    /// Provider used by [`invoke_added`](Self::invoke_added) and
    /// [`invoke_removed`](Self::invoke_removed).
    pub fn bound_provider(&self) -> Option<Provider> {
        lock(&self.inner).bound_provider.clone()
    }

    /// First tracked provider by identity.
    pub fn provider(&self) -> Option<Provider> {
        self.providers().into_iter().next()
    }

    /// All tracked providers ordered by identity.
    pub fn providers(&self) -> Vec<Provider> {
        let subscription = lock(&self.inner).subscription.clone();
        subscription.map(|s| s.providers()).unwrap_or_default()
    }

    // ------------------------------------------------------------------
    // Admission and transitions
    // ------------------------------------------------------------------

    /// Admission check for a provider entering the state mask.
    pub fn consider_provider(&self, provider: &Provider) -> bool {
        let (fixed, predicate) = {
            let inner = lock(&self.inner);
            (inner.fixed_provider, inner.predicate.clone())
        };
        if fixed.is_some_and(|id| id != provider.id()) {
            debug!(provider = %provider.id(), "Rejected: not the fixed provider");
            return false;
        }
        if let Some(predicate) = predicate {
            if !predicate.matches(provider.attributes()) {
                debug!(provider = %provider.id(), filter = %predicate.describe(), "Rejected: no match");
                return false;
            }
        }
        true
    }

    /// Mark available and bind `provider`. Returns whether the flag flipped,
    /// or `None` when the dependency is not started.
    fn make_available(&self, provider: &Provider) -> Option<(bool, Notify)> {
        let mut inner = lock(&self.inner);
        if !inner.started {
            return None;
        }
        inner.bound_provider = Some(provider.clone());
        let changed = !inner.available;
        inner.available = true;
        Some((changed, inner.notify()?))
    }

    fn make_unavailable(&self, provider: &Provider) -> Option<(bool, Notify)> {
        let mut inner = lock(&self.inner);
        if !inner.started {
            return None;
        }
        let subscription = inner.subscription.clone();
        let remaining = subscription.as_ref().map_or(0, |s| s.current_match_count());

        let was_bound = inner
            .bound_provider
            .as_ref()
            .is_some_and(|b| b.id() == provider.id());
        if was_bound {
            if let Some(next) = subscription.and_then(|s| s.providers().into_iter().next()) {
                inner.bound_provider = Some(next);
            }
        }

        let changed = inner.available && remaining == 0;
        if changed {
            inner.available = false;
        }
        Some((changed, inner.notify()?))
    }

    /// Run consumer code, absorbing a panic so event delivery carries on.
    fn guarded<T>(&self, notification: &'static str, fallback: T, f: impl FnOnce() -> T) -> T {
        catch_unwind(AssertUnwindSafe(f)).unwrap_or_else(|payload| {
            warn!(
                dependency = %self.name(),
                notification,
                panic = %panic_message(payload.as_ref()),
                "Consumer panicked during notification"
            );
            fallback
        })
    }

    fn provider_added(&self, provider: &Provider) {
        let Some((changed, notify)) = self.make_available(provider) else {
            debug!(provider = %provider.id(), "Dependency inactive, added event dropped");
            return;
        };
        if changed {
            info!(dependency = %self.name(), provider = %provider, "Dependency available");
            self.guarded("dependency_available", (), || {
                notify.consumer.dependency_available(self)
            });
            if !notify.required {
                self.dispatch(&notify, notify.callbacks.added_name(), provider);
            }
        } else {
            debug!(dependency = %self.name(), provider = %provider, "Additional match");
            self.guarded("dependency_changed", (), || notify.consumer.dependency_changed(self));
            self.dispatch(&notify, notify.callbacks.added_name(), provider);
        }
    }

    fn provider_modified(&self, provider: &Provider) {
        let Some(notify) = lock(&self.inner).notify() else {
            debug!(provider = %provider.id(), "Dependency inactive, modified event dropped");
            return;
        };
        debug!(dependency = %self.name(), provider = %provider, "Match modified");
        self.guarded("dependency_changed", (), || notify.consumer.dependency_changed(self));
        if self.guarded("is_registered", false, || notify.consumer.is_registered()) {
            self.dispatch(&notify, notify.callbacks.changed_name(), provider);
        }
    }

    fn provider_removed(&self, provider: &Provider) {
        let Some((changed, notify)) = self.make_unavailable(provider) else {
            debug!(provider = %provider.id(), "Dependency inactive, removed event dropped");
            return;
        };
        if changed {
            info!(dependency = %self.name(), provider = %provider, "Dependency unavailable");
            self.guarded("dependency_unavailable", (), || {
                notify.consumer.dependency_unavailable(self)
            });
            if !notify.required {
                self.dispatch(&notify, notify.callbacks.removed_name(), provider);
            }
        } else {
            debug!(dependency = %self.name(), provider = %provider, "Match removed, others remain");
            self.guarded("dependency_changed", (), || notify.consumer.dependency_changed(self));
            self.dispatch(&notify, notify.callbacks.removed_name(), provider);
        }
    }

    // ------------------------------------------------------------------
    // Callback invocation
    // ------------------------------------------------------------------

    fn dispatch(&self, notify: &Notify, method: Option<&str>, provider: &Provider) {
        let Some(method) = method else {
            return;
        };
        let mut targets: Vec<Arc<CallbackTarget>> = Vec::new();
        if let Some(instance) = notify.callbacks.instance() {
            targets.push(Arc::clone(instance));
        }
        targets.extend(self.guarded("composition_instances", Vec::new(), || {
            notify.consumer.composition_instances()
        }));

        for error in invoke_callback(&targets, method, provider) {
            self.guarded("callback_failed", (), || notify.consumer.callback_failed(self, &error));
        }
    }

    /// Dispatch context that does not require the dependency to be started.
    fn callback_context(&self) -> Option<Notify> {
        let inner = lock(&self.inner);
        Some(Notify {
            consumer: Arc::clone(inner.consumer.as_ref()?),
            required: inner.required,
            callbacks: inner.callbacks.clone(),
        })
    }

    fn invoke_with(&self, provider: Option<Provider>, pick: fn(&Callbacks) -> Option<&str>) {
        let Some(provider) = provider else {
            debug!(dependency = %self.name(), "No bound provider, nothing to invoke");
            return;
        };
        let Some(notify) = self.callback_context() else {
            debug!(dependency = %self.name(), "Never started, no consumer to dispatch to");
            return;
        };
        self.dispatch(&notify, pick(&notify.callbacks), &provider);
    }

    /// Invoke the added hook with the bound provider.
    pub fn invoke_added(&self) {
        self.invoke_with(self.bound_provider(), Callbacks::added_name);
    }

    /// Invoke the added hook with `provider`.
    pub fn invoke_added_for(&self, provider: &Provider) {
        self.invoke_with(Some(provider.clone()), Callbacks::added_name);
    }

    /// Invoke the changed hook with `provider`.
    pub fn invoke_changed_for(&self, provider: &Provider) {
        self.invoke_with(Some(provider.clone()), Callbacks::changed_name);
    }

    /// Invoke the removed hook with the bound provider.
    pub fn invoke_removed(&self) {
        self.invoke_with(self.bound_provider(), Callbacks::removed_name);
    }

    /// Invoke the removed hook with `provider`.
    pub fn invoke_removed_for(&self, provider: &Provider) {
        self.invoke_with(Some(provider.clone()), Callbacks::removed_name);
    }
}

impl ProviderCustomizer for ModuleDependency {
    fn consider(&self, provider: &Provider) -> bool {
        self.consider_provider(provider)
    }

    fn added(&self, provider: &Provider) {
        self.provider_added(provider);
    }

    fn modified(&self, provider: &Provider) {
        self.provider_modified(provider);
    }

    fn removed(&self, provider: &Provider) {
        self.provider_removed(provider);
    }
}

impl DependencyInfo for ModuleDependency {
    fn name(&self) -> String {
        lock(&self.inner).name()
    }

    fn kind(&self) -> &'static str {
        "module"
    }

    fn state(&self) -> DependencyState {
        let inner = lock(&self.inner);
        DependencyState::from_flags(inner.required, inner.available)
    }
}

/// Customizer handed to the event source; does not keep the dependency alive.
struct WeakCustomizer {
    dependency: Weak<ModuleDependency>,
}

impl ProviderCustomizer for WeakCustomizer {
    fn consider(&self, provider: &Provider) -> bool {
        self.dependency
            .upgrade()
            .is_some_and(|d| d.consider(provider))
    }

    fn added(&self, provider: &Provider) {
        if let Some(d) = self.dependency.upgrade() {
            d.added(provider);
        }
    }

    fn modified(&self, provider: &Provider) {
        if let Some(d) = self.dependency.upgrade() {
            d.modified(provider);
        }
    }

    fn removed(&self, provider: &Provider) {
        if let Some(d) = self.dependency.upgrade() {
            d.removed(provider);
        }
    }
}
