//! In-memory provider container and event source.
//!
//! The [`Container`] owns providers and emits a [`ContainerEvent`] for every
//! lifecycle change. Dependencies observe it through the [`EventSource`]
//! contract: they [`subscribe`](EventSource::subscribe) with a state mask and
//! a [`ProviderCustomizer`], then [`open`](Subscription::open) the returned
//! [`Subscription`].
//!
//! # Example
//!
//! ```
//! use depwatch::container::Container;
//! use depwatch::provider::{Attributes, ProviderState};
//!
//! let container = Container::new();
//! let id = container.install(Attributes::new());
//! container.start(id).unwrap();
//! assert_eq!(container.provider(id).unwrap().state(), ProviderState::Active);
//! ```
//!
//! # Modules
//!
//! - [`event`] - Event types and the listener trait
//! - [`tracker`] - Per-subscription bookkeeping of tracked providers

pub mod event;
pub mod tracker;

pub use event::{ContainerEvent, ContainerListener, EventKind};
pub use tracker::ProviderTracker;

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::debug;

use crate::error::{DepwatchError, Result};
use crate::provider::{Attributes, Provider, ProviderId, ProviderState, StateMask};
use crate::sync::lock;

/// Fine-grained admission and change handling for a subscription.
///
/// The split between [`consider`](ProviderCustomizer::consider) and the
/// event methods mirrors the tracking protocol: only providers accepted by
/// `consider` are tracked and reported through `added`/`modified`/`removed`.
pub trait ProviderCustomizer: Send + Sync {
    /// Decide whether a provider entering the state mask should be tracked.
    fn consider(&self, provider: &Provider) -> bool;

    /// A considered provider is now tracked.
    fn added(&self, provider: &Provider);

    /// A tracked provider changed state or headers within the mask.
    fn modified(&self, provider: &Provider);

    /// A tracked provider left the mask or was uninstalled.
    fn removed(&self, provider: &Provider);
}

/// Source of provider events.
pub trait EventSource: Send + Sync {
    /// Prepare a subscription for providers in `mask`. No events are
    /// delivered until [`Subscription::open`] is called.
    ///
    /// `hint` describes the customizer's predicate for diagnostics only.
    fn subscribe(
        &self,
        mask: StateMask,
        hint: Option<&str>,
        customizer: Arc<dyn ProviderCustomizer>,
    ) -> Arc<dyn Subscription>;
}

/// Live delivery of provider events to one customizer.
pub trait Subscription: Send + Sync {
    /// Start delivery. Providers already present are reported first.
    fn open(&self);

    /// Stop delivery. No event begins dispatch after this returns.
    fn close(&self);

    /// Number of providers currently tracked.
    fn current_match_count(&self) -> usize;

    /// Tracked providers ordered by identity.
    fn providers(&self) -> Vec<Provider>;
}

/// Container-wide sequence number of a provider change.
///
/// Assigned while the provider table is locked, so revisions of one provider
/// increase in the order its changes were applied.
pub type Revision = u64;

/// Identifies a registered listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

struct Entry {
    revision: Revision,
    provider: Provider,
}

pub(crate) struct ContainerShared {
    providers: Mutex<BTreeMap<ProviderId, Entry>>,
    listeners: Mutex<Vec<(ListenerId, Arc<dyn ContainerListener>)>>,
    next_provider: AtomicU64,
    next_listener: AtomicU64,
    next_revision: AtomicU64,
}

impl ContainerShared {
    /// Register a listener and return the providers present at that moment.
    pub(crate) fn register_and_snapshot(
        &self,
        listener: Arc<dyn ContainerListener>,
    ) -> (ListenerId, Vec<(Revision, Provider)>) {
        let providers = lock(&self.providers);
        let id = ListenerId(self.next_listener.fetch_add(1, Ordering::Relaxed));
        lock(&self.listeners).push((id, listener));
        let existing = providers
            .values()
            .map(|entry| (entry.revision, entry.provider.clone()))
            .collect();
        (id, existing)
    }

    /// Next revision. Call with the provider table locked.
    fn next_revision(&self) -> Revision {
        self.next_revision.fetch_add(1, Ordering::Relaxed)
    }

    pub(crate) fn remove_listener(&self, id: ListenerId) {
        lock(&self.listeners).retain(|(lid, _)| *lid != id);
    }

    fn emit(&self, kind: EventKind, revision: Revision, provider: Provider) {
        let listeners: Vec<_> = lock(&self.listeners)
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect();
        debug!(provider = %provider.id(), event = %kind, revision, "Container event");
        let event = ContainerEvent {
            kind,
            revision,
            provider,
        };
        for listener in listeners {
            listener.provider_event(&event);
        }
    }
}

/// Thread-safe in-memory registry of providers.
///
/// Cloning yields another handle to the same container. Events are
/// delivered synchronously on the thread performing the operation, so
/// operations from several threads produce concurrent deliveries.
#[derive(Clone)]
pub struct Container {
    shared: Arc<ContainerShared>,
}

impl Container {
    /// Create an empty container.
    pub fn new() -> Self {
        Self {
            shared: Arc::new(ContainerShared {
                providers: Mutex::new(BTreeMap::new()),
                listeners: Mutex::new(Vec::new()),
                next_provider: AtomicU64::new(1),
                next_listener: AtomicU64::new(1),
                next_revision: AtomicU64::new(1),
            }),
        }
    }

    /// Install a provider. Identities are assigned from 1 upwards.
    pub fn install(&self, attributes: Attributes) -> ProviderId {
        let id = ProviderId(self.shared.next_provider.fetch_add(1, Ordering::Relaxed));
        let provider = Provider::new(id, ProviderState::Installed, attributes);
        let revision = {
            let mut providers = lock(&self.shared.providers);
            let revision = self.shared.next_revision();
            providers.insert(
                id,
                Entry {
                    revision,
                    provider: provider.clone(),
                },
            );
            revision
        };
        self.shared.emit(EventKind::Installed, revision, provider);
        id
    }

    /// Move an installed provider to resolved. Other states are left alone.
    pub fn resolve(&self, id: ProviderId) -> Result<()> {
        self.transition(id, EventKind::Resolved, |state| {
            (state == ProviderState::Installed).then_some(ProviderState::Resolved)
        })
    }

    /// Activate a provider.
    pub fn start(&self, id: ProviderId) -> Result<()> {
        self.transition(id, EventKind::Started, |state| {
            (state != ProviderState::Active).then_some(ProviderState::Active)
        })
    }

    /// Deactivate an active provider back to resolved.
    pub fn stop(&self, id: ProviderId) -> Result<()> {
        self.transition(id, EventKind::Stopped, |state| {
            (state == ProviderState::Active).then_some(ProviderState::Resolved)
        })
    }

    /// Replace a provider's headers, keeping its state.
    pub fn update(&self, id: ProviderId, attributes: Attributes) -> Result<()> {
        let (revision, provider) = {
            let mut providers = lock(&self.shared.providers);
            let current = providers
                .get_mut(&id)
                .ok_or(DepwatchError::UnknownProvider { id })?;
            current.provider = Provider::new(id, current.provider.state(), attributes);
            current.revision = self.shared.next_revision();
            (current.revision, current.provider.clone())
        };
        self.shared.emit(EventKind::Updated, revision, provider);
        Ok(())
    }

    /// Remove a provider. Its identity is never reused.
    pub fn uninstall(&self, id: ProviderId) -> Result<()> {
        let (revision, removed) = {
            let mut providers = lock(&self.shared.providers);
            let removed = providers
                .remove(&id)
                .ok_or(DepwatchError::UnknownProvider { id })?;
            (self.shared.next_revision(), removed.provider)
        };
        let provider = Provider::new(id, ProviderState::Uninstalled, removed.attributes().clone());
        self.shared.emit(EventKind::Uninstalled, revision, provider);
        Ok(())
    }

    /// Current snapshot of one provider.
    pub fn provider(&self, id: ProviderId) -> Option<Provider> {
        lock(&self.shared.providers)
            .get(&id)
            .map(|entry| entry.provider.clone())
    }

    /// Current snapshots of all providers, ordered by identity.
    pub fn providers(&self) -> Vec<Provider> {
        lock(&self.shared.providers)
            .values()
            .map(|entry| entry.provider.clone())
            .collect()
    }

    /// Register a raw listener for every container event.
    pub fn add_listener(&self, listener: Arc<dyn ContainerListener>) -> ListenerId {
        self.shared.register_and_snapshot(listener).0
    }

    /// Unregister a listener. Unknown ids are ignored.
    pub fn remove_listener(&self, id: ListenerId) {
        self.shared.remove_listener(id);
    }

    fn transition(
        &self,
        id: ProviderId,
        kind: EventKind,
        next: impl FnOnce(ProviderState) -> Option<ProviderState>,
    ) -> Result<()> {
        let (revision, provider) = {
            let mut providers = lock(&self.shared.providers);
            let current = providers
                .get_mut(&id)
                .ok_or(DepwatchError::UnknownProvider { id })?;
            match next(current.provider.state()) {
                Some(state) => {
                    current.provider =
                        Provider::new(id, state, current.provider.attributes().clone());
                    current.revision = self.shared.next_revision();
                    (current.revision, current.provider.clone())
                }
                None => {
                    debug!(provider = %id, event = %kind, "Transition not applicable, no event");
                    return Ok(());
                }
            }
        };
        self.shared.emit(kind, revision, provider);
        Ok(())
    }
}

impl Default for Container {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSource for Container {
    fn subscribe(
        &self,
        mask: StateMask,
        hint: Option<&str>,
        customizer: Arc<dyn ProviderCustomizer>,
    ) -> Arc<dyn Subscription> {
        debug!(mask = %mask, hint = hint.unwrap_or("<none>"), "New subscription");
        ProviderTracker::new(Arc::downgrade(&self.shared), mask, customizer)
    }
}
