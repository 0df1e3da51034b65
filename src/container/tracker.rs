//! Provider tracking for one subscription.
//!
//! A [`ProviderTracker`] turns raw container events into
//! `consider`/`added`/`modified`/`removed` calls on its customizer and keeps
//! the set of tracked providers, whose size is the match count.
//!
//! Events for one tracker are serialized: they are queued and drained by
//! whichever thread finds the tracker idle. No lock is held while the
//! customizer runs, so it may re-enter (for example by closing the tracker).
//! Snapshots older than the last one seen for a provider are dropped, so
//! racing deliveries cannot roll a provider back.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex, Weak};
use tracing::{debug, trace};

use super::event::{ContainerEvent, ContainerListener};
use super::{ContainerShared, ListenerId, ProviderCustomizer, Revision, Subscription};
use crate::provider::{Provider, ProviderId, ProviderState, StateMask};
use crate::sync::lock;

#[derive(Default)]
struct TrackerState {
    tracked: BTreeMap<ProviderId, Provider>,
    seen: HashMap<ProviderId, Revision>,
    queue: VecDeque<(Revision, Provider)>,
    draining: bool,
    opened: bool,
    closed: bool,
    listener: Option<ListenerId>,
}

/// What a dequeued snapshot means for the tracked set.
enum Change {
    Enter,
    Modify,
    Leave,
    Ignore,
}

/// Tracks providers of one container within a state mask.
pub struct ProviderTracker {
    container: Weak<ContainerShared>,
    mask: StateMask,
    customizer: Arc<dyn ProviderCustomizer>,
    state: Mutex<TrackerState>,
    self_ref: Weak<ProviderTracker>,
}

impl ProviderTracker {
    pub(crate) fn new(
        container: Weak<ContainerShared>,
        mask: StateMask,
        customizer: Arc<dyn ProviderCustomizer>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|self_ref| Self {
            container,
            mask,
            customizer,
            state: Mutex::new(TrackerState::default()),
            self_ref: self_ref.clone(),
        })
    }

    /// State mask this tracker watches.
    pub fn mask(&self) -> StateMask {
        self.mask
    }

    /// Whether the tracker has been closed.
    pub fn is_closed(&self) -> bool {
        lock(&self.state).closed
    }

    fn is_present(&self, provider: &Provider) -> bool {
        provider.state() != ProviderState::Uninstalled && self.mask.contains(provider.state())
    }

    fn enqueue(&self, snapshots: impl IntoIterator<Item = (Revision, Provider)>) {
        {
            let mut state = lock(&self.state);
            if !state.opened || state.closed {
                return;
            }
            state.queue.extend(snapshots);
            if state.draining {
                return;
            }
            state.draining = true;
        }
        self.drain();
    }

    fn drain(&self) {
        let _guard = DrainGuard(&self.state);
        loop {
            let (provider, previous) = {
                let mut state = lock(&self.state);
                if state.closed {
                    state.queue.clear();
                    state.draining = false;
                    return;
                }
                let Some((revision, provider)) = state.queue.pop_front() else {
                    state.draining = false;
                    return;
                };
                if state.seen.get(&provider.id()).is_some_and(|&last| last >= revision) {
                    trace!(provider = %provider.id(), revision, "Stale snapshot dropped");
                    continue;
                }
                state.seen.insert(provider.id(), revision);
                let previous = state.tracked.get(&provider.id()).cloned();
                (provider, previous)
            };
            self.process(provider, previous);
        }
    }

    fn classify(&self, provider: &Provider, previous: Option<&Provider>) -> Change {
        match (self.is_present(provider), previous) {
            (true, None) => Change::Enter,
            (true, Some(prev)) if prev == provider => Change::Ignore,
            (true, Some(_)) => Change::Modify,
            (false, Some(_)) => Change::Leave,
            (false, None) => Change::Ignore,
        }
    }

    fn process(&self, provider: Provider, previous: Option<Provider>) {
        match self.classify(&provider, previous.as_ref()) {
            Change::Enter => {
                if !self.customizer.consider(&provider) {
                    debug!(provider = %provider.id(), "Provider not admitted");
                    return;
                }
                if !self.update_tracked(|tracked| {
                    tracked.insert(provider.id(), provider.clone());
                }) {
                    return;
                }
                self.customizer.added(&provider);
            }
            Change::Modify => {
                if !self.update_tracked(|tracked| {
                    tracked.insert(provider.id(), provider.clone());
                }) {
                    return;
                }
                self.customizer.modified(&provider);
            }
            Change::Leave => {
                if !self.update_tracked(|tracked| {
                    tracked.remove(&provider.id());
                }) {
                    return;
                }
                self.customizer.removed(&provider);
            }
            Change::Ignore => {
                trace!(provider = %provider.id(), state = %provider.state(), "Event ignored");
            }
        }
    }

    /// Apply a change to the tracked set unless the tracker closed meanwhile.
    fn update_tracked(&self, apply: impl FnOnce(&mut BTreeMap<ProviderId, Provider>)) -> bool {
        let mut state = lock(&self.state);
        if state.closed {
            return false;
        }
        apply(&mut state.tracked);
        true
    }
}

/// Releases the drain role if the customizer unwinds out of `drain`.
struct DrainGuard<'a>(&'a Mutex<TrackerState>);

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            lock(self.0).draining = false;
        }
    }
}

impl ContainerListener for ProviderTracker {
    fn provider_event(&self, event: &ContainerEvent) {
        self.enqueue(std::iter::once((event.revision, event.provider.clone())));
    }
}

impl Subscription for ProviderTracker {
    fn open(&self) {
        {
            let mut state = lock(&self.state);
            if state.opened || state.closed {
                return;
            }
            state.opened = true;
        }

        let (Some(container), Some(me)) = (self.container.upgrade(), self.self_ref.upgrade())
        else {
            debug!("Container gone, subscription stays empty");
            return;
        };
        let listener: Arc<dyn ContainerListener> = me;
        let (id, existing) = container.register_and_snapshot(listener);

        let already_closed = {
            let mut state = lock(&self.state);
            state.listener = Some(id);
            state.closed
        };
        if already_closed {
            container.remove_listener(id);
            return;
        }

        debug!(count = existing.len(), mask = %self.mask, "Subscription opened");
        self.enqueue(existing);
    }

    fn close(&self) {
        let listener = {
            let mut state = lock(&self.state);
            if state.closed {
                return;
            }
            state.closed = true;
            state.queue.clear();
            state.tracked.clear();
            state.seen.clear();
            state.listener.take()
        };
        if let (Some(id), Some(container)) = (listener, self.container.upgrade()) {
            container.remove_listener(id);
        }
        debug!(mask = %self.mask, "Subscription closed");
    }

    fn current_match_count(&self) -> usize {
        lock(&self.state).tracked.len()
    }

    fn providers(&self) -> Vec<Provider> {
        lock(&self.state).tracked.values().cloned().collect()
    }
}
