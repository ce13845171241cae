//! Fan-out subscription registry with late-join snapshot replay.
//!
//! The hub is single-threaded by construction (`Rc`/`RefCell`): all
//! delivery, subscription and replay happens on the thread that drives the
//! connection. No registry borrow is held while a callback runs, so callbacks
//! may subscribe or unsubscribe (including themselves) during delivery.
//!
//! Replay is deferred: `subscribe` only queues it. The queue is drained by
//! [`Hub::run_pending`] (called by the driver loop before it waits again) or,
//! at the latest, just before the next delta envelope is fanned out.

use ownmon_protocol::Envelope;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::rc::{Rc, Weak};
use tracing::{debug, error, warn};

type Callback = Rc<RefCell<dyn FnMut(&Envelope)>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

struct Observer {
    id: SubscriptionId,
    callback: Callback,
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    observers: Vec<Observer>,
    snapshot: Option<Rc<Envelope>>,
    pending_replays: Vec<SubscriptionId>,
}

impl Registry {
    fn callback(&self, id: SubscriptionId) -> Option<Callback> {
        self.observers
            .iter()
            .find(|observer| observer.id == id)
            .map(|observer| Rc::clone(&observer.callback))
    }

    /// Detaches `id`. The removed observers are handed back so they are
    /// dropped after the registry borrow is released: a callback may own
    /// other subscriptions whose drop re-enters the registry.
    fn remove(&mut self, id: SubscriptionId) -> Vec<Observer> {
        self.pending_replays.retain(|pending| *pending != id);
        let (removed, kept): (Vec<Observer>, Vec<Observer>) = std::mem::take(&mut self.observers)
            .into_iter()
            .partition(|observer| observer.id == id);
        self.observers = kept;
        removed
    }
}

/// Shared handle to the registry. Cloning is cheap and every clone refers to
/// the same observers and snapshot slot.
#[derive(Clone, Default)]
pub struct Hub {
    registry: Rc<RefCell<Registry>>,
}

impl Hub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `callback` for every future envelope.
    ///
    /// If a full snapshot is retained, it is queued for replay to this
    /// subscriber; the replay never runs inside this call.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: FnMut(&Envelope) + 'static,
    {
        let callback: Callback = Rc::new(RefCell::new(callback));
        let mut registry = self.registry.borrow_mut();
        registry.next_id += 1;
        let id = SubscriptionId(registry.next_id);
        registry.observers.push(Observer { id, callback });
        if registry.snapshot.is_some() {
            registry.pending_replays.push(id);
        }
        debug!(subscription = %id, observers = registry.observers.len(), "Observer subscribed");

        Subscription {
            id,
            registry: Rc::downgrade(&self.registry),
            released: Cell::new(false),
        }
    }

    /// Delivers `envelope` to every registered observer in registration order.
    pub fn dispatch(&self, envelope: Envelope) {
        let envelope = Rc::new(envelope);

        if envelope.is_full_snapshot() {
            let mut registry = self.registry.borrow_mut();
            registry.snapshot = Some(Rc::clone(&envelope));
            // Queued subscribers receive this newer snapshot through fan-out.
            registry.pending_replays.clear();
        } else {
            self.run_pending();
        }

        let targets: Vec<(SubscriptionId, Callback)> = self
            .registry
            .borrow()
            .observers
            .iter()
            .map(|observer| (observer.id, Rc::clone(&observer.callback)))
            .collect();

        for (id, callback) in targets {
            // An earlier observer may have unsubscribed this one.
            if !self.is_registered(id) {
                continue;
            }
            deliver(id, &callback, &envelope);
        }
    }

    /// Delivers queued snapshot replays. Returns how many were delivered.
    pub fn run_pending(&self) -> usize {
        let (pending, snapshot) = {
            let mut registry = self.registry.borrow_mut();
            if registry.pending_replays.is_empty() {
                return 0;
            }
            (
                std::mem::take(&mut registry.pending_replays),
                registry.snapshot.clone(),
            )
        };
        let Some(snapshot) = snapshot else {
            return 0;
        };

        let mut delivered = 0;
        for id in pending {
            let callback = self.registry.borrow().callback(id);
            if let Some(callback) = callback {
                debug!(subscription = %id, "Replaying cached snapshot");
                deliver(id, &callback, &snapshot);
                delivered += 1;
            }
        }
        delivered
    }

    pub fn has_pending(&self) -> bool {
        !self.registry.borrow().pending_replays.is_empty()
    }

    /// The most recently received full snapshot, if any.
    pub fn latest_snapshot(&self) -> Option<Rc<Envelope>> {
        self.registry.borrow().snapshot.clone()
    }

    pub fn observer_count(&self) -> usize {
        self.registry.borrow().observers.len()
    }

    fn is_registered(&self, id: SubscriptionId) -> bool {
        self.registry
            .borrow()
            .observers
            .iter()
            .any(|observer| observer.id == id)
    }
}

fn deliver(id: SubscriptionId, callback: &Callback, envelope: &Envelope) {
    let Ok(mut callback) = callback.try_borrow_mut() else {
        warn!(subscription = %id, "Observer re-entered during its own delivery; skipping");
        return;
    };

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| (&mut *callback)(envelope)));
    if outcome.is_err() {
        error!(
            subscription = %id,
            kind = %envelope.kind(),
            "Observer panicked during delivery; continuing with remaining observers"
        );
    }
}

/// Owned registration handle. Dropping it unsubscribes.
pub struct Subscription {
    id: SubscriptionId,
    registry: Weak<RefCell<Registry>>,
    released: Cell<bool>,
}

impl Subscription {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Stops delivery to this observer. Calling it again is a no-op.
    pub fn unsubscribe(&self) {
        if self.released.replace(true) {
            return;
        }
        let Some(registry) = self.registry.upgrade() else {
            return;
        };
        let removed = registry.borrow_mut().remove(self.id);
        if !removed.is_empty() {
            debug!(subscription = %self.id, "Observer unsubscribed");
        }
        drop(removed);
    }

    pub fn is_active(&self) -> bool {
        !self.released.get()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ownmon_protocol::{ActiveSession, MediaSignal, Message, SessionChange, Snapshot};

    fn snapshot(process_name: &str) -> Envelope {
        Envelope::new(
            Message::FullSnapshot(Snapshot {
                session: Some(ActiveSession {
                    process_name: process_name.to_string(),
                    window_title: "Docs".to_string(),
                    start_time: "2026-01-30T12:00:00Z".to_string(),
                }),
                ..Snapshot::default()
            }),
            "2026-01-30T12:00:00Z",
        )
    }

    fn session_change(process_name: &str) -> Envelope {
        Envelope::new(
            Message::SessionChanged(SessionChange {
                process_name: process_name.to_string(),
                window_title: String::new(),
            }),
            "2026-01-30T12:01:00Z",
        )
    }

    fn media_update() -> Envelope {
        Envelope::new(
            Message::MediaUpdated(MediaSignal::default()),
            "2026-01-30T12:02:00Z",
        )
    }

    fn recorder(hub: &Hub) -> (Subscription, Rc<RefCell<Vec<Envelope>>>) {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let subscription = hub.subscribe(move |envelope| sink.borrow_mut().push(envelope.clone()));
        (subscription, seen)
    }

    #[test]
    fn delivers_to_all_observers_in_order() {
        let hub = Hub::new();
        let order = Rc::new(RefCell::new(Vec::new()));
        let first = {
            let order = Rc::clone(&order);
            hub.subscribe(move |_| order.borrow_mut().push("first"))
        };
        let second = {
            let order = Rc::clone(&order);
            hub.subscribe(move |_| order.borrow_mut().push("second"))
        };

        hub.dispatch(session_change("code"));
        hub.dispatch(media_update());

        assert_eq!(*order.borrow(), vec!["first", "second", "first", "second"]);
        drop((first, second));
    }

    #[test]
    fn late_subscriber_gets_snapshot_replay_after_subscribe_returns() {
        let hub = Hub::new();
        hub.dispatch(snapshot("chrome"));

        let (_subscription, seen) = recorder(&hub);
        assert!(seen.borrow().is_empty(), "replay must not run inside subscribe");
        assert!(hub.has_pending());

        assert_eq!(hub.run_pending(), 1);
        assert_eq!(seen.borrow().len(), 1);
        assert!(seen.borrow()[0].is_full_snapshot());

        // Replay happens once.
        assert_eq!(hub.run_pending(), 0);
        assert_eq!(seen.borrow().len(), 1);
    }

    #[test]
    fn early_subscriber_receives_snapshot_once() {
        let hub = Hub::new();
        let (_subscription, seen) = recorder(&hub);

        hub.dispatch(snapshot("chrome"));
        hub.run_pending();
        hub.dispatch(session_change("code"));

        let kinds: Vec<_> = seen.borrow().iter().map(Envelope::kind).collect();
        assert_eq!(
            kinds,
            vec![
                ownmon_protocol::MessageKind::FullSnapshot,
                ownmon_protocol::MessageKind::SessionChanged
            ]
        );
    }

    #[test]
    fn replay_is_flushed_before_next_delta() {
        let hub = Hub::new();
        hub.dispatch(snapshot("chrome"));
        let (_subscription, seen) = recorder(&hub);

        hub.dispatch(session_change("code"));

        let seen = seen.borrow();
        assert_eq!(seen.len(), 2);
        assert!(seen[0].is_full_snapshot());
        assert_eq!(seen[1], session_change("code"));
    }

    #[test]
    fn newer_snapshot_supersedes_queued_replay() {
        let hub = Hub::new();
        hub.dispatch(snapshot("chrome"));
        let (_subscription, seen) = recorder(&hub);

        hub.dispatch(snapshot("code"));
        assert_eq!(hub.run_pending(), 0);

        let seen = seen.borrow();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0], snapshot("code"));
    }

    #[test]
    fn deltas_are_never_cached() {
        let hub = Hub::new();
        hub.dispatch(session_change("code"));
        hub.dispatch(media_update());
        assert!(hub.latest_snapshot().is_none());

        let (_subscription, seen) = recorder(&hub);
        assert_eq!(hub.run_pending(), 0);
        assert!(seen.borrow().is_empty());
    }

    #[test]
    fn unsubscribe_is_idempotent() {
        let hub = Hub::new();
        let (subscription, seen) = recorder(&hub);

        subscription.unsubscribe();
        subscription.unsubscribe();
        assert!(!subscription.is_active());
        assert_eq!(hub.observer_count(), 0);

        hub.dispatch(session_change("code"));
        assert!(seen.borrow().is_empty());
        drop(subscription);
    }

    #[test]
    fn unsubscribe_before_replay_cancels_it() {
        let hub = Hub::new();
        hub.dispatch(snapshot("chrome"));
        let (subscription, seen) = recorder(&hub);

        subscription.unsubscribe();
        assert_eq!(hub.run_pending(), 0);
        assert!(seen.borrow().is_empty());
    }

    #[test]
    fn dropping_subscription_unsubscribes() {
        let hub = Hub::new();
        let (subscription, seen) = recorder(&hub);
        drop(subscription);

        hub.dispatch(session_change("code"));
        assert!(seen.borrow().is_empty());
        assert_eq!(hub.observer_count(), 0);
    }

    #[test]
    fn observer_can_unsubscribe_itself_during_delivery() {
        let hub = Hub::new();
        let slot: Rc<RefCell<Option<Subscription>>> = Rc::new(RefCell::new(None));
        let calls = Rc::new(Cell::new(0));

        let subscription = {
            let slot = Rc::clone(&slot);
            let calls = Rc::clone(&calls);
            hub.subscribe(move |_| {
                calls.set(calls.get() + 1);
                if let Some(subscription) = slot.borrow().as_ref() {
                    subscription.unsubscribe();
                }
            })
        };
        *slot.borrow_mut() = Some(subscription);
        let (_other, seen) = recorder(&hub);

        hub.dispatch(session_change("code"));
        hub.dispatch(session_change("chrome"));

        assert_eq!(calls.get(), 1);
        assert_eq!(seen.borrow().len(), 2);
    }

    #[test]
    fn observer_can_unsubscribe_a_later_observer_mid_delivery() {
        let hub = Hub::new();
        let victim: Rc<RefCell<Option<Subscription>>> = Rc::new(RefCell::new(None));
        let _killer = {
            let victim = Rc::clone(&victim);
            hub.subscribe(move |_| {
                if let Some(subscription) = victim.borrow().as_ref() {
                    subscription.unsubscribe();
                }
            })
        };
        let (subscription, seen) = recorder(&hub);
        *victim.borrow_mut() = Some(subscription);

        hub.dispatch(session_change("code"));
        assert!(seen.borrow().is_empty());
    }

    #[test]
    fn panicking_observer_does_not_block_others() {
        let hub = Hub::new();
        let _bad = hub.subscribe(|_| panic!("observer bug"));
        let (_good, seen) = recorder(&hub);

        hub.dispatch(session_change("code"));
        hub.dispatch(session_change("chrome"));

        assert_eq!(seen.borrow().len(), 2);
        assert_eq!(hub.observer_count(), 2);
    }

    #[test]
    fn subscribing_during_snapshot_delivery_queues_replay() {
        let hub = Hub::new();
        let late: Rc<RefCell<Option<(Subscription, Rc<RefCell<Vec<Envelope>>>)>>> =
            Rc::new(RefCell::new(None));
        let _mounter = {
            let hub_handle = hub.clone();
            let late = Rc::clone(&late);
            hub.subscribe(move |envelope| {
                if envelope.is_full_snapshot() && late.borrow().is_none() {
                    *late.borrow_mut() = Some(recorder(&hub_handle));
                }
            })
        };

        hub.dispatch(snapshot("chrome"));
        {
            let late = late.borrow();
            let (_, seen) = late.as_ref().expect("mounted");
            assert!(seen.borrow().is_empty());
        }

        assert_eq!(hub.run_pending(), 1);
        let late = late.borrow();
        let (_, seen) = late.as_ref().expect("mounted");
        assert_eq!(seen.borrow().len(), 1);
    }

    #[test]
    fn snapshot_survives_subscription_churn() {
        let hub = Hub::new();
        hub.dispatch(snapshot("chrome"));
        for _ in 0..3 {
            let (subscription, _) = recorder(&hub);
            drop(subscription);
        }
        assert_eq!(hub.latest_snapshot().as_deref(), Some(&snapshot("chrome")));
    }
}
