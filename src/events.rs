//! Listener registration with explicit disposal.
//!
//! Subscribing returns a [`Subscription`]; the listener stays registered until
//! that handle is dropped or [`Subscription::unsubscribe`] is called. Handles
//! acquired together can be collected into a [`SubscriptionSet`] and released
//! in one go when the owning component is torn down.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

type Listener<T> = Rc<dyn Fn(&T)>;

struct Listeners<T> {
    next_id: u64,
    entries: Vec<(u64, Listener<T>)>,
}

/// Single-threaded broadcast of events of type `T`.
pub struct EventBus<T> {
    listeners: Rc<RefCell<Listeners<T>>>,
}

impl<T: 'static> EventBus<T> {
    pub fn new() -> Self {
        Self {
            listeners: Rc::new(RefCell::new(Listeners {
                next_id: 0,
                entries: Vec::new(),
            })),
        }
    }

    pub fn subscribe(&self, listener: impl Fn(&T) + 'static) -> Subscription {
        let id = {
            let mut listeners = self.listeners.borrow_mut();
            let id = listeners.next_id;
            listeners.next_id += 1;
            listeners.entries.push((id, Rc::new(listener)));
            id
        };
        let listeners: Weak<RefCell<Listeners<T>>> = Rc::downgrade(&self.listeners);
        Subscription::new(move || {
            if let Some(listeners) = listeners.upgrade() {
                listeners
                    .borrow_mut()
                    .entries
                    .retain(|(entry_id, _)| *entry_id != id);
            }
        })
    }

    /// Calls every registered listener with `event`.
    ///
    /// The listener list is copied first, so listeners may subscribe,
    /// unsubscribe or emit on other buses while being called.
    pub fn emit(&self, event: &T) {
        let snapshot: Vec<Listener<T>> = self
            .listeners
            .borrow()
            .entries
            .iter()
            .map(|(_, listener)| Rc::clone(listener))
            .collect();
        for listener in snapshot {
            listener(event);
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.borrow().entries.len()
    }
}

impl<T: 'static> Default for EventBus<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for EventBus<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.listeners.borrow().entries.len())
            .finish()
    }
}

/// Disposer for one registered listener. Dropping it unsubscribes.
#[must_use = "dropping a Subscription unsubscribes the listener immediately"]
pub struct Subscription {
    dispose: Option<Box<dyn FnOnce()>>,
}

impl Subscription {
    pub fn new(dispose: impl FnOnce() + 'static) -> Self {
        Self {
            dispose: Some(Box::new(dispose)),
        }
    }

    pub fn unsubscribe(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(dispose) = self.dispose.take() {
            dispose();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.dispose.is_some())
            .finish()
    }
}

/// Subscriptions acquired together and released together.
#[derive(Debug, Default)]
pub struct SubscriptionSet {
    subscriptions: Vec<Subscription>,
}

impl SubscriptionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, subscription: Subscription) {
        self.subscriptions.push(subscription);
    }

    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }

    pub fn release_all(&mut self) {
        self.subscriptions.clear();
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;

    #[test]
    fn dropping_subscription_removes_listener() {
        let bus = EventBus::<u32>::new();
        let seen = Rc::new(Cell::new(0));
        let counter = Rc::clone(&seen);
        let subscription = bus.subscribe(move |value| counter.set(counter.get() + value));

        bus.emit(&2);
        drop(subscription);
        bus.emit(&5);

        assert_eq!(seen.get(), 2);
        assert_eq!(bus.listener_count(), 0);
    }

    #[test]
    fn set_releases_every_listener() {
        let bus = EventBus::<()>::new();
        let mut set = SubscriptionSet::new();
        for _ in 0..3 {
            set.add(bus.subscribe(|_| {}));
        }
        assert_eq!(bus.listener_count(), 3);

        set.release_all();

        assert!(set.is_empty());
        assert_eq!(bus.listener_count(), 0);
    }

    #[test]
    fn listener_may_unsubscribe_during_emit() {
        let bus = Rc::new(EventBus::<()>::new());
        let slot: Rc<RefCell<Option<Subscription>>> = Rc::new(RefCell::new(None));
        let inner = Rc::clone(&slot);
        let subscription = bus.subscribe(move |_| {
            inner.borrow_mut().take();
        });
        *slot.borrow_mut() = Some(subscription);

        bus.emit(&());

        assert_eq!(bus.listener_count(), 0);
    }

    #[test]
    fn disposer_outliving_bus_is_harmless() {
        let bus = EventBus::<()>::new();
        let subscription = bus.subscribe(|_| {});
        drop(bus);
        subscription.unsubscribe();
    }
}
