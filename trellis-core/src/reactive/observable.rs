//! Observable Values
//!
//! An [`Observable`] is a mutable cell with an equality predicate and a list
//! of direct subscribers. It does not need a runtime: on its own it is a
//! plain "value + change notification" primitive. [`Signal`](super::Signal)
//! wraps one and installs read/write hooks that drive the dependency graph.
//!
//! # Writes
//!
//! A write computes a candidate value, compares it with the current one and
//! stops if they are equal. Otherwise the value is committed, the write hook
//! runs, and subscribers are notified with a snapshot of the new value.
//!
//! # Reentrant Writes
//!
//! A subscriber may write back to the value it is being notified about. That
//! write is committed immediately but its notification is deferred: a flag
//! asks for one more pass once the current pass finishes. Passes are capped
//! so a feedback loop that never converges turns into an error instead of a
//! hang.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use indexmap::IndexMap;

use super::subscriber::{Subscription, SubscriptionId};
use crate::config::DEFAULT_ITERATION_LIMIT;
use crate::error::{record_error, ReactiveError, Result};

/// Equality predicate deciding whether a write changes a value.
pub type Equality<T> = Rc<dyn Fn(&T, &T) -> bool>;

/// Default equality: `==`, except that two values which are each unequal to
/// themselves (NaN) also count as equal.
#[allow(clippy::eq_op)]
pub fn same_value<T: PartialEq>(a: &T, b: &T) -> bool {
    a == b || (a != a && b != b)
}

/// The default [`Equality`] for `T`.
pub fn default_equality<T: PartialEq + 'static>() -> Equality<T> {
    Rc::new(same_value::<T>)
}

/// Read/write hooks installed by graph-connected wrappers.
pub(crate) trait ObservableHooks {
    /// Called by `get`, not by `peek`.
    fn on_read(&self);

    /// Called after every committed change, before subscribers run.
    fn on_write(&self);
}

type SubscriberFn<T> = Rc<RefCell<dyn FnMut(&T) -> Result<()>>>;

/// A mutable value with change notification.
///
/// Cloning an `Observable` yields another handle to the same cell.
pub struct Observable<T: 'static> {
    inner: Rc<ObservableInner<T>>,
}

struct ObservableInner<T: 'static> {
    value: RefCell<T>,
    equals: Equality<T>,
    subscribers: RefCell<IndexMap<SubscriptionId, SubscriberFn<T>>>,
    next_subscription: Cell<u64>,
    notifying: Cell<bool>,
    pending: Cell<bool>,
    notify_limit: usize,
    hooks: Option<Box<dyn ObservableHooks>>,
}

/// Resets a flag when dropped.
pub(crate) struct FlagGuard<'a>(pub(crate) &'a Cell<bool>);

impl Drop for FlagGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

impl<T: Clone + PartialEq + 'static> Observable<T> {
    /// Create an observable using [`same_value`] equality.
    pub fn new(value: T) -> Self {
        Self::with_equality(value, default_equality())
    }
}

impl<T: Clone + 'static> Observable<T> {
    /// Create an observable with a custom equality predicate.
    pub fn with_equality(value: T, equals: Equality<T>) -> Self {
        Self::with_limit(value, equals, DEFAULT_ITERATION_LIMIT)
    }

    /// Create an observable with a custom equality predicate and a custom
    /// ceiling on reentrant notification passes.
    pub fn with_limit(value: T, equals: Equality<T>, notify_limit: usize) -> Self {
        Self::from_parts(value, equals, notify_limit, None)
    }

    pub(crate) fn from_parts(
        value: T,
        equals: Equality<T>,
        notify_limit: usize,
        hooks: Option<Box<dyn ObservableHooks>>,
    ) -> Self {
        Self {
            inner: Rc::new(ObservableInner {
                value: RefCell::new(value),
                equals,
                subscribers: RefCell::new(IndexMap::new()),
                next_subscription: Cell::new(0),
                notifying: Cell::new(false),
                pending: Cell::new(false),
                notify_limit: notify_limit.max(1),
                hooks,
            }),
        }
    }

    /// Get the current value, running the read hook.
    pub fn get(&self) -> T {
        if let Some(hooks) = &self.inner.hooks {
            hooks.on_read();
        }
        self.peek()
    }

    /// Get the current value without running the read hook.
    pub fn peek(&self) -> T {
        self.inner.value.borrow().clone()
    }

    /// Borrow the current value without cloning it. Skips the read hook.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.inner.value.borrow())
    }

    /// Replace the value.
    ///
    /// Returns the first error raised by a subscriber, or
    /// [`ReactiveError::NotificationLimit`] if reentrant writes never settle.
    pub fn set(&self, value: T) -> Result<()> {
        self.update(|_| value)
    }

    /// Compute the next value from the previous one.
    pub fn update(&self, f: impl FnOnce(&T) -> T) -> Result<()> {
        let inner = &self.inner;
        let changed = {
            let candidate = f(&inner.value.borrow());
            let mut current = inner.value.borrow_mut();
            if (inner.equals)(&current, &candidate) {
                false
            } else {
                *current = candidate;
                true
            }
        };
        if !changed {
            return Ok(());
        }

        if let Some(hooks) = &inner.hooks {
            hooks.on_write();
        }

        if inner.notifying.get() {
            // Written from inside a subscriber: let the running loop pick it up.
            inner.pending.set(true);
            return Ok(());
        }
        self.notify()
    }

    /// Register a subscriber, called after every change.
    pub fn subscribe<F>(&self, subscriber: F) -> Subscription
    where
        F: FnMut(&T) -> Result<()> + 'static,
    {
        let id = SubscriptionId::from_raw(self.inner.next_subscription.get());
        self.inner
            .next_subscription
            .set(self.inner.next_subscription.get() + 1);

        let subscriber: SubscriberFn<T> = Rc::new(RefCell::new(subscriber));
        self.inner.subscribers.borrow_mut().insert(id, subscriber);

        let weak: Weak<ObservableInner<T>> = Rc::downgrade(&self.inner);
        Subscription::new(
            id,
            Rc::new(move |id| {
                if let Some(inner) = weak.upgrade() {
                    inner.subscribers.borrow_mut().shift_remove(&id);
                }
            }),
        )
    }

    /// Get the number of subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.borrow().len()
    }

    /// Whether a notification pass is running right now.
    pub fn is_notifying(&self) -> bool {
        self.inner.notifying.get()
    }

    fn notify(&self) -> Result<()> {
        let inner = &self.inner;
        inner.notifying.set(true);
        let _notifying = FlagGuard(&inner.notifying);

        let mut first_error = None;
        let mut passes = 0;
        loop {
            inner.pending.set(false);
            passes += 1;

            let snapshot = inner.value.borrow().clone();
            let subscribers: Vec<(SubscriptionId, SubscriberFn<T>)> = inner
                .subscribers
                .borrow()
                .iter()
                .map(|(id, subscriber)| (*id, Rc::clone(subscriber)))
                .collect();

            for (id, subscriber) in subscribers {
                // Skip subscribers disposed earlier in this pass.
                if !inner.subscribers.borrow().contains_key(&id) {
                    continue;
                }
                let Ok(mut callback) = subscriber.try_borrow_mut() else {
                    tracing::warn!(?id, "subscriber is already running; skipping");
                    continue;
                };
                if let Err(err) = (&mut *callback)(&snapshot) {
                    record_error(&mut first_error, err, "subscriber notification");
                }
            }

            if !inner.pending.get() {
                break;
            }
            if passes >= inner.notify_limit {
                let limit = inner.notify_limit;
                tracing::error!(limit, "reentrant writes did not settle; aborting notification");
                inner.pending.set(false);
                record_error(
                    &mut first_error,
                    ReactiveError::NotificationLimit { limit },
                    "subscriber notification",
                );
                break;
            }
        }

        first_error.map_or(Ok(()), Err)
    }
}

impl<T: 'static> Clone for Observable<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: fmt::Debug + 'static> fmt::Debug for Observable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observable")
            .field("value", &*self.inner.value.borrow())
            .field("subscriber_count", &self.inner.subscribers.borrow().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn observable_get_and_set() {
        let value = Observable::new(0);
        assert_eq!(value.get(), 0);

        value.set(42).unwrap();
        assert_eq!(value.get(), 42);
    }

    #[test]
    fn observable_update() {
        let value = Observable::new(10);
        value.update(|v| v + 5).unwrap();
        assert_eq!(value.peek(), 15);
    }

    #[test]
    fn equal_writes_do_not_notify() {
        let value = Observable::new(1);
        let calls = Rc::new(Cell::new(0));
        let counter = calls.clone();
        let _sub = value.subscribe(move |_| {
            counter.set(counter.get() + 1);
            Ok(())
        });

        value.set(1).unwrap();
        assert_eq!(calls.get(), 0);

        value.set(2).unwrap();
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn nan_equals_nan() {
        assert!(same_value(&f64::NAN, &f64::NAN));
        assert!(!same_value(&1.0, &f64::NAN));

        let value = Observable::new(f64::NAN);
        let calls = Rc::new(Cell::new(0));
        let counter = calls.clone();
        let _sub = value.subscribe(move |_| {
            counter.set(counter.get() + 1);
            Ok(())
        });

        value.set(f64::NAN).unwrap();
        assert_eq!(calls.get(), 0);
    }

    #[test]
    fn custom_equality() {
        let value = Observable::with_equality(
            "abc".to_string(),
            Rc::new(|a: &String, b: &String| a.len() == b.len()),
        );

        value.set("xyz".to_string()).unwrap();
        assert_eq!(value.peek(), "abc");

        value.set("abcd".to_string()).unwrap();
        assert_eq!(value.peek(), "abcd");
    }

    #[test]
    fn unsubscribe_stops_notifications() {
        let value = Observable::new(0);
        let calls = Rc::new(Cell::new(0));
        let counter = calls.clone();
        let sub = value.subscribe(move |_| {
            counter.set(counter.get() + 1);
            Ok(())
        });

        value.set(1).unwrap();
        sub.dispose();
        value.set(2).unwrap();

        assert_eq!(calls.get(), 1);
        assert_eq!(value.subscriber_count(), 0);
    }

    #[test]
    fn reentrant_write_is_deferred_to_a_second_pass() {
        let value = Observable::new(0);
        let seen = Rc::new(RefCell::new(Vec::new()));

        let writer = value.clone();
        let log = seen.clone();
        value
            .subscribe(move |v| {
                log.borrow_mut().push(*v);
                if *v == 1 {
                    writer.set(2)?;
                }
                Ok(())
            })
            .detach();

        value.set(1).unwrap();

        // One pass for 1, one extra pass for the nested write. No recursion.
        assert_eq!(*seen.borrow(), vec![1, 2]);
        assert_eq!(value.peek(), 2);
    }

    #[test]
    fn runaway_feedback_hits_the_ceiling() {
        let value = Observable::with_limit(0, default_equality(), 10);
        let calls = Rc::new(Cell::new(0));

        let writer = value.clone();
        let counter = calls.clone();
        value
            .subscribe(move |v| {
                counter.set(counter.get() + 1);
                writer.set(v + 1)
            })
            .detach();

        let err = value.set(1).unwrap_err();

        assert!(matches!(err, ReactiveError::NotificationLimit { limit: 10 }));
        assert_eq!(calls.get(), 10);
        // Left at whatever the last completed pass produced.
        assert_eq!(value.peek(), 11);
        assert!(!value.is_notifying());
    }

    #[test]
    fn subscriber_errors_are_isolated() {
        let value = Observable::new(0);
        let reached = Rc::new(Cell::new(false));

        let _failing = value.subscribe(|_| Err(ReactiveError::callback("first")));
        let _second = value.subscribe(|_| Err(ReactiveError::callback("second")));
        let flag = reached.clone();
        let _after = value.subscribe(move |_| {
            flag.set(true);
            Ok(())
        });

        let err = value.set(1).unwrap_err();

        assert_eq!(err.to_string(), "callback failed: first");
        assert!(reached.get());
    }
}
