//! Subscription handles for direct (graph-independent) subscribers.
//!
//! A subscriber is a callback registered on an
//! [`Observable`](super::Observable) or [`Signal`](super::Signal). It is
//! notified when a write changes the value, without going through the
//! dependency graph.

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

/// Unique identifier for a subscriber.
///
/// Ids are handed out per observable, so two observables may reuse the
/// same id for unrelated subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    pub(crate) fn from_raw(raw: u64) -> Self {
        Self(raw)
    }
}

/// A live subscription.
///
/// Disposing is idempotent and happens automatically on drop. Use
/// [`Subscription::detach`] to keep the subscriber for the lifetime of the
/// observable instead.
pub struct Subscription {
    id: SubscriptionId,
    cancel: Option<Rc<dyn Fn(SubscriptionId)>>,
    disposed: Cell<bool>,
}

impl Subscription {
    pub(crate) fn new(id: SubscriptionId, cancel: Rc<dyn Fn(SubscriptionId)>) -> Self {
        Self {
            id,
            cancel: Some(cancel),
            disposed: Cell::new(false),
        }
    }

    /// Get the subscription's id.
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Stop notifying the subscriber.
    pub fn dispose(&self) {
        if self.disposed.replace(true) {
            return;
        }
        if let Some(cancel) = &self.cancel {
            cancel(self.id);
        }
    }

    /// Check if the subscription has been disposed.
    pub fn is_disposed(&self) -> bool {
        self.disposed.get()
    }

    /// Keep the subscriber registered after this handle is dropped.
    pub fn detach(mut self) {
        self.cancel = None;
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispose_is_idempotent() {
        let calls = Rc::new(Cell::new(0));
        let counter = calls.clone();
        let subscription = Subscription::new(
            SubscriptionId::from_raw(3),
            Rc::new(move |_| counter.set(counter.get() + 1)),
        );

        subscription.dispose();
        subscription.dispose();
        drop(subscription);

        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn detach_skips_cancel() {
        let calls = Rc::new(Cell::new(0));
        let counter = calls.clone();
        let subscription = Subscription::new(
            SubscriptionId::from_raw(3),
            Rc::new(move |_| counter.set(counter.get() + 1)),
        );

        subscription.detach();
        assert_eq!(calls.get(), 0);
    }
}
