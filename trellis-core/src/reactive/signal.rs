//! Signal Implementation
//!
//! A Signal is the fundamental reactive primitive: an
//! [`Observable`] wired to a source node of the runtime's graph.
//!
//! # How Signals Work
//!
//! 1. When a signal is read with [`get`](Signal::get) inside a memo or
//!    effect, the runtime links the signal's node to that computation.
//!
//! 2. When a write changes the value (per the equality predicate), the
//!    node's version is bumped and its observers are marked stale.
//!
//! 3. Every write runs inside a batch, so effects woken by it run after
//!    all propagation from that write has finished.
//!
//! Direct subscribers (see [`subscribe`](Signal::subscribe)) are notified
//! too, outside the graph.

use std::fmt;
use std::rc::Rc;

use super::observable::{Equality, Observable, ObservableHooks};
use super::runtime::RuntimeInner;
use super::subscriber::Subscription;
use crate::error::Result;
use crate::graph::{NodeId, NodeKind};

/// A reactive value owned by a [`Runtime`](super::Runtime).
///
/// Cloning a signal yields another handle to the same value. The graph node
/// is removed when the last handle is dropped.
///
/// # Example
///
/// ```
/// use trellis_core::reactive::Runtime;
///
/// let rt = Runtime::new();
/// let count = rt.signal(0);
///
/// count.set(5).unwrap();
/// assert_eq!(count.get(), 5);
/// ```
pub struct Signal<T: 'static> {
    value: Observable<T>,
    node: NodeId,
    rt: Rc<RuntimeInner>,
}

/// Connects observable reads/writes to the graph.
struct GraphHooks {
    rt: Rc<RuntimeInner>,
    node: NodeId,
}

impl ObservableHooks for GraphHooks {
    fn on_read(&self) {
        self.rt.track(self.node);
    }

    fn on_write(&self) {
        self.rt.source_changed(self.node);
    }
}

impl Drop for GraphHooks {
    fn drop(&mut self) {
        self.rt.remove_node(self.node);
    }
}

impl<T: Clone + 'static> Signal<T> {
    pub(crate) fn new(rt: Rc<RuntimeInner>, value: T, equals: Equality<T>) -> Self {
        let node = rt.add_node(NodeKind::Source);
        let hooks = GraphHooks {
            rt: rt.clone(),
            node,
        };
        let value =
            Observable::from_parts(value, equals, rt.config.notify_limit, Some(Box::new(hooks)));
        Self { value, node, rt }
    }

    /// Get the signal's node id.
    pub fn id(&self) -> NodeId {
        self.node
    }

    /// Get the current value.
    ///
    /// Inside a memo or effect this also records a dependency.
    pub fn get(&self) -> T {
        self.value.get()
    }

    /// Get the current value without recording a dependency.
    pub fn peek(&self) -> T {
        self.value.peek()
    }

    /// Borrow the current value. Records a dependency like [`get`](Self::get).
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.rt.track(self.node);
        self.value.with(f)
    }

    /// Set a new value.
    ///
    /// Equal values are ignored. Returns the first error raised by a
    /// subscriber or by an effect flushed as a result of this write.
    pub fn set(&self, value: T) -> Result<()> {
        self.rt.batch.run_try(|| self.value.set(value))
    }

    /// Update the value using a function of the previous one.
    pub fn update(&self, f: impl FnOnce(&T) -> T) -> Result<()> {
        self.rt.batch.run_try(|| self.value.update(f))
    }

    /// Register a direct subscriber, called after every change.
    pub fn subscribe<F>(&self, subscriber: F) -> Subscription
    where
        F: FnMut(&T) -> Result<()> + 'static,
    {
        self.value.subscribe(subscriber)
    }

    /// Get the number of direct subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.value.subscriber_count()
    }

    /// The node's version; advances once per committed change.
    pub fn version(&self) -> u64 {
        self.rt.node_version(self.node).unwrap_or_default()
    }
}

impl<T: 'static> Clone for Signal<T> {
    fn clone(&self) -> Self {
        Self {
            value: self.value.clone(),
            node: self.node,
            rt: Rc::clone(&self.rt),
        }
    }
}

impl<T: fmt::Debug + 'static> fmt::Debug for Signal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("id", &self.node)
            .field("value", &self.value)
            .finish()
    }
}
