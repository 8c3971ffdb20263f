//! Memo Implementation
//!
//! A Memo is a cached derived value that re-evaluates only when its
//! dependencies change.
//!
//! # How Memos Work
//!
//! 1. Creating a memo does not run it. The first read does.
//!
//! 2. When read again with nothing changed upstream, the cached value is
//!    returned.
//!
//! 3. When a dependency changes, the memo is marked Dirty (direct) or Check
//!    (indirect) by the push phase.
//!
//! 4. On the next read, a Check memo verifies its sources first. Only if a
//!    source's version actually moved does it recompute.
//!
//! 5. After recomputing, the memo's version advances only if the equality
//!    predicate says the value changed. Observers comparing versions then
//!    see no change and skip their own work.
//!
//! # Why This Matters
//!
//! - A signal changes
//! - 10 memos depend on it
//! - Only the memos actually read will recompute
//! - Memos that are never read stay stale (no wasted work)

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use super::observable::{Equality, FlagGuard};
use super::runtime::RuntimeInner;
use crate::error::{ReactiveError, Result};
use crate::graph::{Computation, NodeId, NodeKind};

type ComputeFn<T> = Box<dyn Fn() -> Result<T>>;

/// A cached derived value that recomputes only when dependencies change.
///
/// Cloning a memo yields another handle to the same cache. The graph node is
/// removed when the last handle is dropped or on [`dispose`](Memo::dispose).
pub struct Memo<T: 'static> {
    inner: Rc<MemoInner<T>>,
}

struct MemoInner<T: 'static> {
    rt: Rc<RuntimeInner>,
    node: NodeId,

    /// The computation function.
    compute: ComputeFn<T>,

    /// The cached value (None until the first successful run).
    value: RefCell<Option<T>>,

    /// Decides whether a new result counts as a change.
    equals: Equality<T>,

    /// Set while `compute` runs; a nested recompute request is a cycle.
    computing: Cell<bool>,

    recomputes: Cell<u64>,
    disposed: Cell<bool>,
}

impl<T: Clone + 'static> Memo<T> {
    pub(crate) fn new(rt: Rc<RuntimeInner>, compute: ComputeFn<T>, equals: Equality<T>) -> Self {
        let node = rt.add_node(NodeKind::Derived);
        let inner = Rc::new(MemoInner {
            rt,
            node,
            compute,
            value: RefCell::new(None),
            equals,
            computing: Cell::new(false),
            recomputes: Cell::new(0),
            disposed: Cell::new(false),
        });

        let weak = Rc::downgrade(&inner);
        inner.rt.attach(node, weak);
        Self { inner }
    }

    /// Get the memo's node id.
    pub fn id(&self) -> NodeId {
        self.inner.node
    }

    /// Get the current value, recomputing if necessary.
    ///
    /// Inside another memo or effect this also records a dependency.
    ///
    /// # Errors
    ///
    /// [`ReactiveError::CircularDependency`] if the memo ends up reading
    /// itself, [`ReactiveError::Disposed`] after disposal, or whatever the
    /// computation returned.
    pub fn get(&self) -> Result<T> {
        let value = self.peek()?;
        self.inner.rt.track(self.inner.node);
        Ok(value)
    }

    /// Like [`get`](Self::get) but without recording a dependency. Still
    /// recomputes if the memo is stale.
    pub fn peek(&self) -> Result<T> {
        let inner = &self.inner;
        if inner.disposed.get() {
            return Err(ReactiveError::Disposed { node: inner.node });
        }
        inner.rt.update_if_necessary(inner.node)?;
        inner
            .value
            .borrow()
            .clone()
            .ok_or(ReactiveError::Disposed { node: inner.node })
    }

    /// The node's version; advances only when a recomputation produced a
    /// different value.
    pub fn version(&self) -> u64 {
        self.inner.rt.node_version(self.inner.node).unwrap_or_default()
    }

    /// How many times the computation has run.
    pub fn recompute_count(&self) -> u64 {
        self.inner.recomputes.get()
    }

    /// Remove the memo from the graph. Idempotent.
    pub fn dispose(&self) {
        self.inner.dispose();
    }

    /// Check if the memo has been disposed.
    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.get()
    }
}

impl<T: 'static> MemoInner<T> {
    fn dispose(&self) {
        if self.disposed.replace(true) {
            return;
        }
        self.rt.remove_node(self.node);
        self.value.borrow_mut().take();
    }
}

impl<T: Clone + 'static> Computation for MemoInner<T> {
    fn recompute(&self) -> Result<bool> {
        if self.computing.get() {
            tracing::error!(node = %self.node, "memo read itself while recomputing");
            return Err(ReactiveError::CircularDependency { node: self.node });
        }
        self.computing.set(true);
        let _computing = FlagGuard(&self.computing);

        self.rt.clear_sources(self.node);
        let result = self.rt.run_tracked(self.node, || (self.compute)());
        self.recomputes.set(self.recomputes.get() + 1);

        match result {
            Ok(value) => {
                let changed = {
                    let mut cached = self.value.borrow_mut();
                    match cached.as_ref() {
                        Some(previous) if (self.equals)(previous, &value) => false,
                        _ => {
                            *cached = Some(value);
                            true
                        }
                    }
                };
                self.rt.settle(self.node, changed);
                Ok(changed)
            }
            Err(err) => {
                self.rt.settle_failed(self.node);
                Err(err)
            }
        }
    }
}

impl<T: 'static> Drop for MemoInner<T> {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl<T: 'static> Clone for Memo<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: fmt::Debug + 'static> fmt::Debug for Memo<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Memo")
            .field("id", &self.inner.node)
            .field("value", &*self.inner.value.borrow())
            .field("recomputes", &self.inner.recomputes.get())
            .finish()
    }
}
