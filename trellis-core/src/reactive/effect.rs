//! Effect Implementation
//!
//! An Effect is a side-effecting computation that runs whenever its
//! dependencies change.
//!
//! # How Effects Work
//!
//! 1. When created, the effect runs its function immediately to establish
//!    initial dependencies.
//!
//! 2. When a dependency is marked stale, the effect is queued with the
//!    batch coordinator. When the batch closes it is handed to the
//!    scheduler.
//!
//! 3. When the scheduler runs it, the effect first verifies its sources.
//!    If none actually changed, it settles without running.
//!
//! 4. Before re-running, the previous cleanup runs and the old dependencies
//!    are cleared; new ones are tracked during execution.
//!
//! # Differences from Memo
//!
//! - Memos return a value; effects do not.
//! - Memos are lazy (compute on access); effects are eager (run when deps change).
//! - Memos cache results; effects just run their side effect.
//!
//! # Cleanup
//!
//! Effects can optionally return a [`Cleanup`]. It is called before the
//! effect re-runs and when the effect is disposed.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use super::observable::FlagGuard;
use super::runtime::RuntimeInner;
use super::scheduler::Scheduler;
use crate::error::{ReactiveError, Result};
use crate::graph::{Computation, NodeId, NodeKind, NodeState};

/// Work to undo an effect run.
pub struct Cleanup(Box<dyn FnOnce()>);

impl Cleanup {
    /// Wrap a cleanup function.
    pub fn new(f: impl FnOnce() + 'static) -> Self {
        Self(Box::new(f))
    }

    fn run(self) {
        (self.0)()
    }
}

impl fmt::Debug for Cleanup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Cleanup")
    }
}

/// Values an effect body may return.
pub trait IntoCleanup {
    /// Split the value into an optional cleanup or an error.
    fn into_cleanup(self) -> Result<Option<Cleanup>>;
}

impl IntoCleanup for () {
    fn into_cleanup(self) -> Result<Option<Cleanup>> {
        Ok(None)
    }
}

impl IntoCleanup for Cleanup {
    fn into_cleanup(self) -> Result<Option<Cleanup>> {
        Ok(Some(self))
    }
}

impl IntoCleanup for Option<Cleanup> {
    fn into_cleanup(self) -> Result<Option<Cleanup>> {
        Ok(self)
    }
}

impl<C: IntoCleanup> IntoCleanup for Result<C, ReactiveError> {
    fn into_cleanup(self) -> Result<Option<Cleanup>> {
        self?.into_cleanup()
    }
}

/// Options for [`Runtime::effect_with`](super::Runtime::effect_with).
#[derive(Clone, Default)]
pub struct EffectOptions {
    /// Label used in log events.
    pub name: Option<String>,

    /// Scheduler for this effect. Falls back to the runtime's.
    pub scheduler: Option<Rc<dyn Scheduler>>,
}

impl EffectOptions {
    /// Set the label used in log events.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Use `scheduler` for this effect.
    pub fn scheduler(mut self, scheduler: impl Scheduler + 'static) -> Self {
        self.scheduler = Some(Rc::new(scheduler));
        self
    }
}

impl fmt::Debug for EffectOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EffectOptions")
            .field("name", &self.name)
            .field("scheduler", &self.scheduler.is_some())
            .finish()
    }
}

pub(crate) type EffectFn = Box<dyn FnMut() -> Result<Option<Cleanup>>>;

/// A side-effecting computation that runs when dependencies change.
///
/// The handle owns the effect: dropping it disposes the effect.
///
/// # Example
///
/// ```
/// use std::cell::Cell;
/// use std::rc::Rc;
/// use trellis_core::reactive::Runtime;
///
/// let rt = Runtime::new();
/// let count = rt.signal(0);
/// let seen = Rc::new(Cell::new(-1));
///
/// let effect = {
///     let (count, seen) = (count.clone(), seen.clone());
///     rt.autorun(move || seen.set(count.get())).unwrap()
/// };
/// assert_eq!(seen.get(), 0);
///
/// count.set(5).unwrap();
/// assert_eq!(seen.get(), 5);
///
/// drop(effect);
/// count.set(6).unwrap();
/// assert_eq!(seen.get(), 5);
/// ```
pub struct Effect {
    inner: Rc<EffectInner>,
}

struct EffectInner {
    rt: Rc<RuntimeInner>,
    node: NodeId,
    name: Option<String>,
    scheduler: Option<Rc<dyn Scheduler>>,

    /// The effect function.
    body: RefCell<EffectFn>,

    /// Cleanup returned by the last run.
    cleanup: RefCell<Option<Cleanup>>,

    /// Set while the body runs; retriggers meanwhile are dropped.
    running: Cell<bool>,

    disposed: Cell<bool>,
    runs: Cell<u64>,
}

impl Effect {
    pub(crate) fn new(rt: Rc<RuntimeInner>, options: EffectOptions, body: EffectFn) -> Result<Self> {
        let node = rt.add_node(NodeKind::Effect);
        let inner = Rc::new(EffectInner {
            rt,
            node,
            name: options.name,
            scheduler: options.scheduler,
            body: RefCell::new(body),
            cleanup: RefCell::new(None),
            running: Cell::new(false),
            disposed: Cell::new(false),
            runs: Cell::new(0),
        });

        let weak = Rc::downgrade(&inner);
        inner.rt.attach(node, weak);

        // Run inside a batch so writes made by the first run flush after it.
        let effect = Self { inner };
        effect.inner.rt.batch.run_try(|| effect.inner.run())?;
        Ok(effect)
    }

    /// Get the effect's node id.
    pub fn id(&self) -> NodeId {
        self.inner.node
    }

    /// Stop the effect: it becomes inert, its last cleanup runs and its
    /// edges are removed. Idempotent.
    pub fn dispose(&self) {
        self.inner.dispose();
    }

    /// Check if the effect has been disposed.
    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.get()
    }

    /// Number of times the effect has run.
    pub fn run_count(&self) -> u64 {
        self.inner.runs.get()
    }
}

impl Drop for Effect {
    fn drop(&mut self) {
        self.inner.dispose();
    }
}

impl fmt::Debug for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Effect")
            .field("id", &self.inner.node)
            .field("name", &self.inner.name)
            .field("runs", &self.inner.runs.get())
            .field("disposed", &self.inner.disposed.get())
            .finish()
    }
}

impl EffectInner {
    /// Run if a source actually changed since the last run.
    fn run_if_dirty(&self) -> Result<()> {
        if self.disposed.get() || self.running.get() {
            return Ok(());
        }
        self.rt.update_if_necessary(self.node)?;
        if self.rt.node_state(self.node) == NodeState::Clean {
            tracing::trace!(node = %self.node, "effect sources unchanged; skipping");
            return Ok(());
        }
        self.run()
    }

    fn run(&self) -> Result<()> {
        if self.disposed.get() {
            return Ok(());
        }
        if self.running.get() {
            tracing::debug!(node = %self.node, "dropping reentrant effect run");
            return Ok(());
        }
        self.running.set(true);
        let _running = FlagGuard(&self.running);

        if let Some(cleanup) = self.cleanup.borrow_mut().take() {
            cleanup.run();
        }
        self.rt.clear_sources(self.node);

        tracing::debug!(node = %self.node, name = ?self.name, "running effect");
        let outcome = self.rt.run_tracked(self.node, || {
            let mut body = self.body.borrow_mut();
            (&mut *body)()
        });
        self.runs.set(self.runs.get() + 1);

        if self.disposed.get() {
            // Disposed from inside its own body.
            if let Ok(Some(cleanup)) = outcome {
                cleanup.run();
            }
            return Ok(());
        }

        self.rt.settle(self.node, false);
        match outcome {
            Ok(cleanup) => {
                *self.cleanup.borrow_mut() = cleanup;
                Ok(())
            }
            Err(err) => {
                tracing::debug!(node = %self.node, error = %err, "effect failed");
                Err(err)
            }
        }
    }

    fn dispose(&self) {
        if self.disposed.replace(true) {
            return;
        }
        tracing::debug!(node = %self.node, name = ?self.name, "disposing effect");
        // Taking the cleanup fails only if it is running right now.
        let cleanup = self
            .cleanup
            .try_borrow_mut()
            .ok()
            .and_then(|mut cleanup| cleanup.take());
        if let Some(cleanup) = cleanup {
            cleanup.run();
        }
        self.rt.remove_node(self.node);
    }
}

impl Computation for EffectInner {
    fn schedule(self: Rc<Self>) {
        if self.disposed.get() {
            return;
        }
        let weak = Rc::downgrade(&self);
        self.rt.batch.enqueue(
            self.node,
            Box::new(move || {
                let Some(effect) = weak.upgrade() else {
                    return Ok(());
                };
                let scheduler = effect
                    .scheduler
                    .clone()
                    .unwrap_or_else(|| effect.rt.scheduler());
                let weak = Rc::downgrade(&effect);
                drop(effect);
                scheduler.schedule(Box::new(move || match weak.upgrade() {
                    Some(effect) => effect.run_if_dirty(),
                    None => Ok(()),
                }))
            }),
        );
    }
}
