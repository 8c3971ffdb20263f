//! Reactive Runtime
//!
//! The runtime is the central coordinator that connects signals, memos, and
//! effects. It owns the dependency graph, the tracking stack, the batch
//! coordinator and the effect scheduler.
//!
//! # How It Works
//!
//! 1. When a signal, memo or effect is created, it gets a node in the
//!    runtime's graph.
//!
//! 2. When a memo or effect reads a signal or memo, the runtime links the
//!    two nodes.
//!
//! 3. When a signal's value changes (always inside a batch), the runtime:
//!    a. Bumps the signal's version
//!    b. Marks direct observers Dirty and everything beyond them Check
//!    c. Queues each woken effect with the batch coordinator
//!    d. Leaves memos alone; they are verified lazily on the next read
//!
//! 4. When the outermost batch closes, queued effects are handed to the
//!    scheduler. Each one pulls its sources before deciding whether to run.
//!
//! # Isolation
//!
//! There is no global state. Every [`Runtime`] is independent, so several
//! graphs can coexist in one thread (and in one test binary) without
//! interfering.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use super::batch::BatchCoordinator;
use super::context::TrackingContext;
use super::effect::{Effect, EffectOptions, IntoCleanup};
use super::memo::Memo;
use super::observable::{default_equality, Equality};
use super::scheduler::{ImmediateScheduler, Scheduler};
use super::signal::Signal;
use crate::config::RuntimeConfig;
use crate::error::{ReactiveError, Result};
use crate::graph::{Computation, Graph, NodeId, NodeKind, NodeState};

/// Handle to one reactive runtime.
///
/// Cloning the handle shares the runtime.
#[derive(Clone)]
pub struct Runtime {
    inner: Rc<RuntimeInner>,
}

/// Shared state behind a [`Runtime`]. Signals, memos and effects keep a
/// strong reference to it.
pub(crate) struct RuntimeInner {
    graph: RefCell<Graph>,
    tracking: TrackingContext,
    pub(crate) batch: BatchCoordinator,
    scheduler: RefCell<Rc<dyn Scheduler>>,
    pub(crate) config: RuntimeConfig,
}

/// One step of the pull phase.
enum Step {
    /// The top of the stack is settled.
    Pop,
    /// Verify this source first.
    Descend(NodeId),
    /// The node's state changed; look at it again.
    Revisit,
    /// Rerun the derived computation on top of the stack.
    Recompute(Rc<dyn Computation>),
}

impl Runtime {
    /// Create a runtime with the default configuration.
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    /// Create a runtime with a custom configuration.
    pub fn with_config(config: RuntimeConfig) -> Self {
        Self {
            inner: Rc::new(RuntimeInner {
                graph: RefCell::new(Graph::new()),
                tracking: TrackingContext::default(),
                batch: BatchCoordinator::new(config.flush_limit),
                scheduler: RefCell::new(Rc::new(ImmediateScheduler)),
                config,
            }),
        }
    }

    /// The configuration this runtime was created with.
    pub fn config(&self) -> &RuntimeConfig {
        &self.inner.config
    }

    /// Replace the scheduler used for effects created without their own.
    pub fn set_scheduler<S: Scheduler + 'static>(&self, scheduler: S) {
        *self.inner.scheduler.borrow_mut() = Rc::new(scheduler);
    }

    /// Create a signal using the default equality.
    pub fn signal<T: Clone + PartialEq + 'static>(&self, value: T) -> Signal<T> {
        self.signal_with(value, default_equality())
    }

    /// Create a signal with a custom equality predicate.
    pub fn signal_with<T: Clone + 'static>(&self, value: T, equals: Equality<T>) -> Signal<T> {
        Signal::new(self.inner.clone(), value, equals)
    }

    /// Create a memo from an infallible computation.
    pub fn computed<T, F>(&self, compute: F) -> Memo<T>
    where
        T: Clone + PartialEq + 'static,
        F: Fn() -> T + 'static,
    {
        self.computed_with(move || Ok(compute()), default_equality())
    }

    /// Create a memo from a fallible computation. Errors, including
    /// [`ReactiveError::CircularDependency`] from nested reads, surface from
    /// [`Memo::get`].
    pub fn try_computed<T, F>(&self, compute: F) -> Memo<T>
    where
        T: Clone + PartialEq + 'static,
        F: Fn() -> Result<T> + 'static,
    {
        self.computed_with(compute, default_equality())
    }

    /// Create a memo with a custom equality predicate.
    ///
    /// The predicate decides whether a recomputation counts as a change.
    /// It never prevents the computation from running.
    pub fn computed_with<T, F>(&self, compute: F, equals: Equality<T>) -> Memo<T>
    where
        T: Clone + 'static,
        F: Fn() -> Result<T> + 'static,
    {
        Memo::new(self.inner.clone(), Box::new(compute), equals)
    }

    /// Create an effect. It runs once before this returns.
    ///
    /// The body may return a cleanup (see [`IntoCleanup`]), which runs
    /// before the next run and on disposal.
    pub fn effect<C, F>(&self, body: F) -> Result<Effect>
    where
        C: IntoCleanup,
        F: FnMut() -> C + 'static,
    {
        self.effect_with(EffectOptions::default(), body)
    }

    /// Create an effect with options.
    pub fn effect_with<C, F>(&self, options: EffectOptions, mut body: F) -> Result<Effect>
    where
        C: IntoCleanup,
        F: FnMut() -> C + 'static,
    {
        Effect::new(
            self.inner.clone(),
            options,
            Box::new(move || body().into_cleanup()),
        )
    }

    /// Track the reads in `f` and rerun it whenever they change. Dropping
    /// or disposing the returned handle stops it.
    pub fn autorun<F>(&self, f: F) -> Result<Effect>
    where
        F: FnMut() + 'static,
    {
        self.effect(f)
    }

    /// Run `f` with effect flushing deferred until it returns.
    ///
    /// Batches nest; only the outermost one flushes. The flush error, if
    /// any, is the first error raised by a deferred effect.
    pub fn batch<R>(&self, f: impl FnOnce() -> R) -> Result<R> {
        self.inner.batch.run(f)
    }

    /// Like [`batch`](Self::batch), for a fallible `f`.
    pub fn try_batch<R>(&self, f: impl FnOnce() -> Result<R>) -> Result<R> {
        self.inner.batch.run_try(f)
    }

    /// Current batch nesting depth.
    pub fn batch_depth(&self) -> usize {
        self.inner.batch.depth()
    }

    /// Run `f` without recording dependencies for the enclosing computation.
    pub fn untrack<R>(&self, f: impl FnOnce() -> R) -> R {
        self.inner.untrack(f)
    }

    /// The node whose reads are being recorded right now, if any.
    pub fn current_observer(&self) -> Option<NodeId> {
        self.inner.tracking.current()
    }

    /// Number of live nodes in the graph.
    pub fn node_count(&self) -> usize {
        self.inner.graph.borrow().node_count()
    }

    /// Freshness of a node, or `None` if it was disposed.
    pub fn node_state(&self, id: NodeId) -> Option<NodeState> {
        self.inner.graph.borrow().node(id).map(|node| node.state())
    }

    /// Version of a node, or `None` if it was disposed.
    pub fn node_version(&self, id: NodeId) -> Option<u64> {
        self.inner.node_version(id)
    }

    /// Sources of a node, in the order they were read during its last run.
    pub fn node_sources(&self, id: NodeId) -> Vec<NodeId> {
        self.inner
            .graph
            .borrow()
            .node(id)
            .map(|node| node.sources().to_vec())
            .unwrap_or_default()
    }

    /// Number of observers of a node.
    pub fn observer_count(&self, id: NodeId) -> usize {
        self.inner
            .graph
            .borrow()
            .node(id)
            .map_or(0, |node| node.observers().len())
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("nodes", &self.node_count())
            .field("batch", &self.inner.batch)
            .field("config", &self.inner.config)
            .finish()
    }
}

impl RuntimeInner {
    pub(crate) fn scheduler(&self) -> Rc<dyn Scheduler> {
        Rc::clone(&self.scheduler.borrow())
    }

    pub(crate) fn add_node(&self, kind: NodeKind) -> NodeId {
        self.graph.borrow_mut().add_node(kind)
    }

    pub(crate) fn attach(&self, id: NodeId, computation: std::rc::Weak<dyn Computation>) {
        self.graph.borrow_mut().attach(id, computation);
    }

    /// Remove a node and its edges. Tolerates being called while the graph
    /// is borrowed, which only happens when a handle is dropped mid-update.
    pub(crate) fn remove_node(&self, id: NodeId) {
        match self.graph.try_borrow_mut() {
            Ok(mut graph) => graph.remove_node(id),
            Err(_) => tracing::warn!(node = %id, "graph busy; node left in place"),
        }
    }

    pub(crate) fn node_version(&self, id: NodeId) -> Option<u64> {
        self.graph.borrow().node(id).map(|node| node.version())
    }

    pub(crate) fn node_state(&self, id: NodeId) -> NodeState {
        self.graph.borrow().state(id)
    }

    /// Link `source` to the computation currently being tracked, if any.
    pub(crate) fn track(&self, source: NodeId) {
        if let Some(observer) = self.tracking.current() {
            self.graph.borrow_mut().link(source, observer);
        }
    }

    /// Run `f` with reads recorded against `observer`.
    pub(crate) fn run_tracked<R>(&self, observer: NodeId, f: impl FnOnce() -> R) -> R {
        let _scope = self.tracking.enter(Some(observer));
        f()
    }

    pub(crate) fn untrack<R>(&self, f: impl FnOnce() -> R) -> R {
        let _scope = self.tracking.enter(None);
        f()
    }

    /// Drop the node's edges ahead of a rerun.
    pub(crate) fn clear_sources(&self, id: NodeId) {
        self.graph.borrow_mut().clear_sources(id);
    }

    /// Record source versions after a run and optionally bump the node's
    /// own version, then mark it clean.
    pub(crate) fn settle(&self, id: NodeId, changed: bool) {
        let mut graph = self.graph.borrow_mut();
        graph.snapshot_sources(id);
        if let Some(node) = graph.node_mut(id) {
            if changed {
                node.bump_version();
            }
            node.mark_clean();
        }
    }

    /// Record source versions after a failed run, leaving the node stale so
    /// the next read retries.
    pub(crate) fn settle_failed(&self, id: NodeId) {
        self.graph.borrow_mut().snapshot_sources(id);
    }

    /// A source's value changed: bump its version and wake what depends on it.
    pub(crate) fn source_changed(&self, source: NodeId) {
        let woken = {
            let mut graph = self.graph.borrow_mut();
            if let Some(node) = graph.node_mut(source) {
                node.bump_version();
            }
            graph.propagate_dirty(source)
        };
        for computation in woken {
            computation.schedule();
        }
    }

    /// Bring `id` up to date. The pull phase.
    ///
    /// Walks with an explicit stack: Check nodes verify their stale sources
    /// first, then compare source versions; Dirty derived nodes recompute;
    /// Dirty effects are left for their own run.
    pub(crate) fn update_if_necessary(&self, id: NodeId) -> Result<()> {
        let mut stack = vec![id];

        while let Some(&top) = stack.last() {
            match self.next_step(top) {
                Step::Pop => {
                    stack.pop();
                }
                Step::Revisit => {}
                Step::Descend(source) => {
                    if stack.len() > self.graph.borrow().node_count() {
                        tracing::error!(node = %top, "dependency cycle during verification");
                        return Err(ReactiveError::CircularDependency { node: top });
                    }
                    stack.push(source);
                }
                Step::Recompute(computation) => {
                    tracing::debug!(node = %top, "recomputing derived value");
                    computation.recompute()?;
                    stack.pop();
                }
            }
        }

        Ok(())
    }

    fn next_step(&self, id: NodeId) -> Step {
        let mut graph = self.graph.borrow_mut();
        let Some(node) = graph.node(id) else {
            return Step::Pop;
        };

        match (node.state(), node.kind()) {
            (NodeState::Clean, _) => Step::Pop,
            (NodeState::Check, _) => {
                if let Some(source) = graph.first_pending_source(id) {
                    return Step::Descend(source);
                }
                let changed = graph.sources_changed(id);
                if let Some(node) = graph.node_mut(id) {
                    if changed {
                        node.escalate(NodeState::Dirty);
                        return Step::Revisit;
                    }
                    node.mark_clean();
                }
                Step::Pop
            }
            (NodeState::Dirty, NodeKind::Derived) => match node.computation() {
                Some(computation) => Step::Recompute(computation),
                None => {
                    // Its owner is gone; nothing can recompute it.
                    if let Some(node) = graph.node_mut(id) {
                        node.mark_clean();
                    }
                    Step::Pop
                }
            },
            (NodeState::Dirty, _) => Step::Pop,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn runtimes_are_independent() {
        let first = Runtime::new();
        let second = Runtime::new();

        let a = first.signal(1);
        let _b = second.signal(1);
        let doubled = {
            let a = a.clone();
            first.computed(move || a.get() * 2)
        };

        assert_eq!(doubled.get().unwrap(), 2);
        assert_eq!(first.node_count(), 2);
        assert_eq!(second.node_count(), 1);
    }

    #[test]
    fn untrack_hides_reads() {
        let rt = Runtime::new();
        let tracked = rt.signal(1);
        let hidden = rt.signal(10);

        let sum = {
            let (rt, tracked, hidden) = (rt.clone(), tracked.clone(), hidden.clone());
            rt.clone()
                .computed(move || tracked.get() + rt.untrack(|| hidden.get()))
        };

        assert_eq!(sum.get().unwrap(), 11);
        assert_eq!(rt.node_sources(sum.id()), vec![tracked.id()]);

        hidden.set(20).unwrap();
        assert_eq!(sum.get().unwrap(), 11);

        tracked.set(2).unwrap();
        assert_eq!(sum.get().unwrap(), 22);
    }

    #[test]
    fn check_node_settles_clean_when_nothing_changed() {
        let rt = Runtime::new();
        let source = rt.signal(3);

        let parity = {
            let source = source.clone();
            rt.computed(move || source.get() % 2)
        };
        let label = {
            let parity = parity.clone();
            rt.try_computed(move || Ok(format!("parity {}", parity.get()?)))
        };

        assert_eq!(label.get().unwrap(), "parity 1");
        source.set(5).unwrap();

        assert_eq!(rt.node_state(label.id()), Some(NodeState::Check));
        assert_eq!(label.get().unwrap(), "parity 1");
        assert_eq!(parity.recompute_count(), 2);
        assert_eq!(label.recompute_count(), 1);
        assert_eq!(rt.node_state(label.id()), Some(NodeState::Clean));
    }

    #[test]
    fn batch_defers_effects() {
        let rt = Runtime::new();
        let source = rt.signal(0);
        let runs = Rc::new(Cell::new(0));

        let _effect = {
            let (source, runs) = (source.clone(), runs.clone());
            rt.autorun(move || {
                source.get();
                runs.set(runs.get() + 1);
            })
            .unwrap()
        };

        rt.batch(|| {
            source.set(1).unwrap();
            assert_eq!(rt.batch_depth(), 1);
            assert_eq!(runs.get(), 1);
        })
        .unwrap();

        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn config_limits_reach_signals() {
        let rt = Runtime::with_config(RuntimeConfig {
            notify_limit: 3,
            flush_limit: 3,
        });
        let value = rt.signal(0);

        let writer = value.clone();
        value
            .subscribe(move |v| writer.set(v + 1))
            .detach();

        let err = value.set(1).unwrap_err();
        assert!(matches!(err, ReactiveError::NotificationLimit { limit: 3 }));
    }
}
