//! Batch Coordinator
//!
//! Defers scheduled work until a (possibly nested) sequence of writes has
//! finished, then runs each pending task exactly once.
//!
//! # How It Works
//!
//! 1. Entering a batch increments a depth counter; leaving decrements it.
//! 2. Tasks are keyed by node id. Enqueuing a key that is already pending
//!    is a no-op, so an effect dirtied by several writes runs once.
//! 3. Only when the depth returns to zero is the pending set drained.
//! 4. Writes made by drained tasks enqueue more work; the running drain loop
//!    picks it up in its next round instead of flushing reentrantly.
//!
//! Every task runs even if an earlier one fails. The first error is returned
//! to the caller that closed the outermost batch, the rest are logged.

use std::cell::{Cell, RefCell};
use std::fmt;

use indexmap::IndexMap;

use super::observable::FlagGuard;
use crate::config::DEFAULT_ITERATION_LIMIT;
use crate::error::{record_error, ReactiveError, Result};
use crate::graph::NodeId;

/// A unit of deferred work.
pub type BatchTask = Box<dyn FnOnce() -> Result<()>>;

/// Tracks batch nesting and the deduplicated set of pending tasks.
pub struct BatchCoordinator {
    depth: Cell<usize>,
    flushing: Cell<bool>,
    pending: RefCell<IndexMap<NodeId, BatchTask>>,
    flush_limit: usize,
}

/// Guard that leaves the batch when dropped.
pub struct BatchScope<'a> {
    coordinator: &'a BatchCoordinator,
}

impl Drop for BatchScope<'_> {
    fn drop(&mut self) {
        let depth = self.coordinator.depth.get();
        self.coordinator.depth.set(depth.saturating_sub(1));
    }
}

impl BatchCoordinator {
    /// Create a coordinator that drains at most `flush_limit` rounds per flush.
    pub fn new(flush_limit: usize) -> Self {
        Self {
            depth: Cell::new(0),
            flushing: Cell::new(false),
            pending: RefCell::new(IndexMap::new()),
            flush_limit: flush_limit.max(1),
        }
    }

    /// Current nesting depth.
    pub fn depth(&self) -> usize {
        self.depth.get()
    }

    /// Whether a drain loop is running.
    pub fn is_flushing(&self) -> bool {
        self.flushing.get()
    }

    /// Number of tasks waiting for the next flush.
    pub fn pending_count(&self) -> usize {
        self.pending.borrow().len()
    }

    /// Enter a batch. Leaving happens when the guard drops; flushing is up
    /// to the caller.
    pub fn enter(&self) -> BatchScope<'_> {
        self.depth.set(self.depth.get() + 1);
        BatchScope { coordinator: self }
    }

    /// Queue `task` under `key`. Returns `false` if `key` is already pending.
    pub fn enqueue(&self, key: NodeId, task: BatchTask) -> bool {
        let mut pending = self.pending.borrow_mut();
        if pending.contains_key(&key) {
            return false;
        }
        pending.insert(key, task);
        true
    }

    /// Run `f` inside a batch, flushing afterwards if this was the outermost
    /// batch.
    pub fn run<R>(&self, f: impl FnOnce() -> R) -> Result<R> {
        let value = {
            let _scope = self.enter();
            f()
        };
        self.flush().map(|()| value)
    }

    /// Like [`run`](Self::run) for a fallible `f`. An error from `f` takes
    /// precedence over an error from the flush that follows it.
    pub fn run_try<R>(&self, f: impl FnOnce() -> Result<R>) -> Result<R> {
        let value = {
            let _scope = self.enter();
            f()
        };
        let flushed = self.flush();
        match (value, flushed) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(err)) | (Err(err), Ok(())) => Err(err),
            (Err(err), Err(later)) => {
                tracing::error!(error = %later, "additional error during batch flush");
                Err(err)
            }
        }
    }

    /// Drain the pending set if no batch is open and no drain is running.
    pub fn flush(&self) -> Result<()> {
        if self.depth.get() > 0 || self.flushing.get() {
            return Ok(());
        }
        self.flushing.set(true);
        let _flushing = FlagGuard(&self.flushing);

        let mut first_error = None;
        let mut rounds = 0;
        loop {
            let tasks: Vec<(NodeId, BatchTask)> = self.pending.borrow_mut().drain(..).collect();
            if tasks.is_empty() {
                break;
            }

            rounds += 1;
            if rounds > self.flush_limit {
                let limit = self.flush_limit;
                tracing::error!(
                    limit,
                    dropped = tasks.len(),
                    "batch flush did not settle; dropping pending work"
                );
                record_error(
                    &mut first_error,
                    ReactiveError::FlushLimit { limit },
                    "batch flush",
                );
                break;
            }

            tracing::trace!(round = rounds, tasks = tasks.len(), "flushing batch");
            for (key, task) in tasks {
                if let Err(err) = task() {
                    tracing::debug!(%key, error = %err, "batched task failed");
                    record_error(&mut first_error, err, "batch flush");
                }
            }
        }

        first_error.map_or(Ok(()), Err)
    }
}

impl Default for BatchCoordinator {
    fn default() -> Self {
        Self::new(DEFAULT_ITERATION_LIMIT)
    }
}

impl fmt::Debug for BatchCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchCoordinator")
            .field("depth", &self.depth.get())
            .field("flushing", &self.flushing.get())
            .field("pending", &self.pending.borrow().len())
            .finish()
    }
}
