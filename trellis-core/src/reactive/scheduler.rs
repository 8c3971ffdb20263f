//! Effect Schedulers
//!
//! When a batch flushes, each pending effect is handed to a [`Scheduler`]
//! as a "run later" task. The scheduler decides when that task runs:
//!
//! - [`ImmediateScheduler`] (the default) runs it on the spot, so effects
//!   settle before the write that triggered them returns.
//! - [`QueueScheduler`] holds tasks until the host calls
//!   [`QueueScheduler::flush`], e.g. once per animation frame.
//! - `LocalTaskScheduler` (feature `tokio`) spawns each task onto the
//!   current tokio `LocalSet`.
//!
//! Tasks only hold weak references to their effect, so a task that outlives
//! its effect is a no-op.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;

use crate::config::DEFAULT_ITERATION_LIMIT;
use crate::error::{record_error, ReactiveError, Result};

/// Deferred effect work.
pub type Task = Box<dyn FnOnce() -> Result<()>>;

/// Decides when scheduled effect runs happen.
pub trait Scheduler {
    /// Accept a task. Implementations that run it synchronously return its
    /// result; deferring implementations return `Ok(())`.
    fn schedule(&self, task: Task) -> Result<()>;
}

impl<S: Scheduler + ?Sized> Scheduler for Rc<S> {
    fn schedule(&self, task: Task) -> Result<()> {
        (**self).schedule(task)
    }
}

/// Runs every task as soon as it is scheduled.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImmediateScheduler;

impl Scheduler for ImmediateScheduler {
    fn schedule(&self, task: Task) -> Result<()> {
        task()
    }
}

/// Queues tasks until [`flush`](Self::flush) is called.
///
/// Share it with the runtime through an `Rc` to keep a handle for flushing:
///
/// ```
/// use std::rc::Rc;
/// use trellis_core::reactive::{QueueScheduler, Runtime};
///
/// let rt = Runtime::new();
/// let queue = Rc::new(QueueScheduler::new());
/// rt.set_scheduler(queue.clone());
///
/// let count = rt.signal(0);
/// let seen = rt.signal(-1);
/// let _effect = {
///     let (count, seen) = (count.clone(), seen.clone());
///     rt.autorun(move || {
///         let _ = seen.set(count.get());
///     })
///     .unwrap()
/// };
///
/// count.set(5).unwrap();
/// assert_eq!(seen.peek(), 0);
///
/// queue.flush().unwrap();
/// assert_eq!(seen.peek(), 5);
/// ```
pub struct QueueScheduler {
    queue: RefCell<VecDeque<Task>>,
    round_limit: usize,
}

impl QueueScheduler {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::with_limit(DEFAULT_ITERATION_LIMIT)
    }

    /// Create an empty queue whose [`flush`](Self::flush) drains at most
    /// `round_limit` rounds.
    pub fn with_limit(round_limit: usize) -> Self {
        Self {
            queue: RefCell::new(VecDeque::new()),
            round_limit: round_limit.max(1),
        }
    }

    /// Number of queued tasks.
    pub fn len(&self) -> usize {
        self.queue.borrow().len()
    }

    /// Whether the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.queue.borrow().is_empty()
    }

    /// Run queued tasks until the queue is empty, including tasks queued by
    /// the tasks themselves. Returns how many ran.
    pub fn flush(&self) -> Result<usize> {
        let mut first_error = None;
        let mut ran = 0;
        let mut rounds = 0;

        loop {
            let tasks: Vec<Task> = self.queue.borrow_mut().drain(..).collect();
            if tasks.is_empty() {
                break;
            }

            rounds += 1;
            if rounds > self.round_limit {
                let limit = self.round_limit;
                tracing::error!(limit, dropped = tasks.len(), "scheduler queue did not settle");
                record_error(
                    &mut first_error,
                    ReactiveError::FlushLimit { limit },
                    "scheduler flush",
                );
                break;
            }

            for task in tasks {
                ran += 1;
                if let Err(err) = task() {
                    record_error(&mut first_error, err, "scheduler flush");
                }
            }
        }

        first_error.map_or(Ok(ran), Err)
    }
}

impl Default for QueueScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler for QueueScheduler {
    fn schedule(&self, task: Task) -> Result<()> {
        self.queue.borrow_mut().push_back(task);
        Ok(())
    }
}

impl fmt::Debug for QueueScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueScheduler")
            .field("queued", &self.len())
            .finish()
    }
}

/// Spawns every task onto the current tokio `LocalSet`.
///
/// Scheduling panics if called outside a `LocalSet`. Task errors have no
/// caller to return to, so they are logged.
#[cfg(feature = "tokio")]
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalTaskScheduler;

#[cfg(feature = "tokio")]
impl Scheduler for LocalTaskScheduler {
    fn schedule(&self, task: Task) -> Result<()> {
        tokio::task::spawn_local(async move {
            if let Err(err) = task() {
                tracing::error!(error = %err, "spawned effect failed");
            }
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn immediate_scheduler_runs_now() {
        let ran = Rc::new(Cell::new(false));
        let flag = ran.clone();

        ImmediateScheduler
            .schedule(Box::new(move || {
                flag.set(true);
                Ok(())
            }))
            .unwrap();

        assert!(ran.get());
    }

    #[test]
    fn immediate_scheduler_returns_task_error() {
        let err = ImmediateScheduler
            .schedule(Box::new(|| Err(ReactiveError::callback("boom"))))
            .unwrap_err();
        assert_eq!(err.to_string(), "callback failed: boom");
    }

    #[test]
    fn queue_scheduler_defers_until_flush() {
        let queue = Rc::new(QueueScheduler::new());
        let ran = Rc::new(Cell::new(0));

        for _ in 0..3 {
            let counter = ran.clone();
            queue
                .schedule(Box::new(move || {
                    counter.set(counter.get() + 1);
                    Ok(())
                }))
                .unwrap();
        }

        assert_eq!(queue.len(), 3);
        assert_eq!(ran.get(), 0);

        assert_eq!(queue.flush().unwrap(), 3);
        assert_eq!(ran.get(), 3);
        assert!(queue.is_empty());
    }

    #[test]
    fn queue_scheduler_drains_tasks_queued_while_flushing() {
        let queue = Rc::new(QueueScheduler::new());
        let ran = Rc::new(Cell::new(0));

        let inner = queue.clone();
        let counter = ran.clone();
        queue
            .schedule(Box::new(move || {
                inner.schedule(Box::new(move || {
                    counter.set(counter.get() + 1);
                    Ok(())
                }))
            }))
            .unwrap();

        assert_eq!(queue.flush().unwrap(), 2);
        assert_eq!(ran.get(), 1);
    }

    #[test]
    fn queue_scheduler_bounds_runaway_requeueing() {
        fn requeue(queue: Rc<QueueScheduler>) -> Task {
            Box::new(move || {
                let next = requeue(queue.clone());
                queue.schedule(next)
            })
        }

        let queue = Rc::new(QueueScheduler::with_limit(4));
        queue.schedule(requeue(queue.clone())).unwrap();

        let err = queue.flush().unwrap_err();
        assert!(matches!(err, ReactiveError::FlushLimit { limit: 4 }));
    }

    #[cfg(feature = "tokio")]
    #[tokio::test]
    async fn local_task_scheduler_runs_on_local_set() {
        let local = tokio::task::LocalSet::new();
        let ran = Rc::new(Cell::new(false));

        let flag = ran.clone();
        local
            .run_until(async move {
                LocalTaskScheduler
                    .schedule(Box::new(move || {
                        flag.set(true);
                        Ok(())
                    }))
                    .unwrap();
                tokio::task::yield_now().await;
            })
            .await;
        local.await;

        assert!(ran.get());
    }
}
