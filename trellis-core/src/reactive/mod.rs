//! Reactive Primitives
//!
//! This module implements the core reactive system: signals, memos, and effects.
//! These primitives form the foundation of Trellis's fine-grained reactivity.
//!
//! # Concepts
//!
//! ## Signals
//!
//! A Signal is a container for mutable state. When a signal's value is read
//! within a tracking context (such as a memo or effect), the signal automatically
//! registers that context as a dependent. When the signal's value changes, all
//! dependents are notified.
//!
//! ## Memos
//!
//! A Memo is a derived value that caches its result. It re-evaluates only when
//! one of its dependencies changes. Memos are useful for expensive computations
//! that should not be repeated unnecessarily.
//!
//! ## Effects
//!
//! An Effect is a side-effecting computation that runs whenever its dependencies
//! change. Effects are used to synchronize reactive state with external systems,
//! such as updating a rendered view or logging.
//!
//! # Implementation Notes
//!
//! Dependency tracking is automatic: reading a signal or memo while a memo or
//! effect runs links the two. The "currently running" stack lives on the
//! [`Runtime`], not in global state, so independent runtimes never see each
//! other's reads.
//!
//! Updates are push-pull. A write pushes staleness marks through the graph;
//! reads pull, verifying and recomputing only what is stale. Effects run
//! after the outermost batch closes, so none of them can observe a partially
//! propagated write.

mod batch;
mod context;
mod effect;
mod memo;
mod observable;
mod runtime;
mod scheduler;
mod signal;
mod subscriber;

pub use batch::{BatchCoordinator, BatchScope, BatchTask};
pub use effect::{Cleanup, Effect, EffectOptions, IntoCleanup};
pub use memo::Memo;
pub use observable::{default_equality, same_value, Equality, Observable};
pub use runtime::Runtime;
#[cfg(feature = "tokio")]
pub use scheduler::LocalTaskScheduler;
pub use scheduler::{ImmediateScheduler, QueueScheduler, Scheduler, Task};
pub use signal::Signal;
pub use subscriber::{Subscription, SubscriptionId};
