//! Trellis Core
//!
//! This crate provides the core engines of the Trellis UI framework.
//! It implements:
//!
//! - Reactive primitives (signals, memos, effects) over a glitch-free
//!   push-pull dependency graph
//! - Batched, deduplicated effect scheduling
//! - A view-tree IR and a reconciler with keyed, minimum-move list diffing
//! - A renderer contract over a pluggable host, plus an in-memory host
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `graph`: dependency nodes, edges and the push phase
//! - `reactive`: the runtime, signals, memos, effects, batching, schedulers
//! - `render`: view trees, components, the reconciler and the renderer
//! - `config`: tunables for the runtime and the renderer
//! - `error`: error types
//!
//! Everything is single-threaded. Each [`Runtime`](reactive::Runtime) is
//! independent of every other one.
//!
//! # Example
//!
//! ```rust
//! use std::cell::RefCell;
//! use std::rc::Rc;
//! use trellis_core::reactive::Runtime;
//!
//! let rt = Runtime::new();
//!
//! // Create a signal
//! let count = rt.signal(0);
//!
//! // Create a derived value
//! let doubled = {
//!     let count = count.clone();
//!     rt.computed(move || count.get() * 2)
//! };
//!
//! // Create an effect
//! let seen = Rc::new(RefCell::new(Vec::new()));
//! let _effect = {
//!     let (count, doubled, seen) = (count.clone(), doubled.clone(), seen.clone());
//!     rt.autorun(move || {
//!         seen.borrow_mut().push((count.get(), doubled.get().unwrap()));
//!     })
//!     .unwrap()
//! };
//!
//! // Update the signal
//! count.set(5).unwrap();
//! assert_eq!(*seen.borrow(), vec![(0, 0), (5, 10)]);
//! ```

pub mod config;
pub mod error;
pub mod graph;
pub mod reactive;
pub mod render;

pub use config::{RenderConfig, RuntimeConfig};
pub use error::{ReactiveError, RenderError, Result};
