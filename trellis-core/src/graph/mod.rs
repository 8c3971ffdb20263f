//! Dependency Graph
//!
//! This module implements the dependency graph that tracks relationships
//! between reactive values and computations.
//!
//! # Overview
//!
//! - Nodes represent reactive values (signals) or computations (memos, effects)
//! - Edges represent dependencies: if A reads B, B is a source of A and A is
//!   an observer of B
//!
//! Both directions are stored and kept in sync, so the push phase can walk
//! observers and the pull phase can walk sources.
//!
//! # Design Decisions
//!
//! 1. The graph is owned by one runtime instance, not by global state, so
//!    independent runtimes never interfere.
//!
//! 2. The graph is indexed by node ID for O(1) lookups.
//!
//! 3. Observer sets are insertion-ordered hash sets, which gives O(1)
//!    membership checks and O(1) swap-and-pop removal when an observer
//!    tears down its edges.
//!
//! 4. Traversals use explicit queues and stacks, never recursion, so long
//!    chains cannot exhaust the call stack.

mod node;
mod propagate;

pub(crate) use node::Computation;
pub use node::{Node, NodeId, NodeKind, NodeState};
pub use propagate::Graph;
