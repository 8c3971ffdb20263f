//! Graph Nodes
//!
//! This module defines the node type that lives in the dependency graph,
//! together with the [`Computation`] seam through which the graph reaches
//! back into the derived values and effects that own its nodes.

use std::fmt;
use std::rc::{Rc, Weak};

use indexmap::IndexSet;
use smallvec::SmallVec;

use crate::error::ReactiveError;

/// Unique identifier for a node in the dependency graph.
///
/// Ids are allocated by their [`Graph`](super::Graph) from a monotonic
/// counter and are never reused within one graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

impl NodeId {
    pub(crate) fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The kind of node in the dependency graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// A source node (signal). These are the roots of the graph.
    /// They have no sources, only observers.
    Source,

    /// A derived node (memo). These have sources and may have observers.
    /// They cache their computed value.
    Derived,

    /// An effect node. These are leaves of the graph.
    /// They have sources but no observers.
    Effect,
}

/// Freshness of a node.
///
/// The variants are ordered, so escalating a node is taking the maximum of
/// its current state and the requested one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum NodeState {
    /// The node's value is up-to-date.
    Clean,

    /// An indirect source may have changed. Verify before trusting.
    Check,

    /// A direct source changed. The node must rerun.
    Dirty,
}

/// Hooks the graph uses to reach the owner of a node.
///
/// Derived values implement [`recompute`](Computation::recompute); effects
/// implement [`schedule`](Computation::schedule). The graph only keeps weak
/// references, so dropping the owner is enough to retire the hook.
pub(crate) trait Computation {
    /// Rerun a derived computation. Returns whether its value changed.
    fn recompute(&self) -> Result<bool, ReactiveError> {
        Ok(false)
    }

    /// Called during the push phase when an effect node is dirtied.
    fn schedule(self: Rc<Self>) {}
}

/// A node in the dependency graph.
pub struct Node {
    /// What kind of node this is.
    kind: NodeKind,

    /// Current freshness.
    state: NodeState,

    /// Bumped every time the node's value changes.
    version: u64,

    /// Nodes this node read during its last run, in read order.
    sources: SmallVec<[NodeId; 4]>,

    /// Version of each source as of the end of the last run.
    source_versions: SmallVec<[u64; 4]>,

    /// Nodes that read this node.
    observers: IndexSet<NodeId>,

    /// Owner hook for derived values and effects.
    computation: Option<Weak<dyn Computation>>,
}

impl Node {
    /// Create a new node with the given kind.
    pub fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            state: match kind {
                NodeKind::Source => NodeState::Clean,
                // Start dirty to force the first computation.
                NodeKind::Derived | NodeKind::Effect => NodeState::Dirty,
            },
            version: 0,
            sources: SmallVec::new(),
            source_versions: SmallVec::new(),
            observers: IndexSet::new(),
            computation: None,
        }
    }

    /// Get the node's kind.
    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    /// Get the current state.
    pub fn state(&self) -> NodeState {
        self.state
    }

    /// Get the current version.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Check if the node needs any processing.
    pub fn is_clean(&self) -> bool {
        self.state == NodeState::Clean
    }

    /// Nodes this node depends on.
    pub fn sources(&self) -> &[NodeId] {
        &self.sources
    }

    /// Nodes that depend on this node.
    pub fn observers(&self) -> &IndexSet<NodeId> {
        &self.observers
    }

    /// Raise the state to at least `state`. Returns `true` if it changed.
    pub fn escalate(&mut self, state: NodeState) -> bool {
        if state > self.state {
            self.state = state;
            true
        } else {
            false
        }
    }

    /// Mark the node as clean.
    pub fn mark_clean(&mut self) {
        self.state = NodeState::Clean;
    }

    /// Record a change of value.
    pub fn bump_version(&mut self) {
        self.version = self.version.wrapping_add(1);
    }

    pub(crate) fn attach(&mut self, computation: Weak<dyn Computation>) {
        self.computation = Some(computation);
    }

    pub(crate) fn computation(&self) -> Option<Rc<dyn Computation>> {
        self.computation.as_ref().and_then(Weak::upgrade)
    }

    pub(crate) fn push_source(&mut self, source: NodeId) {
        self.sources.push(source);
        self.source_versions.push(0);
    }

    pub(crate) fn take_sources(&mut self) -> SmallVec<[NodeId; 4]> {
        self.source_versions.clear();
        std::mem::take(&mut self.sources)
    }

    pub(crate) fn remove_source(&mut self, source: NodeId) {
        if let Some(index) = self.sources.iter().position(|id| *id == source) {
            self.sources.remove(index);
            self.source_versions.remove(index);
        }
    }

    pub(crate) fn source_versions(&self) -> &[u64] {
        &self.source_versions
    }

    pub(crate) fn set_source_versions(&mut self, versions: SmallVec<[u64; 4]>) {
        self.source_versions = versions;
    }

    pub(crate) fn add_observer(&mut self, observer: NodeId) -> bool {
        self.observers.insert(observer)
    }

    pub(crate) fn remove_observer(&mut self, observer: NodeId) {
        self.observers.swap_remove(&observer);
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("kind", &self.kind)
            .field("state", &self.state)
            .field("version", &self.version)
            .field("sources", &self.sources)
            .field("observers", &self.observers)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_node_starts_clean() {
        let node = Node::new(NodeKind::Source);
        assert_eq!(node.kind(), NodeKind::Source);
        assert!(node.is_clean());
    }

    #[test]
    fn derived_and_effect_nodes_start_dirty() {
        assert_eq!(Node::new(NodeKind::Derived).state(), NodeState::Dirty);
        assert_eq!(Node::new(NodeKind::Effect).state(), NodeState::Dirty);
    }

    #[test]
    fn state_never_downgrades_on_escalate() {
        let mut node = Node::new(NodeKind::Derived);
        node.mark_clean();

        assert!(node.escalate(NodeState::Check));
        assert_eq!(node.state(), NodeState::Check);

        assert!(node.escalate(NodeState::Dirty));
        assert!(!node.escalate(NodeState::Check));
        assert_eq!(node.state(), NodeState::Dirty);
    }

    #[test]
    fn version_wraps_on_overflow() {
        let mut node = Node::new(NodeKind::Source);
        node.version = u64::MAX;
        node.bump_version();
        assert_eq!(node.version(), 0);
    }

    #[test]
    fn observers_are_deduplicated() {
        let mut node = Node::new(NodeKind::Source);
        let observer = NodeId::from_raw(7);

        assert!(node.add_observer(observer));
        assert!(!node.add_observer(observer));
        assert_eq!(node.observers().len(), 1);

        node.remove_observer(observer);
        assert!(node.observers().is_empty());
    }
}
