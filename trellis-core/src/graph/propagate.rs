//! Graph Storage and Push Propagation
//!
//! [`Graph`] owns every node of one runtime, keeps the source/observer
//! relation bidirectional, and implements the push phase.
//!
//! # Algorithm
//!
//! When a source changes, [`Graph::propagate_dirty`] walks its observers
//! breadth-first with an explicit queue:
//!
//! 1. Direct observers of the source are escalated to `Dirty`.
//! 2. Everything reachable beyond them is escalated to `Check`.
//! 3. Each node is walked at most once per propagation, so diamonds do not
//!    multiply the work.
//! 4. Every effect whose state changed is handed back to the caller so its
//!    scheduling hook can fire once the graph borrow is released. An effect
//!    that was already pending is not woken twice.
//!
//! The pull phase (verifying `Check` nodes and recomputing `Dirty` ones)
//! needs to call back into derived values, so it lives on the runtime.

use std::collections::{HashMap, HashSet, VecDeque};
use std::rc::{Rc, Weak};

use smallvec::SmallVec;

use super::node::{Computation, Node, NodeId, NodeKind, NodeState};

/// The dependency graph of one runtime.
#[derive(Debug, Default)]
pub struct Graph {
    /// All nodes in the graph, indexed by ID.
    nodes: HashMap<NodeId, Node>,

    /// Next raw id to hand out.
    next_id: u64,
}

impl Graph {
    /// Create a new empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node of the given kind and return its id.
    pub fn add_node(&mut self, kind: NodeKind) -> NodeId {
        let id = NodeId::from_raw(self.next_id);
        self.next_id += 1;
        self.nodes.insert(id, Node::new(kind));
        id
    }

    pub(crate) fn attach(&mut self, id: NodeId, computation: Weak<dyn Computation>) {
        if let Some(node) = self.nodes.get_mut(&id) {
            node.attach(computation);
        }
    }

    /// Remove a node from the graph.
    ///
    /// Also removes all edges involving this node.
    pub fn remove_node(&mut self, id: NodeId) {
        self.clear_sources(id);
        if let Some(node) = self.nodes.remove(&id) {
            for observer in node.observers() {
                if let Some(observer) = self.nodes.get_mut(observer) {
                    observer.remove_source(id);
                }
            }
        }
    }

    /// Get a reference to a node.
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(&id)
    }

    /// State of a node. Missing nodes read as clean.
    pub fn state(&self, id: NodeId) -> NodeState {
        self.nodes.get(&id).map_or(NodeState::Clean, Node::state)
    }

    /// Get the total number of nodes in the graph.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Record that `observer` read `source` during its current run.
    ///
    /// Returns `false` if the edge already exists, so repeated reads of the
    /// same node inside one run register a single edge.
    pub fn link(&mut self, source: NodeId, observer: NodeId) -> bool {
        if source == observer || !self.nodes.contains_key(&observer) {
            return false;
        }
        let Some(source_node) = self.nodes.get_mut(&source) else {
            return false;
        };
        if !source_node.add_observer(observer) {
            return false;
        }
        if let Some(observer_node) = self.nodes.get_mut(&observer) {
            observer_node.push_source(source);
        }
        true
    }

    /// Tear down every edge from `observer` to its sources.
    pub fn clear_sources(&mut self, observer: NodeId) {
        let Some(node) = self.nodes.get_mut(&observer) else {
            return;
        };
        for source in node.take_sources() {
            if let Some(source) = self.nodes.get_mut(&source) {
                source.remove_observer(observer);
            }
        }
    }

    /// Record the current version of every source of `observer`.
    pub fn snapshot_sources(&mut self, observer: NodeId) {
        let Some(node) = self.nodes.get(&observer) else {
            return;
        };
        let versions: SmallVec<[u64; 4]> = node
            .sources()
            .iter()
            .map(|source| self.nodes.get(source).map_or(0, Node::version))
            .collect();
        if let Some(node) = self.nodes.get_mut(&observer) {
            node.set_source_versions(versions);
        }
    }

    /// First source of `id`, in read order, that is not clean.
    pub fn first_pending_source(&self, id: NodeId) -> Option<NodeId> {
        let node = self.nodes.get(&id)?;
        node.sources().iter().copied().find(|source| {
            self.nodes
                .get(source)
                .is_some_and(|s| s.kind() != NodeKind::Effect && !s.is_clean())
        })
    }

    /// Whether any source's version moved since the last snapshot.
    pub fn sources_changed(&self, id: NodeId) -> bool {
        let Some(node) = self.nodes.get(&id) else {
            return false;
        };
        node.sources()
            .iter()
            .zip(node.source_versions())
            .any(|(source, seen)| {
                self.nodes
                    .get(source)
                    .map_or(true, |source| source.version() != *seen)
            })
    }

    /// Mark everything downstream of `source` and collect the effects to wake.
    ///
    /// Direct observers become `Dirty`, transitive ones `Check`. States only
    /// escalate. Nodes that were already stale are still walked, so a clean
    /// observer behind a stale derived node is not missed.
    ///
    /// The returned computations belong to effects whose state changed; the
    /// caller fires their scheduling hook.
    pub(crate) fn propagate_dirty(&mut self, source: NodeId) -> Vec<Rc<dyn Computation>> {
        let mut woken = Vec::new();
        let mut visited = HashSet::new();
        let mut queue: VecDeque<(NodeId, NodeState)> = match self.nodes.get(&source) {
            Some(node) => node
                .observers()
                .iter()
                .map(|id| (*id, NodeState::Dirty))
                .collect(),
            None => return woken,
        };

        while let Some((id, state)) = queue.pop_front() {
            let Some(node) = self.nodes.get_mut(&id) else {
                continue;
            };
            if node.escalate(state) && node.kind() == NodeKind::Effect {
                if let Some(computation) = node.computation() {
                    woken.push(computation);
                }
            }
            if !visited.insert(id) {
                continue;
            }
            queue.extend(node.observers().iter().map(|id| (*id, NodeState::Check)));
        }

        tracing::trace!(%source, woken = woken.len(), "propagated dirty state");
        woken
    }
}
