//! Live-surface backend.
//!
//! The reconciler never touches a concrete surface. It drives a [`Host`],
//! which owns the live nodes and exposes the handful of mutations a tree
//! diff needs. Node handles are cheap, cloneable references into the host.

use std::fmt;
use std::rc::Rc;

use super::vnode::Event;

/// A listener installed on a live node.
pub type Listener = Rc<dyn Fn(&Event)>;

/// Operations the reconciler performs on a live surface.
pub trait Host {
    /// Handle to a live node.
    type Node: Clone + PartialEq + fmt::Debug;

    /// Create a detached element.
    fn create_element(&mut self, tag: &str) -> Self::Node;

    /// Create a detached text node.
    fn create_text(&mut self, text: &str) -> Self::Node;

    /// Replace the content of a text node.
    fn set_text(&mut self, node: &Self::Node, text: &str);

    /// Set or overwrite an attribute.
    fn set_attribute(&mut self, node: &Self::Node, name: &str, value: &str);

    /// Remove an attribute. Removing a missing attribute is a no-op.
    fn remove_attribute(&mut self, node: &Self::Node, name: &str);

    /// Install the listener for `event`, replacing any previous one.
    fn add_listener(&mut self, node: &Self::Node, event: &str, listener: Listener);

    /// Remove the listener for `event`.
    fn remove_listener(&mut self, node: &Self::Node, event: &str);

    /// Insert `child` into `parent` before `anchor`, or at the end when
    /// `anchor` is `None`. A child that is already attached somewhere is
    /// moved.
    fn insert_before(&mut self, parent: &Self::Node, child: &Self::Node, anchor: Option<&Self::Node>);

    /// Detach `child` from `parent`.
    fn remove_child(&mut self, parent: &Self::Node, child: &Self::Node);

    /// The node following `node` under its parent.
    fn next_sibling(&self, node: &Self::Node) -> Option<Self::Node>;

    /// Called once a detached node will never be used again.
    fn release(&mut self, _node: &Self::Node) {}
}
