//! In-Memory Host
//!
//! A [`Host`] that keeps live nodes in a vector and records every mutation
//! as a [`HostOp`]. Tests use the log to assert how much work a patch did,
//! and [`MemoryHost::to_html`] to snapshot the resulting tree.

use std::fmt;

use indexmap::IndexMap;
use serde::Serialize;

use super::host::{Host, Listener};
use super::vnode::Event;

/// Handle to a node of a [`MemoryHost`]. Ids are never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct MemoryNodeId(usize);

impl MemoryNodeId {
    /// Get the raw index.
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for MemoryNodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One recorded host mutation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum HostOp {
    CreateElement {
        node: MemoryNodeId,
        tag: String,
    },
    CreateText {
        node: MemoryNodeId,
        text: String,
    },
    SetText {
        node: MemoryNodeId,
        text: String,
    },
    SetAttribute {
        node: MemoryNodeId,
        name: String,
        value: String,
    },
    RemoveAttribute {
        node: MemoryNodeId,
        name: String,
    },
    AddListener {
        node: MemoryNodeId,
        event: String,
    },
    RemoveListener {
        node: MemoryNodeId,
        event: String,
    },
    Insert {
        parent: MemoryNodeId,
        node: MemoryNodeId,
        anchor: Option<MemoryNodeId>,
    },
    Remove {
        parent: MemoryNodeId,
        node: MemoryNodeId,
    },
}

impl HostOp {
    /// Whether this operation places a node (an insert or a move).
    pub fn is_insert(&self) -> bool {
        matches!(self, Self::Insert { .. })
    }

    /// Whether this operation detaches a node.
    pub fn is_remove(&self) -> bool {
        matches!(self, Self::Remove { .. })
    }
}

enum NodeData {
    Element {
        tag: String,
        attributes: IndexMap<String, String>,
        listeners: IndexMap<String, Listener>,
    },
    Text(String),
}

struct MemoryNode {
    data: NodeData,
    parent: Option<MemoryNodeId>,
    children: Vec<MemoryNodeId>,
    released: bool,
}

impl MemoryNode {
    fn new(data: NodeData) -> Self {
        Self {
            data,
            parent: None,
            children: Vec::new(),
            released: false,
        }
    }
}

/// A host backed by plain memory.
#[derive(Default)]
pub struct MemoryHost {
    nodes: Vec<MemoryNode>,
    ops: Vec<HostOp>,
}

impl MemoryHost {
    /// Create an empty host.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a root element to mount into. Not recorded in the log.
    pub fn container(&mut self) -> MemoryNodeId {
        self.alloc(NodeData::Element {
            tag: "root".to_string(),
            attributes: IndexMap::new(),
            listeners: IndexMap::new(),
        })
    }

    fn alloc(&mut self, data: NodeData) -> MemoryNodeId {
        let id = MemoryNodeId(self.nodes.len());
        self.nodes.push(MemoryNode::new(data));
        id
    }

    fn node(&self, id: MemoryNodeId) -> Option<&MemoryNode> {
        self.nodes.get(id.0)
    }

    fn node_mut(&mut self, id: MemoryNodeId) -> Option<&mut MemoryNode> {
        self.nodes.get_mut(id.0)
    }

    /// Every mutation recorded since the last [`take_ops`](Self::take_ops)
    /// or [`clear_ops`](Self::clear_ops).
    pub fn ops(&self) -> &[HostOp] {
        &self.ops
    }

    /// Drain the mutation log.
    pub fn take_ops(&mut self) -> Vec<HostOp> {
        std::mem::take(&mut self.ops)
    }

    /// Discard the mutation log.
    pub fn clear_ops(&mut self) {
        self.ops.clear();
    }

    /// Number of nodes ever created, including released ones.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Children of `id`, in order.
    pub fn children(&self, id: MemoryNodeId) -> &[MemoryNodeId] {
        self.node(id).map_or(&[], |node| node.children.as_slice())
    }

    /// Parent of `id`, if attached.
    pub fn parent(&self, id: MemoryNodeId) -> Option<MemoryNodeId> {
        self.node(id).and_then(|node| node.parent)
    }

    /// Content of a text node.
    pub fn text(&self, id: MemoryNodeId) -> Option<&str> {
        match &self.node(id)?.data {
            NodeData::Text(text) => Some(text),
            NodeData::Element { .. } => None,
        }
    }

    /// Tag of an element.
    pub fn tag(&self, id: MemoryNodeId) -> Option<&str> {
        match &self.node(id)?.data {
            NodeData::Element { tag, .. } => Some(tag),
            NodeData::Text(_) => None,
        }
    }

    /// Value of an attribute.
    pub fn attribute(&self, id: MemoryNodeId, name: &str) -> Option<&str> {
        match &self.node(id)?.data {
            NodeData::Element { attributes, .. } => attributes.get(name).map(String::as_str),
            NodeData::Text(_) => None,
        }
    }

    /// Number of listeners installed on `id`.
    pub fn listener_count(&self, id: MemoryNodeId) -> usize {
        match self.node(id).map(|node| &node.data) {
            Some(NodeData::Element { listeners, .. }) => listeners.len(),
            _ => 0,
        }
    }

    /// The listener for `event` on `id`.
    ///
    /// Cloning the listener out lets the caller release its borrow of the
    /// host before invoking it.
    pub fn listener(&self, id: MemoryNodeId, event: &str) -> Option<Listener> {
        match &self.node(id)?.data {
            NodeData::Element { listeners, .. } => listeners.get(event).cloned(),
            NodeData::Text(_) => None,
        }
    }

    /// Deliver an event to `id`. Returns whether a listener ran.
    pub fn dispatch(&self, id: MemoryNodeId, event: &str, detail: serde_json::Value) -> bool {
        match self.listener(id, event) {
            Some(listener) => {
                listener(&Event::new(event).with_detail(detail));
                true
            }
            None => false,
        }
    }

    /// Whether the reconciler has released `id`.
    pub fn is_released(&self, id: MemoryNodeId) -> bool {
        self.node(id).is_some_and(|node| node.released)
    }

    /// Render `id` and its subtree as HTML.
    pub fn to_html(&self, id: MemoryNodeId) -> String {
        let mut out = String::new();
        self.write_html(id, &mut out);
        out
    }

    /// Render the children of `id` as HTML, without `id` itself.
    pub fn inner_html(&self, id: MemoryNodeId) -> String {
        let mut out = String::new();
        for &child in self.children(id) {
            self.write_html(child, &mut out);
        }
        out
    }

    fn write_html(&self, id: MemoryNodeId, out: &mut String) {
        let Some(node) = self.node(id) else {
            return;
        };
        match &node.data {
            NodeData::Text(text) => out.push_str(&html_escape(text)),
            NodeData::Element {
                tag, attributes, ..
            } => {
                out.push('<');
                out.push_str(tag);
                for (name, value) in attributes {
                    out.push(' ');
                    out.push_str(name);
                    if !value.is_empty() {
                        out.push_str("=\"");
                        out.push_str(&html_escape(value));
                        out.push('"');
                    }
                }
                out.push('>');
                for &child in &node.children {
                    self.write_html(child, out);
                }
                out.push_str("</");
                out.push_str(tag);
                out.push('>');
            }
        }
    }

    fn detach(&mut self, child: MemoryNodeId) {
        if let Some(parent) = self.parent(child) {
            if let Some(node) = self.node_mut(parent) {
                node.children.retain(|&c| c != child);
            }
        }
        if let Some(node) = self.node_mut(child) {
            node.parent = None;
        }
    }
}

impl Host for MemoryHost {
    type Node = MemoryNodeId;

    fn create_element(&mut self, tag: &str) -> MemoryNodeId {
        let node = self.alloc(NodeData::Element {
            tag: tag.to_string(),
            attributes: IndexMap::new(),
            listeners: IndexMap::new(),
        });
        self.ops.push(HostOp::CreateElement {
            node,
            tag: tag.to_string(),
        });
        node
    }

    fn create_text(&mut self, text: &str) -> MemoryNodeId {
        let node = self.alloc(NodeData::Text(text.to_string()));
        self.ops.push(HostOp::CreateText {
            node,
            text: text.to_string(),
        });
        node
    }

    fn set_text(&mut self, node: &MemoryNodeId, text: &str) {
        if let Some(MemoryNode {
            data: NodeData::Text(content),
            ..
        }) = self.node_mut(*node)
        {
            *content = text.to_string();
        }
        self.ops.push(HostOp::SetText {
            node: *node,
            text: text.to_string(),
        });
    }

    fn set_attribute(&mut self, node: &MemoryNodeId, name: &str, value: &str) {
        if let Some(MemoryNode {
            data: NodeData::Element { attributes, .. },
            ..
        }) = self.node_mut(*node)
        {
            attributes.insert(name.to_string(), value.to_string());
        }
        self.ops.push(HostOp::SetAttribute {
            node: *node,
            name: name.to_string(),
            value: value.to_string(),
        });
    }

    fn remove_attribute(&mut self, node: &MemoryNodeId, name: &str) {
        if let Some(MemoryNode {
            data: NodeData::Element { attributes, .. },
            ..
        }) = self.node_mut(*node)
        {
            attributes.shift_remove(name);
        }
        self.ops.push(HostOp::RemoveAttribute {
            node: *node,
            name: name.to_string(),
        });
    }

    fn add_listener(&mut self, node: &MemoryNodeId, event: &str, listener: Listener) {
        if let Some(MemoryNode {
            data: NodeData::Element { listeners, .. },
            ..
        }) = self.node_mut(*node)
        {
            listeners.insert(event.to_string(), listener);
        }
        self.ops.push(HostOp::AddListener {
            node: *node,
            event: event.to_string(),
        });
    }

    fn remove_listener(&mut self, node: &MemoryNodeId, event: &str) {
        if let Some(MemoryNode {
            data: NodeData::Element { listeners, .. },
            ..
        }) = self.node_mut(*node)
        {
            listeners.shift_remove(event);
        }
        self.ops.push(HostOp::RemoveListener {
            node: *node,
            event: event.to_string(),
        });
    }

    fn insert_before(
        &mut self,
        parent: &MemoryNodeId,
        child: &MemoryNodeId,
        anchor: Option<&MemoryNodeId>,
    ) {
        self.detach(*child);
        if let Some(node) = self.node_mut(*parent) {
            let position = anchor
                .and_then(|anchor| node.children.iter().position(|c| c == anchor))
                .unwrap_or(node.children.len());
            node.children.insert(position, *child);
        }
        if let Some(node) = self.node_mut(*child) {
            node.parent = Some(*parent);
        }
        self.ops.push(HostOp::Insert {
            parent: *parent,
            node: *child,
            anchor: anchor.copied(),
        });
    }

    fn remove_child(&mut self, parent: &MemoryNodeId, child: &MemoryNodeId) {
        if self.parent(*child) == Some(*parent) {
            self.detach(*child);
        } else {
            tracing::warn!(%parent, %child, "remove_child on a node that is not a child");
        }
        self.ops.push(HostOp::Remove {
            parent: *parent,
            node: *child,
        });
    }

    fn next_sibling(&self, node: &MemoryNodeId) -> Option<MemoryNodeId> {
        let parent = self.parent(*node)?;
        let siblings = self.children(parent);
        let position = siblings.iter().position(|c| c == node)?;
        siblings.get(position + 1).copied()
    }

    fn release(&mut self, node: &MemoryNodeId) {
        if let Some(node) = self.node_mut(*node) {
            node.released = true;
            if let NodeData::Element { listeners, .. } = &mut node.data {
                listeners.clear();
            }
        }
    }
}

impl fmt::Debug for MemoryHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryHost")
            .field("nodes", &self.nodes.len())
            .field("ops", &self.ops.len())
            .finish()
    }
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#x27;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn insert_before_anchor_and_move() {
        let mut host = MemoryHost::new();
        let root = host.container();
        let a = host.create_text("a");
        let b = host.create_text("b");
        let c = host.create_text("c");

        host.insert_before(&root, &a, None);
        host.insert_before(&root, &c, None);
        host.insert_before(&root, &b, Some(&c));
        assert_eq!(host.children(root), &[a, b, c]);

        host.insert_before(&root, &c, Some(&a));
        assert_eq!(host.children(root), &[c, a, b]);
        assert_eq!(host.next_sibling(&a), Some(b));
        assert_eq!(host.next_sibling(&b), None);
    }

    #[test]
    fn html_is_escaped() {
        let mut host = MemoryHost::new();
        let root = host.container();
        let p = host.create_element("p");
        let t = host.create_text("1 < 2 & \"ok\"");
        host.set_attribute(&p, "title", "a>b");
        host.set_attribute(&p, "hidden", "");
        host.insert_before(&p, &t, None);
        host.insert_before(&root, &p, None);

        assert_eq!(
            host.inner_html(root),
            "<p title=\"a&gt;b\" hidden>1 &lt; 2 &amp; &quot;ok&quot;</p>"
        );
    }

    #[test]
    fn container_is_not_logged() {
        let mut host = MemoryHost::new();
        host.container();
        assert!(host.ops().is_empty());

        let node = host.create_element("div");
        assert_eq!(
            host.take_ops(),
            vec![HostOp::CreateElement {
                node,
                tag: "div".to_string()
            }]
        );
        assert!(host.ops().is_empty());
    }

    #[test]
    fn dispatch_reaches_listener() {
        let mut host = MemoryHost::new();
        let button = host.create_element("button");
        let clicks = Rc::new(Cell::new(0));

        let counter = clicks.clone();
        host.add_listener(
            &button,
            "click",
            Rc::new(move |event: &Event| {
                assert_eq!(event.detail["x"], 3);
                counter.set(counter.get() + 1);
            }),
        );

        assert!(host.dispatch(button, "click", serde_json::json!({ "x": 3 })));
        assert!(!host.dispatch(button, "keydown", serde_json::Value::Null));
        assert_eq!(clicks.get(), 1);

        host.release(&button);
        assert!(host.is_released(button));
        assert_eq!(host.listener_count(button), 0);
    }

    #[test]
    fn ops_serialize_with_tag() {
        let op = HostOp::Insert {
            parent: MemoryNodeId(0),
            node: MemoryNodeId(2),
            anchor: None,
        };
        assert_eq!(
            serde_json::to_value(&op).unwrap(),
            serde_json::json!({ "op": "insert", "parent": 0, "node": 2, "anchor": null })
        );
    }
}
