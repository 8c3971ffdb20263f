//! Reconciler
//!
//! Turns view trees into live host nodes and keeps them in sync.
//!
//! # How Patching Works
//!
//! 1. Nodes of different type (tag, kind, component or key) are never
//!    patched into each other. The new node is mounted where the old one
//!    starts and the old one is removed.
//!
//! 2. Elements diff their props. Removed keys are cleared from the host.
//!    Event handlers live behind a per-element slot, so swapping a handler
//!    rebinds the slot without touching the host.
//!
//! 3. Children are diffed positionally unless some child on either side
//!    carries a key. Keyed lists reuse nodes by key (unkeyed siblings pair
//!    up in order) and move only the children outside the longest
//!    increasing subsequence of their old positions, which is the minimum
//!    number of moves.
//!
//! 4. Fragments have no host node of their own. Their record remembers the
//!    real parent and the host nodes of their members.
//!
//! The mount id of a patched node moves from the old tree to the new one.
//! The old tree is consumed.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use slabmap::SlabMap;

use super::component::RenderFn;
use super::host::{Host, Listener};
use super::lis::longest_increasing_subsequence;
use super::tag::TagPolicy;
use super::vnode::{Event, EventHandler, Key, MountId, PropValue, Props, VNode, VNodeKind};
use crate::config::RenderConfig;
use crate::error::{RenderError, Result};

type HandlerSlot = Rc<RefCell<EventHandler>>;

/// What the reconciler knows about one mounted tree node.
enum Mounted<N> {
    Element {
        node: N,
        /// Handler slots by prop name.
        listeners: IndexMap<String, HandlerSlot>,
    },
    Text {
        node: N,
    },
    Fragment {
        parent: N,
        members: Vec<N>,
    },
    Component {
        instance: RenderFn,
        /// Last render output. Taken out while it is being patched.
        rendered: Option<Box<VNode>>,
    },
}

/// Diffs view trees against a [`Host`].
pub struct Reconciler<H: Host> {
    host: H,
    mounts: SlabMap<Mounted<H::Node>>,
    tags: TagPolicy,
}

impl<H: Host> Reconciler<H> {
    /// Create a reconciler with the default configuration.
    pub fn new(host: H) -> Self {
        Self::with_config(host, &RenderConfig::default())
    }

    /// Create a reconciler with an explicit configuration.
    pub fn with_config(host: H, config: &RenderConfig) -> Self {
        Self {
            host,
            mounts: SlabMap::new(),
            tags: TagPolicy::new(config),
        }
    }

    /// Borrow the host.
    pub fn host(&self) -> &H {
        &self.host
    }

    /// Mutably borrow the host.
    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    /// Give the host back.
    pub fn into_host(self) -> H {
        self.host
    }

    /// Number of live mount records.
    pub fn mount_count(&self) -> usize {
        self.mounts.len()
    }

    /// Mount `vnode` under `parent`, before `anchor` (or at the end).
    ///
    /// # Errors
    ///
    /// [`RenderError::AlreadyMounted`] if `vnode` is mounted, tag errors,
    /// or an error from a component's render function. On error nothing
    /// stays attached.
    pub fn mount(&mut self, vnode: &mut VNode, parent: &H::Node, anchor: Option<&H::Node>) -> Result<()> {
        tracing::debug!(kind = kind_name(vnode), "mounting tree");
        self.mount_node(vnode, parent, anchor)
    }

    /// Patch the live nodes of `old` so they match `new`.
    ///
    /// `old` must be mounted under `parent`. `anchor` is where content goes
    /// if `old` ends up replaced and owns no host node to insert before.
    pub fn patch(
        &mut self,
        old: VNode,
        new: &mut VNode,
        parent: &H::Node,
        anchor: Option<&H::Node>,
    ) -> Result<()> {
        if old.mount.is_none() {
            return Err(RenderError::NotMounted.into());
        }
        self.patch_node(old, new, parent, anchor)
    }

    /// Remove the live nodes of `vnode` from `parent` and forget them.
    pub fn unmount(&mut self, vnode: &mut VNode, parent: &H::Node) -> Result<()> {
        if vnode.mount.is_none() {
            return Err(RenderError::NotMounted.into());
        }
        tracing::debug!(kind = kind_name(vnode), "unmounting tree");
        self.unmount_node(vnode, Some(parent));
        Ok(())
    }

    /// The top-level host nodes `vnode` owns, in document order.
    pub fn host_nodes(&self, vnode: &VNode) -> Vec<H::Node> {
        match vnode.mount.and_then(|id| self.mounts.get(id.0)) {
            Some(Mounted::Element { node, .. }) | Some(Mounted::Text { node }) => vec![node.clone()],
            Some(Mounted::Fragment { members, .. }) => members.clone(),
            Some(Mounted::Component {
                rendered: Some(rendered),
                ..
            }) => self.host_nodes(rendered),
            _ => Vec::new(),
        }
    }

    /// The first host node `vnode` owns.
    pub fn first_host_node(&self, vnode: &VNode) -> Option<H::Node> {
        match vnode.mount.and_then(|id| self.mounts.get(id.0))? {
            Mounted::Element { node, .. } | Mounted::Text { node } => Some(node.clone()),
            Mounted::Fragment { members, .. } => members.first().cloned(),
            Mounted::Component { rendered, .. } => self.first_host_node(rendered.as_deref()?),
        }
    }

    fn collect_host_nodes(&self, children: &[VNode]) -> Vec<H::Node> {
        children.iter().flat_map(|child| self.host_nodes(child)).collect()
    }

    /// First host node among `siblings`, falling back to `fallback`.
    fn anchor_among<'a>(
        &self,
        siblings: impl IntoIterator<Item = &'a VNode>,
        fallback: Option<&H::Node>,
    ) -> Option<H::Node> {
        siblings
            .into_iter()
            .find_map(|sibling| self.first_host_node(sibling))
            .or_else(|| fallback.cloned())
    }

    fn mount_node(&mut self, vnode: &mut VNode, parent: &H::Node, anchor: Option<&H::Node>) -> Result<()> {
        if vnode.mount.is_some() {
            return Err(RenderError::AlreadyMounted.into());
        }

        let record = match &mut vnode.kind {
            VNodeKind::Text(text) => {
                let node = self.host.create_text(text);
                self.host.insert_before(parent, &node, anchor);
                Mounted::Text { node }
            }
            VNodeKind::Element(element) => {
                self.tags.check(&element.tag)?;
                let node = self.host.create_element(&element.tag);
                let listeners = self.apply_props(&node, &element.props);
                if let Err(err) = self.mount_children(&mut element.children, &node) {
                    self.host.release(&node);
                    return Err(err);
                }
                self.host.insert_before(parent, &node, anchor);
                Mounted::Element { node, listeners }
            }
            VNodeKind::Fragment(children) => {
                for i in 0..children.len() {
                    if let Err(err) = self.mount_node(&mut children[i], parent, anchor) {
                        for child in children[..i].iter_mut().rev() {
                            self.unmount_node(child, Some(parent));
                        }
                        return Err(err);
                    }
                }
                Mounted::Fragment {
                    parent: parent.clone(),
                    members: self.collect_host_nodes(children),
                }
            }
            VNodeKind::Component(invocation) => {
                let instance = invocation.component.instantiate(&invocation.props);
                let mut rendered = instance(&invocation.props, &invocation.children)?;
                self.mount_node(&mut rendered, parent, anchor)?;
                Mounted::Component {
                    instance,
                    rendered: Some(Box::new(rendered)),
                }
            }
        };

        vnode.mount = Some(MountId(self.mounts.insert(record)));
        Ok(())
    }

    /// Mount `children` into a detached element, rolling back on error.
    fn mount_children(&mut self, children: &mut [VNode], node: &H::Node) -> Result<()> {
        for i in 0..children.len() {
            if let Err(err) = self.mount_node(&mut children[i], node, None) {
                for child in children[..i].iter_mut().rev() {
                    self.unmount_node(child, None);
                }
                return Err(err);
            }
        }
        Ok(())
    }

    /// Detach (when `parent` is given) and release everything `vnode` owns.
    fn unmount_node(&mut self, vnode: &mut VNode, parent: Option<&H::Node>) {
        let Some(id) = vnode.mount.take() else {
            return;
        };
        let Some(record) = self.mounts.remove(id.0) else {
            tracing::warn!(mount = id.0, "tree node refers to a missing mount record");
            return;
        };

        match record {
            Mounted::Element { node, .. } => {
                if let Some(parent) = parent {
                    self.host.remove_child(parent, &node);
                }
                if let VNodeKind::Element(element) = &mut vnode.kind {
                    for child in element.children.iter_mut().rev() {
                        self.unmount_node(child, None);
                    }
                }
                self.host.release(&node);
            }
            Mounted::Text { node } => {
                if let Some(parent) = parent {
                    self.host.remove_child(parent, &node);
                }
                self.host.release(&node);
            }
            Mounted::Fragment {
                parent: real_parent, ..
            } => {
                let detach_from = parent.map(|_| &real_parent);
                if let VNodeKind::Fragment(children) = &mut vnode.kind {
                    for child in children.iter_mut().rev() {
                        self.unmount_node(child, detach_from);
                    }
                }
            }
            Mounted::Component { rendered, .. } => {
                if let Some(mut rendered) = rendered {
                    self.unmount_node(&mut rendered, parent);
                }
            }
        }
    }

    fn patch_node(
        &mut self,
        old: VNode,
        new: &mut VNode,
        parent: &H::Node,
        anchor: Option<&H::Node>,
    ) -> Result<()> {
        let Some(id) = old.mount else {
            return self.mount_node(new, parent, anchor);
        };
        if new.mount.is_some() {
            return Err(RenderError::AlreadyMounted.into());
        }
        if !old.same_type(new) {
            return self.replace_node(old, new, parent, anchor);
        }

        new.mount = Some(id);
        match (old.kind, &mut new.kind) {
            (VNodeKind::Text(before), VNodeKind::Text(after)) => {
                if before != *after {
                    let node = self.node_of(id)?;
                    self.host.set_text(&node, after);
                }
            }
            (VNodeKind::Element(before), VNodeKind::Element(after)) => {
                let node = self.node_of(id)?;
                self.patch_props(id, &node, &before.props, &after.props);
                self.patch_children(before.children, &mut after.children, &node, None)?;
            }
            (VNodeKind::Fragment(before), VNodeKind::Fragment(after)) => {
                let result = self.patch_children(before, after, parent, anchor);
                let members = self.collect_host_nodes(after);
                if let Some(Mounted::Fragment {
                    parent: real_parent,
                    members: recorded,
                }) = self.mounts.get_mut(id.0)
                {
                    *real_parent = parent.clone();
                    *recorded = members;
                }
                result?;
            }
            (VNodeKind::Component(_), VNodeKind::Component(after)) => {
                let instance = match self.mounts.get(id.0) {
                    Some(Mounted::Component { instance, .. }) => Rc::clone(instance),
                    _ => return Err(RenderError::NotMounted.into()),
                };
                // A failed render leaves the previous output in place.
                let mut next = instance(&after.props, &after.children)?;

                let previous = match self.mounts.get_mut(id.0) {
                    Some(Mounted::Component { rendered, .. }) => rendered.take(),
                    _ => None,
                };
                let result = match previous {
                    Some(previous) => self.patch_node(*previous, &mut next, parent, anchor),
                    None => self.mount_node(&mut next, parent, anchor),
                };
                if let Some(Mounted::Component { rendered, .. }) = self.mounts.get_mut(id.0) {
                    *rendered = Some(Box::new(next));
                }
                result?;
            }
            // same_type guarantees matching kinds.
            _ => {}
        }
        Ok(())
    }

    /// Mount `new` where `old` starts, then remove `old`.
    fn replace_node(
        &mut self,
        mut old: VNode,
        new: &mut VNode,
        parent: &H::Node,
        anchor: Option<&H::Node>,
    ) -> Result<()> {
        tracing::trace!(
            from = kind_name(&old),
            to = kind_name(new),
            "replacing tree node"
        );
        let before = self.first_host_node(&old).or_else(|| anchor.cloned());
        let result = self.mount_node(new, parent, before.as_ref());
        self.unmount_node(&mut old, Some(parent));
        result
    }

    /// The host node of an element or text record.
    fn node_of(&self, id: MountId) -> Result<H::Node> {
        match self.mounts.get(id.0) {
            Some(Mounted::Element { node, .. }) | Some(Mounted::Text { node }) => Ok(node.clone()),
            _ => Err(RenderError::NotMounted.into()),
        }
    }

    fn listeners_mut(&mut self, id: MountId) -> Option<&mut IndexMap<String, HandlerSlot>> {
        match self.mounts.get_mut(id.0) {
            Some(Mounted::Element { listeners, .. }) => Some(listeners),
            _ => None,
        }
    }

    /// Install a listener that always calls whatever the slot holds.
    fn listen(&mut self, node: &H::Node, name: &str, handler: &EventHandler) -> HandlerSlot {
        let slot = Rc::new(RefCell::new(handler.clone()));
        let target = Rc::clone(&slot);
        let listener: Listener = Rc::new(move |event: &Event| {
            let handler = target.borrow().clone();
            handler.call(event);
        });
        self.host.add_listener(node, &event_name(name), listener);
        slot
    }

    fn apply_props(&mut self, node: &H::Node, props: &Props) -> IndexMap<String, HandlerSlot> {
        let mut listeners = IndexMap::new();
        for (name, value) in props {
            match value {
                PropValue::Handler(handler) => {
                    let slot = self.listen(node, name, handler);
                    listeners.insert(name.clone(), slot);
                }
                other => {
                    if let Some(attribute) = other.to_attribute() {
                        self.host.set_attribute(node, name, &attribute);
                    }
                }
            }
        }
        listeners
    }

    fn unlisten(&mut self, id: MountId, node: &H::Node, name: &str) {
        if let Some(listeners) = self.listeners_mut(id) {
            listeners.shift_remove(name);
        }
        self.host.remove_listener(node, &event_name(name));
    }

    fn patch_props(&mut self, id: MountId, node: &H::Node, before: &Props, after: &Props) {
        for (name, value) in after {
            let previous = before.get(name);
            if previous.is_some_and(|previous| previous.same(value)) {
                continue;
            }

            match value {
                PropValue::Handler(handler) => {
                    let slot = self.listeners_mut(id).and_then(|listeners| listeners.get(name).cloned());
                    if let Some(slot) = slot {
                        *slot.borrow_mut() = handler.clone();
                        continue;
                    }
                    if previous.and_then(PropValue::to_attribute).is_some() {
                        self.host.remove_attribute(node, name);
                    }
                    let slot = self.listen(node, name, handler);
                    if let Some(listeners) = self.listeners_mut(id) {
                        listeners.insert(name.clone(), slot);
                    }
                }
                other => {
                    if previous.is_some_and(PropValue::is_handler) {
                        self.unlisten(id, node, name);
                    }
                    match other.to_attribute() {
                        Some(attribute) => self.host.set_attribute(node, name, &attribute),
                        None => {
                            if previous.and_then(PropValue::to_attribute).is_some() {
                                self.host.remove_attribute(node, name);
                            }
                        }
                    }
                }
            }
        }

        for (name, value) in before {
            if after.contains_key(name) {
                continue;
            }
            if value.is_handler() {
                self.unlisten(id, node, name);
            } else if value.to_attribute().is_some() {
                self.host.remove_attribute(node, name);
            }
        }
    }

    fn patch_children(
        &mut self,
        old: Vec<VNode>,
        new: &mut [VNode],
        parent: &H::Node,
        anchor: Option<&H::Node>,
    ) -> Result<()> {
        let keyed = !old.is_empty()
            && !new.is_empty()
            && old.iter().chain(new.iter()).any(|child| child.key.is_some());
        if keyed {
            self.patch_keyed(old, new, parent, anchor)
        } else {
            self.patch_positional(old, new, parent, anchor)
        }
    }

    fn patch_positional(
        &mut self,
        old: Vec<VNode>,
        new: &mut [VNode],
        parent: &H::Node,
        anchor: Option<&H::Node>,
    ) -> Result<()> {
        let mut rest: VecDeque<VNode> = old.into();

        for child in new.iter_mut() {
            match rest.pop_front() {
                Some(previous) => {
                    let after = self.anchor_among(rest.iter(), anchor);
                    self.patch_node(previous, child, parent, after.as_ref())?;
                }
                None => self.mount_node(child, parent, anchor)?,
            }
        }

        while let Some(mut surplus) = rest.pop_back() {
            self.unmount_node(&mut surplus, Some(parent));
        }
        Ok(())
    }

    fn patch_keyed(
        &mut self,
        old: Vec<VNode>,
        new: &mut [VNode],
        parent: &H::Node,
        anchor: Option<&H::Node>,
    ) -> Result<()> {
        let mut index_of: HashMap<Key, usize> = HashMap::with_capacity(old.len());
        let mut unkeyed: VecDeque<usize> = VecDeque::new();
        for (i, child) in old.iter().enumerate() {
            match &child.key {
                Some(key) if index_of.contains_key(key) => {
                    tracing::warn!(%key, "duplicate key among siblings");
                }
                Some(key) => {
                    index_of.insert(key.clone(), i);
                }
                None => unkeyed.push_back(i),
            }
        }

        let mut old: Vec<Option<VNode>> = old.into_iter().map(Some).collect();
        let mut claimed = vec![false; old.len()];

        // Old index each new child reuses, if any.
        let mut sources: Vec<Option<usize>> = Vec::with_capacity(new.len());
        for child in new.iter() {
            // Unkeyed children pair up with unkeyed old ones in order.
            let found = match &child.key {
                Some(key) => index_of.get(key).copied(),
                None => unkeyed.pop_front(),
            };
            let source = found.filter(|&i| {
                !claimed[i] && old[i].as_ref().is_some_and(|previous| previous.same_type(child))
            });
            if let (Some(i), None, Some(_)) = (found, source, &child.key) {
                if claimed[i] {
                    tracing::warn!(key = ?child.key, "duplicate key among new siblings");
                }
            }
            if let Some(i) = source {
                claimed[i] = true;
            }
            sources.push(source);
        }

        for i in (0..old.len()).rev() {
            if !claimed[i] {
                if let Some(mut unused) = old[i].take() {
                    self.unmount_node(&mut unused, Some(parent));
                }
            }
        }

        let mut pairs: Vec<(usize, usize)> = sources
            .iter()
            .enumerate()
            .filter_map(|(j, source)| source.map(|i| (i, j)))
            .collect();
        pairs.sort_unstable();
        for (i, j) in pairs {
            let Some(previous) = old[i].take() else {
                continue;
            };
            let after = self.anchor_among(old[i + 1..].iter().flatten(), anchor);
            self.patch_node(previous, &mut new[j], parent, after.as_ref())?;
        }

        let reused: Vec<usize> = (0..new.len()).filter(|&j| sources[j].is_some()).collect();
        let positions: Vec<usize> = reused.iter().filter_map(|&j| sources[j]).collect();
        let mut stable = vec![false; new.len()];
        for k in longest_increasing_subsequence(&positions) {
            stable[reused[k]] = true;
        }
        tracing::trace!(
            reused = reused.len(),
            moved = reused.iter().filter(|&&j| !stable[j]).count(),
            "keyed children diffed"
        );

        let mut next = anchor.cloned();
        for j in (0..new.len()).rev() {
            match sources[j] {
                None => self.mount_node(&mut new[j], parent, next.as_ref())?,
                Some(_) if !stable[j] => {
                    for node in self.host_nodes(&new[j]) {
                        self.host.insert_before(parent, &node, next.as_ref());
                    }
                }
                Some(_) => {}
            }
            if let Some(first) = self.first_host_node(&new[j]) {
                next = Some(first);
            }
        }
        Ok(())
    }
}

impl<H: Host + fmt::Debug> fmt::Debug for Reconciler<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reconciler")
            .field("host", &self.host)
            .field("mounts", &self.mounts.len())
            .field("tags", &self.tags)
            .finish()
    }
}

/// Event name for a handler prop: `onClick` listens for `click`.
fn event_name(prop: &str) -> String {
    prop.strip_prefix("on").unwrap_or(prop).to_ascii_lowercase()
}

fn kind_name(vnode: &VNode) -> &'static str {
    match vnode.kind {
        VNodeKind::Element(_) => "element",
        VNodeKind::Text(_) => "text",
        VNodeKind::Fragment(_) => "fragment",
        VNodeKind::Component(_) => "component",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ReactiveError;
    use crate::render::memory::{HostOp, MemoryHost, MemoryNodeId};
    use crate::render::vnode::{h, props, text, Child, Tag};

    fn setup() -> (Reconciler<MemoryHost>, MemoryNodeId) {
        let mut host = MemoryHost::new();
        let root = host.container();
        (Reconciler::new(host), root)
    }

    #[test]
    fn mount_builds_host_tree() {
        let (mut rec, root) = setup();
        let mut tree = h(
            "ul",
            props([("class", "list")]),
            [h("li", Props::new(), ["one"]), h("li", Props::new(), ["two"])],
        );

        rec.mount(&mut tree, &root, None).unwrap();

        assert!(tree.is_mounted());
        assert_eq!(
            rec.host().inner_html(root),
            "<ul class=\"list\"><li>one</li><li>two</li></ul>"
        );
    }

    #[test]
    fn mounting_twice_is_rejected() {
        let (mut rec, root) = setup();
        let mut tree = text("x");
        rec.mount(&mut tree, &root, None).unwrap();

        let err = rec.mount(&mut tree, &root, None).unwrap_err();
        assert!(matches!(err, ReactiveError::Render(RenderError::AlreadyMounted)));
    }

    #[test]
    fn patch_unmounted_is_rejected() {
        let (mut rec, root) = setup();
        let mut new = text("b");

        let err = rec.patch(text("a"), &mut new, &root, None).unwrap_err();
        assert!(matches!(err, ReactiveError::Render(RenderError::NotMounted)));
    }

    #[test]
    fn text_change_is_a_single_set_text() {
        let (mut rec, root) = setup();
        let mut old = text("a");
        rec.mount(&mut old, &root, None).unwrap();
        rec.host_mut().clear_ops();

        let mut new = text("b");
        rec.patch(old, &mut new, &root, None).unwrap();

        let ops = rec.host_mut().take_ops();
        assert_eq!(ops.len(), 1);
        assert!(matches!(&ops[0], HostOp::SetText { text, .. } if text == "b"));
    }

    #[test]
    fn removed_and_false_props_clear_attributes() {
        let (mut rec, root) = setup();
        let mut old = h(
            "input",
            props([("disabled", PropValue::Bool(true)), ("title", "t".into())]),
            [""; 0],
        );
        rec.mount(&mut old, &root, None).unwrap();
        let node = rec.first_host_node(&old).unwrap();

        let mut new = h("input", props([("disabled", false)]), [""; 0]);
        rec.patch(old, &mut new, &root, None).unwrap();

        assert_eq!(rec.host().attribute(node, "disabled"), None);
        assert_eq!(rec.host().attribute(node, "title"), None);
    }

    #[test]
    fn replacement_keeps_position() {
        let (mut rec, root) = setup();
        let mut old = h(
            Tag::Fragment,
            Props::new(),
            [Child::from(h("a", Props::new(), [""; 0])), Child::from("tail")],
        );
        rec.mount(&mut old, &root, None).unwrap();

        let mut new = h(
            Tag::Fragment,
            Props::new(),
            [Child::from(h("b", Props::new(), [""; 0])), Child::from("tail")],
        );
        rec.patch(old, &mut new, &root, None).unwrap();

        assert_eq!(rec.host().inner_html(root), "<b></b>tail");
        assert_eq!(rec.host_nodes(&new).len(), 2);
    }

    #[test]
    fn unmount_releases_everything() {
        let (mut rec, root) = setup();
        let mut tree = h("div", Props::new(), [h("span", Props::new(), ["x"])]);
        rec.mount(&mut tree, &root, None).unwrap();
        let node = rec.first_host_node(&tree).unwrap();

        rec.unmount(&mut tree, &root).unwrap();

        assert!(!tree.is_mounted());
        assert_eq!(rec.mount_count(), 0);
        assert!(rec.host().children(root).is_empty());
        assert!(rec.host().is_released(node));
    }

    #[test]
    fn event_names_drop_the_on_prefix() {
        assert_eq!(event_name("onClick"), "click");
        assert_eq!(event_name("onkeydown"), "keydown");
        assert_eq!(event_name("custom"), "custom");
    }
}
