//! View-Tree IR
//!
//! A [`VNode`] describes one render output: an element, a text node, a
//! fragment (siblings without a wrapper) or a component invocation. Trees
//! are built fresh on every render pass, usually through [`h`], and handed
//! to the reconciler.
//!
//! The only mutable part of a node is its mount id, filled in by the
//! reconciler once the node owns live host nodes. Cloning a node yields an
//! unmounted description, so two nodes never claim the same live nodes.

use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use serde::Serialize;

use super::component::Component;
use crate::reactive::same_value;

/// Identity of a child within a keyed list.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Key(String);

impl Key {
    /// The key as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Key {
    fn from(key: &str) -> Self {
        Self(key.to_string())
    }
}

impl From<String> for Key {
    fn from(key: String) -> Self {
        Self(key)
    }
}

macro_rules! key_from_integer {
    ($($ty:ty),*) => {
        $(impl From<$ty> for Key {
            fn from(key: $ty) -> Self {
                Self(key.to_string())
            }
        })*
    };
}

key_from_integer!(i32, i64, u32, u64, usize);

/// Index of a mount record inside a reconciler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct MountId(pub(crate) usize);

/// An event delivered to a handler.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Event {
    /// Event name without the `on` prefix, e.g. `click`.
    pub name: String,

    /// Host-specific payload.
    pub detail: serde_json::Value,
}

impl Event {
    /// Create an event with an empty payload.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            detail: serde_json::Value::Null,
        }
    }

    /// Attach a payload.
    pub fn with_detail(mut self, detail: serde_json::Value) -> Self {
        self.detail = detail;
        self
    }
}

/// An event handler prop.
///
/// Handlers compare by identity: two handlers are equal only if they are
/// clones of the same closure.
#[derive(Clone)]
pub struct EventHandler(Rc<dyn Fn(&Event)>);

impl EventHandler {
    /// Wrap a closure.
    pub fn new(handler: impl Fn(&Event) + 'static) -> Self {
        Self(Rc::new(handler))
    }

    /// Invoke the handler.
    pub fn call(&self, event: &Event) {
        (self.0)(event)
    }
}

impl PartialEq for EventHandler {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for EventHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EventHandler({:p})", Rc::as_ptr(&self.0) as *const ())
    }
}

/// A prop value.
#[derive(Debug, Clone, PartialEq)]
pub enum PropValue {
    /// A string attribute.
    Str(String),
    /// A numeric attribute.
    Number(f64),
    /// A boolean attribute: present when `true`, absent when `false`.
    Bool(bool),
    /// An event handler.
    Handler(EventHandler),
}

impl PropValue {
    /// The attribute string for this value, or `None` if no attribute
    /// should be present.
    pub fn to_attribute(&self) -> Option<String> {
        match self {
            Self::Str(value) => Some(value.clone()),
            Self::Number(value) => Some(value.to_string()),
            Self::Bool(true) => Some(String::new()),
            Self::Bool(false) | Self::Handler(_) => None,
        }
    }

    /// Whether two values would leave the host in the same state. Unlike
    /// `==`, a NaN number is the same as another NaN.
    pub fn same(&self, other: &PropValue) -> bool {
        match (self, other) {
            (Self::Number(a), Self::Number(b)) => same_value(a, b),
            _ => self == other,
        }
    }

    /// Whether this value is an event handler.
    pub fn is_handler(&self) -> bool {
        matches!(self, Self::Handler(_))
    }

    fn to_key(&self) -> Option<Key> {
        match self {
            Self::Str(value) => Some(Key(value.clone())),
            Self::Number(value) => Some(Key(value.to_string())),
            Self::Bool(_) | Self::Handler(_) => None,
        }
    }
}

impl From<&str> for PropValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for PropValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<bool> for PropValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<f64> for PropValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<i32> for PropValue {
    fn from(value: i32) -> Self {
        Self::Number(f64::from(value))
    }
}

impl From<EventHandler> for PropValue {
    fn from(handler: EventHandler) -> Self {
        Self::Handler(handler)
    }
}

/// Flat prop mapping, in insertion order.
pub type Props = IndexMap<String, PropValue>;

/// Build [`Props`] from pairs.
pub fn props<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Props
where
    K: Into<String>,
    V: Into<PropValue>,
{
    pairs
        .into_iter()
        .map(|(name, value)| (name.into(), value.into()))
        .collect()
}

/// An element node.
#[derive(Debug, PartialEq)]
pub struct Element {
    /// Element name.
    pub tag: String,
    /// Attributes and event handlers.
    pub props: Props,
    /// Child nodes.
    pub children: Vec<VNode>,
}

/// A component invocation.
#[derive(Debug, PartialEq)]
pub struct ComponentNode {
    /// Which component to render.
    pub component: Component,
    /// Props passed to the component.
    pub props: Props,
    /// Children passed to the component.
    pub children: Vec<VNode>,
}

/// What a [`VNode`] describes.
#[derive(Debug, PartialEq)]
pub enum VNodeKind {
    /// An element with props and children.
    Element(Element),
    /// A text node.
    Text(String),
    /// Siblings rendered without a wrapper.
    Fragment(Vec<VNode>),
    /// A component to render in place.
    Component(ComponentNode),
}

/// What a tree node is made from: an element name, a component, or the
/// fragment marker.
#[derive(Debug, Clone)]
pub enum Tag {
    /// An element name.
    Element(String),
    /// A component.
    Component(Component),
    /// Group children without a wrapper.
    Fragment,
}

impl From<&str> for Tag {
    fn from(tag: &str) -> Self {
        Self::Element(tag.to_string())
    }
}

impl From<String> for Tag {
    fn from(tag: String) -> Self {
        Self::Element(tag)
    }
}

impl From<Component> for Tag {
    fn from(component: Component) -> Self {
        Self::Component(component)
    }
}

/// One node of a view tree.
pub struct VNode {
    pub(crate) kind: VNodeKind,
    pub(crate) key: Option<Key>,
    pub(crate) mount: Option<MountId>,
}

impl VNode {
    fn new(kind: VNodeKind) -> Self {
        Self {
            kind,
            key: None,
            mount: None,
        }
    }

    /// Create an element node directly.
    pub fn element(tag: impl Into<String>, props: Props, children: Vec<VNode>) -> Self {
        Self::new(VNodeKind::Element(Element {
            tag: tag.into(),
            props,
            children,
        }))
    }

    /// Create a component node directly.
    pub fn component(component: Component, props: Props, children: Vec<VNode>) -> Self {
        Self::new(VNodeKind::Component(ComponentNode {
            component,
            props,
            children,
        }))
    }

    /// Set the node's key.
    pub fn with_key(mut self, key: impl Into<Key>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// What the node describes.
    pub fn kind(&self) -> &VNodeKind {
        &self.kind
    }

    /// The node's key, if any.
    pub fn key(&self) -> Option<&Key> {
        self.key.as_ref()
    }

    /// Element name, for element nodes.
    pub fn tag(&self) -> Option<&str> {
        match &self.kind {
            VNodeKind::Element(element) => Some(&element.tag),
            _ => None,
        }
    }

    /// Props of an element or component node.
    pub fn props(&self) -> Option<&Props> {
        match &self.kind {
            VNodeKind::Element(element) => Some(&element.props),
            VNodeKind::Component(component) => Some(&component.props),
            VNodeKind::Text(_) | VNodeKind::Fragment(_) => None,
        }
    }

    /// Child nodes. Empty for text nodes.
    pub fn children(&self) -> &[VNode] {
        match &self.kind {
            VNodeKind::Element(element) => &element.children,
            VNodeKind::Fragment(children) => children,
            VNodeKind::Component(component) => &component.children,
            VNodeKind::Text(_) => &[],
        }
    }

    /// Whether the reconciler has mounted this node.
    pub fn is_mounted(&self) -> bool {
        self.mount.is_some()
    }

    /// Whether two nodes can be patched into each other rather than one
    /// replacing the other.
    pub(crate) fn same_type(&self, other: &VNode) -> bool {
        if self.key != other.key {
            return false;
        }
        match (&self.kind, &other.kind) {
            (VNodeKind::Element(a), VNodeKind::Element(b)) => a.tag == b.tag,
            (VNodeKind::Text(_), VNodeKind::Text(_))
            | (VNodeKind::Fragment(_), VNodeKind::Fragment(_)) => true,
            (VNodeKind::Component(a), VNodeKind::Component(b)) => a.component == b.component,
            _ => false,
        }
    }
}

impl Clone for VNode {
    fn clone(&self) -> Self {
        let kind = match &self.kind {
            VNodeKind::Element(element) => VNodeKind::Element(Element {
                tag: element.tag.clone(),
                props: element.props.clone(),
                children: element.children.clone(),
            }),
            VNodeKind::Text(text) => VNodeKind::Text(text.clone()),
            VNodeKind::Fragment(children) => VNodeKind::Fragment(children.clone()),
            VNodeKind::Component(component) => VNodeKind::Component(ComponentNode {
                component: component.component.clone(),
                props: component.props.clone(),
                children: component.children.clone(),
            }),
        };
        Self {
            kind,
            key: self.key.clone(),
            mount: None,
        }
    }
}

impl PartialEq for VNode {
    /// Structural equality; mount state is ignored.
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key && self.kind == other.kind
    }
}

impl fmt::Debug for VNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("VNode");
        debug.field("kind", &self.kind);
        if let Some(key) = &self.key {
            debug.field("key", key);
        }
        debug.field("mounted", &self.mount.is_some()).finish()
    }
}

/// A child argument to [`h`].
#[derive(Debug, Clone)]
pub enum Child {
    /// A tree node.
    Node(VNode),
    /// Text, turned into a text node.
    Text(String),
    /// A nested sequence, flattened into the parent.
    Many(Vec<Child>),
    /// Nothing. Produced by `None`, booleans and `()`.
    Empty,
}

impl From<VNode> for Child {
    fn from(node: VNode) -> Self {
        Self::Node(node)
    }
}

impl From<&str> for Child {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<String> for Child {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<bool> for Child {
    fn from(_: bool) -> Self {
        Self::Empty
    }
}

impl From<()> for Child {
    fn from(_: ()) -> Self {
        Self::Empty
    }
}

impl<T: Into<Child>> From<Option<T>> for Child {
    fn from(child: Option<T>) -> Self {
        child.map_or(Self::Empty, Into::into)
    }
}

impl<T: Into<Child>> From<Vec<T>> for Child {
    fn from(children: Vec<T>) -> Self {
        Self::Many(children.into_iter().map(Into::into).collect())
    }
}

macro_rules! child_from_number {
    ($($ty:ty),*) => {
        $(impl From<$ty> for Child {
            fn from(value: $ty) -> Self {
                Self::Text(value.to_string())
            }
        })*
    };
}

child_from_number!(i32, i64, u32, u64, usize, f64);

fn flatten_into(child: Child, out: &mut Vec<VNode>) {
    match child {
        Child::Node(node) => out.push(node),
        Child::Text(text) => out.push(text_node(text)),
        Child::Many(children) => {
            for child in children {
                flatten_into(child, out);
            }
        }
        Child::Empty => {}
    }
}

/// Build a tree node.
///
/// A `key` prop becomes the node's key and is removed from the props.
/// Nested child sequences are flattened, empty children dropped, and text
/// or numbers turned into text nodes.
///
/// ```
/// use trellis_core::render::{h, props, Child, PropValue};
///
/// let list = h(
///     "ul",
///     props([("class", "items")]),
///     [
///         Child::from(h("li", props([("key", "a")]), ["first"])),
///         Child::from(None::<&str>),
///         Child::from(vec!["second", "third"]),
///     ],
/// );
///
/// assert_eq!(list.children().len(), 3);
/// assert_eq!(list.children()[0].key().unwrap().as_str(), "a");
/// assert!(!list.children()[0].props().unwrap().contains_key("key"));
/// ```
pub fn h<C>(tag: impl Into<Tag>, mut props: Props, children: impl IntoIterator<Item = C>) -> VNode
where
    C: Into<Child>,
{
    let key = props.shift_remove("key").and_then(|value| {
        let key = value.to_key();
        if key.is_none() {
            tracing::warn!(?value, "ignoring key prop that is not a string or number");
        }
        key
    });

    let mut flat = Vec::new();
    for child in children {
        flatten_into(child.into(), &mut flat);
    }

    let kind = match tag.into() {
        Tag::Element(tag) => VNodeKind::Element(Element {
            tag,
            props,
            children: flat,
        }),
        Tag::Component(component) => VNodeKind::Component(ComponentNode {
            component,
            props,
            children: flat,
        }),
        Tag::Fragment => VNodeKind::Fragment(flat),
    };

    VNode {
        kind,
        key,
        mount: None,
    }
}

fn text_node(text: String) -> VNode {
    VNode::new(VNodeKind::Text(text))
}

/// Build a text node.
pub fn text(text: impl Into<String>) -> VNode {
    text_node(text.into())
}

/// Build a fragment from already-built nodes.
pub fn fragment(children: Vec<VNode>) -> VNode {
    VNode::new(VNodeKind::Fragment(children))
}
