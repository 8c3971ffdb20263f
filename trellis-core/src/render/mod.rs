//! Rendering
//!
//! View trees and the engine that keeps a live surface in step with them.
//!
//! # Pieces
//!
//! - [`VNode`] is the view-tree IR, usually built with [`h`].
//! - [`Component`] turns props and children into a subtree.
//! - [`Host`] is the live surface. [`MemoryHost`] is the in-memory
//!   reference backend, with an operation log for assertions.
//! - [`Reconciler`] mounts trees and patches old trees into new ones with
//!   as few host operations as it can.
//! - [`Renderer`] manages mounted root views behind [`ViewHandle`]s.
//! - [`mount_reactive`] re-renders a view whenever the reactive values it
//!   read change.

mod component;
mod host;
mod lis;
mod memory;
mod reactive;
mod reconciler;
mod renderer;
mod tag;
mod vnode;

pub use component::{Component, RenderFn};
pub use host::{Host, Listener};
pub use lis::longest_increasing_subsequence;
pub use memory::{HostOp, MemoryHost, MemoryNodeId};
pub use reactive::{mount_reactive, ReactiveView};
pub use reconciler::Reconciler;
pub use renderer::{Renderer, View, ViewHandle};
pub use tag::{is_valid_tag, TagPolicy};
pub use vnode::{
    fragment, h, props, text, Child, ComponentNode, Element, Event, EventHandler, Key, PropValue,
    Props, Tag, VNode, VNodeKind,
};
