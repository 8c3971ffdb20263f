//! Renderer
//!
//! The renderer owns a [`Reconciler`] and the set of views mounted through
//! it. A view is a root component plus its props; mounting one returns a
//! [`ViewHandle`] that later calls use to re-render, swap or remove it.
//!
//! Handles carry a generation next to their slab index, so a handle kept
//! after its view was unmounted never reaches a newer view that reused the
//! slot.

use std::fmt;

use slabmap::SlabMap;

use super::component::Component;
use super::host::Host;
use super::reconciler::Reconciler;
use super::vnode::{fragment, Props, VNode};
use crate::config::RenderConfig;
use crate::error::{RenderError, Result};

/// A root component and its props, ready to mount.
#[derive(Debug, Clone)]
pub struct View {
    component: Component,
    props: Props,
}

impl View {
    /// Describe a view.
    pub fn new(component: Component, props: Props) -> Self {
        Self { component, props }
    }

    /// The root component.
    pub fn component(&self) -> &Component {
        &self.component
    }

    /// The root props.
    pub fn props(&self) -> &Props {
        &self.props
    }

    fn to_vnode(&self) -> VNode {
        VNode::component(self.component.clone(), self.props.clone(), Vec::new())
    }
}

/// Identifies a mounted view.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ViewHandle {
    index: usize,
    generation: u64,
}

impl fmt::Display for ViewHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.index, self.generation)
    }
}

impl fmt::Debug for ViewHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ViewHandle({self})")
    }
}

struct MountedView<N> {
    generation: u64,
    view: View,
    container: N,
    tree: VNode,
}

/// Mounts views into a [`Host`] and keeps them up to date.
pub struct Renderer<H: Host> {
    reconciler: Reconciler<H>,
    views: SlabMap<MountedView<H::Node>>,
    next_generation: u64,
}

impl<H: Host> Renderer<H> {
    /// Create a renderer with the default configuration.
    pub fn new(host: H) -> Self {
        Self::with_config(host, &RenderConfig::default())
    }

    /// Create a renderer with an explicit configuration.
    pub fn with_config(host: H, config: &RenderConfig) -> Self {
        Self {
            reconciler: Reconciler::with_config(host, config),
            views: SlabMap::new(),
            next_generation: 0,
        }
    }

    /// Describe a view of `component` with `props`.
    pub fn create_view(&self, component: Component, props: Props) -> View {
        View::new(component, props)
    }

    /// Render `view` and append it to `container`.
    ///
    /// # Errors
    ///
    /// Whatever the first render or the mount raised. Nothing is attached
    /// on error.
    pub fn mount(&mut self, view: View, container: H::Node) -> Result<ViewHandle> {
        let mut tree = view.to_vnode();
        self.reconciler.mount(&mut tree, &container, None)?;

        let generation = self.next_generation;
        self.next_generation = self.next_generation.wrapping_add(1);
        let index = self.views.insert(MountedView {
            generation,
            view,
            container,
            tree,
        });

        let handle = ViewHandle { index, generation };
        tracing::debug!(%handle, "view mounted");
        Ok(handle)
    }

    /// Re-render the view behind `handle` and patch the difference.
    pub fn update(&mut self, handle: ViewHandle) -> Result<()> {
        let view = self.lookup(handle)?.view.clone();
        self.render(handle, view)
    }

    /// Swap the view behind `handle` for `view`, patching in place.
    ///
    /// The handle stays valid and is returned for convenience.
    pub fn replace(&mut self, handle: ViewHandle, view: View) -> Result<ViewHandle> {
        self.render(handle, view)?;
        Ok(handle)
    }

    /// Remove the view behind `handle` from its container.
    pub fn unmount(&mut self, handle: ViewHandle) -> Result<()> {
        self.lookup(handle)?;
        let Some(mut mounted) = self.views.remove(handle.index) else {
            return Err(RenderError::UnknownView(handle).into());
        };
        tracing::debug!(%handle, "view unmounted");
        if mounted.tree.is_mounted() {
            self.reconciler.unmount(&mut mounted.tree, &mounted.container)?;
        }
        Ok(())
    }

    /// The current tree of a mounted view.
    pub fn tree(&self, handle: ViewHandle) -> Option<&VNode> {
        self.lookup(handle).ok().map(|mounted| &mounted.tree)
    }

    /// Whether `handle` refers to a mounted view.
    pub fn is_mounted(&self, handle: ViewHandle) -> bool {
        self.lookup(handle).is_ok()
    }

    /// Number of mounted views.
    pub fn view_count(&self) -> usize {
        self.views.len()
    }

    /// Borrow the host.
    pub fn host(&self) -> &H {
        self.reconciler.host()
    }

    /// Mutably borrow the host.
    pub fn host_mut(&mut self) -> &mut H {
        self.reconciler.host_mut()
    }

    /// The host nodes a mounted view currently owns.
    pub fn host_nodes(&self, handle: ViewHandle) -> Vec<H::Node> {
        self.lookup(handle)
            .map(|mounted| self.reconciler.host_nodes(&mounted.tree))
            .unwrap_or_default()
    }

    fn lookup(&self, handle: ViewHandle) -> Result<&MountedView<H::Node>, RenderError> {
        self.views
            .get(handle.index)
            .filter(|mounted| mounted.generation == handle.generation)
            .ok_or(RenderError::UnknownView(handle))
    }

    fn render(&mut self, handle: ViewHandle, view: View) -> Result<()> {
        self.lookup(handle)?;
        let Some(mounted) = self.views.get_mut(handle.index) else {
            return Err(RenderError::UnknownView(handle).into());
        };

        let mut next = view.to_vnode();
        let previous = std::mem::replace(&mut mounted.tree, fragment(Vec::new()));
        mounted.view = view;

        // A failed patch still leaves the new tree as the reference for the
        // next render; whatever did mount is owned by it.
        let result = if previous.is_mounted() {
            self.reconciler.patch(previous, &mut next, &mounted.container, None)
        } else {
            self.reconciler.mount(&mut next, &mounted.container, None)
        };
        mounted.tree = next;
        tracing::trace!(%handle, ok = result.is_ok(), "view rendered");
        result
    }
}

impl<H: Host + fmt::Debug> fmt::Debug for Renderer<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Renderer")
            .field("reconciler", &self.reconciler)
            .field("views", &self.views.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ReactiveError;
    use crate::render::memory::MemoryHost;
    use crate::render::vnode::{h, props, PropValue};

    fn greeting() -> Component {
        Component::from_fn(|props, _| {
            let name = match props.get("name") {
                Some(PropValue::Str(name)) => name.clone(),
                _ => "nobody".to_string(),
            };
            h("p", Props::new(), [format!("hello {name}")])
        })
    }

    #[test]
    fn mount_update_unmount() {
        let mut host = MemoryHost::new();
        let root = host.container();
        let mut renderer = Renderer::new(host);

        let view = renderer.create_view(greeting(), props([("name", "ada")]));
        let handle = renderer.mount(view, root).unwrap();
        assert_eq!(renderer.host().inner_html(root), "<p>hello ada</p>");

        renderer.host_mut().clear_ops();
        renderer.update(handle).unwrap();
        assert!(renderer.host().ops().is_empty());

        renderer.unmount(handle).unwrap();
        assert_eq!(renderer.host().inner_html(root), "");
        assert_eq!(renderer.view_count(), 0);
    }

    #[test]
    fn replace_keeps_the_handle() {
        let mut host = MemoryHost::new();
        let root = host.container();
        let mut renderer = Renderer::new(host);
        let component = greeting();

        let handle = renderer
            .mount(View::new(component.clone(), props([("name", "ada")])), root)
            .unwrap();
        let same = renderer
            .replace(handle, View::new(component, props([("name", "grace")])))
            .unwrap();

        assert_eq!(same, handle);
        assert_eq!(renderer.host().inner_html(root), "<p>hello grace</p>");
    }

    #[test]
    fn stale_handles_are_rejected() {
        let mut host = MemoryHost::new();
        let root = host.container();
        let mut renderer = Renderer::new(host);

        let first = renderer.mount(View::new(greeting(), Props::new()), root).unwrap();
        renderer.unmount(first).unwrap();
        let second = renderer.mount(View::new(greeting(), Props::new()), root).unwrap();

        assert_ne!(first, second);
        assert!(matches!(
            renderer.update(first),
            Err(ReactiveError::Render(RenderError::UnknownView(handle))) if handle == first
        ));
        assert!(renderer.is_mounted(second));
    }
}
