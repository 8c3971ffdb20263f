//! Component Handles
//!
//! A component is a render function from props and children to a view tree.
//! It comes in two flavors:
//!
//! - **Function**: the same closure renders every pass.
//! - **Factory**: called once per mount with the initial props; the closure
//!   it returns renders that instance from then on and can hold
//!   per-instance state.
//!
//! Components compare by identity. Two invocations refer to the same
//! component type only if they carry clones of the same handle, which
//! decides whether the reconciler patches an instance or replaces it.

use std::fmt;
use std::rc::Rc;

use super::vnode::{Props, VNode};
use crate::error::Result;

/// A render function: props and children in, view tree out.
pub type RenderFn = Rc<dyn Fn(&Props, &[VNode]) -> Result<VNode>>;

type FactoryFn = Rc<dyn Fn(&Props) -> RenderFn>;

/// A component handle.
#[derive(Clone)]
pub enum Component {
    /// Renders with the same function every pass.
    Function(RenderFn),
    /// Produces a per-instance render function at mount.
    Factory(FactoryFn),
}

impl Component {
    /// A component from a fallible render function.
    pub fn function<F>(render: F) -> Self
    where
        F: Fn(&Props, &[VNode]) -> Result<VNode> + 'static,
    {
        Self::Function(Rc::new(render))
    }

    /// A component from a render function that cannot fail.
    pub fn from_fn<F>(render: F) -> Self
    where
        F: Fn(&Props, &[VNode]) -> VNode + 'static,
    {
        Self::function(move |props, children| Ok(render(props, children)))
    }

    /// A stateful component: `factory` runs once per mounted instance.
    pub fn factory<F, R>(factory: F) -> Self
    where
        F: Fn(&Props) -> R + 'static,
        R: Fn(&Props, &[VNode]) -> Result<VNode> + 'static,
    {
        Self::Factory(Rc::new(move |props| Rc::new(factory(props)) as RenderFn))
    }

    /// Obtain the render function for a new instance.
    pub(crate) fn instantiate(&self, props: &Props) -> RenderFn {
        match self {
            Self::Function(render) => Rc::clone(render),
            Self::Factory(factory) => factory(props),
        }
    }

    /// Whether both handles refer to the same component.
    pub fn same(&self, other: &Component) -> bool {
        match (self, other) {
            (Self::Function(a), Self::Function(b)) => Rc::ptr_eq(a, b),
            (Self::Factory(a), Self::Factory(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl PartialEq for Component {
    fn eq(&self, other: &Self) -> bool {
        self.same(other)
    }
}

impl fmt::Debug for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Function(render) => {
                write!(f, "Component::Function({:p})", Rc::as_ptr(render) as *const ())
            }
            Self::Factory(factory) => {
                write!(f, "Component::Factory({:p})", Rc::as_ptr(factory) as *const ())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::vnode::text;
    use std::cell::Cell;

    #[test]
    fn clones_are_the_same_component() {
        let a = Component::from_fn(|_, _| text("a"));
        let b = a.clone();
        let c = Component::from_fn(|_, _| text("a"));

        assert!(a.same(&b));
        assert!(!a.same(&c));
    }

    #[test]
    fn factory_runs_once_per_instance() {
        let made = Rc::new(Cell::new(0));
        let counter = made.clone();
        let component = Component::factory(move |_props: &Props| {
            counter.set(counter.get() + 1);
            let renders = Cell::new(0);
            move |_: &Props, _: &[VNode]| -> Result<VNode> {
                renders.set(renders.get() + 1);
                Ok(text(renders.get().to_string()))
            }
        });

        let first = component.instantiate(&Props::new());
        let second = component.instantiate(&Props::new());
        assert_eq!(made.get(), 2);

        assert_eq!(first(&Props::new(), &[]).unwrap(), text("1"));
        assert_eq!(first(&Props::new(), &[]).unwrap(), text("2"));
        assert_eq!(second(&Props::new(), &[]).unwrap(), text("1"));
    }
}
