//! Render-driving effects.
//!
//! [`mount_reactive`] wraps a view in an effect: the first run mounts it,
//! and every later run (triggered by a signal or memo the render functions
//! read) patches it. The renderer is shared through `Rc<RefCell<_>>`, so
//! an effect that fires while someone else holds the renderer reports
//! [`RenderError::Busy`] instead of panicking.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use super::host::Host;
use super::renderer::{Renderer, View, ViewHandle};
use crate::error::{RenderError, Result};
use crate::reactive::{Effect, EffectOptions, Runtime};

/// A view kept in sync with the reactive state it reads.
///
/// Dropping the handle stops the effect and unmounts the view.
pub struct ReactiveView<H: Host + 'static> {
    effect: Effect,
    renderer: Weak<RefCell<Renderer<H>>>,
    handle: Rc<Cell<Option<ViewHandle>>>,
}

/// Mount `view` into `container` and re-render it whenever the reactive
/// values read while rendering change.
///
/// # Errors
///
/// Whatever the first render raised, or [`RenderError::Busy`] if the
/// renderer is already borrowed.
pub fn mount_reactive<H: Host + 'static>(
    rt: &Runtime,
    renderer: &Rc<RefCell<Renderer<H>>>,
    view: View,
    container: H::Node,
) -> Result<ReactiveView<H>> {
    let handle: Rc<Cell<Option<ViewHandle>>> = Rc::new(Cell::new(None));
    let target = Rc::downgrade(renderer);

    let effect = {
        let handle = Rc::clone(&handle);
        let target = target.clone();
        rt.effect_with(EffectOptions::default().name("view"), move || -> Result<()> {
            let Some(renderer) = target.upgrade() else {
                return Ok(());
            };
            let mut renderer = renderer.try_borrow_mut().map_err(|_| {
                tracing::warn!("renderer is borrowed; skipping render pass");
                RenderError::Busy
            })?;
            match handle.get() {
                Some(current) => renderer.update(current),
                None => {
                    handle.set(Some(renderer.mount(view.clone(), container.clone())?));
                    Ok(())
                }
            }
        })?
    };

    Ok(ReactiveView {
        effect,
        renderer: target,
        handle,
    })
}

impl<H: Host + 'static> ReactiveView<H> {
    /// The renderer handle of the mounted view, until disposal.
    pub fn handle(&self) -> Option<ViewHandle> {
        self.handle.get()
    }

    /// The effect driving the view.
    pub fn effect(&self) -> &Effect {
        &self.effect
    }

    /// Stop re-rendering and unmount the view. Idempotent.
    pub fn dispose(&self) {
        self.effect.dispose();
        let Some(handle) = self.handle.take() else {
            return;
        };
        let Some(renderer) = self.renderer.upgrade() else {
            return;
        };
        let Ok(mut guard) = renderer.try_borrow_mut() else {
            tracing::warn!(%handle, "renderer is borrowed; view left mounted");
            return;
        };
        if let Err(err) = guard.unmount(handle) {
            tracing::error!(error = %err, %handle, "failed to unmount reactive view");
        }
    }
}

impl<H: Host + 'static> Drop for ReactiveView<H> {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl<H: Host + 'static> fmt::Debug for ReactiveView<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReactiveView")
            .field("effect", &self.effect.id())
            .field("handle", &self.handle.get())
            .finish()
    }
}
