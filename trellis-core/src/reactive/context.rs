//! Tracking Context
//!
//! The tracking context records which computation is currently running.
//! This enables automatic dependency tracking: when a signal or memo is
//! read, the runtime links it to the observer on top of the stack.
//!
//! # Implementation
//!
//! Each runtime owns one stack. Entering a computation pushes a frame;
//! dropping the returned guard pops it. Untracked sections push a frame with
//! no observer, which masks the enclosing computation.
//!
//! Guards are normally dropped in reverse order. If a frame is popped out of
//! order, the mismatch is logged and the stack repairs itself by unwinding to
//! the expected frame.

use std::cell::{Cell, RefCell};

use crate::graph::NodeId;

/// The per-runtime stack of running computations.
#[derive(Debug, Default)]
pub(crate) struct TrackingContext {
    frames: RefCell<Vec<Frame>>,
    next_frame: Cell<u64>,
}

#[derive(Debug, Clone, Copy)]
struct Frame {
    /// Identity of this frame, used to detect mismatched pops.
    serial: u64,
    /// The computation collecting reads, or `None` for an untracked section.
    observer: Option<NodeId>,
}

/// Guard that pops its frame when dropped.
///
/// This keeps the stack consistent even if the computation panics.
pub(crate) struct TrackingScope<'a> {
    context: &'a TrackingContext,
    serial: u64,
}

impl TrackingContext {
    /// Enter a new frame for `observer`.
    pub(crate) fn enter(&self, observer: Option<NodeId>) -> TrackingScope<'_> {
        let serial = self.next_frame.get();
        self.next_frame.set(serial.wrapping_add(1));
        self.frames.borrow_mut().push(Frame { serial, observer });
        TrackingScope {
            context: self,
            serial,
        }
    }

    /// The observer collecting reads right now, if any.
    pub(crate) fn current(&self) -> Option<NodeId> {
        self.frames.borrow().last().and_then(|frame| frame.observer)
    }

    /// Number of open frames.
    #[cfg(test)]
    pub(crate) fn depth(&self) -> usize {
        self.frames.borrow().len()
    }

    fn exit(&self, serial: u64) {
        let mut frames = self.frames.borrow_mut();
        match frames.last() {
            Some(frame) if frame.serial == serial => {
                frames.pop();
            }
            _ => {
                tracing::warn!(
                    serial,
                    depth = frames.len(),
                    "tracking scope exited out of order"
                );
                if let Some(index) = frames.iter().rposition(|frame| frame.serial == serial) {
                    frames.truncate(index);
                }
            }
        }
    }
}

impl Drop for TrackingScope<'_> {
    fn drop(&mut self) {
        self.context.exit(self.serial);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_tracks_observer() {
        let context = TrackingContext::default();
        let id = NodeId::from_raw(1);

        assert!(context.current().is_none());

        {
            let _scope = context.enter(Some(id));
            assert_eq!(context.current(), Some(id));
        }

        // Frame should be popped after drop
        assert!(context.current().is_none());
        assert_eq!(context.depth(), 0);
    }

    #[test]
    fn nested_frames() {
        let context = TrackingContext::default();
        let outer = NodeId::from_raw(1);
        let inner = NodeId::from_raw(2);

        let _outer = context.enter(Some(outer));
        {
            let _inner = context.enter(Some(inner));
            assert_eq!(context.current(), Some(inner));

            let _untracked = context.enter(None);
            assert!(context.current().is_none());
        }

        assert_eq!(context.current(), Some(outer));
    }

    #[test]
    fn out_of_order_exit_self_corrects() {
        let context = TrackingContext::default();
        let outer = context.enter(Some(NodeId::from_raw(1)));
        let inner = context.enter(Some(NodeId::from_raw(2)));

        drop(outer);
        assert_eq!(context.depth(), 0);

        // The inner frame is already gone; its exit is a logged no-op.
        drop(inner);
        assert_eq!(context.depth(), 0);
    }
}
