//! Error Types
//!
//! Two error families cover the crate:
//!
//! - [`ReactiveError`] for the dependency graph: cycles, runaway notification
//!   or flush loops, use of disposed nodes, and errors raised by user
//!   callbacks (subscribers, effects, derived computations).
//! - [`RenderError`] for the reconciler and the renderer contract.
//!
//! Local failures (one subscriber, one pending effect) never stop sibling
//! work. The first error of a notification pass or batch flush is returned to
//! the caller that triggered it; the rest are reported through `tracing`.

use thiserror::Error;

use crate::graph::NodeId;
use crate::render::ViewHandle;

/// Result alias used throughout the reactive modules.
pub type Result<T, E = ReactiveError> = std::result::Result<T, E>;

/// Errors raised by the reactive graph.
#[derive(Debug, Error)]
pub enum ReactiveError {
    /// A derived value was asked to recompute while it was already
    /// recomputing (A reads B reads A).
    #[error("circular dependency detected while recomputing node {node}")]
    CircularDependency {
        /// The node that was re-entered.
        node: NodeId,
    },

    /// Reentrant writes kept re-notifying subscribers past the ceiling.
    #[error("subscriber notification did not settle after {limit} passes")]
    NotificationLimit {
        /// The configured ceiling.
        limit: usize,
    },

    /// Effects kept re-scheduling each other past the ceiling.
    #[error("batch flush did not settle after {limit} rounds")]
    FlushLimit {
        /// The configured ceiling.
        limit: usize,
    },

    /// The node was disposed and can no longer be read.
    #[error("node {node} has been disposed")]
    Disposed {
        /// The disposed node.
        node: NodeId,
    },

    /// An error returned by a user callback.
    #[error("callback failed: {0}")]
    Callback(#[source] Box<dyn std::error::Error + Send + Sync + 'static>),

    /// A render-driving effect failed to reconcile.
    #[error(transparent)]
    Render(#[from] RenderError),
}

impl ReactiveError {
    /// Wrap an arbitrary error (or message) raised by user code.
    pub fn callback(err: impl Into<Box<dyn std::error::Error + Send + Sync + 'static>>) -> Self {
        Self::Callback(err.into())
    }
}

/// Errors raised while building or patching live trees.
#[derive(Debug, Error)]
pub enum RenderError {
    /// The tag is not a syntactically valid element name.
    #[error("invalid tag name `{tag}`")]
    InvalidTag {
        /// The rejected tag.
        tag: String,
    },

    /// The tag is valid but appears on the configured deny list.
    #[error("tag `{tag}` is not allowed")]
    DisallowedTag {
        /// The rejected tag.
        tag: String,
    },

    /// A tree node that already owns live nodes was mounted again.
    #[error("tree node is already mounted")]
    AlreadyMounted,

    /// A tree node was patched or moved before being mounted.
    #[error("tree node is not mounted")]
    NotMounted,

    /// The view handle does not refer to a mounted view.
    #[error("unknown view handle {0}")]
    UnknownView(ViewHandle),

    /// The renderer was already borrowed by an enclosing render pass.
    #[error("renderer is busy with another render pass")]
    Busy,
}

/// Keep the first error, log the ones after it.
pub(crate) fn record_error(first: &mut Option<ReactiveError>, err: ReactiveError, context: &str) {
    if first.is_none() {
        *first = Some(err);
    } else {
        tracing::error!(error = %err, "additional error during {context}");
    }
}
