//! Render coordination: the pending-render registry, completion delivery and
//! the compositing engine.
//!
//! # Architecture
//!
//! ```text
//! submit ──► PendingRenderStore ──(new render)──► settle task
//!                 │    ▲                               │ join_all(tile settled)
//!                 │    └────── revalidate render_id ◄──┘
//!                 │                 │
//!                 │                 ▼
//!                 │            Compositor ──► painter ──► surface ──► targets
//!                 ▼
//!            Completion ──► RenderCompletion (caller)
//! ```
//!
//! The registry, the compositor and the targets are locked in that order.

mod completion;
mod compositor;
mod registry;

pub use completion::{Completion, RenderCompletion, RenderError, RenderResult};
pub use compositor::{Compositor, Frame};
pub use registry::{
    AcquiredTile, Consumer, ConsumerId, NewRender, PendingRender, PendingRenderStore, RenderId,
    RenderToken, Submission,
};
