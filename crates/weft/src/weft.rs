//! Incremental tree reconciliation for retained host surfaces.
//!
//! Callers describe what the tree should look like with [`Element`]
//! descriptors; the runtime diffs that description against what was rendered
//! last time and applies the minimal set of mutations through a
//! [`HostAdapter`]. Rendering is split into two phases. The render phase
//! builds a shadow tree of fibers one unit at a time under a cooperative
//! [`Scheduler`], so large updates never monopolize the thread and a newer
//! update can discard an in-flight pass. The commit phase then applies the
//! finished tree to the host in one uninterrupted batch, so the host never
//! observes a half-applied update.
//!
//! Function components hold local state through the positional hooks on
//! [`Scope`]; a state setter marks its root dirty and the next turn of the
//! scheduler re-renders it.

pub mod element;
pub mod error;
pub mod fiber;
pub mod hooks;
pub mod host;
pub mod runtime;
pub mod scheduler;

mod commit;
mod reconciler;

pub use element::{
    ComponentFn, Element, ElementKind, Listener, PropDiff, PropValue, Props, TEXT_VALUE_ATTR,
    diff_props,
};
pub use error::{EffectError, HostError, RenderError, TaskError};
pub use fiber::{EffectTag, Fiber, FiberArena, FiberId};
pub use hooks::{CleanupFn, Dep, EffectFn, Hook, RefBox, Scope, StateSetter, StateUpdate, UpdateQueue};
pub use host::{HostAdapter, HostHandle};
pub use runtime::{RootId, Runtime};
pub use scheduler::{
    DEFAULT_SLICE, PRIORITY_NORMAL, Priority, Scheduler, TaskFn, TaskId, TaskStatus,
};
