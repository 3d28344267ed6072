use thiserror::Error;

/// Raised by a component body during the render phase.
///
/// A render error aborts the in-progress pass: the work-in-progress tree is
/// discarded wholesale and the error surfaces from the driving [`tick`] call.
/// Nothing is committed.
///
/// [`tick`]: crate::Runtime::tick
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("component render failed: {0}")]
    Component(String),
    #[error(transparent)]
    Host(#[from] HostError),
}

impl RenderError {
    pub fn component(message: impl Into<String>) -> Self {
        RenderError::Component(message.into())
    }
}

/// Raised by a host adapter primitive.
///
/// During commit this is fatal for the pass: commit is not interruptible, so
/// a failed primitive can leave the host surface inconsistent. That risk is
/// documented, not auto-recovered.
#[derive(Debug, Error)]
#[error("host adapter failed: {0}")]
pub struct HostError(pub String);

impl HostError {
    pub fn new(message: impl Into<String>) -> Self {
        HostError(message.into())
    }
}

/// Raised by a post-commit effect or its cleanup. Caught per effect and
/// logged; sibling effects and future renders proceed.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct EffectError(pub String);

impl EffectError {
    pub fn new(message: impl Into<String>) -> Self {
        EffectError(message.into())
    }
}

/// Raised inside a scheduled callback. Caught per task and logged; the
/// scheduler loop continues with the remaining queue.
#[derive(Debug, Error)]
#[error("scheduled task failed: {0}")]
pub struct TaskError(pub String);

impl TaskError {
    pub fn new(message: impl Into<String>) -> Self {
        TaskError(message.into())
    }
}
