//! The step-sequence trait implemented by every saga.

use crate::effect::Effect;
use crate::error::{CallFailure, SagaError};
use serde_json::Value;

/// What a saga is resumed with.
#[derive(Debug, Clone, PartialEq)]
pub enum Resume {
    /// The outcome of the previous effect. `None` for the first resume and
    /// after a dispatch.
    Next(Option<Value>),
    /// The previous call failed. The saga may handle it or return it.
    Fail(CallFailure),
}

impl Resume {
    pub fn start() -> Self {
        Resume::Next(None)
    }

    /// Turn an injected failure into an error, for suspension points a saga
    /// has no handler for.
    pub fn into_value(self) -> Result<Option<Value>, SagaError> {
        match self {
            Resume::Next(value) => Ok(value),
            Resume::Fail(failure) => Err(SagaError::Call(failure)),
        }
    }
}

/// What a saga produced when resumed.
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    /// Suspended on this effect.
    Yield(Effect),
    /// Finished, with an optional result.
    Done(Option<Value>),
}

impl Step {
    pub fn effect(&self) -> Option<&Effect> {
        match self {
            Step::Yield(effect) => Some(effect),
            Step::Done(_) => None,
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self, Step::Done(_))
    }
}

/// A resumable sequence of effect requests.
///
/// Implementations are explicit state machines: each `resume` advances to the
/// next suspension point and returns the effect to perform there. The driver
/// guarantees resumes never overlap, and never resumes after `Done` or after
/// an error. Resuming a finished saga anyway must return
/// [`SagaError::Finished`].
pub trait Saga: Send + 'static {
    /// Name used in logs and task snapshots.
    fn name(&self) -> &str;

    fn resume(&mut self, input: Resume) -> Result<Step, SagaError>;
}

impl<S: Saga + ?Sized> Saga for Box<S> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn resume(&mut self, input: Resume) -> Result<Step, SagaError> {
        (**self).resume(input)
    }
}
