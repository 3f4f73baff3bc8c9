//! Error types for saga execution.

use serde::Serialize;
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;

/// The failure of an external call requested through [`Effect::Call`].
///
/// This is what the driver injects into a suspended saga via
/// [`Resume::Fail`]. The `error` payload is an arbitrary JSON value so a saga
/// can forward it untouched in a failure action.
///
/// [`Effect::Call`]: crate::Effect::Call
/// [`Resume::Fail`]: crate::Resume::Fail
#[derive(Debug, Clone, PartialEq, Serialize, Error)]
#[error("call to `{target}` failed: {error}")]
pub struct CallFailure {
    /// Name of the function that failed.
    pub target: String,
    /// Failure payload.
    pub error: Value,
}

impl CallFailure {
    pub fn new(target: impl Into<String>, error: Value) -> Self {
        Self {
            target: target.into(),
            error,
        }
    }

    /// Convert a call target's error into a failure.
    ///
    /// Errors that already are a `CallFailure` pass through unchanged, so a
    /// target can fail with a structured payload.
    pub fn from_error(target: &str, err: anyhow::Error) -> Self {
        match err.downcast::<CallFailure>() {
            Ok(failure) => failure,
            Err(err) => Self::new(target, json!({ "message": err.to_string() })),
        }
    }

    pub(crate) fn panicked(target: &str) -> Self {
        Self::new(target, json!({ "message": "call panicked" }))
    }
}

/// Errors that end a saga instance.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SagaError {
    /// A call failed and the saga had no handler at that suspension point.
    #[error(transparent)]
    Call(#[from] CallFailure),

    /// The instance was cancelled by a newer trigger or by shutdown.
    #[error("saga cancelled")]
    Cancelled,

    /// A completed saga was resumed again.
    #[error("saga `{saga}` resumed after completion")]
    Finished { saga: String },
}

/// Errors from [`request`](crate::request).
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("no matching action within {0:?}")]
    Timeout(Duration),
}
