//! Sample sagas and the root registration that wires them up.
//!
//! Each saga is an explicit state machine. The state names the suspension
//! point the saga is parked at, so `resume` reads top to bottom like the
//! sequence of effects it yields.

use crate::action::Action;
use crate::effect::{dispatch, Args, Func};
use crate::error::SagaError;
use crate::runtime::RuntimeBuilder;
use crate::saga::{Resume, Saga, Step};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::info;

pub const INCREMENT: &str = "INCREMENT";
pub const INCREMENT_ASYNC: &str = "INCREMENT_ASYNC";
pub const FETCH_REQUESTED: &str = "FETCH_REQUESTED";
pub const FETCH_SUCCEEDED: &str = "FETCH_SUCCEEDED";
pub const FETCH_FAILED: &str = "FETCH_FAILED";
pub const TODOS_RECEIVED: &str = "TODOS_RECEIVED";
pub const TODOS_REQUEST_FAILED: &str = "TODOS_REQUEST_FAILED";

pub const DEFAULT_TODOS_URL: &str = "https://jsonplaceholder.typicode.com/todos";

/// The `delay` call target: sleeps for its first argument, in milliseconds.
pub fn delay() -> Func {
    Func::new("delay", |args: Args| async move {
        let ms = args
            .first()
            .and_then(Value::as_u64)
            .ok_or_else(|| anyhow::anyhow!("delay expects a millisecond count"))?;
        tokio::time::sleep(Duration::from_millis(ms)).await;
        Ok(Value::Null)
    })
}

/// Register the sample sagas: `Hello` at start-up, `DelayedIncrement` for
/// every `INCREMENT_ASYNC` and the latest `FETCH_REQUESTED` only.
pub fn root_saga(builder: RuntimeBuilder, fetch: Func) -> RuntimeBuilder {
    builder
        .spawn_at_start(|| Box::new(Hello::new()))
        .watch_every(INCREMENT_ASYNC, |_| Box::new(DelayedIncrement::new()))
        .watch_latest(FETCH_REQUESTED, move |action| {
            Box::new(FetchOnRequest::from_trigger(fetch.clone(), action))
        })
}

fn finished(saga: &str) -> SagaError {
    SagaError::Finished {
        saga: saga.to_string(),
    }
}

/// Logs a greeting and completes without yielding.
#[derive(Debug, Default)]
pub struct Hello {
    done: bool,
}

impl Hello {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Saga for Hello {
    fn name(&self) -> &str {
        "hello"
    }

    fn resume(&mut self, _input: Resume) -> Result<Step, SagaError> {
        if self.done {
            return Err(finished(self.name()));
        }
        self.done = true;
        info!("Hello Sagas!");
        Ok(Step::Done(None))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IncrementState {
    Start,
    Delaying,
    Dispatched,
    Done,
}

/// Waits a second, then dispatches `INCREMENT`.
#[derive(Debug)]
pub struct DelayedIncrement {
    state: IncrementState,
}

impl DelayedIncrement {
    pub const DELAY_MS: u64 = 1000;

    pub fn new() -> Self {
        Self {
            state: IncrementState::Start,
        }
    }
}

impl Default for DelayedIncrement {
    fn default() -> Self {
        Self::new()
    }
}

impl Saga for DelayedIncrement {
    fn name(&self) -> &str {
        "delayed_increment"
    }

    fn resume(&mut self, input: Resume) -> Result<Step, SagaError> {
        match self.state {
            IncrementState::Start => {
                self.state = IncrementState::Delaying;
                Ok(Step::Yield(crate::invoke!(delay(), (Self::DELAY_MS))))
            }
            IncrementState::Delaying => {
                self.state = IncrementState::Dispatched;
                input.into_value()?;
                Ok(Step::Yield(dispatch(Action::new(INCREMENT))))
            }
            IncrementState::Dispatched => {
                self.state = IncrementState::Done;
                input.into_value()?;
                Ok(Step::Done(None))
            }
            IncrementState::Done => Err(finished(self.name())),
        }
    }
}

/// Action kinds and field names a [`FetchOnRequest`] reports with.
#[derive(Debug, Clone, Copy)]
struct Outcomes {
    success: &'static str,
    success_field: &'static str,
    failure: &'static str,
    failure_field: &'static str,
}

const TODOS: Outcomes = Outcomes {
    success: TODOS_RECEIVED,
    success_field: "todos",
    failure: TODOS_REQUEST_FAILED,
    failure_field: "error",
};

const FETCH: Outcomes = Outcomes {
    success: FETCH_SUCCEEDED,
    success_field: "data",
    failure: FETCH_FAILED,
    failure_field: "err",
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FetchState {
    Start,
    Fetching,
    Reported,
    Done,
}

/// Calls `fetch` with a URL and dispatches the outcome.
///
/// The call is the only suspension point with a failure handler: a failed
/// fetch becomes a failure action. A failure injected after the outcome has
/// been dispatched is not handled and ends the saga.
#[derive(Debug)]
pub struct FetchOnRequest {
    fetch: Func,
    /// The URL, or why the trigger did not carry one.
    url: Result<String, String>,
    outcomes: Outcomes,
    state: FetchState,
}

impl FetchOnRequest {
    /// Fetch todos from `url`, reporting `TODOS_RECEIVED {todos}` or
    /// `TODOS_REQUEST_FAILED {error}`.
    pub fn todos(fetch: Func, url: impl Into<String>) -> Self {
        Self::with_outcomes(fetch, Ok(url.into()), TODOS)
    }

    /// Fetch `payload.url` of a `FETCH_REQUESTED` trigger, reporting
    /// `FETCH_SUCCEEDED {data}` or `FETCH_FAILED {err}`.
    pub fn from_trigger(fetch: Func, trigger: &Action) -> Self {
        let url = trigger
            .pointer("payload/url")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| format!("{} has no payload.url", trigger.kind));
        Self::with_outcomes(fetch, url, FETCH)
    }

    fn with_outcomes(fetch: Func, url: Result<String, String>, outcomes: Outcomes) -> Self {
        Self {
            fetch,
            url,
            outcomes,
            state: FetchState::Start,
        }
    }

    fn failed(&self, error: Value) -> Step {
        Step::Yield(dispatch(
            Action::new(self.outcomes.failure).with(self.outcomes.failure_field, error),
        ))
    }
}

impl Saga for FetchOnRequest {
    fn name(&self) -> &str {
        "fetch_on_request"
    }

    fn resume(&mut self, input: Resume) -> Result<Step, SagaError> {
        match self.state {
            FetchState::Start => match &self.url {
                Ok(url) => {
                    self.state = FetchState::Fetching;
                    Ok(Step::Yield(crate::invoke!(self.fetch.clone(), (url.clone()))))
                }
                Err(reason) => {
                    self.state = FetchState::Reported;
                    Ok(self.failed(json!({ "message": reason })))
                }
            },
            FetchState::Fetching => {
                self.state = FetchState::Reported;
                match input {
                    Resume::Next(data) => Ok(Step::Yield(dispatch(
                        Action::new(self.outcomes.success)
                            .with(self.outcomes.success_field, data.unwrap_or(Value::Null)),
                    ))),
                    Resume::Fail(failure) => Ok(self.failed(failure.error)),
                }
            }
            FetchState::Reported => {
                self.state = FetchState::Done;
                input.into_value()?;
                Ok(Step::Done(None))
            }
            FetchState::Done => Err(finished(self.name())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CallFailure;

    fn stub_fetch() -> Func {
        Func::new("fetch", |_args: Args| async move { Ok(json!([])) })
    }

    #[test]
    fn hello_completes_immediately() {
        let mut hello = Hello::new();

        assert_eq!(hello.resume(Resume::start()), Ok(Step::Done(None)));
        assert!(matches!(
            hello.resume(Resume::start()),
            Err(SagaError::Finished { .. })
        ));
    }

    #[test]
    fn increment_does_not_handle_delay_failures() {
        let mut saga = DelayedIncrement::new();
        saga.resume(Resume::start()).unwrap();

        let failure = CallFailure::new("delay", json!({}));
        assert_eq!(
            saga.resume(Resume::Fail(failure.clone())),
            Err(SagaError::Call(failure))
        );
    }

    #[test]
    fn trigger_url_is_read_from_payload() {
        let trigger = Action::new(FETCH_REQUESTED)
            .with("payload", json!({ "url": "https://example.test/a" }));
        let mut saga = FetchOnRequest::from_trigger(stub_fetch(), &trigger);

        assert_eq!(
            saga.resume(Resume::start()),
            Ok(Step::Yield(crate::invoke!(stub_fetch(), "https://example.test/a")))
        );
        assert_eq!(
            saga.resume(Resume::Next(Some(json!([1])))),
            Ok(Step::Yield(dispatch(
                Action::new(FETCH_SUCCEEDED).with("data", json!([1]))
            )))
        );
    }

    #[test]
    fn missing_url_reports_failure_without_fetching() {
        let mut saga = FetchOnRequest::from_trigger(stub_fetch(), &Action::new(FETCH_REQUESTED));

        assert_eq!(
            saga.resume(Resume::start()),
            Ok(Step::Yield(dispatch(Action::new(FETCH_FAILED).with(
                "err",
                json!({ "message": "FETCH_REQUESTED has no payload.url" })
            ))))
        );
        assert_eq!(saga.resume(Resume::start()), Ok(Step::Done(None)));
    }

    #[tokio::test]
    async fn delay_rejects_non_numeric_arguments() {
        let result = delay().call(Args::from_vec(vec![json!("soon")])).await;

        assert!(result.is_err());
    }
}
