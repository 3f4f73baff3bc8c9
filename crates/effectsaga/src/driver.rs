//! The effect driver: resumes a saga and interprets what it yields.

use crate::bus::ActionSink;
use crate::effect::{Call, Effect};
use crate::error::{CallFailure, SagaError};
use crate::saga::{Resume, Saga, Step};
use serde_json::Value;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Drives sagas to completion against a shared [`ActionSink`].
///
/// For each yielded effect:
/// - `Put` is delivered to the sink synchronously and the saga is resumed
///   with no value.
/// - `Call` is started on its own task. The saga is resumed with its value, or
///   with [`Resume::Fail`] when it fails.
///
/// The cancellation token is checked before every resume. Once it fires the saga is
/// never resumed again. A call already in flight keeps running to completion
/// but its result is dropped.
#[derive(Clone)]
pub struct Driver {
    sink: Arc<dyn ActionSink>,
}

impl Driver {
    pub fn new(sink: Arc<dyn ActionSink>) -> Self {
        Self { sink }
    }

    /// Run `saga` until it completes, fails or is cancelled.
    pub async fn drive<S>(
        &self,
        saga: &mut S,
        cancel: &CancellationToken,
    ) -> Result<Option<Value>, SagaError>
    where
        S: Saga + ?Sized,
    {
        let mut input = Resume::start();
        loop {
            if cancel.is_cancelled() {
                debug!(saga = saga.name(), "cancelled at suspension point");
                return Err(SagaError::Cancelled);
            }

            let effect = match saga.resume(input)? {
                Step::Done(result) => return Ok(result),
                Step::Yield(effect) => effect,
            };
            trace!(saga = saga.name(), effect = effect.kind(), "interpret");

            input = match effect {
                Effect::Put(action) => {
                    self.sink.deliver(action);
                    Resume::Next(None)
                }
                Effect::Call(call) => self.perform(call, cancel).await?,
            };
        }
    }

    /// Convenience for sagas that are never cancelled.
    pub async fn run<S>(&self, saga: &mut S) -> Result<Option<Value>, SagaError>
    where
        S: Saga + ?Sized,
    {
        self.drive(saga, &CancellationToken::new()).await
    }

    async fn perform(&self, call: Call, cancel: &CancellationToken) -> Result<Resume, SagaError> {
        let Call { func, args } = call;
        trace!(target_fn = func.name(), args = args.len(), "call");

        // Spawned so cancellation abandons the result without aborting the call.
        let pending = tokio::spawn(func.call(args));

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(target_fn = func.name(), "cancelled while call in flight");
                Err(SagaError::Cancelled)
            }
            settled = pending => Ok(match settled {
                Ok(Ok(value)) => Resume::Next(Some(value)),
                Ok(Err(err)) => Resume::Fail(CallFailure::from_error(func.name(), err)),
                Err(_) => Resume::Fail(CallFailure::panicked(func.name())),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::Action;
    use crate::effect::{dispatch, Args, Func};
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct VecSink(Mutex<Vec<Action>>);

    impl ActionSink for VecSink {
        fn deliver(&self, action: Action) {
            self.0.lock().unwrap().push(action);
        }
    }

    impl VecSink {
        fn kinds(&self) -> Vec<String> {
            self.0.lock().unwrap().iter().map(|a| a.kind.clone()).collect()
        }
    }

    /// Calls `func` once, dispatches `OK {value}` or `FAILED {error}` when
    /// `handles_failure`, then finishes with the call's value.
    struct CallThenPut {
        func: Func,
        handles_failure: bool,
        state: u8,
        value: Option<Value>,
    }

    impl CallThenPut {
        fn new(func: Func, handles_failure: bool) -> Self {
            Self {
                func,
                handles_failure,
                state: 0,
                value: None,
            }
        }
    }

    impl Saga for CallThenPut {
        fn name(&self) -> &str {
            "call_then_put"
        }

        fn resume(&mut self, input: Resume) -> Result<Step, SagaError> {
            self.state += 1;
            match (self.state, input) {
                (1, _) => Ok(Step::Yield(crate::invoke!(self.func.clone(), 7))),
                (2, Resume::Fail(failure)) if self.handles_failure => Ok(Step::Yield(dispatch(
                    Action::new("FAILED").with("error", failure.error),
                ))),
                (2, input) => {
                    let value = input.into_value()?.unwrap_or(Value::Null);
                    self.value = Some(value.clone());
                    Ok(Step::Yield(dispatch(Action::new("OK").with("value", value))))
                }
                (3, _) => Ok(Step::Done(self.value.take())),
                _ => Err(SagaError::Finished {
                    saga: self.name().to_string(),
                }),
            }
        }
    }

    fn doubler() -> Func {
        Func::new("double", |args: Args| async move {
            let n = args.first().and_then(Value::as_i64).unwrap_or_default();
            Ok(json!(n * 2))
        })
    }

    fn failing() -> Func {
        Func::new("broken", |_args: Args| async move {
            Err(anyhow::Error::new(CallFailure::new("broken", json!({}))))
        })
    }

    #[tokio::test]
    async fn feeds_call_results_back_in() {
        let sink = Arc::new(VecSink::default());
        let driver = Driver::new(sink.clone());

        let result = driver.run(&mut CallThenPut::new(doubler(), false)).await;

        assert_eq!(result, Ok(Some(json!(14))));
        assert_eq!(
            sink.0.lock().unwrap().as_slice(),
            &[Action::new("OK").with("value", 14)]
        );
    }

    #[tokio::test]
    async fn failures_are_injected_into_the_saga() {
        let sink = Arc::new(VecSink::default());
        let driver = Driver::new(sink.clone());

        let result = driver.run(&mut CallThenPut::new(failing(), true)).await;

        assert_eq!(result, Ok(None));
        assert_eq!(
            sink.0.lock().unwrap().as_slice(),
            &[Action::new("FAILED").with("error", json!({}))]
        );
    }

    #[tokio::test]
    async fn unhandled_failures_propagate() {
        let sink = Arc::new(VecSink::default());
        let driver = Driver::new(sink.clone());

        let result = driver.run(&mut CallThenPut::new(failing(), false)).await;

        assert_eq!(
            result,
            Err(SagaError::Call(CallFailure::new("broken", json!({}))))
        );
        assert!(sink.kinds().is_empty());
    }

    #[tokio::test]
    async fn panicking_targets_fail_the_call() {
        let sink = Arc::new(VecSink::default());
        let driver = Driver::new(sink.clone());
        let boom = Func::new("boom", |args: Args| async move {
            if !args.is_empty() {
                panic!("target blew up");
            }
            Ok(Value::Null)
        });

        let result = driver.run(&mut CallThenPut::new(boom, true)).await;

        assert_eq!(result, Ok(None));
        assert_eq!(sink.kinds(), vec!["FAILED"]);
    }

    #[tokio::test]
    async fn cancelled_before_start_never_resumes() {
        let sink = Arc::new(VecSink::default());
        let driver = Driver::new(sink.clone());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let mut saga = CallThenPut::new(doubler(), false);
        let result = driver.drive(&mut saga, &cancel).await;

        assert_eq!(result, Err(SagaError::Cancelled));
        assert_eq!(saga.state, 0);
    }

    #[tokio::test]
    async fn cancellation_drops_in_flight_result() {
        let sink = Arc::new(VecSink::default());
        let driver = Driver::new(sink.clone());
        let finished = Arc::new(AtomicBool::new(false));
        let slow = {
            let finished = finished.clone();
            Func::new("slow", move |_args: Args| {
                let finished = finished.clone();
                async move {
                    tokio::time::sleep(Duration::from_millis(30)).await;
                    finished.store(true, Ordering::SeqCst);
                    Ok(json!("late"))
                }
            })
        };
        let cancel = CancellationToken::new();

        let run = tokio::spawn({
            let driver = driver.clone();
            let cancel = cancel.clone();
            async move { driver.drive(&mut CallThenPut::new(slow, false), &cancel).await }
        });
        tokio::time::sleep(Duration::from_millis(5)).await;
        cancel.cancel();

        assert_eq!(run.await.unwrap(), Err(SagaError::Cancelled));
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(finished.load(Ordering::SeqCst), "call ran to completion");
        assert!(sink.kinds().is_empty());
    }
}
