//! Testing utilities for effectsaga.
//!
//! A saga is just a state machine, so most tests walk it by hand instead of
//! running a driver:
//!
//! ```ignore
//! use effectsaga_core::{dispatch, invoke, Action};
//! use effectsaga_core::sagas::{delay, DelayedIncrement};
//! use effectsaga_testing::SagaTester;
//!
//! let mut saga = SagaTester::new(DelayedIncrement::new());
//! saga.next().yields(invoke!(delay(), 1000));
//! saga.next().yields(dispatch(Action::new("INCREMENT")));
//! saga.next().done();
//! ```
//!
//! For runtime-level tests, [`RecordingSink`] captures what sagas dispatch and
//! [`stub_fn`] stands in for external call targets.

use effectsaga_core::{
    Action, ActionSink, Args, CallFailure, Effect, Func, Resume, Saga, SagaError, Step,
};
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Notify;

// ============================================================================
// Hand-walked sagas
// ============================================================================

/// Drives a saga one step at a time, the way a test walks a generator.
pub struct SagaTester<S> {
    saga: S,
    step: usize,
}

impl<S: Saga> SagaTester<S> {
    pub fn new(saga: S) -> Self {
        Self { saga, step: 0 }
    }

    /// Resume with no value.
    pub fn next(&mut self) -> Stepped {
        self.resume(Resume::Next(None))
    }

    /// Resume with the outcome of the previous call.
    pub fn next_with(&mut self, value: Value) -> Stepped {
        self.resume(Resume::Next(Some(value)))
    }

    /// Inject a failure at the current suspension point.
    pub fn throw(&mut self, failure: CallFailure) -> Stepped {
        self.resume(Resume::Fail(failure))
    }

    pub fn resume(&mut self, input: Resume) -> Stepped {
        self.step += 1;
        Stepped {
            step: self.step,
            result: self.saga.resume(input),
        }
    }

    pub fn saga(&self) -> &S {
        &self.saga
    }

    pub fn into_inner(self) -> S {
        self.saga
    }
}

/// The result of one resume, with assertions.
#[must_use = "assert on the step or inspect its result"]
#[derive(Debug)]
pub struct Stepped {
    step: usize,
    result: Result<Step, SagaError>,
}

impl Stepped {
    /// Assert the saga suspended on `expected`.
    #[track_caller]
    pub fn yields(self, expected: Effect) {
        match self.result {
            Ok(Step::Yield(actual)) if actual == expected => {}
            other => panic!(
                "step {}: expected yield of {:?}, got {:?}",
                self.step, expected, other
            ),
        }
    }

    /// Assert the saga completed.
    #[track_caller]
    pub fn done(self) -> Option<Value> {
        match self.result {
            Ok(Step::Done(result)) => result,
            other => panic!("step {}: expected completion, got {:?}", self.step, other),
        }
    }

    /// Assert the saga ended with an error and return it.
    #[track_caller]
    pub fn fails(self) -> SagaError {
        match self.result {
            Err(err) => err,
            Ok(step) => panic!("step {}: expected an error, got {:?}", self.step, step),
        }
    }

    pub fn step(&self) -> usize {
        self.step
    }

    pub fn into_result(self) -> Result<Step, SagaError> {
        self.result
    }
}

/// Where a saga first departed from a script.
#[derive(Debug, Error)]
#[error("diverged at step {step}: expected {expected:?}, got {actual:?}")]
pub struct Divergence {
    /// 1-based index of the first mismatching step.
    pub step: usize,
    pub expected: Step,
    pub actual: Result<Step, SagaError>,
}

/// Feed `script` to `saga` in order, comparing each result with the
/// expected step. Stops at the first mismatch.
pub fn compare_sequence<S, I>(saga: S, script: I) -> Result<(), Divergence>
where
    S: Saga,
    I: IntoIterator<Item = (Resume, Step)>,
{
    let mut tester = SagaTester::new(saga);
    for (input, expected) in script {
        let Stepped { step, result } = tester.resume(input);
        if result.as_ref() != Ok(&expected) {
            return Err(Divergence {
                step,
                expected,
                actual: result,
            });
        }
    }
    Ok(())
}

// ============================================================================
// Recording sink
// ============================================================================

/// An [`ActionSink`] that keeps everything delivered to it.
#[derive(Clone, Default)]
pub struct RecordingSink {
    inner: Arc<Recorded>,
}

#[derive(Default)]
struct Recorded {
    actions: Mutex<Vec<Action>>,
    delivered: Notify,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn actions(&self) -> Vec<Action> {
        self.lock().clone()
    }

    pub fn kinds(&self) -> Vec<String> {
        self.lock().iter().map(|a| a.kind.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Wait until at least `count` actions were delivered. Returns whether
    /// that happened before `timeout`.
    pub async fn wait_for(&self, count: usize, timeout: Duration) -> bool {
        let reached = async {
            loop {
                let delivered = self.inner.delivered.notified();
                if self.len() >= count {
                    return;
                }
                delivered.await;
            }
        };
        tokio::time::timeout(timeout, reached).await.is_ok()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Action>> {
        self.inner
            .actions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl ActionSink for RecordingSink {
    fn deliver(&self, action: Action) {
        self.lock().push(action);
        self.inner.delivered.notify_waiters();
    }
}

impl fmt::Debug for RecordingSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("RecordingSink").field(&*self.lock()).finish()
    }
}

// ============================================================================
// Stub call targets
// ============================================================================

/// Arguments a stub was called with, in call order.
#[derive(Clone, Default)]
pub struct StubCalls {
    calls: Arc<Mutex<Vec<Args>>>,
}

impl StubCalls {
    pub fn all(&self) -> Vec<Args> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn count(&self) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn record(&self, args: &Args) {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(args.clone());
    }
}

/// A [`Func`] named `name` that records its arguments before running
/// `handler`.
pub fn stub_fn<F, Fut>(name: &'static str, handler: F) -> (Func, StubCalls)
where
    F: Fn(Args) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
{
    let calls = StubCalls::default();
    let recorder = calls.clone();
    let func = Func::new(name, move |args: Args| {
        recorder.record(&args);
        handler(args)
    });
    (func, calls)
}

/// A stub that always succeeds with `value`.
pub fn stub_returning(name: &'static str, value: Value) -> (Func, StubCalls) {
    stub_fn(name, move |_args: Args| {
        let value = value.clone();
        async move { Ok(value) }
    })
}

/// A stub that always fails with `error` as the failure payload.
pub fn stub_failing(name: &'static str, error: Value) -> (Func, StubCalls) {
    stub_fn(name, move |_args: Args| {
        let failure = CallFailure::new(name, error.clone());
        async move { Err(failure.into()) }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use effectsaga_core::sagas::Hello;
    use serde_json::json;

    #[test]
    fn stepped_reports_completion() {
        let mut tester = SagaTester::new(Hello::new());

        assert_eq!(tester.next().done(), None);
        assert!(matches!(tester.next().fails(), SagaError::Finished { .. }));
    }

    #[test]
    #[should_panic(expected = "step 1: expected yield")]
    fn yields_panics_on_mismatch() {
        let mut tester = SagaTester::new(Hello::new());
        tester.next().yields(effectsaga_core::dispatch(Action::new("NOPE")));
    }

    #[tokio::test]
    async fn stubs_record_arguments() {
        let (func, calls) = stub_returning("fetch", json!({ "ok": true }));

        let result = func.call(Args::from_vec(vec![json!("https://example.test")])).await;

        assert_eq!(result.unwrap(), json!({ "ok": true }));
        assert_eq!(calls.all(), vec![Args::from_vec(vec![json!("https://example.test")])]);
    }

    #[tokio::test]
    async fn failing_stubs_carry_their_payload() {
        let (func, _) = stub_failing("fetch", json!({ "status": 500 }));

        let err = func.call(Args::new()).await.unwrap_err();

        assert_eq!(
            CallFailure::from_error("fetch", err),
            CallFailure::new("fetch", json!({ "status": 500 }))
        );
    }

    #[tokio::test]
    async fn recording_sink_wakes_waiters() {
        let sink = RecordingSink::new();
        let waiter = tokio::spawn({
            let sink = sink.clone();
            async move { sink.wait_for(2, Duration::from_secs(1)).await }
        });

        sink.deliver(Action::new("A"));
        sink.deliver(Action::new("B"));

        assert!(waiter.await.unwrap());
        assert_eq!(sink.kinds(), vec!["A", "B"]);
    }
}
