//! Effect descriptors.
//!
//! A saga never performs IO itself. It yields an [`Effect`] describing what it
//! wants done and the [`Driver`](crate::Driver) fulfills it:
//!
//! ```text
//! dispatch(Action::new("INCREMENT"))  // => {"PUT": {"kind": "INCREMENT"}}
//! invoke!(delay(), 1000)              // => {"CALL": {"fn": "delay", "args": [1000]}}
//! ```
//!
//! Because descriptors are plain values, tests can compare what a saga yields
//! against expected descriptors without running anything.

use crate::action::Action;
use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::{Serialize, Serializer};
use serde_json::Value;
use smallvec::SmallVec;
use std::borrow::Cow;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Call arguments. Most calls take one or two.
pub type Args = SmallVec<[Value; 2]>;

/// A requested side effect.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Effect {
    /// Deliver an action to the action sink.
    #[serde(rename = "PUT")]
    Put(Action),
    /// Invoke an external function with arguments.
    #[serde(rename = "CALL")]
    Call(Call),
}

/// The payload of [`Effect::Call`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Call {
    #[serde(rename = "fn")]
    pub func: Func,
    pub args: Args,
}

impl Effect {
    pub fn kind(&self) -> &'static str {
        match self {
            Effect::Put(_) => "put",
            Effect::Call(_) => "call",
        }
    }
}

/// Build a dispatch descriptor.
pub fn dispatch(action: Action) -> Effect {
    Effect::Put(action)
}

/// Build a call descriptor. See also the [`invoke!`](crate::invoke!) macro.
pub fn invoke(func: Func, args: impl IntoIterator<Item = Value>) -> Effect {
    Effect::Call(Call {
        func,
        args: args.into_iter().collect(),
    })
}

/// An external function a saga can ask the driver to call.
#[async_trait]
pub trait CallTarget: Send + Sync + 'static {
    async fn call(&self, args: Args) -> anyhow::Result<Value>;
}

struct FnTarget<F>(F);

#[async_trait]
impl<F> CallTarget for FnTarget<F>
where
    F: Fn(Args) -> BoxFuture<'static, anyhow::Result<Value>> + Send + Sync + 'static,
{
    async fn call(&self, args: Args) -> anyhow::Result<Value> {
        (self.0)(args).await
    }
}

/// A named reference to a [`CallTarget`].
///
/// Two `Func`s are equal when their names are equal. That is what lets a test
/// build `invoke!(delay(), 1000)` and compare it with the descriptor a saga
/// produced from its own `delay()` handle.
#[derive(Clone)]
pub struct Func {
    name: Cow<'static, str>,
    target: Arc<dyn CallTarget>,
}

impl Func {
    /// Wrap an async closure.
    pub fn new<F, Fut>(name: impl Into<Cow<'static, str>>, f: F) -> Self
    where
        F: Fn(Args) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        let boxed = move |args: Args| -> BoxFuture<'static, anyhow::Result<Value>> {
            Box::pin(f(args))
        };
        Self::from_target(name, FnTarget(boxed))
    }

    pub fn from_target(name: impl Into<Cow<'static, str>>, target: impl CallTarget) -> Self {
        Self {
            name: name.into(),
            target: Arc::new(target),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Start the call. The returned future owns everything it needs so the
    /// driver can run it detached from the saga.
    pub fn call(&self, args: Args) -> BoxFuture<'static, anyhow::Result<Value>> {
        let target = Arc::clone(&self.target);
        Box::pin(async move { target.call(args).await })
    }
}

impl PartialEq for Func {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl fmt::Debug for Func {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Func({})", self.name)
    }
}

impl Serialize for Func {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.name)
    }
}
