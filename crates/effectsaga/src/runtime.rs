//! The saga runtime: watches the action bus and drives saga instances.

use crate::action::Action;
use crate::bus::{ActionBus, ActionSink};
use crate::driver::Driver;
use crate::error::SagaError;
use crate::saga::Saga;
use crate::watch::{Policy, SagaFactory, Watch};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures::FutureExt;
use serde::Serialize;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Weak};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, Notify};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info_span, warn, Instrument};
use uuid::Uuid;

/// Identifies one running saga instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct TaskId(Uuid);

impl TaskId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A point-in-time view of a running instance.
#[derive(Debug, Clone, Serialize)]
pub struct TaskSnapshot {
    pub id: TaskId,
    pub saga: String,
    /// Tag of the watch that started it. `None` for start-up sagas.
    pub tag: Option<String>,
    pub policy: Option<Policy>,
    pub started_at: DateTime<Utc>,
}

type StartupFactory = Arc<dyn Fn() -> Box<dyn Saga> + Send + Sync>;

/// Builder for a [`Runtime`].
///
/// Registrations are fixed once [`build`](Self::build) is called.
///
/// # Example
///
/// ```ignore
/// let bus = ActionBus::new();
/// let handle = RuntimeBuilder::new(bus.clone())
///     .spawn_at_start(|| Box::new(Hello::new()))
///     .watch_every("INCREMENT_ASYNC", |_| Box::new(DelayedIncrement::new()))
///     .watch_latest("FETCH_REQUESTED", move |action| {
///         Box::new(FetchOnRequest::from_trigger(fetch.clone(), action))
///     })
///     .build()
///     .start();
///
/// bus.emit(Action::new("INCREMENT_ASYNC"));
/// ```
pub struct RuntimeBuilder {
    bus: ActionBus,
    sink: Option<Arc<dyn ActionSink>>,
    watches: Vec<Watch>,
    startup: Vec<StartupFactory>,
}

impl RuntimeBuilder {
    pub fn new(bus: ActionBus) -> Self {
        Self {
            bus,
            sink: None,
            watches: Vec::new(),
            startup: Vec::new(),
        }
    }

    /// Deliver dispatched actions to `sink` instead of back onto the bus.
    pub fn with_sink(mut self, sink: Arc<dyn ActionSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Start a new instance for every action tagged `tag`.
    pub fn watch_every<F>(self, tag: impl Into<String>, factory: F) -> Self
    where
        F: Fn(&Action) -> Box<dyn Saga> + Send + Sync + 'static,
    {
        self.watch(tag, Policy::Every, Arc::new(factory))
    }

    /// Start a new instance for every action tagged `tag`, cancelling the
    /// instance this registration started before it.
    pub fn watch_latest<F>(self, tag: impl Into<String>, factory: F) -> Self
    where
        F: Fn(&Action) -> Box<dyn Saga> + Send + Sync + 'static,
    {
        self.watch(tag, Policy::Latest, Arc::new(factory))
    }

    pub fn watch(mut self, tag: impl Into<String>, policy: Policy, factory: SagaFactory) -> Self {
        self.watches.push(Watch::new(tag, policy, factory));
        self
    }

    /// Run a saga once when the runtime starts. All start-up sagas run in
    /// parallel.
    pub fn spawn_at_start<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> Box<dyn Saga> + Send + Sync + 'static,
    {
        self.startup.push(Arc::new(factory));
        self
    }

    pub fn build(self) -> Runtime {
        let sink = self
            .sink
            .unwrap_or_else(|| Arc::new(self.bus.clone()) as Arc<dyn ActionSink>);
        Runtime {
            inner: Arc::new(Inner {
                driver: Driver::new(sink),
                bus: self.bus,
                watches: self.watches,
                inflight: Inflight::default(),
                shutdown: CancellationToken::new(),
            }),
            startup: self.startup,
        }
    }
}

/// A built runtime, not yet listening.
pub struct Runtime {
    inner: Arc<Inner>,
    startup: Vec<StartupFactory>,
}

impl Runtime {
    /// Spawn the start-up sagas and the trigger loop.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(self) -> RuntimeHandle {
        // Subscribe before returning so nothing emitted after `start` is missed.
        let rx = self.inner.bus.subscribe();

        for factory in &self.startup {
            self.inner.spawn(factory(), None);
        }

        tokio::spawn(listen(
            Arc::downgrade(&self.inner),
            self.inner.shutdown.clone(),
            rx,
        ));

        RuntimeHandle { inner: self.inner }
    }
}

/// Handle to a started runtime.
///
/// Once every handle is dropped and the last running instance finishes, the
/// trigger loop stops and releases its bus subscription.
#[derive(Clone)]
pub struct RuntimeHandle {
    inner: Arc<Inner>,
}

impl RuntimeHandle {
    /// Start every watch matching `action` directly, bypassing the bus.
    pub fn trigger(&self, action: &Action) -> Vec<TaskId> {
        self.inner.trigger(action)
    }

    /// Emit an action on the bus.
    pub fn emit(&self, action: Action) -> usize {
        self.inner.bus.emit(action)
    }

    pub fn bus(&self) -> &ActionBus {
        &self.inner.bus
    }

    pub fn inflight(&self) -> Vec<TaskSnapshot> {
        self.inner.inflight.snapshot()
    }

    /// Wait until no instance is running.
    ///
    /// Only instances that already started count. An action emitted on the
    /// bus that the trigger loop has not received yet does not hold this up;
    /// use [`trigger`](Self::trigger) when a test needs the instance tracked
    /// immediately.
    pub async fn wait_idle(&self) {
        self.inner.inflight.wait_idle().await
    }

    /// Stop listening and cancel every running instance.
    pub fn shutdown(&self) {
        debug!("runtime shutdown");
        self.inner.shutdown.cancel();
    }
}

struct Inner {
    bus: ActionBus,
    driver: Driver,
    watches: Vec<Watch>,
    inflight: Inflight,
    /// Parent of every instance token.
    shutdown: CancellationToken,
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Holds the runtime weakly, so it stops once nothing else keeps it alive.
async fn listen(
    inner: Weak<Inner>,
    shutdown: CancellationToken,
    mut rx: broadcast::Receiver<Action>,
) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            received = rx.recv() => match received {
                Ok(action) => {
                    let Some(inner) = inner.upgrade() else { break };
                    inner.trigger(&action);
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "trigger loop lagged; actions dropped");
                }
                Err(RecvError::Closed) => break,
            },
        }
    }
    debug!("trigger loop stopped");
}

impl Inner {
    fn trigger(self: &Arc<Self>, action: &Action) -> Vec<TaskId> {
        if self.shutdown.is_cancelled() {
            return Vec::new();
        }

        self.watches
            .iter()
            .enumerate()
            .filter(|(_, watch)| watch.matches(action))
            .map(|(index, watch)| {
                debug!(tag = watch.tag(), policy = ?watch.policy(), "trigger matched");
                self.spawn(watch.start(action), Some(index))
            })
            .collect()
    }

    fn spawn(self: &Arc<Self>, mut saga: Box<dyn Saga>, origin: Option<usize>) -> TaskId {
        let id = TaskId::new();
        let cancel = self.shutdown.child_token();
        let watch = origin.map(|index| &self.watches[index]);

        if let Some(watch) = watch.filter(|w| w.policy() == Policy::Latest) {
            if let Some(previous) = watch.replace_current(id, cancel.clone()) {
                debug!(tag = watch.tag(), "cancelling previous instance");
                previous.cancel();
            }
        }

        let snapshot = TaskSnapshot {
            id,
            saga: saga.name().to_string(),
            tag: watch.map(|w| w.tag().to_string()),
            policy: watch.map(Watch::policy),
            started_at: Utc::now(),
        };
        let span = info_span!("saga", saga = %snapshot.saga, task = %id);
        self.inflight.insert(snapshot);

        let inner = Arc::clone(self);
        tokio::spawn(
            async move {
                debug!("started");
                let driven = AssertUnwindSafe(inner.driver.drive(&mut saga, &cancel))
                    .catch_unwind()
                    .await;
                match driven {
                    Ok(Ok(_)) => debug!("completed"),
                    Ok(Err(SagaError::Cancelled)) => debug!("cancelled"),
                    Ok(Err(err)) => warn!(error = %err, "saga failed; instance dropped"),
                    Err(_) => warn!("saga panicked; instance dropped"),
                }
                if let Some(index) = origin {
                    inner.watches[index].clear_if_current(id);
                }
                inner.inflight.remove(id);
            }
            .instrument(span),
        );

        id
    }
}

#[derive(Default)]
struct Inflight {
    tasks: DashMap<TaskId, TaskSnapshot>,
    idle: Notify,
}

impl Inflight {
    fn insert(&self, snapshot: TaskSnapshot) {
        self.tasks.insert(snapshot.id, snapshot);
    }

    fn remove(&self, id: TaskId) {
        self.tasks.remove(&id);
        if self.tasks.is_empty() {
            self.idle.notify_waiters();
        }
    }

    fn snapshot(&self) -> Vec<TaskSnapshot> {
        let mut tasks: Vec<_> = self.tasks.iter().map(|entry| entry.value().clone()).collect();
        tasks.sort_by_key(|task| task.started_at);
        tasks
    }

    async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            if self.tasks.is_empty() {
                return;
            }
            notified.await;
        }
    }
}
