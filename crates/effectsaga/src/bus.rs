//! Action sink and the in-memory action bus.

use crate::action::Action;
use tokio::sync::broadcast;
use tracing::trace;

/// Default number of actions a lagging subscriber may fall behind by.
pub const DEFAULT_BUS_CAPACITY: usize = 1024;

/// Where dispatched actions go.
///
/// Delivery is synchronous: the driver calls `deliver` and resumes the saga
/// only after it returns, so dispatches from one instance keep their order.
pub trait ActionSink: Send + Sync + 'static {
    fn deliver(&self, action: Action);
}

/// Broadcast bus carrying actions between sagas and the outside world.
///
/// Delivery is at-most-once. Actions emitted with no subscriber are dropped,
/// and a subscriber that falls more than the capacity behind loses the oldest
/// actions.
#[derive(Debug, Clone)]
pub struct ActionBus {
    tx: broadcast::Sender<Action>,
}

impl ActionBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_BUS_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publish an action. Returns how many subscribers received it.
    pub fn emit(&self, action: Action) -> usize {
        trace!(kind = %action.kind, "emit");
        self.tx.send(action).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Action> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for ActionBus {
    fn default() -> Self {
        Self::new()
    }
}

impl ActionSink for ActionBus {
    fn deliver(&self, action: Action) {
        self.emit(action);
    }
}
