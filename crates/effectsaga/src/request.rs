//! Request/response over the action bus.
//!
//! Emit a trigger and wait for the first action a saga dispatches in answer.
//! This is sugar over [`ActionBus`]: it subscribes before emitting, so a fast
//! saga cannot answer before anyone is listening.

use crate::action::Action;
use crate::bus::ActionBus;
use crate::error::RequestError;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::warn;

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Emit `action` and wait up to [`DEFAULT_REQUEST_TIMEOUT`] for an action
/// accepted by `matches`.
pub async fn request<F>(bus: &ActionBus, action: Action, matches: F) -> Result<Action, RequestError>
where
    F: Fn(&Action) -> bool,
{
    request_timeout(bus, action, matches, DEFAULT_REQUEST_TIMEOUT).await
}

/// Like [`request`] with an explicit timeout.
pub async fn request_timeout<F>(
    bus: &ActionBus,
    action: Action,
    matches: F,
    timeout: Duration,
) -> Result<Action, RequestError>
where
    F: Fn(&Action) -> bool,
{
    let mut rx = bus.subscribe();
    bus.emit(action);

    let response = async {
        loop {
            match rx.recv().await {
                Ok(action) if matches(&action) => return action,
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "request lagged; response may have been dropped");
                }
                // `bus` owns a sender for as long as it is borrowed here.
                Err(RecvError::Closed) => unreachable!("action bus closed while borrowed"),
            }
        }
    };

    tokio::time::timeout(timeout, response)
        .await
        .map_err(|_| RequestError::Timeout(timeout))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::RuntimeBuilder;
    use crate::sagas::{DelayedIncrement, INCREMENT, INCREMENT_ASYNC};

    #[tokio::test]
    async fn resolves_with_the_saga_answer() {
        let bus = ActionBus::new();
        let _runtime = RuntimeBuilder::new(bus.clone())
            .watch_every(INCREMENT_ASYNC, |_| Box::new(DelayedIncrement::new()))
            .build()
            .start();

        let answer = request_timeout(
            &bus,
            Action::new(INCREMENT_ASYNC),
            |a| a.is(INCREMENT),
            Duration::from_secs(5),
        )
        .await
        .unwrap();

        assert_eq!(answer, Action::new(INCREMENT));
    }

    #[tokio::test]
    async fn times_out_without_an_answer() {
        let bus = ActionBus::new();
        let timeout = Duration::from_millis(20);

        let result = request_timeout(&bus, Action::new("PING"), |a| a.is("PONG"), timeout).await;

        assert!(matches!(result, Err(RequestError::Timeout(t)) if t == timeout));
    }
}
