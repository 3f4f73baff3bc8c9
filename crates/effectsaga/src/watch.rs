//! Watch registrations: which sagas start for which trigger actions.

use crate::action::Action;
use crate::runtime::TaskId;
use crate::saga::Saga;
use serde::Serialize;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use tokio_util::sync::CancellationToken;

/// Builds a fresh saga for a trigger action.
pub type SagaFactory = Arc<dyn Fn(&Action) -> Box<dyn Saga> + Send + Sync>;

/// Concurrency policy for a watch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Policy {
    /// Start an instance per trigger. Instances run concurrently and are
    /// never cancelled by later triggers.
    Every,
    /// Start an instance per trigger, cancelling the previous instance of the
    /// same registration first.
    Latest,
}

/// A standing `tag -> factory` binding under a [`Policy`].
pub struct Watch {
    tag: String,
    policy: Policy,
    factory: SagaFactory,
    current: Mutex<Option<Current>>,
}

struct Current {
    task: TaskId,
    cancel: CancellationToken,
}

impl Watch {
    pub(crate) fn new(tag: impl Into<String>, policy: Policy, factory: SagaFactory) -> Self {
        Self {
            tag: tag.into(),
            policy,
            factory,
            current: Mutex::new(None),
        }
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn policy(&self) -> Policy {
        self.policy
    }

    pub fn matches(&self, action: &Action) -> bool {
        action.is(&self.tag)
    }

    pub(crate) fn start(&self, action: &Action) -> Box<dyn Saga> {
        (self.factory)(action)
    }

    /// Install `task` as the current instance, returning the displaced
    /// instance's token.
    pub(crate) fn replace_current(
        &self,
        task: TaskId,
        cancel: CancellationToken,
    ) -> Option<CancellationToken> {
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        current
            .replace(Current { task, cancel })
            .map(|previous| previous.cancel)
    }

    /// Empty the slot, unless a newer instance already took it.
    pub(crate) fn clear_if_current(&self, task: TaskId) {
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        if current.as_ref().is_some_and(|c| c.task == task) {
            *current = None;
        }
    }

    #[cfg(test)]
    pub(crate) fn current_task(&self) -> Option<TaskId> {
        let current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        current.as_ref().map(|c| c.task)
    }
}

impl fmt::Debug for Watch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Watch")
            .field("tag", &self.tag)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sagas::Hello;

    fn hello_watch(policy: Policy) -> Watch {
        Watch::new(
            "HELLO",
            policy,
            Arc::new(|_: &Action| Box::new(Hello::new()) as Box<dyn Saga>),
        )
    }

    #[test]
    fn matches_on_kind_only() {
        let watch = hello_watch(Policy::Every);

        assert!(watch.matches(&Action::new("HELLO").with("extra", 1)));
        assert!(!watch.matches(&Action::new("hello")));
    }

    #[test]
    fn replacing_returns_previous_token() {
        let watch = hello_watch(Policy::Latest);
        let first = CancellationToken::new();
        let (a, b) = (TaskId::new(), TaskId::new());

        assert!(watch.replace_current(a, first.clone()).is_none());
        let displaced = watch
            .replace_current(b, CancellationToken::new())
            .expect("first displaced");
        displaced.cancel();

        assert!(first.is_cancelled());
        assert_eq!(watch.current_task(), Some(b));
    }

    #[test]
    fn stale_instances_do_not_clear_the_slot() {
        let watch = hello_watch(Policy::Latest);
        let (a, b) = (TaskId::new(), TaskId::new());
        watch.replace_current(a, CancellationToken::new());
        watch.replace_current(b, CancellationToken::new());

        watch.clear_if_current(a);
        assert_eq!(watch.current_task(), Some(b));

        watch.clear_if_current(b);
        assert_eq!(watch.current_task(), None);
    }
}
