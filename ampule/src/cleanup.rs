//! Per-layer teardown stacks.
//!
//! Every scope layer owns one [`CleanupStack`]: an append-only list of
//! teardown actions registered as instances are constructed, drained in
//! strict reverse order exactly once when the layer exits. Action failures
//! are logged and collected; a failing action never prevents the actions
//! after it from running.

use futures_util::future::BoxFuture;
use parking_lot::Mutex;
use tracing::{debug, error};

use crate::error::CleanupError;

/// One teardown action, capturing the produced instance it tears down.
pub(crate) enum CleanupAction {
    Sync(Box<dyn FnOnce() -> anyhow::Result<()> + Send>),
    Async(Box<dyn FnOnce() -> BoxFuture<'static, anyhow::Result<()>> + Send>),
}

/// LIFO stack of teardown actions for one scope layer.
#[derive(Default)]
pub(crate) struct CleanupStack {
    actions: Mutex<Vec<CleanupAction>>,
}

impl CleanupStack {
    pub fn push(&self, action: CleanupAction) {
        self.actions.lock().push(action);
    }

    fn take(&self) -> Vec<CleanupAction> {
        std::mem::take(&mut *self.actions.lock())
    }

    /// Drains the stack synchronously, newest action first.
    ///
    /// Async actions cannot run here; each one is recorded as a failure so
    /// the omission is never silent. Draining an empty stack is a no-op.
    pub fn drain_sync(&self) -> Result<(), CleanupError> {
        let actions = self.take();
        if actions.is_empty() {
            return Ok(());
        }
        debug!(actions = actions.len(), "draining cleanup stack");

        let mut errors = Vec::new();
        for action in actions.into_iter().rev() {
            match action {
                CleanupAction::Sync(run) => {
                    if let Err(err) = run() {
                        error!(error = %err, "cleanup action failed");
                        errors.push(err);
                    }
                }
                CleanupAction::Async(_) => {
                    error!("async cleanup action reached a sync drain; use an async scope exit");
                    errors.push(anyhow::anyhow!(
                        "async cleanup action requires an async scope exit"
                    ));
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(CleanupError::new(errors))
        }
    }

    /// Drains the stack from an async exit, newest action first.
    ///
    /// Async actions are awaited; sync actions run inline in the same LIFO
    /// order. Draining an empty stack is a no-op.
    pub async fn drain_async(&self) -> Result<(), CleanupError> {
        let actions = self.take();
        if actions.is_empty() {
            return Ok(());
        }
        debug!(actions = actions.len(), "draining cleanup stack (async)");

        let mut errors = Vec::new();
        for action in actions.into_iter().rev() {
            let outcome = match action {
                CleanupAction::Sync(run) => run(),
                CleanupAction::Async(start) => start().await,
            };
            if let Err(err) = outcome {
                error!(error = %err, "cleanup action failed");
                errors.push(err);
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(CleanupError::new(errors))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_drain_runs_in_reverse_order() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let stack = CleanupStack::default();
        for i in 0..3 {
            let order = order.clone();
            stack.push(CleanupAction::Sync(Box::new(move || {
                order.lock().push(i);
                Ok(())
            })));
        }

        stack.drain_sync().unwrap();
        assert_eq!(*order.lock(), vec![2, 1, 0]);
    }

    #[test]
    fn test_failing_action_does_not_stop_drain() {
        let ran = Arc::new(AtomicUsize::new(0));
        let stack = CleanupStack::default();

        let counter = ran.clone();
        stack.push(CleanupAction::Sync(Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })));
        stack.push(CleanupAction::Sync(Box::new(|| {
            anyhow::bail!("boom")
        })));

        let err = stack.drain_sync().unwrap_err();
        assert_eq!(err.errors().len(), 1);
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_second_drain_is_noop() {
        let ran = Arc::new(AtomicUsize::new(0));
        let stack = CleanupStack::default();
        let counter = ran.clone();
        stack.push(CleanupAction::Sync(Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })));

        stack.drain_sync().unwrap();
        assert!(stack.drain_sync().is_ok());
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_async_drain_mixes_action_kinds() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let stack = CleanupStack::default();

        let o = order.clone();
        stack.push(CleanupAction::Sync(Box::new(move || {
            o.lock().push("sync");
            Ok(())
        })));
        let o = order.clone();
        stack.push(CleanupAction::Async(Box::new(
            move || -> BoxFuture<'static, anyhow::Result<()>> {
                Box::pin(async move {
                    o.lock().push("async");
                    Ok(())
                })
            },
        )));

        stack.drain_async().await.unwrap();
        assert_eq!(*order.lock(), vec!["async", "sync"]);
    }

    #[test]
    fn test_sync_drain_reports_async_actions() {
        let stack = CleanupStack::default();
        stack.push(CleanupAction::Async(Box::new(
            || -> BoxFuture<'static, anyhow::Result<()>> { Box::pin(async { Ok(()) }) },
        )));
        let err = stack.drain_sync().unwrap_err();
        assert_eq!(err.errors().len(), 1);
    }
}
