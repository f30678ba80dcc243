//! Per-operation context carrying the host's cancellation signal.

use std::future::pending;

use tokio::sync::watch;

/// Context handed to every resource operation.
#[derive(Debug, Clone)]
pub struct OperationContext {
    cancel: watch::Receiver<bool>,
}

/// Host side of the cancellation signal.
#[derive(Debug)]
pub struct CancelHandle(watch::Sender<bool>);

impl CancelHandle {
    /// Signal cancellation to every clone of the context.
    pub fn cancel(&self) {
        self.0.send_replace(true);
    }
}

impl OperationContext {
    /// Create a context and the handle that cancels it.
    #[must_use]
    pub fn new() -> (Self, CancelHandle) {
        let (tx, rx) = watch::channel(false);
        (Self { cancel: rx }, CancelHandle(tx))
    }

    /// A context that is never cancelled.
    #[must_use]
    pub fn background() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self { cancel: rx }
    }

    /// True once cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.cancel.borrow()
    }

    /// Resolves when cancellation is requested; never resolves otherwise.
    pub async fn cancelled(&self) {
        let mut rx = self.cancel.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                // Sender gone without cancelling.
                pending::<()>().await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn cancel_wakes_waiters() {
        let (ctx, handle) = OperationContext::new();
        assert!(!ctx.is_cancelled());

        let waiter = {
            let ctx = ctx.clone();
            tokio::spawn(async move { ctx.cancelled().await })
        };
        handle.cancel();
        waiter.await.unwrap();
        assert!(ctx.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn background_never_cancels() {
        let ctx = OperationContext::background();
        let outcome = tokio::time::timeout(Duration::from_secs(60), ctx.cancelled()).await;
        assert!(outcome.is_err());
        assert!(!ctx.is_cancelled());
    }
}
