//! Cancellation context threaded through every remote call of a cycle.

use std::future::Future;

use tokio::sync::watch;

use crate::error::Cancelled;

/// Carries the cancellation signal for one reconciliation cycle.
///
/// The signal is the same `watch` channel the worker uses for shutdown: the
/// context is cancelled once `true` has been sent. A context whose sender was
/// dropped without sending `true` is never cancelled.
#[derive(Debug, Clone)]
pub struct Context {
    cancel: watch::Receiver<bool>,
}

impl Context {
    /// Create a context driven by a shutdown receiver.
    pub fn new(cancel: watch::Receiver<bool>) -> Self {
        Self { cancel }
    }

    /// A context that is never cancelled.
    pub fn background() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self { cancel: rx }
    }

    /// Returns true if cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        *self.cancel.borrow()
    }

    /// Resolves once cancellation has been requested.
    pub async fn cancelled(&self) {
        let mut rx = self.cancel.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                // Sender gone without cancelling.
                std::future::pending::<()>().await;
            }
        }
    }

    /// Run a call, aborting it as soon as cancellation is requested.
    pub async fn run<F, T, E>(&self, call: F) -> Result<T, E>
    where
        F: Future<Output = Result<T, E>>,
        E: From<Cancelled>,
    {
        if self.is_cancelled() {
            return Err(Cancelled.into());
        }

        tokio::select! {
            biased;
            _ = self.cancelled() => Err(Cancelled.into()),
            result = call => result,
        }
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::background()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn test_background_context_runs_to_completion() {
        let ctx = Context::background();
        let result: Result<u32, Cancelled> = ctx.run(async { Ok(7) }).await;
        assert_eq!(result, Ok(7));
        assert!(!ctx.is_cancelled());
    }

    #[tokio::test]
    async fn test_cancel_aborts_pending_call() {
        let (tx, rx) = watch::channel(false);
        let ctx = Context::new(rx);

        let call = ctx.run(async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok::<_, Cancelled>(())
        });

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            tx.send(true).unwrap();
        });

        assert_eq!(call.await, Err(Cancelled));
    }

    #[tokio::test]
    async fn test_already_cancelled_skips_call() {
        let (tx, rx) = watch::channel(false);
        tx.send(true).unwrap();
        let ctx = Context::new(rx);

        let result: Result<(), Cancelled> = ctx.run(std::future::pending()).await;
        assert_eq!(result, Err(Cancelled));
    }
}
