use std::future::Future;
use std::time::Duration;

use futures::future::{select_all, BoxFuture, FutureExt};
use tokio::sync::watch;
use tokio::time::Instant;

use crate::service::DagError;

/// Cancellation and deadline scope for dag operations.
///  A context derived from another keeps every signal of its
///  parent, so cancelling a parent cancels all of its children.
#[derive(Debug, Clone, Default)]
pub struct Context {
    cancel: Vec<watch::Receiver<bool>>,
    deadline: Option<Instant>,
}

/// Cancels the context it was created with (and everything derived from it).
///  Dropping the handle does not cancel.
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

async fn cancelled(mut rx: watch::Receiver<bool>) {
    // a dropped handle can never cancel
    if rx.wait_for(|cancelled| *cancelled).await.is_err() {
        std::future::pending::<()>().await;
    }
}

impl Context {
    /// A context that is never cancelled and has no deadline
    pub fn background() -> Self {
        Self::default()
    }

    pub fn with_cancel(&self) -> (Context, CancelHandle) {
        let (tx, rx) = watch::channel(false);
        let mut ctx = self.clone();
        ctx.cancel.push(rx);
        (ctx, CancelHandle { tx })
    }

    /// Derive a context that expires at `deadline`, or at the
    ///  parent's deadline if that comes first
    pub fn with_deadline(&self, deadline: Instant) -> Context {
        let mut ctx = self.clone();
        ctx.deadline = Some(match self.deadline {
            Some(current) if current < deadline => current,
            _ => deadline,
        });
        ctx
    }

    pub fn with_timeout(&self, timeout: Duration) -> Context {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Why this context is done, if it is
    pub fn err(&self) -> Option<DagError> {
        if self.cancel.iter().any(|rx| *rx.borrow()) {
            return Some(DagError::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(DagError::DeadlineExceeded),
            _ => None,
        }
    }

    /// `Err` once the context is done
    pub fn check(&self) -> Result<(), DagError> {
        match self.err() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Resolves once the context is cancelled or its deadline passes
    pub async fn done(&self) -> DagError {
        let mut waits: Vec<BoxFuture<'static, DagError>> = self
            .cancel
            .iter()
            .cloned()
            .map(|rx| {
                async move {
                    cancelled(rx).await;
                    DagError::Cancelled
                }
                .boxed()
            })
            .collect();
        if let Some(deadline) = self.deadline {
            waits.push(
                async move {
                    tokio::time::sleep_until(deadline).await;
                    DagError::DeadlineExceeded
                }
                .boxed(),
            );
        }
        if waits.is_empty() {
            return std::future::pending().await;
        }
        let (err, _, _) = select_all(waits).await;
        err
    }

    /// Drive `fut` unless the context finishes first
    pub async fn run<F, T>(&self, fut: F) -> Result<T, DagError>
    where
        F: Future<Output = Result<T, DagError>>,
    {
        self.check()?;
        tokio::select! {
            biased;
            err = self.done() => Err(err),
            res = fut => res,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn test_background_never_done() {
        let ctx = Context::background();
        assert!(ctx.err().is_none());
        let res = ctx.run(async { Ok::<_, DagError>(7) }).await.unwrap();
        assert_eq!(res, 7);
    }

    #[tokio::test]
    async fn test_cancel_propagates_to_children() {
        let (parent, handle) = Context::background().with_cancel();
        let (child, _child_handle) = parent.with_cancel();
        let grandchild = child.with_timeout(Duration::from_secs(60));

        assert!(grandchild.check().is_ok());
        handle.cancel();
        assert!(matches!(grandchild.err(), Some(DagError::Cancelled)));
        assert!(matches!(grandchild.done().await, DagError::Cancelled));
        assert!(matches!(
            grandchild.run(async { Ok::<_, DagError>(()) }).await,
            Err(DagError::Cancelled)
        ));
    }

    #[tokio::test]
    async fn test_child_cancel_leaves_parent_alone() {
        let (parent, _handle) = Context::background().with_cancel();
        let (child, child_handle) = parent.with_cancel();
        child_handle.cancel();
        assert!(child.err().is_some());
        assert!(parent.err().is_none());
    }

    #[tokio::test]
    async fn test_dropped_handle_does_not_cancel() {
        let (ctx, handle) = Context::background().with_cancel();
        drop(handle);
        assert!(ctx.err().is_none());
        let res = ctx
            .run(async {
                tokio::time::sleep(Duration::from_millis(5)).await;
                Ok::<_, DagError>("done")
            })
            .await
            .unwrap();
        assert_eq!(res, "done");
    }

    #[tokio::test]
    async fn test_cancel_interrupts_pending_work() {
        let (ctx, handle) = Context::background().with_cancel();
        let work = ctx.run(async {
            std::future::pending::<()>().await;
            Ok::<_, DagError>(())
        });
        let canceller = async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            handle.cancel();
        };
        let (res, _) = tokio::join!(work, canceller);
        assert!(matches!(res, Err(DagError::Cancelled)));
    }

    #[tokio::test]
    async fn test_deadline() {
        let ctx = Context::background().with_timeout(Duration::from_millis(10));
        let res = ctx
            .run(async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok::<_, DagError>(())
            })
            .await;
        assert!(matches!(res, Err(DagError::DeadlineExceeded)));
        assert!(matches!(ctx.err(), Some(DagError::DeadlineExceeded)));

        // a later child deadline cannot extend the parent's
        let later = ctx.with_timeout(Duration::from_secs(60));
        assert_eq!(later.deadline(), ctx.deadline());
    }
}
