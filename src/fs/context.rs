//! Cancellable request context

use std::future::Future;

use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};

/// Execution context carried by every filesystem request.
///
/// Tied to the owning SSH connection: when the connection goes away the
/// token is cancelled and backend calls issued through [`RequestContext::run`]
/// stop with [`Error::Cancelled`].
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    token: CancellationToken,
}

impl RequestContext {
    pub fn new(token: CancellationToken) -> Self {
        Self { token }
    }

    /// Context for a nested scope, cancelled with its parent
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
        }
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Drive `fut` to completion unless the context is cancelled first
    pub async fn run<T, F>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        if self.token.is_cancelled() {
            return Err(Error::Cancelled);
        }

        tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(Error::Cancelled),
            result = fut => result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_run_completes() {
        let ctx = RequestContext::default();
        let value = ctx.run(async { Ok(42) }).await.unwrap();
        assert_eq!(value, 42);
    }

    #[tokio::test]
    async fn test_cancel_aborts_pending_call() {
        let ctx = RequestContext::default();
        let child = ctx.child();

        let pending = tokio::spawn(async move {
            child
                .run(async {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Ok(())
                })
                .await
        });

        tokio::time::sleep(Duration::from_millis(10)).await;
        ctx.cancel();

        let result = pending.await.unwrap();
        assert!(matches!(result, Err(Error::Cancelled)));
    }

    #[tokio::test]
    async fn test_cancelled_context_short_circuits() {
        let ctx = RequestContext::default();
        ctx.cancel();
        assert!(ctx.is_cancelled());
        assert!(matches!(ctx.run(async { Ok(()) }).await, Err(Error::Cancelled)));
    }
}
