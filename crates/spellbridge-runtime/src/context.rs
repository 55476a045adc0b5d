//! Per-call execution context.

use std::future::Future;

use tokio_util::sync::CancellationToken;

use crate::error::{BridgeError, BridgeResult};

/// Context passed to every lifecycle and method call.
///
/// Carries the caller's cancellation signal. Cloning the context shares the
/// signal; [`ExecutionContext::child`] derives a context that is cancelled
/// together with its parent but can also be cancelled on its own.
#[derive(Debug, Clone, Default)]
pub struct ExecutionContext {
    token: CancellationToken,
    caller: Option<String>,
}

impl ExecutionContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a context around an existing cancellation token.
    pub fn with_token(token: CancellationToken) -> Self {
        Self {
            token,
            caller: None,
        }
    }

    /// Tag the context with the name of the calling script.
    pub fn with_caller(mut self, caller: impl Into<String>) -> Self {
        self.caller = Some(caller.into());
        self
    }

    pub fn caller(&self) -> Option<&str> {
        self.caller.as_deref()
    }

    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            caller: self.caller.clone(),
        }
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Fail with [`BridgeError::Cancelled`] if the context was cancelled.
    pub fn check_cancelled(&self) -> BridgeResult<()> {
        if self.token.is_cancelled() {
            Err(BridgeError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Wait until the context is cancelled.
    pub async fn cancelled(&self) {
        self.token.cancelled().await;
    }

    /// Run `operation` unless the context is cancelled first.
    pub async fn run<F, T>(&self, operation: F) -> BridgeResult<T>
    where
        F: Future<Output = BridgeResult<T>>,
    {
        tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(BridgeError::Cancelled),
            result = operation => result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_check_cancelled() {
        let ctx = ExecutionContext::new();
        assert!(ctx.check_cancelled().is_ok());
        ctx.cancel();
        assert!(ctx.check_cancelled().unwrap_err().is_cancelled());
    }

    #[test]
    fn test_child_follows_parent() {
        let parent = ExecutionContext::new().with_caller("agent.lua");
        let child = parent.child();
        assert_eq!(child.caller(), Some("agent.lua"));

        child.cancel();
        assert!(!parent.is_cancelled());

        let other = parent.child();
        parent.cancel();
        assert!(other.is_cancelled());
    }

    #[tokio::test]
    async fn test_run_stops_on_cancel() {
        let ctx = ExecutionContext::new();
        let cancel = ctx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            cancel.cancel();
        });

        let result: BridgeResult<()> = ctx
            .run(async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(())
            })
            .await;
        assert!(result.unwrap_err().is_cancelled());
    }

    #[tokio::test]
    async fn test_run_completes() {
        let ctx = ExecutionContext::new();
        let value = ctx.run(async { Ok(42) }).await.unwrap();
        assert_eq!(value, 42);
    }
}
