//! Per-call cancellation and deadlines

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::error::{RepositoryError, RepositoryOperation};
use super::traits::RepositoryResult;

/// Carries the caller's cancellation token and deadline into a repository call
///
/// ```rust
/// use std::time::Duration;
/// use kbase::repository::CallContext;
/// use tokio_util::sync::CancellationToken;
///
/// let token = CancellationToken::new();
/// let ctx = CallContext::new()
///     .with_cancellation(token.clone())
///     .with_timeout(Duration::from_secs(2));
/// token.cancel();
/// assert!(ctx.is_cancelled());
/// ```
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    cancellation: CancellationToken,
    deadline: Option<Instant>,
}

impl CallContext {
    /// A context that is never cancelled and has no deadline
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    #[must_use]
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Deadline `timeout` from now
    #[must_use]
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Drive `work` until it finishes or the call is interrupted
///
/// Cancellation wins over the deadline, which wins over the configured
/// `timeout`. An interrupted `work` future is dropped.
pub(crate) async fn supervise<F, T>(
    ctx: &CallContext,
    timeout: Option<Duration>,
    operation: RepositoryOperation,
    work: F,
) -> RepositoryResult<T>
where
    F: Future<Output = RepositoryResult<T>> + Send,
{
    let timeout_at = timeout.map(|after| Instant::now() + after);
    tokio::select! {
        biased;
        _ = ctx.cancellation.cancelled() => Err(RepositoryError::cancelled(operation)),
        _ = sleep_until_opt(ctx.deadline) => Err(RepositoryError::deadline_exceeded(operation)),
        _ = sleep_until_opt(timeout_at) => Err(RepositoryError::timeout(
            operation,
            timeout.unwrap_or_default(),
        )),
        result = work => result,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::RepositoryErrorKind;

    #[tokio::test]
    async fn test_work_completes() {
        let ctx = CallContext::new();
        let result = supervise(&ctx, None, RepositoryOperation::GetAll, async { Ok(7) }).await;
        assert_eq!(result, Ok(7));
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let token = CancellationToken::new();
        token.cancel();
        let ctx = CallContext::new().with_cancellation(token);
        let result = supervise(&ctx, None, RepositoryOperation::Add, async { Ok(()) }).await;
        assert_eq!(result.map_err(|e| e.kind), Err(RepositoryErrorKind::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_and_timeout() {
        let ctx = CallContext::new().with_timeout(Duration::from_millis(10));
        let result = supervise(&ctx, None, RepositoryOperation::GetAll, async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            Ok(())
        })
        .await;
        assert_eq!(result.map_err(|e| e.kind), Err(RepositoryErrorKind::DeadlineExceeded));

        let ctx = CallContext::new();
        let result = supervise(
            &ctx,
            Some(Duration::from_millis(10)),
            RepositoryOperation::GetAll,
            async {
                tokio::time::sleep(Duration::from_secs(1)).await;
                Ok(())
            },
        )
        .await;
        assert_eq!(result.map_err(|e| e.kind), Err(RepositoryErrorKind::Timeout));
    }
}
