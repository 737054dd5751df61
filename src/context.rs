//! Query context
//!
//! A single cancellation/timeout signal threaded through every index and chunk
//! call. Cloning is cheap and all clones observe the same signal.

use crate::query::{QueryError, QueryResult};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Cancellation and deadline shared by every worker of one query
#[derive(Debug, Clone, Default)]
pub struct QueryContext {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl QueryContext {
    /// A context that never expires unless cancelled
    pub fn new() -> Self {
        Self::default()
    }

    /// A context that expires after `timeout`
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: Some(Instant::now() + timeout),
        }
    }

    /// Derive a child context: cancelled with its parent, and optionally earlier
    pub fn child(&self, timeout: Option<Duration>) -> Self {
        let deadline = match (self.deadline, timeout) {
            (Some(parent), Some(t)) => Some(parent.min(Instant::now() + t)),
            (None, Some(t)) => Some(Instant::now() + t),
            (parent, None) => parent,
        };

        Self {
            token: self.token.child_token(),
            deadline,
        }
    }

    /// Signal cancellation to every holder of this context (and its children)
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// The error this context is in, if any
    pub fn err(&self) -> Option<QueryError> {
        if self.token.is_cancelled() {
            return Some(QueryError::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(QueryError::DeadlineExceeded),
            _ => None,
        }
    }

    /// `Err` if the context is already done
    pub fn check(&self) -> QueryResult<()> {
        match self.err() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Resolves once the context is cancelled or its deadline passes
    pub async fn done(&self) -> QueryError {
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    _ = self.token.cancelled() => QueryError::Cancelled,
                    _ = tokio::time::sleep_until(deadline.into()) => QueryError::DeadlineExceeded,
                }
            }
            None => {
                self.token.cancelled().await;
                QueryError::Cancelled
            }
        }
    }

    /// Run `fut` unless the context finishes first
    pub async fn run<F, T>(&self, fut: F) -> QueryResult<T>
    where
        F: std::future::Future<Output = QueryResult<T>>,
    {
        self.check()?;
        tokio::select! {
            res = fut => res,
            err = self.done() => Err(err),
        }
    }
}
