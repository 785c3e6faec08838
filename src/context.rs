//! Per-request execution context.
//!
//! Carries the caller's cancellation signal and optional deadline down to
//! the token store. Backends that perform network I/O run every call through
//! [`RequestContext::run`]; the in-memory backend ignores the context.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::StoreError;

#[derive(Clone, Debug, Default)]
pub struct RequestContext {
    deadline: Option<Instant>,
    cancel: CancellationToken,
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deadline `timeout` from now.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Ties this context to a cancellation token owned by the caller,
    /// typically the transport layer's per-request token.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Drives `operation` until it completes, the context is cancelled, or
    /// the deadline passes, whichever comes first. The operation future is
    /// dropped on cancellation or timeout.
    pub async fn run<F, T>(&self, operation: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        if self.cancel.is_cancelled() {
            return Err(StoreError::Cancelled);
        }

        let bounded = async {
            match self.deadline {
                Some(deadline) => tokio::time::timeout_at(deadline, operation)
                    .await
                    .map_err(|_| StoreError::DeadlineExceeded)?,
                None => operation.await,
            }
        };

        tokio::select! {
            _ = self.cancel.cancelled() => Err(StoreError::Cancelled),
            result = bounded => result,
        }
    }
}
