//! Request context: cancellation and deadlines for a single call.
//!
//! Every suspension point in a flow (pipe hand-off, rate limiter wait, batch
//! response, retry backoff) races its primary condition against
//! [`Context::done`], so cancellation wins against a late success.

use crate::Error;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Cancellation token plus an optional deadline, cheap to clone.
#[derive(Debug, Clone)]
pub struct Context {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl Context {
    /// A context that is never cancelled unless [`Context::cancel`] is called.
    pub fn background() -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: None,
        }
    }

    /// Derive a context that is cancelled with its parent, and can be cancelled
    /// on its own without affecting the parent.
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            deadline: self.deadline,
        }
    }

    /// Derive a child context whose deadline is `timeout` from now (or the
    /// parent's deadline, whichever is earlier).
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn with_deadline(&self, deadline: Instant) -> Self {
        let deadline = match self.deadline {
            Some(parent) if parent < deadline => parent,
            _ => deadline,
        };
        Self {
            token: self.token.child_token(),
            deadline: Some(deadline),
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Cancel this context and every context derived from it.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Returns the terminal error if the context is already done.
    pub fn err(&self) -> Option<Error> {
        if self.token.is_cancelled() {
            return Some(Error::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(Error::DeadlineExceeded),
            _ => None,
        }
    }

    pub fn is_done(&self) -> bool {
        self.err().is_some()
    }

    /// Resolves once the context is cancelled or its deadline passes, yielding
    /// the matching error.
    pub async fn done(&self) -> Error {
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    _ = self.token.cancelled() => Error::Cancelled,
                    _ = tokio::time::sleep_until(deadline) => Error::DeadlineExceeded,
                }
            }
            None => {
                self.token.cancelled().await;
                Error::Cancelled
            }
        }
    }

    /// Cancels this context when the returned guard is dropped.
    pub(crate) fn cancel_on_drop(&self) -> tokio_util::sync::DropGuard {
        self.token.clone().drop_guard()
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::background()
    }
}
