use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::Error;

/// Why a [`ScanContext`] finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextError {
    DeadlineExceeded,
    Canceled,
}

impl From<ContextError> for Error {
    fn from(reason: ContextError) -> Self {
        match reason {
            ContextError::DeadlineExceeded => Error::ScanTimeout,
            ContextError::Canceled => Error::ScanInterrupt,
        }
    }
}

/// Deadline and cancellation carrier bound to one scan.
///
/// The running nmap process is killed as soon as the deadline passes or the
/// token is cancelled. Clones share the same token.
#[derive(Debug, Clone, Default)]
pub struct ScanContext {
    cancel: CancellationToken,
    deadline: Option<Instant>,
}

impl ScanContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Expire `timeout` from now.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(existing) => existing.min(deadline),
            None => deadline,
        });
        self
    }

    /// Use an externally owned token, e.g. one shared with a Ctrl-C handler.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// The reason the context is done, if it is. A passed deadline wins over cancellation.
    pub fn error(&self) -> Option<ContextError> {
        if self.deadline.is_some_and(|at| Instant::now() >= at) {
            Some(ContextError::DeadlineExceeded)
        } else if self.cancel.is_cancelled() {
            Some(ContextError::Canceled)
        } else {
            None
        }
    }

    /// Resolves once the deadline passes or the token is cancelled.
    pub async fn done(&self) -> ContextError {
        match self.deadline {
            Some(at) => tokio::select! {
                _ = self.cancel.cancelled() => ContextError::Canceled,
                _ = tokio::time::sleep_until(at) => ContextError::DeadlineExceeded,
            },
            None => {
                self.cancel.cancelled().await;
                ContextError::Canceled
            }
        }
    }
}
