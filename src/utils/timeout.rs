//! Timeout constants and bounded waits.
//!
//! [`Wait`] describes how long a blocking client operation may run: an
//! optional deadline and an optional cancellation token. `Wait::default()`
//! waits until the operation finishes.

use std::future::Future;
use std::time::Duration;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;

use crate::error::{ProtocolError, Result};

/// How long one `pump` waits for socket readability
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Bound on a single TCP connect attempt
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default bound on login and correlated requests
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Bound on flushing the terminator during close
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

/// Run `fut`, mapping expiry to `ProtocolError::Timeout`.
pub async fn with_timeout_error<F, T>(fut: F, duration: Duration) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match time::timeout(duration, fut).await {
        Ok(result) => result,
        Err(_) => Err(ProtocolError::Timeout),
    }
}

/// Bounds on a blocking wait.
#[derive(Debug, Clone, Default)]
pub struct Wait {
    deadline: Option<Instant>,
    cancel: Option<CancellationToken>,
}

impl Wait {
    /// Wait without bound.
    pub fn forever() -> Self {
        Self::default()
    }

    /// Give up after `duration` from now.
    pub fn timeout(duration: Duration) -> Self {
        Self::until(Instant::now() + duration)
    }

    pub fn until(deadline: Instant) -> Self {
        Self {
            deadline: Some(deadline),
            cancel: None,
        }
    }

    /// Also stop when `token` is cancelled.
    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// `Err(Cancelled)` or `Err(Timeout)` once the wait is over.
    pub fn check(&self) -> Result<()> {
        if self.cancel.as_ref().is_some_and(CancellationToken::is_cancelled) {
            return Err(ProtocolError::Cancelled);
        }
        if self.deadline.is_some_and(|d| Instant::now() >= d) {
            return Err(ProtocolError::Timeout);
        }
        Ok(())
    }

    /// Longest single poll that still honours the deadline.
    pub fn poll_budget(&self, poll: Duration) -> Duration {
        match self.deadline {
            Some(deadline) => poll.min(deadline.saturating_duration_since(Instant::now())),
            None => poll,
        }
    }
}
