//! The deadline-bounded cancellation token of the shutdown phase.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Handed to every [`App::stop`](crate::module::App::stop).
///
/// Cancelled when the deadline elapses, when any holder calls
/// [`abort`](Self::abort) (a module giving up, or a second interrupt), or
/// immediately for a zero duration. Clones share the same state.
#[derive(Debug, Clone)]
pub struct GracefulShutdown {
    token: CancellationToken,
    aborted: Arc<AtomicBool>,
    deadline: Instant,
}

impl GracefulShutdown {
    /// Must be called from within a Tokio runtime; the deadline timer runs as
    /// a task.
    pub fn new(duration: Duration) -> Self {
        let token = CancellationToken::new();
        let deadline = Instant::now() + duration;

        if duration.is_zero() {
            token.cancel();
        } else {
            let timer = token.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = tokio::time::sleep_until(deadline) => timer.cancel(),
                    _ = timer.cancelled() => {}
                }
            });
        }

        Self {
            token,
            aborted: Arc::new(AtomicBool::new(false)),
            deadline,
        }
    }

    /// Zero once the deadline passed or the token was cancelled.
    pub fn remaining(&self) -> Duration {
        if self.is_cancelled() {
            return Duration::ZERO;
        }
        self.deadline.saturating_duration_since(Instant::now())
    }

    /// Cancels the deadline for every holder right away.
    pub fn abort(&self) {
        if !self.token.is_cancelled() {
            self.aborted.store(true, Ordering::SeqCst);
        }
        self.token.cancel();
    }

    /// Whether cancellation came from [`abort`](Self::abort) rather than
    /// the deadline.
    pub fn was_aborted(&self) -> bool {
        self.aborted.load(Ordering::SeqCst)
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }

    /// A child token, for handing to code that already speaks
    /// `tokio_util` cancellation.
    pub fn child_token(&self) -> CancellationToken {
        self.token.child_token()
    }
}
