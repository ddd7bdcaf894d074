use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// A unit of work: an opaque payload plus an optional per-task timeout.
///
/// A `timeout` of [`Duration::ZERO`] means the task has no deadline of its own
/// and is bounded only by the caller's cancellation token.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Work<V> {
  pub value: V,
  pub timeout: Duration,
}

impl<V> Work<V> {
  /// Work with no deadline of its own.
  pub fn new(value: V) -> Self {
    Self {
      value,
      timeout: Duration::ZERO,
    }
  }

  pub fn with_timeout(value: V, timeout: Duration) -> Self {
    Self { value, timeout }
  }

  /// Sets the per-task timeout. `Duration::ZERO` disables it.
  pub fn timeout(mut self, timeout: Duration) -> Self {
    self.timeout = timeout;
    self
  }

  pub fn has_timeout(&self) -> bool {
    !self.timeout.is_zero()
  }
}

/// A boxed task future, for callers that want to store task functions behind
/// a single type.
pub type WorkFuture<R, E> = Pin<Box<dyn Future<Output = Result<R, E>> + Send + 'static>>;

/// Why a [`WorkContext`] ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelCause {
  /// The caller's token fired, or the run that owned the context returned.
  Canceled,
  /// The task's own timeout elapsed.
  DeadlineExceeded,
}

impl fmt::Display for CancelCause {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      CancelCause::Canceled => f.write_str("context canceled"),
      CancelCause::DeadlineExceeded => f.write_str("context deadline exceeded"),
    }
  }
}

/// The effective cancellation context handed to a task function.
///
/// It ends when the caller's token fires, when the task's timeout elapses, or
/// when the run that created it returns, whichever happens first. Task
/// functions are expected to watch it; nothing forces them to stop.
#[derive(Debug, Clone)]
pub struct WorkContext {
  token: CancellationToken,
  deadline: Option<Instant>,
  cause: Arc<OnceLock<CancelCause>>,
}

impl WorkContext {
  /// Derives a context from `parent`, bounded additionally by `timeout` unless it is zero.
  pub(crate) fn derive(parent: &CancellationToken, timeout: Duration) -> Self {
    // A timeout too large to represent as an instant never fires.
    let deadline = if timeout.is_zero() {
      None
    } else {
      Instant::now().checked_add(timeout)
    };
    Self {
      token: parent.child_token(),
      deadline,
      cause: Arc::new(OnceLock::new()),
    }
  }

  /// Ends the context, recording `cause` unless a cause is already recorded.
  pub(crate) fn end(&self, cause: CancelCause) {
    let _ = self.cause.set(cause);
    self.token.cancel();
  }

  pub fn deadline(&self) -> Option<Instant> {
    self.deadline
  }

  /// Time left until the deadline, saturating at zero. `None` without a deadline.
  pub fn remaining(&self) -> Option<Duration> {
    self
      .deadline
      .map(|deadline| deadline.saturating_duration_since(Instant::now()))
  }

  /// Reports why the context ended, or `None` while it is still live.
  pub fn err(&self) -> Option<CancelCause> {
    if let Some(cause) = self.cause.get() {
      return Some(*cause);
    }
    if self.deadline.is_some_and(|deadline| Instant::now() >= deadline) {
      return Some(CancelCause::DeadlineExceeded);
    }
    if self.token.is_cancelled() {
      return Some(CancelCause::Canceled);
    }
    None
  }

  /// Synchronous check, for blocking task functions.
  pub fn is_cancelled(&self) -> bool {
    self.err().is_some()
  }

  /// Resolves once the context has ended.
  pub async fn cancelled(&self) {
    match self.deadline {
      Some(deadline) => {
        tokio::select! {
          _ = self.token.cancelled() => {}
          _ = tokio::time::sleep_until(deadline) => {}
        }
      }
      None => self.token.cancelled().await,
    }
  }

  /// The child token backing this context. It fires on caller cancellation and
  /// when the owning run returns, but not on its own at the deadline; use
  /// [`WorkContext::cancelled`] to observe both.
  pub fn token(&self) -> &CancellationToken {
    &self.token
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn zero_timeout_means_no_deadline() {
    let work = Work::new("foo");
    assert!(!work.has_timeout());
    let work = work.timeout(Duration::from_millis(10));
    assert!(work.has_timeout());
    assert_eq!(work, Work::with_timeout("foo", Duration::from_millis(10)));
  }

  #[tokio::test]
  async fn unrepresentable_timeout_means_no_deadline() {
    let parent = CancellationToken::new();
    let ctx = WorkContext::derive(&parent, Duration::MAX);
    assert!(ctx.deadline().is_none());
    assert!(ctx.remaining().is_none());
    assert_eq!(ctx.err(), None);

    parent.cancel();
    ctx.cancelled().await;
    assert_eq!(ctx.err(), Some(CancelCause::Canceled));
  }

  #[tokio::test]
  async fn context_without_deadline_follows_parent() {
    let parent = CancellationToken::new();
    let ctx = WorkContext::derive(&parent, Duration::ZERO);
    assert!(ctx.deadline().is_none());
    assert_eq!(ctx.err(), None);

    parent.cancel();
    ctx.cancelled().await;
    assert_eq!(ctx.err(), Some(CancelCause::Canceled));
  }

  #[tokio::test]
  async fn context_deadline_fires_without_parent() {
    let parent = CancellationToken::new();
    let ctx = WorkContext::derive(&parent, Duration::from_millis(20));
    assert!(ctx.remaining().is_some());

    tokio::time::timeout(Duration::from_secs(1), ctx.cancelled())
      .await
      .expect("deadline should end the context");
    assert_eq!(ctx.err(), Some(CancelCause::DeadlineExceeded));
    assert!(!parent.is_cancelled());
  }

  #[tokio::test]
  async fn first_recorded_cause_wins() {
    let parent = CancellationToken::new();
    let ctx = WorkContext::derive(&parent, Duration::from_millis(10));
    ctx.end(CancelCause::Canceled);
    tokio::time::sleep(Duration::from_millis(20)).await;
    ctx.end(CancelCause::DeadlineExceeded);
    assert_eq!(ctx.err(), Some(CancelCause::Canceled));
    assert!(ctx.token().is_cancelled());
  }
}
