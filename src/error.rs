use std::time::Duration;

use thiserror::Error;

/// Errors raised by the pool itself: construction and admission.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
  #[error("Pool capacity must be greater than zero (got {0})")]
  InvalidCapacity(usize),

  #[error("Acquire timeout: no worker became available within {0:?}")]
  AcquireTimeout(Duration),

  #[error("Acquire was cancelled before a worker became available")]
  Canceled,

  #[error("Pool is shutting down or already shut down, cannot hand out workers")]
  Closed,
}

impl PoolError {
  /// Returns a short stable label (snake_case) for use in logs.
  pub fn as_label(&self) -> &'static str {
    match self {
      PoolError::InvalidCapacity(_) => "pool_invalid_capacity",
      PoolError::AcquireTimeout(_) => "pool_acquire_timeout",
      PoolError::Canceled => "pool_acquire_canceled",
      PoolError::Closed => "pool_closed",
    }
  }
}

/// The outcome of running a task through a [`Worker`](crate::Worker) or a [`Pool`](crate::Pool).
///
/// `E` is the task function's own error type. It is carried untouched in
/// [`WorkError::Task`]; everything else is produced by the pool or the worker.
#[derive(Error, Debug, PartialEq)]
pub enum WorkError<E> {
  #[error(transparent)]
  Pool(#[from] PoolError),

  #[error("Task was cancelled")]
  Canceled,

  #[error("Task deadline of {0:?} exceeded")]
  DeadlineExceeded(Duration),

  #[error("Task function panicked")]
  Panicked,

  #[error("{0}")]
  Task(E),
}

impl<E> WorkError<E> {
  /// True when the caller's cancellation signal ended the call, whether it
  /// fired while waiting for a worker or while the task was running.
  pub fn is_canceled(&self) -> bool {
    matches!(self, WorkError::Canceled | WorkError::Pool(PoolError::Canceled))
  }

  /// True for both the acquire-side and the task-side timeout.
  pub fn is_timeout(&self) -> bool {
    matches!(
      self,
      WorkError::DeadlineExceeded(_) | WorkError::Pool(PoolError::AcquireTimeout(_))
    )
  }

  /// Returns the task function's own error, if that is what this is.
  pub fn into_task_error(self) -> Option<E> {
    match self {
      WorkError::Task(err) => Some(err),
      _ => None,
    }
  }

  /// Returns a short stable label (snake_case) for use in logs.
  pub fn as_label(&self) -> &'static str {
    match self {
      WorkError::Pool(err) => err.as_label(),
      WorkError::Canceled => "work_canceled",
      WorkError::DeadlineExceeded(_) => "work_deadline_exceeded",
      WorkError::Panicked => "work_panicked",
      WorkError::Task(_) => "work_task_failed",
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn acquire_cancellation_counts_as_canceled() {
    let err: WorkError<String> = PoolError::Canceled.into();
    assert!(err.is_canceled());
    assert!(!err.is_timeout());
    assert_eq!(err.as_label(), "pool_acquire_canceled");
  }

  #[test]
  fn both_timeouts_are_timeouts_but_distinct() {
    let acquire: WorkError<String> = PoolError::AcquireTimeout(Duration::from_millis(5)).into();
    let deadline: WorkError<String> = WorkError::DeadlineExceeded(Duration::from_millis(5));
    assert!(acquire.is_timeout());
    assert!(deadline.is_timeout());
    assert_ne!(acquire, deadline);
    assert!(!acquire.is_canceled());
  }

  #[test]
  fn task_error_passes_through() {
    let err = WorkError::Task("oops".to_string());
    assert_eq!(err.to_string(), "oops");
    assert_eq!(err.into_task_error(), Some("oops".to_string()));
    assert_eq!(WorkError::<String>::Panicked.into_task_error(), None);
  }
}
