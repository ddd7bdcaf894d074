use crate::error::WorkError;
use crate::work::{CancelCause, Work, WorkContext};

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::Duration;

use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info_span, trace, Instrument};

lazy_static::lazy_static! {
  static ref NEXT_WORKER_ID_COUNTER: AtomicU64 = AtomicU64::new(0);
}

/// A reusable execution slot. Runs one task per call and keeps no state
/// between calls.
///
/// Workers are usually handed out by a [`Pool`](crate::Pool), but a
/// free-standing one from [`Worker::new`] is just as usable.
#[derive(Debug)]
pub struct Worker {
  id: u64,
}

impl Default for Worker {
  fn default() -> Self {
    Self::new()
  }
}

impl Worker {
  pub fn new() -> Self {
    Self {
      id: NEXT_WORKER_ID_COUNTER.fetch_add(1, AtomicOrdering::Relaxed),
    }
  }

  /// Process-unique id of this worker.
  pub fn id(&self) -> u64 {
    self.id
  }

  /// Runs `f` against `work` on a separate Tokio task and waits for whichever
  /// comes first: the function's result, the caller's `cancel` token, or the
  /// task's own timeout.
  ///
  /// If cancellation or the deadline wins, this returns immediately with
  /// [`WorkError::Canceled`] or [`WorkError::DeadlineExceeded`]. The task
  /// function is not aborted; it keeps running in the background until it
  /// notices its [`WorkContext`] ended, and whatever it returns is discarded.
  ///
  /// Takes `&mut self`, so one worker (or one lease) never runs two task
  /// functions at once:
  ///
  /// ```compile_fail
  /// use werk::{CancellationToken, Pool, Work};
  ///
  /// async fn two_at_once(pool: Pool) {
  ///   let cancel = CancellationToken::new();
  ///   let mut lease = pool.acquire(&cancel).await.unwrap();
  ///   let first = lease.run(&cancel, Work::new(1u8), |_ctx, v| async move { Ok::<u8, String>(v) });
  ///   let second = lease.run(&cancel, Work::new(2u8), |_ctx, v| async move { Ok::<u8, String>(v) });
  ///   let _ = tokio::join!(first, second);
  /// }
  /// ```
  pub async fn run<V, R, E, F, Fut>(
    &mut self,
    cancel: &CancellationToken,
    work: Work<V>,
    f: F,
  ) -> Result<R, WorkError<E>>
  where
    V: Send + 'static,
    R: Send + 'static,
    E: Send + 'static,
    F: FnOnce(WorkContext, V) -> Fut + Send + 'static,
    Fut: Future<Output = Result<R, E>> + Send + 'static,
  {
    let ctx = WorkContext::derive(cancel, work.timeout);
    let task_ctx = ctx.clone();
    let value = work.value;

    let join = tokio::spawn(
      async move { f(task_ctx, value).await }.instrument(info_span!("werk_task", worker_id = %self.id)),
    );

    self.race(ctx, work.timeout, join).await
  }

  /// Like [`Worker::run`], for a synchronous task function. It runs on Tokio's
  /// blocking thread pool and should poll [`WorkContext::is_cancelled`].
  pub async fn run_blocking<V, R, E, F>(
    &mut self,
    cancel: &CancellationToken,
    work: Work<V>,
    f: F,
  ) -> Result<R, WorkError<E>>
  where
    V: Send + 'static,
    R: Send + 'static,
    E: Send + 'static,
    F: FnOnce(WorkContext, V) -> Result<R, E> + Send + 'static,
  {
    let ctx = WorkContext::derive(cancel, work.timeout);
    let task_ctx = ctx.clone();
    let value = work.value;
    let span = info_span!("werk_blocking_task", worker_id = %self.id);

    let join = tokio::task::spawn_blocking(move || span.in_scope(|| f(task_ctx, value)));

    self.race(ctx, work.timeout, join).await
  }

  async fn race<R, E>(
    &self,
    ctx: WorkContext,
    timeout: Duration,
    mut join: JoinHandle<Result<R, E>>,
  ) -> Result<R, WorkError<E>> {
    // Ends the task's context on every exit path, including the caller
    // dropping this future.
    let _context_guard = ctx.token().clone().drop_guard();

    tokio::select! {
      biased;

      joined = &mut join => {
        trace!(worker_id = %self.id, "Task function returned before its context ended.");
        Self::map_joined(joined)
      }

      _ = ctx.cancelled() => {
        let cause = ctx.err().unwrap_or(CancelCause::Canceled);
        ctx.end(cause);
        debug!(
          worker_id = %self.id,
          %cause,
          "Task context ended first. Abandoning task; its eventual result will be discarded."
        );
        // `join` is dropped here, which detaches the task rather than aborting it.
        match cause {
          CancelCause::Canceled => Err(WorkError::Canceled),
          CancelCause::DeadlineExceeded => Err(WorkError::DeadlineExceeded(timeout)),
        }
      }
    }
  }

  fn map_joined<R, E>(joined: Result<Result<R, E>, JoinError>) -> Result<R, WorkError<E>> {
    match joined {
      Ok(Ok(result)) => Ok(result),
      Ok(Err(task_err)) => Err(WorkError::Task(task_err)),
      Err(join_err) if join_err.is_panic() => {
        debug!("Task function panicked: {}", join_err);
        Err(WorkError::Panicked)
      }
      // The runtime aborted the task, e.g. while shutting down.
      Err(_) => Err(WorkError::Canceled),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::atomic::{AtomicBool, Ordering};
  use std::sync::Arc;

  #[test]
  fn worker_ids_are_unique() {
    let a = Worker::new();
    let b = Worker::default();
    assert_ne!(a.id(), b.id());
  }

  #[tokio::test]
  async fn completion_beats_a_generous_deadline() {
    let mut worker = Worker::new();
    let result: Result<u32, WorkError<String>> = worker
      .run(
        &CancellationToken::new(),
        Work::with_timeout(20u32, Duration::from_secs(5)),
        |_ctx, v| async move { Ok(v + 1) },
      )
      .await;
    assert_eq!(result, Ok(21));
  }

  #[tokio::test]
  async fn context_is_ended_after_a_normal_return() {
    let mut worker = Worker::new();
    let (tx, rx) = tokio::sync::oneshot::channel();
    let result: Result<(), WorkError<String>> = worker
      .run(&CancellationToken::new(), Work::new(()), move |ctx, _| async move {
        let _ = tx.send(ctx);
        Ok(())
      })
      .await;
    assert_eq!(result, Ok(()));

    let ctx = rx.await.unwrap();
    assert!(ctx.is_cancelled());
    assert_eq!(ctx.err(), Some(CancelCause::Canceled));
  }

  #[tokio::test]
  async fn lost_task_sees_deadline_cause() {
    let mut worker = Worker::new();
    let observed = Arc::new(AtomicBool::new(false));
    let observed_in_task = observed.clone();

    let result: Result<(), WorkError<String>> = worker
      .run(
        &CancellationToken::new(),
        Work::with_timeout((), Duration::from_millis(20)),
        move |ctx, _| async move {
          ctx.cancelled().await;
          observed_in_task.store(ctx.err() == Some(CancelCause::DeadlineExceeded), Ordering::SeqCst);
          tokio::time::sleep(Duration::from_secs(1)).await;
          Ok(())
        },
      )
      .await;

    assert_eq!(result, Err(WorkError::DeadlineExceeded(Duration::from_millis(20))));
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert!(observed.load(Ordering::SeqCst));
  }

  #[tokio::test]
  async fn huge_timeout_runs_to_completion() {
    let mut worker = Worker::new();
    let result: Result<u8, WorkError<String>> = worker
      .run(
        &CancellationToken::new(),
        Work::with_timeout(1u8, Duration::MAX),
        |ctx, v| async move {
          assert!(ctx.deadline().is_none());
          Ok(v)
        },
      )
      .await;
    assert_eq!(result, Ok(1));
  }

  #[tokio::test]
  async fn task_panic_is_reported() {
    let mut worker = Worker::new();
    let result: Result<(), WorkError<String>> = worker
      .run(&CancellationToken::new(), Work::new(true), |_ctx, should_panic| async move {
        if should_panic {
          panic!("boom");
        }
        Ok(())
      })
      .await;
    assert_eq!(result, Err(WorkError::Panicked));
  }
}
