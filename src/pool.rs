use crate::config::PoolOptions;
use crate::error::{PoolError, WorkError};
use crate::lease::PooledWorker;
use crate::work::{Work, WorkContext};
use crate::worker::Worker;

use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{Notify, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, trace, warn, Instrument};

lazy_static::lazy_static! {
  static ref NEXT_POOL_ID_COUNTER: AtomicU64 = AtomicU64::new(0);
}

/// Defines how the pool should behave upon shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownMode {
  /// Stops admission and waits for every leased worker to come back.
  Graceful,
  /// Stops admission, cancels every run in flight through [`Pool::run`] or
  /// [`Pool::run_blocking`], then waits for every leased worker to come back.
  ForcefulCancel,
}

/// State shared between a pool and its outstanding leases.
pub(crate) struct PoolShared {
  pub(crate) pool_id: u64,
  pub(crate) name: String,
  pub(crate) capacity: usize,
  pub(crate) options: PoolOptions,
  /// One permit per idle worker; acquiring a permit is admission.
  pub(crate) semaphore: Arc<Semaphore>,
  pub(crate) idle: Mutex<VecDeque<Worker>>,
  /// Signalled whenever a lease returns its worker.
  pub(crate) released: Notify,
  pub(crate) shutdown_token: CancellationToken,
}

/// A fixed-size pool of workers bounding how many tasks run at once.
///
/// All `capacity` workers exist from construction until the last handle and
/// lease are gone. Cloning a `Pool` is cheap and yields another handle to the
/// same workers.
#[derive(Clone)]
pub struct Pool {
  shared: Arc<PoolShared>,
}

impl std::fmt::Debug for Pool {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Pool")
      .field("name", &self.shared.name)
      .field("pool_id", &self.shared.pool_id)
      .field("capacity", &self.shared.capacity)
      .field("available", &self.available())
      .field("closed", &self.is_closed())
      .finish()
  }
}

impl Pool {
  /// Creates a pool with `capacity` idle workers.
  ///
  /// # Errors
  /// Returns `PoolError::InvalidCapacity` if `capacity` is zero.
  pub fn new(capacity: usize, options: PoolOptions) -> Result<Self, PoolError> {
    if capacity == 0 {
      return Err(PoolError::InvalidCapacity(capacity));
    }

    let idle: VecDeque<Worker> = (0..capacity).map(|_| Worker::new()).collect();
    let pool_id = NEXT_POOL_ID_COUNTER.fetch_add(1, AtomicOrdering::Relaxed);

    info!(
      pool_name = %options.name,
      %pool_id,
      %capacity,
      acquire_timeout = ?options.acquire_timeout,
      "Pool created."
    );

    Ok(Self {
      shared: Arc::new(PoolShared {
        pool_id,
        name: options.name.clone(),
        capacity,
        options,
        semaphore: Arc::new(Semaphore::new(capacity)),
        idle: Mutex::new(idle),
        released: Notify::new(),
        shutdown_token: CancellationToken::new(),
      }),
    })
  }

  /// Creates a pool with default options.
  pub fn with_capacity(capacity: usize) -> Result<Self, PoolError> {
    Self::new(capacity, PoolOptions::default())
  }

  pub fn name(&self) -> &str {
    &self.shared.name
  }

  pub fn id(&self) -> u64 {
    self.shared.pool_id
  }

  /// The fixed number of workers the pool was created with.
  pub fn capacity(&self) -> usize {
    self.shared.capacity
  }

  /// Alias of [`Pool::capacity`].
  pub fn size(&self) -> usize {
    self.capacity()
  }

  pub fn options(&self) -> &PoolOptions {
    &self.shared.options
  }

  /// Number of workers ready to be acquired right now.
  ///
  /// This is a point-in-time snapshot. Under concurrent use it may be stale
  /// by the time the caller looks at it, so it is not a synchronization aid.
  pub fn available(&self) -> usize {
    self.shared.semaphore.available_permits()
  }

  /// Waits for a worker.
  ///
  /// Whichever happens first decides the outcome: a worker becomes free, the
  /// `cancel` token fires (`PoolError::Canceled`), or the configured
  /// acquire timeout elapses (`PoolError::AcquireTimeout`). An already
  /// cancelled token always yields `PoolError::Canceled`, even if a worker is free.
  ///
  /// # Errors
  /// Also returns `PoolError::Closed` once the pool has been closed.
  pub async fn acquire(&self, cancel: &CancellationToken) -> Result<PooledWorker, PoolError> {
    let shared = &self.shared;
    let acquire_timeout = shared.options.acquire_timeout;
    let timer = tokio::time::sleep(acquire_timeout);

    let permit = tokio::select! {
      biased;

      _ = cancel.cancelled() => {
        debug!(pool_name = %shared.name, pool_id = %shared.pool_id, "Acquire: cancelled while waiting for a worker.");
        return Err(PoolError::Canceled);
      }

      acquired = shared.semaphore.clone().acquire_owned() => match acquired {
        Ok(permit) => permit,
        Err(_) => {
          debug!(pool_name = %shared.name, pool_id = %shared.pool_id, "Acquire: pool is closed.");
          return Err(PoolError::Closed);
        }
      },

      _ = timer, if shared.options.has_acquire_timeout() => {
        debug!(
          pool_name = %shared.name,
          pool_id = %shared.pool_id,
          timeout = ?acquire_timeout,
          "Acquire: timed out waiting for a worker."
        );
        return Err(PoolError::AcquireTimeout(acquire_timeout));
      }
    };

    let worker = shared
      .idle
      .lock()
      .pop_front()
      .expect("an acquired permit always has an idle worker behind it");

    trace!(
      pool_name = %shared.name,
      pool_id = %shared.pool_id,
      worker_id = %worker.id(),
      "Acquired worker. Available: {}",
      shared.semaphore.available_permits()
    );

    Ok(PooledWorker::new(worker, permit, shared.clone()))
  }

  /// Returns a leased worker. Equivalent to dropping the lease.
  ///
  /// A lease always goes back to the pool that issued it, even when freed
  /// through a different pool's handle.
  pub fn free(&self, worker: PooledWorker) {
    if worker.pool_id() != self.shared.pool_id {
      warn!(
        pool_name = %self.shared.name,
        pool_id = %self.shared.pool_id,
        owner_pool_id = %worker.pool_id(),
        "Free: worker belongs to another pool; returning it to its owner."
      );
    }
    drop(worker);
  }

  /// Acquires a worker, runs `f` on it and frees it again.
  ///
  /// The worker is returned on every exit path: success, task error, panic,
  /// deadline, cancellation, and the caller dropping this future.
  pub async fn run<V, R, E, F, Fut>(&self, cancel: &CancellationToken, work: Work<V>, f: F) -> Result<R, WorkError<E>>
  where
    V: Send + 'static,
    R: Send + 'static,
    E: Send + 'static,
    F: FnOnce(WorkContext, V) -> Fut + Send + 'static,
    Fut: Future<Output = Result<R, E>> + Send + 'static,
  {
    let span = info_span!("werk_run", pool_name = %self.shared.name, pool_id = %self.shared.pool_id);
    async move {
      let mut worker = self.acquire(cancel).await?;
      let outcome = tokio::select! {
        biased;
        _ = self.shared.shutdown_token.cancelled() => Err(WorkError::Canceled),
        outcome = worker.run(cancel, work, f) => outcome,
      };
      self.free(worker);
      outcome
    }
    .instrument(span)
    .await
  }

  /// Like [`Pool::run`], for a synchronous task function executed on Tokio's
  /// blocking thread pool.
  pub async fn run_blocking<V, R, E, F>(
    &self,
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
    let span = info_span!("werk_run_blocking", pool_name = %self.shared.name, pool_id = %self.shared.pool_id);
    async move {
      let mut worker = self.acquire(cancel).await?;
      let outcome = tokio::select! {
        biased;
        _ = self.shared.shutdown_token.cancelled() => Err(WorkError::Canceled),
        outcome = worker.run_blocking(cancel, work, f) => outcome,
      };
      self.free(worker);
      outcome
    }
    .instrument(span)
    .await
  }

  /// Stops admission. Waiting and future acquires fail with
  /// `PoolError::Closed`; outstanding leases can still be freed.
  pub fn close(&self) {
    if !self.shared.semaphore.is_closed() {
      info!(pool_name = %self.shared.name, pool_id = %self.shared.pool_id, "Closing pool to new acquires.");
      self.shared.semaphore.close();
    }
  }

  pub fn is_closed(&self) -> bool {
    self.shared.semaphore.is_closed()
  }

  /// Closes the pool and waits until every worker is idle again.
  ///
  /// Leases taken with [`Pool::acquire`] are waited for as well; forceful
  /// mode cannot cancel work the caller runs on such a lease itself.
  pub async fn shutdown(&self, mode: ShutdownMode) {
    info!(pool_name = %self.shared.name, pool_id = %self.shared.pool_id, "Initiating pool shutdown (mode: {:?}).", mode);
    self.close();

    if mode == ShutdownMode::ForcefulCancel {
      info!(pool_name = %self.shared.name, pool_id = %self.shared.pool_id, "Forceful shutdown: cancelling runs in flight.");
      self.shared.shutdown_token.cancel();
    }

    loop {
      let released = self.shared.released.notified();
      tokio::pin!(released);
      released.as_mut().enable();

      let idle = self.shared.idle.lock().len();
      if idle == self.shared.capacity {
        break;
      }
      trace!(
        pool_name = %self.shared.name,
        pool_id = %self.shared.pool_id,
        "Shutdown: waiting for {} leased workers.",
        self.shared.capacity - idle
      );
      released.await;
    }

    info!(pool_name = %self.shared.name, pool_id = %self.shared.pool_id, "Pool shutdown completed.");
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::time::Duration;

  #[test]
  fn zero_capacity_is_rejected() {
    let result = Pool::with_capacity(0);
    assert!(matches!(result, Err(PoolError::InvalidCapacity(0))));
  }

  #[tokio::test]
  async fn acquire_and_free_restore_available() {
    let pool = Pool::with_capacity(3).unwrap();
    let cancel = CancellationToken::new();
    assert_eq!(pool.available(), 3);

    let a = pool.acquire(&cancel).await.unwrap();
    assert_eq!(pool.available(), 2);
    let b = pool.acquire(&cancel).await.unwrap();
    assert_eq!(pool.available(), 1);
    assert_ne!(a.id(), b.id());

    pool.free(b);
    assert_eq!(pool.available(), 2);
    drop(a);
    assert_eq!(pool.available(), 3);
    assert_eq!(pool.shared.idle.lock().len(), 3);
  }

  #[tokio::test]
  async fn foreign_free_returns_to_owner() {
    let owner = Pool::with_capacity(1).unwrap();
    let other = Pool::with_capacity(2).unwrap();
    let cancel = CancellationToken::new();

    let worker = owner.acquire(&cancel).await.unwrap();
    assert_eq!(worker.pool_id(), owner.id());
    other.free(worker);

    assert_eq!(owner.available(), 1);
    assert_eq!(other.available(), 2);
  }

  #[tokio::test]
  async fn closed_pool_rejects_acquire() {
    let pool = Pool::with_capacity(1).unwrap();
    pool.close();
    assert!(pool.is_closed());
    let result = pool.acquire(&CancellationToken::new()).await;
    assert!(matches!(result, Err(PoolError::Closed)));
  }

  #[tokio::test]
  async fn close_wakes_waiting_acquire() {
    let pool = Pool::with_capacity(1).unwrap();
    let cancel = CancellationToken::new();
    let held = pool.acquire(&cancel).await.unwrap();

    let waiter = {
      let pool = pool.clone();
      let cancel = cancel.clone();
      tokio::spawn(async move { pool.acquire(&cancel).await.map(|_| ()) })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    pool.close();

    let result = waiter.await.unwrap();
    assert_eq!(result, Err(PoolError::Closed));
    drop(held);
    assert_eq!(pool.available(), 1);
  }
}
