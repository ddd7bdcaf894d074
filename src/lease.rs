use crate::pool::PoolShared;
use crate::worker::Worker;

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use tokio::sync::OwnedSemaphorePermit;
use tracing::trace;

/// A worker checked out of a [`Pool`](crate::Pool).
///
/// The lease is the only way to reach a pooled worker, and it cannot be
/// cloned, so a worker is never held by two callers at once. Dropping the
/// lease (or passing it to [`Pool::free`](crate::Pool::free)) returns the
/// worker to the pool that issued it, exactly once.
pub struct PooledWorker {
  worker: Option<Worker>,
  permit: Option<OwnedSemaphorePermit>,
  shared: Arc<PoolShared>,
}

impl PooledWorker {
  pub(crate) fn new(worker: Worker, permit: OwnedSemaphorePermit, shared: Arc<PoolShared>) -> Self {
    Self {
      worker: Some(worker),
      permit: Some(permit),
      shared,
    }
  }

  /// Id of the pool this lease belongs to.
  pub fn pool_id(&self) -> u64 {
    self.shared.pool_id
  }
}

impl Deref for PooledWorker {
  type Target = Worker;

  fn deref(&self) -> &Worker {
    self.worker.as_ref().expect("worker is only taken when the lease drops")
  }
}

impl DerefMut for PooledWorker {
  fn deref_mut(&mut self) -> &mut Worker {
    self.worker.as_mut().expect("worker is only taken when the lease drops")
  }
}

impl fmt::Debug for PooledWorker {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("PooledWorker")
      .field("worker_id", &self.worker.as_ref().map(Worker::id))
      .field("pool_name", &self.shared.name)
      .field("pool_id", &self.shared.pool_id)
      .finish_non_exhaustive()
  }
}

impl Drop for PooledWorker {
  fn drop(&mut self) {
    // The worker goes back before the permit does, so a permit never
    // becomes available without an idle worker behind it.
    if let Some(worker) = self.worker.take() {
      trace!(pool_name = %self.shared.name, pool_id = %self.shared.pool_id, worker_id = %worker.id(), "Returning worker to pool.");
      self.shared.idle.lock().push_back(worker);
    }
    drop(self.permit.take());
    self.shared.released.notify_waiters();
  }
}
