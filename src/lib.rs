//! A Tokio-based fixed-size worker pool that bounds how many tasks run at
//! once, with per-task deadlines and cooperative cancellation.
//!
//! Operations block the caller, but can end early through the pool's acquire
//! timeout, a task's own timeout, or the caller's `CancellationToken`.

mod config;
mod error;
mod lease;
mod pool;
mod work;
mod worker;

pub use config::PoolOptions;
pub use error::{PoolError, WorkError};
pub use lease::PooledWorker;
pub use pool::{Pool, ShutdownMode};
pub use work::{CancelCause, Work, WorkContext, WorkFuture};
pub use worker::Worker;

pub use tokio_util::sync::CancellationToken;
