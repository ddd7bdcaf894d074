use werk::{CancellationToken, Pool, PoolOptions, Work, WorkError};

use std::time::Duration;
use tracing::{info, warn};

#[tokio::main]
async fn main() {
  tracing_subscriber::fmt()
    .with_max_level(tracing::Level::DEBUG)
    .with_target(false)
    .init();

  info!("--- Basic Usage Example ---");

  let pool = Pool::new(10, PoolOptions::new().name("basic_pool")).expect("capacity is non-zero");
  let cancel = CancellationToken::new();

  let inner_pool = pool.clone();
  let result: Result<&str, WorkError<String>> = pool
    .run(&cancel, Work::new("beep boop"), move |_ctx, value| async move {
      info!("value: {}", value);
      info!("workers: {}", inner_pool.available());
      Ok("borp")
    })
    .await;
  info!("result: {:?}", result);

  let result: Result<(), WorkError<String>> = pool
    .run(&cancel, Work::new("beep boop"), |_ctx, _| async move { Err("oops".to_string()) })
    .await;
  info!("err: {:?}", result);

  // Returned values received after a timeout are ignored.
  let result: Result<(), WorkError<String>> = pool
    .run(
      &cancel,
      Work::with_timeout("foo", Duration::from_millis(100)),
      |_ctx, _| async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        Err("inner err".to_string())
      },
    )
    .await;
  match result {
    Err(WorkError::DeadlineExceeded(timeout)) => info!("err: deadline of {:?} exceeded", timeout),
    other => warn!("unexpected outcome: {:?}", other),
  }

  info!("available after runs: {}", pool.available());
  info!("--- Basic Usage Example End ---");
}
