use werk::{CancellationToken, Pool, PoolError, PoolOptions, Work};

use std::time::Duration;
use tracing::info;

#[tokio::main]
async fn main() {
  tracing_subscriber::fmt()
    .with_max_level(tracing::Level::DEBUG)
    .with_target(false)
    .init();

  info!("--- Acquire Timeout Example (capacity 2, acquire timeout 100ms) ---");

  let pool = Pool::new(
    2,
    PoolOptions::new()
      .name("acquire_timeout_pool")
      .acquire_timeout(Duration::from_millis(100)),
  )
  .expect("capacity is non-zero");
  let release = CancellationToken::new();

  let mut handles = Vec::new();
  for i in 0..pool.capacity() {
    let pool = pool.clone();
    let release = release.clone();
    handles.push(tokio::spawn(async move {
      pool
        .run(&release, Work::new(i), |ctx, i| async move {
          info!("Task {} holding a worker until released.", i);
          ctx.cancelled().await;
          Ok::<usize, String>(i)
        })
        .await
    }));
  }

  while pool.available() > 0 {
    tokio::time::sleep(Duration::from_millis(5)).await;
  }

  match pool.acquire(&CancellationToken::new()).await {
    Err(PoolError::AcquireTimeout(timeout)) => info!("Acquire gave up after {:?} as expected.", timeout),
    Err(e) => info!("Acquire failed: {}", e),
    Ok(worker) => info!("Unexpectedly acquired worker {}", worker.id()),
  }

  release.cancel();
  for handle in handles {
    info!("Filler finished: {:?}", handle.await);
  }
  info!("Available again: {}", pool.available());
  info!("--- Acquire Timeout Example End ---");
}
