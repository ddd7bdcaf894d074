use werk::{CancellationToken, Pool, PoolOptions, ShutdownMode, Work};

use std::time::Duration;
use tracing::info;

#[tokio::main]
async fn main() {
  tracing_subscriber::fmt()
    .with_max_level(tracing::Level::DEBUG)
    .with_target(false)
    .init();

  info!("--- Graceful Shutdown Example ---");

  let pool = Pool::new(2, PoolOptions::new().name("graceful_pool")).expect("capacity is non-zero");

  let mut handles = Vec::new();
  for i in 0..2u64 {
    let pool = pool.clone();
    handles.push(tokio::spawn(async move {
      pool
        .run(&CancellationToken::new(), Work::new(i), |_ctx, i| async move {
          info!("Task {} working for {}ms.", i, 300 + i * 100);
          tokio::time::sleep(Duration::from_millis(300 + i * 100)).await;
          Ok::<String, String>(format!("task {} done", i))
        })
        .await
    }));
  }

  tokio::time::sleep(Duration::from_millis(50)).await;
  info!("Shutting down while {} workers are busy.", pool.capacity() - pool.available());
  pool.shutdown(ShutdownMode::Graceful).await;

  for handle in handles {
    info!("Result: {:?}", handle.await);
  }
  info!("--- Graceful Shutdown Example End ---");
}
