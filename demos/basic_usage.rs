use slot_dispatcher::{ShutdownMode, SlotPoolManager, TaskHandle};
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::info;

async fn my_task_fn(connection: String, id: usize, delay_ms: u64) -> Result<String, String> {
  info!("Task {} starting on {}, will sleep for {}ms", id, connection, delay_ms);
  tokio::time::sleep(Duration::from_millis(delay_ms)).await;
  if id == 3 {
    return Err(format!("Task {} gave up on {}", id, connection));
  }
  Ok(format!("Task {} finished on {} after {}ms", id, connection, delay_ms))
}

#[tokio::main]
async fn main() {
  tracing_subscriber::fmt()
    .with_max_level(tracing::Level::DEBUG)
    .with_target(false)
    .init();

  info!("--- Basic Usage Example ---");

  let connections = vec!["db-primary".to_string(), "db-replica".to_string()];
  let manager = SlotPoolManager::new(
    connections,
    |connection: String, (id, delay_ms): (usize, u64)| my_task_fn(connection, id, delay_ms),
    Handle::current(),
    "basic_pool",
  )
  .expect("at least one connection is configured");

  let mut handles: Vec<TaskHandle<String, String>> = Vec::new();
  for i in 0..5 {
    let sleep_duration: u64 = 500 + (i as u64 % 3 * 250);
    let handle = manager.schedule((i, sleep_duration));
    info!("Scheduled task {} with handle id {}", i, handle.id());
    handles.push(handle);
  }

  info!(
    "All tasks scheduled. Busy slots: {}, queued: {}",
    manager.busy_slot_count(),
    manager.queued_task_count()
  );

  for handle in handles {
    let task_id = handle.id();
    match handle.await_result().await {
      Ok(result) => info!("Result for task {}: {}", task_id, result),
      Err(e) => info!("Error for task {}: {}", task_id, e),
    }
  }

  manager.shutdown(ShutdownMode::Drain).await;
  info!("--- Basic Usage Example End ---");
}
