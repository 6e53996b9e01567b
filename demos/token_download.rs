use slot_dispatcher::{ShutdownMode, SlotPoolManager};
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::info;

// Each token may only be used by one download at a time.
async fn download(token: &'static str, path: &'static str, delay_ms: u64) -> Result<(), String> {
  info!("[ ] Started downloading {}?token={}", path, token);
  tokio::time::sleep(Duration::from_millis(delay_ms)).await;
  info!("[x] Finished downloading {}?token={}", path, token);
  Ok(())
}

#[tokio::main]
async fn main() {
  tracing_subscriber::fmt().with_target(false).init();

  let tokens = vec!["1_1a2b3c", "2_4d5e6f", "3_7g8h9i"];
  let downloader = SlotPoolManager::new(
    tokens,
    |token: &'static str, (path, delay_ms): (&'static str, u64)| download(token, path, delay_ms),
    Handle::current(),
    "downloads",
  )
  .expect("token list is not empty");

  downloader.on_task_completion(|info| {
    info!(task_id = info.task_id, slot = info.slot_index, "Download settled: {:?}", info.status);
  });

  for (path, delay_ms) in [("/one", 1000), ("/two", 500), ("/three", 2000), ("/four", 500), ("/five", 100)] {
    // Dropping the handle does not cancel the download.
    drop(downloader.schedule((path, delay_ms)));
  }

  downloader.shutdown(ShutdownMode::Drain).await;
}
