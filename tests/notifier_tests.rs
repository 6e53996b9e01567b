use slot_dispatcher::{ShutdownMode, SlotPoolManager, TaskCompletionInfo, TaskCompletionStatus};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};

fn setup_tracing_for_test() {
  use std::sync::Once;
  use tracing_subscriber::{fmt, EnvFilter};
  static TRACING_INIT: Once = Once::new();

  TRACING_INIT.call_once(|| {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,slot_dispatcher=trace"));

    fmt::Subscriber::builder()
      .with_env_filter(filter)
      .with_test_writer()
      .try_init()
      .ok();
  });
}

// Worker outcome selector: 0 = succeed, 1 = fail, 2 = panic.
fn build_pool(configs: Vec<&'static str>, pool_name: &str) -> SlotPoolManager<&'static str, u8, &'static str, String> {
  SlotPoolManager::new(
    configs,
    |token: &'static str, mode: u8| async move {
      sleep(Duration::from_millis(5)).await;
      match mode {
        0 => Ok(token),
        1 => Err(format!("failed on {}", token)),
        _ => panic!("worker panic on {}", token),
      }
    },
    Handle::current(),
    pool_name,
  )
  .unwrap()
}

async fn collect_events(rx: &mut mpsc::UnboundedReceiver<TaskCompletionInfo>, count: usize) -> Vec<TaskCompletionInfo> {
  let mut events = Vec::with_capacity(count);
  for _ in 0..count {
    let event = timeout(Duration::from_secs(5), rx.recv())
      .await
      .expect("timed out waiting for completion event")
      .expect("event channel closed");
    events.push(event);
  }
  events
}

#[tokio::test]
async fn test_handler_receives_each_status() {
  setup_tracing_for_test();
  let pool = build_pool(vec!["a"], "notifier_statuses");
  let (tx, mut rx) = mpsc::unbounded_channel();
  pool.on_task_completion(move |info| {
    let _ = tx.send(info);
  });

  let ok = pool.schedule(0);
  let failed = pool.schedule(1);
  let panicked = pool.schedule(2);
  let ids = [ok.id(), failed.id(), panicked.id()];

  assert!(ok.await.is_ok());
  assert!(failed.await.is_err());
  assert!(panicked.await.is_err());

  let events = collect_events(&mut rx, 3).await;
  let statuses: Vec<_> = ids
    .iter()
    .map(|id| events.iter().find(|e| e.task_id == *id).expect("missing event").status)
    .collect();

  assert_eq!(
    statuses,
    vec![
      TaskCompletionStatus::Success,
      TaskCompletionStatus::Failed,
      TaskCompletionStatus::Panicked
    ]
  );
  assert!(events.iter().all(|e| e.slot_index == 0));
  assert!(events.iter().all(|e| e.pool_name.as_str() == "notifier_statuses"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_events_report_slot_indices_within_pool() {
  setup_tracing_for_test();
  let pool = build_pool(vec!["a", "b", "c"], "notifier_slots");
  let (tx, mut rx) = mpsc::unbounded_channel();
  pool.on_task_completion(move |info| {
    let _ = tx.send(info);
  });

  let handles: Vec<_> = (0..9).map(|_| pool.schedule(0)).collect();
  futures::future::join_all(handles).await;

  let events = collect_events(&mut rx, 9).await;
  let ids: HashSet<_> = events.iter().map(|e| e.task_id).collect();
  assert_eq!(ids.len(), 9);
  assert!(events.iter().all(|e| e.slot_index < 3));
  assert!(events.iter().all(|e| e.status == TaskCompletionStatus::Success));
}

#[tokio::test]
async fn test_every_handler_is_called() {
  setup_tracing_for_test();
  let pool = build_pool(vec!["a", "b"], "notifier_multi_handler");
  let (tx, mut rx) = mpsc::unbounded_channel();

  for handler_id in 0..2u8 {
    let tx = tx.clone();
    pool.on_task_completion(move |info| {
      let _ = tx.send((handler_id, info.task_id));
    });
  }
  drop(tx);

  let task_id = {
    let handle = pool.schedule(0);
    let id = handle.id();
    handle.await.unwrap();
    id
  };

  let mut seen = Vec::new();
  for _ in 0..2 {
    let (handler_id, event_task_id) = timeout(Duration::from_secs(5), rx.recv()).await.unwrap().unwrap();
    assert_eq!(event_task_id, task_id);
    seen.push(handler_id);
  }
  seen.sort_unstable();
  assert_eq!(seen, vec![0, 1]);
}

#[tokio::test]
async fn test_panicking_handler_does_not_affect_pool() {
  setup_tracing_for_test();
  let pool = build_pool(vec!["a"], "notifier_bad_handler");
  let (tx, mut rx) = mpsc::unbounded_channel();

  pool.on_task_completion(|_info| panic!("handler exploded"));
  pool.on_task_completion(move |info| {
    let _ = tx.send(info);
  });

  assert_eq!(pool.schedule(0).await, Ok("a"));
  assert_eq!(pool.schedule(0).await, Ok("a"));

  let events = collect_events(&mut rx, 2).await;
  assert_eq!(events.len(), 2);

  timeout(Duration::from_secs(5), pool.shutdown(ShutdownMode::Drain))
    .await
    .expect("pool did not go idle");
}

#[tokio::test]
async fn test_no_events_before_first_handler() {
  setup_tracing_for_test();
  let pool = build_pool(vec!["a"], "notifier_late_handler");

  assert_eq!(pool.schedule(0).await, Ok("a"));
  pool.shutdown(ShutdownMode::Drain).await;
  // Give any stray notification a chance to surface.
  sleep(Duration::from_millis(20)).await;

  let counter = Arc::new(std::sync::atomic::AtomicUsize::new(0));
  let counter_for_handler = counter.clone();
  pool.on_task_completion(move |_info| {
    counter_for_handler.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
  });
  sleep(Duration::from_millis(20)).await;

  assert_eq!(counter.load(std::sync::atomic::Ordering::SeqCst), 0);
}
