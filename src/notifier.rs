use crate::error::{PoolError, TaskError};
use crate::task::TaskId;

use std::fmt;
use std::sync::{Arc, Once};
use std::time::SystemTime;

use parking_lot::{Mutex, RwLock};
use tokio::runtime::Handle as TokioHandle;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, error, info, info_span, trace, Instrument};

// --- Public Event Structs for Handlers ---

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskCompletionStatus {
  Success,
  Failed,
  Panicked,
}

impl<R, E> From<&Result<R, TaskError<E>>> for TaskCompletionStatus {
  fn from(result: &Result<R, TaskError<E>>) -> Self {
    match result {
      Ok(_) => TaskCompletionStatus::Success,
      Err(TaskError::Pool(PoolError::TaskPanicked)) => TaskCompletionStatus::Panicked,
      Err(_) => TaskCompletionStatus::Failed,
    }
  }
}

/// Delivered to completion handlers once a dispatched task has settled and
/// its slot is free again.
#[derive(Debug, Clone)]
pub struct TaskCompletionInfo {
  pub task_id: TaskId,
  pub pool_name: Arc<String>,
  /// Index of the slot (construction order) the task ran on.
  pub slot_index: usize,
  pub status: TaskCompletionStatus,
  pub completion_time: SystemTime,
}

type CompletionHandler = Arc<dyn Fn(TaskCompletionInfo) + Send + Sync + 'static>;

// --- CompletionNotifier ---

pub(crate) struct CompletionNotifier {
  tx: UnboundedSender<TaskCompletionInfo>,
  pending_rx: Mutex<Option<UnboundedReceiver<TaskCompletionInfo>>>,
  handlers: Arc<RwLock<Vec<CompletionHandler>>>,
  init_once: Once,
  tokio_handle: TokioHandle,
  pool_name: Arc<String>,
}

impl fmt::Debug for CompletionNotifier {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("CompletionNotifier")
      .field("handler_count", &self.handlers.read().len())
      .field("initialized", &self.init_once.is_completed())
      .finish_non_exhaustive()
  }
}

impl CompletionNotifier {
  pub(crate) fn new(tokio_handle: TokioHandle, pool_name: Arc<String>) -> Self {
    let (tx, rx) = mpsc::unbounded_channel();
    Self {
      tx,
      pending_rx: Mutex::new(Some(rx)),
      handlers: Arc::new(RwLock::new(Vec::new())),
      init_once: Once::new(),
      tokio_handle,
      pool_name,
    }
  }

  /// Queues a completion event. Dropped silently while no handler is registered.
  pub(crate) fn notify(&self, info: TaskCompletionInfo) {
    if !self.init_once.is_completed() {
      trace!(task_id = %info.task_id, "No completion handlers registered, dropping notification.");
      return;
    }
    if self.tx.send(info).is_err() {
      debug!(pool_name = %*self.pool_name, "Notification worker is gone. Completion event dropped.");
    }
  }

  pub(crate) fn add_handler(&self, handler: impl Fn(TaskCompletionInfo) + Send + Sync + 'static) {
    {
      let mut handlers_guard = self.handlers.write();
      handlers_guard.push(Arc::new(handler));
      info!(pool_name = %*self.pool_name, "Added completion handler. Total handlers: {}", handlers_guard.len());
    }
    self.ensure_worker_initialized();
  }

  fn ensure_worker_initialized(&self) {
    self.init_once.call_once(|| {
      let Some(rx) = self.pending_rx.lock().take() else {
        return;
      };
      info!(pool_name = %*self.pool_name, "First completion handler added. Starting notification worker.");
      self.tokio_handle.spawn(
        Self::run_notification_worker_loop(rx, self.handlers.clone(), self.tokio_handle.clone())
          .instrument(info_span!("notification_worker_loop", pool_name = %*self.pool_name)),
      );
    });
  }

  async fn run_notification_worker_loop(
    mut queue_rx: UnboundedReceiver<TaskCompletionInfo>,
    handlers: Arc<RwLock<Vec<CompletionHandler>>>,
    tokio_handle_for_handlers: TokioHandle,
  ) {
    debug!("Notification worker started.");

    // Ends once every sender (held by the pool) is dropped and the queue is empty.
    while let Some(info) = queue_rx.recv().await {
      let handlers_snapshot: Vec<CompletionHandler> = handlers.read().clone();
      trace!(task_id = %info.task_id, "Dispatching notification to {} handlers.", handlers_snapshot.len());

      for handler in handlers_snapshot {
        let info_for_handler = info.clone();
        tokio_handle_for_handlers.spawn(async move {
          let task_id = info_for_handler.task_id;
          let pool_name = info_for_handler.pool_name.clone();
          let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| handler(info_for_handler)));
          if result.is_err() {
            error!(pool_name = %*pool_name, %task_id, "A completion handler panicked.");
          }
        });
      }
    }

    info!("Notification worker stopped (all senders dropped).");
  }
}
