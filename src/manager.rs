use crate::error::{PoolError, TaskError};
use crate::handle::{outcome_channel, TaskHandle};
use crate::notifier::{CompletionNotifier, TaskCompletionInfo, TaskCompletionStatus};
use crate::slot::SlotPool;
use crate::task::{PendingTask, TaskToExecute, Worker};
use crate::task_queue::TaskQueue;

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::SystemTime;

use futures::FutureExt;
use parking_lot::Mutex;
use tokio::runtime::Handle as TokioHandle;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, trace, warn, Instrument};

lazy_static::lazy_static! {
  static ref NEXT_TASK_ID_COUNTER: AtomicU64 = AtomicU64::new(0);
}

/// Defines what happens to still-queued tasks when the pool shuts down.
/// Tasks already running on a slot always run to completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownMode {
  /// Runs every queued task before returning.
  Drain,
  /// Settles every queued task with `PoolError::PoolShuttingDown`.
  DiscardQueued,
}

/// Pool and backlog; only ever touched under `Shared::state`.
struct DispatchState<C, A, R, E> {
  slots: SlotPool<C>,
  queue: TaskQueue<PendingTask<A, R, E>>,
}

impl<C, A, R, E> DispatchState<C, A, R, E> {
  fn is_idle(&self) -> bool {
    self.queue.is_empty() && self.slots.busy_count() == 0
  }
}

struct Shared<C, A, R, E> {
  pool_name: Arc<String>,
  state: Mutex<DispatchState<C, A, R, E>>,
  worker: Worker<C, A, R, E>,
  tokio_handle: TokioHandle,
  intake_closed: CancellationToken,
  idle: Notify,
  notifier: CompletionNotifier,
}

/// A task bound to a slot, ready to be spawned.
struct Dispatch<C, A, R, E> {
  slot_index: usize,
  config: C,
  task: PendingTask<A, R, E>,
}

/// Runs scheduled tasks on a fixed set of configured slots.
///
/// Each slot runs at most one task at a time; queued tasks are handed the
/// lowest free slot in arrival order. Cloning yields another handle to the
/// same pool.
pub struct SlotPoolManager<C, A, R, E> {
  shared: Arc<Shared<C, A, R, E>>,
}

impl<C, A, R, E> Clone for SlotPoolManager<C, A, R, E> {
  fn clone(&self) -> Self {
    Self {
      shared: self.shared.clone(),
    }
  }
}

impl<C, A, R, E> SlotPoolManager<C, A, R, E>
where
  C: Clone + Send + Sync + 'static,
  A: Send + 'static,
  R: Send + 'static,
  E: Send + 'static,
{
  /// Builds a pool with one slot per entry of `configs`.
  ///
  /// `worker` is invoked as `worker(config, args)` for every task, where
  /// `config` is a clone of the configuration of the slot the task landed on.
  ///
  /// # Errors
  /// Returns `PoolError::EmptySlotList` if `configs` is empty, since such a
  /// pool could never run anything.
  pub fn new<F, Fut>(
    configs: Vec<C>,
    worker: F,
    tokio_handle: TokioHandle,
    pool_name: &str,
  ) -> Result<Self, PoolError>
  where
    F: Fn(C, A) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, E>> + Send + 'static,
  {
    if configs.is_empty() {
      return Err(PoolError::EmptySlotList);
    }

    let pool_name = Arc::new(pool_name.to_string());
    let worker: Worker<C, A, R, E> = Arc::new(move |config: C, args: A| -> TaskToExecute<R, E> {
      Box::pin(worker(config, args))
    });

    info!(pool_name = %*pool_name, slots = configs.len(), "Slot pool created.");

    Ok(Self {
      shared: Arc::new(Shared {
        pool_name: pool_name.clone(),
        state: Mutex::new(DispatchState {
          slots: SlotPool::new(configs),
          queue: TaskQueue::new(),
        }),
        worker,
        tokio_handle: tokio_handle.clone(),
        intake_closed: CancellationToken::new(),
        idle: Notify::new(),
        notifier: CompletionNotifier::new(tokio_handle, pool_name),
      }),
    })
  }

  pub fn name(&self) -> &str {
    &self.shared.pool_name
  }

  /// Number of slots, fixed at construction.
  pub fn slot_count(&self) -> usize {
    self.shared.state.lock().slots.len()
  }

  /// Number of slots currently running a task.
  pub fn busy_slot_count(&self) -> usize {
    self.shared.state.lock().slots.busy_count()
  }

  /// Returns the current number of tasks waiting for a slot.
  pub fn queued_task_count(&self) -> usize {
    self.shared.state.lock().queue.len()
  }

  pub fn is_shutting_down(&self) -> bool {
    self.shared.intake_closed.is_cancelled()
  }

  /// Registers a handler called after every dispatched task settles and frees its slot.
  /// Tasks finishing before the first handler is registered are not reported.
  pub fn on_task_completion(&self, handler: impl Fn(TaskCompletionInfo) + Send + Sync + 'static) {
    self.shared.notifier.add_handler(handler);
  }

  /// Queues a task and returns its handle without waiting for it to start.
  ///
  /// If the pool is shutting down the handle resolves to
  /// `PoolError::PoolShuttingDown` and the worker is never called.
  pub fn schedule(&self, args: A) -> TaskHandle<R, E> {
    let task_id = NEXT_TASK_ID_COUNTER.fetch_add(1, AtomicOrdering::Relaxed);
    let (outcome, handle) = outcome_channel(task_id);

    if self.shared.intake_closed.is_cancelled() {
      debug!(pool_name = %*self.shared.pool_name, %task_id, "Schedule: pool is shutting down, refusing task.");
      outcome.fail(PoolError::PoolShuttingDown);
      return handle;
    }

    {
      let mut state = self.shared.state.lock();
      state.queue.enqueue(PendingTask { task_id, args, outcome });
      debug!(pool_name = %*self.shared.pool_name, %task_id, queued = state.queue.len(), "Task enqueued.");
    }

    Shared::trigger(&self.shared);
    handle
  }

  /// Closes intake and waits until no task is queued or running.
  ///
  /// Running tasks are never interrupted. Calling this more than once is fine;
  /// every call waits for the pool to go idle.
  pub async fn shutdown(&self, mode: ShutdownMode) {
    let shared = &self.shared;
    if !shared.intake_closed.is_cancelled() {
      info!(pool_name = %*shared.pool_name, "Initiating pool shutdown (mode: {:?}).", mode);
      shared.intake_closed.cancel();
    }

    if mode == ShutdownMode::DiscardQueued {
      let discarded: Vec<PendingTask<A, R, E>> = shared.state.lock().queue.drain().collect();
      if !discarded.is_empty() {
        info!(pool_name = %*shared.pool_name, "Discarding {} queued tasks.", discarded.len());
      }
      for task in discarded {
        task.outcome.fail(PoolError::PoolShuttingDown);
      }
    }

    loop {
      let notified = shared.idle.notified();
      tokio::pin!(notified);
      notified.as_mut().enable();

      if shared.state.lock().is_idle() {
        break;
      }
      notified.await;
    }

    info!(pool_name = %*shared.pool_name, "Pool is idle. Shutdown complete.");
  }
}

impl<C, A, R, E> Shared<C, A, R, E>
where
  C: Clone + Send + Sync + 'static,
  A: Send + 'static,
  R: Send + 'static,
  E: Send + 'static,
{
  /// Pairs the queue head with the lowest free slot until either runs out,
  /// then spawns every pair. Safe to call from any number of places at once:
  /// each pass reads current state under the lock.
  fn trigger(shared: &Arc<Self>) {
    let batch = {
      let mut state = shared.state.lock();
      let mut batch = Vec::new();
      loop {
        if state.queue.is_empty() {
          break;
        }
        let Some(slot_index) = state.slots.find_free_slot() else {
          break;
        };
        let Some(task) = state.queue.dequeue_head() else {
          break;
        };
        state.slots.acquire(slot_index);
        batch.push(Dispatch {
          slot_index,
          config: state.slots.config(slot_index).clone(),
          task,
        });
      }
      batch
    };

    if batch.is_empty() {
      trace!(pool_name = %*shared.pool_name, "Dispatch pass made no progress.");
      return;
    }

    for dispatch in batch {
      Self::spawn_dispatch(shared, dispatch);
    }
  }

  fn spawn_dispatch(shared: &Arc<Self>, dispatch: Dispatch<C, A, R, E>) {
    let Dispatch { slot_index, config, task } = dispatch;
    let PendingTask { task_id, args, outcome } = task;
    debug!(pool_name = %*shared.pool_name, %task_id, %slot_index, "Dispatching task to slot.");

    // Frees the slot when dropped, whichever way the spawned future ends.
    let mut lease = SlotLease {
      shared: shared.clone(),
      slot_index,
      settled: false,
    };
    let worker = shared.worker.clone();
    let shared_for_task = shared.clone();

    shared.tokio_handle.spawn(
      async move {
        let shared = shared_for_task;
        let pool_name = shared.pool_name.clone();
        let run = AssertUnwindSafe(async move { worker(config, args).await }).catch_unwind();

        let result: Result<R, TaskError<E>> = match run.await {
          Ok(Ok(value)) => Ok(value),
          Ok(Err(worker_error)) => Err(TaskError::Failed(worker_error)),
          Err(_panic_payload) => {
            error!(pool_name = %*pool_name, %task_id, %slot_index, "Worker panicked during execution.");
            Err(PoolError::TaskPanicked.into())
          }
        };

        let status = TaskCompletionStatus::from(&result);
        trace!(pool_name = %*pool_name, %task_id, ?status, "Settling task.");
        match result {
          Ok(value) => outcome.complete(value),
          Err(failure) => outcome.fail(failure),
        }

        lease.settled = true;
        drop(lease);

        shared.notifier.notify(TaskCompletionInfo {
          task_id,
          pool_name,
          slot_index,
          status,
          completion_time: SystemTime::now(),
        });
      }
      .instrument(info_span!("slot_task", pool_name = %*shared.pool_name, %task_id, %slot_index)),
    );
  }

  /// Frees a slot after its task settled and keeps the queue draining.
  fn release(shared: &Arc<Self>, slot_index: usize) {
    let now_idle = {
      let mut state = shared.state.lock();
      state.slots.release(slot_index);
      state.is_idle()
    };
    debug!(pool_name = %*shared.pool_name, %slot_index, "Slot released.");

    if now_idle {
      shared.idle.notify_waiters();
    } else {
      Self::trigger(shared);
    }
  }

  /// Frees a slot whose task was dropped before settling, which only happens
  /// when the runtime is going away. Nothing queued can run any more, so the
  /// backlog is dropped (its handles resolve to `ResultChannelError`) and
  /// dispatch is not re-entered.
  fn release_abandoned(shared: &Arc<Self>, slot_index: usize) {
    let (backlog, now_idle) = {
      let mut state = shared.state.lock();
      state.slots.release(slot_index);
      let backlog: Vec<PendingTask<A, R, E>> = state.queue.drain().collect();
      (backlog, state.is_idle())
    };
    shared.intake_closed.cancel();

    if !backlog.is_empty() {
      warn!(
        pool_name = %*shared.pool_name,
        %slot_index,
        "Task dropped before settling. Dropping {} queued tasks.",
        backlog.len()
      );
    }
    drop(backlog);

    if now_idle {
      shared.idle.notify_waiters();
    }
  }
}

/// Ownership of one busy slot. Dropping it frees the slot; only a lease whose
/// task settled re-runs dispatch.
struct SlotLease<C, A, R, E>
where
  C: Clone + Send + Sync + 'static,
  A: Send + 'static,
  R: Send + 'static,
  E: Send + 'static,
{
  shared: Arc<Shared<C, A, R, E>>,
  slot_index: usize,
  settled: bool,
}

impl<C, A, R, E> Drop for SlotLease<C, A, R, E>
where
  C: Clone + Send + Sync + 'static,
  A: Send + 'static,
  R: Send + 'static,
  E: Send + 'static,
{
  fn drop(&mut self) {
    if self.settled {
      Shared::release(&self.shared, self.slot_index);
    } else {
      Shared::release_abandoned(&self.shared, self.slot_index);
    }
  }
}
