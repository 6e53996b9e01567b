use crate::error::{PoolError, TaskError};
use crate::task::TaskId;

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::sync::oneshot;

type Outcome<R, E> = Result<R, TaskError<E>>;

/// Creates the two halves of a task's single-assignment outcome cell.
pub(crate) fn outcome_channel<R, E>(task_id: TaskId) -> (OutcomeSender<R, E>, TaskHandle<R, E>) {
  let (tx, rx) = oneshot::channel();
  (
    OutcomeSender { task_id, tx },
    TaskHandle {
      task_id,
      result_receiver: Some(rx),
    },
  )
}

/// Settling half of the outcome cell. Consumed by settlement, so a task can
/// only ever be settled once.
#[derive(Debug)]
pub(crate) struct OutcomeSender<R, E> {
  task_id: TaskId,
  tx: oneshot::Sender<Outcome<R, E>>,
}

impl<R, E> OutcomeSender<R, E> {
  pub(crate) fn complete(self, value: R) {
    self.settle(Ok(value));
  }

  pub(crate) fn fail(self, error: impl Into<TaskError<E>>) {
    self.settle(Err(error.into()));
  }

  pub(crate) fn settle(self, outcome: Outcome<R, E>) {
    if self.tx.send(outcome).is_err() {
      tracing::debug!(task_id = %self.task_id, "Task handle was dropped before settlement. Outcome discarded.");
    }
  }
}

/// A handle to a task scheduled on a `SlotPoolManager`.
///
/// Await it directly, or call [`TaskHandle::await_result`], to get the task's
/// value or its failure.
#[derive(Debug)]
pub struct TaskHandle<R, E> {
  pub(crate) task_id: TaskId,
  pub(crate) result_receiver: Option<oneshot::Receiver<Outcome<R, E>>>,
}

impl<R, E> TaskHandle<R, E> {
  /// Returns the unique ID of this task.
  pub fn id(&self) -> TaskId {
    self.task_id
  }

  /// Awaits the settlement of the task.
  ///
  /// # Errors
  /// Returns `TaskError::Failed` with the worker's original error if the worker failed.
  /// Returns `PoolError::TaskPanicked` if the worker panicked.
  /// Returns `PoolError::PoolShuttingDown` if the task was refused or discarded by shutdown.
  /// Returns `PoolError::ResultChannelError` if the task was dropped without settling.
  pub async fn await_result(self) -> Result<R, TaskError<E>> {
    self.await
  }
}

impl<R, E> Future for TaskHandle<R, E> {
  type Output = Result<R, TaskError<E>>;

  fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
    let task_id = self.task_id;
    let Some(rx) = self.result_receiver.as_mut() else {
      return Poll::Ready(Err(PoolError::ResultUnavailable.into()));
    };

    match Pin::new(rx).poll(cx) {
      Poll::Pending => Poll::Pending,
      Poll::Ready(received) => {
        self.result_receiver = None;
        Poll::Ready(match received {
          Ok(outcome) => outcome,
          Err(recv_error) => {
            tracing::warn!(%task_id, "Outcome channel closed without a value: {}", recv_error);
            Err(
              PoolError::ResultChannelError(format!(
                "Task (id: {}) outcome channel unexpectedly closed: {}",
                task_id, recv_error
              ))
              .into(),
            )
          }
        })
      }
    }
  }
}
