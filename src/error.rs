use thiserror::Error;

/// Errors raised by the `slot_dispatcher` pool itself, as opposed to the worker.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
  #[error("Cannot build a slot pool from an empty configuration list")]
  EmptySlotList,

  #[error("Task outcome channel error (runtime shut down or task dropped before settling): {0}")]
  ResultChannelError(String),

  #[error("Task result already taken")]
  ResultUnavailable,

  #[error("Worker panicked while running the task")]
  TaskPanicked,

  #[error("Pool is shutting down or already shut down, cannot accept new tasks")]
  PoolShuttingDown,
}

/// The failure a [`TaskHandle`](crate::TaskHandle) resolves to.
///
/// `Failed` carries the worker's own error untouched; its `Display` is the
/// worker error's `Display`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TaskError<E> {
  #[error("{0}")]
  Failed(E),

  #[error(transparent)]
  Pool(#[from] PoolError),
}

impl<E> TaskError<E> {
  /// Returns the worker's error if this failure came from the worker.
  pub fn into_worker_error(self) -> Option<E> {
    match self {
      TaskError::Failed(e) => Some(e),
      TaskError::Pool(_) => None,
    }
  }

  /// Returns the pool-side error, if any.
  pub fn pool_error(&self) -> Option<&PoolError> {
    match self {
      TaskError::Failed(_) => None,
      TaskError::Pool(e) => Some(e),
    }
  }
}
