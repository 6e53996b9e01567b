use crate::handle::OutcomeSender;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Process-unique identifier handed to every scheduled task.
pub type TaskId = u64;

/// The boxed future a worker produces for one task.
/// It must be `Send` and `'static`, and resolve to the task's value or the worker's error.
pub type TaskToExecute<R, E> = Pin<Box<dyn Future<Output = Result<R, E>> + Send + 'static>>;

/// Type-erased worker: receives the slot's configuration and the task's arguments.
pub(crate) type Worker<C, A, R, E> = Arc<dyn Fn(C, A) -> TaskToExecute<R, E> + Send + Sync + 'static>;

/// A queued invocation waiting for a free slot.
pub(crate) struct PendingTask<A, R, E> {
  pub(crate) task_id: TaskId,
  pub(crate) args: A,
  pub(crate) outcome: OutcomeSender<R, E>,
}
