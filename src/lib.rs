//! A Tokio-based dispatcher that runs queued tasks on a fixed set of
//! configured resource slots.
//!
//! Each slot pairs an immutable configuration (a credential, a connection
//! handle, ...) with a busy flag. Scheduled tasks wait in a FIFO queue and are
//! handed the lowest free slot in arrival order, so at most one task runs per
//! slot. Every task's slot is released exactly once, whether the worker
//! succeeds, fails or panics.

mod error;
mod handle;
mod manager;
mod notifier;
mod slot;
mod task;
mod task_queue;

pub use error::{PoolError, TaskError};
pub use handle::TaskHandle;
pub use manager::{ShutdownMode, SlotPoolManager};
pub use notifier::{TaskCompletionInfo, TaskCompletionStatus};
pub use task::{TaskId, TaskToExecute};
