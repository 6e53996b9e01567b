use std::collections::VecDeque;
use std::fmt;

/// Unbounded, strict FIFO backlog of tasks waiting for a slot.
///
/// Entries are appended at the tail and taken from the head; nothing is ever
/// reordered or put back.
pub(crate) struct TaskQueue<T> {
  entries: VecDeque<T>,
}

impl<T> TaskQueue<T> {
  pub(crate) fn new() -> Self {
    Self {
      entries: VecDeque::new(),
    }
  }

  pub(crate) fn enqueue(&mut self, entry: T) {
    self.entries.push_back(entry);
  }

  pub(crate) fn dequeue_head(&mut self) -> Option<T> {
    self.entries.pop_front()
  }

  pub(crate) fn len(&self) -> usize {
    self.entries.len()
  }

  pub(crate) fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  /// Removes every queued entry, head first.
  pub(crate) fn drain(&mut self) -> impl Iterator<Item = T> + '_ {
    self.entries.drain(..)
  }
}

impl<T> fmt::Debug for TaskQueue<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("TaskQueue").field("len", &self.len()).finish_non_exhaustive()
  }
}
