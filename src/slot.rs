use std::fmt;

/// One position of the pool: an immutable configuration plus its busy flag.
#[derive(Debug)]
pub(crate) struct Slot<C> {
  config: C,
  busy: bool,
}

/// Fixed-size, ordered collection of slots.
///
/// The pool is sized once from the configuration list and never resized.
/// Indices handed to `acquire`/`release` always come from `find_free_slot`
/// on the same pool, so they are in range by construction.
pub(crate) struct SlotPool<C> {
  slots: Vec<Slot<C>>,
}

impl<C> SlotPool<C> {
  pub(crate) fn new(configs: Vec<C>) -> Self {
    Self {
      slots: configs.into_iter().map(|config| Slot { config, busy: false }).collect(),
    }
  }

  pub(crate) fn len(&self) -> usize {
    self.slots.len()
  }

  pub(crate) fn busy_count(&self) -> usize {
    self.slots.iter().filter(|slot| slot.busy).count()
  }

  /// Lowest index whose slot is free, scanning in construction order.
  pub(crate) fn find_free_slot(&self) -> Option<usize> {
    self.slots.iter().position(|slot| !slot.busy)
  }

  pub(crate) fn config(&self, index: usize) -> &C {
    &self.slots[index].config
  }

  pub(crate) fn acquire(&mut self, index: usize) {
    let slot = &mut self.slots[index];
    debug_assert!(!slot.busy, "slot {index} acquired while busy");
    slot.busy = true;
  }

  pub(crate) fn release(&mut self, index: usize) {
    let slot = &mut self.slots[index];
    debug_assert!(slot.busy, "slot {index} released while free");
    slot.busy = false;
  }
}

impl<C> fmt::Debug for SlotPool<C> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("SlotPool")
      .field("len", &self.len())
      .field("busy", &self.busy_count())
      .finish_non_exhaustive()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_find_free_slot_prefers_lowest_index() {
    let mut pool = SlotPool::new(vec!["a", "b", "c"]);
    assert_eq!(pool.find_free_slot(), Some(0));

    pool.acquire(0);
    assert_eq!(pool.find_free_slot(), Some(1));

    pool.acquire(1);
    pool.release(0);
    assert_eq!(pool.find_free_slot(), Some(0));
  }

  #[test]
  fn test_saturated_pool_has_no_free_slot() {
    let mut pool = SlotPool::new(vec![1, 2]);
    pool.acquire(0);
    pool.acquire(1);
    assert_eq!(pool.find_free_slot(), None);
    assert_eq!(pool.busy_count(), 2);

    pool.release(1);
    assert_eq!(pool.find_free_slot(), Some(1));
    assert_eq!(pool.busy_count(), 1);
  }

  #[test]
  fn test_config_is_positional() {
    let pool = SlotPool::new(vec!["token_a".to_string(), "token_b".to_string()]);
    assert_eq!(pool.len(), 2);
    assert_eq!(pool.config(0), "token_a");
    assert_eq!(pool.config(1), "token_b");
  }

  #[test]
  fn test_empty_pool_never_yields_a_slot() {
    let pool: SlotPool<u8> = SlotPool::new(Vec::new());
    assert_eq!(pool.len(), 0);
    assert_eq!(pool.find_free_slot(), None);
  }
}
