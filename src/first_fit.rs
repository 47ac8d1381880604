use log::{debug, trace};

use crate::{
  chunk::{Chunk, ChunkId, ChunkInfo},
  error::{AllocError, InvariantViolation},
};

/// How a free chunk is carved up to satisfy a request.
///
/// Computed against the current list without touching it, then applied in one
/// step, so a rejected request never leaves a half-edited list behind.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Split {
  /// The chunk is exactly the requested size.
  Exact { chunk: ChunkId },
  /// The leftover tail grows the free successor backwards.
  IntoNext {
    chunk: ChunkId,
    next: ChunkId,
    size: usize,
    remainder: usize,
  },
  /// The leftover tail becomes a new free chunk after this one.
  NewChunk {
    chunk: ChunkId,
    size: usize,
    remainder: usize,
  },
}

/// Which neighbors a released chunk merges with.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Coalesce {
  /// Both neighbors are allocated or missing.
  Flip { chunk: ChunkId },
  /// Chunk and successor fold into the free predecessor.
  Both {
    prev: ChunkId,
    chunk: ChunkId,
    next: ChunkId,
  },
  /// Chunk folds into the free predecessor.
  IntoPrev { prev: ChunkId, chunk: ChunkId },
  /// The free successor folds into the chunk.
  AbsorbNext { chunk: ChunkId, next: ChunkId },
}

/// First-fit allocator over a fixed range of `capacity` units.
///
/// The allocator only reasons about offsets in `[0, capacity)`. It never reads
/// or writes the storage those offsets index into.
///
/// Chunks are kept in an arena and linked in address order through
/// [`ChunkId`] handles. Slots freed by coalescing are reused by later splits.
#[derive(Clone, Debug)]
pub struct Allocator {
  slots: Vec<Chunk>,
  vacant: Vec<ChunkId>,
  first: ChunkId,
  capacity: usize,
}

impl Allocator {
  /// Creates an allocator with a single free chunk spanning `[0, capacity)`.
  pub fn new(capacity: usize) -> Result<Self, AllocError> {
    if capacity == 0 {
      return Err(AllocError::ZeroCapacity);
    }

    debug!("new allocator, capacity = {}", capacity);

    Ok(Self {
      slots: vec![Chunk::new(0, capacity, false, None, None)],
      vacant: Vec::new(),
      first: ChunkId(0),
      capacity,
    })
  }

  pub fn capacity(&self) -> usize {
    self.capacity
  }

  /// Reserves `size` contiguous units and returns the offset of the first one.
  ///
  /// The lowest-addressed free chunk that is long enough wins. Free chunks are
  /// never combined to satisfy a request; only a single free chunk counts.
  pub fn allocate(
    &mut self,
    size: usize,
  ) -> Result<usize, AllocError> {
    if size == 0 {
      return Err(AllocError::ZeroSize);
    }

    let Some(chunk) = self.find_free_chunk(size) else {
      let largest_free = self.largest_free();
      debug!(
        "allocate({}) failed, largest free chunk = {}",
        size, largest_free
      );
      return Err(AllocError::OutOfSpace {
        requested: size,
        largest_free,
      });
    };

    let split = self.plan_split(chunk, size);
    trace!("allocate({}): {:?}", size, split);
    self.apply_split(split);

    let address = self.slot(chunk).start;
    debug!("allocated {} units at {}", size, address);

    Ok(address)
  }

  /// Frees the allocated chunk that starts at `address`.
  ///
  /// Addresses inside a chunk but not at its start are rejected, as is a
  /// chunk that is already free. Repeating a rejected call has no effect.
  pub fn release(
    &mut self,
    address: usize,
  ) -> Result<(), AllocError> {
    let Some(chunk) = self.find_chunk_at(address) else {
      debug!("release({}) rejected, no chunk starts there", address);
      return Err(AllocError::InvalidAddress { address });
    };

    if self.slot(chunk).is_free() {
      debug!("release({}) rejected, chunk already free", address);
      return Err(AllocError::DoubleFree { address });
    }

    let coalesce = self.plan_coalesce(chunk);
    trace!("release({}): {:?}", address, coalesce);
    self.apply_coalesce(coalesce);

    debug!("released chunk at {}", address);

    Ok(())
  }

  /// Walks the chunk list in address order.
  pub fn chunks(&self) -> Chunks<'_> {
    Chunks {
      allocator: self,
      cursor: Some(self.first),
    }
  }

  pub fn first_chunk(&self) -> ChunkInfo {
    self.slot(self.first).info()
  }

  pub fn chunk_count(&self) -> usize {
    self.slots.len() - self.vacant.len()
  }

  pub fn free_units(&self) -> usize {
    self
      .chunks()
      .filter(|chunk| !chunk.allocated)
      .map(|chunk| chunk.length)
      .sum()
  }

  pub fn allocated_units(&self) -> usize {
    self.capacity - self.free_units()
  }

  /// Length of the longest free chunk, which is the largest request that can
  /// currently succeed. Zero when everything is allocated.
  pub fn largest_free(&self) -> usize {
    self
      .chunks()
      .filter(|chunk| !chunk.allocated)
      .map(|chunk| chunk.length)
      .max()
      .unwrap_or(0)
  }

  /// Verifies the chunk list partitions `[0, capacity)` in address order with
  /// consistent links and no two neighboring free chunks.
  pub fn check_invariants(&self) -> Result<(), InvariantViolation> {
    let head = self.slot(self.first);
    if head.start != 0 || head.prev.is_some() {
      return Err(InvariantViolation::BadHead { start: head.start });
    }

    let live = self.chunk_count();
    let mut visited = 0;
    let mut expected = 0;
    let mut previous: Option<(ChunkId, &Chunk)> = None;
    let mut cursor = Some(self.first);

    while let Some(id) = cursor {
      visited += 1;
      if visited > live {
        return Err(InvariantViolation::Cycle);
      }

      let chunk = self.slot(id);

      if chunk.start != expected {
        return Err(InvariantViolation::Gap {
          expected,
          found: chunk.start,
        });
      }
      if chunk.length == 0 {
        return Err(InvariantViolation::EmptyChunk { start: chunk.start });
      }
      if let Some((prev_id, prev)) = previous {
        if chunk.prev != Some(prev_id) {
          return Err(InvariantViolation::BrokenBackLink { start: prev.start });
        }
        if prev.is_free() && chunk.is_free() {
          return Err(InvariantViolation::AdjacentFree {
            first: prev.start,
            second: chunk.start,
          });
        }
      }

      expected = chunk.end();
      previous = Some((id, chunk));
      cursor = chunk.next;
    }

    if expected != self.capacity || visited != live {
      return Err(InvariantViolation::Coverage {
        covered: expected,
        capacity: self.capacity,
      });
    }

    Ok(())
  }

  #[inline]
  fn slot(
    &self,
    id: ChunkId,
  ) -> &Chunk {
    &self.slots[id.0]
  }

  #[inline]
  fn slot_mut(
    &mut self,
    id: ChunkId,
  ) -> &mut Chunk {
    &mut self.slots[id.0]
  }

  fn find_free_chunk(
    &self,
    size: usize,
  ) -> Option<ChunkId> {
    let mut cursor = Some(self.first);

    while let Some(id) = cursor {
      let chunk = self.slot(id);
      if chunk.is_free() && chunk.length >= size {
        return Some(id);
      }
      cursor = chunk.next;
    }

    None
  }

  fn find_chunk_at(
    &self,
    address: usize,
  ) -> Option<ChunkId> {
    let mut cursor = Some(self.first);

    while let Some(id) = cursor {
      let chunk = self.slot(id);
      if chunk.start == address {
        return Some(id);
      }
      // Sorted by start, nothing further on can match.
      if chunk.start > address {
        return None;
      }
      cursor = chunk.next;
    }

    None
  }

  fn plan_split(
    &self,
    chunk: ChunkId,
    size: usize,
  ) -> Split {
    let current = self.slot(chunk);
    let remainder = current.length - size;

    if remainder == 0 {
      return Split::Exact { chunk };
    }

    match current.next {
      Some(next) if self.slot(next).is_free() => Split::IntoNext {
        chunk,
        next,
        size,
        remainder,
      },
      _ => Split::NewChunk {
        chunk,
        size,
        remainder,
      },
    }
  }

  fn apply_split(
    &mut self,
    split: Split,
  ) {
    match split {
      Split::Exact { chunk } => {
        self.slot_mut(chunk).allocated = true;
      }
      Split::IntoNext {
        chunk,
        next,
        size,
        remainder,
      } => {
        let current = self.slot_mut(chunk);
        current.length = size;
        current.allocated = true;

        let next = self.slot_mut(next);
        next.start -= remainder;
        next.length += remainder;
      }
      Split::NewChunk {
        chunk,
        size,
        remainder,
      } => {
        let (start, old_next) = {
          let current = self.slot(chunk);
          (current.start + size, current.next)
        };

        let tail = self.insert(Chunk::new(start, remainder, false, Some(chunk), old_next));

        let current = self.slot_mut(chunk);
        current.length = size;
        current.allocated = true;
        current.next = Some(tail);

        if let Some(old_next) = old_next {
          self.slot_mut(old_next).prev = Some(tail);
        }
      }
    }
  }

  fn plan_coalesce(
    &self,
    chunk: ChunkId,
  ) -> Coalesce {
    let current = self.slot(chunk);
    let free_prev = current.prev.filter(|&id| self.slot(id).is_free());
    let free_next = current.next.filter(|&id| self.slot(id).is_free());

    match (free_prev, free_next) {
      (None, None) => Coalesce::Flip { chunk },
      (Some(prev), Some(next)) => Coalesce::Both { prev, chunk, next },
      (Some(prev), None) => Coalesce::IntoPrev { prev, chunk },
      (None, Some(next)) => Coalesce::AbsorbNext { chunk, next },
    }
  }

  fn apply_coalesce(
    &mut self,
    coalesce: Coalesce,
  ) {
    match coalesce {
      Coalesce::Flip { chunk } => {
        self.slot_mut(chunk).allocated = false;
      }
      Coalesce::Both { prev, chunk, next } => {
        let length = self.slot(chunk).length + self.slot(next).length;
        let after = self.slot(next).next;

        let survivor = self.slot_mut(prev);
        survivor.length += length;
        survivor.allocated = false;
        survivor.next = after;

        self.relink_back(after, prev);
        self.vacate(chunk);
        self.vacate(next);
      }
      Coalesce::IntoPrev { prev, chunk } => {
        let (length, after) = {
          let current = self.slot(chunk);
          (current.length, current.next)
        };

        let survivor = self.slot_mut(prev);
        survivor.length += length;
        survivor.next = after;

        self.relink_back(after, prev);
        self.vacate(chunk);
      }
      Coalesce::AbsorbNext { chunk, next } => {
        let (length, after) = {
          let absorbed = self.slot(next);
          (absorbed.length, absorbed.next)
        };

        let survivor = self.slot_mut(chunk);
        survivor.length += length;
        survivor.allocated = false;
        survivor.next = after;

        self.relink_back(after, chunk);
        self.vacate(next);
      }
    }
  }

  fn relink_back(
    &mut self,
    after: Option<ChunkId>,
    prev: ChunkId,
  ) {
    if let Some(after) = after {
      self.slot_mut(after).prev = Some(prev);
    }
  }

  fn insert(
    &mut self,
    chunk: Chunk,
  ) -> ChunkId {
    match self.vacant.pop() {
      Some(id) => {
        self.slots[id.0] = chunk;
        id
      }
      None => {
        self.slots.push(chunk);
        ChunkId(self.slots.len() - 1)
      }
    }
  }

  fn vacate(
    &mut self,
    id: ChunkId,
  ) {
    let chunk = self.slot_mut(id);
    chunk.prev = None;
    chunk.next = None;
    self.vacant.push(id);
  }
}

/// Iterator over the chunk list, see [`Allocator::chunks`].
pub struct Chunks<'a> {
  allocator: &'a Allocator,
  cursor: Option<ChunkId>,
}

impl Iterator for Chunks<'_> {
  type Item = ChunkInfo;

  fn next(&mut self) -> Option<Self::Item> {
    let chunk = self.allocator.slot(self.cursor?);
    self.cursor = chunk.next;
    Some(chunk.info())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  use test_log::test;

  fn layout(allocator: &Allocator) -> Vec<(usize, usize, bool)> {
    allocator
      .chunks()
      .map(|chunk| (chunk.start, chunk.length, chunk.allocated))
      .collect()
  }

  fn checked(allocator: &Allocator) {
    if let Err(violation) = allocator.check_invariants() {
      panic!("{}: {:?}", violation, layout(allocator));
    }
  }

  #[test]
  fn test_new() {
    let allocator = Allocator::new(10).unwrap();

    assert_eq!(layout(&allocator), vec![(0, 10, false)]);
    assert_eq!(allocator.capacity(), 10);
    assert_eq!(allocator.free_units(), 10);
    checked(&allocator);

    assert_eq!(Allocator::new(0).unwrap_err(), AllocError::ZeroCapacity);
  }

  #[test]
  fn test_allocate_whole_capacity() {
    let mut allocator = Allocator::new(10).unwrap();

    assert_eq!(allocator.allocate(10), Ok(0));
    assert_eq!(layout(&allocator), vec![(0, 10, true)]);
    checked(&allocator);
  }

  #[test]
  fn test_allocate_too_large() {
    let mut allocator = Allocator::new(10).unwrap();

    assert_eq!(
      allocator.allocate(11),
      Err(AllocError::OutOfSpace {
        requested: 11,
        largest_free: 10
      })
    );
    assert!(!allocator.first_chunk().allocated);
    assert_eq!(layout(&allocator), vec![(0, 10, false)]);
  }

  #[test]
  fn test_allocate_zero() {
    let mut allocator = Allocator::new(10).unwrap();

    assert_eq!(allocator.allocate(0), Err(AllocError::ZeroSize));
    assert_eq!(layout(&allocator), vec![(0, 10, false)]);
  }

  #[test]
  fn test_allocate_when_full() {
    let mut allocator = Allocator::new(10).unwrap();
    allocator.allocate(10).unwrap();

    assert_eq!(
      allocator.allocate(1),
      Err(AllocError::OutOfSpace {
        requested: 1,
        largest_free: 0
      })
    );
  }

  #[test]
  fn test_release_and_reallocate() {
    let mut allocator = Allocator::new(10).unwrap();
    allocator.allocate(10).unwrap();

    assert_eq!(allocator.release(0), Ok(()));
    assert_eq!(allocator.allocate(10), Ok(0));
    checked(&allocator);
  }

  #[test]
  fn test_release_invalid_address() {
    let mut allocator = Allocator::new(10).unwrap();
    let address = allocator.allocate(4).unwrap();

    assert_eq!(
      allocator.release(address + 1),
      Err(AllocError::InvalidAddress { address: address + 1 })
    );
    assert_eq!(
      allocator.release(42),
      Err(AllocError::InvalidAddress { address: 42 })
    );
    assert_eq!(layout(&allocator), vec![(0, 4, true), (4, 6, false)]);
  }

  #[test]
  fn test_double_free() {
    let mut allocator = Allocator::new(10).unwrap();
    let address = allocator.allocate(3).unwrap();
    allocator.allocate(3).unwrap();
    allocator.release(address).unwrap();

    let before = layout(&allocator);
    for _ in 0..3 {
      assert_eq!(
        allocator.release(address),
        Err(AllocError::DoubleFree { address })
      );
      assert_eq!(layout(&allocator), before);
    }
    checked(&allocator);
  }

  #[test]
  fn test_reuse_middle_chunk() {
    let mut allocator = Allocator::new(10).unwrap();

    assert_eq!(allocator.allocate(1), Ok(0));
    assert_eq!(allocator.allocate(8), Ok(1));
    assert_eq!(allocator.allocate(1), Ok(9));
    assert_eq!(allocator.release(1), Ok(()));
    assert_eq!(allocator.allocate(1), Ok(1));

    assert_eq!(
      layout(&allocator),
      vec![(0, 1, true), (1, 1, true), (2, 7, false), (9, 1, true)]
    );
    checked(&allocator);
  }

  #[test]
  fn test_coalesce_three_chunks() {
    let mut allocator = Allocator::new(10).unwrap();

    for expected in 0..4 {
      assert_eq!(allocator.allocate(1), Ok(expected));
    }
    allocator.release(0).unwrap();
    allocator.release(2).unwrap();
    assert_eq!(allocator.release(1), Ok(()));

    let first = allocator.first_chunk();
    assert_eq!(first.start, 0);
    assert_eq!(first.length, 3);
    assert!(!first.allocated);
    assert_eq!(
      layout(&allocator),
      vec![(0, 3, false), (3, 1, true), (4, 6, false)]
    );
    checked(&allocator);
  }

  #[test]
  fn test_coalesce_into_prev() {
    let mut allocator = Allocator::new(6).unwrap();
    let a = allocator.allocate(2).unwrap();
    let b = allocator.allocate(2).unwrap();
    allocator.allocate(2).unwrap();

    allocator.release(a).unwrap();
    allocator.release(b).unwrap();

    assert_eq!(layout(&allocator), vec![(0, 4, false), (4, 2, true)]);
    checked(&allocator);
  }

  #[test]
  fn test_coalesce_absorb_next() {
    let mut allocator = Allocator::new(6).unwrap();
    allocator.allocate(2).unwrap();
    let b = allocator.allocate(2).unwrap();

    allocator.release(b).unwrap();

    assert_eq!(layout(&allocator), vec![(0, 2, true), (2, 4, false)]);
    assert_eq!(allocator.chunk_count(), 2);
    checked(&allocator);
  }

  #[test]
  fn test_coalesce_both_at_tail() {
    let mut allocator = Allocator::new(6).unwrap();
    let a = allocator.allocate(2).unwrap();
    let b = allocator.allocate(2).unwrap();
    let c = allocator.allocate(2).unwrap();

    allocator.release(a).unwrap();
    allocator.release(c).unwrap();
    allocator.release(b).unwrap();

    assert_eq!(layout(&allocator), vec![(0, 6, false)]);
    assert_eq!(allocator.chunk_count(), 1);
    checked(&allocator);
  }

  #[test]
  fn test_first_fit_skips_small_holes() {
    let mut allocator = Allocator::new(12).unwrap();
    let a = allocator.allocate(2).unwrap();
    allocator.allocate(2).unwrap();
    let c = allocator.allocate(4).unwrap();
    allocator.allocate(2).unwrap();

    allocator.release(a).unwrap();
    allocator.release(c).unwrap();

    // Holes of 2, 4 and 2 units; no aggregation across them.
    assert_eq!(allocator.largest_free(), 4);
    assert_eq!(allocator.free_units(), 8);
    assert_eq!(allocator.allocate(3), Ok(c));
    assert_eq!(allocator.allocate(2), Ok(a));
    assert!(matches!(
      allocator.allocate(5),
      Err(AllocError::OutOfSpace { .. })
    ));
    checked(&allocator);
  }

  #[test]
  fn test_split_links_both_sides() {
    let mut allocator = Allocator::new(10).unwrap();
    let a = allocator.allocate(5).unwrap();
    allocator.allocate(5).unwrap();
    allocator.release(a).unwrap();

    assert_eq!(allocator.allocate(2), Ok(0));
    assert_eq!(
      layout(&allocator),
      vec![(0, 2, true), (2, 3, false), (5, 5, true)]
    );
    checked(&allocator);
  }

  #[test]
  fn test_split_into_free_successor() {
    let mut allocator = Allocator::new(10).unwrap();
    allocator.allocate(4).unwrap();

    // Two free neighbors never coexist between public calls, so set the
    // shape up by hand to reach the merge-forward branch.
    let head = allocator.first;
    let tail = allocator.slot(head).next.unwrap();
    allocator.slot_mut(head).allocated = false;

    assert_eq!(
      allocator.plan_split(head, 1),
      Split::IntoNext {
        chunk: head,
        next: tail,
        size: 1,
        remainder: 3
      }
    );
    assert_eq!(allocator.allocate(1), Ok(0));
    assert_eq!(layout(&allocator), vec![(0, 1, true), (1, 9, false)]);
    assert_eq!(allocator.chunk_count(), 2);
    checked(&allocator);
  }

  #[test]
  fn test_allocate_then_release_restores_shape() {
    let mut allocator = Allocator::new(32).unwrap();
    let a = allocator.allocate(4).unwrap();
    allocator.allocate(6).unwrap();
    let c = allocator.allocate(3).unwrap();
    allocator.allocate(5).unwrap();
    allocator.release(a).unwrap();
    allocator.release(c).unwrap();

    for size in 1..=16 {
      let before = layout(&allocator);
      if let Ok(address) = allocator.allocate(size) {
        checked(&allocator);
        allocator.release(address).unwrap();
      }
      assert_eq!(layout(&allocator), before, "size {}", size);
      checked(&allocator);
    }
  }

  #[test]
  fn test_slots_are_reused() {
    let mut allocator = Allocator::new(64).unwrap();

    for _ in 0..100 {
      let a = allocator.allocate(3).unwrap();
      let b = allocator.allocate(5).unwrap();
      let c = allocator.allocate(7).unwrap();
      allocator.release(b).unwrap();
      allocator.release(a).unwrap();
      allocator.release(c).unwrap();
      assert_eq!(allocator.chunk_count(), 1);
    }

    assert!(allocator.slots.len() <= 4);
  }

  #[test]
  fn test_check_invariants_detects_corruption() {
    let mut allocator = Allocator::new(10).unwrap();
    allocator.allocate(4).unwrap();

    let tail = allocator.slot(allocator.first).next.unwrap();
    allocator.slot_mut(tail).start = 5;
    assert_eq!(
      allocator.check_invariants(),
      Err(InvariantViolation::Gap {
        expected: 4,
        found: 5
      })
    );

    allocator.slot_mut(tail).start = 4;
    let head = allocator.first;
    allocator.slot_mut(head).allocated = false;
    assert_eq!(
      allocator.check_invariants(),
      Err(InvariantViolation::AdjacentFree { first: 0, second: 4 })
    );
  }

  #[test]
  fn test_deterministic_churn() {
    fn run() -> Vec<Result<usize, AllocError>> {
      let mut allocator = Allocator::new(256).unwrap();
      let mut live: Vec<usize> = Vec::new();
      let mut seed: u64 = 0x2545_f491_4f6c_dd1d;
      let mut results = Vec::new();

      for _ in 0..2_000 {
        seed = seed
          .wrapping_mul(6_364_136_223_846_793_005)
          .wrapping_add(1_442_695_040_888_963_407);
        let roll = (seed >> 33) as usize;

        if live.is_empty() || roll % 3 != 0 {
          let result = allocator.allocate(roll % 24 + 1);
          if let Ok(address) = result {
            live.push(address);
          }
          results.push(result);
        } else {
          let address = live.swap_remove(roll % live.len());
          assert_eq!(allocator.release(address), Ok(()));
        }

        checked(&allocator);
        let used: usize = allocator
          .chunks()
          .filter(|chunk| chunk.allocated)
          .count();
        assert_eq!(used, live.len());
      }

      for address in live {
        allocator.release(address).unwrap();
      }
      assert_eq!(layout(&allocator), vec![(0, 256, false)]);

      results
    }

    assert_eq!(run(), run());
  }
}
