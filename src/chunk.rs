/// Stable handle to a chunk slot in the allocator's arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct ChunkId(pub(crate) usize);

/// Chunk record, one contiguous range of the managed space.
#[derive(Clone, Debug)]
pub(crate) struct Chunk {
  pub start: usize,
  pub length: usize,
  pub allocated: bool,
  pub prev: Option<ChunkId>,
  pub next: Option<ChunkId>,
}

impl Chunk {
  pub fn new(
    start: usize,
    length: usize,
    allocated: bool,
    prev: Option<ChunkId>,
    next: Option<ChunkId>,
  ) -> Self {
    Self { start, length, allocated, prev, next }
  }

  #[inline]
  pub fn is_free(&self) -> bool {
    !self.allocated
  }

  #[inline]
  pub fn end(&self) -> usize {
    self.start + self.length
  }

  pub fn info(&self) -> ChunkInfo {
    ChunkInfo {
      start: self.start,
      length: self.length,
      allocated: self.allocated,
    }
  }
}

/// Read-only view of a chunk, handed out by [`Allocator::chunks`](crate::Allocator::chunks).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChunkInfo {
  pub start: usize,
  pub length: usize,
  pub allocated: bool,
}

impl ChunkInfo {
  pub fn end(&self) -> usize {
    self.start + self.length
  }
}
