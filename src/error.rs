use std::{error, fmt};

/// Reasons an allocator or heap operation is rejected.
///
/// None of these leave the allocator in a bad state: a rejected call makes no
/// change to the chunk list.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AllocError {
  /// No single free chunk is long enough for the request.
  OutOfSpace { requested: usize, largest_free: usize },
  /// The address is not the start of any chunk.
  InvalidAddress { address: usize },
  /// The address starts a chunk that is already free.
  DoubleFree { address: usize },
  /// Requests must be at least one unit long.
  ZeroSize,
  /// The managed space must be at least one unit long.
  ZeroCapacity,
  /// The host could not obtain storage for the managed buffer.
  BufferUnavailable { capacity: usize },
}

impl fmt::Display for AllocError {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    match self {
      AllocError::OutOfSpace { requested, largest_free } => write!(
        f,
        "out of space: requested {} units, largest free chunk is {}",
        requested, largest_free
      ),
      AllocError::InvalidAddress { address } => {
        write!(f, "address {} is not the start of a chunk", address)
      }
      AllocError::DoubleFree { address } => {
        write!(f, "chunk at {} is already free", address)
      }
      AllocError::ZeroSize => f.write_str("cannot allocate zero units"),
      AllocError::ZeroCapacity => f.write_str("capacity must be positive"),
      AllocError::BufferUnavailable { capacity } => {
        write!(f, "could not acquire a buffer of {} bytes", capacity)
      }
    }
  }
}

impl error::Error for AllocError {}

/// Structural rule broken by the chunk list, reported by
/// [`Allocator::check_invariants`](crate::Allocator::check_invariants).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InvariantViolation {
  /// The head chunk does not start at zero or has a `prev` link.
  BadHead { start: usize },
  /// A chunk does not begin where its predecessor ends.
  Gap { expected: usize, found: usize },
  /// A chunk has zero length.
  EmptyChunk { start: usize },
  /// `next.prev` does not point back at the chunk.
  BrokenBackLink { start: usize },
  /// Two neighboring chunks are both free.
  AdjacentFree { first: usize, second: usize },
  /// The chunks do not add up to the capacity.
  Coverage { covered: usize, capacity: usize },
  /// More links were followed than there are live chunks.
  Cycle,
}

impl fmt::Display for InvariantViolation {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    match self {
      InvariantViolation::BadHead { start } => {
        write!(f, "head chunk starts at {} or has a predecessor", start)
      }
      InvariantViolation::Gap { expected, found } => {
        write!(f, "expected a chunk at {}, found one at {}", expected, found)
      }
      InvariantViolation::EmptyChunk { start } => write!(f, "chunk at {} is empty", start),
      InvariantViolation::BrokenBackLink { start } => {
        write!(f, "successor of chunk at {} does not link back", start)
      }
      InvariantViolation::AdjacentFree { first, second } => {
        write!(f, "free chunks at {} and {} are not merged", first, second)
      }
      InvariantViolation::Coverage { covered, capacity } => {
        write!(f, "chunks cover {} of {} units", covered, capacity)
      }
      InvariantViolation::Cycle => f.write_str("chunk list has a cycle"),
    }
  }
}

impl error::Error for InvariantViolation {}
