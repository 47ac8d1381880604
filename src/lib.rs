//! # chunkalloc - A First-Fit Chunk Allocator
//!
//! This crate provides a **first-fit allocator** that partitions a fixed,
//! simulated address space into chunks, and a small host [`Heap`] that backs
//! that space with real bytes.
//!
//! ## Overview
//!
//! The managed space `[0, capacity)` is always fully covered by an ordered
//! list of chunks. Each chunk is either allocated or free:
//!
//! ```text
//!   Chunk List (capacity = 16):
//!
//!   ┌──────────┬───────────┬──────────┬─────────────────────────────┐
//!   │ A  0..3  │ free 3..6 │ A  6..8  │         free 8..16          │
//!   └──────────┴───────────┴──────────┴─────────────────────────────┘
//!    first ──►    next  ──►   next ──►           next = None
//!         ◄── prev     ◄── prev    ◄── prev
//!
//!   Two free chunks are never neighbors: they are merged on release.
//! ```
//!
//! ## Crate Structure
//!
//! ```text
//!   chunkalloc
//!   ├── chunk      - Chunk record and arena handle (internal)
//!   ├── error      - AllocError, InvariantViolation
//!   ├── first_fit  - Allocator implementation
//!   └── heap       - ManagedBuffer and Heap host
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use chunkalloc::{AllocError, Allocator};
//!
//! fn main() -> Result<(), AllocError> {
//!     let mut allocator = Allocator::new(10)?;
//!
//!     let a = allocator.allocate(1)?;
//!     let b = allocator.allocate(8)?;
//!     let c = allocator.allocate(1)?;
//!     assert_eq!((a, b, c), (0, 1, 9));
//!
//!     allocator.release(b)?;
//!     assert_eq!(allocator.allocate(1)?, 1);
//!
//!     allocator.release(b)?;
//!     assert_eq!(allocator.release(b), Err(AllocError::DoubleFree { address: 1 }));
//!     Ok(())
//! }
//! ```
//!
//! ## How It Works
//!
//! Allocation walks the list from the lowest address and takes the first
//! free chunk that is long enough. A longer chunk is split:
//!
//! ```text
//!   allocate(3) on a 10 unit free chunk:
//!
//!   ┌───────────────────────────────┐        ┌─────────┬─────────────────────┐
//!   │          free 0..10           │  ───►  │ A  0..3 │     free 3..10      │
//!   └───────────────────────────────┘        └─────────┴─────────────────────┘
//! ```
//!
//! Release flips the chunk back to free and folds it together with any free
//! neighbor:
//!
//! ```text
//!   release(3):
//!
//!   ┌─────────┬─────────┬─────────┬──────┐        ┌───────────────────────────┬──────┐
//!   │ free    │ A  3..6 │ free    │ A    │  ───►  │         free 0..9         │ A    │
//!   │  0..3   │         │  6..9   │ 9..10│        │                           │ 9..10│
//!   └─────────┴─────────┴─────────┴──────┘        └───────────────────────────┴──────┘
//! ```
//!
//! Chunks live in an arena and link to each other through integer handles,
//! so splicing a chunk out is O(1) and no chunk owns its neighbors.
//!
//! ## Limitations
//!
//! - **Single-threaded only**: wrap the allocator in a lock if it is shared;
//!   an allocate or release must run as one critical section
//! - **Fixed capacity**: the managed space never grows
//! - **No alignment**: sizes and offsets are plain units
//! - **Linear search**: both operations walk the chunk list

mod chunk;
mod error;
mod first_fit;
mod heap;

pub use chunk::ChunkInfo;
pub use error::{AllocError, InvariantViolation};
pub use first_fit::{Allocator, Chunks};
pub use heap::{Heap, ManagedBuffer};
