use std::{ptr::NonNull, slice};

use libc::{c_void, calloc, free};
use log::debug;

use crate::{AllocError, Allocator};

/// Zeroed raw storage obtained from the C allocator.
pub struct ManagedBuffer {
  base: NonNull<u8>,
  capacity: usize,
}

impl ManagedBuffer {
  pub fn new(capacity: usize) -> Result<Self, AllocError> {
    if capacity == 0 {
      return Err(AllocError::ZeroCapacity);
    }

    let raw = unsafe { calloc(capacity, 1) } as *mut u8;
    let base = NonNull::new(raw).ok_or(AllocError::BufferUnavailable { capacity })?;

    debug!("acquired {} byte buffer at {:?}", capacity, base);

    Ok(Self { base, capacity })
  }

  pub fn capacity(&self) -> usize {
    self.capacity
  }

  pub fn as_ptr(&self) -> *const u8 {
    self.base.as_ptr()
  }

  fn range(
    &self,
    start: usize,
    length: usize,
  ) -> &[u8] {
    assert!(start + length <= self.capacity);
    unsafe { slice::from_raw_parts(self.base.as_ptr().add(start), length) }
  }

  fn range_mut(
    &mut self,
    start: usize,
    length: usize,
  ) -> &mut [u8] {
    assert!(start + length <= self.capacity);
    unsafe { slice::from_raw_parts_mut(self.base.as_ptr().add(start), length) }
  }
}

impl Drop for ManagedBuffer {
  fn drop(&mut self) {
    unsafe { free(self.base.as_ptr() as *mut c_void) };
  }
}

/// A managed buffer paired with the allocator that partitions it.
///
/// The allocator hands out offsets; the heap turns them into byte slices.
pub struct Heap {
  buffer: ManagedBuffer,
  allocator: Allocator,
}

impl Heap {
  pub fn new(capacity: usize) -> Result<Self, AllocError> {
    let allocator = Allocator::new(capacity)?;
    let buffer = ManagedBuffer::new(capacity)?;

    Ok(Self { buffer, allocator })
  }

  pub fn allocator(&self) -> &Allocator {
    &self.allocator
  }

  pub fn buffer(&self) -> &ManagedBuffer {
    &self.buffer
  }

  pub fn allocate(
    &mut self,
    size: usize,
  ) -> Result<usize, AllocError> {
    self.allocator.allocate(size)
  }

  pub fn release(
    &mut self,
    address: usize,
  ) -> Result<(), AllocError> {
    self.allocator.release(address)
  }

  /// Bytes of the allocated block starting at `address`.
  pub fn block(
    &self,
    address: usize,
  ) -> Result<&[u8], AllocError> {
    let length = self.block_length(address)?;
    Ok(self.buffer.range(address, length))
  }

  pub fn block_mut(
    &mut self,
    address: usize,
  ) -> Result<&mut [u8], AllocError> {
    let length = self.block_length(address)?;
    Ok(self.buffer.range_mut(address, length))
  }

  fn block_length(
    &self,
    address: usize,
  ) -> Result<usize, AllocError> {
    self
      .allocator
      .chunks()
      .take_while(|chunk| chunk.start <= address)
      .find(|chunk| chunk.start == address && chunk.allocated)
      .map(|chunk| chunk.length)
      .ok_or(AllocError::InvalidAddress { address })
  }
}
