use std::{env, io::Read};

use chunkalloc::{AllocError, Heap};
use log::info;

const DEFAULT_CAPACITY: usize = 32;

/// Waits until the user presses ENTER, so each step can be read before the
/// next one changes the chunk list.
fn block_until_enter_pressed() {
  println!("\n>>> Press ENTER to continue...");
  let _ = std::io::stdin().bytes().next();
}

/// Prints every chunk as `[start..end) state`.
fn print_chunks(
  label: &str,
  heap: &Heap,
) {
  println!("[{}]", label);
  for chunk in heap.allocator().chunks() {
    println!(
      "  [{:>3}..{:>3}) {}",
      chunk.start,
      chunk.end(),
      if chunk.allocated { "allocated" } else { "free" }
    );
  }
}

fn main() -> Result<(), AllocError> {
  env_logger::init();

  // Optional capacity as the first argument.
  let capacity = env::args()
    .nth(1)
    .and_then(|arg| arg.parse().ok())
    .unwrap_or(DEFAULT_CAPACITY);

  let mut heap = Heap::new(capacity)?;
  info!("heap of {} units at {:?}", capacity, heap.buffer().as_ptr());
  print_chunks("start", &heap);
  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 1) Three allocations carve the space from the front.
  // --------------------------------------------------------------------
  let a = heap.allocate(4)?;
  let b = heap.allocate(8)?;
  let c = heap.allocate(4)?;
  heap.block_mut(b)?.fill(0xAB);
  print_chunks("1: allocate 4, 8, 4", &heap);
  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 2) Freeing the middle block leaves a hole between two live blocks.
  // --------------------------------------------------------------------
  heap.release(b)?;
  print_chunks("2: release middle", &heap);
  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 3) A small request lands in the hole: first fit, lowest address.
  // --------------------------------------------------------------------
  let d = heap.allocate(2)?;
  println!("[3] allocate(2) = {} (hole started at {})", d, b);
  println!("[3] old bytes still there: {:02X?}", heap.block(d)?);
  print_chunks("3: reuse hole", &heap);
  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 4) Rejected calls report why and change nothing.
  // --------------------------------------------------------------------
  for result in [heap.release(d + 1), heap.release(b + 4)] {
    if let Err(err) = result {
      println!("[4] {}", err);
    }
  }
  if let Err(err) = heap.allocate(capacity + 1) {
    println!("[4] {}", err);
  }
  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 5) Releasing everything coalesces back to a single free chunk.
  // --------------------------------------------------------------------
  for address in [a, c, d] {
    heap.release(address)?;
  }
  print_chunks("5: release all", &heap);

  if let Err(err) = heap.release(a) {
    println!("[5] {}", err);
  }

  Ok(())
}
