use std::{io::Read, ptr};

use rheap::{Heap, Sbrk};

/// Waits until the user presses ENTER.
/// Useful when you want to inspect memory state with tools like `pmap` or
/// `gdb` while the heap walks through its states.
fn block_until_enter_pressed() {
  println!("\n>>> Press ENTER to continue...");
  let _ = std::io::stdin().bytes().next();
}

/// Prints the current program break.
fn print_program_break(label: &str) {
  println!(
    "[{}] PID = {}, program break = {:?}",
    label,
    std::process::id(),
    Sbrk::program_break(),
  );
}

fn print_heap(heap: &Heap<Sbrk>) {
  print!("{heap}");
}

fn main() {
  env_logger::init();

  let mut heap = match Heap::new(Sbrk::new()) {
    Ok(heap) => heap,
    Err(err) => {
      eprintln!("failed to initialize heap: {err}");
      std::process::exit(1);
    }
  };

  print_program_break("start");
  print_heap(&heap);
  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 1) Two small allocations. Both get the 16 byte minimum region and the
  //    second one sits right after the first.
  // --------------------------------------------------------------------
  let a = heap.allocate(4).unwrap();
  let b = heap.allocate(4).unwrap();
  println!("\n[1] a = {:?}, b = {:?}", a, b);
  print_heap(&heap);
  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 2) Free `a` and allocate again. First fit hands back the same region
  //    without touching the program break.
  // --------------------------------------------------------------------
  unsafe { heap.free(a).unwrap() };
  print_program_break("after free");
  let c = heap.allocate(4).unwrap();
  println!(
    "\n[2] c == a? {}",
    if c == a {
      "Yes, the freed region was reused"
    } else {
      "No, the heap grew"
    }
  );
  print_heap(&heap);
  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 3) A large region, freed, then carved up by a small request.
  // --------------------------------------------------------------------
  let big = heap.allocate(200).unwrap();
  let guard = heap.allocate(4).unwrap();
  unsafe { heap.free(big).unwrap() };
  let small = heap.allocate(8).unwrap();
  println!("\n[3] split the 208 byte region, small = {:?}", small);
  print_heap(&heap);
  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 4) Reallocate moves the payload into a fresh region.
  // --------------------------------------------------------------------
  unsafe {
    ptr::write_bytes(small.as_ptr(), 0xAB, 8);
    let moved = heap.reallocate(small, 64).unwrap();
    println!("\n[4] reallocate {:?} -> {:?}, first byte = {:#X}", small, moved, *moved.as_ptr());
    heap.free(moved).unwrap();
  }
  print_heap(&heap);
  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 5) Free what is left and walk the chain one last time.
  // --------------------------------------------------------------------
  unsafe {
    heap.free(guard).unwrap();
    heap.free(b).unwrap();
    heap.free(c).unwrap();
  }
  print_program_break("end");
  print_heap(&heap);

  match heap.check() {
    Ok(()) => println!("\n[5] heap is consistent: {:?}", heap.stats()),
    Err(err) => println!("\n[5] heap check failed: {err}"),
  }
}
