//! Backing memory for the heap.
//!
//! The heap never maps memory on its own. It asks a [`GrowthProvider`] to
//! extend the managed span, exactly like `sbrk(2)` extends the data segment.

use std::ptr::{self, NonNull};

use libc::{c_void, intptr_t, sbrk};
use log::warn;

use crate::{DSIZE, align_to};

/// Source of monotonically growing, contiguous memory.
///
/// # Safety
///
/// Implementors must guarantee that:
///
/// - the span returned by `grow(n)` is valid for reads and writes of `n` bytes
///   for as long as the provider is alive;
/// - every span starts right where the previous one ended (no relocation);
/// - the first span starts at a [`DSIZE`]-aligned address.
pub unsafe trait GrowthProvider {
  /// Extends the managed region by `increment` bytes and returns the start of
  /// the new span, or `None` when the environment cannot grant more memory.
  fn grow(
    &mut self,
    increment: usize,
  ) -> Option<NonNull<u8>>;
}

/// The process data segment, grown with `sbrk(2)`.
///
/// Only one heap should be built on top of the program break, and nothing else
/// in the process may move it while the heap is alive.
#[derive(Debug, Default)]
pub struct Sbrk {
  aligned: bool,
}

impl Sbrk {
  pub fn new() -> Self {
    Self { aligned: false }
  }

  /// Current program break.
  pub fn program_break() -> *mut u8 {
    unsafe { sbrk(0) as *mut u8 }
  }

  unsafe fn bump(increment: usize) -> Option<NonNull<u8>> {
    let increment = intptr_t::try_from(increment).ok()?;
    let address = unsafe { sbrk(increment) };

    if address == usize::MAX as *mut c_void {
      warn!("sbrk({increment}) failed");
      return None;
    }

    NonNull::new(address as *mut u8)
  }
}

unsafe impl GrowthProvider for Sbrk {
  fn grow(
    &mut self,
    increment: usize,
  ) -> Option<NonNull<u8>> {
    unsafe {
      if !self.aligned {
        let brk = Self::program_break() as usize;
        let padding = align_to!(brk, DSIZE) - brk;
        if padding != 0 {
          Self::bump(padding)?;
        }
        self.aligned = true;
      }

      Self::bump(increment)
    }
  }
}

/// Fixed-capacity buffer handing out its bytes front to back.
///
/// Once the capacity is used up `grow` fails, which makes it a convenient
/// stand-in for an exhausted environment.
#[derive(Debug)]
pub struct Arena {
  base: NonNull<u8>,
  words: usize,
  used: usize,
}

impl Arena {
  /// Creates an arena of at least `capacity` bytes (rounded up to [`DSIZE`]).
  pub fn with_capacity(capacity: usize) -> Self {
    let words = capacity.div_ceil(DSIZE);
    let buffer: Box<[u64]> = vec![0u64; words].into_boxed_slice();
    let base = NonNull::from(Box::leak(buffer)).cast::<u8>();

    Self {
      base,
      words,
      used: 0,
    }
  }

  pub fn capacity(&self) -> usize {
    self.words * DSIZE
  }

  pub fn used(&self) -> usize {
    self.used
  }

  pub fn remaining(&self) -> usize {
    self.capacity() - self.used
  }
}

unsafe impl GrowthProvider for Arena {
  fn grow(
    &mut self,
    increment: usize,
  ) -> Option<NonNull<u8>> {
    if increment > self.remaining() {
      return None;
    }

    let span = unsafe { self.base.add(self.used) };
    self.used += increment;
    Some(span)
  }
}

impl Drop for Arena {
  fn drop(&mut self) {
    let slice = ptr::slice_from_raw_parts_mut(self.base.as_ptr().cast::<u64>(), self.words);
    unsafe { drop(Box::from_raw(slice)) };
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_arena_grows_contiguously() {
    let mut arena = Arena::with_capacity(64);

    let first = arena.grow(8).unwrap();
    let second = arena.grow(24).unwrap();

    assert_eq!(first.as_ptr() as usize % DSIZE, 0);
    assert_eq!(unsafe { first.add(8) }, second);
    assert_eq!(arena.used(), 32);
    assert_eq!(arena.remaining(), 32);
  }

  #[test]
  fn test_arena_exhaustion_leaves_state() {
    let mut arena = Arena::with_capacity(20);
    assert_eq!(arena.capacity(), 24);

    assert!(arena.grow(16).is_some());
    assert!(arena.grow(16).is_none());
    assert_eq!(arena.used(), 16);
    assert!(arena.grow(8).is_some());
    assert_eq!(arena.remaining(), 0);
  }

  #[test]
  fn test_arena_memory_is_writable() {
    let mut arena = Arena::with_capacity(32);
    let span = arena.grow(32).unwrap();

    unsafe {
      ptr::write_bytes(span.as_ptr(), 0xAB, 32);
      assert_eq!(*span.as_ptr().add(31), 0xAB);
    }
  }
}
