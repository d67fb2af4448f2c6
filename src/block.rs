//! Region header encoding.
//!
//! Every region starts with one header word:
//!
//! ```text
//!   63                                   3   2   1   0
//!   ┌──────────────────────────────────┬───┬───┬───┐
//!   │ s  s  s  s  ...  s  s  s  s  s  │ 0 │ 0 │a/f│
//!   └──────────────────────────────────┴───┴───┴───┘
//! ```
//!
//! `s` are the size bits (the size is always a multiple of [`DSIZE`], so the
//! low three bits are free) and `a/f` is set while the region is allocated.

use crate::align;

/// Growth unit in bytes. Heap extension requests are counted in words.
pub const WSIZE: usize = 4;

/// Double word; the alignment of every header and payload.
pub const DSIZE: usize = 8;

/// Bytes taken by the header in front of each payload.
pub const HEADER_SIZE: usize = 8;

/// Smallest region the heap ever creates.
pub const MIN_BLOCK_SIZE: usize = 16;

const ALLOCATED: usize = 0x1;
const SIZE_MASK: usize = !0x7;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header(usize);

impl Header {
  pub fn new(
    size: usize,
    allocated: bool,
  ) -> Self {
    debug_assert_eq!(size & !SIZE_MASK, 0, "region size {size} is not 8-aligned");
    Self(size | if allocated { ALLOCATED } else { 0 })
  }

  pub fn from_word(word: usize) -> Self {
    Self(word)
  }

  pub fn word(self) -> usize {
    self.0
  }

  pub fn size(self) -> usize {
    self.0 & SIZE_MASK
  }

  pub fn is_allocated(self) -> bool {
    self.0 & ALLOCATED != 0
  }

  /// Same size, allocated bit cleared.
  pub fn freed(self) -> Self {
    Self(self.0 & !ALLOCATED)
  }
}

/// Region size needed to serve a request of `size` payload bytes.
///
/// Requests of at most [`DSIZE`] bytes get the minimum region, anything larger
/// is rounded up to [`DSIZE`] and the header is added on top. Returns `None`
/// when the result would not fit in a `usize`.
pub fn adjusted_size(size: usize) -> Option<usize> {
  if size <= DSIZE {
    return Some(MIN_BLOCK_SIZE);
  }

  if size > usize::MAX - DSIZE - HEADER_SIZE {
    return None;
  }

  Some(align!(size) + HEADER_SIZE)
}
