use std::{fmt, process, ptr, ptr::NonNull};

use log::{debug, error, trace, warn};
use rustc_hash::FxHashSet;

use crate::{
  DSIZE, HEADER_SIZE, MIN_BLOCK_SIZE, WSIZE,
  block::{Header, adjusted_size},
  config::{HeapConfig, OomPolicy},
  error::{HeapError, HeapResult},
  provider::GrowthProvider,
};

/// Unused word at the base so every header lands on a double word.
const PADDING: usize = HEADER_SIZE;

/// A region as seen by a heap walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionInfo {
  /// Byte offset of the header from the heap base.
  pub offset: usize,
  /// Full region size, header included.
  pub size: usize,
  pub allocated: bool,
}

impl RegionInfo {
  pub fn payload_offset(&self) -> usize {
    self.offset + HEADER_SIZE
  }

  pub fn payload_size(&self) -> usize {
    self.size - HEADER_SIZE
  }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeapStats {
  /// Bytes between heap start and heap end.
  pub heap_size: usize,
  pub regions: usize,
  pub free_regions: usize,
  pub allocated_regions: usize,
  pub free_bytes: usize,
  pub allocated_bytes: usize,
}

/// Implicit free list allocator.
///
/// Regions are laid out back to back between `start` and `end`. Each one
/// starts with a [`Header`] and the next region is found by adding the size
/// stored there. Both bounds are byte offsets from `base`, the first address
/// the provider handed out.
pub struct Heap<P: GrowthProvider> {
  provider: P,
  config: HeapConfig,
  base: NonNull<u8>,
  start: usize,
  end: usize,
  live: Option<FxHashSet<usize>>,
}

impl<P: GrowthProvider> Heap<P> {
  /// Builds an empty heap with the default configuration.
  pub fn new(provider: P) -> HeapResult<Self> {
    Self::init(provider, HeapConfig::default())
  }

  /// Reserves the alignment padding and sets up an empty region chain.
  pub fn init(
    mut provider: P,
    config: HeapConfig,
  ) -> HeapResult<Self> {
    let base = provider
      .grow(PADDING)
      .ok_or(HeapError::OutOfMemory { requested: PADDING })?;

    unsafe { base.as_ptr().cast::<usize>().write(0) };

    debug!("heap initialized at {:?}, config = {:?}", base, config);

    Ok(Self {
      provider,
      config,
      base,
      start: PADDING,
      end: PADDING,
      live: config.track_allocations.then(FxHashSet::default),
    })
  }

  pub fn config(&self) -> &HeapConfig {
    &self.config
  }

  pub fn provider(&self) -> &P {
    &self.provider
  }

  /// Address of the first region header.
  pub fn start(&self) -> *const u8 {
    unsafe { self.base.as_ptr().add(self.start) }
  }

  /// One past the last byte of the managed span.
  pub fn end(&self) -> *const u8 {
    unsafe { self.base.as_ptr().add(self.end) }
  }

  /// Allocates a region with room for at least `size` bytes.
  ///
  /// The returned pointer is aligned to [`DSIZE`]. When no free region fits,
  /// the heap grows by exactly the adjusted size.
  pub fn allocate(
    &mut self,
    size: usize,
  ) -> HeapResult<NonNull<u8>> {
    let Some(asize) = adjusted_size(size) else {
      return Err(self.out_of_memory(HeapError::OutOfMemory { requested: size }));
    };

    let offset = match self.find_fit(asize) {
      Some(offset) => offset,
      None => {
        let offset = self
          .extend_heap(asize / WSIZE)
          .map_err(|err| match err {
            HeapError::OutOfMemory { .. } => self.out_of_memory(err),
            err => err,
          })?;
        self.write_header(offset, Header::new(self.end - offset, false));
        offset
      }
    };

    self.place(offset, asize);

    let payload = offset + HEADER_SIZE;
    if let Some(live) = &mut self.live {
      live.insert(payload);
    }

    Ok(self.pointer(payload))
  }

  /// Releases the region whose payload starts at `ptr`.
  ///
  /// # Safety
  ///
  /// Unless allocation tracking is enabled, `ptr` must come from
  /// [`allocate`](Self::allocate) or [`reallocate`](Self::reallocate) on this
  /// heap and must not have been freed since.
  pub unsafe fn free(
    &mut self,
    ptr: NonNull<u8>,
  ) -> HeapResult<()> {
    let payload = self.validate(ptr)?;
    if let Some(live) = &mut self.live {
      live.remove(&payload);
    }

    let offset = payload - HEADER_SIZE;
    let header = self.read_header(offset);
    self.write_header(offset, header.freed());
    trace!("freed region at {:#x} ({} bytes)", offset, header.size());

    self.coalesce(offset);
    Ok(())
  }

  /// Moves the allocation at `ptr` into a fresh region of `new_size` bytes.
  ///
  /// The first `min(new_size, old payload size)` bytes are copied over and
  /// the old region is freed. The result is never `ptr` itself. If the new
  /// allocation fails the old region is left untouched.
  ///
  /// # Safety
  ///
  /// Same contract as [`free`](Self::free).
  pub unsafe fn reallocate(
    &mut self,
    ptr: NonNull<u8>,
    new_size: usize,
  ) -> HeapResult<NonNull<u8>> {
    let payload = self.validate(ptr)?;
    let old_size = self.read_header(payload - HEADER_SIZE).size() - HEADER_SIZE;

    let new = self.allocate(new_size)?;

    unsafe {
      ptr::copy_nonoverlapping(ptr.as_ptr(), new.as_ptr(), new_size.min(old_size));
      self.free(ptr)?;
    }

    Ok(new)
  }

  /// Usable bytes of the allocation at `ptr`.
  ///
  /// # Safety
  ///
  /// `ptr` must be a live allocation of this heap.
  pub unsafe fn payload_size(
    &self,
    ptr: NonNull<u8>,
  ) -> usize {
    let offset = self.offset_of(ptr) - HEADER_SIZE;
    self.read_header(offset).size() - HEADER_SIZE
  }

  /// Whether `ptr` points inside the managed span.
  pub fn contains(
    &self,
    ptr: NonNull<u8>,
  ) -> bool {
    let address = ptr.as_ptr() as usize;
    let base = self.base.as_ptr() as usize;

    address >= base + self.start && address < base + self.end
  }

  /// Walks the region chain in address order.
  pub fn regions(&self) -> Regions<'_, P> {
    Regions {
      heap: self,
      offset: self.start,
    }
  }

  pub fn stats(&self) -> HeapStats {
    let mut stats = HeapStats {
      heap_size: self.end - self.start,
      ..HeapStats::default()
    };

    for region in self.regions() {
      stats.regions += 1;
      if region.allocated {
        stats.allocated_regions += 1;
        stats.allocated_bytes += region.size;
      } else {
        stats.free_regions += 1;
        stats.free_bytes += region.size;
      }
    }

    stats
  }

  /// Verifies the region chain.
  ///
  /// Every header must sit on a double word and describe a region of at least
  /// [`MIN_BLOCK_SIZE`] bytes, and the chain must end exactly at heap end.
  /// With tracking enabled, the tracked set must match the allocated regions.
  pub fn check(&self) -> HeapResult<()> {
    let corrupted = |offset: usize, reason: &'static str| -> HeapResult<()> {
      Err(HeapError::Corrupted { offset, reason })
    };

    if self.start > self.end {
      return corrupted(self.start, "heap start past heap end");
    }

    let mut offset = self.start;
    let mut allocated = 0;

    while offset < self.end {
      if offset % DSIZE != 0 {
        return corrupted(offset, "misaligned header");
      }
      if self.end - offset < HEADER_SIZE {
        return corrupted(offset, "truncated header");
      }

      let header = self.read_header(offset);
      let size = header.size();

      if size < MIN_BLOCK_SIZE {
        return corrupted(offset, "region smaller than minimum");
      }
      if size > self.end - offset {
        return corrupted(offset, "region overruns heap end");
      }

      if header.is_allocated() {
        allocated += 1;
        if let Some(live) = &self.live {
          if !live.contains(&(offset + HEADER_SIZE)) {
            return corrupted(offset, "allocated region is not tracked");
          }
        }
      }

      offset += size;
    }

    if let Some(live) = &self.live {
      if live.len() != allocated {
        return corrupted(self.end, "tracked allocation freed behind the heap's back");
      }
    }

    Ok(())
  }

  /// Extends the heap by `words` growth units, rounded up to an even count.
  ///
  /// Returns the offset of the new span, whose header is not written yet.
  fn extend_heap(
    &mut self,
    mut words: usize,
  ) -> HeapResult<usize> {
    if words % 2 == 1 {
      words += 1;
    }
    let size = words * WSIZE;

    let span = self
      .provider
      .grow(size)
      .ok_or(HeapError::OutOfMemory { requested: size })?;

    let expected = self.base.as_ptr() as usize + self.end;
    let actual = span.as_ptr() as usize;
    if actual != expected {
      return Err(HeapError::NonContiguousGrowth { expected, actual });
    }

    let offset = self.end;
    self.end += size;
    debug!("heap grown by {} bytes, end = {:#x}", size, self.end);

    Ok(offset)
  }

  /// Marks the free region at `offset` allocated, splitting off the tail when
  /// it can stand on its own.
  fn place(
    &mut self,
    offset: usize,
    asize: usize,
  ) {
    let csize = self.read_header(offset).size();
    debug_assert!(csize >= asize);

    if csize - asize >= MIN_BLOCK_SIZE {
      self.write_header(offset, Header::new(asize, true));
      self.write_header(offset + asize, Header::new(csize - asize, false));
      trace!(
        "split region at {:#x}: {} allocated, {} free",
        offset,
        asize,
        csize - asize
      );
    } else {
      self.write_header(offset, Header::new(csize, true));
      trace!("placed {} bytes in whole region at {:#x} ({} bytes)", asize, offset, csize);
    }
  }

  /// First free region of at least `asize` bytes, in address order.
  fn find_fit(
    &self,
    asize: usize,
  ) -> Option<usize> {
    self
      .regions()
      .find(|region| !region.allocated && region.size >= asize)
      .map(|region| region.offset)
  }

  /// Merges the free region at `offset` with its successor if that one is free.
  ///
  /// Only one step forward: nothing looks behind, and a merged region does not
  /// keep absorbing further free neighbors.
  fn coalesce(
    &mut self,
    offset: usize,
  ) {
    let header = self.read_header(offset);
    let next = offset + header.size();

    if next >= self.end || header.is_allocated() {
      return;
    }

    let next_header = self.read_header(next);
    if next_header.is_allocated() {
      return;
    }

    let size = header.size() + next_header.size();
    self.write_header(offset, Header::new(size, false));
    trace!("merged regions at {:#x} and {:#x} into {} bytes", offset, next, size);
  }

  /// Payload offset for `ptr`, checked against the tracked set when enabled.
  fn validate(
    &self,
    ptr: NonNull<u8>,
  ) -> HeapResult<usize> {
    let Some(live) = &self.live else {
      return Ok(self.offset_of(ptr));
    };

    let address = ptr.as_ptr() as usize;
    if !self.contains(ptr) {
      warn!("rejected address {:#x} outside the heap", address);
      return Err(HeapError::InvalidAddress { address });
    }

    let payload = self.offset_of(ptr);
    if !live.contains(&payload) {
      warn!("rejected free of {:#x}: not a live allocation", address);
      return Err(HeapError::InvalidFree { address });
    }

    Ok(payload)
  }

  fn out_of_memory(
    &self,
    err: HeapError,
  ) -> HeapError {
    error!("allocation failed: {}", err);

    if self.config().oom_policy == OomPolicy::Exit {
      process::exit(1);
    }

    err
  }

  fn offset_of(
    &self,
    ptr: NonNull<u8>,
  ) -> usize {
    (ptr.as_ptr() as usize).wrapping_sub(self.base.as_ptr() as usize)
  }

  fn pointer(
    &self,
    offset: usize,
  ) -> NonNull<u8> {
    unsafe { self.base.add(offset) }
  }

  fn read_header(
    &self,
    offset: usize,
  ) -> Header {
    debug_assert!(offset + HEADER_SIZE <= self.end);
    unsafe { Header::from_word(self.base.as_ptr().add(offset).cast::<usize>().read()) }
  }

  fn write_header(
    &mut self,
    offset: usize,
    header: Header,
  ) {
    debug_assert!(offset + HEADER_SIZE <= self.end);
    unsafe {
      self
        .base
        .as_ptr()
        .add(offset)
        .cast::<usize>()
        .write(header.word())
    };
  }
}

/// Iterator over the region chain, see [`Heap::regions`].
pub struct Regions<'a, P: GrowthProvider> {
  heap: &'a Heap<P>,
  offset: usize,
}

impl<P: GrowthProvider> Iterator for Regions<'_, P> {
  type Item = RegionInfo;

  fn next(&mut self) -> Option<RegionInfo> {
    let end = self.heap.end;
    if self.offset >= end || end - self.offset < HEADER_SIZE {
      return None;
    }

    let header = self.heap.read_header(self.offset);
    let size = header.size();

    // A zero size would never advance; stop instead of spinning.
    if size == 0 {
      self.offset = end;
      return None;
    }

    let region = RegionInfo {
      offset: self.offset,
      size,
      allocated: header.is_allocated(),
    };
    self.offset += size;

    Some(region)
  }
}

impl<P: GrowthProvider> fmt::Display for Heap<P> {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    let stats = self.stats();
    writeln!(
      f,
      "heap {:?}..{:?}: {} bytes, {} regions ({} free)",
      self.start(),
      self.end(),
      stats.heap_size,
      stats.regions,
      stats.free_regions
    )?;

    for region in self.regions() {
      writeln!(
        f,
        "  {:#08x}  {:>8}  payload {:#08x} ({} bytes)  {}",
        region.offset,
        region.size,
        region.payload_offset(),
        region.payload_size(),
        if region.allocated { "allocated" } else { "free" }
      )?;
    }

    Ok(())
  }
}
