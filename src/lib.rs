//! # rheap - An Implicit Free List Allocator
//!
//! This crate provides a first-fit **implicit free list** allocator that manages
//! one contiguous, growable span of memory. The span is extended on demand
//! through a [`GrowthProvider`], such as `sbrk(2)` or a fixed-size [`Arena`],
//! and is never handed back.
//!
//! ## Overview
//!
//! There is no separate free list. Each region carries its own size in a one
//! word header, and walking the heap means hopping from header to header:
//!
//! ```text
//!   Heap Layout:
//!
//!   heap                                                          heap
//!   base   start                                                   end
//!   │      │                                                        │
//!   ▼      ▼                                                        ▼
//!   ┌──────┬────────┬─────────────┬────────┬──────────┬────────┬────┐
//!   │ pad  │ hdr 16 │  payload    │ hdr 32 │ payload  │ hdr 24 │ .. │
//!   │      │ alloc  │  (8 bytes)  │ free   │ (24 b.)  │ alloc  │    │
//!   └──────┴────────┴─────────────┴────────┴──────────┴────────┴────┘
//!                   ▲
//!                   └── Pointer returned to user
//!
//!   next region = this region + size
//! ```
//!
//! ## Crate Structure
//!
//! ```text
//!   rheap
//!   ├── align      - Alignment macros (align!, align_to!)
//!   ├── block      - Header encoding and request sizing (internal)
//!   ├── config     - HeapConfig, OomPolicy
//!   ├── error      - HeapError
//!   ├── heap       - Heap implementation
//!   └── provider   - GrowthProvider, Sbrk, Arena
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use rheap::{Arena, Heap};
//!
//! let mut heap = Heap::new(Arena::with_capacity(4096)).unwrap();
//!
//! let ptr = heap.allocate(8).unwrap().cast::<u64>();
//! unsafe {
//!     // Use the memory
//!     ptr.write(42);
//!     assert_eq!(ptr.read(), 42);
//!
//!     // Free the memory
//!     heap.free(ptr.cast()).unwrap();
//! }
//! ```
//!
//! ## How It Works
//!
//! Allocation rounds the request up to a region size, then scans the chain
//! for the first free region that is large enough:
//!
//! ```text
//!   allocate(n)
//!     │
//!     ├─ n ≤ 8 ?  asize = 16  :  asize = round_up(n, 8) + 8
//!     │
//!     ├─ first fit ──── found ──┐
//!     │                         │
//!     └─ miss: grow by asize ───┤
//!                               ▼
//!                            place
//!                  remainder ≥ 16 ? split : take whole region
//! ```
//!
//! Freeing clears the allocated bit and merges the region with the one right
//! after it when that one is free too. Headers carry no footer, so a region
//! cannot see the one before it and merging only goes forward:
//!
//! ```text
//!   before free(b):   │ a: free 16 │ b: alloc 16 │ c: free 16 │ d: alloc │
//!   after  free(b):   │ a: free 16 │ b: free 32               │ d: alloc │
//! ```
//!
//! Reallocation always moves: it allocates a new region, copies the payload
//! and frees the old one.
//!
//! ## Limitations
//!
//! - **Single-threaded only**: every mutating call takes `&mut self`
//! - **No shrinking**: memory is never returned to the environment
//! - **Forward-only merging**: free neighbors in front of a region stay separate
//! - **O(n) search**: the fit finder walks allocated regions too
//!
//! ## Safety
//!
//! `free` and `reallocate` trust the pointer they are given. Passing anything
//! other than a live allocation of the same heap is undefined behavior unless
//! [`HeapConfig::track_allocations`] is enabled, in which case bad pointers are
//! reported as [`HeapError`]s.

pub mod align;
mod block;
pub mod config;
pub mod error;
mod heap;
pub mod provider;

pub use block::{DSIZE, HEADER_SIZE, MIN_BLOCK_SIZE, WSIZE};
pub use config::{HeapConfig, OomPolicy};
pub use error::{HeapError, HeapResult};
pub use heap::{Heap, HeapStats, RegionInfo, Regions};
pub use provider::{Arena, GrowthProvider, Sbrk};
