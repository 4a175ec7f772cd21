//! # tagalloc - A Boundary-Tag Memory Allocator
//!
//! This crate provides an **implicit free list** allocator that manages a
//! single contiguous, growable range of memory. Blocks carry their size and
//! allocation state in a header *and* a footer (boundary tags), so a block's
//! neighbours on both sides can be inspected in constant time.
//!
//! ## Overview
//!
//! ```text
//!   Heap Layout:
//!
//!   ┌──────────┬────────────┬──────────────────┬────────────┬──────────┐
//!   │ prologue │ block (A)  │   block (free)   │ block (A)  │ epilogue │
//!   │   8|a    │  24|a      │      64|f        │  32|a      │   0|a    │
//!   └──────────┴────────────┴──────────────────┴────────────┴──────────┘
//!                                                                      ▲
//!                                                             top of the range
//!
//!   Single Block:
//!   ┌────────────┬──────────────────────────────────┬────────────┐
//!   │  header    │            payload               │  footer    │
//!   │ size|alloc │                                  │ size|alloc │
//!   └────────────┴──────────────────────────────────┴────────────┘
//!                ▲
//!                └── Block handle returned to the caller
//! ```
//!
//! - **Allocation** searches for a free block (next-fit by default), splits
//!   it when the remainder can stand alone, and grows the heap when nothing
//!   fits.
//! - **Release** clears the allocation bit and merges the block with free
//!   neighbours, so two free blocks are never adjacent.
//! - **Resize** shrinks or grows a block in place when its neighbour allows
//!   it, and relocates otherwise.
//!
//! ## Crate Structure
//!
//! ```text
//!   tagalloc
//!   ├── align      - Alignment macro (align!)
//!   ├── block      - Tags, block handles and layout constants
//!   ├── source     - HeapSource trait, ArenaSource, SbrkSource
//!   ├── heap       - Bootstrap, growth, placement, coalescing (internal)
//!   ├── search     - Next-fit, first-fit and best-fit search
//!   ├── allocator  - Allocator: allocate, release, resize
//!   ├── check      - Heap consistency checker
//!   └── error      - AllocError
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use tagalloc::{Allocator, ArenaSource};
//!
//! let mut allocator = Allocator::initialize(ArenaSource::default()).unwrap();
//!
//! let block = allocator.allocate(16).unwrap();
//! allocator.payload_mut(block).unwrap().fill(0x2A);
//!
//! allocator.release(block).unwrap();
//! assert!(allocator.check().is_ok());
//! ```
//!
//! ## Memory Sources
//!
//! The allocator only ever asks its [`HeapSource`] to move the top of the
//! range upwards:
//!
//! - [`ArenaSource`] is an owned buffer with a hard ceiling. Deterministic,
//!   and the natural choice for tests.
//! - [`SbrkSource`] extends the real program break with `sbrk(2)`.
//!
//! ## Limitations
//!
//! - **Single-threaded only**: no synchronization primitives
//! - **No shrinking**: memory is never handed back to the source
//! - **32-bit tags**: a heap is limited to just under 4 GiB

pub mod align;
mod allocator;
mod block;
mod check;
mod error;
mod heap;
mod search;
mod source;

pub use allocator::{Allocator, BlockInfo, Config, HeapStats};
pub use block::{ALIGNMENT, Block, CHUNK_SIZE, MAX_HEAP_SIZE, MIN_BLOCK_SIZE, OVERHEAD, WORD_SIZE};
pub use check::Violation;
pub use error::AllocError;
pub use search::SearchMode;
pub use source::{ArenaSource, DEFAULT_ARENA_LIMIT, HeapSource, SbrkSource};
