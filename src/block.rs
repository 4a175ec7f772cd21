//! Boundary-tag block layout.
//!
//! ```text
//!        header                  payload                  footer
//!   ┌──────────────┬──────────────────────────────────┬──────────────┐
//!   │ size | alloc │                ...               │ size | alloc │
//!   └──────────────┴──────────────────────────────────┴──────────────┘
//!   ▲              ▲                                                 ▲
//!   offset - 4     Block offset                        offset + size - 4
//! ```
//!
//! A block's size covers both tags and the payload. Sizes are multiples of
//! [`ALIGNMENT`], which leaves the low bits of a tag free for the
//! allocation flag.

use std::fmt;

/// Size of a single boundary tag.
pub const WORD_SIZE: usize = 4;

/// Every block size and every payload offset is a multiple of this.
pub const ALIGNMENT: usize = 2 * WORD_SIZE;

/// Bytes taken by the header and footer of one block.
pub const OVERHEAD: usize = 2 * WORD_SIZE;

/// Smallest block that can exist: both tags plus one alignment unit of
/// payload. Splits leaving a smaller remainder are suppressed.
pub const MIN_BLOCK_SIZE: usize = 2 * ALIGNMENT;

/// Default number of bytes requested from the source when the heap grows.
pub const CHUNK_SIZE: usize = 1 << 12;

/// Tags are 32 bits wide, so the managed range can never exceed this.
pub const MAX_HEAP_SIZE: usize = (u32::MAX as usize) & !(ALIGNMENT - 1);

const ALLOCATED: u32 = 0x1;

/// A packed `size | allocated` word, stored as header and footer.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Tag(u32);

impl Tag {
  /// The zero-sized allocated tag terminating forward traversal.
  pub const EPILOGUE: Tag = Tag(ALLOCATED);

  pub fn pack(
    size: usize,
    allocated: bool,
  ) -> Self {
    debug_assert!(size % ALIGNMENT == 0, "unaligned block size {size}");
    debug_assert!(size <= MAX_HEAP_SIZE, "block size {size} overflows a tag");
    Self(size as u32 | allocated as u32)
  }

  pub fn unpack(self) -> (usize, bool) {
    (self.size(), self.is_allocated())
  }

  pub fn size(self) -> usize {
    (self.0 & !ALLOCATED) as usize
  }

  pub fn is_allocated(self) -> bool {
    self.0 & ALLOCATED != 0
  }
}

impl fmt::Debug for Tag {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    let state = if self.is_allocated() { "alloc" } else { "free" };
    write!(f, "Tag({}, {})", self.size(), state)
  }
}

/// Handle to a block, expressed as the offset of its payload inside the
/// managed range.
///
/// This is what [`Allocator::allocate`](crate::Allocator::allocate) hands out
/// in place of a raw pointer.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Block(usize);

impl Block {
  pub(crate) const fn at(offset: usize) -> Self {
    Self(offset)
  }

  /// Offset of the first payload byte from the low end of the heap.
  pub const fn offset(self) -> usize {
    self.0
  }

  pub(crate) fn header(self) -> usize {
    self.0 - WORD_SIZE
  }

  pub(crate) fn footer(
    self,
    size: usize,
  ) -> usize {
    self.0 + size - OVERHEAD
  }

  /// Footer of the block physically preceding this one.
  pub(crate) fn prev_footer(self) -> usize {
    self.0 - OVERHEAD
  }

  pub(crate) fn next(
    self,
    size: usize,
  ) -> Block {
    Block(self.0 + size)
  }

  pub(crate) fn prev(
    self,
    prev_size: usize,
  ) -> Block {
    Block(self.0 - prev_size)
  }
}

impl fmt::Debug for Block {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    write!(f, "Block(@{:#x})", self.0)
  }
}

pub(crate) fn read_tag(
  mem: &[u8],
  at: usize,
) -> Tag {
  let mut word = [0u8; WORD_SIZE];
  word.copy_from_slice(&mem[at..at + WORD_SIZE]);
  Tag(u32::from_ne_bytes(word))
}

/// Bounds-checked read, for walks over a heap that may be corrupted.
pub(crate) fn try_read_tag(
  mem: &[u8],
  at: usize,
) -> Option<Tag> {
  let bytes = mem.get(at..at.checked_add(WORD_SIZE)?)?;
  let mut word = [0u8; WORD_SIZE];
  word.copy_from_slice(bytes);
  Some(Tag(u32::from_ne_bytes(word)))
}

pub(crate) fn write_tag(
  mem: &mut [u8],
  at: usize,
  tag: Tag,
) {
  mem[at..at + WORD_SIZE].copy_from_slice(&tag.0.to_ne_bytes());
}
