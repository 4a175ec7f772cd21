//! The block-management engine: bootstrap, growth, placement and
//! coalescing over a [`HeapSource`].
//!
//! ```text
//!   lo                                                                   hi
//!   ┌─────┬──────┬──────┬─────────────┬─────────────┬─────┬─────────────┬──────┐
//!   │ pad │ 8|a  │ 8|a  │  block ...  │  block ...  │ ... │  block ...  │ 0|a  │
//!   └─────┴──────┴──────┴─────────────┴─────────────┴─────┴─────────────┴──────┘
//!          prologue      ▲                                                epilogue
//!                        └── first real block
//! ```

use std::ops::Range;

use log::{debug, trace};

use crate::{
  AllocError, HeapSource, align,
  block::{
    ALIGNMENT, Block, MAX_HEAP_SIZE, MIN_BLOCK_SIZE, OVERHEAD, Tag, WORD_SIZE, read_tag,
    try_read_tag, write_tag,
  },
};

/// Bytes requested at bootstrap: padding, prologue header and footer,
/// epilogue header.
const BOOTSTRAP_SIZE: usize = 4 * WORD_SIZE;

pub(crate) struct Heap<S> {
  pub(crate) source: S,
  pub(crate) prologue: Block,
  /// First block past the prologue; every walk starts here.
  pub(crate) first: Block,
  /// Where the next next-fit search resumes.
  pub(crate) cursor: Block,
}

impl<S: HeapSource> Heap<S> {
  /// Lays down the sentinels and seeds the heap with `chunk_size` free
  /// bytes.
  pub(crate) fn bootstrap(
    mut source: S,
    chunk_size: usize,
  ) -> Result<Self, AllocError> {
    let lo = source.extend(BOOTSTRAP_SIZE).ok_or(AllocError::OutOfMemory {
      requested: BOOTSTRAP_SIZE,
    })?;

    let prologue = Block::at(lo + ALIGNMENT);
    let first = Block::at(lo + 2 * ALIGNMENT);

    let mem = source.memory_mut();
    write_tag(mem, lo, Tag::pack(0, false));
    write_tag(mem, prologue.header(), Tag::pack(OVERHEAD, true));
    write_tag(mem, prologue.footer(OVERHEAD), Tag::pack(OVERHEAD, true));
    write_tag(mem, first.header(), Tag::EPILOGUE);

    let mut heap = Self {
      source,
      prologue,
      first,
      cursor: first,
    };

    heap
      .grow(chunk_size)
      .ok_or(AllocError::OutOfMemory { requested: chunk_size })?;

    debug!("heap bootstrapped at {lo:#x} with {chunk_size} bytes");
    Ok(heap)
  }

  pub(crate) fn memory(&self) -> &[u8] {
    self.source.memory()
  }

  pub(crate) fn bounds(&self) -> Range<usize> {
    self.source.bounds()
  }

  pub(crate) fn header(
    &self,
    block: Block,
  ) -> Tag {
    read_tag(self.memory(), block.header())
  }

  pub(crate) fn size(
    &self,
    block: Block,
  ) -> usize {
    self.header(block).size()
  }

  pub(crate) fn next(
    &self,
    block: Block,
  ) -> Block {
    block.next(self.size(block))
  }

  pub(crate) fn prev(
    &self,
    block: Block,
  ) -> Block {
    block.prev(read_tag(self.memory(), block.prev_footer()).size())
  }

  /// Writes matching header and footer tags.
  pub(crate) fn set(
    &mut self,
    block: Block,
    size: usize,
    allocated: bool,
  ) {
    let tag = Tag::pack(size, allocated);
    let mem = self.source.memory_mut();
    write_tag(mem, block.header(), tag);
    write_tag(mem, block.footer(size), tag);
  }

  /// Extends the heap by at least `bytes` and returns the resulting free
  /// block, already merged with a free block that ended at the old top.
  pub(crate) fn grow(
    &mut self,
    bytes: usize,
  ) -> Option<Block> {
    if bytes > MAX_HEAP_SIZE - self.bounds().end {
      debug!("refusing to grow past the tag limit by {bytes} bytes");
      return None;
    }

    let size = align!(bytes);
    // The new block's header overwrites the old epilogue.
    let block = Block::at(self.source.extend(size)?);

    self.set(block, size, false);
    let epilogue = block.next(size);
    write_tag(self.source.memory_mut(), epilogue.header(), Tag::EPILOGUE);

    debug!("heap grew by {size} bytes, top is now {:#x}", epilogue.offset());
    Some(self.coalesce(block))
  }

  /// Carves `asize` bytes out of the free `block`, splitting off the rest
  /// when it can stand as a block of its own.
  pub(crate) fn place(
    &mut self,
    block: Block,
    asize: usize,
  ) {
    let csize = self.size(block);
    debug_assert!(csize >= asize);

    if csize - asize >= MIN_BLOCK_SIZE {
      self.set(block, asize, true);
      self.set(block.next(asize), csize - asize, false);
      trace!("place {block:?}: split {csize} into {asize} + {}", csize - asize);
    } else {
      self.set(block, csize, true);
      trace!("place {block:?}: consumed whole {csize} byte block for {asize}");
    }
  }

  /// Merges the free `block` with free physical neighbours and points the
  /// cursor at the result.
  pub(crate) fn coalesce(
    &mut self,
    block: Block,
  ) -> Block {
    let mem = self.memory();
    let prev_alloc = read_tag(mem, block.prev_footer()).is_allocated();
    let next = self.next(block);
    let next_alloc = self.header(next).is_allocated();
    let mut size = self.size(block);

    let merged = match (prev_alloc, next_alloc) {
      (true, true) => block,
      (true, false) => {
        size += self.size(next);
        self.set(block, size, false);
        trace!("coalesce {block:?} with next {next:?}");
        block
      }
      (false, true) => {
        let prev = self.prev(block);
        size += self.size(prev);
        self.set(prev, size, false);
        trace!("coalesce {block:?} with previous {prev:?}");
        prev
      }
      (false, false) => {
        let prev = self.prev(block);
        size += self.size(prev) + self.size(next);
        self.set(prev, size, false);
        trace!("coalesce {block:?} with {prev:?} and {next:?}");
        prev
      }
    };

    self.cursor = merged;
    merged
  }

  /// Size of `block` if it is a live allocation. Nothing is trusted
  /// before it has been checked against the mapped range.
  pub(crate) fn allocated_size(
    &self,
    block: Block,
  ) -> Result<usize, AllocError> {
    let offset = block.offset();
    let invalid = AllocError::InvalidPointer { offset };
    let end = self.bounds().end;

    if offset % ALIGNMENT != 0 || offset < self.first.offset() || offset >= end {
      return Err(invalid);
    }

    let mem = self.memory();
    let header = try_read_tag(mem, block.header()).ok_or(invalid)?;
    let size = header.size();

    if size < MIN_BLOCK_SIZE || size % ALIGNMENT != 0 || size > end - offset {
      return Err(invalid);
    }
    if !header.is_allocated() {
      return Err(AllocError::DoubleRelease { offset });
    }
    if try_read_tag(mem, block.footer(size)) != Some(header) {
      return Err(invalid);
    }

    Ok(size)
  }

  pub(crate) fn blocks(&self) -> Blocks<'_> {
    self.blocks_from(self.first)
  }

  pub(crate) fn blocks_from(
    &self,
    start: Block,
  ) -> Blocks<'_> {
    Blocks {
      mem: self.memory(),
      current: start,
    }
  }
}

/// Forward walk over `(block, header)` pairs, stopping at the epilogue.
pub(crate) struct Blocks<'a> {
  mem: &'a [u8],
  current: Block,
}

impl Iterator for Blocks<'_> {
  type Item = (Block, Tag);

  fn next(&mut self) -> Option<Self::Item> {
    let block = self.current;
    let tag = try_read_tag(self.mem, block.header())?;

    if tag.size() == 0 {
      return None;
    }

    self.current = block.next(tag.size());
    Some((block, tag))
  }
}
