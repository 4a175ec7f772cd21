use log::{trace, warn};

use crate::{
  AllocError, HeapSource, SearchMode, Violation, align,
  block::{Block, CHUNK_SIZE, MAX_HEAP_SIZE, MIN_BLOCK_SIZE, OVERHEAD},
  check,
  heap::Heap,
};

/// Construction-time settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
  pub search: SearchMode,
  /// Minimum number of bytes requested from the source on each growth.
  pub chunk_size: usize,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      search: SearchMode::default(),
      chunk_size: CHUNK_SIZE,
    }
  }
}

/// One entry of [`Allocator::blocks`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockInfo {
  pub block: Block,
  /// Total size, tags included.
  pub size: usize,
  pub allocated: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeapStats {
  /// Bytes currently obtained from the source.
  pub heap_size: usize,
  pub allocated_blocks: usize,
  pub free_blocks: usize,
  pub allocated_bytes: usize,
  pub free_bytes: usize,
  pub largest_free: usize,
}

/// Block size needed to hold `size` payload bytes, or `None` when no heap
/// could ever hold it.
fn adjusted_size(size: usize) -> Option<usize> {
  if size > MAX_HEAP_SIZE - OVERHEAD {
    return None;
  }
  Some((align!(size) + OVERHEAD).max(MIN_BLOCK_SIZE))
}

/// A boundary-tag allocator over a single growable range.
///
/// ```rust
/// use tagalloc::{Allocator, ArenaSource};
///
/// let mut allocator = Allocator::initialize(ArenaSource::default()).unwrap();
///
/// let block = allocator.allocate(5).unwrap();
/// allocator.payload_mut(block).unwrap()[..5].copy_from_slice(b"hello");
///
/// let block = allocator.resize(Some(block), 64).unwrap().unwrap();
/// assert_eq!(b"hello", &allocator.payload(block).unwrap()[..5]);
///
/// allocator.release(block).unwrap();
/// assert!(allocator.check().is_ok());
/// ```
pub struct Allocator<S: HeapSource> {
  heap: Heap<S>,
  search: SearchMode,
  chunk_size: usize,
}

impl<S: HeapSource> Allocator<S> {
  /// Builds the heap on `source` with the default [`Config`].
  pub fn initialize(source: S) -> Result<Self, AllocError> {
    Self::with_config(source, Config::default())
  }

  pub fn with_config(
    source: S,
    config: Config,
  ) -> Result<Self, AllocError> {
    let chunk_size = align!(config.chunk_size.clamp(MIN_BLOCK_SIZE, MAX_HEAP_SIZE));
    let heap = Heap::bootstrap(source, chunk_size)?;

    Ok(Self {
      heap,
      search: config.search,
      chunk_size,
    })
  }

  pub fn search_mode(&self) -> SearchMode {
    self.search
  }

  pub fn chunk_size(&self) -> usize {
    self.chunk_size
  }

  pub fn source(&self) -> &S {
    &self.heap.source
  }

  /// Hands out a block with room for at least `size` bytes, growing the
  /// heap when no free block fits.
  pub fn allocate(
    &mut self,
    size: usize,
  ) -> Result<Block, AllocError> {
    if size == 0 {
      return Err(AllocError::ZeroSize);
    }

    let oom = AllocError::OutOfMemory { requested: size };
    let asize = adjusted_size(size).ok_or(oom)?;

    if let Some(block) = self.search.find_fit(&mut self.heap, asize) {
      self.heap.place(block, asize);
      trace!("allocate({size}) -> {block:?}");
      return Ok(block);
    }

    let Some(block) = self.heap.grow(asize.max(self.chunk_size)) else {
      warn!("allocate({size}): heap exhausted");
      return Err(oom);
    };

    self.heap.place(block, asize);
    trace!("allocate({size}) -> {block:?} after growing the heap");
    Ok(block)
  }

  /// Returns `block` to the heap, merging it with free neighbours.
  ///
  /// Fails without touching the heap when `block` is not a live allocation.
  pub fn release(
    &mut self,
    block: Block,
  ) -> Result<(), AllocError> {
    let size = self.heap.allocated_size(block).inspect_err(|err| {
      warn!("release({block:?}) rejected: {err}");
    })?;

    self.heap.set(block, size, false);
    let merged = self.heap.coalesce(block);
    trace!("release({block:?}) -> free block {merged:?}");
    Ok(())
  }

  /// Changes the usable size of `block`, in place when its neighbourhood
  /// allows it, by relocation otherwise.
  ///
  /// * `None` behaves like [`allocate`](Self::allocate).
  /// * A `new_size` of zero releases the block and yields `None`.
  /// * Otherwise the first `min(old, new)` payload bytes survive. If a
  ///   relocation cannot get a new block, the old one stays allocated.
  pub fn resize(
    &mut self,
    block: Option<Block>,
    new_size: usize,
  ) -> Result<Option<Block>, AllocError> {
    let Some(block) = block else {
      return self.allocate(new_size).map(Some);
    };

    if new_size == 0 {
      self.release(block)?;
      return Ok(None);
    }

    let old_size = self.heap.allocated_size(block)?;
    let needed = adjusted_size(new_size).ok_or(AllocError::OutOfMemory {
      requested: new_size,
    })?;

    if needed == old_size {
      return Ok(Some(block));
    }

    let next = block.next(old_size);
    let next_tag = self.heap.header(next);

    if next_tag.is_allocated() {
      if needed < old_size {
        if old_size - needed >= MIN_BLOCK_SIZE {
          self.heap.set(block, needed, true);
          self.heap.set(block.next(needed), old_size - needed, false);
          trace!("resize({block:?}, {new_size}): shrunk {old_size} -> {needed}");
        }
        return Ok(Some(block));
      }
    } else if old_size > needed || old_size + next_tag.size() - MIN_BLOCK_SIZE >= needed {
      let rest = block.next(needed);
      let rest_size = old_size + next_tag.size() - needed;

      self.heap.set(block, needed, true);
      self.heap.set(rest, rest_size, false);
      self.heap.cursor = rest;
      trace!("resize({block:?}, {new_size}): {old_size} -> {needed} using free {next:?}");
      return Ok(Some(block));
    }

    self.relocate(block, old_size, new_size).map(Some)
  }

  fn relocate(
    &mut self,
    block: Block,
    old_size: usize,
    new_size: usize,
  ) -> Result<Block, AllocError> {
    let fresh = self.allocate(new_size)?;
    let len = (old_size - OVERHEAD).min(new_size);
    let src = block.offset();

    self
      .heap
      .source
      .memory_mut()
      .copy_within(src..src + len, fresh.offset());
    self.release(block)?;

    trace!("resize({block:?}, {new_size}): moved {len} bytes to {fresh:?}");
    Ok(fresh)
  }

  /// Usable bytes of a live allocation.
  pub fn usable_size(
    &self,
    block: Block,
  ) -> Result<usize, AllocError> {
    Ok(self.heap.allocated_size(block)? - OVERHEAD)
  }

  pub fn payload(
    &self,
    block: Block,
  ) -> Result<&[u8], AllocError> {
    let len = self.usable_size(block)?;
    let start = block.offset();
    Ok(&self.heap.memory()[start..start + len])
  }

  pub fn payload_mut(
    &mut self,
    block: Block,
  ) -> Result<&mut [u8], AllocError> {
    let len = self.usable_size(block)?;
    let start = block.offset();
    Ok(&mut self.heap.source.memory_mut()[start..start + len])
  }

  /// Every block from the first one past the prologue up to the epilogue.
  pub fn blocks(&self) -> impl Iterator<Item = BlockInfo> + '_ {
    self.heap.blocks().map(|(block, tag)| BlockInfo {
      block,
      size: tag.size(),
      allocated: tag.is_allocated(),
    })
  }

  pub fn stats(&self) -> HeapStats {
    let mut stats = HeapStats {
      heap_size: self.heap.bounds().len(),
      ..HeapStats::default()
    };

    for info in self.blocks() {
      if info.allocated {
        stats.allocated_blocks += 1;
        stats.allocated_bytes += info.size;
      } else {
        stats.free_blocks += 1;
        stats.free_bytes += info.size;
        stats.largest_free = stats.largest_free.max(info.size);
      }
    }

    stats
  }

  /// Validates the whole block chain.
  pub fn check(&self) -> Result<(), Violation> {
    check::check(&self.heap)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::ArenaSource;

  fn allocator() -> Allocator<ArenaSource> {
    Allocator::initialize(ArenaSource::default()).unwrap()
  }

  fn layout(allocator: &Allocator<ArenaSource>) -> Vec<(usize, bool)> {
    allocator
      .blocks()
      .map(|info| (info.size, info.allocated))
      .collect()
  }

  #[test]
  fn test_adjusted_size() {
    assert_eq!(Some(16), adjusted_size(1));
    assert_eq!(Some(16), adjusted_size(8));
    assert_eq!(Some(24), adjusted_size(9));
    assert_eq!(Some(24), adjusted_size(16));
    assert_eq!(None, adjusted_size(usize::MAX));
  }

  #[test]
  fn test_allocate_splits_first_block() {
    let mut allocator = allocator();

    let block = allocator.allocate(16).unwrap();

    assert_eq!(16, block.offset());
    assert_eq!(vec![(24, true), (CHUNK_SIZE - 24, false)], layout(&allocator));
    assert_eq!(16, allocator.usable_size(block).unwrap());
  }

  #[test]
  fn test_allocate_rejects_zero() {
    let mut allocator = allocator();

    assert_eq!(Err(AllocError::ZeroSize), allocator.allocate(0));
    assert_eq!(
      Err(AllocError::OutOfMemory {
        requested: usize::MAX
      }),
      allocator.allocate(usize::MAX)
    );
  }

  #[test]
  fn test_allocate_grows_heap() {
    let mut allocator = allocator();

    let block = allocator.allocate(2 * CHUNK_SIZE).unwrap();

    assert_eq!(16, block.offset());
    assert_eq!(16 + 3 * CHUNK_SIZE + 8, allocator.stats().heap_size);
    assert!(allocator.check().is_ok());
  }

  #[test]
  fn test_release_rejects_double_release() {
    let mut allocator = allocator();
    let a = allocator.allocate(16).unwrap();
    let _b = allocator.allocate(16).unwrap();

    allocator.release(a).unwrap();

    assert_eq!(
      Err(AllocError::DoubleRelease { offset: 16 }),
      allocator.release(a)
    );
    assert!(allocator.check().is_ok());
  }

  #[test]
  fn test_release_rejects_foreign_offsets() {
    let mut allocator = allocator();
    let block = allocator.allocate(32).unwrap();

    assert_eq!(
      Err(AllocError::InvalidPointer { offset: 20 }),
      allocator.release(Block::at(block.offset() + 4))
    );
    assert_eq!(
      Err(AllocError::InvalidPointer { offset: 0 }),
      allocator.release(Block::at(0))
    );
    assert!(allocator.check().is_ok());
  }

  #[test]
  fn test_resize_shrinks_in_place_before_allocated_neighbour() {
    let mut allocator = allocator();
    let a = allocator.allocate(64).unwrap();
    let _b = allocator.allocate(16).unwrap();

    // Too small a reduction to split off a block: nothing changes.
    assert_eq!(Some(a), allocator.resize(Some(a), 56).unwrap());
    assert_eq!(72, allocator.heap.size(a));

    assert_eq!(Some(a), allocator.resize(Some(a), 16).unwrap());
    assert_eq!(
      vec![(24, true), (48, false), (24, true), (CHUNK_SIZE - 96, false)],
      layout(&allocator)
    );
    assert!(allocator.check().is_ok());
  }

  #[test]
  fn test_resize_grows_into_free_neighbour() {
    let mut allocator = allocator();
    let a = allocator.allocate(16).unwrap();

    assert_eq!(Some(a), allocator.resize(Some(a), 100).unwrap());
    assert_eq!(vec![(112, true), (CHUNK_SIZE - 112, false)], layout(&allocator));
    assert_eq!(a.next(112), allocator.heap.cursor);
    assert!(allocator.check().is_ok());
  }

  #[test]
  fn test_resize_into_free_neighbour_needs_remainder_slack() {
    let mut allocator = allocator();
    let x = allocator.allocate(16).unwrap();
    let y = allocator.allocate(16).unwrap();
    let _z = allocator.allocate(16).unwrap();
    allocator.release(y).unwrap();

    // 24 + 24 - 16 covers exactly the 32 bytes needed.
    assert_eq!(Some(x), allocator.resize(Some(x), 24).unwrap());
    assert_eq!(
      vec![(32, true), (16, false), (24, true), (CHUNK_SIZE - 72, false)],
      layout(&allocator)
    );
    assert!(allocator.check().is_ok());

    // 32 + 16 - 16 falls 8 bytes short of 40.
    let moved = allocator.resize(Some(x), 32).unwrap().unwrap();
    assert_ne!(x, moved);
    assert_eq!(40, allocator.heap.size(moved));
    assert!(allocator.check().is_ok());
  }

  #[test]
  fn test_resize_edge_cases() {
    let mut allocator = allocator();

    let block = allocator.resize(None, 8).unwrap().unwrap();
    assert_eq!(8, allocator.usable_size(block).unwrap());

    assert_eq!(Some(block), allocator.resize(Some(block), 8).unwrap());
    assert_eq!(None, allocator.resize(Some(block), 0).unwrap());
    assert_eq!(vec![(CHUNK_SIZE, false)], layout(&allocator));
    assert_eq!(Err(AllocError::ZeroSize), allocator.resize(None, 0));
  }

  #[test]
  fn test_stats() {
    let mut allocator = allocator();
    allocator.allocate(16).unwrap();
    allocator.allocate(100).unwrap();

    let stats = allocator.stats();

    assert_eq!(2, stats.allocated_blocks);
    assert_eq!(24 + 112, stats.allocated_bytes);
    assert_eq!(1, stats.free_blocks);
    assert_eq!(CHUNK_SIZE - 136, stats.free_bytes);
    assert_eq!(stats.free_bytes, stats.largest_free);
    assert_eq!(16 + CHUNK_SIZE, stats.heap_size);
  }
}
