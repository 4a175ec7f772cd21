//! Free-block search strategies.
//!
//! All three walk the same implicit list: from a starting block, follow each
//! header's size until the zero-sized epilogue.

use crate::{HeapSource, block::Block, heap::Heap};

/// How [`Allocator::allocate`](crate::Allocator::allocate) picks a free
/// block. Chosen once, when the allocator is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SearchMode {
  /// Resume from the block last allocated or freed. On a miss the cursor
  /// goes back to the start of the heap and the heap is grown; there is no
  /// second pass.
  #[default]
  NextFit,
  /// Take the lowest-addressed block that fits.
  FirstFit,
  /// Take the smallest block that fits, stopping early on an exact match.
  BestFit,
}

impl SearchMode {
  /// Finds a free block of at least `asize` bytes, tags included.
  pub(crate) fn find_fit<S: HeapSource>(
    self,
    heap: &mut Heap<S>,
    asize: usize,
  ) -> Option<Block> {
    match self {
      SearchMode::NextFit => next_fit(heap, asize),
      SearchMode::FirstFit => first_fit(heap, asize),
      SearchMode::BestFit => best_fit(heap, asize),
    }
  }
}

fn first_fit<S: HeapSource>(
  heap: &Heap<S>,
  asize: usize,
) -> Option<Block> {
  heap
    .blocks()
    .find(|(_, tag)| !tag.is_allocated() && tag.size() >= asize)
    .map(|(block, _)| block)
}

fn best_fit<S: HeapSource>(
  heap: &Heap<S>,
  asize: usize,
) -> Option<Block> {
  let mut best: Option<(Block, usize)> = None;

  for (block, tag) in heap.blocks() {
    let size = tag.size();

    if tag.is_allocated() || size < asize {
      continue;
    }
    if size == asize {
      return Some(block);
    }
    if best.is_none_or(|(_, best_size)| size < best_size) {
      best = Some((block, size));
    }
  }

  best.map(|(block, _)| block)
}

fn next_fit<S: HeapSource>(
  heap: &mut Heap<S>,
  asize: usize,
) -> Option<Block> {
  let found = heap
    .blocks_from(heap.cursor)
    .find(|(_, tag)| !tag.is_allocated() && tag.size() >= asize)
    .map(|(block, _)| block);

  heap.cursor = found.unwrap_or(heap.first);
  found
}
