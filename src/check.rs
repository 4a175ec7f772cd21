//! Heap consistency checker.
//!
//! Walks every block between the prologue and the epilogue. Meant to run
//! between operations while testing, never on the allocation path.

use thiserror::Error;

use crate::{
  HeapSource,
  block::{ALIGNMENT, MIN_BLOCK_SIZE, OVERHEAD, Tag, try_read_tag},
  heap::Heap,
};

/// The first inconsistency found in the block chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Violation {
  #[error("prologue at {offset:#x} is damaged")]
  BadPrologue { offset: usize },

  #[error("block at {offset:#x} lies outside the mapped heap")]
  OutOfBounds { offset: usize },

  #[error("block at {offset:#x} has size {size}, not a multiple of the alignment unit")]
  Misaligned { offset: usize, size: usize },

  #[error("block at {offset:#x} has size {size}, below the minimum block")]
  Undersized { offset: usize, size: usize },

  #[error("header and footer of block at {offset:#x} disagree")]
  TagMismatch { offset: usize },

  #[error("free block at {offset:#x} follows another free block")]
  AdjacentFree { offset: usize },

  #[error("epilogue at {offset:#x} is not at the top of the heap")]
  BadEpilogue { offset: usize },

  #[error("search cursor at {offset:#x} is not a block boundary")]
  CursorAdrift { offset: usize },
}

pub(crate) fn check<S: HeapSource>(heap: &Heap<S>) -> Result<(), Violation> {
  let mem = heap.memory();
  let bounds = heap.bounds();

  let prologue = heap.prologue;
  let expected = Some(Tag::pack(OVERHEAD, true));
  if try_read_tag(mem, prologue.header()) != expected
    || try_read_tag(mem, prologue.footer(OVERHEAD)) != expected
  {
    return Err(Violation::BadPrologue {
      offset: prologue.offset(),
    });
  }

  let mut block = heap.first;
  let mut prev_free = false;
  let mut cursor_seen = false;

  loop {
    let offset = block.offset();
    if offset < bounds.start || offset > bounds.end {
      return Err(Violation::OutOfBounds { offset });
    }

    let header = try_read_tag(mem, block.header()).ok_or(Violation::OutOfBounds { offset })?;
    let (size, allocated) = header.unpack();

    if size == 0 {
      if !allocated || offset != bounds.end {
        return Err(Violation::BadEpilogue { offset });
      }
      break;
    }
    if size % ALIGNMENT != 0 {
      return Err(Violation::Misaligned { offset, size });
    }
    if size < MIN_BLOCK_SIZE {
      return Err(Violation::Undersized { offset, size });
    }
    if size > bounds.end - offset {
      return Err(Violation::OutOfBounds { offset });
    }
    if try_read_tag(mem, block.footer(size)) != Some(header) {
      return Err(Violation::TagMismatch { offset });
    }
    if !allocated && prev_free {
      return Err(Violation::AdjacentFree { offset });
    }

    prev_free = !allocated;
    cursor_seen |= block == heap.cursor;
    block = block.next(size);
  }

  if !cursor_seen {
    return Err(Violation::CursorAdrift {
      offset: heap.cursor.offset(),
    });
  }

  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    ArenaSource, CHUNK_SIZE,
    block::{Block, write_tag},
  };

  fn heap() -> Heap<ArenaSource> {
    let mut heap = Heap::bootstrap(ArenaSource::default(), CHUNK_SIZE).unwrap();
    let first = heap.first;
    heap.place(first, 32);
    heap
  }

  #[test]
  fn test_healthy_heap() {
    assert_eq!(Ok(()), check(&heap()));
  }

  #[test]
  fn test_adjacent_free_blocks() {
    let mut heap = heap();
    heap.set(heap.first, 32, false);

    assert_eq!(Err(Violation::AdjacentFree { offset: 48 }), check(&heap));
  }

  #[test]
  fn test_tag_mismatch() {
    let mut heap = heap();
    let footer = heap.first.footer(32);
    write_tag(heap.source.memory_mut(), footer, Tag::pack(32, false));

    assert_eq!(Err(Violation::TagMismatch { offset: 16 }), check(&heap));
  }

  #[test]
  fn test_misaligned_size() {
    let mut heap = heap();
    let header = heap.first.header();
    heap.source.memory_mut()[header..header + 4].copy_from_slice(&(36u32 | 1).to_ne_bytes());

    assert_eq!(
      Err(Violation::Misaligned {
        offset: 16,
        size: 36
      }),
      check(&heap)
    );
  }

  #[test]
  fn test_block_past_the_top() {
    let mut heap = heap();
    let header = heap.first.header();
    write_tag(heap.source.memory_mut(), header, Tag::pack(1 << 20, true));

    assert_eq!(Err(Violation::OutOfBounds { offset: 16 }), check(&heap));
  }

  #[test]
  fn test_damaged_sentinels() {
    let mut heap = heap();
    let prologue = heap.prologue.header();
    write_tag(heap.source.memory_mut(), prologue, Tag::pack(OVERHEAD, false));
    assert_eq!(Err(Violation::BadPrologue { offset: 8 }), check(&heap));

    let mut heap = self::heap();
    let top = heap.bounds().end;
    write_tag(heap.source.memory_mut(), top - 4, Tag::pack(0, false));
    assert_eq!(Err(Violation::BadEpilogue { offset: top }), check(&heap));
  }

  #[test]
  fn test_cursor_inside_a_block() {
    let mut heap = heap();
    heap.cursor = Block::at(24);

    assert_eq!(Err(Violation::CursorAdrift { offset: 24 }), check(&heap));
  }
}
