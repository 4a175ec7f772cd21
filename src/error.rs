use thiserror::Error;

/// Failures reported by [`Allocator`](crate::Allocator) operations.
///
/// None of these leave the heap in a modified state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AllocError {
  #[error("allocation size must be positive")]
  ZeroSize,

  #[error("heap cannot grow to satisfy a {requested} byte request")]
  OutOfMemory { requested: usize },

  #[error("offset {offset:#x} does not name an allocated block")]
  InvalidPointer { offset: usize },

  #[error("block at offset {offset:#x} is already free")]
  DoubleRelease { offset: usize },
}
