//! Providers of the contiguous, growable range the heap lives in.
//!
//! The allocator never talks to the operating system directly. It asks a
//! [`HeapSource`] to push the upper bound of its range further, the way
//! `sbrk(2)` pushes the program break:
//!
//! ```text
//!   low                                   high (before)     high (after)
//!   ┌──────────────────────────────────────┬────────────────┐
//!   │          already mapped              │  extend(n)     │
//!   └──────────────────────────────────────┴────────────────┘
//!                                          ▲
//!                                          └── returned offset
//! ```

use std::{ops::Range, ptr, slice};

use libc::{c_void, intptr_t, sbrk};
use log::{debug, warn};

use crate::ALIGNMENT;

/// The memory-range primitive consumed by the allocator.
///
/// Every region handed out by [`extend`](HeapSource::extend) must start
/// exactly where the previously mapped range ended.
pub trait HeapSource {
  /// Grows the range by `bytes` and returns the offset of the first new
  /// byte, or `None` when the range cannot grow.
  fn extend(
    &mut self,
    bytes: usize,
  ) -> Option<usize>;

  /// Currently mapped range, as offsets. `memory().len()` equals `end`.
  fn bounds(&self) -> Range<usize>;

  fn memory(&self) -> &[u8];

  fn memory_mut(&mut self) -> &mut [u8];
}

/// Ceiling used by [`ArenaSource::default`]: 20 MiB.
pub const DEFAULT_ARENA_LIMIT: usize = 20 * (1 << 20);

/// An owned byte buffer that grows on demand up to a fixed ceiling.
#[derive(Debug, Clone)]
pub struct ArenaSource {
  bytes: Vec<u8>,
  limit: usize,
}

impl ArenaSource {
  pub fn new(limit: usize) -> Self {
    Self {
      bytes: Vec::new(),
      limit,
    }
  }

  pub fn limit(&self) -> usize {
    self.limit
  }
}

impl Default for ArenaSource {
  fn default() -> Self {
    Self::new(DEFAULT_ARENA_LIMIT)
  }
}

impl HeapSource for ArenaSource {
  fn extend(
    &mut self,
    bytes: usize,
  ) -> Option<usize> {
    let old_len = self.bytes.len();
    let new_len = old_len.checked_add(bytes)?;

    if new_len > self.limit {
      debug!(
        "arena exhausted: {old_len} + {bytes} bytes exceeds the {} byte limit",
        self.limit
      );
      return None;
    }

    self.bytes.resize(new_len, 0);
    Some(old_len)
  }

  fn bounds(&self) -> Range<usize> {
    0..self.bytes.len()
  }

  fn memory(&self) -> &[u8] {
    &self.bytes
  }

  fn memory_mut(&mut self) -> &mut [u8] {
    &mut self.bytes
  }
}

/// The process's real data segment, extended with `sbrk(2)`.
///
/// Only one `SbrkSource` should be live per process. If anything else moves
/// the program break between two extensions the range would stop being
/// contiguous, so such an extension is refused.
pub struct SbrkSource {
  base: *mut u8,
  len: usize,
}

impl SbrkSource {
  pub fn new() -> Self {
    Self {
      base: ptr::null_mut(),
      len: 0,
    }
  }

  /// Address of offset zero, or null before the first extension.
  pub fn base_address(&self) -> *const u8 {
    self.base
  }
}

impl Default for SbrkSource {
  fn default() -> Self {
    Self::new()
  }
}

fn program_break_moved(address: *mut c_void) -> bool {
  address == usize::MAX as *mut c_void
}

impl HeapSource for SbrkSource {
  fn extend(
    &mut self,
    bytes: usize,
  ) -> Option<usize> {
    // The first extension also pads the break up to the alignment unit.
    let pad = if self.base.is_null() {
      let current = unsafe { sbrk(0) };
      if program_break_moved(current) {
        return None;
      }
      (current as *mut u8).align_offset(ALIGNMENT)
    } else {
      0
    };

    let increment = intptr_t::try_from(bytes.checked_add(pad)?).ok()?;
    let address = unsafe { sbrk(increment) };

    if program_break_moved(address) {
      warn!("sbrk({increment}) failed");
      return None;
    }

    let address = address as *mut u8;

    if self.base.is_null() {
      self.base = address.wrapping_add(pad);
    } else if address != self.base.wrapping_add(self.len) {
      warn!(
        "program break moved from {:?} to {:?} behind the allocator's back",
        self.base.wrapping_add(self.len),
        address
      );
      return None;
    }

    let offset = self.len;
    self.len += bytes;
    Some(offset)
  }

  fn bounds(&self) -> Range<usize> {
    0..self.len
  }

  fn memory(&self) -> &[u8] {
    if self.base.is_null() {
      return &[];
    }
    // SAFETY: [base, base + len) was obtained from sbrk by this source, is
    // contiguous, and is never handed back to the system.
    unsafe { slice::from_raw_parts(self.base, self.len) }
  }

  fn memory_mut(&mut self) -> &mut [u8] {
    if self.base.is_null() {
      return &mut [];
    }
    // SAFETY: as in `memory`; `&mut self` guarantees exclusive access.
    unsafe { slice::from_raw_parts_mut(self.base, self.len) }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_arena_extends_contiguously() {
    let mut arena = ArenaSource::new(64);

    assert_eq!(Some(0), arena.extend(16));
    assert_eq!(Some(16), arena.extend(32));
    assert_eq!(0..48, arena.bounds());
    assert_eq!(48, arena.memory().len());
  }

  #[test]
  fn test_arena_refuses_past_limit() {
    let mut arena = ArenaSource::new(64);

    assert_eq!(Some(0), arena.extend(48));
    assert_eq!(None, arena.extend(24));
    assert_eq!(0..48, arena.bounds());
    assert_eq!(None, arena.extend(usize::MAX));
  }

  #[test]
  #[ignore = "moves the process-wide program break; run alone with --ignored --test-threads=1"]
  fn test_sbrk_extension() {
    let mut source = SbrkSource::new();

    // Other threads may move the break through malloc, which legitimately
    // makes the second extension fail.
    let Some(first) = source.extend(64) else {
      return;
    };
    assert_eq!(0, first);
    assert_eq!(0, source.base_address() as usize % ALIGNMENT);

    source.memory_mut()[63] = 0xAB;
    assert_eq!(0xAB, source.memory()[63]);

    if let Some(second) = source.extend(64) {
      assert_eq!(64, second);
      assert_eq!(0..128, source.bounds());
    }
  }
}
