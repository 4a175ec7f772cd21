/// Rounds a byte count up to the allocator's alignment unit, or to an
/// explicit power-of-two unit.
///
/// # Examples
///
/// ```rust
/// use tagalloc::align;
///
/// assert_eq!(align!(13), 16); // 8-byte alignment unit.
/// assert_eq!(align!(16), 16);
/// assert_eq!(align!(9, 4), 12);
/// assert_eq!(align!(4097, 4096), 8192);
/// ```
#[macro_export]
macro_rules! align {
  ($value:expr) => {
    $crate::align!($value, $crate::ALIGNMENT)
  };
  ($value:expr, $unit:expr) => {
    (($value) + ($unit) - 1) & !(($unit) - 1)
  };
}
