/// Rounds `value` up to the heap's double-word alignment.
///
/// # Examples
///
/// ```rust
/// use rheap::align;
///
/// assert_eq!(align!(0), 0);
/// assert_eq!(align!(1), 8);
/// assert_eq!(align!(13), 16);
/// assert_eq!(align!(16), 16);
/// ```
#[macro_export]
macro_rules! align {
  ($value:expr) => {
    $crate::align_to!($value, $crate::DSIZE)
  };
}

/// Rounds `value` up to the next multiple of `align`, which must be a power of two.
///
/// ```rust
/// use rheap::align_to;
///
/// assert_eq!(align_to!(5, 4), 8);
/// assert_eq!(align_to!(0x1001, 0x1000), 0x2000);
/// ```
#[macro_export]
macro_rules! align_to {
  ($value:expr, $align:expr) => {
    ($value + $align - 1) & !($align - 1)
  };
}
