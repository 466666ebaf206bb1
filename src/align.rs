/// Alignment of every payload handed out by the allocator.
pub const ALIGN: usize = 16;

/// Granularity of arena growth.
pub const PAGE_SIZE: usize = 4096;

/// Rounds a size up to the allocator alignment ([`ALIGN`]).
///
/// # Examples
///
/// ```rust
/// use rmalloc::align;
///
/// assert_eq!(align!(1), 16);
/// assert_eq!(align!(16), 16);
/// assert_eq!(align!(100), 112);
/// ```
#[macro_export]
macro_rules! align {
  ($value:expr) => {
    $crate::align_to!($value, $crate::align::ALIGN)
  };
}

/// Rounds a size up to an arbitrary power-of-two boundary.
///
/// ```rust
/// use rmalloc::align_to;
///
/// assert_eq!(align_to!(4097, 4096), 8192);
/// assert_eq!(align_to!(3, 8), 8);
/// ```
#[macro_export]
macro_rules! align_to {
  ($value:expr, $boundary:expr) => {
    ($value + $boundary - 1) & !($boundary - 1)
  };
}

/// Checked version of [`align!`]; `None` when rounding would overflow.
pub fn checked_align(size: usize) -> Option<usize> {
  checked_align_to(size, ALIGN)
}

/// Checked version of [`align_to!`].
pub fn checked_align_to(
  size: usize,
  boundary: usize,
) -> Option<usize> {
  debug_assert!(boundary.is_power_of_two());
  size.checked_add(boundary - 1).map(|v| v & !(boundary - 1))
}

/// Number of bytes to request from the grower so that `bytes` fit, in whole pages.
pub fn pages_for(bytes: usize) -> Option<usize> {
  checked_align_to(bytes, PAGE_SIZE)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_align() {
    let mut alignments = Vec::new();

    for i in 0..10 {
      let sizes = (ALIGN * i + 1)..=(ALIGN * (i + 1));

      let expected_alignment = ALIGN * (i + 1);

      alignments.push((sizes, expected_alignment));
    }

    for (sizes, expected) in alignments {
      for size in sizes {
        assert_eq!(expected, align!(size));
        assert_eq!(Some(expected), checked_align(size));
      }
    }
  }

  #[test]
  fn test_align_keeps_low_bit_clear() {
    for size in 1..512 {
      assert_eq!(align!(size) & 1, 0);
    }
  }

  #[test]
  fn test_checked_align_overflow() {
    assert_eq!(checked_align(usize::MAX), None);
    assert_eq!(checked_align(usize::MAX - 5), None);
    assert_eq!(checked_align(usize::MAX - 2 * ALIGN), Some(usize::MAX - 2 * ALIGN + 1));
    assert_eq!(pages_for(usize::MAX - 10), None);
  }

  #[test]
  fn test_pages_for() {
    assert_eq!(pages_for(1), Some(PAGE_SIZE));
    assert_eq!(pages_for(PAGE_SIZE), Some(PAGE_SIZE));
    assert_eq!(pages_for(PAGE_SIZE + 1), Some(2 * PAGE_SIZE));
  }
}
