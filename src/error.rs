use std::{error, fmt};

/// Why an allocation request could not be served.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocError {
  /// A zero-byte request.
  ZeroSize,
  /// `count * size` (or the rounded request) does not fit in a `usize`.
  SizeOverflow { count: usize, size: usize },
  /// The grower could not hand out `requested` more bytes.
  Exhausted { requested: usize },
  /// An alignment that is not a power of two.
  BadAlignment { alignment: usize },
}

impl fmt::Display for AllocError {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    match self {
      Self::ZeroSize => write!(f, "zero-sized allocation"),
      Self::SizeOverflow { count, size } => {
        write!(f, "allocation size overflows: {count} x {size} bytes")
      }
      Self::Exhausted { requested } => {
        write!(f, "arena exhausted: could not grow by {requested} bytes")
      }
      Self::BadAlignment { alignment } => {
        write!(f, "alignment {alignment} is not a power of two")
      }
    }
  }
}

impl error::Error for AllocError {}

/// An inconsistency found while walking the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeapError {
  /// A block overlaps the one after it.
  Overlap { block: usize, next: usize },
  /// `next.prev` does not point back at `block`.
  BrokenBackLink { block: usize, next: usize },
  /// Two physically adjacent blocks are both free.
  UncoalescedNeighbours { block: usize, next: usize },
  /// A free block missing from the free list.
  NotIndexed { block: usize },
  /// A free-list entry that is used, unknown, or listed twice.
  StrayIndexEntry { block: usize },
  /// Payload not aligned, or size not a multiple of the alignment.
  Misaligned { block: usize },
  /// The free list's length does not match the number of free blocks.
  IndexCount { listed: usize, free: usize },
}

impl fmt::Display for HeapError {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    match self {
      Self::Overlap { block, next } => {
        write!(f, "block {block:#x} overlaps block {next:#x}")
      }
      Self::BrokenBackLink { block, next } => {
        write!(f, "block {next:#x} does not link back to {block:#x}")
      }
      Self::UncoalescedNeighbours { block, next } => {
        write!(f, "adjacent blocks {block:#x} and {next:#x} are both free")
      }
      Self::NotIndexed { block } => {
        write!(f, "free block {block:#x} is not in the free list")
      }
      Self::StrayIndexEntry { block } => {
        write!(f, "free list entry {block:#x} is not a distinct free block")
      }
      Self::Misaligned { block } => write!(f, "block {block:#x} is misaligned"),
      Self::IndexCount { listed, free } => {
        write!(f, "free list holds {listed} entries but {free} blocks are free")
      }
    }
  }
}

impl error::Error for HeapError {}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_display() {
    assert_eq!(AllocError::ZeroSize.to_string(), "zero-sized allocation");
    assert_eq!(
      AllocError::Exhausted { requested: 4096 }.to_string(),
      "arena exhausted: could not grow by 4096 bytes"
    );
    assert_eq!(
      AllocError::BadAlignment { alignment: 24 }.to_string(),
      "alignment 24 is not a power of two"
    );
    assert_eq!(
      HeapError::UncoalescedNeighbours { block: 0x10, next: 0x40 }.to_string(),
      "adjacent blocks 0x10 and 0x40 are both free"
    );
  }
}
