use std::{mem, ptr, str};

use crate::align::ALIGN;

/// Bytes reserved for the informational name tag, NUL included.
pub const NAME_LEN: usize = 8;

/// Width of the header in front of every payload.
pub const HEADER_SIZE: usize = mem::size_of::<Block>();

/// Smallest payload worth carving off as its own block.
pub const MIN_DATA_SIZE: usize = ALIGN;

const FREE_BIT: usize = 0x1;

/// Metadata prefixing every block of the arena.
///
/// ```text
///   ┌──────────┬──────────────┬──────────┬──────────┬──────────────────────┐
///   │ name[8]  │ size | free  │   next   │   prev   │ payload ...          │
///   └──────────┴──────────────┴──────────┴──────────┴──────────────────────┘
///                                                   ▲
///                                                   └── pointer handed out
/// ```
///
/// `next`/`prev` follow the physical order of the arena. The free-list link
/// is not part of the header: while a block is free, the first word of its
/// payload holds it (see [`Block::free_link`]).
#[repr(C, align(16))]
pub struct Block {
  name: [u8; NAME_LEN],
  size: usize,
  next: *mut Block,
  prev: *mut Block,
}

const _: () = assert!(HEADER_SIZE % ALIGN == 0);
const _: () = assert!(MIN_DATA_SIZE >= mem::size_of::<*mut Block>());

impl Block {
  /// Writes a fresh, unlinked, free header at `addr` spanning `span` bytes
  /// (header included).
  ///
  /// # Safety
  ///
  /// `addr` must be aligned to [`ALIGN`] and valid for writes of `span` bytes,
  /// and `span - HEADER_SIZE` must be a multiple of [`ALIGN`].
  pub unsafe fn init(
    addr: *mut u8,
    span: usize,
  ) -> *mut Block {
    debug_assert!(span >= HEADER_SIZE + MIN_DATA_SIZE);
    debug_assert_eq!(addr as usize % ALIGN, 0);

    let block = addr as *mut Block;
    unsafe {
      ptr::write(
        block,
        Block {
          name: [0; NAME_LEN],
          size: (span - HEADER_SIZE) | FREE_BIT,
          next: ptr::null_mut(),
          prev: ptr::null_mut(),
        },
      );
    }
    block
  }

  /// Payload size in bytes, free flag masked off.
  pub fn size(&self) -> usize {
    self.size & !FREE_BIT
  }

  pub fn is_free(&self) -> bool {
    self.size & FREE_BIT != 0
  }

  /// Replaces the payload size, keeping the free flag.
  pub fn set_size(
    &mut self,
    size: usize,
  ) {
    debug_assert_eq!(size & FREE_BIT, 0, "block sizes must be even");
    self.size = size | (self.size & FREE_BIT);
  }

  pub fn set_free(&mut self) {
    self.size |= FREE_BIT;
  }

  pub fn set_used(&mut self) {
    self.size &= !FREE_BIT;
  }

  pub fn next(&self) -> *mut Block {
    self.next
  }

  pub fn prev(&self) -> *mut Block {
    self.prev
  }

  pub fn set_next(
    &mut self,
    next: *mut Block,
  ) {
    self.next = next;
  }

  pub fn set_prev(
    &mut self,
    prev: *mut Block,
  ) {
    self.prev = prev;
  }

  /// The name tag, empty when unset or not valid UTF-8.
  pub fn name(&self) -> &str {
    let len = self.name.iter().position(|&b| b == 0).unwrap_or(NAME_LEN);
    str::from_utf8(&self.name[..len]).unwrap_or("")
  }

  /// Stores at most `NAME_LEN - 1` bytes of `name`, cut on a char boundary.
  pub fn set_name(
    &mut self,
    name: &str,
  ) {
    let mut len = name.len().min(NAME_LEN - 1);
    while !name.is_char_boundary(len) {
      len -= 1;
    }

    self.name = [0; NAME_LEN];
    self.name[..len].copy_from_slice(&name.as_bytes()[..len]);
  }

  /// First byte of the payload.
  pub fn payload(block: *mut Block) -> *mut u8 {
    (block as *mut u8).wrapping_add(HEADER_SIZE)
  }

  /// One past the last payload byte, i.e. where a physically adjacent block
  /// would start.
  ///
  /// # Safety
  ///
  /// `block` must point to a live header.
  pub unsafe fn end(block: *mut Block) -> *mut u8 {
    unsafe { Block::payload(block).add((*block).size()) }
  }

  /// Recovers the header from a payload pointer.
  ///
  /// # Safety
  ///
  /// `payload` must have been produced by [`Block::payload`].
  pub unsafe fn from_payload(payload: *mut u8) -> *mut Block {
    unsafe { payload.sub(HEADER_SIZE) as *mut Block }
  }

  /// Whether `right` starts exactly where `left` ends.
  ///
  /// # Safety
  ///
  /// `left` must point to a live header.
  pub unsafe fn adjoins(
    left: *mut Block,
    right: *mut Block,
  ) -> bool {
    !right.is_null() && unsafe { Block::end(left) } == right as *mut u8
  }

  /// The free-list link living in the first payload word.
  ///
  /// Only meaningful while the header says the block is free; the same bytes
  /// are user data otherwise. Callers re-derive it on every access instead of
  /// holding on to it across a flag change.
  ///
  /// # Safety
  ///
  /// `block` must point to a live header.
  pub unsafe fn free_link(block: *mut Block) -> *mut *mut Block {
    debug_assert!(unsafe { (*block).is_free() }, "free link read on a used block");
    Block::payload(block) as *mut *mut Block
  }

  /// Next entry of the free list.
  ///
  /// # Safety
  ///
  /// `block` must be a free block currently in the free list.
  pub unsafe fn next_free(block: *mut Block) -> *mut Block {
    unsafe { *Block::free_link(block) }
  }

  /// # Safety
  ///
  /// `block` must be a free block.
  pub unsafe fn set_next_free(
    block: *mut Block,
    next: *mut Block,
  ) {
    unsafe { *Block::free_link(block) = next };
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[repr(C, align(16))]
  struct Region([u8; 256]);

  #[test]
  fn test_header_layout() {
    assert_eq!(HEADER_SIZE % ALIGN, 0);
    assert!(HEADER_SIZE >= 2 * mem::size_of::<usize>() + NAME_LEN);
  }

  #[test]
  fn test_init_spans_region() {
    let mut region = Region([0xFF; 256]);

    unsafe {
      let block = Block::init(region.0.as_mut_ptr(), 256);

      assert!((*block).is_free());
      assert_eq!((*block).size(), 256 - HEADER_SIZE);
      assert_eq!((*block).name(), "");
      assert!((*block).next().is_null());
      assert!((*block).prev().is_null());
      assert_eq!(Block::end(block), region.0.as_mut_ptr().add(256));
      assert_eq!(Block::from_payload(Block::payload(block)), block);
    }
  }

  #[test]
  fn test_flag_does_not_leak_into_size() {
    let mut region = Region([0; 256]);

    unsafe {
      let block = Block::init(region.0.as_mut_ptr(), 128);

      (*block).set_used();
      assert!(!(*block).is_free());
      assert_eq!((*block).size(), 128 - HEADER_SIZE);

      (*block).set_size(32);
      (*block).set_free();
      assert!((*block).is_free());
      assert_eq!((*block).size(), 32);

      (*block).set_size(48);
      assert!((*block).is_free());
      assert_eq!((*block).size(), 48);
    }
  }

  #[test]
  fn test_name_truncation() {
    let mut region = Region([0; 256]);

    unsafe {
      let block = Block::init(region.0.as_mut_ptr(), 128);

      (*block).set_name("buffer");
      assert_eq!((*block).name(), "buffer");

      (*block).set_name("a-very-long-name");
      assert_eq!((*block).name(), "a-very-");

      // 'é' is two bytes and would straddle the limit.
      (*block).set_name("abcdeé");
      assert_eq!((*block).name(), "abcde");

      (*block).set_name("");
      assert_eq!((*block).name(), "");
    }
  }

  #[test]
  fn test_free_link_lives_in_payload() {
    let mut region = Region([0; 256]);

    unsafe {
      let base = region.0.as_mut_ptr();
      let first = Block::init(base, 128);
      let second = Block::init(base.add(128), 128);

      Block::set_next_free(first, second);
      assert_eq!(Block::next_free(first), second);
      assert_eq!(*(Block::payload(first) as *mut *mut Block), second);
      assert!(Block::adjoins(first, second));
      assert!(!Block::adjoins(second, first));
    }
  }
}
