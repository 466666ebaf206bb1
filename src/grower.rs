use std::{
  alloc::{self, Layout},
  ptr::NonNull,
};

use libc::{c_void, intptr_t, sbrk};

use crate::{
  align::{ALIGN, PAGE_SIZE, pages_for},
  error::AllocError,
  logging::debug,
};

/// The page-growth primitive the allocator sits on.
pub trait ArenaGrower {
  /// Extends the arena by `size` bytes and returns the base of the new
  /// region, aligned to [`ALIGN`].
  ///
  /// `size` is always a positive multiple of [`PAGE_SIZE`]. Successive
  /// regions may or may not be contiguous.
  ///
  /// # Safety
  ///
  /// The returned region must stay valid and untouched by anyone else for the
  /// lifetime of the allocator that requested it.
  unsafe fn grow(
    &mut self,
    size: usize,
  ) -> Result<NonNull<u8>, AllocError>;
}

/// Grows the arena by moving the program break with `sbrk(2)`.
///
/// Memory obtained this way is never handed back.
#[derive(Debug, Default, Clone, Copy)]
pub struct SbrkGrower;

impl SbrkGrower {
  /// Current program break, as reported by `sbrk(0)`.
  pub fn program_break() -> *mut u8 {
    unsafe { sbrk(0) as *mut u8 }
  }
}

impl ArenaGrower for SbrkGrower {
  unsafe fn grow(
    &mut self,
    size: usize,
  ) -> Result<NonNull<u8>, AllocError> {
    let exhausted = AllocError::Exhausted { requested: size };

    unsafe {
      let current = sbrk(0);
      if current == usize::MAX as *mut c_void {
        return Err(exhausted);
      }

      // The initial break is not necessarily aligned; pay the padding once.
      let pad = (current as usize).wrapping_neg() & (ALIGN - 1);
      let increment = size
        .checked_add(pad)
        .and_then(|total| intptr_t::try_from(total).ok())
        .ok_or(exhausted)?;

      let address = sbrk(increment);
      if address == usize::MAX as *mut c_void {
        return Err(exhausted);
      }

      debug!(
        "sbrk grew arena by {} bytes (+{} padding) at {:?}",
        size, pad, address
      );

      NonNull::new((address as *mut u8).add(pad)).ok_or(exhausted)
    }
  }
}

/// Hands out consecutive slices of one fixed region.
///
/// Useful wherever the memory is known up front: a kernel heap window, a
/// static buffer, or a test that must not touch the real program break.
pub struct FixedArena {
  base: NonNull<u8>,
  capacity: usize,
  used: usize,
  owned: Option<Layout>,
}

unsafe impl Send for FixedArena {}

impl FixedArena {
  /// Allocates a zeroed, page-aligned backing region of at least `capacity`
  /// bytes (rounded up to whole pages, at least one).
  pub fn new(capacity: usize) -> Result<Self, AllocError> {
    let layout = pages_for(capacity.max(1))
      .and_then(|size| Layout::from_size_align(size, PAGE_SIZE).ok())
      .ok_or(AllocError::SizeOverflow { count: 1, size: capacity })?;

    let raw = unsafe { alloc::alloc_zeroed(layout) };
    let base = NonNull::new(raw).ok_or(AllocError::Exhausted { requested: layout.size() })?;

    Ok(Self {
      base,
      capacity: layout.size(),
      used: 0,
      owned: Some(layout),
    })
  }

  /// Wraps a caller-owned region. The start is rounded up to [`ALIGN`];
  /// returns `None` if nothing usable is left.
  ///
  /// # Safety
  ///
  /// `base..base + len` must be valid for reads and writes and must outlive
  /// the arena and every allocator fed from it.
  pub unsafe fn from_raw(
    base: *mut u8,
    len: usize,
  ) -> Option<Self> {
    let pad = (base as usize).wrapping_neg() & (ALIGN - 1);
    let capacity = len.checked_sub(pad)?;
    if capacity < PAGE_SIZE {
      return None;
    }

    Some(Self {
      base: NonNull::new(unsafe { base.add(pad) })?,
      capacity,
      used: 0,
      owned: None,
    })
  }

  pub fn base(&self) -> *mut u8 {
    self.base.as_ptr()
  }

  pub fn capacity(&self) -> usize {
    self.capacity
  }

  /// Bytes handed out so far.
  pub fn used(&self) -> usize {
    self.used
  }

  pub fn remaining(&self) -> usize {
    self.capacity - self.used
  }
}

impl ArenaGrower for FixedArena {
  unsafe fn grow(
    &mut self,
    size: usize,
  ) -> Result<NonNull<u8>, AllocError> {
    if size > self.remaining() {
      debug!(
        "fixed arena at {:?} cannot grow by {} bytes ({} left)",
        self.base,
        size,
        self.remaining()
      );
      return Err(AllocError::Exhausted { requested: size });
    }

    let region = unsafe { self.base.add(self.used) };
    self.used += size;

    debug!("fixed arena grew by {} bytes at {:?}", size, region);
    Ok(region)
  }
}

impl Drop for FixedArena {
  fn drop(&mut self) {
    if let Some(layout) = self.owned {
      unsafe { alloc::dealloc(self.base.as_ptr(), layout) };
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_fixed_arena_hands_out_contiguous_pages() {
    let mut arena = FixedArena::new(3 * PAGE_SIZE).unwrap();
    assert_eq!(arena.capacity(), 3 * PAGE_SIZE);

    unsafe {
      let first = arena.grow(PAGE_SIZE).unwrap();
      let second = arena.grow(2 * PAGE_SIZE).unwrap();

      assert_eq!(first.as_ptr(), arena.base());
      assert_eq!(second.as_ptr(), first.as_ptr().add(PAGE_SIZE));
      assert_eq!(first.as_ptr() as usize % ALIGN, 0);
      assert_eq!(arena.remaining(), 0);

      assert_eq!(
        arena.grow(PAGE_SIZE),
        Err(AllocError::Exhausted { requested: PAGE_SIZE })
      );
    }
  }

  #[test]
  fn test_fixed_arena_rounds_capacity() {
    assert_eq!(FixedArena::new(0).unwrap().capacity(), PAGE_SIZE);
    assert_eq!(FixedArena::new(PAGE_SIZE + 1).unwrap().capacity(), 2 * PAGE_SIZE);
  }

  #[test]
  fn test_fixed_arena_capacity_overflow_is_an_error() {
    assert_eq!(
      FixedArena::new(usize::MAX).err(),
      Some(AllocError::SizeOverflow { count: 1, size: usize::MAX })
    );
  }

  #[test]
  fn test_fixed_arena_from_raw_aligns_base() {
    let mut backing = vec![0u8; 2 * PAGE_SIZE + 64];

    unsafe {
      let start = backing.as_mut_ptr().add(1);
      let arena = FixedArena::from_raw(start, 2 * PAGE_SIZE).unwrap();

      assert_eq!(arena.base() as usize % ALIGN, 0);
      assert!(arena.base() >= start);
      assert!(arena.capacity() <= 2 * PAGE_SIZE);

      assert!(FixedArena::from_raw(start, 16).is_none());
    }
  }
}
