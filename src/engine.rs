//! The mutating core: every change to a block's free flag, its size or its
//! physical links goes through here, so the physical chain and the free list
//! are always updated together.

use crate::{
  align::pages_for,
  allocator::Allocator,
  block::{Block, HEADER_SIZE, MIN_DATA_SIZE},
  error::AllocError,
  grower::ArenaGrower,
  logging::{debug, trace},
};

impl<G: ArenaGrower> Allocator<G> {
  /// Marks a used block free and indexes it.
  pub(crate) unsafe fn release(
    &mut self,
    block: *mut Block,
  ) {
    unsafe {
      debug_assert!(!(*block).is_free(), "double free of {block:?}");
      (*block).set_free();
      self.free.insert(block);
    }
  }

  /// Takes a free block out of the index and marks it used.
  pub(crate) unsafe fn claim(
    &mut self,
    block: *mut Block,
  ) {
    unsafe {
      let listed = self.free.remove(block);
      debug_assert!(listed, "claimed block {block:?} was not in the free list");
      (*block).set_used();
    }
  }

  /// Grows the arena by enough whole pages for a `size`-byte payload and
  /// appends the grant to the chain as one used block.
  pub(crate) unsafe fn extend(
    &mut self,
    size: usize,
  ) -> Result<*mut Block, AllocError> {
    let span = size
      .checked_add(HEADER_SIZE)
      .and_then(pages_for)
      .ok_or(AllocError::SizeOverflow { count: 1, size })?;

    unsafe {
      let base = self.grower.grow(span)?;
      let block = Block::init(base.as_ptr(), span);
      (*block).set_used();
      self.append(block);

      debug!("arena grew by {} bytes, new block {:?}", span, block);
      Ok(block)
    }
  }

  unsafe fn append(
    &mut self,
    block: *mut Block,
  ) {
    unsafe {
      if self.tail.is_null() {
        self.head = block;
      } else {
        debug_assert!(block as usize >= Block::end(self.tail) as usize);
        (*self.tail).set_next(block);
        (*block).set_prev(self.tail);
      }
      self.tail = block;
    }
  }

  /// Trims a used `block` down to `size` bytes when the excess can hold a
  /// header plus a minimum payload. The excess becomes a free block, merged
  /// with a free right neighbour if there is one. Returns that free block, or
  /// null when the block is kept oversized.
  pub(crate) unsafe fn split(
    &mut self,
    block: *mut Block,
    size: usize,
  ) -> *mut Block {
    unsafe {
      let total = (*block).size();
      let fits = size
        .checked_add(HEADER_SIZE + MIN_DATA_SIZE)
        .is_some_and(|needed| needed <= total);
      if !fits {
        return std::ptr::null_mut();
      }

      let rest = Block::init(Block::payload(block).add(size), total - size);
      let next = (*block).next();

      (*rest).set_prev(block);
      (*rest).set_next(next);
      if next.is_null() {
        self.tail = rest;
      } else {
        (*next).set_prev(rest);
      }
      (*block).set_next(rest);
      (*block).set_size(size);

      trace!(
        "split {:?}: kept {} bytes, {} bytes free at {:?}",
        block,
        size,
        (*rest).size(),
        rest
      );

      self.free.insert(rest);
      self.coalesce(rest)
    }
  }

  /// Gives the first `lead` bytes of a used block back as a free block and
  /// returns the used block that now starts `lead` bytes later. Both sides
  /// must keep at least a header plus a minimum payload.
  pub(crate) unsafe fn release_front(
    &mut self,
    block: *mut Block,
    lead: usize,
  ) -> *mut Block {
    unsafe {
      let total = (*block).size();
      debug_assert!(lead >= HEADER_SIZE + MIN_DATA_SIZE);
      debug_assert!(lead + MIN_DATA_SIZE <= total);

      let used = Block::init((block as *mut u8).add(lead), HEADER_SIZE + total - lead);
      let next = (*block).next();

      (*used).set_used();
      (*used).set_prev(block);
      (*used).set_next(next);
      if next.is_null() {
        self.tail = used;
      } else {
        (*next).set_prev(used);
      }
      (*block).set_next(used);
      (*block).set_size(lead - HEADER_SIZE);

      trace!("released {} leading bytes of {:?}, payload now at {:?}", lead, block, used);

      self.release(block);
      self.coalesce(block);
      used
    }
  }

  /// Merges a free, indexed block with its free physical neighbours. The
  /// survivor is indexed exactly once; returns it.
  pub(crate) unsafe fn coalesce(
    &mut self,
    block: *mut Block,
  ) -> *mut Block {
    unsafe {
      debug_assert!((*block).is_free());

      let prev = (*block).prev();
      let next = (*block).next();
      let merge_prev = !prev.is_null() && (*prev).is_free() && Block::adjoins(prev, block);
      let merge_next = !next.is_null() && (*next).is_free() && Block::adjoins(block, next);

      if !merge_prev && !merge_next {
        return block;
      }

      self.free.remove(block);

      let mut survivor = block;
      if merge_prev {
        self.free.remove(prev);
        self.absorb_next(prev);
        survivor = prev;
      }
      if merge_next {
        self.free.remove(next);
        self.absorb_next(survivor);
      }

      self.free.insert(survivor);

      trace!("coalesced {:?} into {:?} ({} bytes)", block, survivor, (*survivor).size());
      survivor
    }
  }

  /// Folds the physical successor of `left` into it. The successor must
  /// already be out of the free list.
  pub(crate) unsafe fn absorb_next(
    &mut self,
    left: *mut Block,
  ) {
    unsafe {
      let right = (*left).next();
      debug_assert!(Block::adjoins(left, right));

      let after = (*right).next();
      (*left).set_size((*left).size() + HEADER_SIZE + (*right).size());
      (*left).set_next(after);
      if after.is_null() {
        self.tail = left;
      } else {
        (*after).set_prev(left);
      }
    }
  }
}
